use std::env;

use anyhow::Context;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub session_ttl_hours: i64,
    pub mail: MailConfig,
}

/// SMTP settings. `server == None` means outbound mail is disabled.
#[derive(Clone, Debug)]
pub struct MailConfig {
    pub server: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub default_sender: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://health.db".to_string());
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let session_ttl_hours = session_ttl(env::var("SESSION_TTL_HOURS").ok().as_deref())?;

        let port = match env::var("MAIL_PORT") {
            Ok(p) => p.parse::<u16>()?,
            Err(_) => 587,
        };
        let username = non_empty_var("MAIL_USERNAME");
        let mail = MailConfig {
            server: non_empty_var("MAIL_SERVER"),
            port,
            password: non_empty_var("MAIL_PASSWORD"),
            // Falls back to the SMTP login, which is what most relays expect.
            default_sender: non_empty_var("MAIL_DEFAULT_SENDER").or_else(|| username.clone()),
            username,
        };

        Ok(Self {
            database_url,
            bind_addr,
            session_ttl_hours,
            mail,
        })
    }
}

/// Longest accepted session lifetime: one year.
const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;

fn session_ttl(raw: Option<&str>) -> anyhow::Result<i64> {
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(1);
    };
    let hours: i64 = raw
        .parse()
        .with_context(|| format!("SESSION_TTL_HOURS must be whole hours, got `{raw}`"))?;
    anyhow::ensure!(
        (1..=MAX_SESSION_TTL_HOURS).contains(&hours),
        "SESSION_TTL_HOURS must be between 1 and {MAX_SESSION_TTL_HOURS}, got {hours}"
    );
    Ok(hours)
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ttl_defaults_to_one_hour() {
        assert_eq!(session_ttl(None).unwrap(), 1);
        assert_eq!(session_ttl(Some("  ")).unwrap(), 1);
        assert_eq!(session_ttl(Some("12")).unwrap(), 12);
    }

    #[test]
    fn session_ttl_rejects_garbage_and_out_of_range() {
        assert!(session_ttl(Some("soon")).is_err());
        assert!(session_ttl(Some("0")).is_err());
        assert!(session_ttl(Some("-3")).is_err());
        assert!(session_ttl(Some("9223372036854775807")).is_err());
    }
}
