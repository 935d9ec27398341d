use std::sync::Arc;

use carebook_server::{
    config::Config,
    db,
    mail::{LogMailer, Mailer, SmtpMailer},
    models::AppState,
};

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;
    let pool = db::connect_sqlite(&cfg.database_url).await?;

    let mailer: Arc<dyn Mailer> = match cfg.mail.server.as_deref() {
        Some(server) => {
            tracing::info!("Outbound mail via {}:{}", server, cfg.mail.port);
            Arc::new(SmtpMailer::new(server, &cfg.mail)?)
        }
        None => {
            tracing::warn!("MAIL_SERVER not set, emails will only be logged");
            Arc::new(LogMailer)
        }
    };

    let state = AppState {
        db: pool,
        mailer,
        session_ttl_hours: cfg.session_ttl_hours,
    };

    let app = carebook_server::app(state);

    tracing::info!("Listening on http://{}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
