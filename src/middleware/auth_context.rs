use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};

use crate::auth::hash_access_token;
use crate::error::{ApiError, db_error};
use crate::models::{AppState, UserRole, now_utc};

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: i64,
    pub role: UserRole,
    pub session_token_id: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct SessionLookupRow {
    session_token_id: i64,
    user_id: i64,
    user_type: UserRole,
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            // Extract Authorization: Bearer <token>
            let TypedHeader(authz): TypedHeader<Authorization<Bearer>> =
                TypedHeader::from_request_parts(parts, state)
                    .await
                    .map_err(|_| ApiError::invalid_token())?;

            let token_hash = hash_access_token(authz.token());
            let now = now_utc();

            // Validate session token + ensure the user is active
            let row: SessionLookupRow = sqlx::query_as::<_, SessionLookupRow>(
                r#"
                SELECT st.id AS session_token_id, st.user_id, u.user_type
                FROM session_tokens st
                JOIN users u ON u.id = st.user_id
                WHERE st.token_hash = ?
                  AND st.revoked_at IS NULL
                  AND st.expires_at > ?
                  AND u.status = 'ACTIVE'
                "#,
            )
            .bind(&token_hash)
            .bind(now)
            .fetch_optional(&state.db)
            .await
            .map_err(db_error)?
            .ok_or_else(ApiError::invalid_token)?;

            // Touch last_seen_at (best-effort)
            let _ = sqlx::query("UPDATE session_tokens SET last_seen_at = ? WHERE id = ?")
                .bind(now)
                .bind(row.session_token_id)
                .execute(&state.db)
                .await;

            Ok(AuthContext {
                user_id: row.user_id,
                role: row.user_type,
                session_token_id: row.session_token_id,
            })
        }
    }
}
