pub mod auth_context;
pub mod json_body;
