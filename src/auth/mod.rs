use crate::state::AppState;
use axum::Router;

pub mod claims;
pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod memory;
pub mod password;
pub mod policy;
pub mod repo;
pub mod repo_types;
pub mod services;

pub use error::{AccountError, AccountResult};
pub use services::AccountService;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::me_routes())
}
