//! HTTP surface: session endpoints, query endpoints and the static UI.

mod auth;
mod error;
mod handlers;
mod router;


pub use auth::{issue_token, validate_token, SessionClaims, SESSION_COOKIE};
pub use error::ApiError;
pub use handlers::{PropsRequest, StatusResponse, SubmitRequest};
pub use router::{create_router, AppState};
