pub mod auth;
pub mod response;

pub use auth::{extract_credential, if_match};
pub use response::{ApiResponse, ApiResult};
