pub mod audit;
pub mod redeem;

pub use audit::audit_config;
pub use redeem::redeem_config;

use crate::error::AppError;
use actix_web::{HttpRequest, HttpResponse, ResponseError};

/// Default service for unmatched routes
pub async fn not_found(req: HttpRequest) -> HttpResponse {
    AppError::NotFound(req.path().to_string()).error_response()
}
