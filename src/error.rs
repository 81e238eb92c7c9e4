use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use thiserror::Error;

use crate::store::StoreError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Plain-text response bodies understood by lottery clients.
pub const NOT_FOUND_BODY: &str = "NOT_FOUND";
pub const INTERNAL_ERROR_BODY: &str = "INTERNAL_ERROR";

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // 只返回固定字符串，内部细节只写日志
        let body = match self {
            AppError::NotFound(path) => {
                log::debug!("Route not found: {path}");
                NOT_FOUND_BODY
            }
            AppError::Store(err) => {
                log::error!("Store error: {err}");
                INTERNAL_ERROR_BODY
            }
            AppError::DatabaseError(err) => {
                log::error!("Database error: {err}");
                INTERNAL_ERROR_BODY
            }
            _ => {
                log::error!("Internal error: {self}");
                INTERNAL_ERROR_BODY
            }
        };

        HttpResponse::build(self.status_code())
            .content_type("text/plain; charset=utf-8")
            .body(body)
    }
}
