pub mod audit_service;
pub mod redemption_service;

pub use audit_service::*;
pub use redemption_service::*;
