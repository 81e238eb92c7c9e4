pub mod audit;
pub mod redemption;

pub use audit::*;
pub use redemption::*;
