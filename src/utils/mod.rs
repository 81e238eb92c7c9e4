pub mod code_generator;
pub mod validation;

pub use code_generator::token_for_index;
pub use validation::{TOKEN_LEN, is_valid_token};
