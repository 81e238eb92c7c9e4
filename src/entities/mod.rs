pub mod activated_codes;
pub mod counters;
pub mod users;

pub use activated_codes as activated_code_entity;
pub use counters as counter_entity;
pub use counters::GLOBAL_COUNTER;
pub use users as user_entity;
