pub mod constants;
pub mod errors;
pub mod managers;
pub mod models;
pub mod services;
pub mod utils;

pub use managers::relay::RelayManager;
pub use models::{CallContext, CallResult, ResultType};
