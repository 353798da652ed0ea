pub mod error;
pub mod models;

pub use error::{DomainError, DomainResult, OracleError};
pub use models::*;
