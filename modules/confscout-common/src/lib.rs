pub mod config;
pub mod error;
pub mod signature;
pub mod types;

pub use config::Config;
pub use error::{PersistenceError, TransportError};
pub use signature::{normalize, Signature};
pub use types::*;
