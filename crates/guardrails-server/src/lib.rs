//! Guardrails Server
//!
//! HTTP front end for the Guardrails DLP engine: scanning, rule and
//! suggestion management, policy pack installation and read access to
//! the violation ledger.

pub mod cli;
pub mod config;
pub mod error;
pub mod org;
pub mod routes;
pub mod scan;
pub mod state;

pub use cli::Cli;
pub use config::ServerConfig;
pub use error::AppError;
pub use routes::create_router;
pub use state::AppState;
