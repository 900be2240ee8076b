//! Data model and error taxonomy shared by the ptest-runner crates.

pub mod error;
pub mod types;

pub use error::PtestError;
pub use types::{CaseResult, FileIdentity, Registry, RunOptions, SuiteResult, Test};
