//! Filesystem discovery of package tests and name-based filtering.

mod discover;
mod filter;

pub use discover::discover;
pub use filter::{exclude, filter};
