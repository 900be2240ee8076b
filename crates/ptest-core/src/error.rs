#[derive(thiserror::Error, Debug)]
pub enum PtestError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("ptest not found: {0}")]
    NotFound(String),

    #[error("I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("failed to spawn child for '{0}': {1}")]
    ChildSpawnFailure(String, String),
}
