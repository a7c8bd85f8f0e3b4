use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the framework's public entry points.
///
/// Failures inside jobs and timer callbacks never reach this type; they are
/// handled by the dispatcher's isolation policy instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid listen address `{0}`")]
    InvalidAddress(String),
}
