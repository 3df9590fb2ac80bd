//! Error types shared across all relay crates.

/// Errors that can occur across the relay runtime.
///
/// Each variant corresponds to a different subsystem: the permission
/// store, the config collaborator, the message transport, or plugin
/// loading.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("permission store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("plugin load error: {0}")]
    Load(String),
}
