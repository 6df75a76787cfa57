//! Error kinds surfaced by the simulation core.

use thiserror::Error;

use super::config::ConfigError;

/// Fatal simulation errors. There are no recoverable per-kernel errors;
/// any failure aborts the whole sub-step.
#[derive(Debug, Error)]
pub enum SimError {
    /// Init-time invariant violated; surfaced to the caller.
    #[error("invalid simulation config: {0}")]
    Config(#[from] ConfigError),

    /// GPU allocation or device request failed.
    #[error("GPU resource request failed: {0}")]
    Resource(String),

    /// The backend reported device loss during submit or read-back. The
    /// host tears the scene down and rebuilds.
    #[error("GPU device lost")]
    DeviceLost,
}
