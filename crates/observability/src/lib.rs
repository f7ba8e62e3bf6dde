//! Tracing and logging setup shared by the binaries.

/// Initialize process-wide tracing from `RUST_LOG` / `LOG_FORMAT`.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() -> Result<(), tracing::ConfigError> {
    let config = tracing::TracingConfig::from_env()?;
    tracing::init(&config);
    Ok(())
}

/// Tracing configuration (filters, output format).
pub mod tracing;
