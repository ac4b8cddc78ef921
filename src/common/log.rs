//! Logging setup and phase banners.
//!
//! Everything logs through `tracing`; binaries call [`init`] once before
//! doing any work.

use tracing_subscriber::EnvFilter;

/// Output layout of the log stream.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, clap::ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human readable lines.
    Text,
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `default_level`. Calling this twice is harmless; the
/// second call is ignored.
pub fn init(default_level: &str, format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
}

/// Render the marker printed at phase boundaries.
pub fn banner_text(phase: &str) -> String {
    let rule = "=".repeat(10);
    format!("{rule}{phase}{rule}")
}

/// Emit a phase boundary marker such as `==========start training-job==========`.
pub fn banner(phase: &str) {
    tracing::info!(target: "banner", "{}", banner_text(phase));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_wraps_phase_in_rules() {
        assert_eq!(
            banner_text("start creating data"),
            "==========start creating data=========="
        );
    }
}
