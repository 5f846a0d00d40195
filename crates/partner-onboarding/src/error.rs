use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::onboarding::OnboardingError;

/// Failure surfaced by the binaries: startup, serving, or a pipeline step run outside HTTP.
///
/// HTTP handlers never produce this type; they map [`OnboardingError`] through
/// `router::error_response` instead.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("onboarding step failed: {0}")]
    Onboarding(#[from] OnboardingError),
}
