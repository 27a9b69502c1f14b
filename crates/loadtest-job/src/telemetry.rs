//! Telemetry settings forwarded to worker processes

use k8s_openapi::api::core::v1::EnvVar;

/// Worker env var that turns off anonymous usage telemetry
pub const DISABLE_TELEMETRY_ENV: &str = "ARTILLERY_DISABLE_TELEMETRY";

/// Worker env var that makes telemetry log what it sends
pub const TELEMETRY_DEBUG_ENV: &str = "ARTILLERY_TELEMETRY_DEBUG";

/// Telemetry configuration of the operator process, passed on to every worker
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerTelemetry {
    /// Disable worker telemetry
    pub disabled: bool,
    /// Enable telemetry debug output
    pub debug: bool,
}

impl WorkerTelemetry {
    /// Environment entries appended to each worker container, in a fixed order
    pub fn env_vars(&self) -> Vec<EnvVar> {
        vec![
            EnvVar {
                name: DISABLE_TELEMETRY_ENV.to_string(),
                value: Some(self.disabled.to_string()),
                ..Default::default()
            },
            EnvVar {
                name: TELEMETRY_DEBUG_ENV.to_string(),
                value: Some(self.debug.to_string()),
                ..Default::default()
            },
        ]
    }
}
