//! LoadTest CRD types
//!
//! Defines `LoadTest`, a declarative load test that runs `count` parallel
//! worker pods once. The operator turns each LoadTest into a single
//! `batch/v1` Job of the same name and namespace.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// Phase
// =============================================================================

/// Lifecycle phase of a LoadTest, mirrored from its worker Job
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum LoadTestPhase {
    /// Job created, no worker running yet
    #[default]
    Pending,
    /// At least one worker pod is active
    Running,
    /// Every worker index completed
    Completed,
    /// The Job failed (workers are never retried)
    Failed,
}

impl std::fmt::Display for LoadTestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// Spec building blocks
// =============================================================================

/// Partial resource override for the worker container.
///
/// Only the keys given here replace the operator defaults; anything missing
/// falls back to the default limits/requests.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceOverrides {
    /// Resource limits keyed by resource name (e.g. `cpu`, `memory`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<BTreeMap<String, Quantity>>,

    /// Resource requests keyed by resource name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<BTreeMap<String, Quantity>>,
}

/// A Secret mounted into every worker as a volume
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretMount {
    /// Name of the Secret (also used as the volume name)
    pub name: String,

    /// Directory the Secret is mounted at
    pub mount_point: String,
}

// =============================================================================
// CRD
// =============================================================================

/// Load test run by a fixed number of parallel workers
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "loadtest.artillery.io",
    version = "v1alpha1",
    kind = "LoadTest",
    plural = "loadtests",
    shortname = "lt",
    namespaced,
    status = "LoadTestStatus",
    printcolumn = r#"{"name":"Workers","type":"integer","jsonPath":".spec.count"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Active","type":"integer","jsonPath":".status.active"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct LoadTestSpec {
    /// Number of parallel workers. Zero or unset runs a single worker.
    #[serde(default)]
    #[schemars(range(min = 0))]
    pub count: i32,

    /// Worker image override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Arguments passed to the worker process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,

    /// Partial override of the worker resource limits/requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceOverrides>,

    /// Secret whose keys are exposed to workers as environment variables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_env_source: Option<String>,

    /// Secret mounted into workers as a volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_mount: Option<SecretMount>,

    /// File inside `secretMount` holding the virtual-user payload.
    /// Expected whenever `secretMount` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users_file: Option<String>,
}

impl LoadTestSpec {
    /// Worker parallelism: `count` when positive, otherwise 1
    pub fn worker_count(&self) -> i32 {
        if self.count > 0 {
            self.count
        } else {
            1
        }
    }

    /// True when a secret mount is requested without a users file
    pub fn missing_users_file(&self) -> bool {
        self.secret_mount.is_some() && self.users_file.as_deref().unwrap_or_default().is_empty()
    }
}

/// Status of a LoadTest, derived from its worker Job
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoadTestStatus {
    /// Current phase
    #[serde(default)]
    pub phase: LoadTestPhase,

    /// Worker pods currently running
    #[serde(default)]
    pub active: i32,

    /// Worker indexes that completed successfully
    #[serde(default)]
    pub succeeded: i32,

    /// Worker pods that failed
    #[serde(default)]
    pub failed: i32,

    /// When the Job started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    /// When the Job completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,

    /// Failure message reported by the Job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Generation of the LoadTest this status was computed for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn worker_count_defaults_to_one() {
        let spec = LoadTestSpec::default();
        assert_eq!(spec.worker_count(), 1);

        let spec = LoadTestSpec {
            count: -4,
            ..Default::default()
        };
        assert_eq!(spec.worker_count(), 1);
    }

    #[test]
    fn worker_count_uses_positive_count() {
        let spec = LoadTestSpec {
            count: 7,
            ..Default::default()
        };
        assert_eq!(spec.worker_count(), 7);
    }

    #[test]
    fn missing_users_file_only_with_secret_mount() {
        let mut spec = LoadTestSpec::default();
        assert!(!spec.missing_users_file());

        spec.secret_mount = Some(SecretMount {
            name: "creds".to_string(),
            mount_point: "/data".to_string(),
        });
        assert!(spec.missing_users_file());

        spec.users_file = Some(String::new());
        assert!(spec.missing_users_file());

        spec.users_file = Some("users.csv".to_string());
        assert!(!spec.missing_users_file());
    }

    #[test]
    fn spec_deserializes_camel_case_fields() {
        let json = serde_json::json!({
            "count": 3,
            "image": "artilleryio/artillery:2.0",
            "args": ["run", "/data/test.yaml"],
            "resources": { "limits": { "memory": "8Gi" } },
            "secretEnvSource": "api-keys",
            "secretMount": { "name": "creds", "mountPoint": "/data" },
            "usersFile": "users.csv"
        });
        let spec: LoadTestSpec = serde_json::from_value(json).unwrap();

        assert_eq!(spec.count, 3);
        assert_eq!(spec.args.as_ref().unwrap().len(), 2);
        assert_eq!(spec.secret_env_source.as_deref(), Some("api-keys"));
        assert_eq!(spec.secret_mount.as_ref().unwrap().mount_point, "/data");
        let limits = spec.resources.unwrap().limits.unwrap();
        assert_eq!(limits.get("memory"), Some(&Quantity("8Gi".to_string())));
    }

    #[test]
    fn empty_spec_deserializes_with_defaults() {
        let spec: LoadTestSpec = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(spec, LoadTestSpec::default());
    }

    #[test]
    fn status_omits_unset_optionals() {
        let value = serde_json::to_value(LoadTestStatus::default()).unwrap();
        assert_eq!(value["phase"], "Pending");
        assert!(value.get("startTime").is_none());
        assert!(value.get("message").is_none());
    }

    #[test]
    fn crd_metadata() {
        let crd = LoadTest::crd();
        assert_eq!(crd.metadata.name.as_deref(), Some("loadtests.loadtest.artillery.io"));
        assert_eq!(crd.spec.names.kind, "LoadTest");
        assert_eq!(crd.spec.scope, "Namespaced");
    }

    #[test]
    fn phase_display() {
        assert_eq!(LoadTestPhase::Completed.to_string(), "Completed");
        assert_eq!(LoadTestPhase::default().to_string(), "Pending");
    }
}
