//! Worker Job construction
//!
//! Builds the `batch/v1` Job that runs a LoadTest. The Job:
//! - Has the LoadTest's name and namespace (one Job per LoadTest)
//! - Runs `count` indexed completions in parallel (at least one)
//! - Never retries: `backoffLimit: 0`, `restartPolicy: Never`
//! - Is owned by the LoadTest, so deleting the LoadTest deletes the Job

use k8s_openapi::api::batch::v1::{Job, JobCondition, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvFromSource, EnvVar, EnvVarSource, ObjectFieldSelector, PodSpec,
    PodTemplateSpec, SecretEnvSource, SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use tracing::{error, warn};

use loadtest_common::crd::{LoadTest, LoadTestPhase, LoadTestStatus};

use crate::defaults::WorkerDefaults;
use crate::labels::{WORKER_COMPONENT, WORKER_MASTER_COMPONENT};
use crate::resources::worker_requirements;
use crate::telemetry::WorkerTelemetry;

/// Env var carrying the worker pod's own name (used as the metrics job id)
pub const WORKER_ID_ENV: &str = "WORKER_ID";

/// Env var pointing at the users payload inside the secret mount
pub const USERS_PAYLOAD_PATH_ENV: &str = "USERS_PAYLOAD_PATH";

/// Downward API field resolved to the pod name at start-up
const POD_NAME_FIELD: &str = "metadata.name";

/// Build the worker Job for a LoadTest.
///
/// Pure apart from logging: the same LoadTest always yields the same Job.
/// A secret mount without a users file is logged and still produces a Job,
/// with `USERS_PAYLOAD_PATH` pointing at the mount directory.
pub fn build_job(
    load_test: &LoadTest,
    defaults: &WorkerDefaults,
    telemetry: &WorkerTelemetry,
) -> Job {
    let name = load_test.name_any();
    let spec = &load_test.spec;
    let workers = spec.worker_count();

    let resources = worker_requirements(
        spec.resources.as_ref(),
        &defaults.limits,
        &defaults.requests,
    );

    let image = spec
        .image
        .as_deref()
        .filter(|image| !image.is_empty())
        .unwrap_or(defaults.image.as_str())
        .to_string();

    let args = spec
        .args
        .clone()
        .filter(|args| !args.is_empty())
        .unwrap_or_else(|| defaults.args.clone());

    let mut env = vec![worker_id_env()];
    env.extend(telemetry.env_vars());

    let env_from = spec
        .secret_env_source
        .as_deref()
        .filter(|secret| !secret.is_empty())
        .map(|secret| {
            vec![EnvFromSource {
                secret_ref: Some(SecretEnvSource {
                    name: secret.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }]
        });

    let mut volumes = Vec::new();
    let mut volume_mounts = Vec::new();
    if let Some(mount) = &spec.secret_mount {
        if spec.missing_users_file() {
            error!(
                load_test = %name,
                secret = %mount.name,
                "usersFile must be set when secretMount is used"
            );
        }
        let users_file = spec.users_file.as_deref().unwrap_or_default();

        volumes.push(Volume {
            name: mount.name.clone(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(mount.name.clone()),
                ..Default::default()
            }),
            ..Default::default()
        });
        volume_mounts.push(VolumeMount {
            name: mount.name.clone(),
            mount_path: mount.mount_point.clone(),
            ..Default::default()
        });
        env.push(EnvVar {
            name: USERS_PAYLOAD_PATH_ENV.to_string(),
            value: Some(format!("{}/{}", mount.mount_point, users_file)),
            ..Default::default()
        });
    }

    let container = Container {
        name: name.clone(),
        image: Some(image),
        image_pull_policy: Some("IfNotPresent".to_string()),
        resources: Some(resources),
        args: Some(args),
        env: Some(env),
        env_from,
        volume_mounts: Some(volume_mounts),
        ..Default::default()
    };

    Job {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: load_test.namespace(),
            labels: Some(defaults.labels.labels(&name, WORKER_MASTER_COMPONENT)),
            owner_references: owner_reference(load_test).map(|r| vec![r]),
            ..Default::default()
        },
        spec: Some(JobSpec {
            parallelism: Some(workers),
            completions: Some(workers),
            completion_mode: Some("Indexed".to_string()),
            backoff_limit: Some(0),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(defaults.labels.labels(&name, WORKER_COMPONENT)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    restart_policy: Some("Never".to_string()),
                    volumes: Some(volumes),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn worker_id_env() -> EnvVar {
    EnvVar {
        name: WORKER_ID_ENV.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: POD_NAME_FIELD.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Controller owner reference to the LoadTest.
///
/// Best effort: a LoadTest that has not been persisted yet has no uid, in
/// which case the Job is built without an owner.
fn owner_reference(load_test: &LoadTest) -> Option<OwnerReference> {
    match load_test.controller_owner_ref(&()) {
        Some(mut owner) => {
            owner.block_owner_deletion = Some(true);
            Some(owner)
        }
        None => {
            warn!(
                load_test = %load_test.name_any(),
                "LoadTest has no uid, building Job without owner reference"
            );
            None
        }
    }
}

// =============================================================================
// Job status helpers
// =============================================================================

/// The Job condition of `type_` whose status is `"True"`, if any
fn true_condition<'a>(job: &'a Job, type_: &str) -> Option<&'a JobCondition> {
    job.status
        .as_ref()?
        .conditions
        .as_ref()?
        .iter()
        .find(|c| c.type_ == type_ && c.status == "True")
}

/// Derive the LoadTest status from its worker Job
pub fn load_test_status(job: &Job, observed_generation: Option<i64>) -> LoadTestStatus {
    let status = job.status.clone().unwrap_or_default();
    let active = status.active.unwrap_or(0);

    let failed = true_condition(job, "Failed");
    let phase = if true_condition(job, "Complete").is_some() {
        LoadTestPhase::Completed
    } else if failed.is_some() {
        LoadTestPhase::Failed
    } else if active > 0 {
        LoadTestPhase::Running
    } else {
        LoadTestPhase::Pending
    };

    LoadTestStatus {
        message: failed.and_then(|c| c.message.clone()),
        phase,
        active,
        succeeded: status.succeeded.unwrap_or(0),
        failed: status.failed.unwrap_or(0),
        start_time: status.start_time.map(|t| t.0),
        completion_time: status.completion_time.map(|t| t.0),
        observed_generation,
    }
}
