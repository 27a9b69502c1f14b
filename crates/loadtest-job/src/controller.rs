//! LoadTest controller implementation
//!
//! Each reconciliation builds the worker Job for a LoadTest and makes sure it
//! exists, then mirrors the Job's progress into the LoadTest status.
//!
//! Job existence is a get-then-create state machine:
//! - lookup finds nothing → `Absent` → create the Job, publish a `Created` event
//! - lookup finds the Job → `Present` → nothing to do
//! - lookup fails otherwise → error, the controller requeues
//!
//! A Job is never updated or deleted here; deletion cascades from the LoadTest
//! through the owner reference.
//!
//! The lookup and the create are two separate calls, so two reconciliations
//! racing for the same LoadTest can both observe `Absent`. The API server
//! rejects the second create with `409 AlreadyExists`, which is treated as
//! `Present`. kube-runtime never runs two reconciliations for the same object
//! at once, so this only happens across operator replicas.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

use loadtest_common::crd::{LoadTest, LoadTestPhase, LoadTestStatus};
use loadtest_common::events::{actions, reasons, EventPublisher, KubeEventPublisher};
use loadtest_common::{CONTROLLER_NAME, FIELD_MANAGER};

use crate::defaults::WorkerDefaults;
use crate::error::JobError;
use crate::job::{build_job, load_test_status};
use crate::telemetry::WorkerTelemetry;

/// Delay before retrying a failed reconciliation
const ERROR_REQUEUE_SECS: u64 = 30;

// =============================================================================
// Kubernetes access
// =============================================================================

/// Cluster operations needed to reconcile a LoadTest
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LoadTestKubeClient: Send + Sync {
    /// Get a Job by name; `Ok(None)` when it does not exist
    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>, kube::Error>;

    /// Create a Job, returning the object stored by the API server
    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job, kube::Error>;

    /// Merge-patch the status subresource of a LoadTest
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &LoadTestStatus,
    ) -> Result<(), kube::Error>;
}

/// Real Kubernetes client implementation
pub struct LoadTestKubeClientImpl {
    client: Client,
}

impl LoadTestKubeClientImpl {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LoadTestKubeClient for LoadTestKubeClientImpl {
    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>, kube::Error> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).await
    }

    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job, kube::Error> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        api.create(&params, job).await
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &LoadTestStatus,
    ) -> Result<(), kube::Error> {
        let api: Api<LoadTest> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({ "status": status });
        api.patch_status(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }
}

// =============================================================================
// Context
// =============================================================================

/// Shared context for the LoadTest controller
pub struct LoadTestContext {
    /// Cluster access
    pub kube: Arc<dyn LoadTestKubeClient>,
    /// Kubernetes Event sink
    pub events: Arc<dyn EventPublisher>,
    /// Image, args, resources and labels applied to every worker Job
    pub defaults: WorkerDefaults,
    /// Telemetry settings passed to workers
    pub telemetry: WorkerTelemetry,
    /// Fires on operator shutdown; in-flight cluster calls abort
    pub cancel: CancellationToken,
}

impl LoadTestContext {
    /// Context backed by a real client and event recorder
    pub fn new(
        client: Client,
        defaults: WorkerDefaults,
        telemetry: WorkerTelemetry,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            kube: Arc::new(LoadTestKubeClientImpl::new(client.clone())),
            events: Arc::new(KubeEventPublisher::new(client, CONTROLLER_NAME)),
            defaults,
            telemetry,
            cancel,
        }
    }

    #[cfg(test)]
    fn for_testing(kube: Arc<dyn LoadTestKubeClient>, events: Arc<dyn EventPublisher>) -> Self {
        Self {
            kube,
            events,
            defaults: WorkerDefaults::default(),
            telemetry: WorkerTelemetry::default(),
            cancel: CancellationToken::new(),
        }
    }
}

// =============================================================================
// Job existence state machine
// =============================================================================

/// Result of the existence lookup
#[derive(Debug)]
enum JobPresence {
    Absent,
    Present(Job),
}

/// Successful outcome of [`ensure_job`]
#[derive(Clone, Debug, PartialEq)]
pub enum EnsureOutcome {
    /// The Job did not exist and was created
    Created(Job),
    /// The Job already existed; nothing was submitted
    Present(Job),
    /// The Job was created concurrently between lookup and create
    AlreadyExists,
}

impl EnsureOutcome {
    /// The Job as last seen in the cluster, if known
    pub fn observed_job(&self) -> Option<&Job> {
        match self {
            Self::Created(job) | Self::Present(job) => Some(job),
            Self::AlreadyExists => None,
        }
    }
}

/// Run `fut` unless `cancel` fires first
async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, JobError>>,
) -> Result<T, JobError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(JobError::Cancelled),
        result = fut => result,
    }
}

fn is_already_exists(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists")
}

/// Ensure the worker Job for `load_test` exists, creating `job` if it does not.
///
/// Lookup and submission failures are returned unchanged for the controller
/// to retry; nothing is retried here.
pub async fn ensure_job(
    kube: &dyn LoadTestKubeClient,
    events: &dyn EventPublisher,
    load_test: &LoadTest,
    job: &Job,
    cancel: &CancellationToken,
) -> Result<EnsureOutcome, JobError> {
    let name = job.name_any();
    let namespace = job.namespace().ok_or(JobError::MissingNamespace)?;

    let presence = cancellable(cancel, async {
        match kube.get_job(&namespace, &name).await {
            Ok(Some(found)) => Ok(JobPresence::Present(found)),
            Ok(None) => Ok(JobPresence::Absent),
            Err(source) => Err(JobError::Lookup {
                namespace: namespace.clone(),
                name: name.clone(),
                source,
            }),
        }
    })
    .await?;

    match presence {
        JobPresence::Present(found) => {
            debug!(job = %name, namespace = %namespace, "Worker Job already exists");
            Ok(EnsureOutcome::Present(found))
        }
        JobPresence::Absent => {
            info!(job = %name, namespace = %namespace, "Creating worker Job");

            let created = cancellable(cancel, async {
                match kube.create_job(&namespace, job).await {
                    Ok(created) => Ok(Some(created)),
                    Err(e) if is_already_exists(&e) => Ok(None),
                    Err(source) => Err(JobError::Submission {
                        namespace: namespace.clone(),
                        name: name.clone(),
                        source,
                    }),
                }
            })
            .await?;

            let Some(created) = created else {
                info!(job = %name, namespace = %namespace, "Worker Job was created concurrently");
                return Ok(EnsureOutcome::AlreadyExists);
            };

            publish(
                events,
                load_test,
                EventType::Normal,
                reasons::CREATED,
                actions::CREATE,
                format!("Created Load Test worker master job: {}", name),
                cancel,
            )
            .await;

            Ok(EnsureOutcome::Created(created))
        }
    }
}

/// Publish an event unless shutdown is in progress
async fn publish(
    events: &dyn EventPublisher,
    load_test: &LoadTest,
    type_: EventType,
    reason: &str,
    action: &str,
    note: String,
    cancel: &CancellationToken,
) {
    let object_ref = load_test.object_ref(&());
    tokio::select! {
        biased;
        _ = cancel.cancelled() => debug!(reason, "Skipped event publish during shutdown"),
        _ = events.publish(&object_ref, type_, reason, action, Some(note)) => {}
    }
}

// =============================================================================
// Reconcile
// =============================================================================

/// Reconcile a LoadTest
pub async fn reconcile(
    load_test: Arc<LoadTest>,
    ctx: Arc<LoadTestContext>,
) -> Result<Action, JobError> {
    let name = load_test.name_any();
    let namespace = load_test.namespace().ok_or(JobError::MissingNamespace)?;

    info!(load_test = %name, namespace = %namespace, "Reconciling LoadTest");

    let job = build_job(&load_test, &ctx.defaults, &ctx.telemetry);
    let outcome = ensure_job(
        ctx.kube.as_ref(),
        ctx.events.as_ref(),
        &load_test,
        &job,
        &ctx.cancel,
    )
    .await?;

    if matches!(outcome, EnsureOutcome::Created(_)) && load_test.spec.missing_users_file() {
        publish(
            ctx.events.as_ref(),
            &load_test,
            EventType::Warning,
            reasons::MISSING_USERS_FILE,
            actions::CREATE,
            "secretMount is set without usersFile; USERS_PAYLOAD_PATH points at the mount directory"
                .to_string(),
            &ctx.cancel,
        )
        .await;
    }

    if let Some(observed) = outcome.observed_job() {
        sync_status(&load_test, &namespace, observed, &ctx).await?;
    }

    Ok(Action::await_change())
}

/// Patch the LoadTest status when the Job's progress changed it
async fn sync_status(
    load_test: &LoadTest,
    namespace: &str,
    job: &Job,
    ctx: &LoadTestContext,
) -> Result<(), JobError> {
    let name = load_test.name_any();
    let status = load_test_status(job, load_test.metadata.generation);
    let previous = load_test.status.as_ref();

    if previous == Some(&status) {
        return Ok(());
    }

    cancellable(&ctx.cancel, async {
        ctx.kube
            .patch_status(namespace, &name, &status)
            .await
            .map_err(|source| JobError::Status {
                namespace: namespace.to_string(),
                name: name.clone(),
                source,
            })
    })
    .await?;

    let previous_phase = previous.map(|s| s.phase.clone()).unwrap_or_default();
    if previous_phase != status.phase {
        info!(load_test = %name, from = %previous_phase, to = %status.phase, "LoadTest phase changed");
        match status.phase {
            LoadTestPhase::Completed => {
                publish(
                    ctx.events.as_ref(),
                    load_test,
                    EventType::Normal,
                    reasons::COMPLETED,
                    actions::RECONCILE,
                    format!("{} workers completed", status.succeeded),
                    &ctx.cancel,
                )
                .await;
            }
            LoadTestPhase::Failed => {
                publish(
                    ctx.events.as_ref(),
                    load_test,
                    EventType::Warning,
                    reasons::FAILED,
                    actions::RECONCILE,
                    status
                        .message
                        .clone()
                        .unwrap_or_else(|| "worker Job failed".to_string()),
                    &ctx.cancel,
                )
                .await;
            }
            LoadTestPhase::Pending | LoadTestPhase::Running => {}
        }
    }

    Ok(())
}

/// Error policy for the LoadTest controller.
///
/// Cluster errors requeue after 30 seconds; a cancelled reconciliation waits
/// for the next change.
pub fn error_policy(
    load_test: Arc<LoadTest>,
    error: &JobError,
    _ctx: Arc<LoadTestContext>,
) -> Action {
    match error {
        JobError::Cancelled => Action::await_change(),
        _ => {
            warn!(
                load_test = %load_test.name_any(),
                error = %error,
                "LoadTest reconcile error, will retry"
            );
            Action::requeue(Duration::from_secs(ERROR_REQUEUE_SECS))
        }
    }
}
