//! Controller wiring for the LoadTest operator

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use loadtest_common::crd::LoadTest;
use loadtest_job::{error_policy, reconcile, LoadTestContext};

/// Watch timeout, kept below the API server's default request timeout
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Run the LoadTest controller until shutdown.
///
/// Owned Jobs are watched so that worker progress retriggers reconciliation of
/// the parent LoadTest.
pub async fn run_load_test_controller(client: Client, ctx: Arc<LoadTestContext>) {
    let load_tests: Api<LoadTest> = Api::all(client.clone());
    let jobs: Api<Job> = Api::all(client);

    Controller::new(
        load_tests,
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
    )
    .owns(jobs, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
    .shutdown_on_signal()
    .run(reconcile, error_policy, ctx)
    .for_each(log_reconcile_result("LoadTest"))
    .await;
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
