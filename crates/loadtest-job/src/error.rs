//! LoadTest reconciliation errors

/// Errors surfaced to the controller for retry scheduling.
///
/// A missing Job is not an error: it is the signal to create one.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The LoadTest (or the Job built from it) has no namespace
    #[error("missing namespace on LoadTest")]
    MissingNamespace,

    /// Looking up the worker Job failed for a reason other than not-found
    #[error("failed to look up job {namespace}/{name}: {source}")]
    Lookup {
        /// Job namespace
        namespace: String,
        /// Job name
        name: String,
        /// Underlying API error
        #[source]
        source: kube::Error,
    },

    /// The API server rejected the worker Job
    #[error("failed to create job {namespace}/{name}: {source}")]
    Submission {
        /// Job namespace
        namespace: String,
        /// Job name
        name: String,
        /// Underlying API error
        #[source]
        source: kube::Error,
    },

    /// Patching the LoadTest status subresource failed
    #[error("failed to update status of LoadTest {namespace}/{name}: {source}")]
    Status {
        /// LoadTest namespace
        namespace: String,
        /// LoadTest name
        name: String,
        /// Underlying API error
        #[source]
        source: kube::Error,
    },

    /// Shutdown fired before the reconciliation finished
    #[error("reconciliation cancelled")]
    Cancelled,
}
