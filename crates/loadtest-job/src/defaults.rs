//! Operator-wide defaults for worker Jobs

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::labels::LabelScheme;
use crate::resources::ResourceList;

/// Image used when a LoadTest does not set one
pub const DEFAULT_WORKER_IMAGE: &str = "artilleryio/artillery:latest";

/// Worker arguments used when a LoadTest does not set any
pub const DEFAULT_WORKER_ARGS: &[&str] = &["help"];

/// Defaults applied to every worker Job.
///
/// Built once at startup and shared by all reconciliations; tests construct
/// their own to override individual values.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkerDefaults {
    /// Worker container image
    pub image: String,
    /// Worker process arguments
    pub args: Vec<String>,
    /// Resource limits
    pub limits: ResourceList,
    /// Resource requests
    pub requests: ResourceList,
    /// Label scheme for Jobs and pods
    pub labels: LabelScheme,
}

impl Default for WorkerDefaults {
    fn default() -> Self {
        Self {
            image: DEFAULT_WORKER_IMAGE.to_string(),
            args: DEFAULT_WORKER_ARGS.iter().map(|a| a.to_string()).collect(),
            limits: quantities(&[("cpu", "2"), ("memory", "4Gi")]),
            requests: quantities(&[("cpu", "2"), ("memory", "2Gi")]),
            labels: LabelScheme::default(),
        }
    }
}

impl WorkerDefaults {
    /// Replace the default worker image
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Replace the label scheme
    pub fn with_labels(mut self, labels: LabelScheme) -> Self {
        self.labels = labels;
        self
    }
}

fn quantities(entries: &[(&str, &str)]) -> ResourceList {
    entries
        .iter()
        .map(|(name, qty)| (name.to_string(), Quantity(qty.to_string())))
        .collect()
}
