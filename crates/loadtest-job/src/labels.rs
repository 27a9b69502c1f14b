//! Labels used to scope and select LoadTest workloads

use std::collections::BTreeMap;

/// Default label key prefix
pub const DEFAULT_LABEL_PREFIX: &str = "artillery.io";

/// Default value of the `part-of` label
pub const DEFAULT_PART_OF: &str = "loadtest";

/// Component label on the worker Job itself
pub const WORKER_MASTER_COMPONENT: &str = "loadtest-worker-master";

/// Component label on worker pods
pub const WORKER_COMPONENT: &str = "loadtest-worker";

/// Derives the `{test-name, component, part-of}` label set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelScheme {
    prefix: String,
    part_of: String,
}

impl Default for LabelScheme {
    fn default() -> Self {
        Self::new(DEFAULT_LABEL_PREFIX, DEFAULT_PART_OF)
    }
}

impl LabelScheme {
    /// Scheme with keys `<prefix>/...` and the given `part-of` value
    pub fn new(prefix: impl Into<String>, part_of: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            part_of: part_of.into(),
        }
    }

    /// Labels for the LoadTest named `test_name`
    pub fn labels(&self, test_name: &str, component: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (self.key("test-name"), test_name.to_string()),
            (self.key("component"), component.to_string()),
            (self.key("part-of"), self.part_of.clone()),
        ])
    }

    fn key(&self, name: &str) -> String {
        format!("{}/{}", self.prefix, name)
    }
}
