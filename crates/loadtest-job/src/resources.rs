//! Worker resource limits/requests
//!
//! A LoadTest may override individual resource keys; every key it leaves out
//! keeps the operator default.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use loadtest_common::crd::ResourceOverrides;

/// Resource name → quantity, as used by `ResourceRequirements`
pub type ResourceList = BTreeMap<String, Quantity>;

/// Merge `src` into `dest` without touching keys already present in `dest`.
///
/// - both absent or empty → `None`
/// - `dest` absent or empty → a copy of `src`
/// - otherwise `dest` plus every key of `src` it did not already have
pub fn merge_preserving_existing(
    dest: Option<ResourceList>,
    src: Option<&ResourceList>,
) -> Option<ResourceList> {
    let src = src.filter(|s| !s.is_empty());
    let mut dest = match (dest.filter(|d| !d.is_empty()), src) {
        (None, None) => return None,
        (None, Some(src)) => return Some(src.clone()),
        (Some(dest), _) => dest,
    };

    for (key, quantity) in src.into_iter().flatten() {
        dest.entry(key.clone()).or_insert_with(|| quantity.clone());
    }
    Some(dest)
}

/// Resolve the worker container's requirements from the defaults and an
/// optional partial override. Limits and requests are merged independently.
pub fn worker_requirements(
    overrides: Option<&ResourceOverrides>,
    default_limits: &ResourceList,
    default_requests: &ResourceList,
) -> ResourceRequirements {
    let limits = overrides.and_then(|o| o.limits.clone());
    let requests = overrides.and_then(|o| o.requests.clone());

    ResourceRequirements {
        limits: merge_preserving_existing(limits, Some(default_limits)),
        requests: merge_preserving_existing(requests, Some(default_requests)),
        ..Default::default()
    }
}
