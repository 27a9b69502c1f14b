//! Shared types for the LoadTest operator: the `LoadTest` CRD, Kubernetes
//! Event publishing, and process telemetry.

#![deny(missing_docs)]

pub mod crd;
pub mod events;
pub mod telemetry;

/// Field manager used for server-side apply and status patches
pub const FIELD_MANAGER: &str = "loadtest-operator";

/// Controller name reported on Kubernetes Events
pub const CONTROLLER_NAME: &str = "loadtest-controller";
