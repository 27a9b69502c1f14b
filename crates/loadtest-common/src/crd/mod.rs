//! Custom Resource Definitions for the LoadTest operator

mod load_test;

pub use load_test::{
    LoadTest, LoadTestPhase, LoadTestSpec, LoadTestStatus, ResourceOverrides, SecretMount,
};
