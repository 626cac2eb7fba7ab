//! Credential providers for blob store backends

pub mod gcp;

pub use gcp::GcpCredentials;
