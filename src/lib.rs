//! Publish release artifacts to blob storage buckets.
//!
//! A run resolves each configured target, opens a bucket handle through a
//! [`backend::BlobConnector`], and uploads every eligible artifact under the
//! target's folder. Failures are collected per target and per artifact and
//! returned together once everything that could run has run.

pub mod artifact;
pub mod backend;
pub mod config;
pub mod error;
pub mod key;
pub mod publish;
pub mod target;
pub mod template;
pub mod types;

pub use error::{AggregateError, PublishError};
pub use publish::{CancelSignal, PublishSummary, Publisher, TargetReport, TargetState};
