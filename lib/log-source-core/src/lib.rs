//! Source-side ack tracking, flow control and bookmark persistence for a
//! log-collection pipeline.
//!
//! This crate is the reusable core behind a single log source: it owns the
//! flow-control admission window, the three ack-tracker variants and their
//! bookmark-persistence contract, and the mangle-then-forward ingestion path a
//! transport drives. Everything it talks to on either side -- the transport, the
//! downstream pipe, the persistent-state backend, the host resolver -- is an
//! external collaborator, modelled as a trait rather than a concrete dependency.

pub mod ack_tracker;
pub mod bookmark;
pub mod error;
pub mod internal_events;
pub mod options;
pub mod source;
pub mod stats;
pub mod window;

pub use ack_tracker::{AckHandle, AckTracker, AckType};
pub use bookmark::Bookmark;
pub use error::CoreError;
pub use internal_events::{NoopInternalEvents, SourceInternalEvents, TracingInternalEvents};
pub use options::{AckTrackingPolicy, ConfigDefaults, LogSourceOptions, LogSourceOptionsBuilder, StatsLevel};
pub use source::{HostResolver, IngestedRecord, LogSourceCore, Pipe, QueueCallback};
pub use window::FlowControlWindow;
