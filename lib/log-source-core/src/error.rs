//! Error taxonomy for the core.
//!
//! Grounded in `vector-common`'s `snafu`-based error enums. Only the genuinely
//! exceptional control-flow cases show up here: a transient downstream fault, an
//! aborted batch and a persistence failure are ordinary
//! [`crate::ack_tracker::AckType`] values and best-effort logged failures
//! respectively, not `Result`s. `ProgrammerError` cases use `panic!`/`assert!` at the
//! point of violation -- tracker invariants are not recoverable -- and the variant
//! here exists so a caller building its own configuration validation on top of this
//! crate has a single error type to convert into, not because the core itself
//! constructs it outside of config validation.

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CoreError {
    /// A [`crate::options::LogSourceOptions`] combination that can be rejected before
    /// anything starts, e.g. a zero initial window size.
    #[snafu(display("invalid log source configuration: {reason}"))]
    Configuration { reason: String },

    /// Reserved for callers that want to surface a tracker invariant violation as a
    /// `Result` rather than letting the core's own panic propagate.
    #[snafu(display("log source programmer error: {reason}"))]
    ProgrammerError { reason: String },
}
