//! Error definitions shared across library modules.
//! RF-link degradation is never an error here (it is absorbed into
//! statistics); these types cover integration defects and bus failures.
use thiserror_no_std::Error;

#[derive(Error, Debug, PartialEq, Eq)]
/// Errors detected while constructing the link worker.
pub enum InitError {
    /// A second worker was instantiated while one is already registered.
    /// Only one task may own the radio chip; this is a wiring defect in
    /// the integrating firmware, not a runtime condition.
    #[error("link worker already instantiated")]
    WorkerAlreadyRunning,
}

#[derive(Error, Debug)]
/// Errors escaping the worker loop.
pub enum LinkError<E: core::fmt::Debug> {
    /// The radio chip driver reported a bus failure.
    #[error("radio chip bus error: {0:?}")]
    Chip(E),
}

impl<E: core::fmt::Debug> From<E> for LinkError<E> {
    fn from(err: E) -> Self {
        LinkError::Chip(err)
    }
}
