//! [`Statistics`] is the primary data container for everything counted
//! during a run
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::time::Instant;

use serde::Serialize;

use crate::error::TransportErrorKind;

/// the engine's tracked statistics
///
/// updated only from the scheduler's completion handler, so no internal
/// synchronization is needed
#[derive(Serialize, Default, Debug, Clone)]
pub struct Statistics {
    /// total number of requests sent, requeues included
    requests: u64,

    /// number of attempts classified as successful
    successes: u64,

    /// number of attempts classified as failed, abandoned payloads included
    failures: u64,

    /// number of transport-errored attempts that were resubmitted
    requeues: u64,

    /// number of payloads permanently given up on after exhausting their
    /// requeue budget
    abandoned: u64,

    /// number of credential rotations performed after startup
    rotations: u64,

    /// tracker for number of timeouts seen by the client
    timeouts: u64,

    /// tracker for number of errors related to connecting
    connection_errors: u64,

    /// tracker for transport errors that weren't timeouts or connection
    /// failures
    other_errors: u64,

    /// tracker for overall number of each status code seen by the client
    statuses: HashMap<u16, u64>,

    /// total number of seconds the run took, set once when the run completes
    elapsed: f64,

    #[serde(skip)]
    start: Option<Instant>,
}

impl Statistics {
    /// create a new default instance of `Statistics`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn mark_start(&mut self) {
        self.start = Some(Instant::now());
    }

    pub(crate) fn finalize(&mut self) {
        if let Some(start) = self.start {
            self.elapsed = start.elapsed().as_secs_f64();
        }
    }

    pub(crate) fn increment_requests(&mut self) {
        self.requests += 1;
    }

    pub(crate) fn increment_successes(&mut self) {
        self.successes += 1;
    }

    pub(crate) fn increment_failures(&mut self) {
        self.failures += 1;
    }

    pub(crate) fn increment_requeues(&mut self) {
        self.requeues += 1;
    }

    pub(crate) fn increment_abandoned(&mut self) {
        self.abandoned += 1;
    }

    pub(crate) fn increment_rotations(&mut self) {
        self.rotations += 1;
    }

    /// bucket a transport error by its kind
    pub(crate) fn update_from_error(&mut self, kind: TransportErrorKind) {
        match kind {
            TransportErrorKind::Timeout => self.timeouts += 1,
            TransportErrorKind::Connect => self.connection_errors += 1,
            _ => self.other_errors += 1,
        }
    }

    /// record a received status code
    pub(crate) fn update_from_status(&mut self, status: u16) {
        *self.statuses.entry(status).or_insert(0) += 1;
    }

    /// total number of requests sent, requeues included
    #[must_use]
    pub const fn requests(&self) -> u64 {
        self.requests
    }

    /// number of attempts classified as successful
    #[must_use]
    pub const fn successes(&self) -> u64 {
        self.successes
    }

    /// number of attempts classified as failed, abandoned payloads included
    #[must_use]
    pub const fn failures(&self) -> u64 {
        self.failures
    }

    /// number of transport-errored attempts that were resubmitted
    #[must_use]
    pub const fn requeues(&self) -> u64 {
        self.requeues
    }

    /// number of payloads permanently abandoned
    #[must_use]
    pub const fn abandoned(&self) -> u64 {
        self.abandoned
    }

    /// number of credential rotations performed after startup
    #[must_use]
    pub const fn rotations(&self) -> u64 {
        self.rotations
    }

    /// number of timed-out requests
    #[must_use]
    pub const fn timeouts(&self) -> u64 {
        self.timeouts
    }

    /// number of connection-level failures
    #[must_use]
    pub const fn connection_errors(&self) -> u64 {
        self.connection_errors
    }

    /// how many times each status code was seen
    #[must_use]
    pub const fn statuses(&self) -> &HashMap<u16, u64> {
        &self.statuses
    }

    /// total number of seconds the run took
    #[must_use]
    pub const fn elapsed(&self) -> f64 {
        self.elapsed
    }
}

impl Display for Statistics {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "requests={} successes={} failures={} requeues={} abandoned={} rotations={} elapsed={:.2}s",
            self.requests,
            self.successes,
            self.failures,
            self.requeues,
            self.abandoned,
            self.rotations,
            self.elapsed
        )
    }
}
