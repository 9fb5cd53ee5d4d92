#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::perf,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
//! structured brute-force orchestration for authenticated http endpoints
//!
//! siegeline enumerates combinations of candidate values across request
//! fields (wordlists, generated character sequences, constants, counters),
//! fires each combination under a bounded worker pool, classifies every
//! response against configurable success criteria, requeues transient
//! transport failures, and transparently rotates an authentication
//! credential when failures accumulate.

pub mod auth;
pub mod classifier;
pub mod corpora;
pub mod error;
pub mod executor;
pub mod generator;
pub mod params;
pub mod payload;
pub mod prelude;
pub mod responses;
pub mod scheduler;
pub mod sink;
pub mod statistics;

/// Wrapper around `Atomic*.load` to save me from writing `Ordering::SeqCst` a bajillion times
#[macro_export]
macro_rules! atomic_load {
    ($atomic:expr) => {
        $atomic.load(std::sync::atomic::Ordering::SeqCst)
    };
    ($atomic:expr, $ordering:expr) => {
        $atomic.load($ordering)
    };
}

/// Wrapper around `Atomic*.store` to save me from writing `Ordering::SeqCst` a bajillion times
#[macro_export]
macro_rules! atomic_store {
    ($atomic:expr, $value:expr) => {
        $atomic.store($value, std::sync::atomic::Ordering::SeqCst);
    };
    ($atomic:expr, $value:expr, $ordering:expr) => {
        $atomic.store($value, $ordering);
    };
}
