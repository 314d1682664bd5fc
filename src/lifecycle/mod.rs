//! Lifecycle Controller Module
//!
//! The entry points the external test runner drives: suite start, per-test
//! events, and suite end. Sequences the store, the circuit breaker, the diff
//! engine, and the archive manager across one run, and guarantees the host
//! test process never sees a failure from any of them.

mod controller;
mod fatal;

pub use controller::RunLogger;
