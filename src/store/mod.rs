//! State Store Module
//!
//! Owns the run-metadata document for the lifetime of one process:
//! - load-or-create with one-time seed generation
//! - run number and timestamp bookkeeping
//! - per-test outcome records
//! - the strike ledger and the ignore list

mod run_store;

pub use run_store::RunStore;
