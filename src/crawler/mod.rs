//! Crawler module: dispatch, units of work and checkpointing
//!
//! This module contains the core crawling logic, including:
//! - The dispatcher control loop and its concurrency budget
//! - Units of work with escalation from the local to the remote fetch path
//! - Retry backoff
//! - Background and final checkpoints

mod backoff;
mod checkpoint;
mod dispatcher;
mod unit;

pub use backoff::RetryBackoff;
pub use checkpoint::Checkpointer;
pub use dispatcher::{Dispatcher, RunOutcome, RunProgress};
pub use unit::{
    digest, run_unit, UnitContext, UnitError, UnitRequest, UnitSuccess, EXTRACTION_ATTEMPT_CAP,
};
