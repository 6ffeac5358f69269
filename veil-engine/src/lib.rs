//! # veil-engine
//!
//! The orchestrator: drives a full or incremental de-identification run
//! across N shared-nothing workers, enforcing the incremental row-hash
//! protocol, scrubber change detection, and opt-out propagation.

pub mod cancel;
pub mod ddl;
pub mod introspect;
pub mod optout;
pub mod orchestrator;
pub mod partition;
pub mod patient;
pub mod retry;
pub mod worker;

pub use cancel::Cancellation;
pub use orchestrator::{Orchestrator, RunMode};
