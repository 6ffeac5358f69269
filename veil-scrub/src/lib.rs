//! # veil-scrub
//!
//! The scrubbing engine: turns a patient's identifying values into compiled
//! rewrite rules and applies them to free text, together with the run-wide
//! nonspecific rules and the per-column alter pipeline.

pub mod alter;
pub mod builder;
pub mod dates;
pub mod fuzzy;
pub mod html;
pub mod nonspecific;
pub mod patterns;
pub mod scrubber;
pub mod wordlist;

pub use alter::{AlterContext, AlterResult};
pub use builder::{BuiltScrubber, ScrubberBuilder};
pub use nonspecific::NonspecificScrubber;
pub use scrubber::{ScrubRule, Scrubber};
