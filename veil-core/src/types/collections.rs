//! Hash-collection aliases. `FxHashMap`/`FxHashSet` are deterministic-speed
//! maps for internal indices; anything whose iteration order reaches output
//! must be sorted first.

pub use rustc_hash::{FxHashMap, FxHashSet};
