//! Small internal utilities shared across the crate.

pub mod hash;

pub use hash::{new_map, new_set, FixedHashState, HashMap, HashSet};
