//! Fixed-seed hash containers.
//!
//! `FixedHashState` is based on the `foldhash` crate with a fixed seed, so
//! hash results only depend on the input. Registry tables use it to keep
//! iteration and diagnostics stable across runs.

use core::hash::BuildHasher;

use foldhash::fast::{FixedState, FoldHasher};

// -----------------------------------------------------------------------------
// FixedHasher

/// A fixed hash seed.
const FIXED_HASH_STATE: FixedState = FixedState::with_seed(0xC1F6_B0E7_24D3_9A55);

/// A hasher whose results depend only on the input.
///
/// A type alias for [`foldhash::fast::FoldHasher`].
pub type FixedHasher = FoldHasher<'static>;

/// Hash state based upon a random but fixed seed.
#[derive(Copy, Clone, Default, Debug)]
pub struct FixedHashState;

impl BuildHasher for FixedHashState {
    type Hasher = FixedHasher;

    #[inline(always)]
    fn build_hasher(&self) -> Self::Hasher {
        FIXED_HASH_STATE.build_hasher()
    }
}

// -----------------------------------------------------------------------------
// Containers

/// A [`hashbrown::HashMap`] with a fixed hash seed.
pub type HashMap<K, V> = hashbrown::HashMap<K, V, FixedHashState>;

/// A [`hashbrown::HashSet`] with a fixed hash seed.
pub type HashSet<T> = hashbrown::HashSet<T, FixedHashState>;

/// Creates an empty [`HashMap`].
#[inline]
pub const fn new_map<K, V>() -> HashMap<K, V> {
    HashMap::with_hasher(FixedHashState)
}

/// Creates an empty [`HashSet`].
#[inline]
pub const fn new_set<T>() -> HashSet<T> {
    HashSet::with_hasher(FixedHashState)
}
