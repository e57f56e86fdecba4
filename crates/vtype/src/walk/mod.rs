//! Structure walkers built on the typed object view.
//!
//! Every walker is a lazy iterator of `VtypeResult<Object>` that carries its
//! own termination bound, so corrupted or cyclic pointer graphs end a walk
//! instead of hanging it. Dropping a walker part way through needs no cleanup.

pub mod list;
pub mod radix;

use serde::{Deserialize, Serialize};

pub use list::{walk_list, walk_list_entry, ListEntryWalk, ListWalk};
pub use radix::{walk_radix, RadixFields, RadixWalk};

/// Termination bounds shared by the walkers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkLimits {
    /// Maximum number of list entries before a walk fails with `Traversal`.
    pub max_list_entries: usize,
    /// Maximum node visits (descent, ascent and chain steps) in one trie walk.
    pub max_trie_steps: usize,
}

impl Default for WalkLimits {
    fn default() -> Self {
        WalkLimits {
            max_list_entries: 65536,
            max_trie_steps: 1 << 20,
        }
    }
}
