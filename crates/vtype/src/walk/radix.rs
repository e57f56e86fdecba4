//! BSD radix-trie walker (`rn_walktree` order).
//!
//! Internal nodes have a non-negative bit index and left/right children;
//! leaves have a negative bit index and may chain duplicate keys off
//! `rn_dupedkey`. The two end markers under the top node carry the root flag
//! and are never yielded. Node fields are read through the object view, so
//! the layout only has to list each union alias at its true offset.
//!
//! The walk never trusts the trie: a null child where a node is needed, a
//! cycle during a descent, ascent or duplicate-key chain, a leaf reached
//! twice, or more than `max_trie_steps` node visits all end it with
//! `Traversal`.

use super::WalkLimits;
use crate::error::{VtypeError, VtypeResult};
use crate::object::Object;
use std::collections::HashSet;
use tracing::warn;

/// Field names and the root flag used to read trie nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadixFields {
    pub bit: String,
    pub left: String,
    pub right: String,
    pub parent: String,
    pub flags: String,
    pub dupedkey: String,
    /// `RNF_ROOT`
    pub root_flag: u64,
}

impl RadixFields {
    /// `struct radix_node` as found in BSD and XNU.
    pub fn bsd() -> Self {
        RadixFields {
            bit: "rn_bit".to_string(),
            left: "rn_left".to_string(),
            right: "rn_right".to_string(),
            parent: "rn_parent".to_string(),
            flags: "rn_flags".to_string(),
            dupedkey: "rn_dupedkey".to_string(),
            root_flag: 2,
        }
    }
}

impl Default for RadixFields {
    fn default() -> Self {
        Self::bsd()
    }
}

enum State<'a> {
    Start(Object<'a>),
    AtLeaf(Object<'a>),
    /// Emitting the duplicate-key chain of a leaf; `next` is the following leaf.
    Chain {
        cursor: Option<Object<'a>>,
        next: Object<'a>,
        chain_seen: HashSet<u64>,
    },
    Terminated,
}

/// Walk the trie under `top` (a node, or a pointer to one such as
/// `rnh_treetop`), yielding leaves and their duplicate keys in order.
pub fn walk_radix<'a>(top: &Object<'a>) -> RadixWalk<'a> {
    RadixWalk {
        fields: RadixFields::bsd(),
        limits: WalkLimits::default(),
        state: State::Start(top.clone()),
        seen: HashSet::new(),
        steps: 0,
    }
}

pub struct RadixWalk<'a> {
    fields: RadixFields,
    limits: WalkLimits,
    state: State<'a>,
    /// Leaves already walked.
    seen: HashSet<u64>,
    steps: usize,
}

impl<'a> RadixWalk<'a> {
    pub fn with_fields(mut self, fields: RadixFields) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_limits(mut self, limits: WalkLimits) -> Self {
        self.limits = limits;
        self
    }

    fn step(&mut self, node: &Object<'a>) -> VtypeResult<()> {
        self.steps += 1;
        if self.steps > self.limits.max_trie_steps {
            warn!(
                "Radix walk hit the step limit ({}) at {:#x}, results are truncated",
                self.limits.max_trie_steps,
                node.offset()
            );
            return Err(VtypeError::traversal(
                node.offset(),
                format!("trie walk exceeds {} steps", self.limits.max_trie_steps),
            ));
        }
        Ok(())
    }

    fn bit(&self, node: &Object<'a>) -> VtypeResult<i64> {
        Ok(node.field(&self.fields.bit)?.value()?.as_i64())
    }

    fn is_root(&self, node: &Object<'a>) -> VtypeResult<bool> {
        Ok(node.field(&self.fields.flags)?.value()?.as_u64() & self.fields.root_flag != 0)
    }

    /// Follow a node pointer that must not be null.
    fn child(&self, node: &Object<'a>, name: &str) -> VtypeResult<Object<'a>> {
        let child = node.field(name)?.deref()?;
        if child.is_null() {
            return Err(VtypeError::traversal(
                node.offset(),
                format!("null {} where a node is required", name),
            ));
        }
        Ok(child)
    }

    /// Go left until a leaf.
    fn descend(&mut self, mut rn: Object<'a>) -> VtypeResult<Object<'a>> {
        let mut path = HashSet::new();
        while self.bit(&rn)? >= 0 {
            self.step(&rn)?;
            if !path.insert(rn.offset()) {
                return Err(VtypeError::traversal(rn.offset(), "cycle while descending"));
            }
            rn = self.child(&rn, &self.fields.left)?;
        }
        Ok(rn)
    }

    /// The leaf that follows `leaf`: climb while we are a right child, then
    /// take the parent's right subtree.
    fn successor(&mut self, leaf: &Object<'a>) -> VtypeResult<Object<'a>> {
        let parent_field = self.fields.parent.clone();
        let right_field = self.fields.right.clone();

        let mut rn = leaf.clone();
        let mut path = HashSet::new();
        loop {
            let parent = self.child(&rn, &parent_field)?;
            let parent_right = parent.field(&right_field)?.pointer_value()?;
            if parent_right != rn.offset() || self.is_root(&rn)? {
                break;
            }
            self.step(&rn)?;
            if !path.insert(rn.offset()) {
                return Err(VtypeError::traversal(rn.offset(), "cycle while ascending"));
            }
            rn = parent;
        }

        let parent = self.child(&rn, &parent_field)?;
        let right = self.child(&parent, &right_field)?;
        self.descend(right)
    }

    fn advance(&mut self) -> VtypeResult<Option<Object<'a>>> {
        loop {
            match std::mem::replace(&mut self.state, State::Terminated) {
                State::Terminated => return Ok(None),
                State::Start(top) => {
                    let top = if top.is_pointer() { top.deref()? } else { top };
                    if top.is_null() {
                        return Ok(None);
                    }
                    self.state = State::AtLeaf(self.descend(top)?);
                }
                State::AtLeaf(leaf) => {
                    if !self.seen.insert(leaf.offset()) {
                        return Err(VtypeError::traversal(leaf.offset(), "leaf visited twice"));
                    }
                    let next = self.successor(&leaf)?;
                    self.state = State::Chain {
                        cursor: Some(leaf),
                        next,
                        chain_seen: HashSet::new(),
                    };
                }
                State::Chain {
                    cursor: None,
                    next,
                    ..
                } => {
                    if self.is_root(&next)? {
                        return Ok(None);
                    }
                    self.state = State::AtLeaf(next);
                }
                State::Chain {
                    cursor: Some(rn),
                    next,
                    mut chain_seen,
                } => {
                    self.step(&rn)?;
                    if !chain_seen.insert(rn.offset()) {
                        return Err(VtypeError::traversal(rn.offset(), "cycle in duplicate-key chain"));
                    }
                    let dup = rn.field(&self.fields.dupedkey)?.deref()?;
                    let emit = !self.is_root(&rn)?;
                    self.state = State::Chain {
                        cursor: if dup.is_null() { None } else { Some(dup) },
                        next,
                        chain_seen,
                    };
                    if emit {
                        return Ok(Some(rn));
                    }
                }
            }
        }
    }
}

impl<'a> Iterator for RadixWalk<'a> {
    type Item = VtypeResult<Object<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::DataModel;
    use crate::profile::Profile;
    use crate::testutil::SparseMemory;
    use crate::types::{StructLayout, TypeRef};

    const RNF_ROOT: u8 = 2;
    const RNF_ACTIVE: u8 = 4;

    const HEAD: u64 = 0x100;
    const T: u64 = 0x1000;
    const N1: u64 = 0x1100;
    const E0: u64 = 0x1200;
    const N2: u64 = 0x1300;
    const LA: u64 = 0x1400;
    const LA2: u64 = 0x1500;
    const LA3: u64 = 0x1600;
    const LB: u64 = 0x1700;
    const N3: u64 = 0x1800;
    const LC: u64 = 0x1900;
    const E1: u64 = 0x1a00;
    const LD: u64 = 0x1b00;

    fn profile() -> Profile {
        let node = || TypeRef::pointer_to("radix_node");
        let mut profile = Profile::new(DataModel::Lp64);
        profile
            .add_layouts([
                StructLayout::new("radix_node", 48)
                    .field("rn_mklist", 0u64, TypeRef::pointer(TypeRef::Void))
                    .field("rn_parent", 8u64, node())
                    .field("rn_bit", 16u64, TypeRef::named("short"))
                    .field("rn_bmask", 18u64, TypeRef::named("char"))
                    .field("rn_flags", 19u64, TypeRef::named("unsigned char"))
                    .field("rn_key", 24u64, TypeRef::pointer(TypeRef::Void))
                    .field("rn_offset", 24u64, TypeRef::named("int"))
                    .field("rn_mask", 32u64, TypeRef::pointer(TypeRef::Void))
                    .field("rn_left", 32u64, node())
                    .field("rn_dupedkey", 40u64, node())
                    .field("rn_right", 40u64, node()),
                StructLayout::new("radix_node_head", 8).field("rnh_treetop", 0u64, node()),
            ])
            .unwrap();
        profile
    }

    /// `left`/`right` double as `rn_mask`/`rn_dupedkey` on leaves.
    fn node(mem: &SparseMemory, addr: u64, bit: i16, flags: u8, parent: u64, left: u64, right: u64) {
        let mut buf = vec![0u8; 48];
        buf[8..16].copy_from_slice(&parent.to_le_bytes());
        buf[16..18].copy_from_slice(&bit.to_le_bytes());
        buf[19] = flags;
        buf[32..40].copy_from_slice(&left.to_le_bytes());
        buf[40..48].copy_from_slice(&right.to_le_bytes());
        mem.write(addr, &buf);
    }

    fn leaf(mem: &SparseMemory, addr: u64, flags: u8, parent: u64, dupedkey: u64) {
        node(mem, addr, -1, flags, parent, 0, dupedkey);
    }

    /// ```text
    ///              T (root)
    ///            /          \
    ///          N1            N3
    ///         /  \          /  \
    ///       E0    N2      LC    E1
    ///            /  \
    ///   LA->LA2->LA3  LB
    /// ```
    fn trie() -> SparseMemory {
        let mem = SparseMemory::new();
        mem.write(HEAD, &T.to_le_bytes());
        node(&mem, T, 0, RNF_ROOT | RNF_ACTIVE, T, N1, N3);
        node(&mem, N1, 1, RNF_ACTIVE, T, E0, N2);
        leaf(&mem, E0, RNF_ROOT | RNF_ACTIVE, N1, 0);
        node(&mem, N2, 2, RNF_ACTIVE, N1, LA, LB);
        leaf(&mem, LA, RNF_ACTIVE, N2, LA2);
        leaf(&mem, LA2, RNF_ACTIVE, N2, LA3);
        leaf(&mem, LA3, RNF_ACTIVE, N2, 0);
        leaf(&mem, LB, RNF_ACTIVE, N2, 0);
        node(&mem, N3, 1, RNF_ACTIVE, T, LC, E1);
        leaf(&mem, LC, RNF_ACTIVE, N3, 0);
        leaf(&mem, E1, RNF_ROOT | RNF_ACTIVE, N3, 0);
        mem
    }

    fn walk(profile: &Profile, mem: &SparseMemory) -> VtypeResult<Vec<u64>> {
        let head = profile.object("radix_node_head", HEAD, mem)?;
        walk_radix(&head.field("rnh_treetop")?)
            .map(|leaf| leaf.map(|l| l.offset()))
            .collect()
    }

    #[test]
    fn test_in_order_with_duplicate_keys() {
        let profile = profile();
        let mem = trie();
        assert_eq!(walk(&profile, &mem).unwrap(), vec![LA, LA2, LA3, LB, LC]);
    }

    #[test]
    fn test_walk_from_node_object() {
        let profile = profile();
        let mem = trie();
        let top = profile.object("radix_node", T, &mem).unwrap();
        assert_eq!(walk_radix(&top).count(), 5);
    }

    #[test]
    fn test_root_leaf_chain_entries_are_emitted() {
        let profile = profile();
        let mem = trie();
        // A default route chained off the left end marker.
        leaf(&mem, LD, RNF_ACTIVE, N1, 0);
        mem.patch_u64(E0 + 40, LD);
        assert_eq!(walk(&profile, &mem).unwrap(), vec![LD, LA, LA2, LA3, LB, LC]);
    }

    #[test]
    fn test_empty_tree() {
        let profile = profile();
        let mem = trie();
        mem.patch_u64(HEAD, 0);
        assert!(walk(&profile, &mem).unwrap().is_empty());
    }

    #[test]
    fn test_descent_cycle() {
        let profile = profile();
        let mem = trie();
        mem.patch_u64(N2 + 32, N2);
        match walk(&profile, &mem) {
            Err(VtypeError::Traversal { address, .. }) => assert_eq!(address, N2),
            other => panic!("Expected Traversal, got: {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_key_cycle_after_partial_output() {
        let profile = profile();
        let mem = trie();
        mem.patch_u64(LA3 + 40, LA);

        let head = profile.object("radix_node_head", HEAD, &mem).unwrap();
        let results: Vec<_> = walk_radix(&head.field("rnh_treetop").unwrap()).collect();
        let offsets: Vec<u64> = results.iter().filter_map(|r| r.as_ref().ok()).map(|o| o.offset()).collect();
        assert_eq!(offsets, vec![LA, LA2, LA3]);
        assert!(matches!(results.last(), Some(Err(VtypeError::Traversal { .. }))));
        assert_eq!(results.len(), 4);
    }

    #[test]
    fn test_leaf_visited_twice() {
        let profile = profile();
        let mem = trie();
        mem.patch_u64(N3 + 32, LA);
        match walk(&profile, &mem) {
            Err(VtypeError::Traversal { address, msg }) => {
                assert_eq!(address, LA);
                assert!(msg.contains("twice"));
            }
            other => panic!("Expected Traversal, got: {:?}", other),
        }
    }

    #[test]
    fn test_null_child() {
        let profile = profile();
        let mem = trie();
        mem.patch_u64(N3 + 32, 0);
        assert!(matches!(
            walk(&profile, &mem),
            Err(VtypeError::Traversal { address: N3, .. })
        ));
    }

    #[test]
    fn test_step_limit() {
        let profile = profile();
        let mem = trie();
        let head = profile.object("radix_node_head", HEAD, &mem).unwrap();
        let limits = WalkLimits {
            max_trie_steps: 4,
            ..WalkLimits::default()
        };
        let result: VtypeResult<Vec<_>> = walk_radix(&head.field("rnh_treetop").unwrap())
            .with_limits(limits)
            .collect();
        assert!(matches!(result, Err(VtypeError::Traversal { .. })));
    }

    #[test]
    fn test_unreadable_node_is_invalid_address() {
        let profile = profile();
        let mem = trie();
        mem.patch_u64(N2 + 40, 0xdead_0000);
        assert!(matches!(
            walk(&profile, &mem),
            Err(VtypeError::InvalidAddress { address: 0xdead_0010, .. })
        ));
    }
}
