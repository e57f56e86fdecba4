//! Linked-list walkers.
//!
//! [`walk_list`] follows a link path from object to object (singly linked or
//! the forward half of a doubly linked list). [`walk_list_entry`] walks an
//! intrusive circular `LIST_ENTRY`-style list from its sentinel head and
//! yields the containing structs.

use super::WalkLimits;
use crate::error::{VtypeError, VtypeResult};
use crate::object::Object;
use crate::types::TypeRef;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Walk a list starting at `head`, following the dotted `link_path` to each
/// next element.
///
/// The walk stops at a null link or at an address that was already visited.
/// Links may be pointers or raw `address` integers. A pointer `head` is
/// dereferenced first.
pub fn walk_list<'a>(head: &Object<'a>, link_path: &str) -> VtypeResult<ListWalk<'a>> {
    let head = if head.is_pointer() { head.deref()? } else { head.clone() };
    Ok(ListWalk {
        type_name: head.type_name().to_string(),
        head: Some(head),
        last: None,
        link_path: link_path.to_string(),
        seen: HashSet::new(),
        limits: WalkLimits::default(),
        skip_head: false,
    })
}

/// Lazy iterator returned by [`walk_list`].
pub struct ListWalk<'a> {
    type_name: String,
    head: Option<Object<'a>>,
    /// Most recently visited element; the next one is computed from it.
    last: Option<Object<'a>>,
    link_path: String,
    seen: HashSet<u64>,
    limits: WalkLimits,
    skip_head: bool,
}

impl<'a> ListWalk<'a> {
    /// Do not yield the head itself (it is still used to find the first link).
    pub fn skip_head(mut self) -> Self {
        self.skip_head = true;
        self
    }

    pub fn with_limits(mut self, limits: WalkLimits) -> Self {
        self.limits = limits;
        self
    }

    fn follow(&self, from: &Object<'a>) -> VtypeResult<Object<'a>> {
        let link = from.path(&self.link_path)?;
        if link.is_pointer() {
            link.deref_as(&self.type_name)
        } else if link.is_null() {
            Ok(link)
        } else if link.type_name() == "address" {
            let (profile, space) = (link.profile(), link.space());
            match link.value()?.as_u64() {
                0 => Ok(Object::null(profile, space, self.type_name.as_str())),
                next => Object::from_type(profile, space, &TypeRef::named(self.type_name.as_str()), next),
            }
        } else {
            Err(VtypeError::not_applicable(link.type_name(), "walk_list"))
        }
    }

    fn advance(&mut self) -> VtypeResult<Option<Object<'a>>> {
        loop {
            let (candidate, is_head) = if let Some(head) = self.head.take() {
                (head, true)
            } else if let Some(last) = self.last.take() {
                (self.follow(&last)?, false)
            } else {
                return Ok(None);
            };

            if candidate.is_null() {
                return Ok(None);
            }
            if !self.seen.insert(candidate.offset()) {
                debug!(
                    "List walk of {} revisits {:#x}, stopping after {} entries",
                    self.type_name,
                    candidate.offset(),
                    self.seen.len()
                );
                return Ok(None);
            }
            if self.seen.len() > self.limits.max_list_entries {
                warn!(
                    "List walk of {} hit the entry limit ({}), results are truncated",
                    self.type_name, self.limits.max_list_entries
                );
                return Err(VtypeError::traversal(
                    candidate.offset(),
                    format!("list exceeds {} entries", self.limits.max_list_entries),
                ));
            }

            self.last = Some(candidate.clone());
            if is_head && self.skip_head {
                continue;
            }
            return Ok(Some(candidate));
        }
    }
}

impl<'a> Iterator for ListWalk<'a> {
    type Item = VtypeResult<Object<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance().transpose()
    }
}

/// Walk a circular intrusive list from its sentinel `list_head`, yielding
/// `containing_type` objects whose `containing_field` is the list linkage.
///
/// The walk ends when the forward link returns to the head or is zero.
pub fn walk_list_entry<'a>(
    list_head: &Object<'a>,
    containing_type: &str,
    containing_field: &str,
) -> VtypeResult<ListEntryWalk<'a>> {
    let head = if list_head.is_pointer() { list_head.deref()? } else { list_head.clone() };
    let profile = head.profile();
    let layout = profile.get_layout(containing_type)?;
    let field = layout
        .get(containing_field)
        .ok_or_else(|| VtypeError::unknown_field(containing_type, containing_field))?;
    let entry_offset = field.offset.fixed().ok_or_else(|| {
        VtypeError::InvalidLayout(format!(
            "{}.{} has a deferred offset and cannot anchor a list",
            containing_type, containing_field
        ))
    })?;

    Ok(ListEntryWalk {
        entry_type: TypeRef::named(head.type_name()),
        head_addr: head.offset(),
        current: if head.is_null() { None } else { Some(head) },
        containing_type: TypeRef::named(containing_type),
        entry_offset,
        link: "Flink".to_string(),
        seen: HashSet::new(),
        limits: WalkLimits::default(),
    })
}

/// Lazy iterator returned by [`walk_list_entry`].
pub struct ListEntryWalk<'a> {
    entry_type: TypeRef,
    /// Address of the list head (sentinel).
    head_addr: u64,
    current: Option<Object<'a>>,
    containing_type: TypeRef,
    /// Offset of the linkage field within the containing struct.
    entry_offset: u64,
    link: String,
    seen: HashSet<u64>,
    limits: WalkLimits,
}

impl<'a> ListEntryWalk<'a> {
    /// Follow a different link field, e.g. `Blink` to walk backwards.
    pub fn link(mut self, field: &str) -> Self {
        self.link = field.to_string();
        self
    }

    pub fn with_limits(mut self, limits: WalkLimits) -> Self {
        self.limits = limits;
        self
    }

    fn advance(&mut self) -> VtypeResult<Option<Object<'a>>> {
        let Some(current) = self.current.take() else {
            return Ok(None);
        };

        let next = current.field(&self.link)?.pointer_value()?;
        if next == 0 || next == self.head_addr {
            return Ok(None);
        }
        if !self.seen.insert(next) {
            debug!("List entry walk revisits {:#x}, stopping", next);
            return Ok(None);
        }
        if self.seen.len() > self.limits.max_list_entries {
            warn!("List entry walk hit the entry limit ({})", self.limits.max_list_entries);
            return Err(VtypeError::traversal(
                next,
                format!("list exceeds {} entries", self.limits.max_list_entries),
            ));
        }

        let profile = current.profile();
        let space = current.space();
        self.current = Some(Object::from_type(profile, space, &self.entry_type, next)?);
        Object::from_type(
            profile,
            space,
            &self.containing_type,
            next.wrapping_sub(self.entry_offset),
        )
        .map(Some)
    }
}

impl<'a> Iterator for ListEntryWalk<'a> {
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
    use crate::types::StructLayout;

    fn profile() -> Profile {
        let mut profile = Profile::new(DataModel::Lp64);
        profile
            .add_layouts([
                StructLayout::new("node", 16)
                    .field("tag", 0u64, TypeRef::named("int"))
                    .field("next", 8u64, TypeRef::pointer_to("node")),
                StructLayout::new("holder", 24)
                    .field("id", 0u64, TypeRef::named("unsigned int"))
                    .field("inner", 8u64, TypeRef::named("node_link")),
                StructLayout::new("node_link", 16)
                    .field("next", 0u64, TypeRef::pointer(TypeRef::Void)),
                StructLayout::new("raw_node", 16)
                    .field("tag", 0u64, TypeRef::named("int"))
                    .field("next", 8u64, TypeRef::named("address")),
                StructLayout::new("_LIST_ENTRY", 16)
                    .field("Flink", 0u64, TypeRef::pointer_to("_LIST_ENTRY"))
                    .field("Blink", 8u64, TypeRef::pointer_to("_LIST_ENTRY")),
                StructLayout::new("_PROC", 0x40)
                    .field("Pid", 0u64, TypeRef::named("unsigned int"))
                    .field("Links", 0x10u64, TypeRef::named("_LIST_ENTRY")),
            ])
            .unwrap();
        profile
    }

    fn write_node(mem: &SparseMemory, addr: u64, tag: i32, next: u64) {
        let mut buf = vec![0u8; 16];
        buf[0..4].copy_from_slice(&tag.to_le_bytes());
        buf[8..16].copy_from_slice(&next.to_le_bytes());
        mem.write(addr, &buf);
    }

    fn tags<'a>(walk: impl Iterator<Item = VtypeResult<Object<'a>>>) -> Vec<i64> {
        walk.map(|n| n.unwrap().field("tag").unwrap().value().unwrap().as_i64())
            .collect()
    }

    #[test]
    fn test_walk_until_null() {
        let profile = profile();
        let mem = SparseMemory::new();
        write_node(&mem, 0x1000, 1, 0x2000);
        write_node(&mem, 0x2000, 2, 0x3000);
        write_node(&mem, 0x3000, 3, 0);

        let head = profile.object("node", 0x1000, &mem).unwrap();
        assert_eq!(tags(walk_list(&head, "next").unwrap()), vec![1, 2, 3]);
        assert_eq!(tags(walk_list(&head, "next").unwrap().skip_head()), vec![2, 3]);
    }

    #[test]
    fn test_walk_raw_address_links() {
        let profile = profile();
        let mem = SparseMemory::new();
        write_node(&mem, 0x1000, 1, 0x2000);
        write_node(&mem, 0x2000, 2, 0);

        let head = profile.object("raw_node", 0x1000, &mem).unwrap();
        let walk: Vec<_> = walk_list(&head, "next").unwrap().map(|n| n.unwrap()).collect();
        assert_eq!(walk.iter().map(|n| n.offset()).collect::<Vec<_>>(), vec![0x1000, 0x2000]);
        assert_eq!(walk[1].type_name(), "raw_node");
    }

    #[test]
    fn test_walk_cycle_terminates() {
        let profile = profile();
        let mem = SparseMemory::new();
        let k = 5u64;
        for i in 0..k {
            let next = 0x1000 + ((i + 1) % k) * 0x100;
            write_node(&mem, 0x1000 + i * 0x100, i as i32 + 1, next);
        }

        let head = profile.object("node", 0x1000, &mem).unwrap();
        assert_eq!(tags(walk_list(&head, "next").unwrap()), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_walk_limit_raises_traversal() {
        let profile = profile();
        let mem = SparseMemory::new();
        for i in 0..4u64 {
            write_node(&mem, 0x1000 + i * 0x10, i as i32, 0x1000 + (i + 1) * 0x10);
        }
        write_node(&mem, 0x1040, 4, 0);

        let head = profile.object("node", 0x1000, &mem).unwrap();
        let limits = WalkLimits {
            max_list_entries: 3,
            ..WalkLimits::default()
        };
        let results: Vec<_> = walk_list(&head, "next").unwrap().with_limits(limits).collect();
        assert_eq!(results.len(), 4);
        assert!(results[..3].iter().all(|r| r.is_ok()));
        assert!(matches!(results[3], Err(VtypeError::Traversal { address: 0x1030, .. })));
    }

    #[test]
    fn test_walk_through_nested_void_link() {
        let profile = profile();
        let mem = SparseMemory::new();
        let mut a = vec![0u8; 24];
        a[0..4].copy_from_slice(&7u32.to_le_bytes());
        a[8..16].copy_from_slice(&0x2000u64.to_le_bytes());
        mem.write(0x1000, &a);
        let mut b = vec![0u8; 24];
        b[0..4].copy_from_slice(&8u32.to_le_bytes());
        mem.write(0x2000, &b);

        let head = profile.object("holder", 0x1000, &mem).unwrap();
        let ids: Vec<u64> = walk_list(&head, "inner.next")
            .unwrap()
            .map(|h| h.unwrap().field("id").unwrap().value().unwrap().as_u64())
            .collect();
        assert_eq!(ids, vec![7, 8]);
    }

    #[test]
    fn test_walk_from_null_pointer_head() {
        let profile = profile();
        let mem = SparseMemory::new();
        write_node(&mem, 0x1000, 1, 0);
        let next = profile.object("node", 0x1000, &mem).unwrap().field("next").unwrap();
        assert_eq!(walk_list(&next, "next").unwrap().count(), 0);
    }

    fn write_entry(mem: &SparseMemory, addr: u64, flink: u64, blink: u64) {
        mem.patch_u64(addr, flink);
        mem.patch_u64(addr + 8, blink);
    }

    #[test]
    fn test_list_entry_walk() {
        let profile = profile();
        let mem = SparseMemory::new();
        mem.write(0x100, &[0u8; 16]);
        for (i, base) in [0x1000u64, 0x2000, 0x3000].iter().enumerate() {
            let mut proc_ = vec![0u8; 0x40];
            proc_[0..4].copy_from_slice(&(i as u32 + 4).to_le_bytes());
            mem.write(*base, &proc_);
        }
        // head <-> 0x1010 <-> 0x2010 <-> 0x3010 <-> head
        write_entry(&mem, 0x100, 0x1010, 0x3010);
        write_entry(&mem, 0x1010, 0x2010, 0x100);
        write_entry(&mem, 0x2010, 0x3010, 0x1010);
        write_entry(&mem, 0x3010, 0x100, 0x2010);

        let head = profile.object("_LIST_ENTRY", 0x100, &mem).unwrap();
        let forward: Vec<u64> = walk_list_entry(&head, "_PROC", "Links")
            .unwrap()
            .map(|p| p.unwrap().offset())
            .collect();
        assert_eq!(forward, vec![0x1000, 0x2000, 0x3000]);

        let pids: Vec<u64> = walk_list_entry(&head, "_PROC", "Links")
            .unwrap()
            .link("Blink")
            .map(|p| p.unwrap().field("Pid").unwrap().value().unwrap().as_u64())
            .collect();
        assert_eq!(pids, vec![6, 5, 4]);
    }

    #[test]
    fn test_list_entry_empty_and_corrupt() {
        let profile = profile();
        let mem = SparseMemory::new();
        mem.write(0x100, &[0u8; 16]);
        write_entry(&mem, 0x100, 0x100, 0x100);
        let head = profile.object("_LIST_ENTRY", 0x100, &mem).unwrap();
        assert_eq!(walk_list_entry(&head, "_PROC", "Links").unwrap().count(), 0);

        // A loop that never returns to the head still terminates.
        mem.write(0x1000, &[0u8; 0x40]);
        write_entry(&mem, 0x100, 0x1010, 0);
        write_entry(&mem, 0x1010, 0x1010, 0);
        assert_eq!(walk_list_entry(&head, "_PROC", "Links").unwrap().count(), 1);

        assert!(matches!(
            walk_list_entry(&head, "_PROC", "Nope"),
            Err(VtypeError::UnknownField { .. })
        ));
    }
}
