//! The sub-allocator (spec §3 "Sub-allocator (Alloc)", §4.4, §8). Not
//! present in the teacher at all — the teacher allocates one Vulkan buffer
//! per logical resource (`Device::create_buffer`). This is sourced from
//! `original_source/tests/test_alloc.c`'s grow-on-overflow assertions and
//! built in the idiom of the teacher's other ordered-map-based bookkeeping
//! (`gpu/queue.rs`'s per-family `used` counters), using a `BTreeMap` the
//! way the teacher's `pipeline.rs::create_descriptor_set_layouts` uses one
//! for its binding table.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    /// Length in alignment units.
    len: u64,
    used: bool,
}

/// First-fit offset vendor packing many logical buffers into one physical
/// buffer. Offsets and lengths are tracked in units of `alignment` bytes so
/// every vended allocation is aligned by construction.
pub struct Alloc {
    alignment: u64,
    size: u64,
    /// Offset (in units) -> slot. Covers `[0, size / alignment)` with no
    /// gaps: this is the "union of all slots is contiguous" invariant from
    /// spec §4.4.
    slots: BTreeMap<u64, Slot>,
    used_bytes: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct Allocation {
    pub offset: u64,
    pub size: u64,
    /// Set when this allocation triggered the backing store to grow; the
    /// caller must resize its physical buffer to at least `new_size`
    /// before using the offset (spec §4.4, §7: "not an error").
    pub resized: Option<u64>,
}

impl Alloc {
    pub fn new(initial_size: u64, alignment: u64) -> Self {
        assert!(alignment > 0 && initial_size > 0);
        let units = initial_size.div_ceil(alignment);
        let mut slots = BTreeMap::new();
        slots.insert(0, Slot { len: units, used: false });
        Self { alignment, size: units * alignment, slots, used_bytes: 0 }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    fn units(&self, bytes: u64) -> u64 {
        bytes.div_ceil(self.alignment).max(1)
    }

    /// Rounds `requested` up to a multiple of `alignment` and places it in
    /// the first free slot it fits in. Doubles the backing size (possibly
    /// more than once, for outsized requests) when no slot fits, placing
    /// the new allocation at what was the old end, per spec §4.4/§8
    /// ("when `alloc(n)` returns a non-zero `resized` flag the new
    /// `size ≥ 2 · old_size`").
    pub fn alloc(&mut self, requested: u64) -> Allocation {
        let units = self.units(requested);

        if let Some((&offset, _)) = self
            .slots
            .iter()
            .find(|(_, slot)| !slot.used && slot.len >= units)
        {
            return self.place(offset, units, None);
        }

        let old_size = self.size;
        while self
            .slots
            .iter()
            .all(|(_, slot)| slot.used || slot.len < units)
        {
            self.grow();
        }

        let (&offset, _) = self
            .slots
            .iter()
            .find(|(_, slot)| !slot.used && slot.len >= units)
            .expect("grow() must create a fitting free slot");
        self.place(offset, units, Some(old_size))
    }

    fn grow(&mut self) {
        let old_units = self.size / self.alignment;
        let last_is_free = self
            .slots
            .iter()
            .next_back()
            .map(|(_, slot)| !slot.used)
            .unwrap_or(false);

        if last_is_free {
            let (&offset, slot) = self.slots.iter_mut().next_back().unwrap();
            slot.len += old_units;
            let _ = offset;
        } else {
            self.slots.insert(old_units, Slot { len: old_units, used: false });
        }
        self.size *= 2;
    }

    fn place(&mut self, offset: u64, units: u64, resized_from: Option<u64>) -> Allocation {
        let slot = self.slots.remove(&offset).unwrap();
        assert!(!slot.used && slot.len >= units);

        self.slots.insert(offset, Slot { len: units, used: true });
        if slot.len > units {
            self.slots.insert(offset + units, Slot { len: slot.len - units, used: false });
        }

        self.used_bytes += units * self.alignment;
        Allocation {
            offset: offset * self.alignment,
            size: units * self.alignment,
            resized: resized_from.map(|_| self.size),
        }
    }

    /// Frees the allocation at `offset` (bytes) and merges with adjacent
    /// free slots.
    pub fn free(&mut self, offset: u64) {
        let unit_offset = offset / self.alignment;
        let slot = self.slots.get(&unit_offset).copied().expect("free() of unknown offset");
        assert!(slot.used, "double free at offset {offset}");

        self.used_bytes -= slot.len * self.alignment;
        self.slots.insert(unit_offset, Slot { len: slot.len, used: false });
        self.merge_adjacent(unit_offset);
    }

    fn merge_adjacent(&mut self, offset: u64) {
        let slot = *self.slots.get(&offset).unwrap();

        if let Some((&next_offset, &next)) = self.slots.range(offset + 1..).next() {
            if next_offset == offset + slot.len && !next.used {
                self.slots.remove(&next_offset);
                self.slots.get_mut(&offset).unwrap().len += next.len;
            }
        }

        if let Some((&prev_offset, &prev)) = self.slots.range(..offset).next_back() {
            if !prev.used && prev_offset + prev.len == offset {
                let merged_len = prev.len + self.slots.remove(&offset).unwrap().len;
                self.slots.get_mut(&prev_offset).unwrap().len = merged_len;
            }
        }
    }

    #[cfg(test)]
    fn invariant_holds(&self) -> bool {
        let mut expected_offset = 0u64;
        for (&offset, slot) in &self.slots {
            if offset != expected_offset {
                return false;
            }
            expected_offset += slot.len;
        }
        expected_offset * self.alignment == self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_aligned_and_non_overlapping() {
        let mut alloc = Alloc::new(256, 16);
        let a = alloc.alloc(10);
        let b = alloc.alloc(20);
        assert_eq!(a.offset % 16, 0);
        assert_eq!(b.offset % 16, 0);
        assert!(a.offset + a.size <= b.offset || b.offset + b.size <= a.offset);
        assert!(alloc.invariant_holds());
    }

    #[test]
    fn grows_by_at_least_double_on_overflow() {
        let mut alloc = Alloc::new(64, 16);
        let old_size = alloc.size();
        alloc.alloc(16);
        alloc.alloc(16);
        alloc.alloc(16);
        let fourth = alloc.alloc(16); // exactly fills the 64-byte pool
        assert!(fourth.resized.is_none());
        let fifth = alloc.alloc(16); // must grow
        assert!(fifth.resized.is_some());
        assert!(alloc.size() >= 2 * old_size);
        assert!(alloc.invariant_holds());
    }

    #[test]
    fn free_then_alloc_reuses_merged_space() {
        let mut alloc = Alloc::new(64, 16);
        let a = alloc.alloc(16);
        let b = alloc.alloc(16);
        alloc.free(a.offset);
        alloc.free(b.offset);
        assert!(alloc.invariant_holds());
        let c = alloc.alloc(32);
        assert_eq!(c.offset, 0);
    }

    #[test]
    fn used_bytes_matches_sum_of_live_allocations() {
        let mut alloc = Alloc::new(128, 8);
        let a = alloc.alloc(8);
        let b = alloc.alloc(24);
        assert_eq!(alloc.used_bytes(), a.size + b.size);
        alloc.free(a.offset);
        assert_eq!(alloc.used_bytes(), b.size);
    }

    #[test]
    fn size_is_always_a_multiple_of_alignment() {
        let mut alloc = Alloc::new(17, 16);
        assert_eq!(alloc.size() % 16, 0);
        for _ in 0..20 {
            alloc.alloc(5);
        }
        assert_eq!(alloc.size() % 16, 0);
    }
}
