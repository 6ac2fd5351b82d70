//! Dat: a logical buffer-region allocation (spec §3 "Dat / Tex", §4.11,
//! §4.12). Not present in the teacher, which binds its handful of GPU
//! buffers directly; grounded on `original_source`'s `dvz_dat`/
//! `dvz_dat_upload`/`dvz_dat_resize` and built on top of this crate's own
//! [`crate::buffer_regions::BufferRegionSet`] and [`crate::alloc::Alloc`].

use bitflags::bitflags;

use crate::buffer::{Buffer, BufferBuilder, BufferRole};
use crate::buffer_regions::BufferRegionSet;
use crate::error::Result;
use crate::frame::clip;
use crate::resources::{ResourceId, Resources};
use crate::transfer::{Transfer, TransferItem};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DatFlags: u32 {
        /// Owns a fresh private buffer sized `next_pow2(size)` instead of
        /// sub-allocating from the registry's shared per-role buffer (spec
        /// §4.12).
        const STANDALONE = 1 << 0;
        /// Backed by host-visible/host-coherent memory: writes go straight
        /// through the permanent mapping instead of the transfer engine's
        /// staging path (spec §5: "A permanently-mapped buffer may be
        /// written from the owning thread while the GPU reads it").
        const MAPPABLE = 1 << 1;
        /// Carries one region per frame in flight (spec §4.11's dup-ring):
        /// an upload fans out to every frame's slice and does not complete
        /// until all of them have observed the new bytes.
        const DUP = 1 << 2;
    }
}

enum Backing {
    Standalone(ResourceId),
    Shared(BufferRole),
}

fn next_pow2(size: u64) -> u64 {
    if size <= 1 {
        1
    } else {
        1u64 << (64 - (size - 1).leading_zeros())
    }
}

/// A single logical allocation exposed to callers: either a standalone
/// buffer or a sub-allocated region inside one of the registry's shared
/// per-role buffers (spec §4.12). Resize/upload go through [`Resources`]
/// and, for non-mappable uploads, a [`Transfer`] engine.
pub struct Dat {
    backing: Backing,
    role: BufferRole,
    regions: BufferRegionSet,
    flags: DatFlags,
    /// Bytes actually reserved per frame by the sub-allocator (a multiple
    /// of its 256-byte allocation granularity), tracked separately from
    /// `regions.size` so `resize_dat` can tell whether a shrink/grow still
    /// fits the existing slot without re-deriving it from `Alloc`.
    slot_size: u64,
}

impl Dat {
    pub fn flags(&self) -> DatFlags {
        self.flags
    }

    pub fn size(&self) -> u64 {
        self.regions.size
    }

    pub fn frame_count(&self) -> u32 {
        self.regions.count
    }

    fn raw(&self, resources: &Resources) -> ash::vk::Buffer {
        match self.backing {
            Backing::Standalone(id) => resources.standalone_buffer(id).raw,
            Backing::Shared(role) => resources.shared_buffers[&role].buffer.raw,
        }
    }

    fn buffer<'a>(&self, resources: &'a Resources) -> &'a Buffer {
        match self.backing {
            Backing::Standalone(id) => resources.standalone_buffer(id),
            Backing::Shared(role) => &resources.shared_buffers[&role].buffer,
        }
    }

    fn buffer_mut<'a>(&self, resources: &'a mut Resources) -> &'a mut Buffer {
        match self.backing {
            Backing::Standalone(id) => resources.standalone_buffer_mut(id),
            Backing::Shared(role) => &mut resources.shared_buffer_entry(role).expect("shared buffer must already exist").buffer,
        }
    }

    /// `dvz_dat_upload`: writes `data` into the region(s) this Dat occupies.
    /// A [`DatFlags::MAPPABLE`] non-dup Dat writes directly through the
    /// permanent mapping; everything else is routed through `transfer`'s
    /// staging buffer, one item per frame for a [`DatFlags::DUP`] Dat, and
    /// the call does not return until every frame has observed the new
    /// bytes (spec §4.11).
    pub fn upload(&self, resources: &mut Resources, transfer: &Transfer, data: &[u8]) -> Result<()> {
        assert!(data.len() as u64 <= self.regions.size, "upload larger than dat region size");

        if self.flags.contains(DatFlags::MAPPABLE) && !self.flags.contains(DatFlags::DUP) {
            let buffer = self.buffer_mut(resources);
            return self.regions.upload(buffer, 0, data);
        }

        let dst = self.raw(resources);
        for frame in 0..self.regions.count {
            transfer.enqueue(TransferItem::BufferUpload {
                dst,
                dst_offset: self.regions.offset_of(frame),
                stride: 0,
                count: 1,
                data: data.to_vec(),
            })?;
        }
        transfer.wait_idle();
        Ok(())
    }

    /// Reads back the slice seen by `frame`, clipped per spec §4.10's
    /// `count == 1` / `count == N` rule.
    pub fn download(&self, resources: &Resources, frame: u32) -> Result<Vec<u8>> {
        let index = clip(frame, self.regions.count);
        self.regions.download(self.buffer(resources), index)
    }
}

impl Resources {
    /// `dvz_dat`: sub-allocates `size` bytes from `role`'s shared buffer, or
    /// (with [`DatFlags::STANDALONE`]) creates a fresh private buffer sized
    /// `next_pow2(size)` (spec §4.12). `frame_count` is the dup-ring depth;
    /// pass 1 for a Dat without [`DatFlags::DUP`].
    pub fn create_dat(&mut self, role: BufferRole, size: u64, flags: DatFlags, frame_count: u32) -> Result<Dat> {
        let count = if flags.contains(DatFlags::DUP) { frame_count.max(1) } else { 1 };

        if flags.contains(DatFlags::STANDALONE) {
            let standalone_size = next_pow2(size) * count as u64;
            let buffer = BufferBuilder::new(role)
                .size(standalone_size)
                .usage(Resources::usage_for(role))
                .mappable(flags.contains(DatFlags::MAPPABLE))
                .create(&self.gpu)?;
            let alignment = buffer.alignment;
            let id = self.insert_standalone_buffer(buffer);
            return Ok(Dat {
                backing: Backing::Standalone(id),
                role,
                regions: BufferRegionSet::new(count, 0, size, alignment),
                flags,
                slot_size: standalone_size,
            });
        }

        let alignment = self.shared_buffer_entry(role)?.buffer.alignment;
        let per_frame = crate::buffer_regions::aligned_size(size, alignment);
        let allocation = self.alloc_shared(role, per_frame * count as u64)?;

        Ok(Dat {
            backing: Backing::Shared(role),
            role,
            regions: BufferRegionSet::new(count, allocation.offset, size, alignment),
            flags,
            slot_size: allocation.size,
        })
    }

    /// `dvz_dat_resize`: if the sub-allocator's slot already fits `new_size`
    /// only the region's own size field changes; otherwise the old slot is
    /// freed and a new one vended, which may grow the shared buffer (spec
    /// §4.12). Standalone Dats always reallocate, mirroring `dvz_dat`'s own
    /// `next_pow2` sizing.
    pub fn resize_dat(&mut self, dat: &mut Dat, new_size: u64) -> Result<()> {
        match dat.backing {
            Backing::Standalone(id) => {
                let new_capacity = next_pow2(new_size) * dat.regions.count as u64;
                self.standalone_buffer_mut(id).resize(new_capacity)?;
                dat.regions.size = new_size;
                dat.slot_size = new_capacity;
            }
            Backing::Shared(role) => {
                let per_frame = crate::buffer_regions::aligned_size(new_size, dat.regions.alignment) * dat.regions.count as u64;
                if per_frame <= dat.slot_size {
                    dat.regions.size = new_size;
                } else {
                    self.free_shared(role, dat.regions.offset);
                    let allocation = self.alloc_shared(role, per_frame)?;
                    dat.regions = BufferRegionSet::new(dat.regions.count, allocation.offset, new_size, dat.regions.alignment);
                    dat.slot_size = allocation.size;
                }
            }
        }
        Ok(())
    }

    /// Frees a standalone Dat's private buffer, or releases its shared
    /// sub-allocation back to `role`'s [`crate::alloc::Alloc`] (spec
    /// §4.12). No-op for a Dat constructed elsewhere and already dropped.
    pub fn destroy_dat(&mut self, dat: Dat) {
        match dat.backing {
            Backing::Standalone(id) => self.remove_standalone_buffer(id),
            Backing::Shared(role) => self.free_shared(role, dat.regions.offset),
        }
        let _ = dat.role;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_pow2_rounds_up() {
        assert_eq!(next_pow2(1), 1);
        assert_eq!(next_pow2(2), 2);
        assert_eq!(next_pow2(3), 4);
        assert_eq!(next_pow2(1000), 1024);
    }
}
