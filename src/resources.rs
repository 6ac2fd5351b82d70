//! Resources registry (spec §3 "Resources registry", §4.12). Not present in
//! the teacher, which creates one Vulkan object per logical resource and
//! lets whichever struct holds it own its lifetime; grounded on the
//! teacher's per-kind container pattern (`glyph_atlas.rs`'s
//! `HashMap<char, u16>`) widened to the four resource kinds spec §4.12
//! names, plus an [`Alloc`] sub-allocator embedded per buffer role (spec
//! §4.4/§4.12: "an embedded sub-allocator *per buffer type*").

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ash::vk;

use crate::alloc::{Alloc, Allocation};
use crate::buffer::{Buffer, BufferBuilder, BufferRole};
use crate::error::Result;
use crate::gpu::Gpu;
use crate::image::ImageSet;
use crate::pipeline::compute::ComputePipeline;
use crate::sampler::Sampler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

const SHARED_BUFFER_INITIAL_SIZE: u64 = 1 << 16;
const SHARED_BUFFER_ALIGNMENT: u64 = 256;

pub(crate) struct SharedBuffer {
    pub buffer: Buffer,
    pub alloc: Alloc,
}

/// Owns every buffer, image, sampler, and compute pipeline a [`crate::dat::Dat`]
/// or [`crate::tex::Tex`] points into, plus the shared per-role buffers that
/// back non-standalone Dats. Dropping a `Resources` drops every pool's
/// `HashMap`, which cascades into each entry's own `Drop` impl — registry
/// teardown needs no bespoke destroy-order logic (spec §4.12).
pub struct Resources {
    pub(crate) gpu: Arc<Gpu>,
    counter: AtomicU64,
    pub(crate) standalone_buffers: HashMap<ResourceId, Buffer>,
    pub(crate) shared_buffers: HashMap<BufferRole, SharedBuffer>,
    images: HashMap<ResourceId, ImageSet>,
    samplers: HashMap<ResourceId, Sampler>,
    computes: HashMap<ResourceId, ComputePipeline>,
}

impl Resources {
    pub fn new(gpu: &Arc<Gpu>) -> Self {
        Self {
            gpu: Arc::clone(gpu),
            counter: AtomicU64::new(1),
            standalone_buffers: HashMap::new(),
            shared_buffers: HashMap::new(),
            images: HashMap::new(),
            samplers: HashMap::new(),
            computes: HashMap::new(),
        }
    }

    pub fn gpu(&self) -> &Arc<Gpu> {
        &self.gpu
    }

    pub(crate) fn alloc_id(&self) -> ResourceId {
        ResourceId(self.counter.fetch_add(1, Ordering::Relaxed))
    }

    /// The usage flags every shared buffer of `role` needs beyond its own
    /// role bit: `TRANSFER_SRC`/`TRANSFER_DST` so staging uploads and
    /// `Buffer::resize`'s content-preserving copy always work.
    pub(crate) fn usage_for(role: BufferRole) -> vk::BufferUsageFlags {
        let role_usage = match role {
            BufferRole::Staging => vk::BufferUsageFlags::empty(),
            BufferRole::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
            BufferRole::Index => vk::BufferUsageFlags::INDEX_BUFFER,
            BufferRole::Storage => vk::BufferUsageFlags::STORAGE_BUFFER,
            BufferRole::Uniform | BufferRole::MappableUniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferRole::Indirect => vk::BufferUsageFlags::INDIRECT_BUFFER,
        };
        role_usage | vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST
    }

    /// Lazily creates the shared buffer backing `role` on first use.
    pub(crate) fn shared_buffer_entry(&mut self, role: BufferRole) -> Result<&mut SharedBuffer> {
        if !self.shared_buffers.contains_key(&role) {
            let buffer = BufferBuilder::new(role)
                .size(SHARED_BUFFER_INITIAL_SIZE)
                .usage(Self::usage_for(role))
                .mappable(matches!(role, BufferRole::MappableUniform))
                .create(&self.gpu)?;
            let alloc = Alloc::new(SHARED_BUFFER_INITIAL_SIZE, SHARED_BUFFER_ALIGNMENT);
            self.shared_buffers.insert(role, SharedBuffer { buffer, alloc });
        }
        Ok(self.shared_buffers.get_mut(&role).unwrap())
    }

    /// Sub-allocates `size` bytes from `role`'s shared buffer, growing the
    /// backing buffer (via [`Buffer::resize`], which preserves contents)
    /// whenever the embedded [`Alloc`] reports the slot doesn't fit (spec
    /// §4.12: "grows the shared buffer on demand").
    pub(crate) fn alloc_shared(&mut self, role: BufferRole, size: u64) -> Result<Allocation> {
        let shared = self.shared_buffer_entry(role)?;
        let allocation = shared.alloc.alloc(size);
        if let Some(new_size) = allocation.resized {
            shared.buffer.resize(new_size)?;
        }
        Ok(allocation)
    }

    pub(crate) fn free_shared(&mut self, role: BufferRole, offset: u64) {
        if let Some(shared) = self.shared_buffers.get_mut(&role) {
            shared.alloc.free(offset);
        }
    }

    pub(crate) fn insert_standalone_buffer(&mut self, buffer: Buffer) -> ResourceId {
        let id = self.alloc_id();
        self.standalone_buffers.insert(id, buffer);
        id
    }

    pub(crate) fn standalone_buffer(&self, id: ResourceId) -> &Buffer {
        &self.standalone_buffers[&id]
    }

    pub(crate) fn standalone_buffer_mut(&mut self, id: ResourceId) -> &mut Buffer {
        self.standalone_buffers.get_mut(&id).expect("unknown standalone buffer id")
    }

    pub(crate) fn remove_standalone_buffer(&mut self, id: ResourceId) {
        self.standalone_buffers.remove(&id);
    }

    pub fn insert_image(&mut self, image: ImageSet) -> ResourceId {
        let id = self.alloc_id();
        self.images.insert(id, image);
        id
    }

    pub fn image(&self, id: ResourceId) -> &ImageSet {
        &self.images[&id]
    }

    pub fn image_mut(&mut self, id: ResourceId) -> &mut ImageSet {
        self.images.get_mut(&id).expect("unknown image id")
    }

    pub fn remove_image(&mut self, id: ResourceId) {
        self.images.remove(&id);
    }

    pub fn insert_sampler(&mut self, sampler: Sampler) -> ResourceId {
        let id = self.alloc_id();
        self.samplers.insert(id, sampler);
        id
    }

    pub fn sampler(&self, id: ResourceId) -> &Sampler {
        &self.samplers[&id]
    }

    pub fn remove_sampler(&mut self, id: ResourceId) {
        self.samplers.remove(&id);
    }

    pub fn insert_compute(&mut self, compute: ComputePipeline) -> ResourceId {
        let id = self.alloc_id();
        self.computes.insert(id, compute);
        id
    }

    pub fn compute(&self, id: ResourceId) -> &ComputePipeline {
        &self.computes[&id]
    }

    pub fn remove_compute(&mut self, id: ResourceId) {
        self.computes.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_for_every_role_carries_transfer_bits() {
        for role in [
            BufferRole::Staging,
            BufferRole::Vertex,
            BufferRole::Index,
            BufferRole::Storage,
            BufferRole::Uniform,
            BufferRole::MappableUniform,
            BufferRole::Indirect,
        ] {
            let usage = Resources::usage_for(role);
            assert!(usage.contains(vk::BufferUsageFlags::TRANSFER_SRC));
            assert!(usage.contains(vk::BufferUsageFlags::TRANSFER_DST));
        }
    }
}
