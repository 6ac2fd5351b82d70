//! Buffer region sets (spec §3 "Buffer region set", §4.3). Stateless views
//! into a [`Buffer`] — not present in the teacher, which binds its single
//! `Buffer` directly; this is the piece that lets one physical buffer back
//! N logical per-frame copies (the dup-ring mechanism, spec §4.11/§4.12).

use crate::buffer::Buffer;
use crate::error::Result;
use crate::frame::clip;

#[derive(Debug, Clone, Copy)]
pub struct BufferRegionSet {
    pub count: u32,
    pub offset: u64,
    pub size: u64,
    pub alignment: u64,
}

/// Rounds `size` up to the next multiple of `alignment`.
pub fn aligned_size(size: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        size
    } else {
        size.div_ceil(alignment) * alignment
    }
}

impl BufferRegionSet {
    pub fn new(count: u32, offset: u64, size: u64, alignment: u64) -> Self {
        assert!(count > 0, "a buffer region set must have at least one slice");
        Self { count, offset, size, alignment }
    }

    /// Offset of slice `index`: `offset + i · aligned_size(size, alignment)`.
    pub fn offset_of(&self, index: u32) -> u64 {
        assert!(index < self.count, "region index {index} out of range (count {})", self.count);
        self.offset + index as u64 * aligned_size(self.size, self.alignment)
    }

    /// The slice seen by frame `frame`, clipped per spec §4.10: frame `i`
    /// sees slice `i` when `count == N`, and slice 0 for every frame when
    /// `count == 1`.
    pub fn offset_for_frame(&self, frame: u32) -> u64 {
        self.offset_of(clip(frame, self.count))
    }

    pub fn upload(&self, buffer: &mut Buffer, index: u32, data: &[u8]) -> Result<()> {
        assert!(data.len() as u64 <= self.size, "upload larger than region size");
        buffer.write(self.offset_of(index), data)
    }

    pub fn download(&self, buffer: &Buffer, index: u32) -> Result<Vec<u8>> {
        buffer.read(self.offset_of(index), self.size as usize)
    }
}

/// `dvz_buffer_regions_copy`: copies one pair when both indices are in
/// range, or all corresponding pairs when an index equals the owning set's
/// `count` (spec §4.3), using the GPU's internal transfer command buffer.
pub fn copy(
    src_regions: &BufferRegionSet,
    src_buffer: &Buffer,
    src_idx: u32,
    src_offset: u64,
    dst_regions: &BufferRegionSet,
    dst_buffer: &Buffer,
    dst_idx: u32,
    dst_offset: u64,
    size: u64,
) -> Result<()> {
    let gpu = src_buffer.gpu.clone();
    let pairs: Vec<(u32, u32)> = if src_idx < src_regions.count && dst_idx < dst_regions.count {
        vec![(src_idx, dst_idx)]
    } else {
        let n = src_regions.count.min(dst_regions.count);
        (0..n).map(|i| (i, i)).collect()
    };

    let src_raw = src_buffer.raw;
    let dst_raw = dst_buffer.raw;

    gpu.one_time_submit(|cmd| {
        let regions: Vec<ash::vk::BufferCopy> = pairs
            .iter()
            .map(|&(si, di)| ash::vk::BufferCopy {
                src_offset: src_regions.offset_of(si) + src_offset,
                dst_offset: dst_regions.offset_of(di) + dst_offset,
                size,
            })
            .collect();
        unsafe {
            gpu.device.cmd_copy_buffer(cmd, src_raw, dst_raw, &regions);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_evenly_spaced_and_aligned() {
        let regions = BufferRegionSet::new(3, 0, 40, 16);
        assert_eq!(regions.offset_of(0), 0);
        assert_eq!(regions.offset_of(1), aligned_size(40, 16));
        assert_eq!(regions.offset_of(2), 2 * aligned_size(40, 16));
    }

    #[test]
    fn shared_region_clips_every_frame_to_slice_zero() {
        let regions = BufferRegionSet::new(1, 128, 64, 16);
        for frame in 0..4 {
            assert_eq!(regions.offset_for_frame(frame), regions.offset_of(0));
        }
    }

    #[test]
    fn per_frame_region_passes_frame_index_through() {
        let regions = BufferRegionSet::new(3, 0, 64, 16);
        for frame in 0..3 {
            assert_eq!(regions.offset_for_frame(frame), regions.offset_of(frame));
        }
    }
}
