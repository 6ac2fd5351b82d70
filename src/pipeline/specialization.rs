//! Specialization constants (spec §4.8). Not present in the teacher, which
//! never parameterizes a shader at pipeline-creation time; grounded on the
//! `VkSpecializationInfo`/`VkSpecializationMapEntry` pair Vulkan itself
//! defines, packed the way spec §4.8 describes: every constant for a given
//! stage lands in one contiguous, 8-byte-aligned buffer.

use ash::vk;

#[derive(Debug, Clone, Copy)]
pub enum ConstantValue {
    U32(u32),
    I32(i32),
    F32(f32),
    Bool(bool),
}

impl ConstantValue {
    fn size(&self) -> usize {
        match self {
            ConstantValue::U32(_) | ConstantValue::I32(_) | ConstantValue::F32(_) | ConstantValue::Bool(_) => 4,
        }
    }

    fn write_into(&self, buf: &mut [u8]) {
        let bytes: [u8; 4] = match *self {
            ConstantValue::U32(v) => v.to_ne_bytes(),
            ConstantValue::I32(v) => v.to_ne_bytes(),
            ConstantValue::F32(v) => v.to_ne_bytes(),
            ConstantValue::Bool(v) => (v as u32).to_ne_bytes(),
        };
        buf[..4].copy_from_slice(&bytes);
    }
}

/// One stage's packed specialization data: a map-entry list plus the byte
/// buffer they index into. Kept alive alongside the
/// `VkSpecializationInfo` that borrows from it.
pub struct SpecializationData {
    pub entries: Vec<vk::SpecializationMapEntry>,
    pub data: Vec<u8>,
}

/// Packs `(constant_id, value)` pairs into one 8-byte-aligned buffer,
/// assigning each entry its own aligned offset within it (spec §4.8: "one
/// aligned buffer per stage").
pub fn pack(constants: &[(u32, ConstantValue)]) -> SpecializationData {
    const ALIGN: usize = 8;
    let mut entries = Vec::with_capacity(constants.len());
    let mut data = Vec::new();

    for &(constant_id, value) in constants {
        let offset = data.len().div_ceil(ALIGN) * ALIGN;
        data.resize(offset, 0);
        let size = value.size();
        data.resize(offset + size, 0);
        value.write_into(&mut data[offset..offset + size]);
        entries.push(vk::SpecializationMapEntry { constant_id, offset: offset as u32, size });
    }

    let padded_len = data.len().div_ceil(ALIGN) * ALIGN;
    data.resize(padded_len, 0);

    SpecializationData { entries, data }
}

impl SpecializationData {
    pub fn info(&self) -> vk::SpecializationInfo {
        vk::SpecializationInfo::builder()
            .map_entries(&self.entries)
            .data(&self.data)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_land_on_eight_byte_boundaries() {
        let packed = pack(&[(0, ConstantValue::Bool(true)), (1, ConstantValue::F32(2.5)), (2, ConstantValue::U32(7))]);
        for entry in &packed.entries {
            assert_eq!(entry.offset % 8, 0, "entry at constant_id {} is not 8-byte aligned", entry.constant_id);
        }
        assert_eq!(packed.data.len() % 8, 0);
    }

    #[test]
    fn round_trips_values_at_their_offsets() {
        let packed = pack(&[(0, ConstantValue::U32(42)), (1, ConstantValue::I32(-3))]);
        let a = u32::from_ne_bytes(packed.data[packed.entries[0].offset as usize..][..4].try_into().unwrap());
        let b = i32::from_ne_bytes(packed.data[packed.entries[1].offset as usize..][..4].try_into().unwrap());
        assert_eq!(a, 42);
        assert_eq!(b, -3);
    }
}
