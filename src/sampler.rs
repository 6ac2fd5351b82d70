//! Samplers (spec §3 "Sampler", §4.5). Not present in the teacher, which
//! never binds a texture by anything other than its default-constructed
//! sampler; grounded on `original_source/src/sampler.c`'s per-axis address
//! mode and min/mag/mipmap filter fields.

use std::sync::Arc;

use ash::vk;

use crate::error::{vk_check, Result};
use crate::gpu::Gpu;
use crate::object::{Kind, Object};

#[derive(Debug, Clone, Copy)]
pub struct AddressModes {
    pub u: vk::SamplerAddressMode,
    pub v: vk::SamplerAddressMode,
    pub w: vk::SamplerAddressMode,
}

impl AddressModes {
    pub fn all(mode: vk::SamplerAddressMode) -> Self {
        Self { u: mode, v: mode, w: mode }
    }
}

pub struct Sampler {
    obj: Object,
    gpu: Arc<Gpu>,
    pub raw: vk::Sampler,
    pub min_filter: vk::Filter,
    pub mag_filter: vk::Filter,
    pub address_modes: AddressModes,
}

impl Sampler {
    /// `dvz_sampler`: creates a sampler with the given min/mag filters and
    /// per-axis address modes. Mipmapping is disabled (spec §4.5 Non-goals).
    pub fn create(
        gpu: &Arc<Gpu>,
        min_filter: vk::Filter,
        mag_filter: vk::Filter,
        address_modes: AddressModes,
    ) -> Result<Self> {
        let info = vk::SamplerCreateInfo::builder()
            .min_filter(min_filter)
            .mag_filter(mag_filter)
            .address_mode_u(address_modes.u)
            .address_mode_v(address_modes.v)
            .address_mode_w(address_modes.w)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .min_lod(0.0)
            .max_lod(0.0)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK);

        let raw = vk_check("vkCreateSampler", unsafe { gpu.device.create_sampler(&info, None) })?;

        let mut obj = Object::new(Kind::Sampler);
        obj.init().allocated().created();

        Ok(Self { obj, gpu: Arc::clone(gpu), raw, min_filter, mag_filter, address_modes })
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        if !self.obj.destroy() {
            return;
        }
        unsafe {
            self.gpu.device.destroy_sampler(self.raw, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_modes_all_applies_to_every_axis() {
        let modes = AddressModes::all(vk::SamplerAddressMode::CLAMP_TO_EDGE);
        assert_eq!(modes.u, vk::SamplerAddressMode::CLAMP_TO_EDGE);
        assert_eq!(modes.v, vk::SamplerAddressMode::CLAMP_TO_EDGE);
        assert_eq!(modes.w, vk::SamplerAddressMode::CLAMP_TO_EDGE);
    }
}
