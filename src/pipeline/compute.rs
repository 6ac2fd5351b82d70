//! Compute pipelines (spec §3 "Compute", §4.8). Grounded on the teacher's
//! `create_compute_pipeline`, generalized to runtime-loaded shaders and an
//! externally-owned [`DescriptorSlots`] layout rather than one baked in.

use std::ffi::CStr;
use std::sync::Arc;

use ash::vk;

use crate::descriptor_slots::DescriptorSlots;
use crate::error::{vk_check, Result};
use crate::gpu::Gpu;
use crate::object::{Kind, Object};

use super::specialization::SpecializationData;
use super::{load_shader_module, PipelineCommon, ShaderSource};

pub struct ComputePipeline {
    obj: Object,
    common: PipelineCommon,
    pub pipeline_layout: vk::PipelineLayout,
}

const ENTRY_POINT: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

impl ComputePipeline {
    /// `dvz_compute`: one shader stage, one pipeline layout borrowed from
    /// `slots`, and optional specialization constants (spec §4.8).
    pub fn create(
        gpu: &Arc<Gpu>,
        slots: &DescriptorSlots,
        shader: ShaderSource,
        specialization: Option<&SpecializationData>,
    ) -> Result<Self> {
        let module = load_shader_module(gpu, shader)?;

        let mut stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(module)
            .name(ENTRY_POINT);
        let spec_info;
        if let Some(specialization) = specialization {
            spec_info = specialization.info();
            stage = stage.specialization_info(&spec_info);
        }

        let info = vk::ComputePipelineCreateInfo::builder().stage(stage.build()).layout(slots.pipeline_layout);

        let pipeline = vk_check(
            "vkCreateComputePipelines",
            unsafe {
                gpu.device
                    .create_compute_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&info), None)
                    .map_err(|(_, result)| result)
            },
        )?[0];

        let mut obj = Object::new(Kind::Compute);
        obj.init().allocated().created();

        Ok(Self {
            obj,
            common: PipelineCommon { gpu: Arc::clone(gpu), pipeline, shader_modules: vec![module] },
            pipeline_layout: slots.pipeline_layout,
        })
    }

    pub fn raw(&self) -> vk::Pipeline {
        self.common.pipeline
    }
}

impl Drop for ComputePipeline {
    fn drop(&mut self) {
        self.obj.destroy();
    }
}
