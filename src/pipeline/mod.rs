//! Pipelines (spec §3 "Compute"/"Graphics", §4.8). Grounded on the
//! teacher's `PipelineCommon`/`Pipeline` trait, generalized from
//! compile-time-embedded shader metadata to shaders loaded from file,
//! source, or raw bytecode at runtime (spec §6).

pub mod compute;
pub mod graphics;
pub mod specialization;

use std::path::Path;
use std::sync::Arc;

use ash::vk;

use crate::error::{vk_check, Error, Result};
use crate::gpu::Gpu;

/// How a shader's SPIR-V bytecode was obtained (spec §4.8, §6: "the core
/// itself never invokes a shader compiler — it consumes SPIR-V directly or
/// delegates compilation to an external collaborator").
pub enum ShaderSource<'a> {
    Bytecode(&'a [u8]),
    File(&'a Path),
}

pub(crate) fn load_shader_module(gpu: &Gpu, source: ShaderSource) -> Result<vk::ShaderModule> {
    let bytes = match source {
        ShaderSource::Bytecode(bytes) => bytes.to_vec(),
        ShaderSource::File(path) => std::fs::read(path)
            .map_err(|e| Error::Other(anyhow::anyhow!("failed to read shader file {}: {e}", path.display())))?,
    };
    let code = ash::util::read_spv(&mut std::io::Cursor::new(&bytes))
        .map_err(|e| Error::Other(anyhow::anyhow!("invalid SPIR-V: {e}")))?;
    let info = vk::ShaderModuleCreateInfo::builder().code(&code);
    vk_check("vkCreateShaderModule", unsafe { gpu.device.create_shader_module(&info, None) })
}

/// Fields shared by [`compute::ComputePipeline`] and
/// [`graphics::GraphicsPipeline`] (spec §4.8): the compiled pipeline, its
/// layout (borrowed from a [`crate::descriptor_slots::DescriptorSlots`],
/// not owned here), and the shader modules kept alive until `Drop`.
pub struct PipelineCommon {
    pub gpu: Arc<Gpu>,
    pub pipeline: vk::Pipeline,
    pub shader_modules: Vec<vk::ShaderModule>,
}

impl Drop for PipelineCommon {
    fn drop(&mut self) {
        unsafe {
            for &module in &self.shader_modules {
                self.gpu.device.destroy_shader_module(module, None);
            }
            self.gpu.device.destroy_pipeline(self.pipeline, None);
        }
    }
}
