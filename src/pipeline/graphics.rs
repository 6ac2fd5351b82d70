//! Graphics pipelines (spec §3 "Graphics", §4.8). Grounded on the teacher's
//! `create_graphics_pipeline`, generalized from one hardcoded triangle-list/
//! no-blend/no-depth configuration to the declared vertex layout, blend,
//! depth, polygon, cull, and front-face state spec §4.8 calls for, plus an
//! always-present picking attachment.

use std::ffi::CStr;
use std::sync::Arc;

use ash::vk;

use crate::descriptor_slots::DescriptorSlots;
use crate::error::{vk_check, Result};
use crate::gpu::Gpu;
use crate::object::{Kind, Object};
use crate::renderpass::Renderpass;

use super::specialization::SpecializationData;
use super::{load_shader_module, PipelineCommon, ShaderSource};

const ENTRY_POINT: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    None,
    Alpha,
    Additive,
}

impl BlendMode {
    fn attachment_state(self, picking: bool) -> vk::PipelineColorBlendAttachmentState {
        // "The picking attachment is always blend-disabled with a full RGBA
        // write mask, regardless of the draw's own blend mode" (spec §4.8).
        if picking {
            return vk::PipelineColorBlendAttachmentState::builder()
                .blend_enable(false)
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .build();
        }
        match self {
            BlendMode::None => vk::PipelineColorBlendAttachmentState::builder()
                .blend_enable(false)
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .build(),
            BlendMode::Alpha => vk::PipelineColorBlendAttachmentState::builder()
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .alpha_blend_op(vk::BlendOp::ADD)
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .build(),
            BlendMode::Additive => vk::PipelineColorBlendAttachmentState::builder()
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ONE)
                .alpha_blend_op(vk::BlendOp::ADD)
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .build(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DepthState {
    pub test: bool,
    pub write: bool,
    pub compare: vk::CompareOp,
}

impl Default for DepthState {
    fn default() -> Self {
        Self { test: false, write: false, compare: vk::CompareOp::LESS }
    }
}

#[derive(Debug, Clone)]
pub struct VertexLayout {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl VertexLayout {
    pub fn empty() -> Self {
        Self { bindings: Vec::new(), attributes: Vec::new() }
    }
}

pub struct GraphicsPipelineBuilder<'a> {
    shaders: Vec<(vk::ShaderStageFlags, ShaderSource<'a>, Option<&'a SpecializationData>)>,
    vertex_layout: VertexLayout,
    topology: vk::PrimitiveTopology,
    blend: BlendMode,
    depth: DepthState,
    polygon_mode: vk::PolygonMode,
    cull_mode: vk::CullModeFlags,
    front_face: vk::FrontFace,
    picking: bool,
}

impl<'a> GraphicsPipelineBuilder<'a> {
    pub fn new() -> Self {
        Self {
            shaders: Vec::new(),
            vertex_layout: VertexLayout::empty(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            blend: BlendMode::None,
            depth: DepthState::default(),
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            picking: false,
        }
    }

    pub fn shader(mut self, stage: vk::ShaderStageFlags, source: ShaderSource<'a>, specialization: Option<&'a SpecializationData>) -> Self {
        self.shaders.push((stage, source, specialization));
        self
    }

    pub fn vertex_layout(mut self, layout: VertexLayout) -> Self {
        self.vertex_layout = layout;
        self
    }

    pub fn topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    pub fn depth(mut self, depth: DepthState) -> Self {
        self.depth = depth;
        self
    }

    pub fn polygon_mode(mut self, mode: vk::PolygonMode) -> Self {
        self.polygon_mode = mode;
        self
    }

    pub fn cull_mode(mut self, mode: vk::CullModeFlags, front_face: vk::FrontFace) -> Self {
        self.cull_mode = mode;
        self.front_face = front_face;
        self
    }

    /// Adds a second, always-blend-disabled full-write attachment carrying
    /// object/index picking IDs (spec §4.8).
    pub fn picking(mut self, enabled: bool) -> Self {
        self.picking = enabled;
        self
    }

    pub fn create(self, gpu: &Arc<Gpu>, slots: &DescriptorSlots, renderpass: &Renderpass, extent: vk::Extent2D) -> Result<GraphicsPipeline> {
        let mut shader_modules = Vec::with_capacity(self.shaders.len());
        let mut stage_infos = Vec::with_capacity(self.shaders.len());
        let mut spec_infos = Vec::with_capacity(self.shaders.len());

        for (stage, source, specialization) in &self.shaders {
            let module = load_shader_module(gpu, match source {
                ShaderSource::Bytecode(b) => ShaderSource::Bytecode(b),
                ShaderSource::File(p) => ShaderSource::File(p),
            })?;
            shader_modules.push(module);
            spec_infos.push(specialization.map(|s| s.info()));
        }
        for (i, (stage, _, _)) in self.shaders.iter().enumerate() {
            let mut info = vk::PipelineShaderStageCreateInfo::builder()
                .stage(*stage)
                .module(shader_modules[i])
                .name(ENTRY_POINT);
            if let Some(spec_info) = spec_infos[i].as_ref() {
                info = info.specialization_info(spec_info);
            }
            stage_infos.push(info.build());
        }

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&self.vertex_layout.bindings)
            .vertex_attribute_descriptions(&self.vertex_layout.attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder().topology(self.topology);

        let viewports = [vk::Viewport { x: 0.0, y: 0.0, width: extent.width as f32, height: extent.height as f32, min_depth: 0.0, max_depth: 1.0 }];
        let scissors = [vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder().viewports(&viewports).scissors(&scissors);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(self.polygon_mode)
            .line_width(1.0)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .depth_bias_enable(false);

        let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(self.depth.test)
            .depth_write_enable(self.depth.write)
            .depth_compare_op(self.depth.compare)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let mut attachment_states = vec![self.blend.attachment_state(false)];
        if self.picking {
            attachment_states.push(self.blend.attachment_state(true));
        }
        let color_blend = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&attachment_states);

        // "Dynamic state is always {viewport, scissor}" (spec §4.8), so a
        // resize never requires rebuilding the pipeline itself.
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stage_infos)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(slots.pipeline_layout)
            .render_pass(renderpass.raw)
            .subpass(0);

        let pipeline = vk_check(
            "vkCreateGraphicsPipelines",
            unsafe {
                gpu.device
                    .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&info), None)
                    .map_err(|(_, result)| result)
            },
        )?[0];

        let mut obj = Object::new(Kind::Graphics);
        obj.init().allocated().created();

        Ok(GraphicsPipeline {
            obj,
            common: PipelineCommon { gpu: Arc::clone(gpu), pipeline, shader_modules },
            pipeline_layout: slots.pipeline_layout,
        })
    }
}

pub struct GraphicsPipeline {
    obj: Object,
    common: PipelineCommon,
    pub pipeline_layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    pub fn builder<'a>() -> GraphicsPipelineBuilder<'a> {
        GraphicsPipelineBuilder::new()
    }

    pub fn raw(&self) -> vk::Pipeline {
        self.common.pipeline
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        self.obj.destroy();
    }
}
