//! Render passes (spec §3 "Renderpass", §4.7). Grounded on the teacher's
//! `create_render_pass`, generalized from one hardcoded color attachment
//! ending in `PRESENT_SRC_KHR` to a declared list of attachments (each with
//! its own load/store ops and pre/post layouts) and subpasses with explicit
//! stage/access-mask dependencies.

use std::sync::Arc;

use ash::vk;

use crate::error::{vk_check, Result};
use crate::gpu::Gpu;
use crate::object::{Kind, Object};

#[derive(Debug, Clone, Copy)]
pub struct Attachment {
    pub format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
    pub reference_layout: vk::ImageLayout,
    pub clear_value: vk::ClearValue,
}

impl Attachment {
    pub fn color(format: vk::Format, final_layout: vk::ImageLayout) -> Self {
        Self {
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout,
            reference_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            clear_value: vk::ClearValue { color: vk::ClearColorValue { float32: [0.0, 0.0, 0.0, 1.0] } },
        }
    }

    pub fn depth(format: vk::Format) -> Self {
        Self {
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            reference_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            clear_value: vk::ClearValue { depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 } },
        }
    }
}

pub struct Renderpass {
    obj: Object,
    gpu: Arc<Gpu>,
    pub raw: vk::RenderPass,
    pub attachments: Vec<Attachment>,
    /// Parallel to `attachments`, for `vkCmdBeginRenderPass` (spec §4.7: "a
    /// clear-values vector kept parallel to the attachment list").
    pub clear_values: Vec<vk::ClearValue>,
}

impl Renderpass {
    /// `dvz_renderpass`: a single subpass referencing every attachment,
    /// with one dependency from `VK_SUBPASS_EXTERNAL` that waits for any
    /// previous writer of the color/depth attachments before this subpass's
    /// own writes begin (spec §4.7).
    pub fn create(gpu: &Arc<Gpu>, attachments: Vec<Attachment>) -> Result<Self> {
        assert!(!attachments.is_empty(), "a renderpass needs at least one attachment");

        let descriptions: Vec<vk::AttachmentDescription> = attachments
            .iter()
            .map(|a| {
                vk::AttachmentDescription::builder()
                    .format(a.format)
                    .samples(a.samples)
                    .load_op(a.load_op)
                    .store_op(a.store_op)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(a.initial_layout)
                    .final_layout(a.final_layout)
                    .build()
            })
            .collect();

        let mut color_refs = Vec::new();
        let mut depth_ref: Option<vk::AttachmentReference> = None;
        for (i, a) in attachments.iter().enumerate() {
            let reference = vk::AttachmentReference { attachment: i as u32, layout: a.reference_layout };
            if a.reference_layout == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL {
                depth_ref = Some(reference);
            } else {
                color_refs.push(reference);
            }
        }

        let mut subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if let Some(depth_ref) = depth_ref.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }
        let subpasses = [subpass.build()];

        let has_depth = depth_ref.is_some();
        let mut dst_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let mut dst_access = vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
        if has_depth {
            dst_stage |= vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
            dst_access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
        }
        let dependencies = [vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(dst_stage)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(dst_stage)
            .dst_access_mask(dst_access)
            .build()];

        let info = vk::RenderPassCreateInfo::builder()
            .attachments(&descriptions)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let raw = vk_check("vkCreateRenderPass", unsafe { gpu.device.create_render_pass(&info, None) })?;

        let clear_values = attachments.iter().map(|a| a.clear_value).collect();

        let mut obj = Object::new(Kind::Renderpass);
        obj.init().allocated().created();

        Ok(Self { obj, gpu: Arc::clone(gpu), raw, attachments, clear_values })
    }
}

impl Drop for Renderpass {
    fn drop(&mut self) {
        if !self.obj.destroy() {
            return;
        }
        unsafe {
            self.gpu.device.destroy_render_pass(self.raw, None);
        }
    }
}
