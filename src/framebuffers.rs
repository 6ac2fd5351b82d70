//! Framebuffers (spec §3 "Framebuffers", §4.7). Not present standalone in
//! the teacher (its single swapchain image view is bound directly at
//! recording time); grounded on the same renderpass-binds-to-image-views
//! shape as `create_render_pass`'s caller, generalized to bind either one
//! framebuffer or N (one per swapchain image).

use std::sync::Arc;

use ash::vk;

use crate::error::{vk_check, Result};
use crate::gpu::Gpu;
use crate::object::{Kind, Object};
use crate::renderpass::Renderpass;

pub struct Framebuffers {
    obj: Object,
    gpu: Arc<Gpu>,
    pub raw: Vec<vk::Framebuffer>,
    pub width: u32,
    pub height: u32,
}

impl Framebuffers {
    /// `dvz_framebuffers`: `image_views[i]` is the tuple of attachment views
    /// for framebuffer `i`; size is taken from attachment 0 (spec §4.7).
    pub fn create(gpu: &Arc<Gpu>, renderpass: &Renderpass, image_views: &[Vec<vk::ImageView>], width: u32, height: u32) -> Result<Self> {
        assert!(!image_views.is_empty(), "a framebuffer set needs at least one framebuffer");

        let raw = image_views
            .iter()
            .map(|views| {
                let info = vk::FramebufferCreateInfo::builder()
                    .render_pass(renderpass.raw)
                    .attachments(views)
                    .width(width)
                    .height(height)
                    .layers(1);
                vk_check("vkCreateFramebuffer", unsafe { gpu.device.create_framebuffer(&info, None) })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut obj = Object::new(Kind::Framebuffers);
        obj.init().allocated().created();

        Ok(Self { obj, gpu: Arc::clone(gpu), raw, width, height })
    }

    pub fn get(&self, index: u32) -> vk::Framebuffer {
        self.raw[crate::frame::clip(index, self.raw.len() as u32) as usize]
    }
}

impl Drop for Framebuffers {
    fn drop(&mut self) {
        if !self.obj.destroy() {
            return;
        }
        unsafe {
            for &fb in &self.raw {
                self.gpu.device.destroy_framebuffer(fb, None);
            }
        }
    }
}
