//! Command buffer sets (spec §3 "Commands", §4.10). Grounded on the
//! teacher's `CommandBuffer::record`/`with_render_pass`, generalized from a
//! single command buffer allocated ad hoc to an N-deep set (one per frame
//! in flight) allocated together from the GPU's per-family pool.

use std::sync::Arc;

use ash::vk;

use crate::error::{vk_check, Result};
use crate::frame::clip;
use crate::framebuffers::Framebuffers;
use crate::gpu::Gpu;
use crate::object::{Kind, Object};
use crate::renderpass::Renderpass;

pub struct Commands {
    obj: Object,
    gpu: Arc<Gpu>,
    pool: vk::CommandPool,
    raw: Vec<vk::CommandBuffer>,
}

impl Commands {
    /// `dvz_commands`: allocates `count` primary command buffers from the
    /// pool backing `queue_family` (spec §4.10).
    pub fn create(gpu: &Arc<Gpu>, queue_family: u32, count: u32) -> Result<Self> {
        assert!(count > 0, "a command buffer set must have at least one slot");
        let pool = gpu.command_pool(queue_family);
        let info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        let raw = vk_check("vkAllocateCommandBuffers", unsafe { gpu.device.allocate_command_buffers(&info) })?;

        let mut obj = Object::new(Kind::Commands);
        obj.init().allocated().created();

        Ok(Self { obj, gpu: Arc::clone(gpu), pool, raw })
    }

    pub fn get(&self, frame: u32) -> vk::CommandBuffer {
        self.raw[clip(frame, self.raw.len() as u32) as usize]
    }

    /// `dvz_cmd_begin`/`dvz_cmd_end`: records `callback` between
    /// `vkBeginCommandBuffer` and `vkEndCommandBuffer` on slot `frame`'s
    /// buffer (spec §4.10).
    pub fn record(&self, frame: u32, callback: impl FnOnce(vk::CommandBuffer)) -> Result<()> {
        let cmd = self.get(frame);
        let begin_info = vk::CommandBufferBeginInfo::builder();
        vk_check("vkBeginCommandBuffer", unsafe { self.gpu.device.begin_command_buffer(cmd, &begin_info) })?;
        callback(cmd);
        vk_check("vkEndCommandBuffer", unsafe { self.gpu.device.end_command_buffer(cmd) })
    }

    /// `dvz_cmd_begin_renderpass`/`dvz_cmd_end_renderpass`: wraps `callback`
    /// in `vkCmdBeginRenderPass`/`vkCmdEndRenderPass` using `renderpass`'s
    /// own clear-values vector and `framebuffers`'s per-frame framebuffer,
    /// clipped per spec §4.10/§9.
    pub fn record_renderpass(
        &self,
        frame: u32,
        renderpass: &Renderpass,
        framebuffers: &Framebuffers,
        callback: impl FnOnce(vk::CommandBuffer),
    ) -> Result<()> {
        self.record(frame, |cmd| {
            let render_area = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D { width: framebuffers.width, height: framebuffers.height },
            };
            let begin_info = vk::RenderPassBeginInfo::builder()
                .render_pass(renderpass.raw)
                .framebuffer(framebuffers.get(frame))
                .render_area(render_area)
                .clear_values(&renderpass.clear_values);
            unsafe {
                self.gpu.device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
            }
            callback(cmd);
            unsafe {
                self.gpu.device.cmd_end_render_pass(cmd);
            }
        })
    }
}

impl Drop for Commands {
    fn drop(&mut self) {
        if !self.obj.destroy() {
            return;
        }
        unsafe {
            self.gpu.device.free_command_buffers(self.pool, &self.raw);
        }
    }
}
