//! Barriers (spec §3 "Barrier", §4.10). Grounded on the teacher's
//! `RecordingCommandBuffer::image_barrier`, generalized into a builder that
//! accumulates any number of buffer and image barriers before a single
//! `vkCmdPipelineBarrier` call, the way a real frame graph batches its
//! synchronization points instead of emitting one barrier per resource.

use ash::vk;

pub struct Barrier {
    src_stage: vk::PipelineStageFlags,
    dst_stage: vk::PipelineStageFlags,
    buffer_barriers: Vec<vk::BufferMemoryBarrier>,
    image_barriers: Vec<vk::ImageMemoryBarrier>,
}

impl Barrier {
    pub fn new(src_stage: vk::PipelineStageFlags, dst_stage: vk::PipelineStageFlags) -> Self {
        Self { src_stage, dst_stage, buffer_barriers: Vec::new(), image_barriers: Vec::new() }
    }

    pub fn buffer(mut self, buffer: vk::Buffer, src_access: vk::AccessFlags, dst_access: vk::AccessFlags) -> Self {
        self.buffer_barriers.push(
            vk::BufferMemoryBarrier::builder()
                .buffer(buffer)
                .offset(0)
                .size(vk::WHOLE_SIZE)
                .src_access_mask(src_access)
                .dst_access_mask(dst_access)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .build(),
        );
        self
    }

    pub fn image(
        mut self,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        src_access: vk::AccessFlags,
        dst_access: vk::AccessFlags,
    ) -> Self {
        self.image_barriers.push(
            vk::ImageMemoryBarrier::builder()
                .image(image)
                .old_layout(old_layout)
                .new_layout(new_layout)
                .src_access_mask(src_access)
                .dst_access_mask(dst_access)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .subresource_range(vk::ImageSubresourceRange::builder().aspect_mask(aspect).level_count(1).layer_count(1).build())
                .build(),
        );
        self
    }

    pub fn record(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        if self.buffer_barriers.is_empty() && self.image_barriers.is_empty() {
            return;
        }
        unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                self.src_stage,
                self.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &self.buffer_barriers,
                &self.image_barriers,
            );
        }
    }
}
