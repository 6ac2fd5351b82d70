//! Semaphores and fences (spec §3 "Semaphores"/"Fences", §4.9-§4.10).
//! Grounded on the teacher's per-swapchain-image semaphore pools in
//! `Swapchain::new`, generalized into standalone N-deep sets any command
//! sequence can request, not just the swapchain's own acquire/present pair.

use std::sync::Arc;

use ash::vk;

use crate::error::{vk_check, Result};
use crate::frame::clip;
use crate::gpu::Gpu;
use crate::object::{Kind, Object};

pub struct Semaphores {
    obj: Object,
    gpu: Arc<Gpu>,
    raw: Vec<vk::Semaphore>,
}

impl Semaphores {
    pub fn create(gpu: &Arc<Gpu>, count: u32) -> Result<Self> {
        assert!(count > 0, "a semaphore set must have at least one slot");
        let raw = (0..count)
            .map(|_| vk_check("vkCreateSemaphore", unsafe { gpu.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }))
            .collect::<Result<Vec<_>>>()?;
        let mut obj = Object::new(Kind::Semaphores);
        obj.init().allocated().created();
        Ok(Self { obj, gpu: Arc::clone(gpu), raw })
    }

    pub fn get(&self, frame: u32) -> vk::Semaphore {
        self.raw[clip(frame, self.raw.len() as u32) as usize]
    }

    pub fn count(&self) -> u32 {
        self.raw.len() as u32
    }
}

impl Drop for Semaphores {
    fn drop(&mut self) {
        if !self.obj.destroy() {
            return;
        }
        unsafe {
            for &s in &self.raw {
                self.gpu.device.destroy_semaphore(s, None);
            }
        }
    }
}

pub struct Fences {
    obj: Object,
    gpu: Arc<Gpu>,
    raw: Vec<vk::Fence>,
}

impl Fences {
    /// Fences are created signaled so the first frame's "wait for the
    /// previous occupant of this slot" is a no-op (spec §4.10).
    pub fn create(gpu: &Arc<Gpu>, count: u32) -> Result<Self> {
        assert!(count > 0, "a fence set must have at least one slot");
        let info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);
        let raw = (0..count)
            .map(|_| vk_check("vkCreateFence", unsafe { gpu.device.create_fence(&info, None) }))
            .collect::<Result<Vec<_>>>()?;
        let mut obj = Object::new(Kind::Fences);
        obj.init().allocated().created();
        Ok(Self { obj, gpu: Arc::clone(gpu), raw })
    }

    pub fn get(&self, frame: u32) -> vk::Fence {
        self.raw[clip(frame, self.raw.len() as u32) as usize]
    }

    pub fn wait(&self, frame: u32) -> Result<()> {
        let fence = self.get(frame);
        vk_check("vkWaitForFences", unsafe { self.gpu.device.wait_for_fences(std::slice::from_ref(&fence), true, u64::MAX) })
    }

    pub fn reset(&self, frame: u32) -> Result<()> {
        let fence = self.get(frame);
        vk_check("vkResetFences", unsafe { self.gpu.device.reset_fences(std::slice::from_ref(&fence)) })
    }
}

impl Drop for Fences {
    fn drop(&mut self) {
        if !self.obj.destroy() {
            return;
        }
        unsafe {
            for &f in &self.raw {
                self.gpu.device.destroy_fence(f, None);
            }
        }
    }
}
