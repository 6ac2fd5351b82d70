//! Swapchains (spec §3 "Swapchain", §4.9). Grounded on the teacher's
//! `Swapchain::new`/`acquire_next_image`/`present`/`recreate`, generalized
//! from a hardcoded min-image-count+1/BGRA8-sRGB format pair into the
//! negotiated surface/format/present-mode/size spec §4.9 describes, and
//! from a panicking acquire path into the reactive need-recreate/
//! need-destroy object-lifecycle transitions spec §4.9 calls for.

use std::sync::Arc;

use ash::extensions::khr;
use ash::vk;

use crate::error::{vk_check, Error, Result};
use crate::gpu::Gpu;
use crate::object::{Kind, Object};

/// 100ms: long enough that a healthy present loop never observes a
/// timeout, short enough that a dead surface doesn't wedge the caller
/// (spec §4.9).
const ACQUIRE_TIMEOUT_NS: u64 = 100_000_000;

pub enum AcquireOutcome {
    Image { index: u32, acquire_semaphore: vk::Semaphore },
    NeedRecreate,
    NeedDestroy,
}

pub struct Swapchain {
    obj: Object,
    gpu: Arc<Gpu>,
    surface_fns: ash::extensions::khr::Surface,
    surface: vk::SurfaceKHR,
    fns: khr::Swapchain,
    pub raw: vk::SwapchainKHR,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    acquire_semaphores: Vec<vk::Semaphore>,
    present_semaphores: Vec<vk::Semaphore>,
    next_semaphore: usize,
}

impl Swapchain {
    /// `dvz_swapchain`: queries surface capabilities/formats/present modes,
    /// negotiates min-image-count (capabilities `min_image_count + 1`,
    /// clamped to `max_image_count` when nonzero), prefers BGRA8 sRGB when
    /// offered, and negotiates present mode defaulting to FIFO (spec §4.9:
    /// "present-mode negotiation defaulting to FIFO").
    pub fn create(
        gpu: &Arc<Gpu>,
        instance: &ash::Instance,
        surface_fns: ash::extensions::khr::Surface,
        surface: vk::SurfaceKHR,
        preferred_present_mode: vk::PresentModeKHR,
    ) -> Result<Self> {
        let _ = instance;
        let capabilities = vk_check(
            "vkGetPhysicalDeviceSurfaceCapabilitiesKHR",
            unsafe { surface_fns.get_physical_device_surface_capabilities(gpu.physical.raw, surface) },
        )?;

        let mut image_count = capabilities.min_image_count + 1;
        if capabilities.max_image_count > 0 {
            image_count = image_count.min(capabilities.max_image_count);
        }

        let formats = vk_check(
            "vkGetPhysicalDeviceSurfaceFormatsKHR",
            unsafe { surface_fns.get_physical_device_surface_formats(gpu.physical.raw, surface) },
        )?;
        let format = formats
            .iter()
            .find(|f| f.format == vk::Format::B8G8R8A8_UNORM && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .or_else(|| formats.first())
            .copied()
            .ok_or(Error::UnsupportedSurface)?;

        let present_mode = if gpu.supports_present_mode(preferred_present_mode) {
            preferred_present_mode
        } else {
            vk::PresentModeKHR::FIFO
        };

        let extent = capabilities.current_extent;

        let fns = khr::Swapchain::new(instance, &gpu.device);
        let swapchain_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let raw = vk_check("vkCreateSwapchainKHR", unsafe { fns.create_swapchain(&swapchain_info, None) })?;

        let actual_count = vk_check("vkGetSwapchainImagesKHR", unsafe { fns.get_swapchain_images(raw) })?.len() as u32;

        let acquire_semaphores = (0..actual_count)
            .map(|_| vk_check("vkCreateSemaphore", unsafe { gpu.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }))
            .collect::<Result<Vec<_>>>()?;
        let present_semaphores = (0..actual_count)
            .map(|_| vk_check("vkCreateSemaphore", unsafe { gpu.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }))
            .collect::<Result<Vec<_>>>()?;

        let mut obj = Object::new(Kind::Swapchain);
        obj.init().allocated().created();

        Ok(Self {
            obj,
            gpu: Arc::clone(gpu),
            surface_fns,
            surface,
            fns,
            raw,
            format,
            present_mode,
            extent,
            image_count: actual_count,
            acquire_semaphores,
            present_semaphores,
            next_semaphore: 0,
        })
    }

    pub fn images(&self) -> Result<Vec<vk::Image>> {
        vk_check("vkGetSwapchainImagesKHR", unsafe { self.fns.get_swapchain_images(self.raw) })
    }

    /// `dvz_swapchain_acquire`: waits up to 100ms; `OUT_OF_DATE`/
    /// `SUBOPTIMAL` transition the object to need-recreate, any other
    /// failure to need-destroy (spec §4.9).
    pub fn acquire(&mut self) -> AcquireOutcome {
        let semaphore = self.acquire_semaphores[self.next_semaphore];
        let result = unsafe { self.fns.acquire_next_image(self.raw, ACQUIRE_TIMEOUT_NS, semaphore, vk::Fence::null()) };
        match result {
            Ok((index, suboptimal)) if suboptimal => {
                self.obj.need_recreate();
                let _ = index;
                AcquireOutcome::NeedRecreate
            }
            Ok((index, _)) => {
                self.next_semaphore = (self.next_semaphore + 1) % self.acquire_semaphores.len();
                AcquireOutcome::Image { index, acquire_semaphore: semaphore }
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.obj.need_recreate();
                AcquireOutcome::NeedRecreate
            }
            Err(err) => {
                log::error!("swapchain acquire failed: {err:?}");
                self.obj.need_destroy();
                AcquireOutcome::NeedDestroy
            }
        }
    }

    /// `dvz_swapchain_present`: same reactive transitions as `acquire` on
    /// failure (spec §4.9).
    pub fn present(&mut self, queue: vk::Queue, index: u32, wait_semaphore: vk::Semaphore) -> AcquireOutcome {
        let info = vk::PresentInfoKHR::builder()
            .wait_semaphores(std::slice::from_ref(&wait_semaphore))
            .swapchains(std::slice::from_ref(&self.raw))
            .image_indices(std::slice::from_ref(&index));
        match unsafe { self.fns.queue_present(queue, &info) } {
            Ok(suboptimal) if suboptimal => {
                self.obj.need_recreate();
                AcquireOutcome::NeedRecreate
            }
            Ok(_) => AcquireOutcome::Image { index, acquire_semaphore: wait_semaphore },
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.obj.need_recreate();
                AcquireOutcome::NeedRecreate
            }
            Err(err) => {
                log::error!("swapchain present failed: {err:?}");
                self.obj.need_destroy();
                AcquireOutcome::NeedDestroy
            }
        }
    }

    pub fn present_semaphore(&self, index: u32) -> vk::Semaphore {
        self.present_semaphores[crate::frame::clip(index, self.present_semaphores.len() as u32) as usize]
    }

    /// `dvz_swapchain_recreate`: tied to the surface's currently-reported
    /// size (spec §4.9), reusing the semaphore pools when the image count
    /// doesn't change.
    pub fn recreate(&mut self) -> Result<()> {
        let capabilities = vk_check(
            "vkGetPhysicalDeviceSurfaceCapabilitiesKHR",
            unsafe { self.surface_fns.get_physical_device_surface_capabilities(self.gpu.physical.raw, self.surface) },
        )?;
        let extent = capabilities.current_extent;

        let swapchain_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.surface)
            .min_image_count(self.image_count)
            .image_format(self.format.format)
            .image_color_space(self.format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .clipped(true)
            .old_swapchain(self.raw);

        let new_raw = vk_check("vkCreateSwapchainKHR", unsafe { self.fns.create_swapchain(&swapchain_info, None) })?;
        unsafe {
            self.fns.destroy_swapchain(self.raw, None);
        }
        self.raw = new_raw;
        self.extent = extent;
        self.obj.created();
        Ok(())
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        if !self.obj.destroy() {
            return;
        }
        unsafe {
            for &semaphore in self.acquire_semaphores.iter().chain(self.present_semaphores.iter()) {
                self.gpu.device.destroy_semaphore(semaphore, None);
            }
            self.fns.destroy_swapchain(self.raw, None);
        }
    }
}
