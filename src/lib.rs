//! A Vulkan GPU abstraction core: lifecycle-managed resources,
//! synchronization, and command recording for interactive rendering and
//! compute, built directly on `ash`.

pub mod alloc;
pub mod barrier;
pub mod buffer;
pub mod buffer_regions;
pub mod commands;
pub mod config;
pub mod dat;
pub mod descriptor_slots;
pub mod descriptors;
pub mod error;
pub mod frame;
pub mod framebuffers;
pub mod gpu;
pub mod host;
pub mod image;
pub mod logging;
pub mod object;
pub mod pipeline;
pub mod renderpass;
pub mod resources;
pub mod sampler;
pub mod submit;
pub mod swapchain;
pub mod sync;
pub mod tex;
pub mod transfer;

pub use error::{Error, Result};
pub use gpu::Gpu;
pub use host::{Backend, Host};
