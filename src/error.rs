//! Crate-wide error type and the status-returning helpers used at the
//! boundary between fallible Vulkan calls and the object lifecycle (§7).

use ash::vk;

/// The coarse, three-bucket taxonomy from spec §7: preconditions are asserted
/// (panic), validation reports are logged, and Vulkan API failures are
/// returned as a typed error that callers can match on or simply propagate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("vulkan call {call} failed: {result:?}")]
    Vulkan { call: &'static str, result: vk::Result },

    #[error("no compatible physical device found")]
    NoCompatibleGpu,

    #[error("surface does not support the requested format/present mode")]
    UnsupportedSurface,

    #[error("queue slot {slot} could not be satisfied by any queue family")]
    QueueAssignment { slot: u32 },

    #[error("resource is in state {actual:?}, expected {expected}")]
    InvalidState { actual: crate::object::State, expected: &'static str },

    #[error("buffer region count {count} is incompatible with frame count {frames}")]
    RegionCountMismatch { count: u32, frames: u32 },

    #[error("shader compilation is unavailable and no precompiled SPIR-V was given")]
    NoShaderCompiler,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Logs a Vulkan failure at error severity with the call name (for
/// `#[track_caller]`-style source attribution) and converts it to [`Error`].
/// This is the non-fatal path of spec §7: the caller gets a status back and
/// decides what to do; the object is not torn down here.
#[track_caller]
pub fn vk_check<T>(call: &'static str, result: ash::prelude::VkResult<T>) -> Result<T> {
    result.map_err(|result| {
        let location = std::panic::Location::caller();
        log::error!("{call} failed at {location}: {result:?}");
        Error::Vulkan { call, result }
    })
}

/// The fatal path of spec §7: instance/device/swapchain creation failures
/// abort the process because the engine cannot make progress without them.
#[track_caller]
pub fn vk_check_fatal<T>(call: &'static str, result: ash::prelude::VkResult<T>) -> T {
    match result {
        Ok(value) => value,
        Err(result) => {
            let location = std::panic::Location::caller();
            log::error!("fatal: {call} failed at {location}: {result:?}");
            std::process::exit(1);
        }
    }
}
