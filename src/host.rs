//! The Host (spec §3, §4.1): a process-wide object owning the Vulkan
//! instance, the debug messenger, and the container of GPUs it has
//! discovered. Grounded on the teacher's `backend::vulkan::Instance`
//! (`vulkan/instance.rs`), generalized from a single always-validating
//! instance into one that classifies severities, downgrades known-noisy
//! messages, and counts validation errors per spec §4.1/§7.

use std::ffi::{c_void, CStr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use ash::vk;

use crate::config::EngineConfig;
use crate::error::{vk_check_fatal, Result};
use crate::gpu::physical_device::PhysicalDeviceInfo;
use crate::gpu::Gpu;
use crate::object::{Kind, Object};

/// Which windowing shim, if any, the host was created for (spec §3). The
/// core never implements any of these backends itself — it only tags which
/// external collaborator (spec §6) it expects to cooperate with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    NativeWindow,
    Offscreen,
    None,
}

pub struct Host {
    obj: Object,
    pub entry: ash::Entry,
    pub instance: ash::Instance,
    debug_utils: Option<ash::extensions::ext::DebugUtils>,
    messenger: Option<vk::DebugUtilsMessengerEXT>,
    pub backend: Backend,
    error_count: Arc<AtomicU32>,
    gpus: Vec<Arc<Gpu>>,
}

/// Required instance extensions per backend, mirroring
/// `original_source/src/host.c::backend_extensions`: GLFW/native-window
/// backends need platform surface extensions (supplied by the windowing
/// shim at the call site, spec §6); offscreen/none need nothing beyond
/// validation support.
fn backend_extensions(backend: Backend, validation: bool) -> Vec<*const i8> {
    let mut extensions = Vec::new();
    if validation {
        extensions.push(vk::ExtDebugUtilsFn::name().as_ptr());
    }
    let _ = backend; // native-window extensions are appended by the caller via `with_window_extensions`
    extensions
}

impl Host {
    /// Creates the Host: installs the logger (if not already installed),
    /// creates the instance with `VK_EXT_debug_utils` when validation is
    /// enabled, and installs the debug messenger. Per spec §4.1, there is no
    /// tolerated failure here — construction either succeeds or the process
    /// exits with a clear message.
    pub fn new(backend: Backend, window_extensions: &[*const i8], validation: bool) -> Arc<parking_lot::RwLock<Self>> {
        crate::logging::init();
        let config = EngineConfig::from_env();
        let backend = config.default_backend_override.unwrap_or(backend);

        log::debug!("creating host with backend {backend:?}");

        let entry = match unsafe { ash::Entry::load() } {
            Ok(entry) => entry,
            Err(err) => {
                log::error!("fatal: failed to load the Vulkan loader: {err}");
                std::process::exit(1);
            }
        };

        if let Some(version) = entry.try_enumerate_instance_version().ok().flatten() {
            log::info!(
                "Vulkan instance version {}.{}.{}",
                vk::api_version_major(version),
                vk::api_version_minor(version),
                vk::api_version_patch(version)
            );
        }

        let app_info = vk::ApplicationInfo::builder().api_version(vk::make_api_version(0, 1, 2, 0));

        let mut extensions = backend_extensions(backend, validation);
        extensions.extend_from_slice(window_extensions);

        let mut layers: Vec<*const i8> = Vec::new();
        const VALIDATION_LAYER: &CStr =
            unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };
        if validation {
            layers.push(VALIDATION_LAYER.as_ptr());
        }

        let instance_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = vk_check_fatal(
            "vkCreateInstance",
            unsafe { entry.create_instance(&instance_info, None) },
        );

        let error_count = Arc::new(AtomicU32::new(0));

        let (debug_utils, messenger) = if validation {
            let debug_utils = ash::extensions::ext::DebugUtils::new(&entry, &instance);
            let user_data = Arc::as_ptr(&error_count) as *mut c_void;
            let messenger_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
                .message_severity(
                    vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                        | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                        | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                )
                .message_type(
                    vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                )
                .pfn_user_callback(Some(debug_callback))
                .user_data(user_data);
            let messenger =
                unsafe { debug_utils.create_debug_utils_messenger(&messenger_info, None) }.ok();
            (Some(debug_utils), messenger)
        } else {
            (None, None)
        };

        Arc::new(parking_lot::RwLock::new(Self {
            obj: { let mut o = Object::new(Kind::Host); o.init().created(); o },
            entry,
            instance,
            debug_utils,
            messenger,
            backend,
            error_count,
            gpus: Vec::new(),
        }))
    }

    /// Enumerates physical devices and records their properties (spec §4.1).
    /// Aborts the process if none are found — a host with zero compatible
    /// devices cannot do anything useful.
    pub fn enumerate_gpus(&self) -> Vec<PhysicalDeviceInfo> {
        let devices = vk_check_fatal(
            "vkEnumeratePhysicalDevices",
            unsafe { self.instance.enumerate_physical_devices() },
        );
        if devices.is_empty() {
            log::error!("fatal: no Vulkan-compatible physical device found");
            std::process::exit(1);
        }
        devices
            .into_iter()
            .map(|raw| PhysicalDeviceInfo::query(&self.instance, raw))
            .collect()
    }

    /// `dvz_gpu_best`: the discrete device with the most VRAM, falling back
    /// to the integrated device with the most VRAM.
    pub fn best_gpu(&self) -> Result<PhysicalDeviceInfo> {
        let mut candidates = self.enumerate_gpus();
        candidates.sort_by_key(|info| info.device_local_bytes);
        candidates
            .iter()
            .rev()
            .find(|info| info.properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU)
            .or_else(|| {
                candidates
                    .iter()
                    .rev()
                    .find(|info| info.properties.device_type == vk::PhysicalDeviceType::INTEGRATED_GPU)
            })
            .cloned()
            .ok_or(crate::error::Error::NoCompatibleGpu)
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Registers a GPU this host created, so `Drop` tears it down before the
    /// instance. Resources never outlive their owning GPU, and GPUs never
    /// outlive their Host (spec §3 lifecycle summary).
    pub fn adopt_gpu(&mut self, gpu: Arc<Gpu>) {
        self.gpus.push(gpu);
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        if !self.obj.destroy() {
            return;
        }
        log::debug!("destroying host, {} validation error(s) recorded", self.error_count());
        self.gpus.clear();
        unsafe {
            if let (Some(debug_utils), Some(messenger)) = (self.debug_utils.take(), self.messenger.take()) {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    user_data: *mut c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if crate::logging::is_ignored_validation_message(&message) {
        log::trace!("(vk) {message}");
        return vk::FALSE;
    }

    let kind = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "general",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "performance",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "validation",
        _ => "unknown",
    };

    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("(vk: {kind}) {message}");
            if !user_data.is_null() {
                let counter = &*(user_data as *const AtomicU32);
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("(vk: {kind}) {message}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::debug!("(vk: {kind}) {message}"),
        _ => log::trace!("(vk: {kind}) {message}"),
    }
    vk::FALSE
}
