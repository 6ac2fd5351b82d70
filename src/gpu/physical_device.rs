//! Physical device discovery (spec §4.1). Grounded on the teacher's
//! `backend::vulkan::physical_device` module, which already implements the
//! enumerate-and-query-properties shape via a custom iterator; here it's
//! collected eagerly into a plain `Vec` because the Host needs to keep the
//! full set around (to score/pick the best one) rather than stream it once.

use ash::vk;

#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub raw: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    pub device_local_bytes: u64,
    pub supports_portability_subset: bool,
}

impl PhysicalDeviceInfo {
    pub fn query(instance: &ash::Instance, raw: vk::PhysicalDevice) -> Self {
        let properties = unsafe { instance.get_physical_device_properties(raw) };
        let features = unsafe { instance.get_physical_device_features(raw) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(raw) };
        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(raw) };

        let device_local_bytes = memory_properties.memory_heaps
            [..memory_properties.memory_heap_count as usize]
            .iter()
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum();

        let extensions = unsafe { instance.enumerate_device_extension_properties(raw) }
            .unwrap_or_default();
        let supports_portability_subset = extensions.iter().any(|ext| {
            let name = unsafe { std::ffi::CStr::from_ptr(ext.extension_name.as_ptr()) };
            name.to_bytes() == b"VK_KHR_portability_subset"
        });

        Self {
            raw,
            properties,
            features,
            memory_properties,
            queue_families,
            device_local_bytes,
            supports_portability_subset,
        }
    }

    pub fn name(&self) -> String {
        unsafe { std::ffi::CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}
