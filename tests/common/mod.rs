//! Shared setup for the end-to-end scenarios in spec §8. Every test in this
//! directory needs a real Vulkan device and is `#[ignore]`d by default; run
//! with `cargo test -- --ignored` on a machine with a usable ICD.

use std::sync::Arc;

use gpu_core::gpu::queue::{Capability, QueueRequestSet};
use gpu_core::gpu::Gpu;
use gpu_core::host::{Backend, Host};

/// Creates a validation-enabled, headless host and its best GPU with one
/// fused transfer+render queue slot (spec §4.1).
pub fn offscreen_gpu() -> Arc<Gpu> {
    let host = Host::new(Backend::Offscreen, &[], true);
    let physical = host.read().best_gpu().expect("no compatible GPU available");

    let mut requests = QueueRequestSet::new();
    requests.request(0, Capability::TRANSFER | Capability::COMPUTE | Capability::GRAPHICS);

    Gpu::create(&host.read().instance, physical, &requests, None).expect("GPU creation failed")
}
