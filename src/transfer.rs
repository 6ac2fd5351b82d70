//! The transfer engine (spec §3 "Transfer", §4.11/§4.12). Not present in
//! the teacher, which issues transfers inline on its single graphics queue;
//! grounded on `original_source/src/transfers.h`'s staging buffer, its
//! tagged `VklTransfer`/`VklDataTransferType` queue, and its
//! power-of-two-growing staging buffer, reworked around this crate's
//! [`crate::gpu::QueueTopology`] so the fused and separate-queue cases share
//! one barrier-emission path (spec §9's open question).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use ash::vk;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use crate::buffer::{Buffer, BufferBuilder, BufferRole};
use crate::error::Result;
use crate::gpu::{Gpu, QueueTopology};

/// Mirrors `original_source`'s `VklDataTransferType`, minus the enum value
/// used purely as a sentinel (`VKL_TRANSFER_NONE`), which this crate
/// expresses with `Option<TransferItem>` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    BufferUpload,
    BufferCopy,
}

/// A queued transfer. Carries raw Vulkan handles rather than borrowed
/// resource references so an item can cross the worker-thread boundary in
/// [`TransferMode::Async`] mode (spec §4.12).
pub enum TransferItem {
    /// One region's worth of `data`, repeated `count` times at `stride`
    /// starting at `dst_offset` — the dup-ring case from spec §4.12, where
    /// `count == 1` collapses to a single plain upload.
    BufferUpload { dst: vk::Buffer, dst_offset: u64, stride: u64, count: u32, data: Vec<u8> },
    BufferCopy { src: vk::Buffer, src_offset: u64, dst: vk::Buffer, dst_offset: u64, size: u64 },
}

impl TransferItem {
    fn kind(&self) -> TransferKind {
        match self {
            TransferItem::BufferUpload { .. } => TransferKind::BufferUpload,
            TransferItem::BufferCopy { .. } => TransferKind::BufferCopy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Every `enqueue` call blocks until the transfer has completed (spec
    /// §4.11's default, matching `original_source`'s `VKL_TRANSFER_MODE_SYNC`).
    Sync,
    /// Items are pushed onto a worker thread's queue; `wait_idle` blocks
    /// until it has drained them (spec §4.12, the dup-ring completion wait).
    Async,
}

fn next_pow2(size: u64) -> u64 {
    if size <= 1 {
        1
    } else {
        1u64 << (64 - (size - 1).leading_zeros())
    }
}

struct Inner {
    gpu: Arc<Gpu>,
    staging: Mutex<Buffer>,
}

impl Inner {
    /// `staging_buffer` from `original_source/src/transfers.h`: grows the
    /// shared staging buffer to the next power of two when it is too small,
    /// rather than reallocating exactly to fit every request.
    fn ensure_staging_capacity(&self, size: u64) -> Result<()> {
        let mut staging = self.staging.lock();
        if staging.size < size {
            let new_size = next_pow2(size);
            log::info!("reallocating staging buffer to {new_size} bytes");
            staging.resize(new_size)?;
        }
        Ok(())
    }

    fn process(&self, item: TransferItem) -> Result<()> {
        match item {
            TransferItem::BufferUpload { dst, dst_offset, stride, count, data } => {
                let total = stride * count as u64;
                self.ensure_staging_capacity(total)?;
                let mut staging = self.staging.lock();
                for i in 0..count {
                    staging.write(i as u64 * stride, &data)?;
                }
                let staging_raw = staging.raw;
                let regions: Vec<vk::BufferCopy> = (0..count)
                    .map(|i| vk::BufferCopy {
                        src_offset: i as u64 * stride,
                        dst_offset: dst_offset + i as u64 * stride,
                        size: data.len() as u64,
                    })
                    .collect();
                self.gpu.one_time_submit(|cmd| unsafe {
                    self.gpu.device.cmd_copy_buffer(cmd, staging_raw, dst, &regions);
                })
            }
            TransferItem::BufferCopy { src, src_offset, dst, dst_offset, size } => {
                let region = vk::BufferCopy { src_offset, dst_offset, size };
                self.gpu.one_time_submit(|cmd| unsafe {
                    self.gpu.device.cmd_copy_buffer(cmd, src, dst, std::slice::from_ref(&region));
                })
            }
        }
    }
}

/// The transfer engine (spec §4.11/§4.12): owns one growable staging buffer
/// shared by every upload, and a queue of pending items processed either
/// synchronously or by a background worker. Texture uploads/downloads are
/// driven directly through [`crate::image::ImageSet::copy_from_buffer`] /
/// `transition`, which already implement the fused-vs-separate barrier
/// dispatch this engine's `topology()` exposes; this engine's own
/// responsibility is the buffer-to-buffer staging path and the dup-ring
/// completion wait.
pub struct Transfer {
    inner: Arc<Inner>,
    mode: TransferMode,
    sender: Option<Sender<TransferItem>>,
    pending: Arc<AtomicU32>,
    idle: Arc<(Mutex<()>, Condvar)>,
}

impl Transfer {
    pub fn create(gpu: &Arc<Gpu>, mode: TransferMode) -> Result<Self> {
        let staging = BufferBuilder::new(BufferRole::Staging)
            .size(1 << 16)
            .usage(vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST)
            .mappable(true)
            .create(gpu)?;

        let inner = Arc::new(Inner { gpu: Arc::clone(gpu), staging: Mutex::new(staging) });
        let pending = Arc::new(AtomicU32::new(0));
        let idle = Arc::new((Mutex::new(()), Condvar::new()));

        let sender = if mode == TransferMode::Async {
            let (tx, rx): (Sender<TransferItem>, Receiver<TransferItem>) = crossbeam_channel::unbounded();
            let worker_inner = Arc::clone(&inner);
            let worker_pending = Arc::clone(&pending);
            let worker_idle = Arc::clone(&idle);
            std::thread::spawn(move || {
                for item in rx {
                    let kind = item.kind();
                    if let Err(err) = worker_inner.process(item) {
                        log::error!("transfer worker: {kind:?} failed: {err}");
                    }
                    if worker_pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                        let (lock, cvar) = &*worker_idle;
                        let _guard = lock.lock();
                        cvar.notify_all();
                    }
                }
            });
            Some(tx)
        } else {
            None
        };

        Ok(Self { inner, mode, sender, pending, idle })
    }

    /// Queue-topology dispatch for the two internal paths `original_source`
    /// keeps separate (`VKL_DEFAULT_QUEUE_TRANSFER` vs `VKL_DEFAULT_QUEUE_RENDER`
    /// waits): a fused GPU has nothing further to synchronize, since both
    /// queues are the same queue; a separate-queue GPU routes the barrier
    /// through the same `one_time_submit` path today, which is already
    /// synchronous (spec §9).
    pub fn topology(&self) -> QueueTopology {
        self.inner.gpu.topology
    }

    /// The sync path (the default) blocks until done; the async path
    /// enqueues and returns immediately.
    pub fn enqueue(&self, item: TransferItem) -> Result<()> {
        match (&self.mode, &self.sender) {
            (TransferMode::Sync, _) => self.inner.process(item),
            (TransferMode::Async, Some(sender)) => {
                self.pending.fetch_add(1, Ordering::AcqRel);
                sender.send(item).map_err(|e| crate::error::Error::Other(anyhow::anyhow!("transfer worker gone: {e}")))
            }
            (TransferMode::Async, None) => unreachable!("async mode always has a sender"),
        }
    }

    /// Blocks until every enqueued item — including every duplicate ring
    /// slot of a dup-mode `Dat` upload — has completed (spec §4.12).
    pub fn wait_idle(&self) {
        if self.mode == TransferMode::Sync {
            return;
        }
        let (lock, cvar) = &*self.idle;
        let mut guard = lock.lock();
        while self.pending.load(Ordering::Acquire) > 0 {
            cvar.wait(&mut guard);
        }
    }
}
