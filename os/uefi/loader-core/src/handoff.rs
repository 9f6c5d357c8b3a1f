//! # Kernel Hand-off
//!
//! A [`Handoff`] exists only after `ExitBootServices` succeeded; it is the sole
//! way to reach [`Handoff::enter`], so the kernel can never be entered with
//! boot services still running.

use crate::address::PhysicalAddress;
use crate::firmware::{MapKey, MemoryMapMeta, PageRange};
use crate::stage::BootStage;

/// Kernel entry point.
///
/// # ABI
/// No arguments and no return. The kernel has to find its own way; the loader
/// passes nothing, not even the memory map.
pub type KernelEntryFn = extern "C" fn() -> !;

/// The kernel image as it sits in the fixed load region.
#[derive(Debug)]
pub struct LoadedImage<P> {
    pages: P,
    len: usize,
}

impl<P: PageRange> LoadedImage<P> {
    pub(crate) const fn new(pages: P, len: usize) -> Self {
        Self { pages, len }
    }

    #[must_use]
    pub fn base(&self) -> PhysicalAddress {
        self.pages.base()
    }

    /// Number of bytes read from the kernel file.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn page_count(&self) -> u64 {
        self.pages.page_count()
    }

    /// The image bytes, without the page-rounding tail.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.pages.as_bytes()[..self.len]
    }
}

/// The memory map that was current when boot services were exited.
#[derive(Debug)]
pub struct MemoryMapSnapshot<B> {
    buffer: B,
    meta: MemoryMapMeta,
    attempts: usize,
}

impl<B: AsRef<[u8]>> MemoryMapSnapshot<B> {
    pub(crate) const fn new(buffer: B, meta: MemoryMapMeta, attempts: usize) -> Self {
        Self {
            buffer,
            meta,
            attempts,
        }
    }

    #[must_use]
    pub const fn meta(&self) -> &MemoryMapMeta {
        &self.meta
    }

    #[must_use]
    pub const fn key(&self) -> MapKey {
        self.meta.map_key
    }

    /// Raw `EFI_MEMORY_DESCRIPTOR` bytes, `meta().map_size` long.
    #[must_use]
    pub fn descriptors(&self) -> &[u8] {
        let bytes = self.buffer.as_ref();
        &bytes[..self.meta.map_size.min(bytes.len())]
    }

    /// Fill calls the final capture needed.
    #[must_use]
    pub const fn attempts(&self) -> usize {
        self.attempts
    }
}

/// State after a successful `ExitBootServices`.
#[derive(Debug)]
pub struct Handoff<P, B> {
    image: LoadedImage<P>,
    memory_map: MemoryMapSnapshot<B>,
    entry: PhysicalAddress,
    exit_attempts: usize,
}

impl<P: PageRange, B: AsRef<[u8]>> Handoff<P, B> {
    pub(crate) const fn new(
        image: LoadedImage<P>,
        memory_map: MemoryMapSnapshot<B>,
        entry: PhysicalAddress,
        exit_attempts: usize,
    ) -> Self {
        Self {
            image,
            memory_map,
            entry,
            exit_attempts,
        }
    }

    #[must_use]
    pub const fn stage(&self) -> BootStage {
        BootStage::ServicesExited
    }

    #[must_use]
    pub const fn image(&self) -> &LoadedImage<P> {
        &self.image
    }

    #[must_use]
    pub const fn memory_map(&self) -> &MemoryMapSnapshot<B> {
        &self.memory_map
    }

    #[must_use]
    pub const fn entry(&self) -> PhysicalAddress {
        self.entry
    }

    /// `ExitBootServices` calls it took, including stale-key rejections.
    #[must_use]
    pub const fn exit_attempts(&self) -> usize {
        self.exit_attempts
    }

    /// Jumps into the kernel. `Transferred` is reached the moment this is called.
    ///
    /// The image and the memory map are leaked on purpose: their memory now
    /// belongs to the kernel, and there is no allocator left to return it to.
    ///
    /// # Safety
    /// This is the one place where the loader stops vouching for anything. The
    /// caller asserts that the bytes at [`entry`](Self::entry) are machine code
    /// linked for that address, executable in the current paging mode, and
    /// that the kernel never returns.
    pub unsafe fn enter(self) -> ! {
        let entry = self.entry;
        core::mem::forget(self);

        // Function pointers must not be null, and a 64-bit address may not fit
        // a narrower target. Neither leaves anything sensible to jump to.
        let address = match usize::try_from(entry.as_u64()) {
            Ok(address) if address != 0 => address,
            _ => loop {
                core::hint::spin_loop();
            },
        };

        // SAFETY: non-null and pointer sized; everything else is the caller's contract.
        let kernel = unsafe { core::mem::transmute::<usize, KernelEntryFn>(address) };
        kernel()
    }
}
