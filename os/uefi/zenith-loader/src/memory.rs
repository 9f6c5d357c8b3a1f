//! # Boot Services Memory
//!
//! Pool buffers for the two-phase queries, the fixed kernel page range and a
//! pool-backed global allocator. All of them stop touching the firmware once
//! [`mark_boot_services_exited`] has been called.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull, null_mut};
use core::sync::atomic::{AtomicBool, Ordering};
use loader_core::PhysicalAddress;
use loader_core::firmware::PageRange;
use uefi::Status;
use uefi::boot::{self, AllocateType, MemoryType};

static BOOT_SERVICES_ACTIVE: AtomicBool = AtomicBool::new(true);

pub fn boot_services_active() -> bool {
    BOOT_SERVICES_ACTIVE.load(Ordering::SeqCst)
}

pub fn mark_boot_services_exited() {
    BOOT_SERVICES_ACTIVE.store(false, Ordering::SeqCst);
}

/// A `LOADER_DATA` pool allocation, freed on drop while boot services last.
///
/// Buffers still alive at `ExitBootServices` (the final memory map) are
/// simply left behind for the kernel.
pub struct PoolBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

impl PoolBuffer {
    pub fn allocate(len: usize) -> Result<Self, Status> {
        if len == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                len,
            });
        }

        let ptr = boot::allocate_pool(MemoryType::LOADER_DATA, len).map_err(|e| e.status())?;
        Ok(Self { ptr, len })
    }
}

impl AsRef<[u8]> for PoolBuffer {
    fn as_ref(&self) -> &[u8] {
        // SAFETY: `ptr` is valid for `len` bytes (or dangling for `len == 0`).
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl AsMut<[u8]> for PoolBuffer {
    fn as_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above; we own the allocation exclusively.
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for PoolBuffer {
    fn drop(&mut self) {
        if self.len == 0 || !boot_services_active() {
            return;
        }

        // SAFETY: `ptr` came from `allocate_pool` and is freed exactly once.
        let _ = unsafe { boot::free_pool(self.ptr) };
    }
}

/// Pages reserved at a fixed physical address.
///
/// The range is never returned to the firmware: it holds the kernel.
pub struct PageSpan {
    base: PhysicalAddress,
    pages: u64,
    len: usize,
}

impl PageSpan {
    /// `AllocatePages(AllocateAddress, LoaderData)`; zero pages need no call.
    pub fn allocate_at(base: PhysicalAddress, pages: u64) -> Result<Self, Status> {
        if pages == 0 {
            return Ok(Self {
                base,
                pages,
                len: 0,
            });
        }

        let count = usize::try_from(pages).map_err(|_| Status::BAD_BUFFER_SIZE)?;
        let len = count
            .checked_mul(boot::PAGE_SIZE)
            .ok_or(Status::BAD_BUFFER_SIZE)?;
        let ptr = boot::allocate_pages(
            AllocateType::Address(base.as_u64()),
            MemoryType::LOADER_DATA,
            count,
        )
        .map_err(|e| e.status())?;

        // Identity mapped: the returned pointer is the requested address.
        debug_assert_eq!(ptr.as_ptr() as u64, base.as_u64());
        Ok(Self { base, pages, len })
    }

    fn as_ptr(&self) -> *mut u8 {
        if self.len == 0 {
            NonNull::dangling().as_ptr()
        } else {
            self.base.as_u64() as *mut u8
        }
    }
}

impl PageRange for PageSpan {
    fn base(&self) -> PhysicalAddress {
        self.base
    }

    fn page_count(&self) -> u64 {
        self.pages
    }

    fn as_bytes(&self) -> &[u8] {
        // SAFETY: `len` bytes at `base` were reserved for us by the firmware.
        unsafe { core::slice::from_raw_parts(self.as_ptr(), self.len) }
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above.
        unsafe { core::slice::from_raw_parts_mut(self.as_ptr(), self.len) }
    }
}

/// A UEFI Boot Services pool allocation to back Rust's global allocator.
///
/// # Notes
/// - Returns null once boot services are gone.
/// - Over-allocates to satisfy alignment and stores the original pointer just
///   before the returned block for deallocation.
pub struct UefiBootAllocator;

#[cfg_attr(not(test), global_allocator)]
static GLOBAL_ALLOC: UefiBootAllocator = UefiBootAllocator;

unsafe impl GlobalAlloc for UefiBootAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if !boot_services_active() {
            return null_mut();
        }

        let align = layout.align().max(size_of::<usize>());
        let size = layout.size().max(1);
        let Some(total) = size
            .checked_add(align)
            .and_then(|v| v.checked_add(size_of::<usize>()))
        else {
            return null_mut();
        };

        let Ok(raw) = boot::allocate_pool(MemoryType::LOADER_DATA, total) else {
            return null_mut();
        };

        let raw_ptr = raw.as_ptr();
        let addr = raw_ptr as usize + size_of::<usize>();
        let aligned = (addr + (align - 1)) & !(align - 1);
        let header_ptr = (aligned - size_of::<usize>()) as *mut usize;

        unsafe {
            ptr::write(header_ptr, raw_ptr as usize);
        }
        aligned as *mut u8
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        if ptr.is_null() || !boot_services_active() {
            return;
        }

        let header_ptr = (ptr as usize - size_of::<usize>()) as *mut usize;
        let orig_ptr = unsafe { ptr::read(header_ptr) as *mut u8 };

        // SAFETY: `orig_ptr` was returned by `allocate_pool` and stored by us.
        let _ = unsafe { boot::free_pool(NonNull::new_unchecked(orig_ptr)) };
    }
}
