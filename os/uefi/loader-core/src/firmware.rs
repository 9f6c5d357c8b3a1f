//! # Firmware Collaborators
//!
//! The loader never touches the UEFI system table directly. Every firmware
//! service it needs is expressed as one of the traits below and handed to the
//! [`Loader`](crate::Loader) at construction time; the UEFI application
//! implements them on top of the `uefi` crate, the tests on top of an
//! in-memory mock.
//!
//! | Trait | UEFI service |
//! |-------|--------------|
//! | [`Console`] | `ConOut->OutputString`, `ConOut->SetAttribute`, `WaitForEvent(ConIn->WaitForKey)`, `ConIn->ReadKeyStroke` |
//! | [`HandleDatabase`] | `LocateHandleBuffer(ByProtocol)`, `OpenProtocol` |
//! | [`FileSystem`], [`Directory`], [`KernelFile`] | `EFI_SIMPLE_FILE_SYSTEM_PROTOCOL`, `EFI_FILE_PROTOCOL` |
//! | [`MemoryServices`] | `AllocatePages(AllocateAddress)`, `AllocatePool`, `FreePool`, `GetMemoryMap` |
//! | [`Lifecycle`] | `ExitBootServices` |

use crate::address::PhysicalAddress;
use alloc::vec::Vec;
use core::fmt;
use uefi::Status;

/// Outcome of a size-reporting firmware query.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Probe<T> {
    /// The buffer was large enough and has been filled.
    Complete(T),
    /// `EFI_BUFFER_TOO_SMALL`; the firmware needs this many bytes.
    TooSmall(usize),
}

pub trait Console {
    /// Writes text as-is; callers supply their own line endings.
    fn print(&mut self, text: &str);

    /// Switches between the highlight and the regular text colour.
    fn set_emphasis(&mut self, emphasized: bool);

    /// Blocks until a key press event is signalled.
    ///
    /// # Errors
    /// The firmware status of a failed wait.
    fn wait_for_key(&mut self) -> Result<(), Status>;

    /// Reads and discards the pending keystroke.
    ///
    /// # Errors
    /// The firmware status of a failed read.
    fn read_key(&mut self) -> Result<(), Status>;
}

pub trait HandleDatabase {
    type Handle: Copy + fmt::Debug;
    type FileSystem: FileSystem;

    /// All handles advertising the simple file system protocol, in firmware order.
    ///
    /// # Errors
    /// The firmware status of a failed enumeration (e.g. `NOT_FOUND`).
    fn locate_file_systems(&mut self) -> Result<Vec<Self::Handle>, Status>;

    /// Obtains the simple file system protocol interface of `handle`.
    ///
    /// # Errors
    /// The firmware status if the handle does not answer.
    fn open_file_system(&mut self, handle: Self::Handle) -> Result<Self::FileSystem, Status>;
}

pub trait FileSystem {
    type Root: Directory;

    /// # Errors
    /// The firmware status of a failed `OpenVolume`.
    fn open_volume(&mut self) -> Result<Self::Root, Status>;
}

pub trait Directory {
    type File: KernelFile;

    /// Opens `path` below this directory in read-only mode.
    ///
    /// # Errors
    /// The firmware status of a failed `Open`.
    fn open_read_only(&mut self, path: &str) -> Result<Self::File, Status>;

    fn close(self);
}

/// An open, read-only kernel file.
///
/// # Safety
/// When [`get_info`](Self::get_info) returns [`Probe::Complete`], `buffer` must
/// start with a well-formed `EFI_FILE_INFO` record that fits inside it. The
/// loader reads the record in place.
pub unsafe trait KernelFile {
    /// `GetInfo(EFI_FILE_INFO)` into `buffer`. An empty buffer is a size probe.
    ///
    /// # Errors
    /// Any firmware status other than `BUFFER_TOO_SMALL`.
    fn get_info(&mut self, buffer: &mut [u8]) -> Result<Probe<()>, Status>;

    /// Reads from the current position into `buffer`, returning the byte count.
    ///
    /// # Errors
    /// The firmware status of a failed `Read`.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, Status>;

    fn close(self);
}

/// A physically contiguous page range handed out by `AllocatePages`.
///
/// The loader never frees it; ownership passes to the loaded kernel.
pub trait PageRange {
    fn base(&self) -> PhysicalAddress;

    fn page_count(&self) -> u64;

    /// The whole range, `page_count` pages long.
    fn as_bytes(&self) -> &[u8];

    fn as_bytes_mut(&mut self) -> &mut [u8];
}

/// Identifies the memory map generation `ExitBootServices` is checked against.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct MapKey(pub usize);

/// Everything `GetMemoryMap` reports besides the descriptors themselves.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MemoryMapMeta {
    /// Bytes of descriptors written into the buffer.
    pub map_size: usize,
    pub map_key: MapKey,
    /// Stride between descriptors; may exceed `size_of::<EFI_MEMORY_DESCRIPTOR>()`.
    pub desc_size: usize,
    pub desc_version: u32,
}

impl MemoryMapMeta {
    #[must_use]
    pub const fn entry_count(&self) -> usize {
        if self.desc_size == 0 {
            0
        } else {
            self.map_size / self.desc_size
        }
    }
}

pub trait MemoryServices {
    /// Pool memory; returned to the firmware when dropped.
    type Buffer: AsRef<[u8]> + AsMut<[u8]>;
    type Pages: PageRange;

    /// `AllocatePool(LoaderData)` of exactly `size` bytes.
    ///
    /// # Errors
    /// Typically `OUT_OF_RESOURCES`.
    fn allocate_pool(&mut self, size: usize) -> Result<Self::Buffer, Status>;

    /// `AllocatePages(AllocateAddress)` of `pages` pages starting at `address`.
    ///
    /// # Errors
    /// `NOT_FOUND` if the range is occupied, `OUT_OF_RESOURCES` if memory is exhausted.
    fn allocate_pages_at(
        &mut self,
        address: PhysicalAddress,
        pages: u64,
    ) -> Result<Self::Pages, Status>;

    /// `GetMemoryMap` into `buffer`. An empty buffer is a size probe.
    ///
    /// # Errors
    /// Any firmware status other than `BUFFER_TOO_SMALL`.
    fn memory_map(&mut self, buffer: &mut [u8]) -> Result<Probe<MemoryMapMeta>, Status>;
}

pub trait Lifecycle {
    /// `ExitBootServices(ImageHandle, MapKey)`.
    ///
    /// On success every other collaborator is dead; the implementation must not
    /// call back into boot services afterwards.
    ///
    /// # Errors
    /// `INVALID_PARAMETER` if `key` is stale.
    fn exit_boot_services(&mut self, key: MapKey) -> Result<(), Status>;
}

/// The full set of boot services the loader consumes.
pub trait Firmware: Console + HandleDatabase + MemoryServices + Lifecycle {}

impl<T> Firmware for T where T: Console + HandleDatabase + MemoryServices + Lifecycle {}
