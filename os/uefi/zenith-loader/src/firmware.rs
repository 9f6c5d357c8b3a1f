//! The loader's firmware traits on top of the `uefi` crate.

use crate::file_system::UefiFileSystem;
use crate::memory::{PageSpan, PoolBuffer};
use crate::{console, uefi_mmap};
use alloc::vec::Vec;
use loader_core::firmware::{Console, HandleDatabase, Lifecycle, MemoryServices};
use loader_core::{MapKey, MemoryMapMeta, PhysicalAddress, Probe};
use uefi::boot::{self, SearchType};
use uefi::proto::media::fs::SimpleFileSystem;
use uefi::{Handle, Identify, Status};

/// Boot services of the running firmware. Zero-sized; all state lives in the
/// firmware and the `uefi` crate's globals.
#[derive(Debug, Default)]
pub struct UefiFirmware;

impl UefiFirmware {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Console for UefiFirmware {
    fn print(&mut self, text: &str) {
        console::print(text);
    }

    fn set_emphasis(&mut self, emphasized: bool) {
        console::set_emphasis(emphasized);
    }

    fn wait_for_key(&mut self) -> Result<(), Status> {
        console::wait_for_key()
    }

    fn read_key(&mut self) -> Result<(), Status> {
        console::read_key()
    }
}

impl HandleDatabase for UefiFirmware {
    type Handle = Handle;
    type FileSystem = UefiFileSystem;

    fn locate_file_systems(&mut self) -> Result<Vec<Handle>, Status> {
        match boot::locate_handle_buffer(SearchType::ByProtocol(&SimpleFileSystem::GUID)) {
            Ok(handles) => Ok(handles.to_vec()),
            // No handle carries the protocol; the loader reports that itself.
            Err(err) if err.status() == Status::NOT_FOUND => Ok(Vec::new()),
            Err(err) => Err(err.status()),
        }
    }

    fn open_file_system(&mut self, handle: Handle) -> Result<UefiFileSystem, Status> {
        let protocol = boot::open_protocol_exclusive::<SimpleFileSystem>(handle)
            .map_err(|e| e.status())?;
        Ok(UefiFileSystem::new(protocol))
    }
}

impl MemoryServices for UefiFirmware {
    type Buffer = PoolBuffer;
    type Pages = PageSpan;

    fn allocate_pool(&mut self, size: usize) -> Result<PoolBuffer, Status> {
        PoolBuffer::allocate(size)
    }

    fn allocate_pages_at(
        &mut self,
        address: PhysicalAddress,
        pages: u64,
    ) -> Result<PageSpan, Status> {
        PageSpan::allocate_at(address, pages)
    }

    fn memory_map(&mut self, buffer: &mut [u8]) -> Result<Probe<MemoryMapMeta>, Status> {
        uefi_mmap::memory_map(buffer)
    }
}

impl Lifecycle for UefiFirmware {
    fn exit_boot_services(&mut self, key: MapKey) -> Result<(), Status> {
        uefi_mmap::exit_boot_services(key)
    }
}
