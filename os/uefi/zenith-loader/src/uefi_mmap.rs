//! # Raw Memory Map and `ExitBootServices`
//!
//! The `uefi` crate bundles map capture and exit into a single call that
//! allocates its own buffer. The loader needs the two halves separately, with
//! its own buffer and its own map key, so both go straight through the boot
//! services table.

use crate::logger::UefiLogger;
use crate::memory::mark_boot_services_exited;
use loader_core::{MapKey, MemoryMapMeta, Probe};
use uefi::{Status, boot};
use uefi_raw::table::boot::{BootServices, MemoryDescriptor};

fn boot_services() -> Result<*const BootServices, Status> {
    let system_table = uefi::table::system_table_raw().ok_or(Status::NOT_READY)?;
    // SAFETY: the system table pointer stays valid for the whole application.
    let boot_services = unsafe { system_table.as_ref().boot_services };
    if boot_services.is_null() {
        return Err(Status::UNSUPPORTED);
    }
    Ok(boot_services.cast_const())
}

/// `GetMemoryMap` into `buffer`; an empty buffer only asks for the size.
pub fn memory_map(buffer: &mut [u8]) -> Result<Probe<MemoryMapMeta>, Status> {
    let bs = boot_services()?;

    let mut map_size = buffer.len();
    let mut map_key = 0usize;
    let mut desc_size = 0usize;
    let mut desc_version = 0u32;
    let map = if buffer.is_empty() {
        core::ptr::null_mut()
    } else {
        buffer.as_mut_ptr().cast::<MemoryDescriptor>()
    };

    // SAFETY: every out-pointer refers to a live local, and `map` is either null
    // with a size of zero or valid for `map_size` bytes.
    let status = unsafe {
        ((*bs).get_memory_map)(
            &raw mut map_size,
            map,
            &raw mut map_key,
            &raw mut desc_size,
            &raw mut desc_version,
        )
    };

    match status {
        Status::SUCCESS => Ok(Probe::Complete(MemoryMapMeta {
            map_size,
            map_key: MapKey(map_key),
            desc_size,
            desc_version,
        })),
        Status::BUFFER_TOO_SMALL => Ok(Probe::TooSmall(map_size)),
        status => Err(status),
    }
}

/// `ExitBootServices` with the key of the last captured map.
///
/// Console mirroring of the logger ends here whatever the outcome; allocation
/// and deallocation end only on success.
pub fn exit_boot_services(key: MapKey) -> Result<(), Status> {
    let bs = boot_services()?;
    UefiLogger::detach_console();

    let image = boot::image_handle();
    // SAFETY: `image` is this application's handle. Nothing may run between a
    // successful call and the kernel jump that needs boot services.
    let status = unsafe { ((*bs).exit_boot_services)(image.as_ptr(), key.0) };
    if status != Status::SUCCESS {
        return Err(status);
    }

    mark_boot_services_exited();
    Ok(())
}
