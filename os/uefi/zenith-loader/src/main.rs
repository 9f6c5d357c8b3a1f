//! # ZenithOS UEFI Loader
//!
//! Second-stage loader for ZenithOS. The firmware starts this application
//! from the ESP; it copies the raw kernel image `\kernel.bin` to physical
//! address `0x10_0000`, leaves boot services and jumps to the first byte of
//! the image.
//!
//! ```text
//! UEFI Firmware Boot
//!         ↓
//! ┌─────────────────────────────────────────────┐
//! │              ZenithOS Loader                │
//! ├─────────────────────────────────────────────┤
//! │  1. Environment Setup                       │
//! │     • uefi helpers, logger, allocator       │
//! │  2. Boot Sequence (loader-core)             │
//! │     • banner and key press                  │
//! │     • first simple file system volume       │
//! │     • \kernel.bin → 0x10_0000               │
//! │     • memory map + ExitBootServices         │
//! │  3. Kernel Handoff                          │
//! │     • trace to the QEMU debug port          │
//! │     • jump, no arguments                    │
//! └─────────────────────────────────────────────┘
//!         ↓
//! Kernel Execution (flat binary at 1 MiB)
//! ```
//!
//! The boot sequence itself lives in the `loader-core` crate and only sees
//! this application through the traits implemented in [`firmware`].
//!
//! ## Debugging
//!
//! With the default `qemu` feature, every log record is also written to the
//! QEMU debug console (`-debugcon stdio`), which keeps working after boot
//! services are gone.
//!
//! ## Failure
//!
//! Any error is logged and its firmware status is returned from `efi_main`,
//! which hands control back to the boot manager.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![no_main]
#![allow(unsafe_code)]
extern crate alloc;

mod console;
mod file_system;
mod firmware;
mod logger;
mod memory;
mod tracing;
mod uefi_mmap;

use crate::firmware::UefiFirmware;
use crate::logger::UefiLogger;
use crate::tracing::trace_handoff;
use loader_core::{Loader, LoaderConfig};
use log::{error, info};
use uefi::prelude::*;

const CONFIG: LoaderConfig = LoaderConfig::new();

#[entry]
fn efi_main() -> Status {
    if uefi::helpers::init().is_err() {
        return Status::UNSUPPORTED;
    }

    if UefiLogger::new(CONFIG.verbosity.level_filter())
        .init()
        .is_err()
    {
        return Status::ABORTED;
    }

    info!("ZenithOS loader reporting to QEMU");

    if CONFIG.page_size != uefi::boot::PAGE_SIZE as u64 {
        error!(
            "Configured page size {} does not match the firmware's {}",
            CONFIG.page_size,
            uefi::boot::PAGE_SIZE
        );
        return Status::INVALID_PARAMETER;
    }

    let mut loader = match Loader::new(CONFIG, UefiFirmware::new()) {
        Ok(loader) => loader,
        Err(err) => {
            error!("Invalid loader configuration: {err}");
            return err.status();
        }
    };

    let config = loader.config();
    info!("Loading {} to {}", config.kernel_path, config.load_address);

    let handoff = match loader.boot() {
        Ok(handoff) => handoff,
        Err(err) => return err.status(),
    };

    // Off we pop.
    trace_handoff(&handoff);

    // SAFETY: `\kernel.bin` is a flat image linked for the load address whose
    // first byte is its entry point; boot services are gone and UEFI's
    // identity mapping keeps the address executable.
    unsafe { handoff.enter() }
}
