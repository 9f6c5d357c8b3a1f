//! # ZenithOS Kernel Loader Core
//!
//! The firmware-independent part of the ZenithOS UEFI loader: it finds
//! `\kernel.bin` on the boot volume, copies it verbatim to a fixed physical
//! address, exits boot services and jumps to it.
//!
//! ## Boot Sequence
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │ 1. Console gate      wait for one key press    │
//! │ 2. Volume resolver   first answering SFS handle│
//! │ 3. File locator      open \kernel.bin (RO)     │
//! │ 4. Metadata probe    two-phase GetInfo         │
//! │ 5. Image loader      AllocatePages(Address)    │
//! │                      + one Read into the range │
//! │ 6. Finalizer         two-phase GetMemoryMap    │
//! │                      + ExitBootServices(key)   │
//! │ 7. Control transfer  jump to the load address  │
//! └────────────────────────────────────────────────┘
//! ```
//!
//! Steps 1 to 6 run in [`Loader::boot`], which returns a [`Handoff`]; step 7 is
//! [`Handoff::enter`], the only `unsafe` entry point of this crate.
//!
//! ## Firmware Access
//!
//! The loader talks to the firmware exclusively through the traits in
//! [`firmware`]. The UEFI application implements them with the `uefi` crate;
//! the tests implement them in memory.
//!
//! ## Kernel Contract
//!
//! The kernel is an opaque blob. It must be linked to run from
//! [`LoaderConfig::load_address`] (1 MiB by default), start with its entry
//! point, take no arguments and never return. Nothing of this is checked.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]
extern crate alloc;

pub mod address;
pub mod config;
pub mod error;
pub mod file_info;
pub mod firmware;
pub mod handoff;
mod loader;
pub mod query;
pub mod stage;

pub use address::PhysicalAddress;
pub use config::{ConfigError, LoaderConfig, Verbosity};
pub use error::{BootError, ErrorCategory};
pub use file_info::{FileInfoError, FileInfoRecord};
pub use firmware::{MapKey, MemoryMapMeta, Probe};
pub use handoff::{Handoff, KernelEntryFn, LoadedImage, MemoryMapSnapshot};
pub use loader::{BootHandoff, Loader};
pub use stage::BootStage;
