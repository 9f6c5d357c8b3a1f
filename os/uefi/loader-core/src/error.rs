//! # Boot Errors
//!
//! Every fatal failure carries the firmware's native status so the operator sees
//! the same code the firmware reported, and so `efi_main` can hand it back.

use crate::address::PhysicalAddress;
use crate::config::ConfigError;
use crate::file_info::FileInfoError;
use crate::query::QueryError;
use uefi::Status;

/// Coarse classification of [`BootError`]s.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorCategory {
    /// No handle advertises the file system protocol, or none answers.
    Discovery,
    /// Missing file, bad path, storage fault.
    Open,
    /// A two-phase query did not converge or returned garbage.
    Sizing,
    /// The fixed load range is unavailable.
    Allocation,
    /// Reading the image failed or came up short.
    Transfer,
    /// `ExitBootServices` could not be committed.
    Lifecycle,
}

#[derive(Debug, thiserror::Error)]
pub enum BootError {
    #[error("invalid loader configuration")]
    Config(#[from] ConfigError),
    #[error("locating simple file system handles failed: {0:?}")]
    LocateFileSystems(Status),
    #[error("no handle advertises the simple file system protocol")]
    NoFileSystem,
    #[error("none of {candidates} file system handles answered: {status:?}")]
    FileSystemUnavailable { candidates: usize, status: Status },
    #[error("opening the volume root failed: {0:?}")]
    OpenVolume(Status),
    #[error("opening {path} failed: {status:?}")]
    OpenKernel { path: &'static str, status: Status },
    #[error("{path} is a directory")]
    KernelIsDirectory { path: &'static str },
    #[error("querying the kernel file info failed")]
    FileInfo(#[source] QueryError),
    #[error("the kernel file info record is malformed")]
    MalformedFileInfo(#[from] FileInfoError),
    #[error("a kernel of {0} bytes does not fit the address space")]
    KernelTooLarge(u64),
    #[error("reserving {pages} pages at {address} failed: {status:?}")]
    AllocatePages {
        address: PhysicalAddress,
        pages: u64,
        status: Status,
    },
    #[error("reading the kernel image failed: {0:?}")]
    Read(Status),
    #[error("short read of the kernel image: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },
    #[error("querying the memory map failed")]
    MemoryMap(#[source] QueryError),
    #[error("exiting boot services failed: {0:?}")]
    ExitBootServices(Status),
    #[error("the memory map key was stale on all {0} attempts")]
    StaleMapKey(usize),
}

impl BootError {
    /// The firmware status reported to the operator and returned from `efi_main`.
    #[must_use]
    pub const fn status(&self) -> Status {
        match self {
            Self::Config(_) | Self::StaleMapKey(_) => Status::INVALID_PARAMETER,
            Self::NoFileSystem => Status::NOT_FOUND,
            Self::KernelIsDirectory { .. } => Status::UNSUPPORTED,
            Self::MalformedFileInfo(_) => Status::VOLUME_CORRUPTED,
            Self::KernelTooLarge(_) => Status::BAD_BUFFER_SIZE,
            Self::ShortRead { .. } => Status::END_OF_FILE,
            Self::FileInfo(e) | Self::MemoryMap(e) => e.status(),
            Self::LocateFileSystems(status)
            | Self::FileSystemUnavailable { status, .. }
            | Self::OpenVolume(status)
            | Self::OpenKernel { status, .. }
            | Self::AllocatePages { status, .. }
            | Self::Read(status)
            | Self::ExitBootServices(status) => *status,
        }
    }

    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_)
            | Self::LocateFileSystems(_)
            | Self::NoFileSystem
            | Self::FileSystemUnavailable { .. } => ErrorCategory::Discovery,
            Self::OpenVolume(_) | Self::OpenKernel { .. } | Self::KernelIsDirectory { .. } => {
                ErrorCategory::Open
            }
            Self::FileInfo(_) | Self::MalformedFileInfo(_) | Self::MemoryMap(_) => {
                ErrorCategory::Sizing
            }
            Self::KernelTooLarge(_) | Self::AllocatePages { .. } => ErrorCategory::Allocation,
            Self::Read(_) | Self::ShortRead { .. } => ErrorCategory::Transfer,
            Self::ExitBootServices(_) | Self::StaleMapKey(_) => ErrorCategory::Lifecycle,
        }
    }

    /// Short name of the boot step that failed.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Config(_) => "config.validate()",
            Self::LocateFileSystems(_)
            | Self::NoFileSystem
            | Self::FileSystemUnavailable { .. } => "get_fs_protocol()",
            Self::OpenVolume(_) => "fs.open_volume()",
            Self::OpenKernel { .. } | Self::KernelIsDirectory { .. } => "root.open()",
            Self::FileInfo(_) | Self::MalformedFileInfo(_) => "kernel.get_info()",
            Self::KernelTooLarge(_) | Self::AllocatePages { .. } => "allocate_pages()",
            Self::Read(_) | Self::ShortRead { .. } => "kernel.read()",
            Self::MemoryMap(_) => "get_memory_map()",
            Self::ExitBootServices(_) | Self::StaleMapKey(_) => "exit_boot_services()",
        }
    }
}

impl From<BootError> for Status {
    fn from(value: BootError) -> Self {
        value.status()
    }
}
