//! # Loader Configuration
//!
//! Everything that would otherwise be a magic constant in the boot path: the
//! kernel's location on the volume, the physical address it is linked for, the
//! allocation granularity and the retry bounds of the firmware queries.
//!
//! The configuration is built at compile time; no file or command line is read.

use crate::address::PhysicalAddress;
use log::LevelFilter;

/// Where the kernel image is loaded and entered, unless configured otherwise.
///
/// # Kernel Build
/// The kernel's linker script must place its entry point at exactly this address.
pub const DEFAULT_LOAD_ADDRESS: PhysicalAddress = PhysicalAddress::new(0x0010_0000); // 1 MiB

/// UEFI page granularity.
pub const DEFAULT_PAGE_SIZE: u64 = 4096;

/// Path of the kernel image on the boot volume.
pub const DEFAULT_KERNEL_PATH: &str = "\\kernel.bin";

/// How many times a two-phase query may be re-filled before giving up.
pub const DEFAULT_MAX_QUERY_ATTEMPTS: usize = 8;

/// How many memory map captures may be spent on `ExitBootServices`.
pub const DEFAULT_MAX_EXIT_ATTEMPTS: usize = 4;

/// Console chattiness.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Verbosity {
    /// Only warnings and errors.
    Quiet,
    /// Progress and sizing details.
    Verbose,
}

impl Verbosity {
    #[must_use]
    pub const fn level_filter(self) -> LevelFilter {
        match self {
            Self::Quiet => LevelFilter::Warn,
            Self::Verbose => LevelFilter::Debug,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quiet => "QUIET",
            Self::Verbose => "VERBOSE",
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LoaderConfig {
    /// Path of the kernel image, relative to the volume root.
    pub kernel_path: &'static str,
    /// Physical address the image is copied to and entered at.
    pub load_address: PhysicalAddress,
    /// Allocation granularity; a power of two.
    pub page_size: u64,
    /// Upper bound for fill attempts of a single two-phase query.
    pub max_query_attempts: usize,
    /// Upper bound for memory map captures spent on stale map keys.
    pub max_exit_attempts: usize,
    /// Whether to wait for a key press before touching the volume.
    pub pause_before_boot: bool,
    pub verbosity: Verbosity,
}

impl LoaderConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            kernel_path: DEFAULT_KERNEL_PATH,
            load_address: DEFAULT_LOAD_ADDRESS,
            page_size: DEFAULT_PAGE_SIZE,
            max_query_attempts: DEFAULT_MAX_QUERY_ATTEMPTS,
            max_exit_attempts: DEFAULT_MAX_EXIT_ATTEMPTS,
            pause_before_boot: true,
            verbosity: Verbosity::Verbose,
        }
    }

    #[must_use]
    pub const fn with_kernel_path(mut self, path: &'static str) -> Self {
        self.kernel_path = path;
        self
    }

    #[must_use]
    pub const fn with_load_address(mut self, address: PhysicalAddress) -> Self {
        self.load_address = address;
        self
    }

    #[must_use]
    pub const fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub const fn with_max_query_attempts(mut self, attempts: usize) -> Self {
        self.max_query_attempts = attempts;
        self
    }

    #[must_use]
    pub const fn with_max_exit_attempts(mut self, attempts: usize) -> Self {
        self.max_exit_attempts = attempts;
        self
    }

    #[must_use]
    pub const fn with_pause(mut self, pause: bool) -> Self {
        self.pause_before_boot = pause;
        self
    }

    #[must_use]
    pub const fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Checks the invariants the boot path relies on.
    ///
    /// # Errors
    /// Returns the first violated invariant as a [`ConfigError`].
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || !self.page_size.is_power_of_two() {
            return Err(ConfigError::InvalidPageSize(self.page_size));
        }
        if !self.load_address.is_aligned_to(self.page_size) {
            return Err(ConfigError::UnalignedLoadAddress(self.load_address));
        }
        if self.max_query_attempts == 0 || self.max_exit_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.kernel_path.is_empty() {
            return Err(ConfigError::EmptyKernelPath);
        }
        Ok(())
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("page size {0} is not a power of two")]
    InvalidPageSize(u64),
    #[error("load address {0} is not page aligned")]
    UnalignedLoadAddress(PhysicalAddress),
    #[error("retry bounds must allow at least one attempt")]
    ZeroAttempts,
    #[error("kernel path is empty")]
    EmptyKernelPath,
}
