//! # Boot Sequence
//!
//! Drives the firmware collaborators through the fixed sequence
//!
//! ```text
//! console gate → volume → kernel file → file info → load image → exit boot services
//! ```
//!
//! and returns a [`Handoff`] for the final jump. Every step consumes the output
//! of the previous one; there is no step that is revisited, and any failure
//! aborts the sequence with the firmware status that caused it.

use crate::address::pages_for;
use crate::config::LoaderConfig;
use crate::error::BootError;
use crate::file_info::FileInfoRecord;
use crate::firmware::{
    Directory, FileSystem, Firmware, HandleDatabase, KernelFile, MemoryServices, PageRange,
};
use crate::handoff::{Handoff, LoadedImage, MemoryMapSnapshot};
use crate::query::query_two_phase;
use crate::stage::BootStage;
use log::{debug, error, info, trace, warn};
use uefi::Status;

type RootOf<F> = <<F as HandleDatabase>::FileSystem as FileSystem>::Root;
type FileOf<F> = <RootOf<F> as Directory>::File;

/// What a successful [`Loader::boot`] hands back.
pub type BootHandoff<F> = Handoff<<F as MemoryServices>::Pages, <F as MemoryServices>::Buffer>;

/// The status `ExitBootServices` uses to reject an outdated map key.
const STALE_MAP_KEY: Status = Status::INVALID_PARAMETER;

pub struct Loader<F> {
    config: LoaderConfig,
    firmware: F,
    stage: BootStage,
}

impl<F: Firmware> Loader<F> {
    /// # Errors
    /// [`BootError::Config`] if `config` fails validation.
    pub fn new(config: LoaderConfig, firmware: F) -> Result<Self, BootError> {
        config.validate()?;
        Ok(Self {
            config,
            firmware,
            stage: BootStage::Idle,
        })
    }

    #[must_use]
    pub const fn stage(&self) -> BootStage {
        self.stage
    }

    #[must_use]
    pub const fn config(&self) -> &LoaderConfig {
        &self.config
    }

    #[must_use]
    pub const fn firmware(&self) -> &F {
        &self.firmware
    }

    /// Runs the whole sequence up to and including `ExitBootServices`.
    ///
    /// Failures are logged with the step label and firmware status before they
    /// are returned. On success boot services are gone: the caller must not use
    /// any firmware service again and should go straight to [`Handoff::enter`].
    ///
    /// # Errors
    /// The first [`BootError`] encountered; nothing is rolled back.
    pub fn boot(&mut self) -> Result<BootHandoff<F>, BootError> {
        self.run().inspect_err(|err| {
            error!("{}: {err} ({:?})", err.label(), err.status());
        })
    }

    fn run(&mut self) -> Result<BootHandoff<F>, BootError> {
        self.welcome();
        self.console_gate();

        let mut fs = self.resolve_volume()?;
        info!("Found EFI FS protocol for ESP ...");

        let mut root = fs.open_volume().map_err(BootError::OpenVolume)?;
        info!("ESP volume opened ...");

        let image = self.load_kernel(&mut root);
        root.close();
        let image = image?;

        let (memory_map, exit_attempts) = self.finalize_environment()?;
        info!(
            "Boot services exited after {exit_attempts} attempt(s); entering kernel at {}",
            self.config.load_address
        );

        Ok(Handoff::new(
            image,
            memory_map,
            self.config.load_address,
            exit_attempts,
        ))
    }

    fn advance(&mut self, next: BootStage) {
        debug_assert!(
            self.stage.can_advance_to(next),
            "invalid boot stage transition {} -> {next}",
            self.stage
        );
        trace!("Boot stage: {} -> {next}", self.stage);
        self.stage = next;
    }

    fn welcome(&mut self) {
        self.firmware.print("Welcome to ");
        self.firmware.set_emphasis(true);
        self.firmware.print("ZenithOS");
        self.firmware.set_emphasis(false);
        self.firmware.print(" Bootloader!\r\n\r\n");
    }

    /// Waits for one key press. Failures only slow the operator down, so they
    /// are reported and otherwise ignored.
    fn console_gate(&mut self) {
        if self.config.pause_before_boot {
            self.firmware
                .print("Waiting for keyboard input before proceeding...\r\n");

            let result = self
                .firmware
                .wait_for_key()
                .and_then(|()| self.firmware.read_key());
            if let Err(status) = result {
                warn!("Waiting for a key press failed ({status:?}); continuing");
            }
        }

        self.advance(BootStage::ConsoleGated);

        self.firmware.print("Output: ");
        self.firmware.print(self.config.verbosity.as_str());
        self.firmware.print("\r\n");
    }

    /// First handle in enumeration order that yields the file system protocol.
    fn resolve_volume(&mut self) -> Result<F::FileSystem, BootError> {
        let handles = self
            .firmware
            .locate_file_systems()
            .map_err(BootError::LocateFileSystems)?;

        if handles.is_empty() {
            return Err(BootError::NoFileSystem);
        }
        debug!("{} handle(s) advertise a simple file system", handles.len());

        let mut last_status = Status::NOT_FOUND;
        for &handle in &handles {
            match self.firmware.open_file_system(handle) {
                Ok(fs) => {
                    debug!("Using file system on handle {handle:?}");
                    self.advance(BootStage::VolumeResolved);
                    return Ok(fs);
                }
                Err(status) => {
                    debug!("Handle {handle:?} did not answer: {status:?}");
                    last_status = status;
                }
            }
        }

        Err(BootError::FileSystemUnavailable {
            candidates: handles.len(),
            status: last_status,
        })
    }

    /// Opens, sizes and loads the kernel file, closing it on every path.
    fn load_kernel(
        &mut self,
        root: &mut RootOf<F>,
    ) -> Result<LoadedImage<F::Pages>, BootError> {
        let path = self.config.kernel_path;
        let mut file = root
            .open_read_only(path)
            .map_err(|status| BootError::OpenKernel { path, status })?;
        self.advance(BootStage::FileOpened);
        info!("Found the kernel file ...");

        let image = self
            .probe_file_info(&mut file)
            .and_then(|record| self.load_image(&mut file, &record));

        info!("Closing files ...");
        file.close();
        image
    }

    /// Two-phase `GetInfo`; the info buffer is freed before returning.
    fn probe_file_info(&mut self, file: &mut FileOf<F>) -> Result<FileInfoRecord, BootError> {
        let max_attempts = self.config.max_query_attempts;
        let mut ctx = (&mut self.firmware, file);

        let mut filled = query_two_phase(
            &mut ctx,
            max_attempts,
            |(firmware, _), size| {
                debug!("Got the size from last call ({size} B), allocating info structure ...");
                firmware.allocate_pool(size)
            },
            |(_, file), buffer| file.get_info(buffer),
        )
        .map_err(BootError::FileInfo)?;

        let record = FileInfoRecord::from_buffer(filled.buffer.as_mut())?;
        info!(
            "Kernel name: {}, file size: {} B",
            record.file_name, record.file_size
        );

        debug!("Cleaning up allocated data ...");
        drop(filled);

        if record.is_directory() {
            return Err(BootError::KernelIsDirectory {
                path: self.config.kernel_path,
            });
        }

        Ok(record)
    }

    /// Reserves the fixed load range and reads the whole file into it.
    fn load_image(
        &mut self,
        file: &mut FileOf<F>,
        record: &FileInfoRecord,
    ) -> Result<LoadedImage<F::Pages>, BootError> {
        let file_size = record.file_size;
        let too_large = || BootError::KernelTooLarge(file_size);

        let len = usize::try_from(file_size).map_err(|_| too_large())?;
        let pages = pages_for(file_size, self.config.page_size).ok_or_else(too_large)?;
        let address = self.config.load_address;
        pages
            .checked_mul(self.config.page_size)
            .and_then(|span| address.checked_add(span))
            .ok_or_else(too_large)?;

        debug!("Reserving {pages} page(s) at {address} for {len} bytes");
        let mut region = self
            .firmware
            .allocate_pages_at(address, pages)
            .map_err(|status| BootError::AllocatePages {
                address,
                pages,
                status,
            })?;

        let target = region
            .as_bytes_mut()
            .get_mut(..len)
            .ok_or_else(too_large)?;
        let read = file.read(target).map_err(BootError::Read)?;
        if read != len {
            return Err(BootError::ShortRead {
                expected: len,
                actual: read,
            });
        }

        info!("Read byte count: {read}, kernel loaded at: {}", region.base());
        self.advance(BootStage::ImageLoaded);
        Ok(LoadedImage::new(region, len))
    }

    /// Captures the memory map and commits `ExitBootServices` with its key.
    ///
    /// A stale key invalidates the whole snapshot, so the capture is repeated
    /// from the size probe onwards. Between capture and exit nothing may
    /// allocate, free or print.
    fn finalize_environment(
        &mut self,
    ) -> Result<(MemoryMapSnapshot<F::Buffer>, usize), BootError> {
        let max_attempts = self.config.max_exit_attempts;
        let max_query_attempts = self.config.max_query_attempts;
        debug!("Capturing the memory map and exiting boot services ...");

        for attempt in 1..=max_attempts {
            let filled = query_two_phase(
                &mut self.firmware,
                max_query_attempts,
                |firmware, size| firmware.allocate_pool(size),
                |firmware, buffer| firmware.memory_map(buffer),
            )
            .map_err(BootError::MemoryMap)?;

            match self.firmware.exit_boot_services(filled.output.map_key) {
                Ok(()) => {
                    self.advance(BootStage::ServicesExited);
                    let snapshot =
                        MemoryMapSnapshot::new(filled.buffer, filled.output, filled.attempts);
                    return Ok((snapshot, attempt));
                }
                Err(status) if status == STALE_MAP_KEY => {
                    // The map and its key are one unit; both are thrown away.
                    self.advance(BootStage::StaleKey);
                    drop(filled);
                    warn!("Memory map key went stale ({attempt}/{max_attempts}); capturing again");
                }
                Err(status) => return Err(BootError::ExitBootServices(status)),
            }
        }

        Err(BootError::StaleMapKey(max_attempts))
    }
}
