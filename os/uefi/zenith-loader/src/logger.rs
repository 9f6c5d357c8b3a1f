use boot_qemu::qemu_trace;
use core::sync::atomic::{AtomicBool, Ordering};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// Whether records are still mirrored to the firmware console.
static CONSOLE_MIRROR: AtomicBool = AtomicBool::new(true);

pub struct UefiLogger {
    max_level: LevelFilter,
}

impl UefiLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    /// Call this once during early init.
    #[allow(static_mut_refs, clippy::missing_errors_doc)]
    pub fn init(self) -> Result<(), SetLoggerError> {
        static mut LOGGER: Option<UefiLogger> = None;

        let max_level = self.max_level;

        // SAFETY: single-threaded early init; the static is written once, before
        // the logger is registered, and never mutated afterwards.
        let logger: &'static UefiLogger = unsafe { LOGGER.insert(self) };
        log::set_logger(logger)?;
        log::set_max_level(max_level);
        Ok(())
    }

    /// Stops writing to the firmware console.
    ///
    /// Must happen before the first `ExitBootServices` call: once it was
    /// attempted, even a failed call leaves only the memory services usable.
    pub fn detach_console() {
        CONSOLE_MIRROR.store(false, Ordering::SeqCst);
    }
}

impl Log for UefiLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // No allocations: the same record is logged between capturing the
        // memory map and exiting boot services.
        qemu_trace!(
            "[{}] {}: {}\n",
            record.level(),
            record.target(),
            record.args()
        );

        if CONSOLE_MIRROR.load(Ordering::SeqCst) {
            uefi::println!(
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}
