//! In-memory firmware for driving the loader in tests.
//!
//! Every service call is appended to [`MockState::calls`], so tests can assert
//! on the exact order the loader talks to the firmware in. Log records are
//! captured per test thread, see [`capture_logs`].

#![allow(dead_code)]

use loader_core::firmware::{
    Console, Directory, FileSystem, HandleDatabase, KernelFile, Lifecycle, MemoryServices,
    PageRange,
};
use loader_core::{MapKey, MemoryMapMeta, PhysicalAddress, Probe};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;
use std::sync::Once;
use uefi::proto::media::file::{FileAttribute, FileInfo};
use uefi::runtime::Time;
use uefi::{CStr16, Status};

pub const DESC_SIZE: usize = 48;
pub const DESC_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Print(String),
    SetEmphasis(bool),
    WaitForKey,
    ReadKey,
    LocateFileSystems,
    OpenFileSystem(usize),
    OpenVolume,
    Open(String),
    GetInfo(usize),
    Read(usize),
    CloseFile,
    CloseRoot,
    AllocatePool(usize),
    FreePool(usize),
    AllocatePages { address: u64, pages: u64 },
    GetMemoryMap(usize),
    ExitBootServices(usize),
}

#[derive(Debug)]
pub struct MockState {
    pub calls: Vec<Call>,

    pub wait_result: Result<(), Status>,
    pub read_key_result: Result<(), Status>,

    pub locate_error: Option<Status>,
    /// One entry per file system handle: `Ok` answers, `Err` refuses.
    pub handles: Vec<Result<(), Status>>,
    pub open_volume_error: Option<Status>,

    pub kernel_path: String,
    pub kernel: Vec<u8>,
    pub kernel_attributes: FileAttribute,
    /// Pads the info record to this many bytes, if larger than the record.
    pub info_record_size: Option<usize>,
    pub open_error: Option<Status>,
    /// Reads return at most this many bytes in total.
    pub read_limit: Option<usize>,
    pub read_error: Option<Status>,
    read_position: usize,

    pub page_size: u64,
    pub pages_error: Option<Status>,
    pub pool_error: Option<Status>,

    pub descriptors: usize,
    /// Number of memory map fills that find one more descriptor than probed.
    pub map_growth: usize,
    /// Number of `ExitBootServices` calls rejected regardless of the key.
    pub forced_stale_keys: usize,
    pub exit_error: Option<Status>,
    /// Bumped on every pool allocation and free, like a firmware map key.
    pub generation: usize,
    pub exited: bool,
}

impl MockState {
    pub fn with_kernel(kernel: Vec<u8>) -> Self {
        Self {
            calls: Vec::new(),
            wait_result: Ok(()),
            read_key_result: Ok(()),
            locate_error: None,
            handles: vec![Ok(())],
            open_volume_error: None,
            kernel_path: String::from("\\kernel.bin"),
            kernel,
            kernel_attributes: FileAttribute::ARCHIVE,
            info_record_size: None,
            open_error: None,
            read_limit: None,
            read_error: None,
            read_position: 0,
            page_size: 4096,
            pages_error: None,
            pool_error: None,
            descriptors: 12,
            map_growth: 0,
            forced_stale_keys: 0,
            exit_error: None,
            generation: 1,
            exited: false,
        }
    }

    fn record(&mut self, call: Call) {
        assert!(!self.exited, "{call:?} after ExitBootServices");
        self.calls.push(call);
    }

    /// The kernel's `EFI_FILE_INFO` record, zero-padded to `info_record_size`.
    fn info_record(&self) -> Vec<u8> {
        let mut name_buf = [0u16; 64];
        let name = self.kernel_path.trim_start_matches('\\');
        let name = CStr16::from_str_with_buf(name, &mut name_buf).expect("kernel name fits");

        let mut storage = vec![0u64; 64];
        let size = self.kernel.len() as u64;
        let bytes = words_as_bytes_mut(&mut storage, 64 * 8);
        let info = FileInfo::new(
            bytes,
            size,
            size,
            Time::invalid(),
            Time::invalid(),
            Time::invalid(),
            self.kernel_attributes,
            name,
        )
        .expect("file info fits");
        let len = size_of_val(info);

        let mut record = bytes[..len].to_vec();
        record.resize(len.max(self.info_record_size.unwrap_or(0)), 0);
        record
    }
}

fn words_as_bytes(words: &[u64], len: usize) -> &[u8] {
    assert!(len <= size_of_val(words));
    // SAFETY: in bounds, and any u64 is valid as bytes.
    unsafe { std::slice::from_raw_parts(words.as_ptr().cast(), len) }
}

fn words_as_bytes_mut(words: &mut [u64], len: usize) -> &mut [u8] {
    assert!(len <= size_of_val(words));
    // SAFETY: as above.
    unsafe { std::slice::from_raw_parts_mut(words.as_mut_ptr().cast(), len) }
}

thread_local! {
    static LOG_RECORDS: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
}

/// Collects every record emitted on the current thread.
struct CaptureLogger;

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        LOG_RECORDS.with_borrow_mut(|records| {
            records.push((record.level(), record.args().to_string()));
        });
    }

    fn flush(&self) {}
}

static CAPTURE_LOGGER: CaptureLogger = CaptureLogger;

/// Installs the capturing logger (once per process) and clears this thread's
/// records.
pub fn capture_logs() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        log::set_logger(&CAPTURE_LOGGER).expect("no other logger installed");
        log::set_max_level(LevelFilter::Trace);
    });
    LOG_RECORDS.with_borrow_mut(Vec::clear);
}

/// Messages logged on this thread at exactly `level` since [`capture_logs`].
pub fn logged(level: Level) -> Vec<String> {
    LOG_RECORDS.with_borrow(|records| {
        records
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message.clone())
            .collect()
    })
}

type Shared = Rc<RefCell<MockState>>;

#[derive(Debug, Clone)]
pub struct MockFirmware {
    state: Shared,
}

impl MockFirmware {
    pub fn new(state: MockState) -> Self {
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    pub fn state(&self) -> Ref<'_, MockState> {
        self.state.borrow()
    }

    pub fn state_mut(&self) -> RefMut<'_, MockState> {
        self.state.borrow_mut()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    /// Index of the first call matching `pred`.
    pub fn position(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.state.borrow().calls.iter().position(pred)
    }

    /// Everything printed to the console, concatenated.
    pub fn console_text(&self) -> String {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Print(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Console for MockFirmware {
    fn print(&mut self, text: &str) {
        self.state.borrow_mut().record(Call::Print(text.to_owned()));
    }

    fn set_emphasis(&mut self, emphasized: bool) {
        self.state.borrow_mut().record(Call::SetEmphasis(emphasized));
    }

    fn wait_for_key(&mut self) -> Result<(), Status> {
        let mut state = self.state.borrow_mut();
        state.record(Call::WaitForKey);
        state.wait_result
    }

    fn read_key(&mut self) -> Result<(), Status> {
        let mut state = self.state.borrow_mut();
        state.record(Call::ReadKey);
        state.read_key_result
    }
}

impl HandleDatabase for MockFirmware {
    type Handle = usize;
    type FileSystem = MockFileSystem;

    fn locate_file_systems(&mut self) -> Result<Vec<usize>, Status> {
        let mut state = self.state.borrow_mut();
        state.record(Call::LocateFileSystems);
        match state.locate_error {
            Some(status) => Err(status),
            None => Ok((0..state.handles.len()).collect()),
        }
    }

    fn open_file_system(&mut self, handle: usize) -> Result<MockFileSystem, Status> {
        let mut state = self.state.borrow_mut();
        state.record(Call::OpenFileSystem(handle));
        state.handles[handle]?;
        Ok(MockFileSystem {
            state: Rc::clone(&self.state),
        })
    }
}

pub struct MockFileSystem {
    state: Shared,
}

impl FileSystem for MockFileSystem {
    type Root = MockRoot;

    fn open_volume(&mut self) -> Result<MockRoot, Status> {
        let mut state = self.state.borrow_mut();
        state.record(Call::OpenVolume);
        if let Some(status) = state.open_volume_error {
            return Err(status);
        }
        Ok(MockRoot {
            state: Rc::clone(&self.state),
        })
    }
}

pub struct MockRoot {
    state: Shared,
}

impl Directory for MockRoot {
    type File = MockFile;

    fn open_read_only(&mut self, path: &str) -> Result<MockFile, Status> {
        let mut state = self.state.borrow_mut();
        state.record(Call::Open(path.to_owned()));
        if let Some(status) = state.open_error {
            return Err(status);
        }
        if path != state.kernel_path {
            return Err(Status::NOT_FOUND);
        }
        state.read_position = 0;
        Ok(MockFile {
            state: Rc::clone(&self.state),
        })
    }

    fn close(self) {
        self.state.borrow_mut().record(Call::CloseRoot);
    }
}

pub struct MockFile {
    state: Shared,
}

// SAFETY: complete records are built with `FileInfo::new`.
unsafe impl KernelFile for MockFile {
    fn get_info(&mut self, buffer: &mut [u8]) -> Result<Probe<()>, Status> {
        let mut state = self.state.borrow_mut();
        state.record(Call::GetInfo(buffer.len()));
        let record = state.info_record();
        if buffer.len() < record.len() {
            return Ok(Probe::TooSmall(record.len()));
        }
        buffer[..record.len()].copy_from_slice(&record);
        Ok(Probe::Complete(()))
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, Status> {
        let mut state = self.state.borrow_mut();
        state.record(Call::Read(buffer.len()));
        if let Some(status) = state.read_error {
            return Err(status);
        }
        let available = state
            .read_limit
            .unwrap_or(usize::MAX)
            .min(state.kernel.len())
            .saturating_sub(state.read_position);
        let count = buffer.len().min(available);
        let start = state.read_position;
        buffer[..count].copy_from_slice(&state.kernel[start..start + count]);
        state.read_position += count;
        Ok(count)
    }

    fn close(self) {
        self.state.borrow_mut().record(Call::CloseFile);
    }
}

/// A pool buffer; word backed so it is 8-byte aligned like the firmware's.
#[derive(Debug)]
pub struct MockBuffer {
    words: Vec<u64>,
    len: usize,
    state: Shared,
}

impl AsRef<[u8]> for MockBuffer {
    fn as_ref(&self) -> &[u8] {
        words_as_bytes(&self.words, self.len)
    }
}

impl AsMut<[u8]> for MockBuffer {
    fn as_mut(&mut self) -> &mut [u8] {
        words_as_bytes_mut(&mut self.words, self.len)
    }
}

impl Drop for MockBuffer {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        // Buffers the kernel inherits are only dropped by the test itself.
        if !state.exited {
            state.record(Call::FreePool(self.len));
            state.generation += 1;
        }
    }
}

#[derive(Debug)]
pub struct MockPages {
    base: PhysicalAddress,
    pages: u64,
    data: Vec<u8>,
}

impl PageRange for MockPages {
    fn base(&self) -> PhysicalAddress {
        self.base
    }

    fn page_count(&self) -> u64 {
        self.pages
    }

    fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl MemoryServices for MockFirmware {
    type Buffer = MockBuffer;
    type Pages = MockPages;

    fn allocate_pool(&mut self, size: usize) -> Result<MockBuffer, Status> {
        let mut state = self.state.borrow_mut();
        state.record(Call::AllocatePool(size));
        if let Some(status) = state.pool_error {
            return Err(status);
        }
        state.generation += 1;
        Ok(MockBuffer {
            words: vec![0; size.div_ceil(8)],
            len: size,
            state: Rc::clone(&self.state),
        })
    }

    fn allocate_pages_at(
        &mut self,
        address: PhysicalAddress,
        pages: u64,
    ) -> Result<MockPages, Status> {
        let mut state = self.state.borrow_mut();
        state.record(Call::AllocatePages {
            address: address.as_u64(),
            pages,
        });
        if let Some(status) = state.pages_error {
            return Err(status);
        }
        state.generation += 1;
        let len = usize::try_from(pages * state.page_size).expect("page range fits");
        Ok(MockPages {
            base: address,
            pages,
            data: vec![0; len],
        })
    }

    fn memory_map(&mut self, buffer: &mut [u8]) -> Result<Probe<MemoryMapMeta>, Status> {
        let mut state = self.state.borrow_mut();
        state.record(Call::GetMemoryMap(buffer.len()));

        if !buffer.is_empty() && state.map_growth > 0 {
            state.map_growth -= 1;
            state.descriptors += 1;
        }

        let map_size = state.descriptors * DESC_SIZE;
        if buffer.len() < map_size {
            return Ok(Probe::TooSmall(map_size));
        }

        for (i, desc) in buffer[..map_size].chunks_exact_mut(DESC_SIZE).enumerate() {
            desc[..8].copy_from_slice(&(i as u64).to_le_bytes());
        }

        Ok(Probe::Complete(MemoryMapMeta {
            map_size,
            map_key: MapKey(state.generation),
            desc_size: DESC_SIZE,
            desc_version: DESC_VERSION,
        }))
    }
}

impl Lifecycle for MockFirmware {
    fn exit_boot_services(&mut self, key: MapKey) -> Result<(), Status> {
        let mut state = self.state.borrow_mut();
        state.record(Call::ExitBootServices(key.0));
        if let Some(status) = state.exit_error {
            return Err(status);
        }
        if state.forced_stale_keys > 0 {
            state.forced_stale_keys -= 1;
            return Err(Status::INVALID_PARAMETER);
        }
        if key.0 != state.generation {
            return Err(Status::INVALID_PARAMETER);
        }
        state.exited = true;
        Ok(())
    }
}
