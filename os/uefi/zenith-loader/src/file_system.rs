use loader_core::Probe;
use loader_core::firmware::{Directory, FileSystem, KernelFile};
use uefi::boot::ScopedProtocol;
use uefi::proto::media::file::{self, File, FileAttribute, FileInfo, FileMode, RegularFile};
use uefi::proto::media::fs::SimpleFileSystem;
use uefi::{CStr16, Status};

/// Longest path accepted, in UCS-2 code units including the terminator.
const MAX_PATH: usize = 256;

pub struct UefiFileSystem {
    protocol: ScopedProtocol<SimpleFileSystem>,
}

impl UefiFileSystem {
    pub const fn new(protocol: ScopedProtocol<SimpleFileSystem>) -> Self {
        Self { protocol }
    }
}

impl FileSystem for UefiFileSystem {
    type Root = UefiDirectory;

    fn open_volume(&mut self) -> Result<UefiDirectory, Status> {
        let root = self.protocol.open_volume().map_err(|e| e.status())?;
        Ok(UefiDirectory { root })
    }
}

pub struct UefiDirectory {
    root: file::Directory,
}

impl Directory for UefiDirectory {
    type File = UefiKernelFile;

    fn open_read_only(&mut self, path: &str) -> Result<UefiKernelFile, Status> {
        let mut buf = [0u16; MAX_PATH];
        let path =
            CStr16::from_str_with_buf(path, &mut buf).map_err(|_| Status::INVALID_PARAMETER)?;

        let handle = self
            .root
            .open(path, FileMode::Read, FileAttribute::empty())
            .map_err(|e| e.status())?;

        // A directory cannot be read like a file; the loader also checks the
        // attribute, but here there is no file handle to give it.
        let file = handle.into_regular_file().ok_or(Status::UNSUPPORTED)?;
        Ok(UefiKernelFile { file })
    }

    fn close(self) {
        self.root.close();
    }
}

pub struct UefiKernelFile {
    file: RegularFile,
}

/// Stand-in for the size probe: `get_info` insists on an aligned buffer, even
/// an empty one.
#[repr(C, align(8))]
struct AlignedEmpty([u8; 0]);

// SAFETY: `get_info::<FileInfo>` only succeeds once the firmware has written
// a complete record into the buffer.
unsafe impl KernelFile for UefiKernelFile {
    fn get_info(&mut self, buffer: &mut [u8]) -> Result<Probe<()>, Status> {
        let mut empty = AlignedEmpty([]);
        let buffer = if buffer.is_empty() {
            &mut empty.0[..]
        } else {
            buffer
        };

        match self.file.get_info::<FileInfo>(buffer) {
            Ok(_) => Ok(Probe::Complete(())),
            Err(err) => match (err.status(), *err.data()) {
                (Status::BUFFER_TOO_SMALL, Some(required)) => Ok(Probe::TooSmall(required)),
                (status, _) => Err(status),
            },
        }
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, Status> {
        self.file.read(buffer).map_err(|e| e.status())
    }

    fn close(self) {
        self.file.close();
    }
}
