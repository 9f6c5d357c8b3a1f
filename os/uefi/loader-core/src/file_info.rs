//! # Kernel File Metadata
//!
//! The `EFI_FILE_INFO` record filled in by `GetInfo` is read through the
//! `uefi` crate's [`FileInfo`] view; only the fields the loader acts on are
//! copied out before the pool buffer is freed.

use alloc::string::{String, ToString};
use uefi::data_types::Align;
use uefi::proto::media::file::{FileAttribute, FileInfo, FromUefi};

/// What the loader keeps of the kernel's `EFI_FILE_INFO` record.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FileInfoRecord {
    pub file_size: u64,
    pub physical_size: u64,
    pub attributes: FileAttribute,
    pub file_name: String,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FileInfoError {
    #[error("file info buffer is not {0}-byte aligned")]
    Misaligned(usize),
    #[error("file info record needs {claimed} bytes but only {available} were returned")]
    SizeMismatch { claimed: usize, available: usize },
}

impl FileInfoRecord {
    /// Reads the record `GetInfo` left in `buffer`.
    ///
    /// `buffer` must have been filled by a completed
    /// [`KernelFile::get_info`](crate::firmware::KernelFile::get_info).
    ///
    /// # Errors
    /// A [`FileInfoError`] if the buffer cannot hold the record it claims to.
    pub fn from_buffer(buffer: &mut [u8]) -> Result<Self, FileInfoError> {
        let align = FileInfo::alignment();
        if buffer.as_ptr().align_offset(align) != 0 {
            return Err(FileInfoError::Misaligned(align));
        }

        // SAFETY: aligned, and the `KernelFile` contract guarantees a complete
        // `EFI_FILE_INFO` record at the start of `buffer`.
        let info: &FileInfo = unsafe { FileInfo::from_uefi(buffer.as_mut_ptr().cast()) };

        let claimed = core::mem::size_of_val(info);
        if claimed > buffer.len() {
            return Err(FileInfoError::SizeMismatch {
                claimed,
                available: buffer.len(),
            });
        }

        Ok(Self {
            file_size: info.file_size(),
            physical_size: info.physical_size(),
            attributes: info.attribute(),
            file_name: info.file_name().to_string(),
        })
    }

    #[must_use]
    pub const fn is_directory(&self) -> bool {
        self.attributes.contains(FileAttribute::DIRECTORY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uefi::runtime::Time;
    use uefi::{CStr16, cstr16};

    /// Writes a record into `storage` and returns its length in bytes.
    fn write_record(
        storage: &mut [u64],
        name: &CStr16,
        file_size: u64,
        attributes: FileAttribute,
    ) -> usize {
        let info = FileInfo::new(
            bytes_of(storage),
            file_size,
            file_size.next_multiple_of(512),
            Time::invalid(),
            Time::invalid(),
            Time::invalid(),
            attributes,
            name,
        )
        .unwrap();
        core::mem::size_of_val(info)
    }

    fn bytes_of(storage: &mut [u64]) -> &mut [u8] {
        let len = core::mem::size_of_val(storage);
        // SAFETY: any u64 storage is valid as bytes.
        unsafe { core::slice::from_raw_parts_mut(storage.as_mut_ptr().cast(), len) }
    }

    #[test]
    fn reads_name_size_and_attributes() {
        let mut storage = [0u64; 32];
        write_record(
            &mut storage,
            cstr16!("kernel.bin"),
            12_345,
            FileAttribute::READ_ONLY | FileAttribute::ARCHIVE,
        );

        let info = FileInfoRecord::from_buffer(bytes_of(&mut storage)).unwrap();
        assert_eq!(info.file_name, "kernel.bin");
        assert_eq!(info.file_size, 12_345);
        assert_eq!(info.physical_size, 12_800);
        assert!(info.attributes.contains(FileAttribute::READ_ONLY));
        assert!(!info.is_directory());
    }

    #[test]
    fn directories_are_flagged() {
        let mut storage = [0u64; 32];
        write_record(&mut storage, cstr16!("boot"), 0, FileAttribute::DIRECTORY);
        let info = FileInfoRecord::from_buffer(bytes_of(&mut storage)).unwrap();
        assert!(info.is_directory());
    }

    #[test]
    fn padding_after_the_record_is_ignored() {
        let mut storage = [0xEEEE_EEEE_EEEE_EEEEu64; 512];
        let len = write_record(
            &mut storage,
            cstr16!("kernel.bin"),
            4096,
            FileAttribute::empty(),
        );
        assert!(len < 4096);

        let info = FileInfoRecord::from_buffer(bytes_of(&mut storage)).unwrap();
        assert_eq!(info.file_name, "kernel.bin");
        assert_eq!(info.file_size, 4096);
    }

    #[test]
    fn misaligned_buffer_is_rejected() {
        let mut storage = [0u64; 32];
        let bytes = bytes_of(&mut storage);
        assert_eq!(
            FileInfoRecord::from_buffer(&mut bytes[1..]),
            Err(FileInfoError::Misaligned(FileInfo::alignment()))
        );
    }
}
