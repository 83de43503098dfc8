use std::{fs::File, io};

use memmap2::{Mmap, MmapOptions};

use crate::models::FileId;

/// Read-only mapped window over part of an open file.
///
/// A chunk is immutable once created and is shared behind `Arc`; the mapping stays alive as long
/// as any reader holds the chunk, even after the owning file is closed.
#[derive(Debug)]
pub struct FileChunk {
  file_id: FileId,
  file_offset: u64,
  map: Mmap,
}

impl FileChunk {
  /// Map `len` bytes of `file` starting at `file_offset`. `len` must be non-zero.
  pub(crate) fn map(file: &File, file_id: FileId, file_offset: u64, len: usize) -> io::Result<Self> {
    if len == 0 {
      return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty mapping"));
    }
    // SAFETY: the mapping is read-only and files are treated as immutable while open.
    let map = unsafe { MmapOptions::new().offset(file_offset).len(len).map(file)? };
    Ok(Self {
      file_id,
      file_offset,
      map,
    })
  }

  pub fn file_id(&self) -> FileId {
    self.file_id
  }

  /// Absolute offset of the first byte of this window.
  pub fn file_offset(&self) -> u64 {
    self.file_offset
  }

  pub fn len(&self) -> usize {
    self.map.len()
  }

  pub fn is_empty(&self) -> bool {
    self.map.is_empty()
  }

  pub fn bytes(&self) -> &[u8] {
    &self.map
  }
}
