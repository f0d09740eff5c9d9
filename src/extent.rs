use crate::error::{ErrorBuilder, ErrorContext, ErrorKind, Res, ResultBuilder};
use std::ffi::OsStr;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// One physical file backing a slice of the virtual address space.
struct Extent {
    file: File,
    /// Absolute virtual address this extent's byte 0 maps to.
    start: u64,
    len: u64,
}

/// A monotonic, read-only byte address space spanning a base file and any
/// numbered overflow siblings (`<stem>00001<ext>`, `<stem>00002<ext>`, ...).
pub struct ExtentSet {
    extents: Vec<Extent>,
    total_len: u64,
}

impl ErrorContext for ExtentSet {
    fn describe(&self) -> Option<String> {
        Some(format!(
            "extent set with {} extent(s), {} bytes total",
            self.extents.len(),
            self.total_len
        ))
    }
}

impl ExtentSet {
    /// Opens `path` and, if `target_len` exceeds its size, opens numbered
    /// sibling files until the virtual address space covers `target_len` or
    /// no further sibling exists on disk.
    pub fn open(path: &Path, target_len: u64) -> Res<Self> {
        let base = File::open(path).kind(ErrorKind::NotFound)?;
        let base_len = base.metadata().kind(ErrorKind::NotFound)?.len();

        let mut extents = vec![Extent {
            file: base,
            start: 0,
            len: base_len,
        }];
        let mut total_len = base_len;

        let mut n = 1usize;
        while total_len < target_len {
            let Some(sibling) = sibling_path(path, n) else {
                break;
            };
            let Ok(file) = File::open(&sibling) else {
                break;
            };
            let len = file.metadata().kind(ErrorKind::NotFound)?.len();
            extents.push(Extent {
                file,
                start: total_len,
                len,
            });
            total_len += len;
            n += 1;
        }

        log::debug!(
            "opened {} extent(s) totalling {} bytes (target {})",
            extents.len(),
            total_len,
            target_len
        );

        Ok(ExtentSet { extents, total_len })
    }

    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    pub fn extent_sizes(&self) -> Vec<u64> {
        self.extents.iter().map(|e| e.len).collect()
    }

    /// Index of the extent containing `addr`, via binary search over
    /// cumulative start offsets. Assumes `addr < self.total_len`.
    fn extent_index(&self, addr: u64) -> usize {
        match self.extents.binary_search_by(|e| e.start.cmp(&addr)) {
            Ok(i) => i,
            Err(i) => i - 1,
        }
    }

    /// Reads exactly `dst.len()` bytes starting at `abs_offset`, copying
    /// across extent boundaries as needed.
    pub fn read_fully(&mut self, abs_offset: u64, dst: &mut [u8]) -> Res<()> {
        if !dst.is_empty() {
            self.assert_lt(abs_offset, self.total_len, ErrorKind::OutOfRange)?;
        }
        let mut remaining = dst;
        let mut addr = abs_offset;
        let description = self.describe();
        while !remaining.is_empty() {
            if addr >= self.total_len {
                return Err(ErrorBuilder {
                    message: Some(format!(
                        "ran out of bytes at offset {addr} ({} of {} requested bytes read)",
                        addr - abs_offset,
                        remaining.len() as u64 + (addr - abs_offset)
                    )),
                    context: description,
                    source: None,
                }
                .into_error(ErrorKind::ShortRead));
            }
            let idx = self.extent_index(addr);
            let extent_start = self.extents[idx].start;
            let extent_len = self.extents[idx].len;
            let local = addr - extent_start;
            let avail = (extent_len - local).min(remaining.len() as u64) as usize;
            let extent = &mut self.extents[idx];
            extent
                .file
                .seek(SeekFrom::Start(local))
                .map_err(|e| ErrorBuilder {
                    context: description.clone(),
                    source: Some(Box::new(e)),
                    ..Default::default()
                })
                .kind(ErrorKind::ShortRead)?;
            extent
                .file
                .read_exact(&mut remaining[..avail])
                .map_err(|e| ErrorBuilder {
                    context: description.clone(),
                    source: Some(Box::new(e)),
                    ..Default::default()
                })
                .kind(ErrorKind::ShortRead)?;
            remaining = &mut remaining[avail..];
            addr += avail as u64;
        }
        Ok(())
    }

    /// Returns an owned copy of `len` bytes starting at `abs_offset`. A
    /// single-extent fast path would be able to borrow directly from a
    /// memory-mapped view; since extents here are plain files, every read
    /// copies, but the contract (caller receives the requested bytes,
    /// regardless of how many physical extents they span) matches §4.2.
    pub fn slice(&mut self, abs_offset: u64, len: usize) -> Res<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_fully(abs_offset, &mut buf)?;
        Ok(buf)
    }
}

/// Computes `<stem><NNNNN><ext>` for the `n`th (1-based) overflow sibling of
/// `path`. Returns `None` if `path` has no parseable file name.
fn sibling_path(path: &Path, n: usize) -> Option<PathBuf> {
    let file_name = path.file_name()?;
    let name = file_name.to_str()?;
    let (stem, ext) = match name.rfind('.') {
        Some(dot) => (&name[..dot], &name[dot..]),
        None => (name, ""),
    };
    let sibling_name = format!("{stem}{n:05}{ext}");
    Some(path.with_file_name(OsStr::new(&sibling_name)))
}
