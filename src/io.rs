//! File I/O: streaming copy with metadata preservation, and a crash-safe
//! atomic writer for the snapshot store. Adapted from a general-purpose
//! sync tool's I/O layer; verification here is by byte comparison, never
//! content hashing.

use std::fs::{self, File, Metadata};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

// 256KB: optimal for modern SSD throughput
const COPY_BUFFER_SIZE: usize = 256 * 1024;

/// Monotonic counter for unique temp file names within a process.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Copy a file with streaming I/O and optional metadata preservation.
pub fn copy_file_with_metadata(
    source: &Path,
    dest: &Path,
    preserve_timestamps: bool,
) -> io::Result<()> {
    let metadata = fs::metadata(source)?;

    copy_file_streaming(source, dest)?;

    if preserve_timestamps {
        set_file_mtime(dest, metadata.modified()?)?;
    }

    #[cfg(unix)]
    {
        set_file_permissions(dest, &metadata)?;
    }

    Ok(())
}

fn copy_file_streaming(source: &Path, dest: &Path) -> io::Result<()> {
    let source_file = File::open(source)?;
    let dest_file = File::create(dest)?;

    let mut reader = BufReader::with_capacity(COPY_BUFFER_SIZE, source_file);
    let mut writer = BufWriter::with_capacity(COPY_BUFFER_SIZE, dest_file);

    io::copy(&mut reader, &mut writer)?;

    writer.flush()?;
    writer.into_inner()?.sync_all()?;

    Ok(())
}

pub fn set_file_mtime(path: &Path, mtime: SystemTime) -> io::Result<()> {
    let file = File::open(path)?;
    file.set_modified(mtime)?;
    Ok(())
}

#[cfg(unix)]
pub fn set_file_permissions(path: &Path, metadata: &Metadata) -> io::Result<()> {
    let permissions = metadata.permissions();
    fs::set_permissions(path, permissions)?;
    Ok(())
}

/// Remove file, ignoring "not found" errors.
pub fn remove_file_safe(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Verify that two files have identical content, by byte comparison.
///
/// Used by the reconciler's same-content heuristic (spec §4.5.3) as an
/// optional reinforcement beyond size/mtime equality — not a content hash.
pub fn verify_files_identical(path1: &Path, path2: &Path) -> io::Result<bool> {
    let meta1 = fs::metadata(path1)?;
    let meta2 = fs::metadata(path2)?;

    if meta1.len() != meta2.len() {
        return Ok(false);
    }

    let file1 = File::open(path1)?;
    let file2 = File::open(path2)?;

    let mut reader1 = BufReader::with_capacity(COPY_BUFFER_SIZE, file1);
    let mut reader2 = BufReader::with_capacity(COPY_BUFFER_SIZE, file2);

    let mut buffer1 = vec![0u8; COPY_BUFFER_SIZE];
    let mut buffer2 = vec![0u8; COPY_BUFFER_SIZE];

    loop {
        let bytes_read1 = reader1.read(&mut buffer1)?;
        let bytes_read2 = reader2.read(&mut buffer2)?;

        if bytes_read1 != bytes_read2 {
            return Ok(false);
        }
        if bytes_read1 == 0 {
            break;
        }
        if buffer1[..bytes_read1] != buffer2[..bytes_read2] {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Compute the total size of a directory recursively.
///
/// Used by the quarantine module to report `.deleted/` volume, not by the
/// reconcile/execute hot path.
pub fn directory_size(path: &Path) -> io::Result<u64> {
    let mut total = 0u64;

    if path.is_file() {
        return Ok(fs::metadata(path)?.len());
    }

    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let metadata = entry.metadata()?;

        if metadata.is_file() {
            total += metadata.len();
        } else if metadata.is_dir() {
            total += directory_size(&entry.path())?;
        }
    }

    Ok(total)
}

/// Ensure a directory exists, creating it and all parent directories if necessary.
pub fn ensure_directory(path: &Path) -> io::Result<()> {
    if path.exists() {
        if !path.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("Path exists but is not a directory: {}", path.display()),
            ));
        }
        return Ok(());
    }

    fs::create_dir_all(path)
}

/// Generate a unique temp file path within the given directory.
///
/// Format: `{PID}-{counter}.tmp` — unique per process, monotonic counter.
pub fn generate_temp_path(temp_dir: &Path) -> PathBuf {
    let pid = std::process::id();
    let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    temp_dir.join(format!("{pid}-{counter}.tmp"))
}

/// Crash-safe atomic file writer, used by the snapshot store (spec §4.4):
/// writes to a temporary file, then atomically renames to the final
/// destination on commit. If dropped without commit, the temp file is
/// cleaned up automatically.
pub struct AtomicWriter {
    temp_path: PathBuf,
    final_path: PathBuf,
    writer: BufWriter<File>,
    committed: bool,
}

impl AtomicWriter {
    pub fn new(temp_path: PathBuf, final_path: PathBuf) -> io::Result<Self> {
        let file = File::create(&temp_path)?;
        let writer = BufWriter::with_capacity(COPY_BUFFER_SIZE, file);

        Ok(Self {
            temp_path,
            final_path,
            writer,
            committed: false,
        })
    }

    pub fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.writer.write_all(buf)
    }

    /// Flush, fsync, and atomically rename into place.
    pub fn commit(mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        fs::rename(&self.temp_path, &self.final_path)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for AtomicWriter {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn test_copy_small_file() -> io::Result<()> {
        let mut source = NamedTempFile::new()?;
        let dest_dir = tempdir()?;
        let dest_path = dest_dir.path().join("dest.txt");

        let data = b"Hello, bisync!";
        source.write_all(data)?;
        source.flush()?;

        copy_file_with_metadata(source.path(), &dest_path, false)?;

        let copied_data = fs::read(&dest_path)?;
        assert_eq!(copied_data, data);

        Ok(())
    }

    #[test]
    #[cfg(not(target_os = "windows"))]
    fn test_preserve_timestamps() -> io::Result<()> {
        let mut source = NamedTempFile::new()?;
        let dest_dir = tempdir()?;
        let dest_path = dest_dir.path().join("dest.txt");

        source.write_all(b"test data")?;
        source.flush()?;

        let original_mtime = fs::metadata(source.path())?.modified()?;
        std::thread::sleep(std::time::Duration::from_millis(10));

        copy_file_with_metadata(source.path(), &dest_path, true)?;

        let copied_mtime = fs::metadata(&dest_path)?.modified()?;
        let diff = copied_mtime
            .duration_since(original_mtime)
            .unwrap_or_else(|_| original_mtime.duration_since(copied_mtime).unwrap());
        assert!(diff.as_secs() < 2);

        Ok(())
    }

    #[test]
    fn test_remove_file_safe() -> io::Result<()> {
        let mut temp = NamedTempFile::new()?;
        temp.write_all(b"test")?;
        temp.flush()?;

        let path = temp.path().to_path_buf();
        remove_file_safe(&path)?;
        remove_file_safe(&path)?;

        Ok(())
    }

    #[test]
    fn test_verify_files_identical() -> io::Result<()> {
        let mut file1 = NamedTempFile::new()?;
        let mut file2 = NamedTempFile::new()?;

        let data = b"test data for verification";
        file1.write_all(data)?;
        file2.write_all(data)?;
        file1.flush()?;
        file2.flush()?;

        assert!(verify_files_identical(file1.path(), file2.path())?);

        let mut file3 = NamedTempFile::new()?;
        file3.write_all(b"different data")?;
        file3.flush()?;

        assert!(!verify_files_identical(file1.path(), file3.path())?);

        Ok(())
    }

    #[test]
    fn test_verify_different_sizes() -> io::Result<()> {
        let mut file1 = NamedTempFile::new()?;
        let mut file2 = NamedTempFile::new()?;

        file1.write_all(b"short")?;
        file2.write_all(b"much longer content")?;
        file1.flush()?;
        file2.flush()?;

        assert!(!verify_files_identical(file1.path(), file2.path())?);

        Ok(())
    }

    #[test]
    fn test_ensure_directory() -> io::Result<()> {
        let temp_dir = tempdir()?;
        let nested_path = temp_dir.path().join("a").join("b").join("c");

        ensure_directory(&nested_path)?;
        assert!(nested_path.exists());
        assert!(nested_path.is_dir());
        ensure_directory(&nested_path)?;

        Ok(())
    }

    #[test]
    #[cfg(not(target_os = "windows"))]
    fn test_directory_size() -> io::Result<()> {
        let temp_dir = tempdir()?;

        let mut file1 = File::create(temp_dir.path().join("file1.txt"))?;
        let mut file2 = File::create(temp_dir.path().join("file2.txt"))?;

        file1.write_all(&vec![0u8; 1000])?;
        file2.write_all(&vec![0u8; 2000])?;

        let size = directory_size(temp_dir.path())?;
        assert_eq!(size, 3000);

        Ok(())
    }

    #[test]
    fn test_atomic_writer_commit() -> io::Result<()> {
        let dir = tempdir()?;
        let temp_path = dir.path().join("temp.tmp");
        let final_path = dir.path().join("final.txt");

        let mut writer = AtomicWriter::new(temp_path.clone(), final_path.clone())?;
        writer.write(b"hello atomic")?;
        writer.commit()?;

        assert!(final_path.exists());
        assert!(!temp_path.exists());
        assert_eq!(fs::read_to_string(&final_path)?, "hello atomic");

        Ok(())
    }

    #[test]
    fn test_atomic_writer_drop_cleanup() -> io::Result<()> {
        let dir = tempdir()?;
        let temp_path = dir.path().join("temp.tmp");
        let final_path = dir.path().join("final.txt");

        {
            let mut writer = AtomicWriter::new(temp_path.clone(), final_path.clone())?;
            writer.write(b"uncommitted data")?;
        }

        assert!(!temp_path.exists(), "Temp file should be cleaned up on drop");
        assert!(!final_path.exists(), "Final path should not exist");

        Ok(())
    }

    #[test]
    fn test_generate_temp_path_uniqueness() {
        let dir = Path::new("/tmp/test");
        let path1 = generate_temp_path(dir);
        let path2 = generate_temp_path(dir);
        assert_ne!(path1, path2, "Temp paths should be unique");
    }

    #[test]
    fn test_atomic_writer_empty_file() -> io::Result<()> {
        let dir = tempdir()?;
        let temp_path = dir.path().join("temp.tmp");
        let final_path = dir.path().join("empty.txt");

        let writer = AtomicWriter::new(temp_path, final_path.clone())?;
        writer.commit()?;

        assert!(final_path.exists());
        assert_eq!(fs::read(&final_path)?, Vec::<u8>::new());

        Ok(())
    }
}
