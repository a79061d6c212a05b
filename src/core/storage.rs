use crate::domain::model::Timestamp;
use crate::utils::error::{RefreshError, Result};
use encoding_rs::WINDOWS_1252;
use std::borrow::Cow;
use std::ffi::OsString;
use std::fs::{self, File, FileTimes};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

/// Positions CP1252 leaves undefined. WHATWG's windows-1252 maps them to
/// C1 controls, legacy writers emit `?`.
const CP1252_UNDEFINED: [char; 5] = ['\u{81}', '\u{8D}', '\u{8F}', '\u{90}', '\u{9D}'];

/// Writes fetched content to the local file system.
///
/// Text is always written as CP1252, one `\n`-terminated line per entry,
/// because downstream readers of these files expect that encoding. Missing
/// content or a missing path makes every operation a no-op.
///
/// Content goes to a hidden `.part` sibling first and replaces the target
/// only once it is complete, so a failed write keeps the previous artifact
/// and its modification time.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageWriter;

impl StorageWriter {
    pub fn new() -> Self {
        Self
    }

    pub fn write_lines<S: AsRef<str>>(&self, lines: Option<&[S]>, path: Option<&Path>) -> Result<()> {
        let (Some(lines), Some(path)) = (lines, path) else {
            return Ok(());
        };

        write_replacing(path, |writer| {
            for line in lines {
                writer.write_all(&encode_cp1252(line.as_ref()))?;
                writer.write_all(b"\n")?;
            }
            Ok(())
        })?;

        tracing::debug!("Wrote {} lines to {}", lines.len(), path.display());
        Ok(())
    }

    /// Copies `stream` byte for byte into `path`.
    pub fn write_stream<R: Read>(&self, stream: Option<R>, path: Option<&Path>) -> Result<u64> {
        let (Some(mut stream), Some(path)) = (stream, path) else {
            return Ok(0);
        };

        let copied = write_replacing(path, |writer| io::copy(&mut stream, writer))?;

        tracing::debug!("Wrote {} bytes to {}", copied, path.display());
        Ok(copied)
    }

    /// Stamps `path` with `timestamp` (ms since epoch) as its modification
    /// time. Missing files and negative timestamps are ignored.
    pub fn touch_last_modified(&self, path: Option<&Path>, timestamp: Timestamp) {
        let Some(path) = path else {
            return;
        };
        if timestamp < 0 || !path.exists() {
            return;
        }

        let modified = UNIX_EPOCH + Duration::from_millis(timestamp.unsigned_abs());
        // 只改時間屬性，唯讀檔案也適用
        let result = File::open(path)
            .and_then(|file| file.set_times(FileTimes::new().set_modified(modified)));
        if let Err(e) = result {
            tracing::warn!(
                "Could not set last modified time of {}: {}",
                path.display(),
                e
            );
        }
    }
}

/// Runs `write` against a buffered `.part` sibling of `path` and renames it
/// over `path` once the data is flushed. The sibling is removed on failure.
fn write_replacing<T, F>(path: &Path, write: F) -> Result<T>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<T>,
{
    ensure_parent_dirs(path)?;
    let part = part_path(path);

    let result = File::create(&part).and_then(|file| {
        let mut writer = BufWriter::new(file);
        let value = write(&mut writer)?;
        // 緩衝區寫出屬於寫入流程，錯誤要回報；檔案關閉交給 drop
        writer.into_inner().map_err(io::IntoInnerError::into_error)?;
        fs::rename(&part, path)?;
        Ok(value)
    });

    result.map_err(|e| {
        if part.exists() {
            if let Err(cleanup) = fs::remove_file(&part) {
                tracing::warn!("Could not remove {}: {}", part.display(), cleanup);
            }
        }
        storage_error(path, e)
    })
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(".part");
    path.with_file_name(name)
}

fn ensure_parent_dirs(path: &Path) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() || parent.exists() {
        return Ok(());
    }
    fs::create_dir_all(parent).map_err(|e| {
        RefreshError::storage(
            path.display().to_string(),
            format!("Could not create the parent directory: {}", e),
        )
    })
}

fn storage_error(path: &Path, e: io::Error) -> RefreshError {
    RefreshError::storage(path.display().to_string(), e.to_string())
}

/// CP1252 bytes of `line`; characters outside the code page become `?`.
fn encode_cp1252(line: &str) -> Cow<'_, [u8]> {
    let (bytes, _, had_errors) = WINDOWS_1252.encode(line);
    if !had_errors && !line.contains(&CP1252_UNDEFINED[..]) {
        return bytes;
    }

    let mut out = Vec::with_capacity(line.len());
    let mut buf = [0u8; 4];
    for ch in line.chars() {
        let (encoded, _, unmappable) = WINDOWS_1252.encode(ch.encode_utf8(&mut buf));
        if unmappable || CP1252_UNDEFINED.contains(&ch) {
            out.push(b'?');
        } else {
            out.extend_from_slice(&encoded);
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;
    use tempfile::TempDir;

    #[test]
    fn test_write_lines_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/out.txt");

        StorageWriter::new()
            .write_lines(Some(&["a", "b"][..]), Some(path.as_path()))
            .unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"a\nb\n");
    }

    #[test]
    fn test_write_lines_uses_cp1252() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        let lines = vec!["Grüße €".to_string(), "日本".to_string()];

        StorageWriter::new()
            .write_lines(Some(lines.as_slice()), Some(path.as_path()))
            .unwrap();

        assert_eq!(
            fs::read(&path).unwrap(),
            b"Gr\xFC\xDFe \x80\n??\n".to_vec()
        );
    }

    #[test]
    fn test_write_lines_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        let writer = StorageWriter::new();

        writer.write_lines(Some(&["old", "content"][..]), Some(path.as_path())).unwrap();
        writer.write_lines(Some(&["new"][..]), Some(path.as_path())).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new\n");
    }

    #[test]
    fn test_absent_arguments_are_noops() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub/out.txt");
        let writer = StorageWriter::new();

        writer.write_lines::<&str>(None, Some(path.as_path())).unwrap();
        writer.write_lines(Some(&["a"][..]), None).unwrap();
        assert_eq!(writer.write_stream::<&[u8]>(None, Some(path.as_path())).unwrap(), 0);
        assert_eq!(writer.write_stream(Some(&b"abc"[..]), None).unwrap(), 0);
        writer.touch_last_modified(None, 1_000);

        assert!(!path.exists());
        assert!(!dir.path().join("sub").exists());
    }

    #[test]
    fn test_write_stream_is_verbatim() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bin/blob.dat");
        let data: Vec<u8> = (0..=255).collect();

        let copied = StorageWriter::new()
            .write_stream(Some(&data[..]), Some(path.as_path()))
            .unwrap();

        assert_eq!(copied, 256);
        assert_eq!(fs::read(&path).unwrap(), data);
    }

    #[test]
    fn test_parent_that_is_a_file_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();

        let result = StorageWriter::new()
            .write_lines(Some(&["a"][..]), Some(blocker.join("child/out.txt").as_path()));

        assert!(matches!(result, Err(RefreshError::Storage { .. })));
    }

    #[test]
    fn test_touch_last_modified() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stamp.txt");
        fs::write(&path, b"x").unwrap();

        let stamp: Timestamp = 1_600_000_000_000;
        StorageWriter::new().touch_last_modified(Some(path.as_path()), stamp);

        let modified = fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(modified, UNIX_EPOCH + Duration::from_millis(stamp as u64));
        assert_eq!(crate::core::staleness::last_run(&path), stamp);
    }

    #[test]
    fn test_touch_ignores_missing_file_and_negative_timestamp() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.txt");
        let writer = StorageWriter::new();

        writer.touch_last_modified(Some(missing.as_path()), 1_000);
        assert!(!missing.exists());

        let path = dir.path().join("present.txt");
        fs::write(&path, b"x").unwrap();
        let before = fs::metadata(&path).unwrap().modified().unwrap();
        writer.touch_last_modified(Some(path.as_path()), -1);
        let after = fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(before, after);
        assert!(after <= SystemTime::now());
    }

    struct FailingReader {
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.served {
                return Err(io::Error::new(io::ErrorKind::Other, "connection reset"));
            }
            self.served = true;
            buf[..4].copy_from_slice(b"half");
            Ok(4)
        }
    }

    #[test]
    fn test_failed_write_keeps_previous_artifact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feed.txt");
        let writer = StorageWriter::new();
        writer.write_lines(Some(&["previous"][..]), Some(path.as_path())).unwrap();
        writer.touch_last_modified(Some(path.as_path()), 1_000);

        let result = writer.write_stream(Some(FailingReader { served: false }), Some(path.as_path()));

        assert!(matches!(result, Err(RefreshError::Storage { .. })));
        assert_eq!(fs::read(&path).unwrap(), b"previous\n");
        assert_eq!(crate::core::staleness::last_run(&path), 1_000);
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_failed_first_write_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("new/feed.bin");

        let result = StorageWriter::new()
            .write_stream(Some(FailingReader { served: false }), Some(path.as_path()));

        assert!(result.is_err());
        assert!(!path.exists());
        assert_eq!(crate::core::staleness::last_run(&path), 0);
        assert_eq!(fs::read_dir(dir.path().join("new")).unwrap().count(), 0);
    }

    #[test]
    fn test_undefined_cp1252_positions_become_question_marks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        let lines = vec!["a\u{81}b\u{8D}\u{8F}\u{90}\u{9D}c€".to_string()];

        StorageWriter::new()
            .write_lines(Some(lines.as_slice()), Some(path.as_path()))
            .unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"a?b????c\x80\n".to_vec());
    }

    #[cfg(unix)]
    #[test]
    fn test_touch_read_only_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("locked.txt");
        fs::write(&path, b"x").unwrap();
        let mut permissions = fs::metadata(&path).unwrap().permissions();
        permissions.set_readonly(true);
        fs::set_permissions(&path, permissions).unwrap();

        let stamp: Timestamp = 1_500_000_000_000;
        StorageWriter::new().touch_last_modified(Some(path.as_path()), stamp);

        assert_eq!(crate::core::staleness::last_run(&path), stamp);
    }
}
