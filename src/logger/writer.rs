//! Size-rotating file writer

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use flate2::Compression;
use flate2::write::GzEncoder;
use tracing_subscriber::fmt::MakeWriter;

use super::config::FileConfig;
use super::error::LoggerError;

/// Writes log lines to `path`, rotating to `path.1`, `path.2`, ... once the
/// active file would exceed `max_size` bytes. With `compress`, rotated
/// generations are stored as `path.N.gz`.
#[derive(Clone)]
pub struct RotatingFileWriter {
    state: Arc<Mutex<WriterState>>,
}

struct WriterState {
    file: BufWriter<File>,
    size: u64,
    path: PathBuf,
    max_size: u64,
    max_files: usize,
    compress: bool,
}

impl RotatingFileWriter {
    pub fn new(config: &FileConfig) -> Result<Self, LoggerError> {
        if let Some(parent) = config.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = open_log_file(&config.path, config.append)?;
        let size = if config.append {
            fs::metadata(&config.path).map(|m| m.len()).unwrap_or(0)
        } else {
            0
        };

        Ok(Self {
            state: Arc::new(Mutex::new(WriterState {
                file,
                size,
                path: config.path.clone(),
                max_size: config.max_size,
                max_files: config.max_files,
                compress: config.compress,
            })),
        })
    }
}

impl<'a> MakeWriter<'a> for RotatingFileWriter {
    type Writer = RotatingWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        RotatingWriterGuard {
            state: self.state.clone(),
        }
    }
}

/// Handle returned per log event.
pub struct RotatingWriterGuard {
    state: Arc<Mutex<WriterState>>,
}

impl Write for RotatingWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| io::Error::other("log writer lock poisoned"))?;

        if state.size > 0 && state.size + buf.len() as u64 > state.max_size {
            // Keep logging into the current file if rotation fails.
            if let Err(e) = state.rotate() {
                eprintln!("log rotation failed for {}: {}", state.path.display(), e);
            }
        }

        let written = state.file.write(buf)?;
        state.size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| io::Error::other("log writer lock poisoned"))?;
        state.file.flush()
    }
}

impl WriterState {
    fn rotate(&mut self) -> Result<(), LoggerError> {
        self.file.flush()?;

        let oldest = rotated_path(&self.path, self.max_files, self.compress);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for index in (1..self.max_files).rev() {
            let from = rotated_path(&self.path, index, self.compress);
            if from.exists() {
                fs::rename(&from, rotated_path(&self.path, index + 1, self.compress))?;
            }
        }

        let first = rotated_path(&self.path, 1, self.compress);
        if self.compress {
            gzip_file(&self.path, &first)?;
            fs::remove_file(&self.path)?;
        } else {
            fs::rename(&self.path, &first)?;
        }

        self.file = open_log_file(&self.path, false)?;
        self.size = 0;
        Ok(())
    }
}

fn open_log_file(path: &Path, append: bool) -> io::Result<BufWriter<File>> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)?;
    Ok(BufWriter::new(file))
}

fn rotated_path(base: &Path, index: usize, compressed: bool) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(format!(".{}", index));
    if compressed {
        name.push(".gz");
    }
    PathBuf::from(name)
}

fn gzip_file(source: &Path, target: &Path) -> Result<(), LoggerError> {
    let input = fs::read(source)?;
    let mut encoder = GzEncoder::new(File::create(target)?, Compression::default());
    encoder.write_all(&input)?;
    encoder
        .finish()
        .map_err(|e| LoggerError::rotation(format!("gzip {}: {}", target.display(), e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::tempdir;

    fn config(path: PathBuf, max_size: u64, max_files: usize, compress: bool) -> FileConfig {
        FileConfig {
            enabled: true,
            path,
            append: true,
            max_size,
            max_files,
            compress,
            ..Default::default()
        }
    }

    fn write_line(writer: &RotatingFileWriter, line: &str) {
        let mut guard = writer.make_writer();
        guard.write_all(line.as_bytes()).unwrap();
        guard.flush().unwrap();
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/logs/access.log");
        let writer = RotatingFileWriter::new(&config(path.clone(), 1024, 2, false)).unwrap();

        write_line(&writer, "hello\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
    }

    #[test]
    fn test_rotates_when_size_exceeded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("access.log");
        let writer = RotatingFileWriter::new(&config(path.clone(), 10, 2, false)).unwrap();

        write_line(&writer, "first-line\n");
        write_line(&writer, "second-line\n");
        write_line(&writer, "third-line\n");

        assert_eq!(fs::read_to_string(&path).unwrap(), "third-line\n");
        assert_eq!(
            fs::read_to_string(rotated_path(&path, 1, false)).unwrap(),
            "second-line\n"
        );
        assert_eq!(
            fs::read_to_string(rotated_path(&path, 2, false)).unwrap(),
            "first-line\n"
        );
    }

    #[test]
    fn test_keeps_at_most_max_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("access.log");
        let writer = RotatingFileWriter::new(&config(path.clone(), 4, 1, false)).unwrap();

        for line in ["aaaa\n", "bbbb\n", "cccc\n"] {
            write_line(&writer, line);
        }

        assert!(rotated_path(&path, 1, false).exists());
        assert!(!rotated_path(&path, 2, false).exists());
    }

    #[test]
    fn test_compresses_rotated_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("access.log");
        let writer = RotatingFileWriter::new(&config(path.clone(), 8, 2, true)).unwrap();

        write_line(&writer, "old-entry\n");
        write_line(&writer, "new-entry\n");

        let mut decoded = String::new();
        GzDecoder::new(File::open(rotated_path(&path, 1, true)).unwrap())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "old-entry\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "new-entry\n");
    }

    #[test]
    fn test_truncates_when_not_appending() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("access.log");
        fs::write(&path, "stale\n").unwrap();

        let mut cfg = config(path.clone(), 1024, 2, false);
        cfg.append = false;
        let writer = RotatingFileWriter::new(&cfg).unwrap();
        write_line(&writer, "fresh\n");

        assert_eq!(fs::read_to_string(&path).unwrap(), "fresh\n");
    }
}
