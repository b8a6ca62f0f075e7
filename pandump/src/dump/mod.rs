//! Time-bucketed dump files.
//!
//! Each [`DumpWriter`] owns at most one open file for its format. Files are
//! grouped in 10-minute buckets under `<root>/<YYYY-MM-DD>/` and named
//! `<YYYY-MM-DD>_<HH>-<MM>_<suffix>`, where `HH-MM` is the bucket start.

mod format;

pub use format::{DumpFormat, SAVVYCAN_HEADER};

use crate::Frame;
use chrono::{DateTime, Duration, Local, NaiveDateTime, Timelike};
use log::{info, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const BUCKET_MINUTES: u32 = 10;

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("unknown dump format '{0}' (expected candump or savvycan)")]
    UnknownFormat(String),

    #[error("cannot create directory {}: {source}", .path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("cannot open {}: {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("cannot write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// Start of the 10-minute bucket containing `time`, in local time
pub fn bucket_start(time: &DateTime<Local>) -> NaiveDateTime {
    let t = time.naive_local();
    t - Duration::minutes((t.minute() % BUCKET_MINUTES) as i64)
        - Duration::seconds(t.second() as i64)
        - Duration::nanoseconds(t.nanosecond() as i64)
}

/// Path of the file holding `bucket` for `format` below `root`
pub fn bucket_path(
    root: &Path,
    format: DumpFormat,
    bucket: &NaiveDateTime,
) -> PathBuf {
    let date = bucket.format("%Y-%m-%d").to_string();
    let name = format!(
        "{}_{}_{}",
        date,
        bucket.format("%H-%M"),
        format.suffix()
    );
    root.join(date).join(name)
}

struct DumpFile {
    bucket: NaiveDateTime,
    path: PathBuf,
    out: BufWriter<File>,
}

/// Appends frames to the current bucket file of one format
pub struct DumpWriter {
    format: DumpFormat,
    root: PathBuf,
    current: Option<DumpFile>,
}

impl DumpWriter {
    pub fn new<P: AsRef<Path>>(format: DumpFormat, root: P) -> Self {
        Self {
            format,
            root: root.as_ref().to_path_buf(),
            current: None,
        }
    }

    pub fn format(&self) -> DumpFormat {
        self.format
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|f| f.path.as_path())
    }

    pub fn current_bucket(&self) -> Option<NaiveDateTime> {
        self.current.as_ref().map(|f| f.bucket)
    }

    /// Append `frame` to the file of the bucket its timestamp falls in,
    /// rolling over to a new file when the bucket changes.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), DumpError> {
        let bucket = bucket_start(&frame.time);
        if self.current_bucket() != Some(bucket) {
            self.close()?;
            self.open(bucket)?;
        }

        if let Some(file) = self.current.as_mut() {
            self.format.write_frame(&mut file.out, frame).map_err(|e| {
                DumpError::Write {
                    path: file.path.clone(),
                    source: e,
                }
            })?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), DumpError> {
        match self.current.as_mut() {
            Some(file) => {
                file.out.flush().map_err(|e| DumpError::Write {
                    path: file.path.clone(),
                    source: e,
                })
            }
            None => Ok(()),
        }
    }

    /// Flush and close the current file, if any. The handle is released even
    /// when the final flush fails.
    pub fn close(&mut self) -> Result<(), DumpError> {
        if let Some(mut file) = self.current.take() {
            file.out.flush().map_err(|e| DumpError::Write {
                path: file.path.clone(),
                source: e,
            })?;
            info!("Closed {}", file.path.display());
        }
        Ok(())
    }

    fn open(&mut self, bucket: NaiveDateTime) -> Result<(), DumpError> {
        let path = bucket_path(&self.root, self.format, &bucket);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| DumpError::CreateDir {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }

        let open_err = |e| DumpError::Open {
            path: path.clone(),
            source: e,
        };
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(open_err)?;
        let existing = file.metadata().map_err(open_err)?.len();

        let mut out = BufWriter::new(file);
        if existing > 0 {
            warn!("Appending to an existing file: {}", path.display());
        } else if let Some(header) = self.format.header() {
            writeln!(out, "{header}").map_err(|e| DumpError::Write {
                path: path.clone(),
                source: e,
            })?;
        }

        info!("Opened {} for writing", path.display());
        self.current = Some(DumpFile { bucket, path, out });
        Ok(())
    }
}
