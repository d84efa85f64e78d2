//! Shared logging bootstrap for Cartograph binaries.
//!
//! Logs go to stderr (filtered) and to a size-capped rolling file under
//! `~/.cartograph/logs`.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use cartograph_protocol::paths;

const DEFAULT_LOG_FILTER: &str =
    "cartograph=info,cartograph_sentinel=info,cartograph_agent=info,cartograph_db=info";
const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration shared by Cartograph binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
    /// Overrides the default filter; RUST_LOG wins over both.
    pub filter: Option<&'a str>,
}

/// Initialize tracing with a rolling file writer and stderr output.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let log_dir = ensure_logs_dir().context("Failed to ensure log directory")?;
    let file_writer = RollingWriter::shared(log_dir, config.app_name)
        .context("Failed to initialize rolling log writer")?;

    let base_filter = config.filter.unwrap_or(DEFAULT_LOG_FILTER);
    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(base_filter));
    let console_filter = if config.verbose {
        file_filter.clone()
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .init();

    Ok(())
}

/// Ensure the logs directory exists and return it.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = paths::default_logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// Append-only log file that rotates at a byte cap, keeping a fixed number
/// of numbered predecessors (`app.log`, `app.log.1`, ...).
struct RollingFile {
    dir: PathBuf,
    base_name: String,
    file: Option<File>,
    written: u64,
}

impl RollingFile {
    fn open(dir: PathBuf, base_name: &str) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        let mut this = Self {
            dir,
            base_name: safe_base_name(base_name),
            file: None,
            written: 0,
        };
        this.reopen()?;
        if this.written > MAX_LOG_FILE_SIZE {
            this.rotate()?;
        }
        Ok(this)
    }

    fn active_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.base_name))
    }

    fn numbered_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}.log.{}", self.base_name, index))
    }

    fn reopen(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.active_path())?;
        self.written = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }

    fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }

        let last = MAX_LOG_FILES.saturating_sub(1);
        if last > 0 {
            let oldest = self.numbered_path(last);
            if oldest.exists() {
                fs::remove_file(&oldest)?;
            }
            for idx in (1..last).rev() {
                let src = self.numbered_path(idx);
                if src.exists() {
                    fs::rename(&src, self.numbered_path(idx + 1))?;
                }
            }
            let active = self.active_path();
            if active.exists() {
                fs::rename(active, self.numbered_path(1))?;
            }
        }

        self.reopen()
    }
}

impl Write for RollingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written + buf.len() as u64 > MAX_LOG_FILE_SIZE {
            self.rotate()?;
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file unavailable"))?;
        let n = file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

/// Clonable `MakeWriter` over a shared [`RollingFile`].
#[derive(Clone)]
struct RollingWriter {
    inner: Arc<Mutex<RollingFile>>,
}

impl RollingWriter {
    fn shared(dir: PathBuf, base_name: &str) -> Result<Self> {
        let file = RollingFile::open(dir, base_name)
            .with_context(|| format!("Failed to open log file for {}", base_name))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(file)),
        })
    }
}

struct RollingWriterGuard {
    inner: Arc<Mutex<RollingFile>>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RollingWriter {
    type Writer = RollingWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        RollingWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for RollingWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.inner.lock() {
            Ok(mut file) => file.write(buf),
            Err(_) => Err(io::Error::new(io::ErrorKind::Other, "log writer poisoned")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.inner.lock() {
            Ok(mut file) => file.flush(),
            Err(_) => Err(io::Error::new(io::ErrorKind::Other, "log writer poisoned")),
        }
    }
}

fn safe_base_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "cartograph".to_string()
    } else {
        cleaned
    }
}
