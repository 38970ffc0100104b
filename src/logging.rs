//! Diagnostic logging setup for the binary.
//!
//! Library code only emits `tracing` events; this module installs the
//! subscriber. Logs go to stderr so stdout stays reserved for the run report
//! (and for the bare digest printed by `checksum`).

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("cannot open log file {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("logging already initialised: {0}")]
    Init(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Level used when `RUST_LOG` is not set.
pub fn default_directive(quiet: bool) -> &'static str {
    if quiet { "warn" } else { "info" }
}

/// Open (creating if needed) the log file, truncating unless `append`.
pub fn open_log_file(path: &Path, append: bool) -> Result<File, LoggingError> {
    let wrap = |source| LoggingError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(wrap)?;
    }
    OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .map_err(wrap)
}

/// Install the global subscriber: stderr always, plus an ANSI-free copy to
/// `log_file` when given.
pub fn init(quiet: bool, log_file: Option<&Path>, append: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(quiet)));
    let stderr_layer = fmt::layer().with_writer(io::stderr).with_target(false);
    let file_layer = log_file
        .map(|path| open_log_file(path, append))
        .transpose()?
        .map(|file| fmt::layer().with_writer(Mutex::new(file)).with_ansi(false));

    let subscriber = Registry::default()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn quiet_lowers_default_level() {
        assert_eq!(default_directive(false), "info");
        assert_eq!(default_directive(true), "warn");
    }

    #[test]
    fn log_file_truncates_by_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("logs/build.log");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "old run\n").unwrap();

        let mut file = open_log_file(&path, false).unwrap();
        writeln!(file, "new run").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new run\n");
    }

    #[test]
    fn log_file_appends_when_asked() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("build.log");
        std::fs::write(&path, "old run\n").unwrap();

        let mut file = open_log_file(&path, true).unwrap();
        writeln!(file, "new run").unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "old run\nnew run\n"
        );
    }

    #[test]
    fn log_file_parent_is_created() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/dir/build.log");
        open_log_file(&path, false).unwrap();
        assert!(path.exists());
    }
}
