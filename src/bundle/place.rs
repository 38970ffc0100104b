//! File placement: how built images land in a web directory.
//!
//! The assembler only decides *what* goes *where*; a [`FilePlacer`] decides
//! whether that is a copy, a symlink into the blob store, or a hardlink.
//! Existing destinations are replaced.

use crate::error::ErrorKind;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("failed to place {} from {}: {source}", dest.display(), src.display())]
pub struct PlacementError {
    pub src: PathBuf,
    pub dest: PathBuf,
    pub source: io::Error,
}

impl PlacementError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::PlacementFailure
    }
}

/// Materializes one file at `dest` with the contents of `src`.
pub trait FilePlacer: Sync {
    fn place(&self, src: &Path, dest: &Path) -> Result<(), PlacementError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinkMode {
    Copy,
    /// Absolute symlink to the source.
    #[default]
    Symlink,
    Hardlink,
}

impl FilePlacer for LinkMode {
    fn place(&self, src: &Path, dest: &Path) -> Result<(), PlacementError> {
        let wrap = |source| PlacementError {
            src: src.to_path_buf(),
            dest: dest.to_path_buf(),
            source,
        };
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(wrap)?;
        }
        remove_existing(dest).map_err(wrap)?;

        match self {
            Self::Copy => std::fs::copy(src, dest).map(|_| ()),
            Self::Hardlink => std::fs::hard_link(src, dest),
            Self::Symlink => std::path::absolute(src).and_then(|target| symlink(&target, dest)),
        }
        .map_err(wrap)
    }
}

fn remove_existing(path: &Path) -> io::Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(_) => std::fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source(tmp: &TempDir) -> PathBuf {
        let src = tmp.path().join("blob.png");
        std::fs::write(&src, b"pixels").unwrap();
        src
    }

    #[test]
    fn every_mode_produces_readable_file() {
        let tmp = TempDir::new().unwrap();
        let src = source(&tmp);
        for (i, mode) in [LinkMode::Copy, LinkMode::Symlink, LinkMode::Hardlink]
            .into_iter()
            .enumerate()
        {
            let dest = tmp.path().join(format!("out/{i}.png"));
            mode.place(&src, &dest).unwrap();
            assert_eq!(std::fs::read(&dest).unwrap(), b"pixels", "{mode:?}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn symlink_points_at_source() {
        let tmp = TempDir::new().unwrap();
        let src = source(&tmp);
        let dest = tmp.path().join("link.png");
        LinkMode::Symlink.place(&src, &dest).unwrap();
        assert!(std::fs::symlink_metadata(&dest).unwrap().file_type().is_symlink());
    }

    #[test]
    fn existing_destination_is_replaced() {
        let tmp = TempDir::new().unwrap();
        let src = source(&tmp);
        let dest = tmp.path().join("icon.png");
        std::fs::write(&dest, b"old").unwrap();
        LinkMode::Copy.place(&src, &dest).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"pixels");
    }

    #[test]
    fn missing_source_is_placement_failure() {
        let tmp = TempDir::new().unwrap();
        let err = LinkMode::Copy
            .place(&tmp.path().join("nope.png"), &tmp.path().join("out.png"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PlacementFailure);
    }
}
