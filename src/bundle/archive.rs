//! Deterministic tar writer.
//!
//! Headers are normalised (mode 0644, mtime 0, uid/gid 0, no user/group
//! names) so identical inputs appended in identical order produce identical
//! archives. Callers append in a stable order.

use super::BundleError;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tar::{Builder, EntryType, Header, HeaderMode};

pub struct ArchiveWriter {
    dest: PathBuf,
    partial: PathBuf,
    builder: Builder<BufWriter<File>>,
    entries: usize,
}

impl ArchiveWriter {
    /// Start writing `dest`. Bytes go to `<dest>.partial` until
    /// [`finish`](Self::finish).
    pub fn create(dest: &Path) -> Result<Self, BundleError> {
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(BundleError::io(parent))?;
        }
        let mut partial = dest.as_os_str().to_owned();
        partial.push(".partial");
        let partial = PathBuf::from(partial);

        let file = File::create(&partial).map_err(BundleError::io(&partial))?;
        let mut builder = Builder::new(BufWriter::new(file));
        builder.mode(HeaderMode::Deterministic);
        Ok(Self {
            dest: dest.to_path_buf(),
            partial,
            builder,
            entries: 0,
        })
    }

    pub fn append(&mut self, name: &str, bytes: &[u8]) -> Result<(), BundleError> {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        self.builder
            .append_data(&mut header, name, bytes)
            .map_err(BundleError::io(&self.partial))?;
        self.entries += 1;
        Ok(())
    }

    /// Flush, then atomically move the archive into place. Returns the number
    /// of entries written.
    pub fn finish(self) -> Result<usize, BundleError> {
        let writer = self
            .builder
            .into_inner()
            .map_err(BundleError::io(&self.partial))?;
        let file = writer
            .into_inner()
            .map_err(|e| BundleError::io(&self.partial)(e.into_error()))?;
        file.sync_all().map_err(BundleError::io(&self.partial))?;
        std::fs::rename(&self.partial, &self.dest).map_err(BundleError::io(&self.dest))?;
        Ok(self.entries)
    }
}
