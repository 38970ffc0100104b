//! Run-wide error taxonomy.
//!
//! Every module owns its own `thiserror` enum. This module only defines the
//! shared [`ErrorKind`] that those enums report, so the end-of-run report can
//! group failures without caring which stage produced them.

use std::fmt;

/// Coarse classification of everything that can go wrong during a run.
///
/// Per-item kinds (`UnknownTier`, `UnknownRace`, `MissingAsset`,
/// `AssetDecodeFailure`) exclude the item from the current manifest only;
/// it is retried on the next run. The manifest kinds are run-level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    UnknownTier,
    UnknownRace,
    MissingAsset,
    AssetDecodeFailure,
    PlacementFailure,
    ManifestCorrupt,
    ManifestWriteFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UnknownTier => "unknown tier",
            Self::UnknownRace => "unknown race",
            Self::MissingAsset => "missing asset",
            Self::AssetDecodeFailure => "asset decode failure",
            Self::PlacementFailure => "placement failure",
            Self::ManifestCorrupt => "manifest corrupt",
            Self::ManifestWriteFailure => "manifest write failure",
        };
        f.write_str(name)
    }
}
