//! # Icon Builder
//!
//! Deterministic, incremental icon builder for a game item catalog. Every
//! item's metadata is turned into a small set of composed raster images
//! (a 64px icon and, for items with a 3D model, a 512px render), and the
//! results are packaged into several bundle formats.
//!
//! # Architecture: Four-Stage Pipeline
//!
//! ```text
//! 1. Classify   metadata  →  recipes          (item → layers to stack)
//! 2. Compose    recipes   →  blobs/           (layers → encoded images, gated by cache)
//! 3. Record     outputs   →  manifest.json    (what was built, from what)
//! 4. Assemble   manifest  →  bundles          (tar, web dir, checksum)
//! ```
//!
//! Data flows strictly downward. Nothing above the assemblers reads the
//! network or disk directly: source bytes arrive through an injected
//! [`assets::AssetFetcher`] and item records through a
//! [`metadata::MetadataProvider`].
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`metadata`] | Item records and the providers that supply them |
//! | [`classify`] | Pure item → [`classify::CompositionRecipe`] mapping: kinds, tiers, badges, race backgrounds |
//! | [`assets`] | Asset references, fetchers, and the run-scoped de-duplicating asset cache |
//! | [`imaging`] | Layer compositing and PNG/JPEG encoding behind the [`imaging::Compositor`] trait |
//! | [`cache`] | Recipe fingerprints, the build manifest, and the content-addressed blob store |
//! | [`process`] | The parallel incremental build driver |
//! | [`bundle`] | Assemblers: service bundle, export collection, web directory, checksum, asset dumps |
//! | [`config`] | `icons.toml` loading, validation, and merging |
//! | [`output`] | CLI output formatting |
//! | [`logging`] | `tracing` subscriber setup for the binary |
//! | [`error`] | Shared [`error::ErrorKind`] taxonomy |
//!
//! # Design Decisions
//!
//! ## Content-Addressed Freshness
//!
//! An item is rebuilt only when the SHA-256 fingerprint of its recipe
//! changes. The fingerprint covers the layers' *source bytes*, not their
//! names, plus geometry, blend modes, resolutions, and encoder settings. A
//! re-exported icon with the same path but new pixels is therefore picked
//! up, and a metadata edit that yields the same recipe is not.
//!
//! ## Manifest as the Only Contract
//!
//! Assemblers never re-classify. They read the manifest and the blob store
//! and nothing else, so every bundle of one manifest describes exactly the
//! same icon set, and the checksum of that manifest identifies it.
//!
//! ## Per-Item Failure Isolation
//!
//! A missing or corrupt source asset fails one item, not the run. The item
//! is left out of this run's manifest, reported at the end grouped by
//! [`error::ErrorKind`], and retried next time. Only manifest persistence
//! and bundle writing are run-level failures.

pub mod assets;
pub mod bundle;
pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod imaging;
pub mod logging;
pub mod metadata;
pub mod output;
pub mod process;

#[cfg(test)]
pub(crate) mod test_helpers;
