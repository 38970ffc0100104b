//! Item metadata: the read-only input of every build run.
//!
//! The upstream static-data export is parsed elsewhere; this crate only sees
//! the handful of attributes classification needs, delivered through a
//! [`MetadataProvider`]. A provider is exhausted exactly once per run.
//!
//! The binary reads a JSON-lines file (one [`ItemMetadata`] object per line):
//!
//! ```text
//! {"type_id":587,"category_id":6,"group_id":25,"meta_group_id":1,"graphic_id":46,"has_render_model":true}
//! {"type_id":47107,"category_id":9,"group_id":105,"meta_group_id":2,"icon_id":21,"is_blueprint":true}
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// SKIN category ids. Items in these categories carry no tech tier.
pub const SKIN_CATEGORIES: [u32; 2] = [91, 2118];

/// Ancient Relics category.
pub const RELIC_CATEGORY: u32 = 34;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path}:{line}: invalid item record: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },
    #[error("metadata provider was already exhausted for this run")]
    Exhausted,
}

/// Per-item attributes needed to classify and compose an icon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub type_id: u32,
    pub category_id: u32,
    pub group_id: u32,
    /// Tech tier; absent means tier 1.
    #[serde(default)]
    pub meta_group_id: Option<u32>,
    #[serde(default)]
    pub race_id: Option<u32>,
    #[serde(default)]
    pub icon_id: Option<u32>,
    #[serde(default)]
    pub graphic_id: Option<u32>,
    #[serde(default)]
    pub has_render_model: bool,
    #[serde(default)]
    pub is_skin_material: bool,
    /// Material whose swatch is the SKIN base layer.
    #[serde(default)]
    pub skin_material_id: Option<u32>,
    #[serde(default)]
    pub is_blueprint: bool,
    #[serde(default)]
    pub is_blueprint_copy: bool,
    #[serde(default)]
    pub is_reaction: bool,
}

impl ItemMetadata {
    /// A plain item with no icon source and no flags set.
    pub fn new(type_id: u32, category_id: u32, group_id: u32) -> Self {
        Self {
            type_id,
            category_id,
            group_id,
            meta_group_id: None,
            race_id: None,
            icon_id: None,
            graphic_id: None,
            has_render_model: false,
            is_skin_material: false,
            skin_material_id: None,
            is_blueprint: false,
            is_blueprint_copy: false,
            is_reaction: false,
        }
    }

    /// SKIN items are flagged explicitly or live in a SKIN category.
    pub fn is_skin(&self) -> bool {
        self.is_skin_material || SKIN_CATEGORIES.contains(&self.category_id)
    }

    /// Items without an icon, a graphic, or (for SKINs) a material swatch
    /// have nothing to render and are skipped before classification.
    pub fn has_icon_source(&self) -> bool {
        self.icon_id.is_some()
            || self.graphic_id.is_some()
            || (self.is_skin() && self.skin_material_id.is_some())
    }
}

/// Source of the item catalog for one run.
pub trait MetadataProvider {
    /// Yield every item record. Calling this twice on the same provider is
    /// an error: a run consumes its provider exactly once.
    fn load(&mut self) -> Result<Vec<ItemMetadata>, MetadataError>;
}

/// In-memory provider, mostly useful for tests and embedding.
#[derive(Debug, Default)]
pub struct StaticProvider {
    items: Option<Vec<ItemMetadata>>,
}

impl StaticProvider {
    pub fn new(items: Vec<ItemMetadata>) -> Self {
        Self { items: Some(items) }
    }
}

impl MetadataProvider for StaticProvider {
    fn load(&mut self) -> Result<Vec<ItemMetadata>, MetadataError> {
        self.items.take().ok_or(MetadataError::Exhausted)
    }
}

/// Reads one JSON object per line. Blank lines are ignored.
#[derive(Debug)]
pub struct JsonlProvider {
    path: PathBuf,
    consumed: bool,
}

impl JsonlProvider {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            consumed: false,
        }
    }
}

impl MetadataProvider for JsonlProvider {
    fn load(&mut self) -> Result<Vec<ItemMetadata>, MetadataError> {
        if self.consumed {
            return Err(MetadataError::Exhausted);
        }
        self.consumed = true;

        let content = std::fs::read_to_string(&self.path).map_err(|source| MetadataError::Io {
            path: self.path.clone(),
            source,
        })?;
        parse_jsonl(&content, &self.path)
    }
}

fn parse_jsonl(content: &str, path: &Path) -> Result<Vec<ItemMetadata>, MetadataError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|source| MetadataError::Parse {
                path: path.to_path_buf(),
                line: idx + 1,
                source,
            })
        })
        .collect()
}
