//! Classification: item metadata → icon kind + composition recipe.
//!
//! [`classify`] is a pure function. It never touches the network or the
//! filesystem and never consults asset availability, so the same metadata
//! always yields the same recipes. Data-quality observations (a reaction with
//! no recognised race, a render model without a graphic) are returned as
//! [`ClassifyWarning`]s for the caller to log and count.
//!
//! ## Rules (first match wins)
//!
//! | Condition | Kind | Layers |
//! |---|---|---|
//! | `is_blueprint_copy` | BlueprintCopy | `bpc.png`, icon, `bpc_overlay.png` (additive), badge |
//! | `is_blueprint` | Blueprint | `bpo.png`, icon, `bpo_overlay.png` (additive), badge |
//! | `is_reaction` | Reaction | race background, icon, `bpo_overlay.png` (additive), badge |
//! | relic category | Relic | `relic.png`, icon, `relic_overlay.png` (additive), badge |
//! | SKIN | Icon | material swatch only, never a badge |
//! | otherwise | Icon | icon, badge |
//!
//! Independently, `has_render_model` adds a second, render-scale recipe.
//!
//! ## Tech-tier badge
//!
//! Meta group 1 (or absent) has no badge. Every other meta group must be in
//! [`TECH_BADGES`]; an unknown one is [`ClassifyError::UnknownTier`] because
//! a dropped badge would look exactly like a correct tier-1 icon.

use crate::assets::{AssetRef, GraphicVariant};
use crate::error::ErrorKind;
use crate::metadata::{ItemMetadata, RELIC_CATEGORY};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Layer placements are expressed on a 64×64 design grid and scaled to each
/// target resolution.
pub const DESIGN_GRID: u32 = 64;

/// Groups whose render models exist but whose 2D icon is the canonical one.
pub const ICON_INSTEAD_OF_GRAPHIC_GROUPS: [u32; 8] = [12, 340, 448, 479, 548, 649, 711, 4168];

/// Meta group → badge texture.
pub const TECH_BADGES: [(u32, &str); 12] = [
    (2, "res:/ui/texture/icons/73_16_242.png"),
    (3, "res:/ui/texture/icons/73_16_245.png"),
    (4, "res:/ui/texture/icons/73_16_246.png"),
    (5, "res:/ui/texture/icons/73_16_248.png"),
    (6, "res:/ui/texture/icons/73_16_247.png"),
    (14, "res:/ui/texture/icons/73_16_243.png"),
    (15, "res:/ui/texture/icons/itemoverlay/abyssal.png"),
    (17, "res:/ui/texture/icons/itemoverlay/nes.png"),
    (19, "res:/ui/texture/icons/itemoverlay/timelimited.png"),
    (52, "res:/ui/texture/shared/structureoverlayfaction.png"),
    (53, "res:/ui/texture/shared/structureoverlayt2.png"),
    (54, "res:/ui/texture/shared/structureoverlay.png"),
];

/// Race → reaction background texture.
pub const REACTION_BACKGROUNDS: [(u32, &str); 4] = [
    (1, "res:/ui/texture/icons/reaction_caldari.png"),
    (2, "res:/ui/texture/icons/reaction_minmatar.png"),
    (4, "res:/ui/texture/icons/reaction_amarr.png"),
    (8, "res:/ui/texture/icons/reaction_gallente.png"),
];

pub const REACTION_DEFAULT_BACKGROUND: &str = "res:/ui/texture/icons/reaction.png";
pub const BPO_BACKGROUND: &str = "res:/ui/texture/icons/bpo.png";
pub const BPO_OVERLAY: &str = "res:/ui/texture/icons/bpo_overlay.png";
pub const BPC_BACKGROUND: &str = "res:/ui/texture/icons/bpc.png";
pub const BPC_OVERLAY: &str = "res:/ui/texture/icons/bpc_overlay.png";
pub const RELIC_BACKGROUND: &str = "res:/ui/texture/icons/relic.png";
pub const RELIC_OVERLAY: &str = "res:/ui/texture/icons/relic_overlay.png";

/// Closed set of icon composition families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IconKind {
    #[serde(rename = "icon")]
    Icon,
    #[serde(rename = "bp")]
    Blueprint,
    #[serde(rename = "bpc")]
    BlueprintCopy,
    #[serde(rename = "reaction")]
    Reaction,
    #[serde(rename = "relic")]
    Relic,
    #[serde(rename = "render")]
    Render,
}

impl IconKind {
    /// Stable byte fed into recipe fingerprints. Never renumber.
    pub fn discriminant(self) -> u8 {
        match self {
            Self::Icon => 0,
            Self::Blueprint => 1,
            Self::BlueprintCopy => 2,
            Self::Reaction => 3,
            Self::Relic => 4,
            Self::Render => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Icon => "icon",
            Self::Blueprint => "bp",
            Self::BlueprintCopy => "bpc",
            Self::Reaction => "reaction",
            Self::Relic => "relic",
            Self::Render => "render",
        }
    }
}

impl fmt::Display for IconKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoded file format of an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

/// Target output resolution. Each resolution mandates its own format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "64")]
    Icon64,
    #[serde(rename = "512")]
    Render512,
}

impl Resolution {
    pub fn pixels(self) -> u32 {
        match self {
            Self::Icon64 => 64,
            Self::Render512 => 512,
        }
    }

    pub fn format(self) -> OutputFormat {
        match self {
            Self::Icon64 => OutputFormat::Png,
            Self::Render512 => OutputFormat::Jpeg,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Icon64 => "64",
            Self::Render512 => "512",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a layer combines with what is already on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Porter-Duff source-over.
    Over,
    /// RGB added (weighted by layer alpha), alpha combined with over.
    Additive,
}

impl BlendMode {
    pub fn discriminant(self) -> u8 {
        match self {
            Self::Over => 0,
            Self::Additive => 1,
        }
    }
}

/// Square placement on the [`DESIGN_GRID`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub size: u32,
}

impl Placement {
    /// Covers the whole canvas.
    pub const FULL: Self = Self {
        x: 0,
        y: 0,
        size: DESIGN_GRID,
    };

    /// Tech badge: a quarter-width square in the top-left corner.
    pub const BADGE: Self = Self {
        x: 0,
        y: 0,
        size: 16,
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    pub source: AssetRef,
    pub blend: BlendMode,
    pub placement: Placement,
}

impl Layer {
    fn full(source: AssetRef, blend: BlendMode) -> Self {
        Self {
            source,
            blend,
            placement: Placement::FULL,
        }
    }

    fn badge(source: AssetRef) -> Self {
        Self {
            source,
            blend: BlendMode::Over,
            placement: Placement::BADGE,
        }
    }
}

/// Ordered layers (bottom first) plus the resolutions to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionRecipe {
    pub kind: IconKind,
    pub layers: Vec<Layer>,
    pub resolutions: Vec<Resolution>,
}

impl CompositionRecipe {
    pub fn assets(&self) -> impl Iterator<Item = &AssetRef> {
        self.layers.iter().map(|l| &l.source)
    }
}

/// Data-quality observations made while classifying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifyWarning {
    /// Reaction item whose race has no dedicated background.
    ReactionRaceFallback { race_id: Option<u32> },
    /// `has_render_model` is set but there is no graphic to render from.
    RenderWithoutGraphic,
}

impl fmt::Display for ClassifyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReactionRaceFallback { race_id: Some(r) } => {
                write!(f, "unrecognised reaction race {r}, using default background")
            }
            Self::ReactionRaceFallback { race_id: None } => {
                f.write_str("reaction without race, using default background")
            }
            Self::RenderWithoutGraphic => f.write_str("render model without graphic id"),
        }
    }
}

/// What to do with a reaction whose race is absent or unrecognised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownRacePolicy {
    #[default]
    Fallback,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassifyOptions {
    pub unknown_race: UnknownRacePolicy,
}

/// Result of classifying one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub primary: CompositionRecipe,
    pub render: Option<CompositionRecipe>,
    pub warnings: Vec<ClassifyWarning>,
}

impl Classification {
    pub fn kind(&self) -> IconKind {
        self.primary.kind
    }

    pub fn recipes(&self) -> impl Iterator<Item = &CompositionRecipe> {
        std::iter::once(&self.primary).chain(self.render.as_ref())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("type {type_id}: unknown tech tier (meta group {meta_group_id})")]
    UnknownTier { type_id: u32, meta_group_id: u32 },
    #[error("type {type_id}: reaction race {race_id:?} has no background")]
    UnknownRace { type_id: u32, race_id: Option<u32> },
    #[error("type {type_id}: no icon source")]
    NoIconSource { type_id: u32 },
}

impl ClassifyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownTier { .. } => ErrorKind::UnknownTier,
            Self::UnknownRace { .. } => ErrorKind::UnknownRace,
            Self::NoIconSource { .. } => ErrorKind::MissingAsset,
        }
    }
}

/// Classify one item. See the [module docs](self) for the rules.
pub fn classify(
    item: &ItemMetadata,
    options: &ClassifyOptions,
) -> Result<Classification, ClassifyError> {
    let mut warnings = Vec::new();
    let skin = item.is_skin();

    let primary = if item.is_blueprint_copy {
        stamped(item, IconKind::BlueprintCopy, BPC_BACKGROUND, BPC_OVERLAY)?
    } else if item.is_blueprint {
        stamped(item, IconKind::Blueprint, BPO_BACKGROUND, BPO_OVERLAY)?
    } else if item.is_reaction {
        let background = reaction_background(item, options, &mut warnings)?;
        stamped(item, IconKind::Reaction, background, BPO_OVERLAY)?
    } else if item.category_id == RELIC_CATEGORY {
        stamped(item, IconKind::Relic, RELIC_BACKGROUND, RELIC_OVERLAY)?
    } else if skin {
        skin_recipe(item)?
    } else {
        plain_recipe(item)?
    };

    let render = if item.has_render_model {
        match item.graphic_id {
            Some(graphic_id) => Some(render_recipe(item, graphic_id, skin)?),
            None => {
                warnings.push(ClassifyWarning::RenderWithoutGraphic);
                None
            }
        }
    } else {
        None
    };

    Ok(Classification {
        primary,
        render,
        warnings,
    })
}

/// Badge texture for the item's tech tier, if it has one.
pub fn tech_badge(item: &ItemMetadata) -> Result<Option<AssetRef>, ClassifyError> {
    let meta_group_id = item.meta_group_id.unwrap_or(1);
    if meta_group_id == 1 {
        return Ok(None);
    }
    TECH_BADGES
        .iter()
        .find(|(id, _)| *id == meta_group_id)
        .map(|(_, path)| Some(AssetRef::resource(path)))
        .ok_or(ClassifyError::UnknownTier {
            type_id: item.type_id,
            meta_group_id,
        })
}

fn reaction_background(
    item: &ItemMetadata,
    options: &ClassifyOptions,
    warnings: &mut Vec<ClassifyWarning>,
) -> Result<&'static str, ClassifyError> {
    let known = item.race_id.and_then(|race| {
        REACTION_BACKGROUNDS
            .iter()
            .find(|(id, _)| *id == race)
            .map(|(_, path)| *path)
    });
    match (known, options.unknown_race) {
        (Some(path), _) => Ok(path),
        (None, UnknownRacePolicy::Fallback) => {
            warnings.push(ClassifyWarning::ReactionRaceFallback {
                race_id: item.race_id,
            });
            Ok(REACTION_DEFAULT_BACKGROUND)
        }
        (None, UnknownRacePolicy::Error) => Err(ClassifyError::UnknownRace {
            type_id: item.type_id,
            race_id: item.race_id,
        }),
    }
}

/// Pick the item's base icon. Plain icons prefer the model's graphic unless
/// the group is known to use its 2D icon instead.
fn icon_source(item: &ItemMetadata, prefer_graphic: bool) -> Result<AssetRef, ClassifyError> {
    let graphic = item.graphic_id.map(|graphic_id| AssetRef::Graphic {
        graphic_id,
        variant: GraphicVariant::Icon64,
    });
    let icon = item.icon_id.map(AssetRef::Icon);
    let graphic_allowed = !ICON_INSTEAD_OF_GRAPHIC_GROUPS.contains(&item.group_id);

    let choice = if prefer_graphic && graphic_allowed {
        graphic.or(icon)
    } else {
        icon.or(graphic)
    };
    choice.ok_or(ClassifyError::NoIconSource {
        type_id: item.type_id,
    })
}

fn stamped(
    item: &ItemMetadata,
    kind: IconKind,
    background: &str,
    overlay: &str,
) -> Result<CompositionRecipe, ClassifyError> {
    let mut layers = vec![
        Layer::full(AssetRef::resource(background), BlendMode::Over),
        Layer::full(icon_source(item, false)?, BlendMode::Over),
        Layer::full(AssetRef::resource(overlay), BlendMode::Additive),
    ];
    layers.extend(tech_badge(item)?.map(Layer::badge));
    Ok(CompositionRecipe {
        kind,
        layers,
        resolutions: vec![Resolution::Icon64],
    })
}

fn skin_recipe(item: &ItemMetadata) -> Result<CompositionRecipe, ClassifyError> {
    let source = match item.skin_material_id {
        Some(material) => AssetRef::Skin(material),
        None => icon_source(item, false)?,
    };
    Ok(CompositionRecipe {
        kind: IconKind::Icon,
        layers: vec![Layer::full(source, BlendMode::Over)],
        resolutions: vec![Resolution::Icon64],
    })
}

fn plain_recipe(item: &ItemMetadata) -> Result<CompositionRecipe, ClassifyError> {
    let mut layers = vec![Layer::full(icon_source(item, true)?, BlendMode::Over)];
    layers.extend(tech_badge(item)?.map(Layer::badge));
    Ok(CompositionRecipe {
        kind: IconKind::Icon,
        layers,
        resolutions: vec![Resolution::Icon64],
    })
}

fn render_recipe(
    item: &ItemMetadata,
    graphic_id: u32,
    skin: bool,
) -> Result<CompositionRecipe, ClassifyError> {
    let mut layers = vec![Layer::full(
        AssetRef::Graphic {
            graphic_id,
            variant: GraphicVariant::Render512,
        },
        BlendMode::Over,
    )];
    if !skin {
        layers.extend(tech_badge(item)?.map(Layer::badge));
    }
    Ok(CompositionRecipe {
        kind: IconKind::Render,
        layers,
        resolutions: vec![Resolution::Render512],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ItemBuilder;

    fn opts() -> ClassifyOptions {
        ClassifyOptions::default()
    }

    fn sources(recipe: &CompositionRecipe) -> Vec<String> {
        recipe.assets().map(|a| a.to_string()).collect()
    }

    #[test]
    fn blueprint_with_tier_two_badge() {
        let item = ItemBuilder::new(47107)
            .category(9)
            .meta_group(2)
            .icon(21)
            .blueprint()
            .build();

        let c = classify(&item, &opts()).unwrap();
        assert_eq!(c.kind(), IconKind::Blueprint);
        assert!(c.render.is_none());
        assert_eq!(c.primary.resolutions, vec![Resolution::Icon64]);
        assert_eq!(
            sources(&c.primary),
            vec![
                BPO_BACKGROUND,
                "icon:21",
                BPO_OVERLAY,
                "res:/ui/texture/icons/73_16_242.png",
            ]
        );
        let badge = c.primary.layers.last().unwrap();
        assert_eq!(badge.placement, Placement::BADGE);
        assert_eq!(c.primary.layers[2].blend, BlendMode::Additive);
    }

    #[test]
    fn blueprint_copy_wins_over_reaction() {
        let item = ItemBuilder::new(1)
            .icon(5)
            .blueprint_copy()
            .reaction(Some(4))
            .build();
        let c = classify(&item, &opts()).unwrap();
        assert_eq!(c.kind(), IconKind::BlueprintCopy);
        assert_eq!(sources(&c.primary)[0], BPC_BACKGROUND);
        assert_eq!(sources(&c.primary)[2], BPC_OVERLAY);
    }

    #[test]
    fn blueprint_copy_wins_over_blueprint() {
        let item = ItemBuilder::new(1).icon(5).blueprint().blueprint_copy().build();
        assert_eq!(
            classify(&item, &opts()).unwrap().kind(),
            IconKind::BlueprintCopy
        );
    }

    #[test]
    fn reaction_uses_race_background() {
        let item = ItemBuilder::new(99999).icon(5).reaction(Some(4)).build();
        let c = classify(&item, &opts()).unwrap();
        assert_eq!(c.kind(), IconKind::Reaction);
        assert_eq!(
            sources(&c.primary)[0],
            "res:/ui/texture/icons/reaction_amarr.png"
        );
        assert!(c.warnings.is_empty());
    }

    #[test]
    fn reaction_without_race_falls_back_with_warning() {
        let item = ItemBuilder::new(99999).icon(5).reaction(None).build();
        let c = classify(&item, &opts()).unwrap();
        assert_eq!(sources(&c.primary)[0], REACTION_DEFAULT_BACKGROUND);
        assert_eq!(
            c.warnings,
            vec![ClassifyWarning::ReactionRaceFallback { race_id: None }]
        );
    }

    #[test]
    fn reaction_unknown_race_errors_when_configured() {
        let item = ItemBuilder::new(99999).icon(5).reaction(Some(3)).build();
        let strict = ClassifyOptions {
            unknown_race: UnknownRacePolicy::Error,
        };
        let err = classify(&item, &strict).unwrap_err();
        assert_eq!(
            err,
            ClassifyError::UnknownRace {
                type_id: 99999,
                race_id: Some(3)
            }
        );
        assert_eq!(err.kind(), ErrorKind::UnknownRace);
    }

    #[test]
    fn relic_category_uses_relic_stack() {
        let item = ItemBuilder::new(30752).category(RELIC_CATEGORY).icon(9).build();
        let c = classify(&item, &opts()).unwrap();
        assert_eq!(c.kind(), IconKind::Relic);
        assert_eq!(
            sources(&c.primary),
            vec![RELIC_BACKGROUND, "icon:9", RELIC_OVERLAY]
        );
    }

    #[test]
    fn skin_uses_material_and_never_a_badge() {
        let item = ItemBuilder::new(42)
            .category(91)
            .skin_material(1337)
            .meta_group(999)
            .build();
        let c = classify(&item, &opts()).unwrap();
        assert_eq!(c.kind(), IconKind::Icon);
        assert_eq!(sources(&c.primary), vec!["skin:1337"]);
    }

    #[test]
    fn plain_icon_prefers_graphic() {
        let item = ItemBuilder::new(587).group(25).icon(3).graphic(46).build();
        let c = classify(&item, &opts()).unwrap();
        assert_eq!(sources(&c.primary), vec!["graphic:46/64"]);
    }

    #[test]
    fn icon_instead_of_graphic_groups_use_icon() {
        let item = ItemBuilder::new(587).group(12).icon(3).graphic(46).build();
        let c = classify(&item, &opts()).unwrap();
        assert_eq!(sources(&c.primary), vec!["icon:3"]);
    }

    #[test]
    fn render_model_adds_render_recipe() {
        let item = ItemBuilder::new(587).graphic(46).render_model().meta_group(2).build();
        let c = classify(&item, &opts()).unwrap();
        let render = c.render.as_ref().unwrap();
        assert_eq!(render.kind, IconKind::Render);
        assert_eq!(render.resolutions, vec![Resolution::Render512]);
        assert_eq!(render.layers[0].source.to_string(), "graphic:46/512");
        assert_eq!(render.layers.len(), 2);
        assert_eq!(c.recipes().count(), 2);
    }

    #[test]
    fn render_model_without_graphic_warns() {
        let item = ItemBuilder::new(587).icon(3).render_model().build();
        let c = classify(&item, &opts()).unwrap();
        assert!(c.render.is_none());
        assert_eq!(c.warnings, vec![ClassifyWarning::RenderWithoutGraphic]);
    }

    #[test]
    fn unknown_tier_is_an_error() {
        let item = ItemBuilder::new(7).icon(3).meta_group(7).build();
        let err = classify(&item, &opts()).unwrap_err();
        assert_eq!(
            err,
            ClassifyError::UnknownTier {
                type_id: 7,
                meta_group_id: 7
            }
        );
        assert_eq!(err.kind(), ErrorKind::UnknownTier);
    }

    #[test]
    fn tier_one_and_absent_have_no_badge() {
        let absent = ItemBuilder::new(7).icon(3).build();
        let tier_one = ItemBuilder::new(7).icon(3).meta_group(1).build();
        assert_eq!(tech_badge(&absent).unwrap(), None);
        assert_eq!(tech_badge(&tier_one).unwrap(), None);
        assert_eq!(classify(&tier_one, &opts()).unwrap().primary.layers.len(), 1);
    }

    #[test]
    fn no_source_is_reported() {
        let item = ItemBuilder::new(7).build();
        assert_eq!(
            classify(&item, &opts()).unwrap_err(),
            ClassifyError::NoIconSource { type_id: 7 }
        );
    }

    #[test]
    fn classification_is_deterministic() {
        let item = ItemBuilder::new(47107)
            .icon(21)
            .graphic(88)
            .render_model()
            .meta_group(5)
            .blueprint()
            .build();
        assert_eq!(
            classify(&item, &opts()).unwrap(),
            classify(&item, &opts()).unwrap()
        );
    }

    #[test]
    fn kind_serializes_to_short_names() {
        assert_eq!(
            serde_json::to_string(&IconKind::BlueprintCopy).unwrap(),
            "\"bpc\""
        );
        assert_eq!(serde_json::to_string(&Resolution::Render512).unwrap(), "\"512\"");
    }
}
