//! Icon build pipeline.
//!
//! Metadata → classification → fingerprint → (cache gate) → composition →
//! record → finalize. Items are independent, so both the planning pass and the
//! build pass run on rayon's global pool.
//!
//! ## Stages
//!
//! 1. **Load** the provider once. Duplicate type ids keep their first record.
//! 2. **Select** observed items (minus SKINs when `skip_skins`, minus items
//!    with no icon source) and candidates (observed, narrowed by
//!    `single_item`).
//! 3. **Plan** each candidate in parallel: classify, then fingerprint every
//!    recipe. Fingerprinting fetches source bytes but never decodes them.
//! 4. **Short-circuit** when `skip_if_fresh` is set and the projected
//!    manifest signature equals the previous one: zero compositions.
//! 5. **Build** in parallel. Stale recipes are composed and recorded; a
//!    failing item is discarded from the manifest and reported.
//! 6. **Finalize**: prune unobserved items, persist atomically.
//!
//! Per-item failures never abort the run. Cancellation stops dispatching new
//! items and returns before the manifest is touched.
//!
//! ## Events
//!
//! Progress is reported through an optional `mpsc` channel so the CLI can
//! print from its own thread while workers keep going.

use crate::assets::AssetCache;
use crate::cache::{
    BuildManifest, CacheError, CacheManager, CacheStats, Fingerprint, recipe_fingerprint,
};
use crate::classify::{ClassifyOptions, CompositionRecipe, IconKind, Resolution, classify};
use crate::error::ErrorKind;
use crate::imaging::Compositor;
use crate::metadata::{ItemMetadata, MetadataError, MetadataProvider};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;
use thiserror::Error;

/// A progress event is emitted every this many processed items.
pub const PROGRESS_INTERVAL: usize = 500;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("metadata provider failed: {0}")]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("build cancelled")]
    Cancelled,
}

impl BuildError {
    /// Taxonomy kind, when the failure has one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Cache(e) => Some(e.kind()),
            Self::Metadata(_) | Self::Cancelled => None,
        }
    }
}

/// Run-level switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Ignore freshness and rebuild every candidate.
    pub force_rebuild: bool,
    /// No-op the whole run when the projected signature is unchanged.
    pub skip_if_fresh: bool,
    /// Treat SKIN items as absent (they are pruned from the manifest).
    pub skip_skins: bool,
    /// Restrict processing to one type id. Other items are left as they are.
    pub single_item: Option<u32>,
    pub classify: ClassifyOptions,
}

/// Cooperative cancellation flag, checked before each item is dispatched.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Cancel once `signal` resolves, watching it on a background thread
    /// with its own single-threaded runtime.
    ///
    /// A signal future that fails (no handler could be installed) leaves the
    /// token untouched.
    pub fn cancel_when<F>(&self, signal: F) -> io::Result<JoinHandle<()>>
    where
        F: Future<Output = io::Result<()>> + Send + 'static,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let token = self.clone();
        Ok(std::thread::spawn(move || match runtime.block_on(signal) {
            Ok(()) => {
                tracing::warn!("interrupted, finishing in-flight items");
                token.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "cannot watch for interrupts"),
        }))
    }
}

/// One item excluded from this run's manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub type_id: u32,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuildEvent {
    Built {
        type_id: u32,
        kind: IconKind,
        resolutions: Vec<Resolution>,
    },
    Fresh {
        type_id: u32,
        kind: IconKind,
    },
    Failed(ItemFailure),
    Warning {
        type_id: u32,
        message: String,
    },
    Progress {
        done: usize,
        total: usize,
    },
}

/// Result of a completed (or skipped) run.
#[derive(Debug)]
pub struct BuildOutcome {
    pub manifest: BuildManifest,
    pub stats: CacheStats,
    /// Sorted by type id.
    pub failures: Vec<ItemFailure>,
    pub warnings: usize,
    /// True when `skip_if_fresh` short-circuited the run.
    pub no_op: bool,
    /// Entries present now but not in the previous manifest.
    pub added: usize,
    /// Entries present in the previous manifest but not now.
    pub removed: usize,
}

struct Planned<'a> {
    item: &'a ItemMetadata,
    recipes: Vec<(CompositionRecipe, Fingerprint)>,
}

enum ItemResult {
    Done { built: u32, fresh: u32 },
    Failed(ItemFailure),
    Skipped,
}

fn emit(events: &Option<Sender<BuildEvent>>, event: BuildEvent) {
    if let Some(tx) = events {
        tx.send(event).ok();
    }
}

/// Run the pipeline against `icon_dir`.
pub fn build(
    provider: &mut dyn MetadataProvider,
    assets: &AssetCache,
    compositor: &impl Compositor,
    icon_dir: &Path,
    options: &RunOptions,
    cancel: &CancelToken,
    events: Option<Sender<BuildEvent>>,
) -> Result<BuildOutcome, BuildError> {
    let cache = CacheManager::open(icon_dir, options.force_rebuild)?;
    let items = provider.load()?;
    let mut warnings = 0;

    let mut seen = BTreeSet::new();
    let mut unique = Vec::with_capacity(items.len());
    for item in items {
        if seen.insert(item.type_id) {
            unique.push(item);
        } else {
            tracing::warn!(type_id = item.type_id, "duplicate type id, keeping first record");
            warnings += 1;
            emit(
                &events,
                BuildEvent::Warning {
                    type_id: item.type_id,
                    message: "duplicate type id, keeping first record".to_string(),
                },
            );
        }
    }

    let observed: BTreeSet<u32> = unique
        .iter()
        .filter(|item| !(options.skip_skins && item.is_skin()))
        .filter(|item| item.has_icon_source())
        .map(|item| item.type_id)
        .collect();
    let candidates: Vec<&ItemMetadata> = unique
        .iter()
        .filter(|item| observed.contains(&item.type_id))
        .filter(|item| options.single_item.is_none_or(|id| id == item.type_id))
        .collect();
    tracing::info!(
        items = unique.len(),
        candidates = candidates.len(),
        "classifying items"
    );

    // Plan: classify + fingerprint.
    let encoding = compositor.encoding_params();
    let plans: Vec<Option<Result<PlanOutput<'_>, ItemFailure>>> = candidates
        .par_iter()
        .map(|item| {
            if cancel.is_cancelled() {
                return None;
            }
            Some(plan_item(item, assets, &encoding, options, &events))
        })
        .collect();
    if cancel.is_cancelled() {
        return Err(BuildError::Cancelled);
    }

    let mut planned = Vec::with_capacity(plans.len());
    let mut failures = Vec::new();
    for plan in plans.into_iter().flatten() {
        match plan {
            Ok(p) => {
                warnings += p.warnings;
                planned.push(p.planned);
            }
            Err(failure) => {
                cache.discard(failure.type_id);
                emit(&events, BuildEvent::Failed(failure.clone()));
                failures.push(failure);
            }
        }
    }

    // A failing item must leave the manifest, so failures always force a run.
    if options.skip_if_fresh
        && !options.force_rebuild
        && failures.is_empty()
        && let Some(previous) = cache.previous()
    {
        let keys: Vec<(u32, IconKind, Fingerprint)> = planned
            .iter()
            .flat_map(|p| {
                p.recipes
                    .iter()
                    .map(|(recipe, fp)| (p.item.type_id, recipe.kind, fp.clone()))
            })
            .collect();
        if cache.projected_signature(&keys, &observed) == previous.signature {
            tracing::info!(signature = %previous.signature, "icon set unchanged, skipping run");
            failures.sort_by_key(|f| f.type_id);
            return Ok(BuildOutcome {
                manifest: previous.clone(),
                stats: CacheStats::default(),
                failures,
                warnings,
                no_op: true,
                added: 0,
                removed: 0,
            });
        }
    }

    // Build.
    let total = planned.len();
    let done = AtomicUsize::new(0);
    let results: Vec<ItemResult> = planned
        .par_iter()
        .map(|p| -> Result<ItemResult, CacheError> {
            if cancel.is_cancelled() {
                return Ok(ItemResult::Skipped);
            }
            let result = build_item(p, assets, compositor, &cache, &events)?;
            let n = done.fetch_add(1, Ordering::Relaxed) + 1;
            if n % PROGRESS_INTERVAL == 0 || n == total {
                emit(&events, BuildEvent::Progress { done: n, total });
            }
            Ok(result)
        })
        .collect::<Result<_, CacheError>>()?;
    if cancel.is_cancelled() {
        return Err(BuildError::Cancelled);
    }

    let mut stats = CacheStats::default();
    for result in results {
        match result {
            ItemResult::Done { built, fresh } => {
                stats.misses += built;
                stats.hits += fresh;
            }
            ItemResult::Failed(failure) => failures.push(failure),
            ItemResult::Skipped => {}
        }
    }
    stats.failures = failures.len() as u32;
    failures.sort_by_key(|f| f.type_id);

    let manifest = cache.finalize(&observed)?;
    let (added, removed) = diff_counts(cache.previous(), &manifest);
    tracing::info!(%stats, added, removed, "build finished");

    Ok(BuildOutcome {
        manifest,
        stats,
        failures,
        warnings,
        no_op: false,
        added,
        removed,
    })
}

struct PlanOutput<'a> {
    planned: Planned<'a>,
    warnings: usize,
}

fn plan_item<'a>(
    item: &'a ItemMetadata,
    assets: &AssetCache,
    encoding: &str,
    options: &RunOptions,
    events: &Option<Sender<BuildEvent>>,
) -> Result<PlanOutput<'a>, ItemFailure> {
    let type_id = item.type_id;
    let classification = classify(item, &options.classify).map_err(|e| ItemFailure {
        type_id,
        kind: e.kind(),
        message: e.to_string(),
    })?;

    for warning in &classification.warnings {
        tracing::warn!(type_id, "{warning}");
        emit(
            events,
            BuildEvent::Warning {
                type_id,
                message: warning.to_string(),
            },
        );
    }

    let mut recipes = Vec::new();
    for recipe in classification.recipes() {
        let fp = recipe_fingerprint(recipe, assets, encoding).map_err(|e| ItemFailure {
            type_id,
            kind: e.kind(),
            message: e.to_string(),
        })?;
        recipes.push((recipe.clone(), fp));
    }
    Ok(PlanOutput {
        planned: Planned { item, recipes },
        warnings: classification.warnings.len(),
    })
}

fn build_item(
    planned: &Planned<'_>,
    assets: &AssetCache,
    compositor: &impl Compositor,
    cache: &CacheManager,
    events: &Option<Sender<BuildEvent>>,
) -> Result<ItemResult, CacheError> {
    let type_id = planned.item.type_id;
    let (mut built, mut fresh) = (0, 0);

    for (recipe, fp) in &planned.recipes {
        if !cache.needs_build(type_id, recipe.kind, fp) {
            fresh += 1;
            emit(
                events,
                BuildEvent::Fresh {
                    type_id,
                    kind: recipe.kind,
                },
            );
            continue;
        }

        match compositor.compose(recipe, assets) {
            Ok(outputs) => {
                cache.record(type_id, recipe.kind, fp.clone(), &outputs)?;
                built += 1;
                emit(
                    events,
                    BuildEvent::Built {
                        type_id,
                        kind: recipe.kind,
                        resolutions: outputs.keys().copied().collect(),
                    },
                );
            }
            Err(e) => {
                tracing::debug!(type_id, kind = %recipe.kind, error = %e, "composition failed");
                cache.discard(type_id);
                let failure = ItemFailure {
                    type_id,
                    kind: e.kind(),
                    message: e.to_string(),
                };
                emit(events, BuildEvent::Failed(failure.clone()));
                return Ok(ItemResult::Failed(failure));
            }
        }
    }
    Ok(ItemResult::Done { built, fresh })
}

fn diff_counts(previous: Option<&BuildManifest>, current: &BuildManifest) -> (usize, usize) {
    let keys = |m: &BuildManifest| -> BTreeSet<(u32, IconKind)> {
        m.entries.iter().map(|e| (e.type_id, e.kind)).collect()
    };
    let before = previous.map(keys).unwrap_or_default();
    let after = keys(current);
    (
        after.difference(&before).count(),
        before.difference(&after).count(),
    )
}
