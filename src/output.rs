//! CLI output formatting.
//!
//! Output is **item-centric**: each line leads with the type id, then what
//! happened to it. Fresh items are silent so a no-change rebuild of a large
//! catalog prints only progress and the summary.
//!
//! ```text
//! 587 icon: built 64
//! 587 render: built 512
//! 19722 FAILED (missing asset): missing asset icon:21567
//! 20 reaction: fallback background for unknown race 99
//! Progress: 500/11206
//!
//! 11206 cached, 2 built, 1 failed (11209 total)
//! Manifest: 22410 entries (+2, -0)
//!
//! Failures
//! missing asset (1)
//!     19722: missing asset icon:21567
//! ```
//!
//! Each section has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::bundle::{AuxSummary, WebDirSummary};
use crate::error::ErrorKind;
use crate::process::{BuildEvent, BuildOutcome, ItemFailure};
use std::collections::BTreeMap;

/// Indentation for context lines under a header.
const INDENT: &str = "    ";

// ============================================================================
// Build events
// ============================================================================

pub fn format_build_event(event: &BuildEvent) -> Vec<String> {
    match event {
        BuildEvent::Built {
            type_id,
            kind,
            resolutions,
        } => {
            let res: Vec<&str> = resolutions.iter().map(|r| r.as_str()).collect();
            vec![format!("{type_id} {kind}: built {}", res.join(", "))]
        }
        BuildEvent::Fresh { .. } => Vec::new(),
        BuildEvent::Failed(failure) => vec![format!(
            "{} FAILED ({}): {}",
            failure.type_id, failure.kind, failure.message
        )],
        BuildEvent::Warning { type_id, message } => vec![format!("{type_id} {message}")],
        BuildEvent::Progress { done, total } => vec![format!("Progress: {done}/{total}")],
    }
}

pub fn print_build_event(event: &BuildEvent) {
    for line in format_build_event(event) {
        println!("{}", line);
    }
}

// ============================================================================
// End-of-run report
// ============================================================================

pub fn format_summary(outcome: &BuildOutcome) -> Vec<String> {
    if outcome.no_op {
        return vec![format!(
            "Icon set unchanged, nothing to do ({} entries)",
            outcome.manifest.entries.len()
        )];
    }
    let mut lines = vec![
        String::new(),
        outcome.stats.to_string(),
        format!(
            "Manifest: {} entries (+{}, -{})",
            outcome.manifest.entries.len(),
            outcome.added,
            outcome.removed
        ),
    ];
    if outcome.warnings > 0 {
        lines.push(format!("Warnings: {}", outcome.warnings));
    }
    lines.extend(format_failures(&outcome.failures));
    lines
}

/// Failures grouped by kind, kinds in taxonomy order, items by type id.
pub fn format_failures(failures: &[ItemFailure]) -> Vec<String> {
    if failures.is_empty() {
        return Vec::new();
    }
    let mut by_kind: BTreeMap<ErrorKind, Vec<&ItemFailure>> = BTreeMap::new();
    for failure in failures {
        by_kind.entry(failure.kind).or_default().push(failure);
    }

    let mut lines = vec![String::new(), "Failures".to_string()];
    for (kind, group) in by_kind {
        lines.push(format!("{kind} ({})", group.len()));
        for failure in group {
            lines.push(format!("{INDENT}{}: {}", failure.type_id, failure.message));
        }
    }
    lines
}

pub fn print_summary(outcome: &BuildOutcome) {
    for line in format_summary(outcome) {
        println!("{}", line);
    }
}

// ============================================================================
// Bundles
// ============================================================================

pub fn format_web_summary(summary: &WebDirSummary) -> String {
    format!(
        "Web directory: {} placed, {} unchanged, {} removed",
        summary.placed, summary.unchanged, summary.removed
    )
}

pub fn format_aux_summary(summary: &AuxSummary) -> String {
    match summary.skipped {
        0 => format!("Dumped {} assets", summary.written),
        n => format!("Dumped {} assets ({n} skipped)", summary.written),
    }
}

// ============================================================================
// Run-level errors
// ============================================================================

/// One line for a failure that aborted the run, led by its kind when known.
pub fn format_run_error(kind: Option<ErrorKind>, error: &dyn std::error::Error) -> String {
    match kind {
        Some(kind) => format!("Error ({kind}): {error}"),
        None => format!("Error: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::BundleError;
    use crate::cache::{BuildManifest, CacheStats};
    use crate::classify::{IconKind, Resolution};
    use crate::process::BuildError;

    fn failure(type_id: u32, kind: ErrorKind, message: &str) -> ItemFailure {
        ItemFailure {
            type_id,
            kind,
            message: message.to_string(),
        }
    }

    fn outcome() -> BuildOutcome {
        BuildOutcome {
            manifest: BuildManifest::empty(),
            stats: CacheStats {
                hits: 3,
                misses: 2,
                failures: 0,
            },
            failures: Vec::new(),
            warnings: 0,
            no_op: false,
            added: 2,
            removed: 1,
        }
    }

    // =========================================================================
    // Events
    // =========================================================================

    #[test]
    fn built_event_lists_resolutions() {
        let lines = format_build_event(&BuildEvent::Built {
            type_id: 587,
            kind: IconKind::Render,
            resolutions: vec![Resolution::Render512],
        });
        assert_eq!(lines, vec!["587 render: built 512"]);
    }

    #[test]
    fn fresh_event_is_silent() {
        assert!(
            format_build_event(&BuildEvent::Fresh {
                type_id: 587,
                kind: IconKind::Icon,
            })
            .is_empty()
        );
    }

    #[test]
    fn failed_event_shows_kind() {
        let lines = format_build_event(&BuildEvent::Failed(failure(
            19722,
            ErrorKind::MissingAsset,
            "missing asset icon:21567",
        )));
        assert_eq!(
            lines,
            vec!["19722 FAILED (missing asset): missing asset icon:21567"]
        );
    }

    #[test]
    fn progress_event() {
        let lines = format_build_event(&BuildEvent::Progress {
            done: 500,
            total: 1200,
        });
        assert_eq!(lines, vec!["Progress: 500/1200"]);
    }

    // =========================================================================
    // Summary
    // =========================================================================

    #[test]
    fn summary_shows_stats_and_diff() {
        let lines = format_summary(&outcome());
        assert!(lines.contains(&"3 cached, 2 built (5 total)".to_string()));
        assert!(lines.contains(&"Manifest: 0 entries (+2, -1)".to_string()));
        assert!(!lines.iter().any(|l| l == "Failures"));
    }

    #[test]
    fn no_op_summary_is_one_line() {
        let mut o = outcome();
        o.no_op = true;
        assert_eq!(
            format_summary(&o),
            vec!["Icon set unchanged, nothing to do (0 entries)"]
        );
    }

    #[test]
    fn failures_grouped_by_kind() {
        let lines = format_failures(&[
            failure(5, ErrorKind::AssetDecodeFailure, "bad png"),
            failure(1, ErrorKind::MissingAsset, "gone"),
            failure(9, ErrorKind::MissingAsset, "also gone"),
        ]);
        assert_eq!(
            lines,
            vec![
                "",
                "Failures",
                "missing asset (2)",
                "    1: gone",
                "    9: also gone",
                "asset decode failure (1)",
                "    5: bad png",
            ]
        );
    }

    #[test]
    fn summary_includes_failures_and_warnings() {
        let mut o = outcome();
        o.warnings = 2;
        o.failures = vec![failure(1, ErrorKind::UnknownTier, "tier 9")];
        let lines = format_summary(&o);
        assert!(lines.contains(&"Warnings: 2".to_string()));
        assert!(lines.contains(&"unknown tier (1)".to_string()));
    }

    #[test]
    fn bundle_summaries() {
        assert_eq!(
            format_web_summary(&WebDirSummary {
                placed: 2,
                unchanged: 5,
                removed: 1
            }),
            "Web directory: 2 placed, 5 unchanged, 1 removed"
        );
        assert_eq!(
            format_aux_summary(&AuxSummary {
                written: 4,
                skipped: 0
            }),
            "Dumped 4 assets"
        );
        assert_eq!(
            format_aux_summary(&AuxSummary {
                written: 4,
                skipped: 1
            }),
            "Dumped 4 assets (1 skipped)"
        );
    }

    #[test]
    fn run_error_leads_with_kind() {
        let missing = BundleError::MissingBlob {
            type_id: 587,
            hash: "ab12".into(),
        };
        assert_eq!(
            format_run_error(Some(missing.kind()), &missing),
            "Error (missing asset): type 587: built image ab12 is missing from the blob store"
        );

        let io = BundleError::Io {
            path: "out/index.json".into(),
            source: std::io::Error::other("disk full"),
        };
        assert!(
            format_run_error(Some(io.kind()), &io).starts_with("Error (placement failure): ")
        );
    }

    #[test]
    fn run_error_without_kind() {
        let cancelled = BuildError::Cancelled;
        assert_eq!(cancelled.kind(), None);
        assert_eq!(
            format_run_error(cancelled.kind(), &cancelled),
            "Error: build cancelled"
        );
    }
}
