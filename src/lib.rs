//! # exsearch — leadfield-based exhaustive TI montage search
//!
//! `exsearch` scores every candidate electrode montage for temporal-
//! interference (TI) stimulation against a target brain region.  Given a
//! precomputed leadfield matrix (one field-per-unit-current vector per
//! electrode per mesh node, exported by a FEM pipeline such as SimNIBS), it
//! synthesizes the TI modulation field for each electrode quadruple and
//! current split, computes volume-weighted target statistics, and reports the
//! ranked table.
//!
//! ## Data flow
//!
//! ```text
//! leadfield.exsf ──► LeadfieldStore           (one blocking load, read-only after)
//!                        │ per combination
//!                        ├─ envelope::synthesize()   E = I·(L⁺−L⁻) ×2 → TI envelope
//!                        ├─ roi::roi_statistics()    weighted mean/max, percentiles,
//!                        │                           focality, focal volumes, peak
//!                        └─ search::Search           enumerate · isolate failures ·
//!                               │                    progress · rank
//!                               ▼
//!                        SearchReport (ranked table + failure list → CSV/JSON)
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use exsearch::{LeadfieldStore, Pools, RoiDefinition, SearchConfig};
//!
//! let store = LeadfieldStore::load("data/leadfield.exsf").unwrap();
//! let roi = RoiDefinition::load("data/roi_thalamus.exsf").unwrap();
//!
//! let cfg = SearchConfig {
//!     pools: Pools::new(
//!         &["E010", "E011", "E012"],
//!         &["E020", "E021"],
//!         &["E030", "E031"],
//!         &["E040"],
//!     ),
//!     ..SearchConfig::default()
//! };
//!
//! let report = exsearch::run_search(&store, roi, cfg).unwrap();
//! for r in report.top(5) {
//!     println!("{}  TImean_ROI = {:.4e}", r.montage, r.stats.roi_mean);
//! }
//! report.write_csv("exsearch_results.csv").unwrap();
//! ```
//!
//! ## Failure model
//!
//! Configuration problems (unknown electrode, mask/domain length mismatch,
//! invalid currents) fail before the scan starts.  A single combination's
//! scoring failure is caught, recorded with the montage identity, and the
//! scan continues — the report always states how many combinations were
//! attempted, how many succeeded, and why each failure failed.

pub mod config;
pub mod envelope;
pub mod error;
pub mod io;
pub mod leadfield;
pub mod montage;
pub mod roi;
pub mod search;

// ── Crate-root re-exports ─────────────────────────────────────────────────
//
// Everything a downstream user is likely to need is available directly as
// `exsearch::Foo` without having to know the internal module layout.

// config
pub use config::{Objective, SearchConfig};

// error
pub use error::{Result, SearchError};

// leadfield
pub use leadfield::{write_leadfield, LeadfieldStore};

// montage — ratio set + enumerator
pub use montage::{current_ratios, Combination, Combinations, CurrentRatio, Pools};

// roi — definitions, adapters, statistics
pub use roi::{
    load_normals, roi_statistics, weighted_percentile, Domain, FocalVolumes,
    MeshDomain, RoiDefinition, RoiStats, VoxelDomain,
};

// search — orchestrator + report
pub use search::{
    CancelToken, FailureRecord, MontageId, ResultRecord, Search, SearchReport,
    SearchStatus,
};

/// Run one **exhaustive montage search** to completion.
///
/// Validates the configuration against the loaded leadfield, scans the full
/// pool × ratio space, and returns the ranked report.  Equivalent to
/// [`Search::new`] followed by [`Search::run`]; construct the [`Search`]
/// yourself to supply a [`CancelToken`] or an explicit ratio set.
///
/// # Errors
///
/// Only configuration and resource errors: an electrode missing from the
/// leadfield, a mask that does not match the domain, invalid current
/// parameters, or an unreadable artifact.  Per-combination scoring failures
/// do not surface here — they are collected in
/// [`SearchReport::failures`].
pub fn run_search(
    store: &LeadfieldStore,
    roi: RoiDefinition,
    config: SearchConfig,
) -> Result<SearchReport> {
    Search::new(store, roi, config)?.run()
}
