//! Search orchestrator: drives the exhaustive scan over the montage space.
//!
//! Run lifecycle: `INITIALIZED → RUNNING → (COMPLETED | ABORTED)`.
//! [`Search::new`] performs every configuration check (pools resolve against
//! the leadfield, ratio parameters are consistent, the ROI mask matches the
//! domain) so that nothing fatal can surface mid-scan; the loop itself treats
//! each combination as an isolated unit of work whose failure is recorded and
//! stepped over, never propagated.
//!
//! Workers only *produce* `Scored` variants; the orchestrator thread is the
//! single writer that appends to the result and failure lists, so sequential
//! and rayon execution share one aggregation discipline and return identical
//! reports.
use crate::config::{Objective, SearchConfig};
use crate::envelope;
use crate::error::{Result, SearchError};
use crate::leadfield::LeadfieldStore;
use crate::montage::{Combination, Combinations, CurrentRatio};
use crate::roi::{roi_statistics, MeshDomain, RoiDefinition, RoiStats};
use ndarray::Array1;
use rayon::prelude::*;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Combinations scored per rayon dispatch.  Also the cancellation
/// granularity of the parallel path — the token is checked between chunks,
/// never mid-combination.
const CHUNK: usize = 256;

/// Cooperative cancellation flag, checked between combinations (sequential)
/// or between chunks (parallel) — never mid-combination, so completed scores
/// are always retained.
///
/// Clone freely; all clones share one flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<TokenState>,
}

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    polls: AtomicU64,
    poll_budget: Option<u64>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that trips after `n` cancellation checks: with sequential
    /// execution that is exactly `n` scored combinations.  Used to bound
    /// partial scans and smoke runs at combination granularity.
    pub fn after_polls(n: u64) -> Self {
        Self {
            inner: Arc::new(TokenState {
                cancelled: AtomicBool::new(false),
                polls: AtomicU64::new(0),
                poll_budget: Some(n),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Ordering::Relaxed) {
            return true;
        }
        match self.inner.poll_budget {
            Some(budget) => self.inner.polls.fetch_add(1, Ordering::Relaxed) >= budget,
            None => false,
        }
    }
}

/// Resolved identity of one scored montage, in electrode names.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MontageId {
    pub index: u64,
    pub e1_plus: String,
    pub e1_minus: String,
    pub e2_plus: String,
    pub e2_minus: String,
    pub ratio: CurrentRatio,
}

impl std::fmt::Display for MontageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {}→{} / {}→{} @ {:.2}:{:.2} mA",
            self.index,
            self.e1_plus,
            self.e1_minus,
            self.e2_plus,
            self.e2_minus,
            self.ratio.i1,
            self.ratio.i2
        )
    }
}

/// One successfully scored combination.  Immutable once created.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ResultRecord {
    pub montage: MontageId,
    pub stats: RoiStats,
}

impl ResultRecord {
    /// The value this record is ranked by under `objective`.
    pub fn objective_value(&self, objective: Objective) -> f64 {
        match objective {
            Objective::RoiMean => self.stats.roi_mean,
            Objective::RoiMax => self.stats.roi_max,
            Objective::Focality => self.stats.focality,
        }
    }
}

/// One combination whose scoring failed; kept out of the ranking but always
/// reported.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FailureRecord {
    pub montage: MontageId,
    pub reason: String,
}

/// Success/failure variant returned by each scoring worker.
enum Scored {
    Ok(Box<ResultRecord>),
    Failed(FailureRecord),
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum SearchStatus {
    /// Every combination was processed.
    Completed,
    /// The caller cancelled; partial results are retained.
    Aborted,
}

/// Outcome of one search run: counts, ranked records, and every failure —
/// silent partial failure is forbidden.
pub struct SearchReport {
    pub status: SearchStatus,
    pub objective: Objective,
    /// Size of the full combination space.
    pub total: u64,
    /// Combinations actually scored (excludes reuse-filtered ones).
    pub attempted: u64,
    /// Combinations filtered out by `forbid_reuse`.
    pub skipped: u64,
    /// Ranked best-first by the objective; ties broken by enumeration index.
    pub records: Vec<ResultRecord>,
    pub failures: Vec<FailureRecord>,
    pub elapsed: Duration,
    /// TI field of the top-ranked montage, when the config asked to keep it.
    pub best_field: Option<Array1<f64>>,
}

impl SearchReport {
    pub fn succeeded(&self) -> u64 {
        self.records.len() as u64
    }

    /// The `n` best records (fewer if the run produced fewer).
    pub fn top(&self, n: usize) -> &[ResultRecord] {
        &self.records[..n.min(self.records.len())]
    }

    /// Write the full ranked table as CSV.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut f = std::fs::File::create(path)?;
        writeln!(
            f,
            "rank,index,e1_plus,e1_minus,e2_plus,e2_minus,i1_ma,i2_ma,\
             ti_mean_roi,ti_max_roi,ti_min_roi,roi_volume,ti_mean_ref,focality,\
             p95,p99,p999,vol_above_50,vol_above_75,vol_above_90,vol_above_95,\
             peak_x,peak_y,peak_z"
        )?;
        for (rank, r) in self.records.iter().enumerate() {
            let m = &r.montage;
            let s = &r.stats;
            writeln!(
                f,
                "{},{},{},{},{},{},{:.4},{:.4},\
                 {:.6e},{:.6e},{:.6e},{:.6e},{:.6e},{:.6},\
                 {:.6e},{:.6e},{:.6e},{:.6e},{:.6e},{:.6e},{:.6e},\
                 {:.3},{:.3},{:.3}",
                rank + 1,
                m.index,
                m.e1_plus,
                m.e1_minus,
                m.e2_plus,
                m.e2_minus,
                m.ratio.i1,
                m.ratio.i2,
                s.roi_mean,
                s.roi_max,
                s.roi_min,
                s.roi_volume,
                s.reference_mean,
                s.focality,
                s.p95,
                s.p99,
                s.p999,
                s.focal_volumes.above_50,
                s.focal_volumes.above_75,
                s.focal_volumes.above_90,
                s.focal_volumes.above_95,
                s.peak[0],
                s.peak[1],
                s.peak[2]
            )?;
        }
        Ok(())
    }

    /// Write the report (counts, ranked table, failure list) as JSON.
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let doc = serde_json::json!({
            "status": self.status,
            "objective": self.objective,
            "total": self.total,
            "attempted": self.attempted,
            "succeeded": self.succeeded(),
            "skipped": self.skipped,
            "elapsed_s": self.elapsed.as_secs_f64(),
            "records": self.records,
            "failures": self.failures,
        });
        let f = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(f, &doc)?;
        Ok(())
    }
}

/// Progress reporting at a fixed count cadence, so logging cost stays flat
/// regardless of search size.
struct ProgressMeter {
    started: Instant,
    total: u64,
    every: u64,
    last: u64,
}

impl ProgressMeter {
    fn new(total: u64) -> Self {
        Self {
            started: Instant::now(),
            total,
            every: (total / 20).max(1),
            last: 0,
        }
    }

    fn update(&mut self, processed: u64) {
        if processed < self.total && processed.saturating_sub(self.last) < self.every {
            return;
        }
        self.last = processed;
        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = processed as f64 / elapsed.max(1e-9);
        let eta = (self.total - processed) as f64 / rate.max(1e-9);
        log::info!(
            "scored {processed}/{} ({:.0}%) in {elapsed:.1} s — {rate:.0}/s, ETA {eta:.1} s",
            self.total,
            100.0 * processed as f64 / self.total as f64,
        );
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// A validated, ready-to-run search over one leadfield and one ROI.
pub struct Search<'a> {
    store: &'a LeadfieldStore,
    roi: RoiDefinition,
    config: SearchConfig,
    ratios: Vec<CurrentRatio>,
    /// Leadfield row per pool entry, one Vec per slot, resolved once.
    pool_rows: [Vec<usize>; 4],
}

impl<'a> Search<'a> {
    /// Validate configuration and transition to `INITIALIZED`.
    ///
    /// # Errors
    ///
    /// All fatal: `InvalidPool`, `InvalidCurrents`, `MissingElectrode` (a
    /// pool references an electrode the leadfield lacks), `ShapeMismatch`
    /// (ROI length vs. domain), `EmptyRoi` (mask selects nothing — the run
    /// never starts).
    pub fn new(
        store: &'a LeadfieldStore,
        roi: RoiDefinition,
        config: SearchConfig,
    ) -> Result<Search<'a>> {
        let ratios = config.ratios()?;
        Self::with_ratio_set(store, roi, config, ratios)
    }

    /// Like [`Search::new`] but with an explicit ratio set (resume tooling,
    /// protocols with hand-picked splits).
    pub fn with_ratio_set(
        store: &'a LeadfieldStore,
        roi: RoiDefinition,
        config: SearchConfig,
        ratios: Vec<CurrentRatio>,
    ) -> Result<Search<'a>> {
        config.pools.validate()?;
        if ratios.is_empty() {
            return Err(SearchError::InvalidCurrents("empty ratio set".into()));
        }
        for r in &ratios {
            let ok = r.i1 > 0.0
                && r.i2 > 0.0
                && r.i1 <= config.channel_limit + 1e-9
                && r.i2 <= config.channel_limit + 1e-9;
            if !ok {
                return Err(SearchError::InvalidCurrents(format!(
                    "ratio {:.3}/{:.3} violates the {:.3} mA channel limit",
                    r.i1, r.i2, config.channel_limit
                )));
            }
        }

        roi.check_length(store.domain_size())?;
        if roi.mask().iter().all(|&w| w <= 0.0) {
            return Err(SearchError::EmptyRoi);
        }

        let resolve = |pool: &[String]| -> Result<Vec<usize>> {
            pool.iter().map(|name| store.index_of(name)).collect()
        };
        let pool_rows = [
            resolve(&config.pools.e1_plus)?,
            resolve(&config.pools.e1_minus)?,
            resolve(&config.pools.e2_plus)?,
            resolve(&config.pools.e2_minus)?,
        ];

        let search = Search { store, roi, config, ratios, pool_rows };
        log::info!(
            "search initialized: {} combinations ({} ratios), domain {} nodes",
            search.total(),
            search.ratios.len(),
            store.domain_size()
        );
        Ok(search)
    }

    /// Size of the combination space, by pure arithmetic.
    pub fn total(&self) -> u64 {
        self.combinations().total()
    }

    fn combinations(&self) -> Combinations {
        Combinations::new(&self.config.pools, &self.ratios)
    }

    fn montage_id(&self, c: &Combination) -> MontageId {
        let p = &self.config.pools;
        MontageId {
            index: c.index,
            e1_plus: p.e1_plus[c.e1_plus].clone(),
            e1_minus: p.e1_minus[c.e1_minus].clone(),
            e2_plus: p.e2_plus[c.e2_plus].clone(),
            e2_minus: p.e2_minus[c.e2_minus].clone(),
            ratio: c.ratio,
        }
    }

    /// True when `forbid_reuse` excludes this combination.
    fn reuses_electrode(&self, c: &Combination) -> bool {
        let rows = [
            self.pool_rows[0][c.e1_plus],
            self.pool_rows[1][c.e1_minus],
            self.pool_rows[2][c.e2_plus],
            self.pool_rows[3][c.e2_minus],
        ];
        for i in 0..4 {
            for j in i + 1..4 {
                if rows[i] == rows[j] {
                    return true;
                }
            }
        }
        false
    }

    /// Synthesize and score one combination.
    ///
    /// Per-combination errors come back as `Scored::Failed`; anything else
    /// (a shape disagreement is a bug, not bad luck) propagates and aborts
    /// the run.
    fn score(&self, c: &Combination) -> Result<Scored> {
        let field = envelope::synthesize(
            self.store,
            self.pool_rows[0][c.e1_plus],
            self.pool_rows[1][c.e1_minus],
            self.pool_rows[2][c.e2_plus],
            self.pool_rows[3][c.e2_minus],
            c.ratio,
        )?;
        if field.iter().any(|v| !v.is_finite()) {
            return Ok(Scored::Failed(FailureRecord {
                montage: self.montage_id(c),
                reason: "non-finite value in synthesized field".into(),
            }));
        }

        let domain = MeshDomain::new(self.store.node_volumes(), self.store.node_coords());
        match roi_statistics(&field, &domain, &self.roi, None) {
            Ok(stats) => Ok(Scored::Ok(Box::new(ResultRecord {
                montage: self.montage_id(c),
                stats,
            }))),
            Err(e) if e.is_per_combination() => Ok(Scored::Failed(FailureRecord {
                montage: self.montage_id(c),
                reason: e.to_string(),
            })),
            Err(e) => Err(e),
        }
    }

    /// Run to completion (no external cancellation).
    pub fn run(&self) -> Result<SearchReport> {
        self.run_with_cancel(&CancelToken::new())
    }

    /// Run the scan, checking `token` between combinations.
    ///
    /// Cancellation is not an error: the report comes back `Aborted` with
    /// every record collected so far.
    pub fn run_with_cancel(&self, token: &CancelToken) -> Result<SearchReport> {
        let total = self.total();
        let mut progress = ProgressMeter::new(total);
        log::info!(
            "search running ({} mode)",
            if self.config.parallel { "parallel" } else { "sequential" }
        );

        let mut records: Vec<ResultRecord> = Vec::new();
        let mut failures: Vec<FailureRecord> = Vec::new();
        let mut attempted = 0u64;
        let mut skipped = 0u64;
        let mut processed = 0u64;
        let mut aborted = false;

        let mut combos = self.combinations();
        loop {
            if token.is_cancelled() {
                aborted = true;
                break;
            }

            // pull the next unit of work: one combination sequentially, one
            // chunk in parallel mode
            let batch: Vec<Combination> = if self.config.parallel {
                combos.by_ref().take(CHUNK).collect()
            } else {
                combos.by_ref().take(1).collect()
            };
            if batch.is_empty() {
                break;
            }

            let kept: Vec<&Combination> = batch
                .iter()
                .filter(|c| {
                    if self.config.forbid_reuse && self.reuses_electrode(c) {
                        skipped += 1;
                        false
                    } else {
                        true
                    }
                })
                .collect();

            let scored: Result<Vec<Scored>> = if self.config.parallel {
                kept.par_iter().map(|c| self.score(c)).collect()
            } else {
                kept.iter().map(|c| self.score(c)).collect()
            };

            // single-writer aggregation: workers produced, only this thread
            // appends
            for s in scored? {
                attempted += 1;
                match s {
                    Scored::Ok(r) => records.push(*r),
                    Scored::Failed(f) => {
                        log::warn!("combination failed: {} — {}", f.montage, f.reason);
                        failures.push(f);
                    }
                }
            }
            processed += batch.len() as u64;
            progress.update(processed);
        }

        self.rank(&mut records);
        let status = if aborted { SearchStatus::Aborted } else { SearchStatus::Completed };
        let elapsed = progress.elapsed();
        log::info!(
            "search {}: {}/{} scored, {} failed, {} skipped in {:.2} s",
            if aborted { "aborted" } else { "completed" },
            records.len(),
            total,
            failures.len(),
            skipped,
            elapsed.as_secs_f64()
        );

        let best_field = if self.config.keep_best_field {
            match records.first() {
                Some(best) => Some(self.field_for(&best.montage)?),
                None => None,
            }
        } else {
            None
        };

        Ok(SearchReport {
            status,
            objective: self.config.objective,
            total,
            attempted,
            skipped,
            records,
            failures,
            elapsed,
            best_field,
        })
    }

    /// Rank best-first by the objective; equal values fall back to
    /// enumeration order, so repeated runs produce one table.
    fn rank(&self, records: &mut [ResultRecord]) {
        let objective = self.config.objective;
        records.sort_by(|a, b| {
            b.objective_value(objective)
                .total_cmp(&a.objective_value(objective))
                .then(a.montage.index.cmp(&b.montage.index))
        });
    }

    /// Re-synthesize the TI field of an already-identified montage.
    pub fn field_for(&self, montage: &MontageId) -> Result<Array1<f64>> {
        envelope::synthesize(
            self.store,
            self.store.index_of(&montage.e1_plus)?,
            self.store.index_of(&montage.e1_minus)?,
            self.store.index_of(&montage.e2_plus)?,
            self.store.index_of(&montage.e2_minus)?,
            montage.ratio,
        )
    }
}
