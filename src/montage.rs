//! Candidate pools, current ratios, and the exhaustive combination enumerator.
//!
//! A montage is one quadruple (E1+, E1−, E2+, E2−) of electrodes plus one
//! current split between the two channels.  The search space is the Cartesian
//! product of the four pools and the ratio set, enumerated lazily in mixed
//! radix so that:
//!
//!   * `total()` is pure arithmetic (`n1·n2·n3·n4·r`), never a materialized
//!     sequence — the space routinely reaches tens of thousands of tuples;
//!   * `at(index)` gives O(1) random access, so a run can resume from any
//!     enumeration index and progress/ETA reporting stays meaningful;
//!   * iteration order is fixed (pool order × pool order × … × ratio order)
//!     and identical across runs.
use crate::error::{Result, SearchError};

/// One current split across the two channels, in milliamperes.
///
/// Invariant (enforced by [`current_ratios`]): `i1 + i2 == total_current` and
/// `0 < i1, i2 <= channel_limit`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct CurrentRatio {
    /// Channel 1 current (mA).
    pub i1: f64,
    /// Channel 2 current (mA).
    pub i2: f64,
}

/// Generate the ratio set: `i1` stepped from `channel_limit` down to
/// `total_current − channel_limit` inclusive, `i2 = total_current − i1`.
///
/// The endpoints are reached exactly — the step count is computed once as an
/// integer and each `i1` is derived from it, rather than accumulating a float
/// step.
///
/// # Errors
///
/// `InvalidCurrents` unless `total_current > 0`, `current_step > 0` and
/// `total_current / 2 <= channel_limit < total_current` (the lower bound
/// keeps the descending range non-empty, the upper keeps `i2 > 0`).
pub fn current_ratios(
    total_current: f64,
    channel_limit: f64,
    current_step: f64,
) -> Result<Vec<CurrentRatio>> {
    if !(total_current > 0.0) {
        return Err(SearchError::InvalidCurrents(format!(
            "total_current must be positive, got {total_current}"
        )));
    }
    if !(current_step > 0.0) {
        return Err(SearchError::InvalidCurrents(format!(
            "current_step must be positive, got {current_step}"
        )));
    }
    if channel_limit >= total_current {
        return Err(SearchError::InvalidCurrents(format!(
            "channel_limit {channel_limit} must be below total_current {total_current} \
             (otherwise one channel would carry zero current)"
        )));
    }
    if channel_limit < total_current / 2.0 - 1e-12 {
        return Err(SearchError::InvalidCurrents(format!(
            "channel_limit {channel_limit} cannot split total_current {total_current} \
             across two channels"
        )));
    }

    // i1 runs over [total-limit, limit]; n_steps is exact at the endpoints
    // and truncates otherwise (the last in-range step).
    let span = channel_limit - (total_current - channel_limit);
    let n_steps = (span / current_step + 1e-9).floor() as usize;
    let ratios = (0..=n_steps)
        .map(|k| {
            let i1 = channel_limit - k as f64 * current_step;
            CurrentRatio { i1, i2: total_current - i1 }
        })
        .collect();
    Ok(ratios)
}

/// The four electrode candidate pools, one per channel polarity slot.
///
/// Order within each pool is preserved — it defines the enumeration order.
#[derive(Debug, Clone)]
pub struct Pools {
    pub e1_plus: Vec<String>,
    pub e1_minus: Vec<String>,
    pub e2_plus: Vec<String>,
    pub e2_minus: Vec<String>,
}

impl Pools {
    pub fn new<S: Into<String> + Clone>(
        e1_plus: &[S],
        e1_minus: &[S],
        e2_plus: &[S],
        e2_minus: &[S],
    ) -> Self {
        let own = |v: &[S]| v.iter().cloned().map(Into::into).collect();
        Self {
            e1_plus: own(e1_plus),
            e1_minus: own(e1_minus),
            e2_plus: own(e2_plus),
            e2_minus: own(e2_minus),
        }
    }

    /// Check every pool is non-empty and duplicate-free.
    pub fn validate(&self) -> Result<()> {
        for (slot, pool) in self.slots() {
            if pool.is_empty() {
                return Err(SearchError::InvalidPool {
                    slot,
                    reason: "pool is empty".into(),
                });
            }
            for (i, name) in pool.iter().enumerate() {
                if pool[..i].contains(name) {
                    return Err(SearchError::InvalidPool {
                        slot,
                        reason: format!("electrode '{name}' listed twice"),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn slots(&self) -> [(&'static str, &[String]); 4] {
        [
            ("E1+", &self.e1_plus),
            ("E1-", &self.e1_minus),
            ("E2+", &self.e2_plus),
            ("E2-", &self.e2_minus),
        ]
    }
}

/// One montage candidate: four pool positions plus a ratio, tagged with its
/// enumeration index.
///
/// The electrode fields are *indices into the pools* (not names, not
/// leadfield rows) — the orchestrator resolves both exactly once per pool at
/// initialization.  Transient: constructed, scored, and dropped within one
/// search pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Combination {
    pub index: u64,
    pub e1_plus: usize,
    pub e1_minus: usize,
    pub e2_plus: usize,
    pub e2_minus: usize,
    pub ratio: CurrentRatio,
}

/// Lazy enumerator over pools × ratios.
///
/// ```
/// use exsearch::montage::{current_ratios, Combinations, Pools};
///
/// let pools = Pools::new(&["A", "B"], &["C"], &["D"], &["E"]);
/// let ratios = current_ratios(2.0, 1.6, 0.6).unwrap(); // i1 ∈ {1.6, 1.0, 0.4}
/// let combos = Combinations::new(&pools, &ratios);
/// assert_eq!(combos.total(), 6);
/// assert_eq!(combos.clone().count(), 6);
/// ```
#[derive(Debug, Clone)]
pub struct Combinations {
    dims: [usize; 5],
    ratios: Vec<CurrentRatio>,
    next: u64,
    total: u64,
}

impl Combinations {
    pub fn new(pools: &Pools, ratios: &[CurrentRatio]) -> Self {
        let dims = [
            pools.e1_plus.len(),
            pools.e1_minus.len(),
            pools.e2_plus.len(),
            pools.e2_minus.len(),
            ratios.len(),
        ];
        let total = dims.iter().map(|&d| d as u64).product();
        Self { dims, ratios: ratios.to_vec(), next: 0, total }
    }

    /// Resume enumeration at `index` (clamped to the end of the space).
    pub fn starting_at(pools: &Pools, ratios: &[CurrentRatio], index: u64) -> Self {
        let mut c = Self::new(pools, ratios);
        c.next = index.min(c.total);
        c
    }

    /// Size of the search space, by pure arithmetic.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Decode an enumeration index into its combination.
    ///
    /// The ratio is the fastest-varying digit, E1+ the slowest, matching a
    /// nested loop over (E1+, E1−, E2+, E2−, ratio).
    pub fn at(&self, index: u64) -> Option<Combination> {
        if index >= self.total {
            return None;
        }
        let mut rem = index;
        let mut digits = [0usize; 5];
        for (d, &dim) in digits.iter_mut().zip(self.dims.iter()).rev() {
            *d = (rem % dim as u64) as usize;
            rem /= dim as u64;
        }
        Some(Combination {
            index,
            e1_plus: digits[0],
            e1_minus: digits[1],
            e2_plus: digits[2],
            e2_minus: digits[3],
            ratio: self.ratios[digits[4]],
        })
    }
}

impl Iterator for Combinations {
    type Item = Combination;

    fn next(&mut self) -> Option<Combination> {
        let c = self.at(self.next)?;
        self.next += 1;
        Some(c)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.total - self.next) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Combinations {}
