//! Search configuration.
//!
//! [`SearchConfig`] holds every tunable parameter for one exhaustive montage
//! search.  All scalar knobs have defaults matching a standard 2 mA TI
//! protocol; the candidate pools have no meaningful default and must be
//! supplied by the caller.
use crate::error::Result;
use crate::montage::{current_ratios, CurrentRatio, Pools};

/// Ranking objective for the result table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Objective {
    /// Descending volume-weighted mean TI amplitude in the ROI (default).
    RoiMean,
    /// Descending peak TI amplitude in the ROI.
    RoiMax,
    /// Descending focality (ROI mean ÷ whole-domain mean).
    Focality,
}

impl std::str::FromStr for Objective {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s.to_ascii_lowercase().as_str() {
            "mean" | "roi-mean" => Ok(Objective::RoiMean),
            "max" | "roi-max" => Ok(Objective::RoiMax),
            "focality" => Ok(Objective::Focality),
            other => Err(format!(
                "unknown objective '{other}' (expected mean, max or focality)"
            )),
        }
    }
}

/// Configuration for one search run.
///
/// Construct with struct-update syntax over [`SearchConfig::default()`]:
///
/// ```
/// use exsearch::{Pools, SearchConfig};
///
/// let cfg = SearchConfig {
///     pools: Pools::new(&["E10", "E11"], &["E20"], &["E30"], &["E40"]),
///     channel_limit: 1.8,   // allow a more asymmetric split
///     ..SearchConfig::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// The four electrode candidate pools (E1+, E1−, E2+, E2−).
    ///
    /// Default: empty (validation rejects it — pools are caller input).
    pub pools: Pools,

    /// Total current across both channels, mA.
    ///
    /// Default: `2.0`.
    pub total_current: f64,

    /// Per-channel current ceiling, mA.  Must lie in
    /// `[total_current / 2, total_current)`.
    ///
    /// Default: `1.5`.
    pub channel_limit: f64,

    /// Step between successive channel-1 currents in the ratio set, mA.
    ///
    /// Default: `0.1`.
    pub current_step: f64,

    /// Ranking objective for the final table.
    ///
    /// Default: [`Objective::RoiMean`].
    pub objective: Objective,

    /// Number of top-ranked records the report highlights.
    ///
    /// Default: `10`.
    pub top_n: usize,

    /// Reject combinations that reuse one electrode across slots.
    ///
    /// Montages sharing an electrode between channels are physically
    /// realizable and scored by default; set this when the hardware cannot
    /// drive one electrode from two stimulator channels.
    ///
    /// Default: `false`.
    pub forbid_reuse: bool,

    /// Score combinations on a rayon worker pool.
    ///
    /// The ranked output is identical either way; sequential mode checks
    /// cancellation with per-combination granularity.
    ///
    /// Default: `true`.
    pub parallel: bool,

    /// Retain the full scalar TI field of the best-ranked combination in the
    /// report, for downstream mesh/voxel overlays.
    ///
    /// Default: `false` (the field is one f64 per node).
    pub keep_best_field: bool,
}

impl Default for SearchConfig {
    /// 2 mA total, 1.5 mA per-channel limit, 0.1 mA step, ranked by ROI
    /// mean, top 10.
    fn default() -> Self {
        Self {
            pools: Pools::new::<&str>(&[], &[], &[], &[]),
            total_current: 2.0,
            channel_limit: 1.5,
            current_step: 0.1,
            objective: Objective::RoiMean,
            top_n: 10,
            forbid_reuse: false,
            parallel: true,
            keep_best_field: false,
        }
    }
}

impl SearchConfig {
    /// Generate the current-ratio set from the three current parameters.
    pub fn ratios(&self) -> Result<Vec<CurrentRatio>> {
        current_ratios(self.total_current, self.channel_limit, self.current_step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ratio_set() {
        let cfg = SearchConfig::default();
        let ratios = cfg.ratios().unwrap();
        // i1 from 1.5 down to 0.5 in 0.1 steps
        assert_eq!(ratios.len(), 11);
    }

    #[test]
    fn objective_parsing() {
        assert_eq!("mean".parse::<Objective>().unwrap(), Objective::RoiMean);
        assert_eq!("MAX".parse::<Objective>().unwrap(), Objective::RoiMax);
        assert_eq!("focality".parse::<Objective>().unwrap(), Objective::Focality);
        assert!("median".parse::<Objective>().is_err());
    }
}
