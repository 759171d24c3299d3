//! Region-of-interest definitions and volume-weighted field statistics.
//!
//! Statistics are computed from `(values, weights, mask)` only, so mesh node
//! data and voxel data go through the same code: the [`Domain`] trait exposes
//! per-node weights and coordinates, with one adapter for irregular meshes
//! (per-element volumes) and one for regular voxel grids (uniform volume).
//!
//! Weighting conventions:
//! * weighted mean = Σ(value·weight) / Σ(weight); for an ROI the effective
//!   weight is `mask · volume`, which reduces to plain volume weighting for
//!   boolean masks;
//! * max/min are unweighted extrema over ROI members;
//! * percentiles treat per-node volume as a density weight over the value
//!   distribution (midpoint-interpolated inverse CDF), not a naive
//!   percentile of raw values.
use crate::error::{Result, SearchError};
use crate::io::Artifact;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use std::path::Path;

/// A target (or avoidance) region: a weight mask over the field domain,
/// zero outside.
#[derive(Debug, Clone)]
pub struct RoiDefinition {
    weights: Array1<f32>,
}

impl RoiDefinition {
    pub fn from_mask(weights: Array1<f32>) -> Self {
        Self { weights }
    }

    /// Boolean membership list → unit-weight mask.
    pub fn from_members(n_nodes: usize, members: &[usize]) -> Self {
        let mut weights = Array1::zeros(n_nodes);
        for &m in members {
            weights[m] = 1.0;
        }
        Self { weights }
    }

    /// Load the `mask` tensor of an ROI artifact.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<RoiDefinition> {
        let art = Artifact::open(path)?;
        Ok(Self::from_mask(art.array1_f32("mask")?))
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn mask(&self) -> ArrayView1<'_, f32> {
        self.weights.view()
    }

    /// Fail `ShapeMismatch` unless the mask covers exactly `n_nodes` nodes.
    pub fn check_length(&self, n_nodes: usize) -> Result<()> {
        if self.len() != n_nodes {
            return Err(SearchError::ShapeMismatch {
                expected: n_nodes,
                got: self.len(),
            });
        }
        Ok(())
    }
}

/// Load the optional per-node surface normals of an ROI artifact, for the
/// directional TI metric ([`crate::envelope::ti_envelope_along`]).  Returns
/// `None` when the artifact carries no `normals` tensor.
pub fn load_normals<P: AsRef<Path>>(path: P) -> Result<Option<Array2<f32>>> {
    let art = Artifact::open(path)?;
    if art.has("normals") {
        Ok(Some(art.array2_f32("normals")?))
    } else {
        Ok(None)
    }
}

/// Capability interface ROI statistics depend on: per-node weights and
/// coordinates, nothing mesh- or voxel-specific.
pub trait Domain {
    /// Volume/area weight per node.
    fn weights(&self) -> ArrayView1<'_, f32>;
    /// Node centroid coordinates, `[n_nodes, 3]`.
    fn coords(&self) -> ArrayView2<'_, f32>;

    fn len(&self) -> usize {
        self.weights().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Irregular mesh: per-element volumes straight from the leadfield store.
pub struct MeshDomain<'a> {
    volumes: ArrayView1<'a, f32>,
    coords: ArrayView2<'a, f32>,
}

impl<'a> MeshDomain<'a> {
    pub fn new(volumes: ArrayView1<'a, f32>, coords: ArrayView2<'a, f32>) -> Self {
        Self { volumes, coords }
    }
}

impl Domain for MeshDomain<'_> {
    fn weights(&self) -> ArrayView1<'_, f32> {
        self.volumes.view()
    }

    fn coords(&self) -> ArrayView2<'_, f32> {
        self.coords.view()
    }
}

/// Regular voxel grid: every voxel shares one volume.
pub struct VoxelDomain {
    volumes: Array1<f32>,
    coords: Array2<f32>,
}

impl VoxelDomain {
    pub fn new(voxel_volume: f32, coords: Array2<f32>) -> Self {
        let volumes = Array1::from_elem(coords.nrows(), voxel_volume);
        Self { volumes, coords }
    }
}

impl Domain for VoxelDomain {
    fn weights(&self) -> ArrayView1<'_, f32> {
        self.volumes.view()
    }

    fn coords(&self) -> ArrayView2<'_, f32> {
        self.coords.view()
    }
}

/// Node volume above fractions of the 99.9th percentile — the spread side of
/// focality: how much tissue sits near the peak of the distribution.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct FocalVolumes {
    /// Volume with value ≥ 50 % of P99.9.
    pub above_50: f64,
    /// Volume with value ≥ 75 % of P99.9.
    pub above_75: f64,
    /// Volume with value ≥ 90 % of P99.9.
    pub above_90: f64,
    /// Volume with value ≥ 95 % of P99.9.
    pub above_95: f64,
}

/// Volume-weighted statistics of one scalar field against one ROI.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RoiStats {
    /// Volume-weighted mean over ROI members.
    pub roi_mean: f64,
    /// Unweighted maximum over ROI members.
    pub roi_max: f64,
    /// Unweighted minimum over ROI members.
    pub roi_min: f64,
    /// Σ(mask·volume) over ROI members.
    pub roi_volume: f64,
    /// Volume-weighted mean over the reference region (whole domain unless an
    /// explicit non-ROI mask is supplied).
    pub reference_mean: f64,
    /// `roi_mean / reference_mean`.
    pub focality: f64,
    /// Weighted 95th percentile of the whole-domain distribution.
    pub p95: f64,
    /// Weighted 99th percentile.
    pub p99: f64,
    /// Weighted 99.9th percentile.
    pub p999: f64,
    pub focal_volumes: FocalVolumes,
    /// Coordinates of the maximum-value ROI node.
    pub peak: [f64; 3],
}

/// Weighted percentile of `values` with `weights` as repeat-count density,
/// `q` in percent.
///
/// Midpoint-interpolated inverse CDF: the i-th sorted value sits at
/// cumulative position `(cum_i − w_i/2) / W`.  With uniform weights this
/// reproduces the classic linear-interpolation median.
///
/// # Errors
///
/// `DegenerateRegion` when no positive weight remains.
pub fn weighted_percentile(values: &[f64], weights: &[f64], q: f64) -> Result<f64> {
    debug_assert_eq!(values.len(), weights.len());
    let mut order: Vec<usize> = (0..values.len()).filter(|&i| weights[i] > 0.0).collect();
    if order.is_empty() {
        return Err(SearchError::DegenerateRegion);
    }
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let total: f64 = order.iter().map(|&i| weights[i]).sum();
    let target = q / 100.0 * total;

    let mut cum = 0.0;
    let mut prev_mid = f64::NAN;
    let mut prev_val = f64::NAN;
    for (k, &i) in order.iter().enumerate() {
        let w = weights[i];
        let mid = cum + w / 2.0;
        if target <= mid {
            if k == 0 {
                return Ok(values[i]);
            }
            let t = (target - prev_mid) / (mid - prev_mid);
            return Ok(prev_val + t * (values[i] - prev_val));
        }
        cum += w;
        prev_mid = mid;
        prev_val = values[i];
    }
    Ok(prev_val)
}

/// Compute [`RoiStats`] for `values` over `domain`, restricted to `roi`,
/// against `reference` (an explicit non-ROI mask) or the whole domain.
///
/// # Errors
///
/// * `ShapeMismatch` — array lengths disagree (programming error).
/// * `EmptyRoi` — the mask intersects no node with positive weight; one
///   combination's scoring fails, not the batch.
/// * `DegenerateRegion` — the reference weighted mean is zero, which would
///   make focality `inf`/`NaN`.
pub fn roi_statistics<D: Domain>(
    values: &Array1<f64>,
    domain: &D,
    roi: &RoiDefinition,
    reference: Option<&RoiDefinition>,
) -> Result<RoiStats> {
    let n = values.len();
    if domain.len() != n {
        return Err(SearchError::ShapeMismatch { expected: n, got: domain.len() });
    }
    roi.check_length(n)?;
    if let Some(r) = reference {
        r.check_length(n)?;
    }

    let vols = domain.weights();
    let mask = roi.mask();

    // ROI accumulation
    let mut roi_wsum = 0.0_f64;
    let mut roi_vsum = 0.0_f64;
    let mut roi_max = f64::NEG_INFINITY;
    let mut roi_min = f64::INFINITY;
    let mut peak_node = None;
    for i in 0..n {
        let m = mask[i] as f64;
        if m <= 0.0 {
            continue;
        }
        let w = m * vols[i] as f64;
        let v = values[i];
        roi_wsum += w;
        roi_vsum += v * w;
        if v > roi_max {
            roi_max = v;
            peak_node = Some(i);
        }
        if v < roi_min {
            roi_min = v;
        }
    }
    let peak_node = peak_node.ok_or(SearchError::EmptyRoi)?;
    if roi_wsum <= 0.0 {
        return Err(SearchError::EmptyRoi);
    }
    let roi_mean = roi_vsum / roi_wsum;

    // reference accumulation: explicit mask, or every node
    let (mut ref_wsum, mut ref_vsum) = (0.0_f64, 0.0_f64);
    for i in 0..n {
        let w = match reference {
            Some(r) => r.mask()[i] as f64 * vols[i] as f64,
            None => vols[i] as f64,
        };
        if w > 0.0 {
            ref_wsum += w;
            ref_vsum += values[i] * w;
        }
    }
    if ref_wsum <= 0.0 {
        return Err(SearchError::DegenerateRegion);
    }
    let reference_mean = ref_vsum / ref_wsum;
    if reference_mean == 0.0 {
        return Err(SearchError::DegenerateRegion);
    }
    let focality = roi_mean / reference_mean;

    // whole-domain weighted percentiles
    let vals: Vec<f64> = values.to_vec();
    let ws: Vec<f64> = vols.iter().map(|&w| w as f64).collect();
    let p95 = weighted_percentile(&vals, &ws, 95.0)?;
    let p99 = weighted_percentile(&vals, &ws, 99.0)?;
    let p999 = weighted_percentile(&vals, &ws, 99.9)?;

    let volume_above = |thresh: f64| -> f64 {
        (0..n)
            .filter(|&i| values[i] >= thresh)
            .map(|i| vols[i] as f64)
            .sum()
    };
    let focal_volumes = FocalVolumes {
        above_50: volume_above(0.50 * p999),
        above_75: volume_above(0.75 * p999),
        above_90: volume_above(0.90 * p999),
        above_95: volume_above(0.95 * p999),
    };

    let coords = domain.coords();
    let peak = [
        coords[[peak_node, 0]] as f64,
        coords[[peak_node, 1]] as f64,
        coords[[peak_node, 2]] as f64,
    ];

    Ok(RoiStats {
        roi_mean,
        roi_max,
        roi_min,
        roi_volume: roi_wsum,
        reference_mean,
        focality,
        p95,
        p99,
        p999,
        focal_volumes,
        peak,
    })
}
