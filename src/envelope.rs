//! TI field synthesis: channel fields and the modulation-amplitude envelope.
//!
//! Each channel is a bipolar electrode pair carrying ± current, so by linear
//! superposition its field is `E = I · (L⁺ − L⁻)` with `L` the leadfield rows.
//! Two channel fields at slightly different carrier frequencies produce a
//! low-frequency envelope whose amplitude per node follows Grossman et al.
//! 2017 (supplementary eq. 2), with `|E1| ≥ |E2|` ordered per node:
//!
//! ```text
//! TI = 2|E2|                      if |E2| ≤ |E1|·cos θ   (⇔ E1·E2 ≥ |E2|²)
//! TI = 2|E1×E2| / |E1−E2|         otherwise
//! ```
//!
//! The branch condition is exact — the envelope is NOT simply
//! `2·min(|E1|,|E2|)`; for non-collinear fields the angle test decides which
//! regime applies.  Nodes where `E1 == E2` take the limiting value `2|E1|`.
use crate::error::{Result, SearchError};
use crate::leadfield::LeadfieldStore;
use crate::montage::CurrentRatio;
use ndarray::{Array1, Array2, ArrayView2};

#[inline]
fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
fn cross_norm2(a: [f64; 3], b: [f64; 3]) -> f64 {
    let c = [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ];
    dot(c, c)
}

/// Envelope amplitude for one node.
#[inline]
fn envelope_at(a: [f64; 3], b: [f64; 3]) -> f64 {
    // order so that a is the stronger field
    let (a, b) = if dot(b, b) > dot(a, a) { (b, a) } else { (a, b) };
    let nb2 = dot(b, b);
    if dot(a, b) >= nb2 {
        return 2.0 * nb2.sqrt();
    }
    let d = [a[0] - b[0], a[1] - b[1], a[2] - b[2]];
    let dn2 = dot(d, d);
    if dn2 <= 1e-30 {
        // E1 == E2 up to rounding
        return 2.0 * dot(a, a).sqrt();
    }
    2.0 * (cross_norm2(a, b) / dn2).sqrt()
}

fn check_shapes(e1: ArrayView2<'_, f64>, e2: ArrayView2<'_, f64>) -> Result<()> {
    if e1.dim() != e2.dim() {
        return Err(SearchError::ShapeMismatch {
            expected: e1.nrows(),
            got: e2.nrows(),
        });
    }
    Ok(())
}

/// High-frequency field of one channel: `E = I · (L⁺ − L⁻)`, `[n_nodes, 3]`.
///
/// # Errors
///
/// `ShapeMismatch` if the two leadfield views disagree on node count — a
/// programming error, since rows of one store always share their shape.
pub fn channel_field(
    pos: ArrayView2<'_, f32>,
    neg: ArrayView2<'_, f32>,
    current: f64,
) -> Result<Array2<f64>> {
    if pos.dim() != neg.dim() {
        return Err(SearchError::ShapeMismatch {
            expected: pos.nrows(),
            got: neg.nrows(),
        });
    }
    let mut out = Array2::<f64>::zeros(pos.dim());
    ndarray::Zip::from(&mut out)
        .and(&pos)
        .and(&neg)
        .for_each(|o, &p, &n| *o = current * (p as f64 - n as f64));
    Ok(out)
}

/// TI modulation amplitude per node, `[n_nodes]`.
pub fn ti_envelope(e1: &Array2<f64>, e2: &Array2<f64>) -> Result<Array1<f64>> {
    check_shapes(e1.view(), e2.view())?;
    let n = e1.nrows();
    let mut out = Array1::<f64>::zeros(n);
    for i in 0..n {
        let a = [e1[[i, 0]], e1[[i, 1]], e1[[i, 2]]];
        let b = [e2[[i, 0]], e2[[i, 1]], e2[[i, 2]]];
        out[i] = envelope_at(a, b);
    }
    Ok(out)
}

/// Directional TI amplitude along per-node unit normals, `[n_nodes]`.
///
/// The envelope of two sinusoids projected on a fixed axis is
/// `2·min(|E1·n̂|, |E2·n̂|)` — used for the `TI_normal` metric on cortical
/// surfaces, where the caller supplies outward normals.
pub fn ti_envelope_along(
    e1: &Array2<f64>,
    e2: &Array2<f64>,
    normals: ArrayView2<'_, f32>,
) -> Result<Array1<f64>> {
    check_shapes(e1.view(), e2.view())?;
    if normals.dim() != e1.dim() {
        return Err(SearchError::ShapeMismatch {
            expected: e1.nrows(),
            got: normals.nrows(),
        });
    }
    let n = e1.nrows();
    let mut out = Array1::<f64>::zeros(n);
    for i in 0..n {
        let nv = [
            normals[[i, 0]] as f64,
            normals[[i, 1]] as f64,
            normals[[i, 2]] as f64,
        ];
        let p1 = dot([e1[[i, 0]], e1[[i, 1]], e1[[i, 2]]], nv).abs();
        let p2 = dot([e2[[i, 0]], e2[[i, 1]], e2[[i, 2]]], nv).abs();
        out[i] = 2.0 * p1.min(p2);
    }
    Ok(out)
}

/// Synthesize the TI field of one montage straight from the store.
///
/// Resolves four leadfield rows by index, forms both channel fields with the
/// ratio's currents, and returns the envelope — the per-combination hot path
/// of the search loop.
pub fn synthesize(
    store: &LeadfieldStore,
    e1_plus: usize,
    e1_minus: usize,
    e2_plus: usize,
    e2_minus: usize,
    ratio: CurrentRatio,
) -> Result<Array1<f64>> {
    let e1 = channel_field(store.field_at(e1_plus), store.field_at(e1_minus), ratio.i1)?;
    let e2 = channel_field(store.field_at(e2_plus), store.field_at(e2_minus), ratio.i2)?;
    ti_envelope(&e1, &e2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr2, Array2};

    #[test]
    fn equal_fields_give_twice_magnitude() {
        let e = arr2(&[[1.0, 2.0, 2.0], [0.0, 3.0, 4.0], [0.1, 0.0, 0.0]]);
        let ti = ti_envelope(&e, &e.clone()).unwrap();
        assert_abs_diff_eq!(ti[0], 6.0, epsilon = 1e-12); // |(1,2,2)| = 3
        assert_abs_diff_eq!(ti[1], 10.0, epsilon = 1e-12); // |(0,3,4)| = 5
        assert_abs_diff_eq!(ti[2], 0.2, epsilon = 1e-12);
    }

    #[test]
    fn collinear_fields_envelope_is_twice_smaller() {
        // same direction, |E2| < |E1|: cos θ = 1 → first branch
        let e1 = arr2(&[[3.0, 0.0, 0.0]]);
        let e2 = arr2(&[[1.0, 0.0, 0.0]]);
        let ti = ti_envelope(&e1, &e2).unwrap();
        assert_abs_diff_eq!(ti[0], 2.0, epsilon = 1e-12);
        // argument order must not matter
        let ti = ti_envelope(&e2, &e1).unwrap();
        assert_abs_diff_eq!(ti[0], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn orthogonal_fields_use_cross_branch() {
        // a=(1,0,0), b=(0,1,0): E1·E2 = 0 < |E2|² → 2|a×b|/|a−b| = 2/√2
        let e1 = arr2(&[[1.0, 0.0, 0.0]]);
        let e2 = arr2(&[[0.0, 1.0, 0.0]]);
        let ti = ti_envelope(&e1, &e2).unwrap();
        assert_abs_diff_eq!(ti[0], 2.0 / 2.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn angle_test_is_not_min_of_magnitudes() {
        // |E1| = 2, |E2| = 1, θ = 80°: |E1|cosθ ≈ 0.347 < |E2| → cross branch,
        // which is strictly below 2·min(|E1|,|E2|) = 2.
        let th = 80.0_f64.to_radians();
        let e1 = arr2(&[[2.0, 0.0, 0.0]]);
        let e2 = arr2(&[[th.cos(), th.sin(), 0.0]]);
        let ti = ti_envelope(&e1, &e2).unwrap();
        let expected = {
            let cross = 2.0 * th.sin(); // |a×b|
            let d = ((2.0 - th.cos()).powi(2) + th.sin().powi(2)).sqrt();
            2.0 * cross / d
        };
        assert_abs_diff_eq!(ti[0], expected, epsilon = 1e-12);
        assert!(ti[0] < 2.0);
    }

    #[test]
    fn anti_parallel_fields_cancel() {
        // opposite directions: cross = 0 → envelope 0
        let e1 = arr2(&[[1.0, 0.0, 0.0]]);
        let e2 = arr2(&[[-0.5, 0.0, 0.0]]);
        let ti = ti_envelope(&e1, &e2).unwrap();
        assert_abs_diff_eq!(ti[0], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn channel_field_scales_difference() {
        let pos = arr2(&[[1.0_f32, 0.0, 0.0], [0.0, 2.0, 0.0]]);
        let neg = arr2(&[[0.0_f32, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        let e = channel_field(pos.view(), neg.view(), 1.5).unwrap();
        assert_abs_diff_eq!(e[[0, 0]], 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(e[[1, 1]], 1.5, epsilon = 1e-12);
    }

    #[test]
    fn mismatched_lengths_fail_fast() {
        let e1 = Array2::<f64>::zeros((4, 3));
        let e2 = Array2::<f64>::zeros((5, 3));
        assert!(matches!(
            ti_envelope(&e1, &e2),
            Err(SearchError::ShapeMismatch { expected: 4, got: 5 })
        ));
    }

    #[test]
    fn directional_envelope_projects_on_normals() {
        let e1 = arr2(&[[1.0, 1.0, 0.0]]);
        let e2 = arr2(&[[2.0, -0.5, 0.0]]);
        let normals = arr2(&[[1.0_f32, 0.0, 0.0]]);
        let ti = ti_envelope_along(&e1, &e2, normals.view()).unwrap();
        // projections 1.0 and 2.0 → 2·min = 2.0
        assert_abs_diff_eq!(ti[0], 2.0, epsilon = 1e-12);
    }
}
