mod common;
use approx::assert_abs_diff_eq;
use common::{collinear_store, store_from_fn};
use exsearch::envelope::{channel_field, synthesize, ti_envelope};
use exsearch::CurrentRatio;

#[test]
fn identical_channels_give_twice_field_magnitude() {
    // both channels use the same electrode pair and current, so E1 == E2
    // at every node and the envelope is the limiting case 2|E1|
    let store = store_from_fn(&["P", "M"], 12, |e, n, d| {
        let s = if e == 0 { 1.0 } else { -1.0 };
        s * (0.01 * (n + 1) as f32 + 0.003 * d as f32)
    });
    let e1 = channel_field(store.lookup("P").unwrap(), store.lookup("M").unwrap(), 1.0).unwrap();
    let e2 = e1.clone();
    let ti = ti_envelope(&e1, &e2).unwrap();
    for (i, &t) in ti.iter().enumerate() {
        let mag = (e1[[i, 0]].powi(2) + e1[[i, 1]].powi(2) + e1[[i, 2]].powi(2)).sqrt();
        assert_abs_diff_eq!(t, 2.0 * mag, epsilon = 1e-12);
    }
}

#[test]
fn synthesize_matches_manual_pipeline() {
    let store = store_from_fn(&["A", "B", "C", "D"], 9, |e, n, d| {
        ((e + 1) * (n + 2) + d) as f32 * 0.001
    });
    let ratio = CurrentRatio { i1: 1.3, i2: 0.7 };

    let by_steps = {
        let e1 = channel_field(store.lookup("A").unwrap(), store.lookup("B").unwrap(), 1.3)
            .unwrap();
        let e2 = channel_field(store.lookup("C").unwrap(), store.lookup("D").unwrap(), 0.7)
            .unwrap();
        ti_envelope(&e1, &e2).unwrap()
    };
    let fused = synthesize(&store, 0, 1, 2, 3, ratio).unwrap();
    for (a, b) in by_steps.iter().zip(fused.iter()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-15);
    }
}

#[test]
fn collinear_envelope_is_twice_the_weaker_channel() {
    // L_A..L_E = 0.1..0.5 along x; E1 = i1·(L_A−L_C) = −0.2·i1·x̂,
    // E2 = i2·(L_D−L_E) = −0.1·i2·x̂ — same direction, so the envelope is
    // 2·min(|E1|, |E2|)
    let store = collinear_store(&["A", "B", "C", "D", "E"], 5);
    let ratio = CurrentRatio { i1: 1.0, i2: 1.0 };
    let ti = synthesize(&store, 0, 2, 3, 4, ratio).unwrap();
    for &t in ti.iter() {
        assert_abs_diff_eq!(t, 0.2, epsilon = 1e-6);
    }

    // asymmetric split: |E1| = 0.2·1.5 = 0.3, |E2| = 0.1·0.5 = 0.05
    let ratio = CurrentRatio { i1: 1.5, i2: 0.5 };
    let ti = synthesize(&store, 0, 2, 3, 4, ratio).unwrap();
    for &t in ti.iter() {
        assert_abs_diff_eq!(t, 0.1, epsilon = 1e-6);
    }
}
