/// Shared helpers for synthetic search fixtures.
use exsearch::LeadfieldStore;
use ndarray::{Array1, Array2, Array3};

/// Store with unit node volumes, coords `x = node index`, and leadfield
/// entries from `field(electrode, node, component)`.
#[allow(unused)]
pub fn store_from_fn(
    names: &[&str],
    n_nodes: usize,
    field: impl Fn(usize, usize, usize) -> f32,
) -> LeadfieldStore {
    let fields = Array3::from_shape_fn((names.len(), n_nodes, 3), |(e, n, d)| field(e, n, d));
    let volumes = Array1::from_elem(n_nodes, 1.0);
    let coords =
        Array2::from_shape_fn((n_nodes, 3), |(n, d)| if d == 0 { n as f32 } else { 0.0 });
    LeadfieldStore::from_parts(
        names.iter().map(|s| s.to_string()).collect(),
        fields,
        volumes,
        coords,
    )
    .unwrap()
}

/// Constant per-electrode field along x: electrode `e` contributes
/// `0.1·(e+1)` V/m per mA at every node.  Channel fields are then collinear
/// and the TI envelope is easy to compute by hand.
#[allow(unused)]
pub fn collinear_store(names: &[&str], n_nodes: usize) -> LeadfieldStore {
    store_from_fn(names, n_nodes, |e, _n, d| {
        if d == 0 {
            0.1 * (e + 1) as f32
        } else {
            0.0
        }
    })
}
