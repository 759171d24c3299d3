//! Leadfield store: the per-electrode field-per-unit-current matrix.
//!
//! The artifact is produced upstream by a FEM solver and consumed strictly
//! read-only.  Loading happens once per search session; every later access is
//! a borrow of the single backing array, so thousands of combinations can
//! alias the same electrode rows without copying — files reach multiple
//! gigabytes and the store is the only owner of that memory.
//!
//! Artifact layout (see [`crate::io`]):
//! * `leadfield`     `[n_electrodes, n_nodes, 3]` F32
//! * `node_volumes`  `[n_nodes]` F32 — volume/area weight per node
//! * `node_coords`   `[n_nodes, 3]` F32 — node centroid coordinates (mm)
//! * metadata `electrodes` — comma-separated row names.
use crate::error::{Result, SearchError};
use crate::io::{Artifact, ArtifactWriter};
use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, Axis};
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

pub struct LeadfieldStore {
    fields: Array3<f32>,
    names: Vec<String>,
    index: HashMap<String, usize>,
    volumes: Array1<f32>,
    coords: Array2<f32>,
}

impl LeadfieldStore {
    /// Load and validate a leadfield artifact.
    ///
    /// This is the only I/O-bound step of a search run; it blocks once and
    /// logs size and timing so long loads are visible.
    ///
    /// # Errors
    ///
    /// [`SearchError::Io`] if the file cannot be read,
    /// [`SearchError::CorruptArtifact`] if the stored electrode count, node
    /// count, or weight-array length disagree internally.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<LeadfieldStore> {
        let path = path.as_ref();
        let t0 = Instant::now();
        let bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        log::info!(
            "loading leadfield {} ({:.1} MiB)",
            path.display(),
            bytes as f64 / (1024.0 * 1024.0)
        );

        let art = Artifact::open(path)?;
        let fields = art.array3_f32("leadfield")?;
        let volumes = art.array1_f32("node_volumes")?;
        let coords = art.array2_f32("node_coords")?;
        let names: Vec<String> = art
            .metadata("electrodes")
            .ok_or_else(|| {
                SearchError::CorruptArtifact("missing 'electrodes' metadata".into())
            })?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        let store = Self::from_parts(names, fields, volumes, coords)?;
        log::info!(
            "leadfield ready: {} electrodes × {} nodes in {:.2} s",
            store.n_electrodes(),
            store.domain_size(),
            t0.elapsed().as_secs_f64()
        );
        Ok(store)
    }

    /// Build a store from in-memory arrays (tests, benches, adapters that
    /// already hold the matrix).
    pub fn from_parts(
        names: Vec<String>,
        fields: Array3<f32>,
        volumes: Array1<f32>,
        coords: Array2<f32>,
    ) -> Result<LeadfieldStore> {
        let (n_el, n_nodes, dim) = fields.dim();
        if dim != 3 {
            return Err(SearchError::CorruptArtifact(format!(
                "leadfield vectors have {dim} components, expected 3"
            )));
        }
        if names.len() != n_el {
            return Err(SearchError::CorruptArtifact(format!(
                "{} electrode names for {n_el} leadfield rows",
                names.len()
            )));
        }
        if volumes.len() != n_nodes {
            return Err(SearchError::CorruptArtifact(format!(
                "{} node volumes for {n_nodes} nodes",
                volumes.len()
            )));
        }
        if coords.dim() != (n_nodes, 3) {
            return Err(SearchError::CorruptArtifact(format!(
                "node_coords shape {:?} for {n_nodes} nodes",
                coords.dim()
            )));
        }
        if volumes.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(SearchError::CorruptArtifact(
                "node volumes must be finite and non-negative".into(),
            ));
        }
        if volumes.sum() <= 0.0 {
            return Err(SearchError::CorruptArtifact(
                "node volumes sum to zero".into(),
            ));
        }

        let mut index = HashMap::with_capacity(n_el);
        for (i, name) in names.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(SearchError::CorruptArtifact(format!(
                    "electrode '{name}' appears twice"
                )));
            }
        }
        Ok(LeadfieldStore { fields, names, index, volumes, coords })
    }

    /// Resolve an electrode name to its row index.
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| SearchError::MissingElectrode(name.to_string()))
    }

    /// Field-per-unit-current of one electrode, `[n_nodes, 3]`, by name.
    ///
    /// Read-only view into the shared matrix; O(1) apart from the name hash.
    pub fn lookup(&self, name: &str) -> Result<ArrayView2<'_, f32>> {
        Ok(self.field_at(self.index_of(name)?))
    }

    /// Field row by index.  The hot loop resolves names once via
    /// [`Self::index_of`] and then stays on this accessor.
    pub fn field_at(&self, idx: usize) -> ArrayView2<'_, f32> {
        self.fields.index_axis(Axis(0), idx)
    }

    /// Volume/area weight per node, shared with ROI statistics.
    pub fn node_volumes(&self) -> ArrayView1<'_, f32> {
        self.volumes.view()
    }

    /// Node centroid coordinates, `[n_nodes, 3]`.
    pub fn node_coords(&self) -> ArrayView2<'_, f32> {
        self.coords.view()
    }

    /// Number of nodes/voxels in the field domain.
    pub fn domain_size(&self) -> usize {
        self.fields.dim().1
    }

    pub fn n_electrodes(&self) -> usize {
        self.names.len()
    }

    /// Electrode names in row order.
    pub fn electrodes(&self) -> &[String] {
        &self.names
    }
}

/// Write a leadfield artifact (fixture generation and re-export).
pub fn write_leadfield<P: AsRef<Path>>(
    path: P,
    names: &[String],
    fields: &Array3<f32>,
    volumes: &Array1<f32>,
    coords: &Array2<f32>,
) -> Result<()> {
    let (n_el, n_nodes, dim) = fields.dim();
    let mut w = ArtifactWriter::new();
    w.tensor_f32(
        "leadfield",
        &[n_el, n_nodes, dim],
        fields.as_standard_layout().as_slice().unwrap(),
    )
    .tensor_f32("node_volumes", &[volumes.len()], volumes.as_slice().unwrap())
    .tensor_f32(
        "node_coords",
        &[coords.dim().0, coords.dim().1],
        coords.as_standard_layout().as_slice().unwrap(),
    )
    .metadata("electrodes", &names.join(","));
    w.write(path)
}
