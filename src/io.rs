//! Safetensors-style artifact I/O.
//!
//! Leadfield and ROI artifacts use one container: an 8-byte little-endian
//! header length, a JSON header mapping tensor name → `{dtype, shape,
//! data_offsets}` (plus an optional `__metadata__` string map), then the raw
//! little-endian payload.  Only F32 tensors are stored — the upstream FEM
//! exporter writes single precision, and multi-gigabyte leadfields make
//! doubling the footprint on disk unattractive.
//!
//! No dependency on the `safetensors` crate's tensor types — we just need
//! raw bytes → ndarray.
use crate::error::{Result, SearchError};
use ndarray::{Array1, Array2, Array3};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

/// A parsed artifact: header plus payload bytes.
pub struct Artifact {
    header: HashMap<String, Value>,
    payload: Vec<u8>,
}

impl Artifact {
    /// Read and parse an artifact file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Artifact> {
        let bytes = std::fs::read(path)?;
        if bytes.len() < 8 {
            return Err(SearchError::CorruptArtifact(
                "file shorter than the 8-byte header length".into(),
            ));
        }
        let n = u64::from_le_bytes(bytes[..8].try_into().unwrap()) as usize;
        if bytes.len() < 8 + n {
            return Err(SearchError::CorruptArtifact(format!(
                "header claims {n} bytes but only {} remain",
                bytes.len() - 8
            )));
        }
        let header: HashMap<String, Value> = serde_json::from_slice(&bytes[8..8 + n])?;
        Ok(Artifact { header, payload: bytes[8 + n..].to_vec() })
    }

    /// Tensor names present in the artifact (metadata excluded).
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.header.keys().map(String::as_str).filter(|k| *k != "__metadata__")
    }

    pub fn has(&self, name: &str) -> bool {
        self.header.contains_key(name)
    }

    /// A `__metadata__` string entry, if present.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.header.get("__metadata__")?.get(key)?.as_str()
    }

    /// Decode an F32 tensor as a flat vector plus its shape.
    pub fn tensor_f32(&self, name: &str) -> Result<(Vec<f32>, Vec<usize>)> {
        let entry = self.header.get(name).ok_or_else(|| {
            SearchError::CorruptArtifact(format!("tensor '{name}' missing"))
        })?;
        let bad = |what: &str| {
            SearchError::CorruptArtifact(format!("tensor '{name}': {what}"))
        };

        match entry.get("dtype").and_then(Value::as_str) {
            Some("F32") => {}
            Some(other) => return Err(bad(&format!("dtype {other}, expected F32"))),
            None => return Err(bad("missing dtype")),
        }
        let shape: Vec<usize> = entry
            .get("shape")
            .and_then(Value::as_array)
            .ok_or_else(|| bad("missing shape"))?
            .iter()
            .map(|v| v.as_u64().map(|u| u as usize).ok_or_else(|| bad("bad shape entry")))
            .collect::<Result<_>>()?;
        let offsets = entry
            .get("data_offsets")
            .and_then(Value::as_array)
            .ok_or_else(|| bad("missing data_offsets"))?;
        if offsets.len() != 2 {
            return Err(bad("data_offsets must have two entries"));
        }
        let (s, e) = match (offsets[0].as_u64(), offsets[1].as_u64()) {
            (Some(s), Some(e)) => (s as usize, e as usize),
            _ => return Err(bad("bad data_offsets")),
        };
        if e < s || e > self.payload.len() {
            return Err(bad("data_offsets outside payload"));
        }
        let n_elem: usize = shape.iter().product();
        if e - s != n_elem * 4 {
            return Err(bad(&format!(
                "payload is {} bytes for {n_elem} f32 elements",
                e - s
            )));
        }
        let floats = self.payload[s..e]
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Ok((floats, shape))
    }

    pub fn array1_f32(&self, name: &str) -> Result<Array1<f32>> {
        let (data, shape) = self.tensor_f32(name)?;
        if shape.len() != 1 {
            return Err(SearchError::CorruptArtifact(format!(
                "tensor '{name}' has rank {}, expected 1",
                shape.len()
            )));
        }
        Ok(Array1::from_vec(data))
    }

    pub fn array2_f32(&self, name: &str) -> Result<Array2<f32>> {
        let (data, shape) = self.tensor_f32(name)?;
        if shape.len() != 2 {
            return Err(SearchError::CorruptArtifact(format!(
                "tensor '{name}' has rank {}, expected 2",
                shape.len()
            )));
        }
        Array2::from_shape_vec((shape[0], shape[1]), data)
            .map_err(|e| SearchError::CorruptArtifact(e.to_string()))
    }

    pub fn array3_f32(&self, name: &str) -> Result<Array3<f32>> {
        let (data, shape) = self.tensor_f32(name)?;
        if shape.len() != 3 {
            return Err(SearchError::CorruptArtifact(format!(
                "tensor '{name}' has rank {}, expected 3",
                shape.len()
            )));
        }
        Array3::from_shape_vec((shape[0], shape[1], shape[2]), data)
            .map_err(|e| SearchError::CorruptArtifact(e.to_string()))
    }
}

/// Incremental artifact writer (fixtures, field exports, round trips).
#[derive(Default)]
pub struct ArtifactWriter {
    tensors: Vec<(String, Vec<usize>, Vec<u8>)>,
    metadata: Vec<(String, String)>,
}

impl ArtifactWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata(&mut self, key: &str, value: &str) -> &mut Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    /// Append an F32 tensor.  `data.len()` must equal the shape product.
    pub fn tensor_f32(&mut self, name: &str, shape: &[usize], data: &[f32]) -> &mut Self {
        debug_assert_eq!(data.len(), shape.iter().product::<usize>());
        let bytes = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.tensors.push((name.into(), shape.to_vec(), bytes));
        self
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut header = serde_json::Map::new();
        let mut offset = 0usize;
        for (name, shape, bytes) in &self.tensors {
            header.insert(
                name.clone(),
                json!({
                    "dtype": "F32",
                    "shape": shape,
                    "data_offsets": [offset, offset + bytes.len()],
                }),
            );
            offset += bytes.len();
        }
        if !self.metadata.is_empty() {
            let meta: serde_json::Map<String, Value> = self
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            header.insert("__metadata__".into(), Value::Object(meta));
        }
        let header_bytes = serde_json::to_vec(&Value::Object(header))?;

        let mut f = std::fs::File::create(path)?;
        f.write_all(&(header_bytes.len() as u64).to_le_bytes())?;
        f.write_all(&header_bytes)?;
        for (_, _, bytes) in &self.tensors {
            f.write_all(bytes)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_two_tensors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rt.exsf");

        let mut w = ArtifactWriter::new();
        w.tensor_f32("a", &[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
            .tensor_f32("b", &[2], &[7.0, 8.0])
            .metadata("electrodes", "E1,E2");
        w.write(&path).unwrap();

        let art = Artifact::open(&path).unwrap();
        assert!(art.has("a") && art.has("b"));
        assert_eq!(art.metadata("electrodes"), Some("E1,E2"));
        let a = art.array2_f32("a").unwrap();
        assert_eq!(a.dim(), (2, 3));
        assert_eq!(a[[1, 2]], 6.0);
        let b = art.array1_f32("b").unwrap();
        assert_eq!(b.to_vec(), vec![7.0, 8.0]);
    }

    #[test]
    fn truncated_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.exsf");
        std::fs::write(&path, [0u8; 4]).unwrap();
        assert!(matches!(
            Artifact::open(&path),
            Err(SearchError::CorruptArtifact(_))
        ));
    }

    #[test]
    fn header_overrun_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overrun.exsf");
        let mut bytes = 1_000_000u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"{}");
        std::fs::write(&path, bytes).unwrap();
        assert!(matches!(
            Artifact::open(&path),
            Err(SearchError::CorruptArtifact(_))
        ));
    }

    #[test]
    fn wrong_rank_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rank.exsf");
        let mut w = ArtifactWriter::new();
        w.tensor_f32("m", &[4], &[0.0; 4]);
        w.write(&path).unwrap();
        let art = Artifact::open(&path).unwrap();
        assert!(art.array2_f32("m").is_err());
        assert!(art.array1_f32("m").is_ok());
    }
}
