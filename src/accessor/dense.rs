//! Dense, explicitly-materialized SPD matrix accessor, selected via
//! `--source dense`: a column-major, native-endian binary file of
//! single-precision floats, optionally paired with a coordinates file.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::MatrixAccessor;
use crate::error::{Error, Result};

#[derive(Debug)]
pub struct DenseAccessor {
    n: usize,
    /// Column-major storage, matching the file layout exactly so loading is
    /// a single `read_exact` plus a `f32 -> f64` widen.
    data: Vec<f64>,
}

impl DenseAccessor {
    pub fn from_path(path: impl AsRef<Path>, n: usize) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let expected = (n * n * std::mem::size_of::<f32>()) as u64;
        let found = file.metadata()?.len();
        if found != expected {
            return Err(Error::FileSizeMismatch {
                path: path.display().to_string(),
                expected,
                found,
            });
        }

        let mut raw = vec![0u8; expected as usize];
        file.read_exact(&mut raw)?;

        let data = raw
            .chunks_exact(4)
            .map(|chunk| f32::from_ne_bytes(chunk.try_into().unwrap()) as f64)
            .collect();

        Ok(Self { n, data })
    }

    pub fn from_symmetric_dense(n: usize, data: Vec<f64>) -> Self {
        assert_eq!(data.len(), n * n);
        Self { n, data }
    }

    #[inline]
    fn index(&self, i: usize, j: usize) -> usize {
        // column-major: element (i, j) at offset j*n + i
        j * self.n + i
    }
}

impl MatrixAccessor for DenseAccessor {
    fn n(&self) -> usize {
        self.n
    }

    fn get(&self, i: usize, j: usize) -> f64 {
        self.data[self.index(i, j)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_symmetric() {
        let n = 4;
        let mut data = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                let v = 1.0 / (1.0 + (i as f64 - j as f64).abs());
                data[j * n + i] = v;
            }
        }
        let accessor = DenseAccessor::from_symmetric_dense(n, data);
        for i in 0..n {
            for j in 0..n {
                assert_eq!(accessor.get(i, j), accessor.get(j, i));
            }
        }
    }
}
