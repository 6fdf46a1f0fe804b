//! Reed-Solomon erasure coding over fixed shard counts.
//!
//! The queue always runs with the same (data, parity) geometry, so the
//! encoding matrix is built once and reused for every block. The matrix is
//! the classic systematic layout: identity over the data rows with
//! Cauchy-derived parity rows below. The parity rows can be replaced
//! wholesale with [`ReedSolomon::set_parity`] when the remote encoder uses
//! a different generator.

use crate::{gf256_muladd_mem, Error, Gf256};

/// Systematic Reed-Solomon codec with a replaceable parity matrix.
pub struct ReedSolomon {
    data_shards: usize,
    parity_shards: usize,
    /// (data + parity) x data encoding matrix, row-major.
    matrix: Vec<u8>,
}

impl ReedSolomon {
    /// Build a codec for the given shard geometry.
    ///
    /// The parity rows use the normalized Cauchy construction (first row
    /// all 1s), the same matrix an encoder built from this crate produces.
    pub fn new(data_shards: usize, parity_shards: usize) -> Self {
        let total = data_shards + parity_shards;
        let mut matrix = vec![0u8; total * data_shards];

        for i in 0..data_shards {
            matrix[i * data_shards + i] = 1;
        }

        // Cauchy element: a_ij = (y_j + x_0) / (x_i + y_j), normalized so
        // the first parity row is all 1s.
        let x_0 = data_shards as u8;
        for p in 0..parity_shards {
            let x_i = (data_shards + p) as u8;
            for c in 0..data_shards {
                let y_j = c as u8;
                let element = (Gf256(y_j) + Gf256(x_0)) / (Gf256(x_i) + Gf256(y_j));
                matrix[(data_shards + p) * data_shards + c] = element.0;
            }
        }

        Self {
            data_shards,
            parity_shards,
            matrix,
        }
    }

    #[inline]
    pub fn data_shards(&self) -> usize {
        self.data_shards
    }

    #[inline]
    pub fn parity_shards(&self) -> usize {
        self.parity_shards
    }

    #[inline]
    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    /// Replace the parity rows of the encoding matrix.
    ///
    /// `rows` is row-major, `parity_shards` rows of `data_shards` columns.
    /// Encoding and reconstruction both read the stored matrix, so the
    /// override governs every subsequent operation.
    pub fn set_parity(&mut self, rows: &[u8]) -> Result<(), Error> {
        if rows.len() != self.parity_shards * self.data_shards {
            return Err(Error::InvalidParityMatrix);
        }
        let start = self.data_shards * self.data_shards;
        self.matrix[start..].copy_from_slice(rows);
        Ok(())
    }

    /// Compute the parity shards for a full set of data shards.
    pub fn encode_parity(&self, data: &[&[u8]]) -> Vec<Vec<u8>> {
        debug_assert_eq!(data.len(), self.data_shards);

        let shard_size = data.first().map_or(0, |d| d.len());
        (0..self.parity_shards)
            .map(|p| {
                let mut out = vec![0u8; shard_size];
                let row = &self.matrix[(self.data_shards + p) * self.data_shards..]
                    [..self.data_shards];
                for (c, src) in data.iter().enumerate() {
                    gf256_muladd_mem(&mut out, src, Gf256(row[c]));
                }
                out
            })
            .collect()
    }

    /// Reconstruct every missing data shard in place.
    ///
    /// `shards` holds the payload view of each shard, data shards first and
    /// parity shards after; `marks[i] != 0` flags shard `i` as missing.
    /// Succeeds only when at least `data_shards` shards are present.
    /// Missing parity shards are left untouched.
    pub fn reconstruct(&self, shards: &mut [&mut [u8]], marks: &[u8]) -> Result<(), Error> {
        let d = self.data_shards;
        debug_assert_eq!(shards.len(), self.total_shards());
        debug_assert_eq!(marks.len(), self.total_shards());

        let present: Vec<usize> = (0..shards.len()).filter(|&i| marks[i] == 0).collect();
        if present.len() < d {
            return Err(Error::InsufficientShards);
        }
        if marks[..d].iter().all(|&m| m == 0) {
            return Ok(());
        }

        // Invert the submatrix formed by the first `d` present shards'
        // encoding rows; row i of the inverse then expresses data shard i
        // as a combination of those shards.
        let rows = &present[..d];
        let mut sub = vec![Gf256(0); d * d];
        for (k, &r) in rows.iter().enumerate() {
            for c in 0..d {
                sub[k * d + c] = Gf256(self.matrix[r * d + c]);
            }
        }
        let inv = invert_matrix(&mut sub, d).ok_or(Error::SingularMatrix)?;

        let shard_size = shards[rows[0]].len();
        let mut out = vec![0u8; shard_size];
        for i in 0..d {
            if marks[i] == 0 {
                continue;
            }
            out.fill(0);
            for (k, &r) in rows.iter().enumerate() {
                gf256_muladd_mem(&mut out, &*shards[r], inv[i * d + k]);
            }
            shards[i].copy_from_slice(&out);
        }

        Ok(())
    }
}

impl std::fmt::Debug for ReedSolomon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReedSolomon")
            .field("data_shards", &self.data_shards)
            .field("parity_shards", &self.parity_shards)
            .finish()
    }
}

/// Gauss-Jordan inversion over GF(256). Returns None for a singular matrix.
fn invert_matrix(m: &mut [Gf256], n: usize) -> Option<Vec<Gf256>> {
    let mut inv = vec![Gf256(0); n * n];
    for i in 0..n {
        inv[i * n + i] = Gf256(1);
    }

    for col in 0..n {
        let pivot_row = (col..n).find(|&r| m[r * n + col].0 != 0)?;
        if pivot_row != col {
            for j in 0..n {
                m.swap(col * n + j, pivot_row * n + j);
                inv.swap(col * n + j, pivot_row * n + j);
            }
        }

        let pivot_inv = Gf256(1) / m[col * n + col];
        for j in 0..n {
            m[col * n + j] = m[col * n + j] * pivot_inv;
            inv[col * n + j] = inv[col * n + j] * pivot_inv;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = m[row * n + col];
            if factor.0 == 0 {
                continue;
            }
            for j in 0..n {
                let mc = m[col * n + j];
                let ic = inv[col * n + j];
                m[row * n + j] = m[row * n + j] + mc * factor;
                inv[row * n + j] = inv[row * n + j] + ic * factor;
            }
        }
    }

    Some(inv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DATA_SHARDS, FEC_SHARDS, SENDER_PARITY_ROWS, TOTAL_SHARDS};

    fn test_shards(shard_size: usize) -> Vec<Vec<u8>> {
        (0..DATA_SHARDS)
            .map(|i| {
                (0..shard_size)
                    .map(|j| ((i * 31 + j * 7) % 256) as u8)
                    .collect()
            })
            .collect()
    }

    fn codec() -> ReedSolomon {
        let mut rs = ReedSolomon::new(DATA_SHARDS, FEC_SHARDS);
        rs.set_parity(&SENDER_PARITY_ROWS).unwrap();
        rs
    }

    #[test]
    fn test_set_parity_rejects_bad_length() {
        let mut rs = ReedSolomon::new(DATA_SHARDS, FEC_SHARDS);
        assert_eq!(rs.set_parity(&[0u8; 7]), Err(Error::InvalidParityMatrix));
        assert!(rs.set_parity(&SENDER_PARITY_ROWS).is_ok());
    }

    #[test]
    fn test_nothing_missing_is_noop() {
        let rs = codec();
        let data = test_shards(16);
        let mut parity = rs.encode_parity(&data.iter().map(|d| d.as_slice()).collect::<Vec<_>>());

        let mut shards = data.clone();
        let mut refs: Vec<&mut [u8]> = shards
            .iter_mut()
            .map(|s| s.as_mut_slice())
            .chain(parity.iter_mut().map(|p| p.as_mut_slice()))
            .collect();
        rs.reconstruct(&mut refs, &[0u8; TOTAL_SHARDS]).unwrap();
        assert_eq!(shards, data);
    }

    #[test]
    fn test_recover_any_two_losses() {
        let rs = codec();
        let shard_size = 33;
        let data = test_shards(shard_size);
        let parity =
            rs.encode_parity(&data.iter().map(|d| d.as_slice()).collect::<Vec<_>>());

        // Every pair of lost shards (data or parity) must be survivable.
        for a in 0..TOTAL_SHARDS {
            for b in (a + 1)..TOTAL_SHARDS {
                let mut shards: Vec<Vec<u8>> = data
                    .iter()
                    .cloned()
                    .chain(parity.iter().cloned())
                    .collect();
                let mut marks = [0u8; TOTAL_SHARDS];
                for &lost in &[a, b] {
                    marks[lost] = 1;
                    shards[lost].fill(0);
                }

                let mut refs: Vec<&mut [u8]> =
                    shards.iter_mut().map(|s| s.as_mut_slice()).collect();
                rs.reconstruct(&mut refs, &marks).unwrap();

                for i in 0..DATA_SHARDS {
                    assert_eq!(shards[i], data[i], "lost ({}, {})", a, b);
                }
            }
        }
    }

    #[test]
    fn test_too_many_losses() {
        let rs = codec();
        let data = test_shards(8);
        let parity =
            rs.encode_parity(&data.iter().map(|d| d.as_slice()).collect::<Vec<_>>());

        let mut shards: Vec<Vec<u8>> = data
            .iter()
            .cloned()
            .chain(parity.iter().cloned())
            .collect();
        let marks = [1u8, 1, 1, 0, 0, 0];
        let mut refs: Vec<&mut [u8]> = shards.iter_mut().map(|s| s.as_mut_slice()).collect();
        assert_eq!(
            rs.reconstruct(&mut refs, &marks),
            Err(Error::InsufficientShards)
        );
    }

    #[test]
    fn test_default_cauchy_parity_roundtrip() {
        // Same property without the parity override.
        let rs = ReedSolomon::new(DATA_SHARDS, FEC_SHARDS);
        let data = test_shards(24);
        let parity =
            rs.encode_parity(&data.iter().map(|d| d.as_slice()).collect::<Vec<_>>());

        let mut shards: Vec<Vec<u8>> = data
            .iter()
            .cloned()
            .chain(parity.iter().cloned())
            .collect();
        let marks = [1u8, 0, 0, 1, 0, 0];
        shards[0].fill(0);
        shards[3].fill(0);
        let mut refs: Vec<&mut [u8]> = shards.iter_mut().map(|s| s.as_mut_slice()).collect();
        rs.reconstruct(&mut refs, &marks).unwrap();
        assert_eq!(shards[0], data[0]);
        assert_eq!(shards[3], data[3]);
    }
}
