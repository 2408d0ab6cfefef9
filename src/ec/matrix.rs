//! GF(2^8) Matrices
//!
//! Dense row-major matrices over GF(256) with just enough operations to
//! build a systematic Reed-Solomon coding matrix and invert decode
//! sub-matrices. All arithmetic is exact.

use crate::ec::galois;
use crate::error::{Error, Result};

/// A dense matrix over GF(2^8)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<u8>,
}

impl Matrix {
    /// Create a zero matrix
    pub fn zero(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0u8; rows * cols],
        }
    }

    /// Create an identity matrix
    pub fn identity(size: usize) -> Self {
        let mut m = Self::zero(size, size);
        for i in 0..size {
            m.set(i, i, 1);
        }
        m
    }

    /// Vandermonde matrix with `m[r][c] = r^c`.
    ///
    /// Any `cols` rows of it are linearly independent as long as
    /// `rows <= 256`.
    pub fn vandermonde(rows: usize, cols: usize) -> Self {
        let mut m = Self::zero(rows, cols);
        for r in 0..rows {
            for c in 0..cols {
                m.set(r, c, galois::exp(r as u8, c));
            }
        }
        m
    }

    /// Build a matrix from explicit rows. All rows must have equal length.
    pub fn from_rows(rows: &[Vec<u8>]) -> Result<Self> {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        if rows.iter().any(|r| r.len() != cols) {
            return Err(Error::InvalidEcConfig(
                "matrix rows must all have the same length".to_string(),
            ));
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data: rows.concat(),
        })
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn get(&self, r: usize, c: usize) -> u8 {
        self.data[r * self.cols + c]
    }

    #[inline]
    pub fn set(&mut self, r: usize, c: usize, value: u8) {
        self.data[r * self.cols + c] = value;
    }

    /// Borrow one row
    pub fn row(&self, r: usize) -> &[u8] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Matrix product `self * rhs`
    pub fn multiply(&self, rhs: &Matrix) -> Result<Matrix> {
        if self.cols != rhs.rows {
            return Err(Error::InvalidEcConfig(format!(
                "cannot multiply {}x{} by {}x{}",
                self.rows, self.cols, rhs.rows, rhs.cols
            )));
        }

        let mut out = Matrix::zero(self.rows, rhs.cols);
        for r in 0..self.rows {
            for c in 0..rhs.cols {
                let mut acc = 0u8;
                for i in 0..self.cols {
                    acc = galois::add(acc, galois::mul(self.get(r, i), rhs.get(i, c)));
                }
                out.set(r, c, acc);
            }
        }
        Ok(out)
    }

    /// Rows `[rmin, rmax)` and columns `[cmin, cmax)`
    pub fn submatrix(&self, rmin: usize, cmin: usize, rmax: usize, cmax: usize) -> Matrix {
        let mut out = Matrix::zero(rmax - rmin, cmax - cmin);
        for r in rmin..rmax {
            for c in cmin..cmax {
                out.set(r - rmin, c - cmin, self.get(r, c));
            }
        }
        out
    }

    /// New matrix made of the selected rows, in the given order
    pub fn select_rows(&self, rows: &[usize]) -> Matrix {
        let mut data = Vec::with_capacity(rows.len() * self.cols);
        for &r in rows {
            data.extend_from_slice(self.row(r));
        }
        Matrix {
            rows: rows.len(),
            cols: self.cols,
            data,
        }
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for c in 0..self.cols {
            self.data.swap(a * self.cols + c, b * self.cols + c);
        }
    }

    /// Invert a square matrix with Gauss-Jordan elimination.
    ///
    /// # Errors
    ///
    /// - `InvalidEcConfig` if the matrix is not square
    /// - `SingularMatrix` if no inverse exists
    pub fn invert(&self) -> Result<Matrix> {
        if self.rows != self.cols {
            return Err(Error::InvalidEcConfig(format!(
                "only square matrices can be inverted, got {}x{}",
                self.rows, self.cols
            )));
        }

        let n = self.rows;
        let mut work = self.clone();
        let mut inv = Matrix::identity(n);

        for col in 0..n {
            // Find a pivot at or below the diagonal
            let pivot = (col..n)
                .find(|&r| work.get(r, col) != 0)
                .ok_or_else(|| Error::SingularMatrix {
                    rows: (0..n).collect(),
                })?;
            work.swap_rows(col, pivot);
            inv.swap_rows(col, pivot);

            // Scale the pivot row to 1
            let pivot_inv = galois::inverse(work.get(col, col)).ok_or_else(|| {
                Error::SingularMatrix {
                    rows: (0..n).collect(),
                }
            })?;
            for c in 0..n {
                work.set(col, c, galois::mul(work.get(col, c), pivot_inv));
                inv.set(col, c, galois::mul(inv.get(col, c), pivot_inv));
            }

            // Clear the column everywhere else
            for r in 0..n {
                if r == col {
                    continue;
                }
                let factor = work.get(r, col);
                if factor == 0 {
                    continue;
                }
                for c in 0..n {
                    let w = galois::add(work.get(r, c), galois::mul(factor, work.get(col, c)));
                    work.set(r, c, w);
                    let i = galois::add(inv.get(r, c), galois::mul(factor, inv.get(col, c)));
                    inv.set(r, c, i);
                }
            }
        }

        Ok(inv)
    }
}

// =============================================================================
// Tests
// =============================================================================
