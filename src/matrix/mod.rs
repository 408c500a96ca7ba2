//! Dense integer matrices and the serial baseline.
//!
//! Everything is row-major `i32` with wrapping arithmetic. Wrapping add and
//! multiply are associative and commutative, so any decomposition produces
//! the same bits as the serial kernel.

pub mod init;
pub mod naive_ijk;

use crate::error::{MatmulError, Result};

/// Matrix element type.
pub type Element = i32;

/// Problem shape: A is m×n, B is n×k, C is m×k.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dims {
    pub m: usize,
    pub n: usize,
    pub k: usize,
}

impl Dims {
    pub fn new(m: usize, n: usize, k: usize) -> Result<Self> {
        if m == 0 || n == 0 || k == 0 {
            return Err(MatmulError::InvalidDimensions { m, n, k });
        }
        Ok(Self { m, n, k })
    }

    /// Flattened index of C[i][j], used as the point-to-point message tag.
    pub fn flat_index(&self, i: usize, j: usize) -> u64 {
        (i * self.k + j) as u64
    }
}

/// Owned row-major matrix. Shape is fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<Element>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0; rows * cols],
        }
    }

    pub fn from_vec(rows: usize, cols: usize, data: Vec<Element>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(MatmulError::ShapeMismatch(format!(
                "expected {}x{}={} elements, got {}",
                rows,
                cols,
                rows * cols,
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Build from nested rows. Panics on ragged input; meant for fixtures.
    pub fn from_rows<R: AsRef<[Element]>>(rows: &[R]) -> Self {
        let cols = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            assert_eq!(row.as_ref().len(), cols, "ragged rows");
            data.extend_from_slice(row.as_ref());
        }
        Self {
            rows: rows.len(),
            cols,
            data,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, i: usize, j: usize) -> Element {
        self.data[i * self.cols + j]
    }

    pub fn set(&mut self, i: usize, j: usize, value: Element) {
        self.data[i * self.cols + j] = value;
    }

    pub fn row(&self, i: usize) -> &[Element] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Rows `[start, end)` as one contiguous slice.
    pub fn rows_slice(&self, start: usize, end: usize) -> &[Element] {
        &self.data[start * self.cols..end * self.cols]
    }

    pub fn as_slice(&self) -> &[Element] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [Element] {
        &mut self.data
    }
}

/// C = A·B with the serial kernel. C starts from zero.
pub fn multiply(a: &Matrix, b: &Matrix) -> Result<Matrix> {
    if a.cols != b.rows {
        return Err(MatmulError::ShapeMismatch(format!(
            "A is {}x{} but B is {}x{}",
            a.rows, a.cols, b.rows, b.cols
        )));
    }
    let mut c = Matrix::zeros(a.rows, b.cols);
    naive_ijk::matmul_serial(&a.data, &b.data, &mut c.data, a.rows, a.cols, b.cols);
    Ok(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_dimension_is_rejected() {
        assert!(Dims::new(0, 2, 2).is_err());
        assert!(Dims::new(2, 2, 0).is_err());
        assert!(Dims::new(1, 1, 1).is_ok());
    }

    #[test]
    fn from_vec_checks_length() {
        assert!(Matrix::from_vec(2, 3, vec![0; 5]).is_err());
        let m = Matrix::from_vec(2, 3, (0..6).collect()).unwrap();
        assert_eq!(m.get(1, 2), 5);
        assert_eq!(m.row(1), &[3, 4, 5]);
        assert_eq!(m.rows_slice(1, 2), &[3, 4, 5]);
    }

    #[test]
    fn multiply_rejects_mismatched_inner_dimension() {
        let a = Matrix::zeros(2, 3);
        let b = Matrix::zeros(2, 2);
        assert!(matches!(multiply(&a, &b), Err(MatmulError::ShapeMismatch(_))));
    }

    #[test]
    fn multiply_small() {
        let a = Matrix::from_rows(&[[1, 2, 3], [4, 5, 6]]);
        let b = Matrix::from_rows(&[[7, 8], [9, 10], [11, 12]]);
        let c = multiply(&a, &b).unwrap();
        assert_eq!(c, Matrix::from_rows(&[[58, 64], [139, 154]]));
    }

    #[test]
    fn flat_index_is_row_major() {
        let dims = Dims::new(3, 1, 4).unwrap();
        assert_eq!(dims.flat_index(0, 0), 0);
        assert_eq!(dims.flat_index(1, 0), 4);
        assert_eq!(dims.flat_index(2, 3), 11);
    }
}
