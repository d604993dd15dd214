use ndarray::{Array2, Axis};

use crate::error::{RebyvalErr, Result};

/// A minimal in-memory dataset, one sample per row.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    x: Array2<f32>,
    y: Array2<f32>,
}

impl InMemoryDataset {
    /// Creates a new dataset from owned buffers.
    ///
    /// # Errors
    /// Returns `RebyvalErr::Config` if `x` and `y` hold a different amount of rows or are empty.
    pub fn new(x: Array2<f32>, y: Array2<f32>) -> Result<Self> {
        if x.nrows() != y.nrows() {
            return Err(RebyvalErr::Config(format!(
                "dataset has {} inputs but {} targets",
                x.nrows(),
                y.nrows()
            )));
        }

        if x.nrows() == 0 {
            return Err(RebyvalErr::Config("dataset must be non-empty".into()));
        }

        Ok(Self { x, y })
    }

    /// Splits row-major `x_size + y_size` wide rows into inputs and targets.
    pub fn from_rows(x_size: usize, y_size: usize, rows: &[f32]) -> Result<Self> {
        let width = x_size + y_size;
        let data = Array2::from_shape_vec((rows.len() / width.max(1), width), rows.to_vec())
            .map_err(|e| RebyvalErr::Config(format!("malformed inline rows: {e}")))?;

        let x = data.slice(ndarray::s![.., ..x_size]).to_owned();
        let y = data.slice(ndarray::s![.., x_size..]).to_owned();
        Self::new(x, y)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.nrows() == 0
    }

    #[inline]
    pub fn x(&self) -> &Array2<f32> {
        &self.x
    }

    #[inline]
    pub fn y(&self) -> &Array2<f32> {
        &self.y
    }

    /// Gathers the given rows into an owned batch.
    pub fn select(&self, rows: &[usize]) -> Batch {
        Batch {
            x: self.x.select(Axis(0), rows),
            y: self.y.select(Axis(0), rows),
        }
    }
}

/// An owned batch of inputs and targets.
#[derive(Debug, Clone)]
pub struct Batch {
    pub x: Array2<f32>,
    pub y: Array2<f32>,
}

impl Batch {
    #[inline]
    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.nrows() == 0
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn dataset_from_rows() {
        let ds = InMemoryDataset::from_rows(2, 1, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.x(), &array![[1.0, 2.0], [4.0, 5.0]]);
        assert_eq!(ds.y(), &array![[3.0], [6.0]]);
    }

    #[test]
    fn dataset_rejects_mismatched_rows() {
        let res = InMemoryDataset::new(array![[1.0], [2.0]], array![[1.0]]);
        assert!(matches!(res, Err(RebyvalErr::Config(_))));
    }

    #[test]
    fn select_gathers_rows() {
        let ds = InMemoryDataset::new(array![[0.0], [1.0], [2.0]], array![[10.0], [11.0], [12.0]])
            .unwrap();

        let batch = ds.select(&[2, 0]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.x, array![[2.0], [0.0]]);
        assert_eq!(batch.y, array![[12.0], [10.0]]);
    }
}
