use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

use super::{squared_l2, IndexKind, Neighbor, VectorIndex};

/// Exact nearest-neighbor search by brute-force squared L2 distance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatIndex {
    dimension: usize,
    /// Row-major vectors, `dimension` floats per row
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn add(&mut self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        self.data.extend_from_slice(vector);
        Ok(())
    }

    fn row(&self, position: usize) -> &[f32] {
        let start = position * self.dimension;
        &self.data[start..start + self.dimension]
    }
}

impl VectorIndex for FlatIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Flat
    }

    fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<Neighbor> = (0..self.len())
            .map(|position| Neighbor {
                position,
                distance: squared_l2(query, self.row(position)),
            })
            .collect();

        // Equal distances keep position order.
        scored.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        });
        scored.truncate(k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(rows: &[[f32; 2]]) -> FlatIndex {
        let mut idx = FlatIndex::new(2);
        for row in rows {
            idx.add(row).unwrap();
        }
        idx
    }

    #[test]
    fn test_exact_ordering() {
        let idx = index(&[[0.0, 0.0], [1.0, 0.0], [3.0, 0.0], [0.5, 0.0]]);
        let hits = idx.search(&[0.9, 0.0], 3).unwrap();
        let positions: Vec<usize> = hits.iter().map(|n| n.position).collect();
        assert_eq!(positions, vec![1, 3, 0]);
        assert!((hits[0].distance - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_ties_break_by_position() {
        let idx = index(&[[1.0, 0.0], [-1.0, 0.0], [0.0, 1.0]]);
        let hits = idx.search(&[0.0, 0.0], 3).unwrap();
        let positions: Vec<usize> = hits.iter().map(|n| n.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn test_k_larger_than_index() {
        let idx = index(&[[0.0, 0.0]]);
        assert_eq!(idx.search(&[1.0, 1.0], 10).unwrap().len(), 1);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut idx = FlatIndex::new(3);
        assert!(idx.add(&[1.0]).is_err());
        assert!(idx.search(&[1.0, 2.0], 1).is_err());
    }
}
