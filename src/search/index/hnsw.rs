// rust-cv/hnsw graph over squared L2, rebuilt from its features on load

use std::fmt;

use hnsw::{Hnsw, Params, Searcher};
use rand::rngs::StdRng;
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use space::Metric;
use tracing::debug;

use crate::error::{RagError, Result};

use super::{squared_l2, IndexKind, Neighbor, VectorIndex};

/// Links per node on upper layers
pub const M: usize = 32;
/// Links per node on layer 0
pub const M0: usize = 2 * M;

/// Squared L2 distance as an order-preserving `u32`.
///
/// Non-negative `f32` bit patterns sort the same way as the floats they encode,
/// so `f32::from_bits` recovers the exact distance.
#[derive(Debug, Clone, Copy, Default)]
struct SquaredL2;

impl Metric<Box<[f32]>> for SquaredL2 {
    type Unit = u32;

    fn distance(&self, a: &Box<[f32]>, b: &Box<[f32]>) -> u32 {
        squared_l2(a, b).to_bits()
    }
}

type Graph = Hnsw<SquaredL2, Box<[f32]>, StdRng, M, M0>;

/// Construction and search parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HnswParams {
    pub ef_construction: usize,
    pub ef_search: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            ef_construction: 80,
            ef_search: 64,
        }
    }
}

pub struct HnswIndex {
    graph: Graph,
    dimension: usize,
    ef_construction: usize,
    /// Runtime-only; restored by the loader
    ef_search: usize,
}

impl HnswIndex {
    /// Insert every vector in order. The graph RNG always starts from the same
    /// seed, so identical input builds an identical graph.
    pub fn build(vectors: Vec<Vec<f32>>, params: HnswParams) -> Result<Self> {
        let dimension = vectors.first().map(Vec::len).ok_or(RagError::EmptyIndex)?;
        let ef_construction = params.ef_construction.max(1);
        let mut graph = Graph::new_params(SquaredL2, Params::new().ef_construction(ef_construction));
        let mut searcher = Searcher::default();

        for vector in vectors {
            if vector.len() != dimension {
                return Err(RagError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            graph.insert(vector.into_boxed_slice(), &mut searcher);
        }

        Ok(Self {
            graph,
            dimension,
            ef_construction,
            ef_search: params.ef_search.max(1),
        })
    }

    pub fn ef_search(&self) -> usize {
        self.ef_search
    }

    pub fn set_ef_search(&mut self, ef_search: usize) {
        self.ef_search = ef_search.max(1);
    }

    fn features(&self) -> impl Iterator<Item = &[f32]> + '_ {
        (0..self.graph.len()).map(|i| &self.graph.feature(i)[..])
    }
}

impl fmt::Debug for HnswIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HnswIndex")
            .field("len", &self.graph.len())
            .field("dimension", &self.dimension)
            .field("ef_construction", &self.ef_construction)
            .field("ef_search", &self.ef_search)
            .finish()
    }
}

/// On-disk form: the inserted vectors in order plus construction parameters.
#[derive(Serialize)]
struct HnswDataRef<'a> {
    dimension: usize,
    ef_construction: usize,
    vectors: Vec<&'a [f32]>,
}

#[derive(Deserialize)]
struct HnswData {
    dimension: usize,
    ef_construction: usize,
    vectors: Vec<Vec<f32>>,
}

impl Serialize for HnswIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        HnswDataRef {
            dimension: self.dimension,
            ef_construction: self.ef_construction,
            vectors: self.features().collect(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for HnswIndex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let data = HnswData::deserialize(deserializer)?;
        if data.vectors.is_empty() {
            return Err(serde::de::Error::custom("approximate index holds no vectors"));
        }
        let params = HnswParams {
            ef_construction: data.ef_construction,
            ..Default::default()
        };
        let index = HnswIndex::build(data.vectors, params).map_err(serde::de::Error::custom)?;
        if index.dimension != data.dimension {
            return Err(serde::de::Error::custom(format!(
                "stored dimension {} does not match vectors of {}",
                data.dimension, index.dimension
            )));
        }
        debug!("Rebuilt HNSW graph over {} vectors", index.len());
        Ok(index)
    }
}

impl VectorIndex for HnswIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Hnsw
    }

    fn len(&self) -> usize {
        self.graph.len()
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
        let k = k.min(self.graph.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let query: Box<[f32]> = query.into();
        let mut searcher = Searcher::default();
        let mut found = vec![
            space::Neighbor {
                index: !0,
                distance: !0
            };
            k
        ];
        let ef = self.ef_search.max(k);
        let filled = self.graph.nearest(&query, ef, &mut searcher, &mut found);

        let mut hits: Vec<Neighbor> = filled
            .iter()
            .filter(|n| n.index != !0)
            .map(|n| Neighbor {
                position: n.index,
                distance: f32::from_bits(n.distance),
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        });
        Ok(hits)
    }
}
