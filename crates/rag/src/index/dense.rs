//! In-memory dense vector index with cosine scoring.

/// Scale a vector to unit length in place. Zero vectors stay zero.
pub(crate) fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Dot product over the shorter of the two vectors.
///
/// Both sides are unit-normalized before storage, so this is cosine
/// similarity.
pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Brute-force nearest-neighbor index over unit vectors.
///
/// Corpora here are FAQ-sized (hundreds to low thousands of chunks), so a
/// linear scan outperforms approximate structures and keeps ranking exact.
#[derive(Debug, Clone, Default)]
pub struct DenseIndex {
    vectors: Vec<Vec<f32>>,
    dimensions: usize,
}

impl DenseIndex {
    /// Build from raw vectors, normalizing each to unit length.
    pub fn build(mut vectors: Vec<Vec<f32>>, dimensions: usize) -> Self {
        for vector in &mut vectors {
            normalize(vector);
        }
        Self {
            vectors,
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Top-k positions by cosine similarity, highest first.
    ///
    /// Ties break toward the lower position so results are stable across
    /// runs.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut query = query.to_vec();
        normalize(&mut query);

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(idx, vector)| (idx, dot(&query, vector)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_unit_length() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector_unchanged() {
        let mut v = vec![0.0, 0.0, 0.0];
        normalize(&mut v);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let index = DenseIndex::build(
            vec![
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.9, 0.1, 0.0],
            ],
            3,
        );

        let results = index.search(&[1.0, 0.0, 0.0], 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, 0);
        assert_eq!(results[1].0, 2);
        assert!(results[0].1 > results[1].1);
    }

    #[test]
    fn test_search_ties_prefer_lower_index() {
        let index = DenseIndex::build(
            vec![vec![0.0, 1.0], vec![0.0, 1.0], vec![1.0, 0.0]],
            2,
        );

        let results = index.search(&[0.0, 1.0], 3);
        assert_eq!(results[0].0, 0);
        assert_eq!(results[1].0, 1);
    }

    #[test]
    fn test_search_k_larger_than_index() {
        let index = DenseIndex::build(vec![vec![1.0, 0.0]], 2);
        let results = index.search(&[1.0, 0.0], 10);
        assert_eq!(results.len(), 1);
    }
}
