//! In-memory vector index with brute-force cosine search.

use ragbot_types::{Embedding, ScoredSegment, Segment};

use crate::error::IndexError;

/// A segment stored together with its embedding.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub segment: Segment,
    pub embedding: Embedding,
}

/// Segment store searched by cosine similarity.
///
/// All stored embeddings share one dimensionality, fixed by the first insert.
/// Insertion order is kept and breaks ties between equal scores.
#[derive(Debug, Default)]
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    dimensions: Option<usize>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one segment.
    pub fn add(&mut self, segment: Segment, embedding: Embedding) -> Result<(), IndexError> {
        let dims = self.check_dimensions(&embedding)?;
        self.dimensions = Some(dims);
        self.entries.push(IndexEntry { segment, embedding });
        Ok(())
    }

    /// Add segments paired with their embeddings.
    ///
    /// The batch is validated before anything is stored, so a failed call leaves
    /// the index unchanged.
    pub fn add_all(
        &mut self,
        segments: Vec<Segment>,
        embeddings: Vec<Embedding>,
    ) -> Result<(), IndexError> {
        if segments.len() != embeddings.len() {
            return Err(IndexError::CountMismatch {
                segments: segments.len(),
                embeddings: embeddings.len(),
            });
        }

        let mut dims = self.dimensions;
        for embedding in &embeddings {
            if embedding.is_empty() {
                return Err(IndexError::EmptyEmbedding);
            }
            match dims {
                Some(expected) if expected != embedding.len() => {
                    return Err(IndexError::DimensionMismatch {
                        expected,
                        actual: embedding.len(),
                    });
                }
                _ => dims = Some(embedding.len()),
            }
        }

        self.dimensions = dims;
        self.entries.extend(
            segments
                .into_iter()
                .zip(embeddings)
                .map(|(segment, embedding)| IndexEntry { segment, embedding }),
        );
        Ok(())
    }

    /// Best matches for `query`, highest score first.
    ///
    /// Only entries scoring at least `min_score` are returned, at most
    /// `max_results` of them.
    pub fn search(
        &self,
        query: &[f32],
        max_results: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredSegment>, IndexError> {
        if self.entries.is_empty() || max_results == 0 {
            return Ok(Vec::new());
        }
        self.check_dimensions(query)?;

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, cosine_similarity(query, &entry.embedding)))
            .filter(|(_, score)| *score >= min_score)
            .collect();

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(max_results);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredSegment::new(self.entries[i].segment.clone(), score))
            .collect())
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    fn check_dimensions(&self, embedding: &[f32]) -> Result<usize, IndexError> {
        if embedding.is_empty() {
            return Err(IndexError::EmptyEmbedding);
        }
        match self.dimensions {
            Some(expected) if expected != embedding.len() => Err(IndexError::DimensionMismatch {
                expected,
                actual: embedding.len(),
            }),
            _ => Ok(embedding.len()),
        }
    }
}

/// Cosine similarity in [-1, 1]; 0 for mismatched, empty or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
