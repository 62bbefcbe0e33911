use crate::common::error::{FaceAuthError, Result};
use crate::core::similarity::l2_normalize;
use crate::core::types::Embedding;

/// Reduce enrollment embeddings to one identity vector: component-wise mean,
/// then L2-normalized.
pub fn aggregate_embeddings(embeddings: &[Embedding]) -> Result<Embedding> {
    let first = embeddings.first().ok_or(FaceAuthError::NoUsableEmbedding)?;
    let embedding_size = first.len();

    let mut averaged = vec![0.0f32; embedding_size];

    for embedding in embeddings {
        if embedding.len() != embedding_size {
            return Err(FaceAuthError::DimensionMismatch {
                expected: embedding_size,
                found: embedding.len(),
            });
        }
        for (i, &value) in embedding.iter().enumerate() {
            averaged[i] += value;
        }
    }

    let count = embeddings.len() as f32;
    for value in &mut averaged {
        *value /= count;
    }

    l2_normalize(&mut averaged);
    Ok(averaged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::similarity::l2_norm;

    const EPS: f32 = 1e-6;

    #[test]
    fn empty_input_has_no_usable_embedding() {
        let err = aggregate_embeddings(&[]).unwrap_err();
        assert!(matches!(err, FaceAuthError::NoUsableEmbedding));
    }

    #[test]
    fn duplicate_vectors_normalize_like_a_single_one() {
        let v = vec![0.2, -1.4, 3.3, 0.05];
        let single = aggregate_embeddings(&[v.clone()]).unwrap();
        let doubled = aggregate_embeddings(&[v.clone(), v]).unwrap();
        for (a, b) in single.iter().zip(&doubled) {
            assert!((a - b).abs() < EPS);
        }
        assert!((l2_norm(&single) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn mean_is_taken_before_normalizing() {
        let out = aggregate_embeddings(&[vec![2.0, 0.0], vec![0.0, 2.0]]).unwrap();
        let expected = 1.0 / 2.0f32.sqrt();
        assert!((out[0] - expected).abs() < EPS);
        assert!((out[1] - expected).abs() < EPS);
    }

    #[test]
    fn cancelling_vectors_yield_zero_vector() {
        let out = aggregate_embeddings(&[vec![1.0, -1.0], vec![-1.0, 1.0]]).unwrap();
        assert_eq!(out, vec![0.0, 0.0]);
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let err = aggregate_embeddings(&[vec![1.0, 0.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, FaceAuthError::DimensionMismatch { expected: 2, found: 1 }));
    }
}
