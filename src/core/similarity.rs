/// Euclidean norm of `v`.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Divide every component by the vector's norm. A zero norm divides by 1,
/// leaving the all-zero vector in place.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    let divisor = if norm == 0.0 { 1.0 } else { norm };
    for x in v.iter_mut() {
        *x /= divisor;
    }
}

/// Cosine similarity in [-1, 1]. Mismatched lengths and zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    fn samples() -> Vec<Vec<f32>> {
        vec![
            vec![1.0, 0.0, 0.0],
            vec![0.3, -0.7, 2.5],
            vec![-4.0, 0.001, 9.0],
            vec![1e-3, 1e-3, -1e-3],
            vec![12.0, 7.0, -3.5],
        ]
    }

    #[test]
    fn self_similarity_is_one() {
        for v in samples() {
            assert!((cosine_similarity(&v, &v) - 1.0).abs() < EPS, "{:?}", v);
        }
    }

    #[test]
    fn zero_vector_scores_zero() {
        let zero = vec![0.0; 3];
        for v in samples() {
            assert_eq!(cosine_similarity(&v, &zero), 0.0);
            assert_eq!(cosine_similarity(&zero, &v), 0.0);
        }
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn symmetric_and_bounded() {
        let vs = samples();
        for a in &vs {
            for b in &vs {
                let ab = cosine_similarity(a, b);
                let ba = cosine_similarity(b, a);
                assert!((ab - ba).abs() < EPS);
                assert!((-1.0..=1.0).contains(&ab));
            }
        }
    }

    #[test]
    fn opposite_vectors_score_minus_one() {
        let a = vec![0.5, -2.0, 1.0];
        let b: Vec<f32> = a.iter().map(|x| -x).collect();
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < EPS);
    }

    #[test]
    fn mismatched_lengths_score_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn normalize_gives_unit_norm() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < EPS);
        assert!((v[1] - 0.8).abs() < EPS);
        assert!((l2_norm(&v) - 1.0).abs() < EPS);
    }

    #[test]
    fn normalize_leaves_zero_vector() {
        let mut v = vec![0.0; 4];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0; 4]);
    }
}
