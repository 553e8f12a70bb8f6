//! Logit post-processing: classifier-free guidance and top-k sampling.

use rand::Rng;

use crate::{Error, Result};

/// Combine conditioned and unconditioned logits.
///
/// `pos + scale * (pos - neg)` elementwise. With `scale == 1.0` or no
/// negative logits, `pos` is returned unchanged.
pub fn apply_guidance(pos: Vec<f32>, neg: Option<&[f32]>, scale: f32) -> Result<Vec<f32>> {
    let Some(neg) = neg else {
        return Ok(pos);
    };
    if scale == 1.0 {
        return Ok(pos);
    }
    if neg.len() != pos.len() {
        return Err(Error::Inference(format!(
            "guidance logits length mismatch: positive {}, negative {}",
            pos.len(),
            neg.len()
        )));
    }
    Ok(pos
        .iter()
        .zip(neg)
        .map(|(&p, &n)| p + scale * (p - n))
        .collect())
}

/// Indices of the `k` largest logits, highest first. Equal logits keep index order.
pub fn top_k_indices(logits: &[f32], k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..logits.len()).collect();
    indices.sort_by(|&a, &b| logits[b].total_cmp(&logits[a]));
    indices.truncate(k);
    indices
}

/// Draw one token from the `k` highest logits.
///
/// Softmax over the kept logits (max-subtracted), one uniform draw in
/// `[0, 1)`, then a walk down the ranked candidates until the cumulative mass
/// exceeds the draw. If rounding leaves the draw uncovered the top candidate
/// is returned. NaN or `+inf` logits, or a top logit of `-inf`, are an
/// inference error.
pub fn sample_top_k<R: Rng>(logits: &[f32], k: usize, rng: &mut R) -> Result<u32> {
    if logits.is_empty() {
        return Err(Error::Inference("decoder returned empty logits".into()));
    }
    if k == 0 {
        return Err(Error::Config("top_k must be > 0".into()));
    }
    if let Some(index) = logits.iter().position(|l| l.is_nan()) {
        return Err(Error::Inference(format!("decoder returned NaN logit at {index}")));
    }

    let top = top_k_indices(logits, k);
    let max_logit = logits[top[0]];
    if !max_logit.is_finite() {
        return Err(Error::Inference(format!("top logit is not finite: {max_logit}")));
    }
    let weights: Vec<f32> = top.iter().map(|&i| (logits[i] - max_logit).exp()).collect();
    let sum: f32 = weights.iter().sum();

    let r: f32 = rng.random();
    let mut cumulative = 0.0f32;
    for (&index, &weight) in top.iter().zip(&weights) {
        cumulative += weight / sum;
        if r < cumulative {
            return Ok(index as u32);
        }
    }
    Ok(top[0] as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_guidance_identity_at_scale_one() {
        let pos = vec![0.5, -1.0, 2.0];
        let neg = vec![9.0, 9.0, 9.0];
        assert_eq!(apply_guidance(pos.clone(), Some(neg.as_slice()), 1.0).unwrap(), pos);
    }

    #[test]
    fn test_guidance_without_negative() {
        let pos = vec![0.5, -1.0];
        assert_eq!(apply_guidance(pos.clone(), None, 3.0).unwrap(), pos);
    }

    #[test]
    fn test_guidance_extrapolates() {
        let out = apply_guidance(vec![2.0, 1.0], Some(&[1.0, 1.0][..]), 3.0).unwrap();
        // 2 + 3 * (2 - 1) = 5, 1 + 3 * 0 = 1
        assert_eq!(out, vec![5.0, 1.0]);
    }

    #[test]
    fn test_guidance_length_mismatch() {
        assert!(apply_guidance(vec![1.0, 2.0], Some(&[1.0][..]), 2.0).is_err());
    }

    #[test]
    fn test_top_k_indices_order() {
        let logits = [0.1, 3.0, -2.0, 3.0, 1.0];
        assert_eq!(top_k_indices(&logits, 3), vec![1, 3, 4]);
        assert_eq!(top_k_indices(&logits, 10).len(), 5);
    }

    #[test]
    fn test_top_1_is_argmax() {
        let logits = [0.3, -1.0, 4.5, 4.4, 0.0];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        for _ in 0..200 {
            assert_eq!(sample_top_k(&logits, 1, &mut rng).unwrap(), 2);
        }
    }

    #[test]
    fn test_samples_stay_in_top_k() {
        let logits = [5.0, 4.9, -10.0, 4.8, -10.0, -3.0];
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..500 {
            let token = sample_top_k(&logits, 3, &mut rng).unwrap();
            assert!([0, 1, 3].contains(&token), "sampled {token}");
        }
    }

    #[test]
    fn test_dominant_logit_almost_always_wins() {
        let logits = [0.0, 50.0, 0.0, 0.0];
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let hits = (0..100)
            .filter(|_| sample_top_k(&logits, 4, &mut rng).unwrap() == 1)
            .count();
        assert_eq!(hits, 100);
    }

    #[test]
    fn test_seeded_sampling_reproducible() {
        let logits = [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        let draw = |seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            (0..32)
                .map(|_| sample_top_k(&logits, 8, &mut rng).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(draw(11), draw(11));
    }

    #[test]
    fn test_large_logits_stay_finite() {
        let logits = [1e30, 1e30 - 1.0, -1e30];
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let token = sample_top_k(&logits, 2, &mut rng).unwrap();
        assert!(token < 2);
    }

    /// Every draw is the largest f32 below 1.0.
    struct MaxRng;

    impl rand::RngCore for MaxRng {
        fn next_u32(&mut self) -> u32 {
            u32::MAX
        }

        fn next_u64(&mut self) -> u64 {
            u64::MAX
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0xff);
        }
    }

    #[test]
    fn test_uncovered_draw_falls_back_to_top_candidate() {
        // Rounded cumulative mass stays below the draw, so no candidate is hit.
        let logits = [0.0, -0.37, -0.74];
        let r: f32 = MaxRng.random();
        assert!(r > 0.9999999);
        assert_eq!(sample_top_k(&logits, 3, &mut MaxRng).unwrap(), 0);
    }

    #[test]
    fn test_nan_logits_rejected() {
        let mut logits = vec![0.5f32; 4096];
        for l in logits.iter_mut().step_by(3) {
            *l = f32::NAN;
        }
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(matches!(
            sample_top_k(&logits, 8, &mut rng),
            Err(Error::Inference(_))
        ));
    }

    #[test]
    fn test_non_finite_top_logit_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(sample_top_k(&[0.0, f32::INFINITY], 2, &mut rng).is_err());
        assert!(sample_top_k(&[f32::NEG_INFINITY; 3], 2, &mut rng).is_err());
        // A masked -inf entry outside the top candidates is fine.
        assert_eq!(sample_top_k(&[f32::NEG_INFINITY, 3.0], 1, &mut rng).unwrap(), 1);
    }

    #[test]
    fn test_empty_logits_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(sample_top_k(&[], 8, &mut rng).is_err());
        assert!(sample_top_k(&[1.0], 0, &mut rng).is_err());
    }
}
