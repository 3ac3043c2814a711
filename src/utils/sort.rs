use std::cmp::Ordering;

/// Descending by score, ties broken by key ascending
///
/// Scores are compared with `total_cmp`, so NaN never panics; callers
/// remove NaN beforehand when it must not rank.
#[inline]
pub fn score_desc_key_asc<K: Ord>(a: &(K, f64), b: &(K, f64)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

/// Keep the `k` best entries under [`score_desc_key_asc`], returned in rank order
pub fn top_k<K: Ord>(mut entries: Vec<(K, f64)>, k: usize) -> Vec<(K, f64)> {
    if k < entries.len() {
        entries.select_nth_unstable_by(k, score_desc_key_asc);
        entries.truncate(k);
    }
    entries.sort_unstable_by(score_desc_key_asc);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_break_on_key() {
        let entries = vec![("c", 1.0), ("a", 1.0), ("b", 2.0), ("d", 0.5)];
        let top = top_k(entries, 3);
        assert_eq!(top, vec![("b", 2.0), ("a", 1.0), ("c", 1.0)]);
    }

    #[test]
    fn k_larger_than_input() {
        let top = top_k(vec![(2u32, 1.0), (1u32, 1.0)], 10);
        assert_eq!(top, vec![(1, 1.0), (2, 1.0)]);
    }

    #[test]
    fn k_zero_is_empty() {
        assert!(top_k(vec![(1u8, 1.0)], 0).is_empty());
    }

    #[test]
    fn matches_full_sort() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(0x1234_5678);
        for &n in &[0usize, 1, 5, 31, 32, 33, 200] {
            let entries: Vec<(u32, f64)> = (0..n)
                .map(|i| (i as u32, rng.gen_range(0..17u32) as f64))
                .collect();
            let mut full = entries.clone();
            full.sort_by(score_desc_key_asc);
            for k in [0, 1, n / 2, n].into_iter().filter(|&k| k <= n) {
                assert_eq!(top_k(entries.clone(), k), full[..k].to_vec(), "n={n} k={k}");
            }
        }
    }
}
