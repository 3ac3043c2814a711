/// Entropy in nats of an unnormalised count vector
///
/// Computed as `ln(sum) - (Σ v ln v) / sum` with `0 ln 0 = 0`, which stays
/// accurate when `sum` is small. An empty or all-zero vector has entropy 0.
#[inline]
pub fn entropy(v: &[f64]) -> f64 {
    let sum: f64 = v.iter().sum();
    if !(sum > 0.0) {
        return 0.0;
    }
    let vlogv: f64 = v.iter().filter(|&&x| x > 0.0).map(|&x| x * x.ln()).sum();
    let r = sum.ln() - vlogv / sum;
    if r.is_nan() {
        0.0
    } else {
        r
    }
}

/// Turn log-space scores into a probability distribution
///
/// `p_i = 1 / Σ_j exp(s_j - s_i)`. A large exponent overflows to `inf` and
/// its reciprocal is 0, which is the right answer for that class. A class
/// scored `-inf` (no prior mass) gets 0.
pub fn norm_probs(scores: &[f64]) -> Vec<f64> {
    scores
        .iter()
        .map(|&si| {
            if si == f64::NEG_INFINITY {
                0.0
            } else {
                1.0 / scores.iter().map(|&sj| (sj - si).exp()).sum::<f64>()
            }
        })
        .collect()
}

/// Index of the first maximum, `None` on an empty slice
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, v) in values.iter().enumerate() {
        match best {
            Some(b) if values[b].total_cmp(v).is_ge() => {}
            _ => best = Some(i),
        }
    }
    best
}
