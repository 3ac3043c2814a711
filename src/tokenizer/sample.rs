use rand::{seq::index, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Draws fixed-size windows from a document instead of tokenizing all of it
///
/// At most `count` start offsets are sampled without replacement from
/// `[0, max(1, L - size + 1))`, the last full window included. Each
/// document gets its own PRNG stream keyed by its position in the item list, so the draw does
/// not depend on how items are chunked across workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSampler {
    count: usize,
    size: usize,
    seed: u64,
}

impl WindowSampler {
    pub fn new(count: usize, size: usize, seed: u64) -> Self {
        Self { count, size, seed }
    }

    /// The windows of `text` for the document at `doc_index`
    pub fn windows<'a>(&self, text: &'a [u8], doc_index: u64) -> Vec<&'a [u8]> {
        let possible = (text.len() + 1).saturating_sub(self.size).max(1);
        let amount = possible.min(self.count);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(doc_index);
        let mut offsets = index::sample(&mut rng, possible, amount).into_vec();
        offsets.sort_unstable();
        offsets
            .into_iter()
            .map(|start| &text[start.min(text.len())..(start + self.size).min(text.len())])
            .collect()
    }
}
