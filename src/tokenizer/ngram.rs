use crate::error::{LangIdError, Result};

use super::Tokenizer;

/// Overlapping byte n-grams of every order in `[min_order, max_order]`
///
/// An input of length `L` yields `Σ_o max(0, L - o + 1)` slices, position
/// by position, shortest order first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NGramTokenizer {
    min_order: usize,
    max_order: usize,
}

impl NGramTokenizer {
    pub fn new(min_order: usize, max_order: usize) -> Result<Self> {
        if min_order == 0 || min_order > max_order {
            return Err(LangIdError::config(format!(
                "invalid n-gram order range [{min_order}, {max_order}]"
            )));
        }
        Ok(Self { min_order, max_order })
    }

    pub fn min_order(&self) -> usize {
        self.min_order
    }

    pub fn max_order(&self) -> usize {
        self.max_order
    }

    /// Number of slices produced for an input of `len` bytes
    pub fn count_for(&self, len: usize) -> usize {
        (self.min_order..=self.max_order)
            .map(|o| (len + 1).saturating_sub(o))
            .sum()
    }
}

/// Iterator state: the next start position and the next order to emit there
pub struct NGrams<'a> {
    text: &'a [u8],
    pos: usize,
    order: usize,
    min_order: usize,
    max_order: usize,
}

impl<'a> Iterator for NGrams<'a> {
    type Item = &'a [u8];

    #[inline]
    fn next(&mut self) -> Option<&'a [u8]> {
        while self.pos < self.text.len() {
            if self.order <= self.max_order && self.pos + self.order <= self.text.len() {
                let gram = &self.text[self.pos..self.pos + self.order];
                self.order += 1;
                return Some(gram);
            }
            self.pos += 1;
            self.order = self.min_order;
        }
        None
    }
}

impl Tokenizer for NGramTokenizer {
    fn tokenize<'a>(&'a self, text: &'a [u8]) -> Box<dyn Iterator<Item = &'a [u8]> + 'a> {
        Box::new(NGrams {
            text,
            pos: 0,
            order: self.min_order,
            min_order: self.min_order,
            max_order: self.max_order,
        })
    }
}
