//! Streaming byte-sequence -> token-sequence mappings
//!
//! All tokenizers share one signature so the counting passes can run over
//! byte n-grams, whitespace words, or the matches of a compiled scanner.

pub mod ngram;
pub mod sample;

pub use ngram::NGramTokenizer;
pub use sample::WindowSampler;

/// Maps a byte string to the tokens it contains
pub trait Tokenizer: Send + Sync {
    fn tokenize<'a>(&'a self, text: &'a [u8]) -> Box<dyn Iterator<Item = &'a [u8]> + 'a>;
}

/// Splits on ASCII whitespace and yields the non-empty words
#[derive(Debug, Clone, Copy, Default)]
pub struct WordTokenizer;

impl Tokenizer for WordTokenizer {
    fn tokenize<'a>(&'a self, text: &'a [u8]) -> Box<dyn Iterator<Item = &'a [u8]> + 'a> {
        Box::new(text.split(|b| b.is_ascii_whitespace()).filter(|w| !w.is_empty()))
    }
}
