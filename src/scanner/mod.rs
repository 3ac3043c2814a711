//! Aho-Corasick byte scanner
//!
//! The automaton is a flat `nextmove` table with 256 columns per state and a
//! packed state -> feature-id output table. Every input byte triggers exactly
//! one transition, so a scan is `O(L)`.
//!
//! Outputs are propagated along failure links, so overlapping matches are all
//! reported: scanning `aaa` against `{aa}` yields two matches.

pub mod builder;


use serde::{Deserialize, Serialize};

use crate::{
    error::{LangIdError, Result},
    frequency::FeatureFrequency,
    tokenizer::Tokenizer,
    Feature,
};

pub use builder::build_scanner;

/// Storage width of the `nextmove` table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateWidth {
    U16,
    U32,
}

/// Transition table, narrowest width that holds every state id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NextMove {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl NextMove {
    pub fn len(&self) -> usize {
        match self {
            NextMove::U16(t) => t.len(),
            NextMove::U32(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn width(&self) -> StateWidth {
        match self {
            NextMove::U16(_) => StateWidth::U16,
            NextMove::U32(_) => StateWidth::U32,
        }
    }

    fn max_state(&self) -> Option<u32> {
        match self {
            NextMove::U16(t) => t.iter().max().map(|&s| s as u32),
            NextMove::U32(t) => t.iter().max().copied(),
        }
    }
}

/// Feature ids emitted on entering each state, as two packed arrays
///
/// The ids of state `s` are `ids[offsets[s]..offsets[s + 1]]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateOutput {
    offsets: Vec<u32>,
    ids: Vec<u32>,
}

impl StateOutput {
    /// Pack one id list per state
    pub fn from_sets(sets: &[Vec<u32>]) -> Self {
        let mut offsets = Vec::with_capacity(sets.len() + 1);
        let mut ids = Vec::with_capacity(sets.iter().map(Vec::len).sum());
        offsets.push(0);
        for set in sets {
            ids.extend_from_slice(set);
            offsets.push(ids.len() as u32);
        }
        Self { offsets, ids }
    }

    #[inline]
    pub fn get(&self, state: u32) -> &[u32] {
        let s = state as usize;
        match (self.offsets.get(s), self.offsets.get(s + 1)) {
            (Some(&lo), Some(&hi)) => &self.ids[lo as usize..hi as usize],
            _ => &[],
        }
    }

    /// States with at least one emission
    pub fn entries(&self) -> impl Iterator<Item = (u32, &[u32])> {
        (0..self.offsets.len().saturating_sub(1) as u32)
            .map(move |s| (s, self.get(s)))
            .filter(|(_, ids)| !ids.is_empty())
    }

    pub fn max_id(&self) -> Option<u32> {
        self.ids.iter().max().copied()
    }

    fn check(&self, num_states: usize) -> Result<()> {
        if self.offsets.len() != num_states + 1 {
            return Err(LangIdError::model(format!(
                "state output covers {} states, automaton has {num_states}",
                self.offsets.len().saturating_sub(1)
            )));
        }
        let monotone = self.offsets.windows(2).all(|w| w[0] <= w[1]);
        if !monotone || self.offsets.first() != Some(&0) || self.offsets.last().map(|&o| o as usize) != Some(self.ids.len()) {
            return Err(LangIdError::model("malformed state output offsets"));
        }
        Ok(())
    }
}

/// A compiled, read-only scanner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scanner {
    nextmove: NextMove,
    output: StateOutput,
}

impl Scanner {
    /// Assemble a scanner from its tables, checking their shapes
    pub fn from_parts(nextmove: NextMove, output: StateOutput) -> Result<Self> {
        if nextmove.is_empty() || nextmove.len() % 256 != 0 {
            return Err(LangIdError::model(format!(
                "nextmove length {} is not a positive multiple of 256",
                nextmove.len()
            )));
        }
        let num_states = nextmove.len() / 256;
        if nextmove.max_state().map_or(false, |s| s as usize >= num_states) {
            return Err(LangIdError::model("nextmove points past the last state"));
        }
        output.check(num_states)?;
        Ok(Self { nextmove, output })
    }

    pub fn num_states(&self) -> usize {
        self.nextmove.len() / 256
    }

    pub fn width(&self) -> StateWidth {
        self.nextmove.width()
    }

    pub fn nextmove(&self) -> &NextMove {
        &self.nextmove
    }

    pub fn state_output(&self) -> &StateOutput {
        &self.output
    }

    /// Next state after reading `byte` in `state`
    #[inline]
    pub fn step(&self, state: u32, byte: u8) -> u32 {
        let idx = ((state as usize) << 8) | byte as usize;
        match &self.nextmove {
            NextMove::U16(t) => t[idx] as u32,
            NextMove::U32(t) => t[idx],
        }
    }

    /// Feature ids emitted on entering `state`
    #[inline]
    pub fn outputs(&self, state: u32) -> &[u32] {
        self.output.get(state)
    }

    /// Feature ids in the order their matches complete
    pub fn matches<'s, 't>(&'s self, text: &'t [u8]) -> Matches<'s, 't> {
        Matches { scanner: self, text, pos: 0, state: 0, pending: &[] }
    }

    /// How many times each state is entered while scanning `text`, indexed
    /// by state
    pub fn state_visits(&self, text: &[u8]) -> Vec<u32> {
        fn walk<W: Copy + Into<u32>>(table: &[W], text: &[u8], visits: &mut [u32]) {
            let mut state = 0u32;
            for &b in text {
                state = table[((state as usize) << 8) | b as usize].into();
                visits[state as usize] += 1;
            }
        }
        let mut visits = vec![0u32; self.num_states()];
        match &self.nextmove {
            NextMove::U16(t) => walk(t, text, &mut visits),
            NextMove::U32(t) => walk(t, text, &mut visits),
        }
        visits
    }

    /// Visited states with their visit counts, in state order
    fn visited(&self, text: &[u8]) -> impl Iterator<Item = (u32, u32)> {
        self.state_visits(text)
            .into_iter()
            .enumerate()
            .filter(|&(_, n)| n > 0)
            .map(|(state, n)| (state as u32, n))
    }

    /// Occurrence count per feature id, overlapping matches included
    pub fn count_features(&self, text: &[u8]) -> FeatureFrequency<u32> {
        let mut freq = FeatureFrequency::with_ids();
        for (state, n) in self.visited(text) {
            for &id in self.outputs(state) {
                freq.add_id(id, n);
            }
        }
        freq
    }

    /// Dense count vector of length `num_features`
    pub fn feature_vector(&self, text: &[u8], num_features: usize) -> Vec<u32> {
        let mut v = vec![0u32; num_features];
        for (state, n) in self.visited(text) {
            for &id in self.outputs(state) {
                if let Some(slot) = v.get_mut(id as usize) {
                    *slot += n;
                }
            }
        }
        v
    }
}

/// Iterator over the feature ids matched in a text
pub struct Matches<'s, 't> {
    scanner: &'s Scanner,
    text: &'t [u8],
    pos: usize,
    state: u32,
    pending: &'s [u32],
}

impl<'s, 't> Iterator for Matches<'s, 't> {
    type Item = u32;

    #[inline]
    fn next(&mut self) -> Option<u32> {
        loop {
            if let Some((&id, rest)) = self.pending.split_first() {
                self.pending = rest;
                return Some(id);
            }
            let &b = self.text.get(self.pos)?;
            self.pos += 1;
            self.state = self.scanner.step(self.state, b);
            self.pending = self.scanner.outputs(self.state);
        }
    }
}

/// A scanner together with the feature strings its ids refer to
///
/// Used as the tokenizer of the second and third passes, where matches are
/// needed as byte strings.
#[derive(Debug, Clone)]
pub struct FeatureScanner {
    scanner: Scanner,
    features: Vec<Feature>,
}

impl FeatureScanner {
    pub fn build(features: Vec<Feature>) -> Result<Self> {
        let scanner = build_scanner(&features)?;
        Ok(Self { scanner, features })
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn into_parts(self) -> (Scanner, Vec<Feature>) {
        (self.scanner, self.features)
    }
}

impl Tokenizer for FeatureScanner {
    fn tokenize<'a>(&'a self, text: &'a [u8]) -> Box<dyn Iterator<Item = &'a [u8]> + 'a> {
        Box::new(self.scanner.matches(text).map(move |id| &*self.features[id as usize]))
    }
}
