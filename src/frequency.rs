use std::hash::Hash;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Occurrence counts of the features of one document
///
/// Keys keep first-seen order, so iteration is deterministic for a given
/// token stream.
///
/// # Examples
/// ```
/// use ngram_langid::FeatureFrequency;
/// let mut freq = FeatureFrequency::new();
/// let tokens: [&[u8]; 3] = [b"ab", b"b", b"ab"];
/// freq.add_tokens(tokens);
/// assert_eq!(freq.token_count(b"ab"), 2);
/// assert_eq!(freq.token_total_count(), 3);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(bound(serialize = "K: Serialize", deserialize = "K: Deserialize<'de>"))]
pub struct FeatureFrequency<K = Box<[u8]>>
where
    K: Hash + Eq,
{
    #[serde(with = "indexmap::map::serde_seq")]
    token_count: IndexMap<K, u32>,
    total_token_count: u64,
}

impl FeatureFrequency<Box<[u8]>> {
    pub fn new() -> Self {
        Self {
            token_count: IndexMap::new(),
            total_token_count: 0,
        }
    }

    /// Add one occurrence of a byte token
    #[inline]
    pub fn add_token(&mut self, token: &[u8]) -> &mut Self {
        match self.token_count.get_mut(token) {
            Some(count) => *count += 1,
            None => {
                self.token_count.insert(token.into(), 1);
            }
        }
        self.total_token_count += 1;
        self
    }

    /// Add every token of an iterator
    #[inline]
    pub fn add_tokens<'a, I>(&mut self, tokens: I) -> &mut Self
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        for token in tokens {
            self.add_token(token);
        }
        self
    }

    /// Occurrences of `token`
    #[inline]
    pub fn token_count(&self, token: &[u8]) -> u32 {
        self.token_count.get(token).copied().unwrap_or(0)
    }
}

impl FeatureFrequency<u32> {
    /// Counter keyed by feature id
    pub fn with_ids() -> Self {
        Self {
            token_count: IndexMap::new(),
            total_token_count: 0,
        }
    }

    #[inline]
    pub fn add_id(&mut self, id: u32, n: u32) -> &mut Self {
        *self.token_count.entry(id).or_insert(0) += n;
        self.total_token_count += n as u64;
        self
    }

    #[inline]
    pub fn id_count(&self, id: u32) -> u32 {
        self.token_count.get(&id).copied().unwrap_or(0)
    }
}

impl<K> FeatureFrequency<K>
where
    K: Hash + Eq,
{
    /// Sum of all counts
    #[inline]
    pub fn token_total_count(&self) -> u64 {
        self.total_token_count
    }

    /// Number of distinct tokens
    #[inline]
    pub fn token_num(&self) -> usize {
        self.token_count.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.token_count.is_empty()
    }

    /// (token, count) in first-seen order
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&K, u32)> {
        self.token_count.iter().map(|(k, &c)| (k, c))
    }

    /// Collapse counts to presence, for document frequency
    pub fn into_presence(mut self) -> Self {
        self.token_count.values_mut().for_each(|c| *c = 1);
        self.total_token_count = self.token_count.len() as u64;
        self
    }

    /// Merge another counter into this one
    pub fn merge(&mut self, other: FeatureFrequency<K>) -> &mut Self {
        for (token, count) in other.token_count {
            *self.token_count.entry(token).or_insert(0) += count;
        }
        self.total_token_count += other.total_token_count;
        self
    }

    pub fn clear(&mut self) {
        self.token_count.clear();
        self.total_token_count = 0;
    }
}

/// feature -> event id -> count, accumulated by one worker over one chunk
///
/// Events are language ids or domain ids.
#[derive(Debug, Clone, Default)]
pub struct EventCounts {
    counts: IndexMap<Box<[u8]>, IndexMap<u32, u32>>,
}

impl EventCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one document's counts under `event`
    pub fn add_document(&mut self, freq: &FeatureFrequency, event: u32) {
        for (token, count) in freq.iter() {
            let idx = match self.counts.get_index_of(&**token) {
                Some(idx) => idx,
                None => self.counts.insert_full(token.clone(), IndexMap::new()).0,
            };
            *self.counts[idx].entry(event).or_insert(0) += count;
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// (feature, event, count) triples in insertion order
    pub fn triples(&self) -> impl Iterator<Item = (&[u8], u32, u32)> {
        self.counts
            .iter()
            .flat_map(|(f, events)| events.iter().map(move |(&e, &c)| (&**f, e, c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_totals() {
        let mut freq = FeatureFrequency::new();
        freq.add_token(b"a").add_token(b"b").add_token(b"a");
        assert_eq!(freq.token_count(b"a"), 2);
        assert_eq!(freq.token_count(b"zz"), 0);
        assert_eq!(freq.token_total_count(), 3);
        assert_eq!(freq.token_num(), 2);
        let keys: Vec<&[u8]> = freq.iter().map(|(k, _)| &**k).collect();
        let expected: Vec<&[u8]> = vec![b"a", b"b"];
        assert_eq!(keys, expected);
    }

    #[test]
    fn cbor_keeps_order_and_totals() {
        let mut ids = FeatureFrequency::with_ids();
        ids.add_id(7, 2).add_id(3, 1);
        let bytes = serde_cbor::to_vec(&ids).unwrap();
        let back: FeatureFrequency<u32> = serde_cbor::from_slice(&bytes).unwrap();
        assert_eq!(back, ids);
        assert_eq!(back.iter().map(|(&k, _)| k).collect::<Vec<_>>(), vec![7, 3]);

        let mut bytes_keyed = FeatureFrequency::new();
        bytes_keyed.add_token(b"ab").add_token(b"ab");
        let back: FeatureFrequency =
            serde_cbor::from_slice(&serde_cbor::to_vec(&bytes_keyed).unwrap()).unwrap();
        assert_eq!(back.token_count(b"ab"), 2);
        assert_eq!(back.token_total_count(), 2);
    }

    #[test]
    fn presence_collapses_counts() {
        let mut freq = FeatureFrequency::new();
        let tokens: [&[u8]; 3] = [b"x", b"x", b"y"];
        freq.add_tokens(tokens);
        let df = freq.into_presence();
        assert_eq!(df.token_count(b"x"), 1);
        assert_eq!(df.token_total_count(), 2);
    }

    #[test]
    fn merge_sums() {
        let mut a = FeatureFrequency::new();
        a.add_token(b"x");
        let mut b = FeatureFrequency::new();
        let tokens: [&[u8]; 2] = [b"x", b"y"];
        b.add_tokens(tokens);
        a.merge(b);
        assert_eq!(a.token_count(b"x"), 2);
        assert_eq!(a.token_count(b"y"), 1);
        assert_eq!(a.token_total_count(), 3);
    }

    #[test]
    fn id_counter() {
        let mut freq = FeatureFrequency::with_ids();
        freq.add_id(4, 2).add_id(1, 1).add_id(4, 1);
        let pairs: Vec<(u32, u32)> = freq.iter().map(|(&k, c)| (k, c)).collect();
        assert_eq!(pairs, vec![(4, 3), (1, 1)]);
    }

    #[test]
    fn event_counts_accumulate() {
        let mut doc = FeatureFrequency::new();
        let tokens: [&[u8]; 3] = [b"a", b"a", b"b"];
        doc.add_tokens(tokens);
        let mut events = EventCounts::new();
        events.add_document(&doc, 0);
        events.add_document(&doc, 0);
        events.add_document(&doc.clone().into_presence(), 1);
        let triples: Vec<(Vec<u8>, u32, u32)> =
            events.triples().map(|(f, e, c)| (f.to_vec(), e, c)).collect();
        assert_eq!(
            triples,
            vec![
                (b"a".to_vec(), 0, 4),
                (b"a".to_vec(), 1, 1),
                (b"b".to_vec(), 0, 2),
                (b"b".to_vec(), 1, 1),
            ]
        );
    }
}
