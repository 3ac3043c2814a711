use std::collections::{BTreeMap, HashMap, VecDeque};

use log::debug;
use num::FromPrimitive;

use crate::{
    error::{LangIdError, Result},
    Feature,
};

use super::{NextMove, Scanner, StateOutput};

/// Build a scanner over `features`; feature `i` is reported as id `i`
///
/// States are numbered breadth-first with children visited in byte order,
/// so a state's failure target always has a smaller id than the state.
pub fn build_scanner(features: &[Feature]) -> Result<Scanner> {
    let trie = Trie::from_features(features)?;
    let (goto, own) = trie.renumber_bfs();
    let num_states = goto.len();

    let mut nextmove = vec![0u32; num_states * 256];
    let mut fail = vec![0u32; num_states];
    let mut outputs: Vec<Vec<u32>> = Vec::with_capacity(num_states);

    for s in 0..num_states {
        let f = fail[s] as usize;
        let mut out: Vec<u32> = own[s].into_iter().collect();
        if s != 0 {
            out.extend_from_slice(&outputs[f]);
        }
        outputs.push(out);

        for a in 0..256usize {
            let idx = (s << 8) | a;
            match goto[s].get(&(a as u8)) {
                Some(&t) => {
                    nextmove[idx] = t;
                    fail[t as usize] = if s == 0 { 0 } else { nextmove[(f << 8) | a] };
                }
                None => {
                    nextmove[idx] = if s == 0 { 0 } else { nextmove[(f << 8) | a] };
                }
            }
        }
    }

    let nextmove = match narrow::<u16>(&nextmove, num_states) {
        Some(table) => NextMove::U16(table),
        None => NextMove::U32(nextmove),
    };
    debug!(
        "scanner: {} features, {} states, {:?} table",
        features.len(),
        num_states,
        nextmove.width()
    );
    Scanner::from_parts(nextmove, StateOutput::from_sets(&outputs))
}

/// Narrow the table when every state id fits in `W`
fn narrow<W: FromPrimitive>(table: &[u32], num_states: usize) -> Option<Vec<W>> {
    if num_states > u16::MAX as usize {
        return None;
    }
    table.iter().map(|&s| W::from_u32(s)).collect()
}

/// Plain goto trie in insertion order
struct Trie {
    children: Vec<BTreeMap<u8, usize>>,
    terminal: Vec<Option<u32>>,
}

impl Trie {
    fn from_features(features: &[Feature]) -> Result<Self> {
        if u32::try_from(features.len()).is_err() {
            return Err(LangIdError::config("too many features for one scanner"));
        }
        let mut seen: HashMap<&[u8], usize> = HashMap::with_capacity(features.len());
        let mut trie = Self {
            children: vec![BTreeMap::new()],
            terminal: vec![None],
        };
        for (id, feature) in features.iter().enumerate() {
            if feature.is_empty() {
                return Err(LangIdError::config(format!("feature {id} is empty")));
            }
            if let Some(first) = seen.insert(&**feature, id) {
                return Err(LangIdError::config(format!(
                    "feature {} duplicates feature {first}",
                    crate::utils::literal::to_literal(feature)
                )));
            }
            let mut node = 0;
            for &b in feature.iter() {
                node = match trie.children[node].get(&b) {
                    Some(&next) => next,
                    None => {
                        let next = trie.children.len();
                        trie.children.push(BTreeMap::new());
                        trie.terminal.push(None);
                        trie.children[node].insert(b, next);
                        next
                    }
                };
            }
            trie.terminal[node] = Some(id as u32);
        }
        Ok(trie)
    }

    /// Goto map and own output per state, renumbered breadth-first
    fn renumber_bfs(&self) -> (Vec<BTreeMap<u8, u32>>, Vec<Option<u32>>) {
        let n = self.children.len();
        let mut order = Vec::with_capacity(n);
        let mut new_id = vec![0u32; n];
        let mut queue = VecDeque::from([0usize]);
        while let Some(node) = queue.pop_front() {
            new_id[node] = order.len() as u32;
            order.push(node);
            queue.extend(self.children[node].values().copied());
        }
        let goto = order
            .iter()
            .map(|&old| {
                self.children[old]
                    .iter()
                    .map(|(&b, &child)| (b, new_id[child]))
                    .collect()
            })
            .collect();
        let own = order.iter().map(|&old| self.terminal[old]).collect();
        (goto, own)
    }
}
