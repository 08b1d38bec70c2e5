use crate::error::{io_at, malformed, Result};
use crate::TermId;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LexEntry {
    id: TermId,
    frequency: u64,
}

/// Word <-> term id <-> corpus frequency table.
///
/// Term ids are dense, assigned in first-seen order and never reused.
/// Frequencies only ever grow while the lexicon is being populated.
#[derive(Debug, Clone, Default)]
pub struct Lexicon {
    entries: HashMap<String, LexEntry>,
    next_id: TermId,
}

impl Lexicon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `count` more occurrences of `word` and return its term id.
    ///
    /// Unseen words get the next sequential id with frequency `count`;
    /// known words keep their id and accumulate the count.
    pub fn add(&mut self, word: &str, count: u64) -> TermId {
        if let Some(entry) = self.entries.get_mut(word) {
            entry.frequency += count;
            return entry.id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(word.to_string(), LexEntry { id, frequency: count });
        id
    }

    pub fn contains(&self, word: &str) -> bool {
        self.entries.contains_key(word)
    }

    pub fn id_of(&self, word: &str) -> Option<TermId> {
        self.entries.get(word).map(|e| e.id)
    }

    /// Global frequency of `word`, 0 when absent. Use [`Lexicon::contains`]
    /// to tell an absent word from one stored with a zero count.
    pub fn frequency_of(&self, word: &str) -> u64 {
        self.entries.get(word).map_or(0, |e| e.frequency)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Id the next unseen word will receive.
    pub fn next_id(&self) -> TermId {
        self.next_id
    }

    /// Iterate `(word, term_id, frequency)` in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, TermId, u64)> {
        self.entries.iter().map(|(w, e)| (w.as_str(), e.id, e.frequency))
    }

    /// Reverse mapping term_id -> word.
    pub fn id_to_word(&self) -> HashMap<TermId, &str> {
        self.entries.iter().map(|(w, e)| (e.id, w.as_str())).collect()
    }

    /// Entries sorted by descending frequency, ties broken by ascending id.
    pub fn by_frequency(&self) -> Vec<(&str, TermId, u64)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by(|a, b| b.2.cmp(&a.2).then(a.1.cmp(&b.1)));
        entries
    }

    pub fn top_words(&self, n: usize) -> Vec<(&str, TermId, u64)> {
        let mut entries = self.by_frequency();
        entries.truncate(n);
        entries
    }

    /// Write one `word,term_id,frequency` record per line, most frequent first.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(io_at(path))?;
        let mut out = BufWriter::new(file);
        for (word, id, freq) in self.by_frequency() {
            writeln!(out, "{word},{id},{freq}").map_err(io_at(path))?;
        }
        out.flush().map_err(io_at(path))?;
        tracing::info!(path = %path.display(), words = self.len(), "saved lexicon");
        Ok(())
    }

    /// Reload a lexicon written by [`Lexicon::save`].
    ///
    /// Record order and id gaps are irrelevant: the next assignable id is
    /// recomputed as `max(id) + 1`.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(io_at(path))?;
        let mut lexicon = Lexicon::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(io_at(path))?;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let (word, id, frequency) = parse_record(line)
                .ok_or_else(|| malformed(path, idx + 1, "expected word,term_id,frequency"))?;
            if id >= lexicon.next_id {
                lexicon.next_id = id + 1;
            }
            lexicon.entries.insert(word.to_string(), LexEntry { id, frequency });
        }
        tracing::info!(path = %path.display(), words = lexicon.len(), next_id = lexicon.next_id, "loaded lexicon");
        Ok(lexicon)
    }
}

// Split from the right so the word itself may contain commas.
fn parse_record(line: &str) -> Option<(&str, TermId, u64)> {
    let mut parts = line.rsplitn(3, ',');
    let frequency = parts.next()?.trim().parse().ok()?;
    let id = parts.next()?.trim().parse().ok()?;
    let word = parts.next()?;
    if word.is_empty() {
        return None;
    }
    Some((word, id, frequency))
}
