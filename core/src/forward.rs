use crate::error::{io_at, malformed, Result};
use crate::{DocId, TermFreq, TermId};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct DocEntry {
    external_id: String,
    /// Sorted ascending by term_id, unique per term_id.
    terms: Vec<TermFreq>,
}

/// doc_id -> sorted `(term_id, frequency)` list, plus doc_id -> external id.
#[derive(Debug, Clone, Default)]
pub struct ForwardIndex {
    docs: BTreeMap<DocId, DocEntry>,
    next_id: DocId,
}

impl ForwardIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document and return its newly assigned doc_id.
    ///
    /// `terms` may arrive in any order. Entries repeating a term_id are
    /// merged by summing their frequencies.
    pub fn register_document<I>(&mut self, external_id: impl Into<String>, terms: I) -> DocId
    where
        I: IntoIterator<Item = TermFreq>,
    {
        let doc_id = self.next_id;
        self.next_id += 1;
        let terms = normalize_terms(terms.into_iter().collect());
        self.docs.insert(doc_id, DocEntry { external_id: external_id.into(), terms });
        doc_id
    }

    pub fn terms_of(&self, doc_id: DocId) -> Option<&[TermFreq]> {
        self.docs.get(&doc_id).map(|d| d.terms.as_slice())
    }

    pub fn external_id_of(&self, doc_id: DocId) -> Option<&str> {
        self.docs.get(&doc_id).map(|d| d.external_id.as_str())
    }

    /// Frequency of `term_id` inside `doc_id` via binary search; 0 if either is absent.
    pub fn term_frequency(&self, doc_id: DocId, term_id: TermId) -> u32 {
        let Some(terms) = self.terms_of(doc_id) else { return 0 };
        match terms.binary_search_by_key(&term_id, |t| t.term_id) {
            Ok(pos) => terms[pos].freq,
            Err(_) => 0,
        }
    }

    /// Documents in ascending doc_id order.
    pub fn iter(&self) -> impl Iterator<Item = (DocId, &[TermFreq])> {
        self.docs.iter().map(|(id, d)| (*id, d.terms.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Total number of `(term_id, frequency)` entries across all documents.
    pub fn total_terms(&self) -> usize {
        self.docs.values().map(|d| d.terms.len()).sum()
    }

    /// Header line with the document count, then per document a
    /// `doc_id|external_id` line and a line of `term_id,frequency` tokens.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(io_at(path))?;
        let mut out = BufWriter::new(file);
        writeln!(out, "{}", self.docs.len()).map_err(io_at(path))?;
        for (doc_id, entry) in &self.docs {
            writeln!(out, "{doc_id}|{}", entry.external_id).map_err(io_at(path))?;
            let line = entry
                .terms
                .iter()
                .map(|t| format!("{},{}", t.term_id, t.freq))
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(out, "{line}").map_err(io_at(path))?;
        }
        out.flush().map_err(io_at(path))?;
        tracing::info!(path = %path.display(), docs = self.len(), terms = self.total_terms(), "saved forward index");
        Ok(())
    }

    /// Reload a forward index. The header count is informational only and
    /// term lists are re-sorted regardless of their on-disk order.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(io_at(path))?;
        let mut lines = BufReader::new(file).lines().enumerate();
        let mut index = ForwardIndex::new();

        // header: document count
        if let Some((_, header)) = lines.next() {
            header.map_err(io_at(path))?;
        }

        while let Some((idx, line)) = lines.next() {
            let line = line.map_err(io_at(path))?;
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let Some((id, external_id)) = line.split_once('|') else {
                tracing::warn!(path = %path.display(), line = idx + 1, "skipping line without doc_id|external_id");
                continue;
            };
            let doc_id: DocId = id
                .trim()
                .parse()
                .map_err(|_| malformed(path, idx + 1, format!("invalid doc_id {id:?}")))?;

            let terms = match lines.next() {
                Some((term_idx, term_line)) => parse_terms(&term_line.map_err(io_at(path))?)
                    .map_err(|reason| malformed(path, term_idx + 1, reason))?,
                None => Vec::new(),
            };

            if doc_id >= index.next_id {
                index.next_id = doc_id + 1;
            }
            index.docs.insert(
                doc_id,
                DocEntry { external_id: external_id.to_string(), terms: normalize_terms(terms) },
            );
        }
        tracing::info!(path = %path.display(), docs = index.len(), "loaded forward index");
        Ok(index)
    }
}

fn parse_terms(line: &str) -> std::result::Result<Vec<TermFreq>, String> {
    line.split_whitespace()
        .map(|token| {
            let (term, freq) = token
                .split_once(',')
                .ok_or_else(|| format!("expected term_id,frequency, found {token:?}"))?;
            let term_id = term.parse().map_err(|_| format!("invalid term_id in {token:?}"))?;
            let freq = freq.parse().map_err(|_| format!("invalid frequency in {token:?}"))?;
            Ok(TermFreq { term_id, freq })
        })
        .collect()
}

fn normalize_terms(mut terms: Vec<TermFreq>) -> Vec<TermFreq> {
    terms.sort_by_key(|t| t.term_id);
    let mut merged: Vec<TermFreq> = Vec::with_capacity(terms.len());
    for t in terms {
        match merged.last_mut() {
            Some(last) if last.term_id == t.term_id => last.freq += t.freq,
            _ => merged.push(t),
        }
    }
    merged
}
