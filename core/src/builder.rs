use crate::forward::ForwardIndex;
use crate::inverted::InvertedIndex;
use crate::lexicon::Lexicon;
use crate::{DocId, TermFreq};
use std::collections::HashMap;

/// Single-pass ingestion: feeds the lexicon and forward index together,
/// one document at a time, then freezes them and builds the inverted index.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    lexicon: Lexicon,
    forward: ForwardIndex,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count token occurrences, add each distinct word to the lexicon once
    /// with its count, and register the resulting term map.
    ///
    /// New words receive term ids in order of first occurrence.
    pub fn add_document<S: AsRef<str>>(&mut self, external_id: &str, tokens: &[S]) -> DocId {
        let mut order: Vec<&str> = Vec::new();
        let mut counts: HashMap<&str, u32> = HashMap::new();
        for token in tokens {
            let token = token.as_ref();
            let count = counts.entry(token).or_insert(0);
            if *count == 0 {
                order.push(token);
            }
            *count += 1;
        }

        let terms: Vec<TermFreq> = order
            .into_iter()
            .map(|word| {
                let freq = counts[word];
                TermFreq::new(self.lexicon.add(word, u64::from(freq)), freq)
            })
            .collect();
        self.forward.register_document(external_id, terms)
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub fn forward(&self) -> &ForwardIndex {
        &self.forward
    }

    pub fn num_docs(&self) -> usize {
        self.forward.len()
    }

    /// Stop ingestion and build the inverted index from the frozen forward index.
    pub fn finish(self) -> (Lexicon, ForwardIndex, InvertedIndex) {
        let inverted = InvertedIndex::build(&self.forward);
        tracing::info!(
            docs = self.forward.len(),
            words = self.lexicon.len(),
            postings_terms = inverted.num_terms(),
            "index build finished"
        );
        (self.lexicon, self.forward, inverted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_feed_lexicon_and_forward_index() {
        let mut builder = IndexBuilder::new();
        let a = builder.add_document("A", &["fever", "cough", "fever"]);
        let b = builder.add_document("B", &["cough", "cough", "cough", "fever"]);
        let (lex, fwd, inv) = builder.finish();

        assert_eq!((a, b), (0, 1));
        assert_eq!(lex.id_of("fever"), Some(0));
        assert_eq!(lex.id_of("cough"), Some(1));
        assert_eq!(lex.frequency_of("fever"), 3);
        assert_eq!(lex.frequency_of("cough"), 4);
        assert_eq!(fwd.terms_of(a).unwrap(), &[TermFreq::new(0, 2), TermFreq::new(1, 1)]);
        assert_eq!(fwd.terms_of(b).unwrap(), &[TermFreq::new(0, 1), TermFreq::new(1, 3)]);
        assert_eq!(inv.posting_list(0), Some(&[0, 1][..]));
    }

    #[test]
    fn empty_document_still_gets_an_id() {
        let mut builder = IndexBuilder::new();
        let id = builder.add_document::<&str>("empty", &[]);
        assert_eq!(id, 0);
        assert!(builder.forward().terms_of(id).unwrap().is_empty());
    }
}
