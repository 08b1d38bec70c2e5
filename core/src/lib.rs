use serde::{Deserialize, Serialize};

pub mod autocomplete;
pub mod builder;
pub mod engine;
pub mod error;
pub mod forward;
pub mod inverted;
pub mod lexicon;
pub mod metadata;
pub mod persist;
pub mod search;
pub mod semantic;
pub mod tokenizer;

pub use builder::IndexBuilder;
pub use engine::SearchIndex;
pub use error::{IndexError, Result};
pub use forward::ForwardIndex;
pub use inverted::{InvertedIndex, BARREL_SIZE};
pub use lexicon::Lexicon;
pub use metadata::MetadataStore;
pub use semantic::{DocEmbeddings, SemanticIndex, WordEmbeddings, EMBEDDING_DIM};
pub use tokenizer::Tokenizer;

pub type TermId = u32;
pub type DocId = u32;

/// One `(term_id, frequency)` entry of a document's term list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermFreq {
    pub term_id: TermId,
    pub freq: u32,
}

impl TermFreq {
    pub fn new(term_id: TermId, freq: u32) -> Self {
        Self { term_id, freq }
    }
}

/// Display metadata for a document, keyed externally by its external id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocMeta {
    pub title: String,
    pub url: String,
}

/// A ranked result from either boolean or semantic retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub external_id: String,
    pub title: String,
    pub url: String,
    pub doc_id: DocId,
    /// TF sum for boolean search, cosine similarity for semantic search.
    pub score: f64,
}
