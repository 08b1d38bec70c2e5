use crate::autocomplete;
use crate::error::{IndexError, Result};
use crate::forward::ForwardIndex;
use crate::inverted::InvertedIndex;
use crate::lexicon::Lexicon;
use crate::metadata::MetadataStore;
use crate::persist::IndexPaths;
use crate::search::BooleanSearcher;
use crate::semantic::{DocEmbeddings, SemanticIndex, WordEmbeddings, EMBEDDING_DIM};
use crate::tokenizer::Tokenizer;
use crate::SearchHit;

/// Everything needed to answer queries, loaded once and then read-only.
#[derive(Debug, Clone)]
pub struct SearchIndex {
    pub lexicon: Lexicon,
    pub forward: ForwardIndex,
    pub inverted: InvertedIndex,
    pub metadata: MetadataStore,
    pub tokenizer: Tokenizer,
    pub semantic: Option<SemanticIndex>,
}

impl SearchIndex {
    pub fn new(lexicon: Lexicon, forward: ForwardIndex, inverted: InvertedIndex) -> Self {
        Self {
            lexicon,
            forward,
            inverted,
            metadata: MetadataStore::new(),
            tokenizer: Tokenizer::new(),
            semantic: None,
        }
    }

    pub fn with_metadata(mut self, metadata: MetadataStore) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: Tokenizer) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    pub fn with_semantic(mut self, semantic: SemanticIndex) -> Self {
        self.semantic = Some(semantic);
        self
    }

    /// Load every structure from an index directory.
    ///
    /// Lexicon, forward index and barrel 0 are mandatory. The metadata table
    /// and the embedding caches are optional. The two caches come as a pair:
    /// one without the other, or a cache that fails to load, is an error.
    pub fn load(paths: &IndexPaths) -> Result<Self> {
        let lexicon = Lexicon::load(&paths.lexicon())?;
        let forward = ForwardIndex::load(&paths.forward())?;
        let inverted = InvertedIndex::load(&paths.inverted_base())?;
        let mut index = SearchIndex::new(lexicon, forward, inverted);

        let metadata_path = paths.metadata();
        if metadata_path.is_file() {
            index.metadata = MetadataStore::load_csv(&metadata_path)?;
        } else {
            tracing::warn!(path = %metadata_path.display(), "no metadata table; titles and urls will be empty");
        }

        let (words_path, docs_path) = (paths.word_embeddings(), paths.doc_embeddings());
        match (words_path.is_file(), docs_path.is_file()) {
            (true, true) => {
                let words = WordEmbeddings::load_binary(&words_path, EMBEDDING_DIM)?;
                let docs = DocEmbeddings::load_binary(&docs_path, EMBEDDING_DIM)?;
                index.semantic = Some(SemanticIndex::new(words, docs));
            }
            (false, false) => {
                tracing::warn!(root = %paths.root.display(), "embedding caches not found; semantic search disabled");
            }
            (words_present, _) => {
                let missing = if words_present { docs_path } else { words_path };
                return Err(IndexError::Io {
                    path: missing,
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "embedding cache pair is incomplete"),
                });
            }
        }
        Ok(index)
    }

    pub fn searcher(&self) -> BooleanSearcher<'_> {
        BooleanSearcher::new(&self.lexicon, &self.forward, &self.inverted, &self.metadata)
    }

    pub fn search(&self, query: &str, top_k: usize) -> Vec<SearchHit> {
        self.search_tokens(&self.tokenizer.tokenize(query), top_k)
    }

    pub fn search_tokens<S: AsRef<str>>(&self, tokens: &[S], top_k: usize) -> Vec<SearchHit> {
        self.searcher().search(tokens, top_k)
    }

    pub fn semantic_search(&self, query: &str, top_k: usize) -> Vec<SearchHit> {
        self.semantic_search_tokens(&self.tokenizer.tokenize(query), top_k)
    }

    /// Empty when embedding caches were not loaded.
    pub fn semantic_search_tokens<S: AsRef<str>>(&self, tokens: &[S], top_k: usize) -> Vec<SearchHit> {
        match &self.semantic {
            Some(semantic) => semantic.search(tokens, &self.forward, &self.metadata, top_k),
            None => Vec::new(),
        }
    }

    pub fn suggest(&self, prefix: &str, top_k: usize) -> Vec<String> {
        autocomplete::suggest(&self.lexicon, prefix, top_k)
    }

    pub fn has_semantic(&self) -> bool {
        self.semantic.is_some()
    }
}
