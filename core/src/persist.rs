use crate::error::{io_at, Result};
use crate::forward::ForwardIndex;
use crate::inverted::InvertedIndex;
use crate::lexicon::Lexicon;
use crate::metadata::MetadataStore;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 1;

/// Build manifest written next to the index files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub num_terms: u32,
    pub num_barrels: u32,
    pub created_at: String,
    pub version: u32,
    /// Entries in the lemma dictionary documents were tokenized with.
    #[serde(default)]
    pub lemma_count: usize,
}

/// File layout of an index directory.
#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn lexicon(&self) -> PathBuf { self.root.join("lexicon.csv") }
    pub fn forward(&self) -> PathBuf { self.root.join("forward_index.txt") }
    /// Barrel files are `{inverted_base}_barrel{N}.csv`.
    pub fn inverted_base(&self) -> PathBuf { self.root.join("inverted_index") }
    pub fn word_embeddings(&self) -> PathBuf { self.root.join("word_embeddings.bin") }
    pub fn doc_embeddings(&self) -> PathBuf { self.root.join("doc_embeddings.bin") }
    pub fn metadata(&self) -> PathBuf { self.root.join("metadata.csv") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    let path = paths.meta();
    create_dir_all(&paths.root).map_err(io_at(&paths.root))?;
    let mut f = File::create(&path).map_err(io_at(&path))?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes()).map_err(io_at(&path))?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let path = paths.meta();
    let mut f = File::open(&path).map_err(io_at(&path))?;
    let mut buf = String::new();
    f.read_to_string(&mut buf).map_err(io_at(&path))?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

/// Persist the three text structures, the metadata table and the manifest.
/// `lemma_count` is the size of the lemma dictionary used while indexing.
pub fn save_index(
    paths: &IndexPaths,
    lexicon: &Lexicon,
    forward: &ForwardIndex,
    inverted: &InvertedIndex,
    metadata: &MetadataStore,
    created_at: String,
    lemma_count: usize,
) -> Result<MetaFile> {
    create_dir_all(&paths.root).map_err(io_at(&paths.root))?;
    lexicon.save(&paths.lexicon())?;
    forward.save(&paths.forward())?;
    inverted.save(&paths.inverted_base())?;
    metadata.save_csv(&paths.metadata())?;
    let meta = MetaFile {
        num_docs: forward.len() as u32,
        num_terms: lexicon.len() as u32,
        num_barrels: inverted.num_barrels().max(1) as u32,
        created_at,
        version: FORMAT_VERSION,
        lemma_count,
    };
    save_meta(paths, &meta)?;
    Ok(meta)
}
