use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cordex_core::persist::{load_meta, save_index, IndexPaths};
use cordex_core::{
    DocEmbeddings, DocMeta, ForwardIndex, IndexBuilder, InvertedIndex, Lexicon, MetadataStore, Tokenizer,
    WordEmbeddings, EMBEDDING_DIM,
};
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct InputDoc {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
    url: Option<String>,
}

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build lexicon, forward/inverted indexes and embedding caches", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from input JSON/JSONL files or a directory
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
        /// Lemma dictionary with one `word lemma` pair per line
        #[arg(long)]
        lemmas: Option<String>,
        /// Stop after this many documents
        #[arg(long)]
        max_docs: Option<usize>,
    },
    /// Cache word vectors and build document embeddings for an existing index
    Embed {
        /// Index directory produced by `build`
        #[arg(long)]
        index: String,
        /// Word vectors: GloVe text format, or a binary cache ending in .bin
        #[arg(long)]
        vectors: String,
        /// Vector dimension
        #[arg(long, default_value_t = EMBEDDING_DIM)]
        dim: usize,
    },
    /// Log index statistics
    Stats {
        #[arg(long)]
        index: String,
        /// Number of most frequent words to show
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, lemmas, max_docs } => {
            build_index(&input, &output, lemmas.as_deref(), max_docs)
        }
        Commands::Embed { index, vectors, dim } => build_embeddings(&index, &vectors, dim),
        Commands::Stats { index, top } => show_stats(&index, top),
    }
}

struct Ingest {
    tokenizer: Tokenizer,
    builder: IndexBuilder,
    metadata: MetadataStore,
    max_docs: Option<usize>,
}

impl Ingest {
    fn full(&self) -> bool {
        self.max_docs.is_some_and(|max| self.builder.num_docs() >= max)
    }

    fn ingest_doc(&mut self, doc: InputDoc) {
        if self.full() {
            return;
        }
        let tokens = self.tokenizer.tokenize(&format!("{}\n{}", doc.title, doc.body));
        let doc_id = self.builder.add_document(&doc.id, &tokens);
        tracing::debug!(doc_id, external_id = %doc.id, tokens = tokens.len(), "ingested document");
        self.metadata.insert(doc.id, DocMeta { title: doc.title, url: doc.url.unwrap_or_default() });
    }

    fn index_jsonl(&mut self, file: &Path) -> Result<()> {
        let reader = BufReader::new(File::open(file)?);
        for (n, line) in reader.lines().enumerate() {
            if self.full() {
                break;
            }
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let doc: InputDoc = serde_json::from_str(&line)
                .with_context(|| format!("{}:{}", file.display(), n + 1))?;
            self.ingest_doc(doc);
        }
        Ok(())
    }

    fn index_json(&mut self, file: &Path) -> Result<()> {
        let reader = BufReader::new(File::open(file)?);
        let json: serde_json::Value = serde_json::from_reader(reader)?;
        match json {
            serde_json::Value::Array(arr) => {
                for v in arr {
                    let doc: InputDoc = serde_json::from_value(v)?;
                    self.ingest_doc(doc);
                }
            }
            serde_json::Value::Object(_) => {
                let doc: InputDoc = serde_json::from_value(json)?;
                self.ingest_doc(doc);
            }
            _ => tracing::warn!(file = %file.display(), "skipping JSON that is neither an object nor an array"),
        }
        Ok(())
    }
}

fn input_files(input_path: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
    } else if input_path.is_file() {
        files.push(input_path.to_path_buf());
    }
    files
}

fn build_index(input: &str, output: &str, lemmas: Option<&str>, max_docs: Option<usize>) -> Result<()> {
    let files = input_files(Path::new(input));
    if files.is_empty() {
        bail!("no .json or .jsonl input found at {input}");
    }

    let mut tokenizer = Tokenizer::new();
    if let Some(path) = lemmas {
        tokenizer = tokenizer.with_lemmas(Tokenizer::load_lemmas(Path::new(path))?);
    }
    let mut ingest = Ingest { tokenizer, builder: IndexBuilder::new(), metadata: MetadataStore::new(), max_docs };

    for file in &files {
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            ingest.index_jsonl(file)?;
        } else {
            ingest.index_json(file)?;
        }
        if ingest.full() {
            tracing::info!(max_docs, "document limit reached");
            break;
        }
    }

    let lemma_count = ingest.tokenizer.lemma_count();
    let Ingest { builder, metadata, .. } = ingest;
    let (lexicon, forward, inverted) = builder.finish();

    let created_at = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default();
    let paths = IndexPaths::new(output);
    let meta = save_index(&paths, &lexicon, &forward, &inverted, &metadata, created_at, lemma_count)?;

    tracing::info!(output, num_docs = meta.num_docs, num_terms = meta.num_terms, barrels = meta.num_barrels, "index build complete");
    Ok(())
}

fn build_embeddings(index: &str, vectors: &str, dim: usize) -> Result<()> {
    let paths = IndexPaths::new(index);
    let vectors_path = Path::new(vectors);
    let words = if vectors_path.extension().and_then(|s| s.to_str()) == Some("bin") {
        WordEmbeddings::load_binary(vectors_path, dim)?
    } else {
        WordEmbeddings::load_text(vectors_path, dim)?
    };
    if words.is_empty() {
        bail!("no usable {dim}-dimensional vectors in {vectors}");
    }
    words.save_binary(&paths.word_embeddings())?;

    let lexicon = Lexicon::load(&paths.lexicon())?;
    let forward = ForwardIndex::load(&paths.forward())?;
    let docs = DocEmbeddings::build(&words, &forward, &lexicon);
    docs.save_binary(&paths.doc_embeddings())?;

    tracing::info!(index, words = words.len(), docs = docs.len(), of = forward.len(), "embedding caches written");
    Ok(())
}

fn show_stats(index: &str, top: usize) -> Result<()> {
    let paths = IndexPaths::new(index);
    let lexicon = Lexicon::load(&paths.lexicon())?;
    let forward = ForwardIndex::load(&paths.forward())?;
    let inverted = InvertedIndex::load(&paths.inverted_base())?;
    if let Ok(meta) = load_meta(&paths) {
        tracing::info!(created_at = %meta.created_at, version = meta.version, "manifest");
    }

    tracing::info!(
        words = lexicon.len(),
        documents = forward.len(),
        term_entries = forward.total_terms(),
        posting_terms = inverted.num_terms(),
        barrels = inverted.num_barrels(),
        "index statistics"
    );
    for (rank, (word, id, freq)) in lexicon.top_words(top).into_iter().enumerate() {
        tracing::info!(rank = rank + 1, word, id, freq, "top word");
    }
    Ok(())
}
