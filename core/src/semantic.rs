use crate::error::{io_at, malformed, IndexError, Result};
use crate::forward::ForwardIndex;
use crate::lexicon::Lexicon;
use crate::metadata::MetadataStore;
use crate::{DocId, SearchHit};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Dimension of the GloVe vectors the caches are built from.
pub const EMBEDDING_DIM: usize = 300;

/// Longest word accepted from a binary cache, in bytes.
const MAX_WORD_BYTES: usize = 1 << 16;

/// Scale `v` to unit length. Vectors with (near) zero magnitude are left untouched.
pub fn normalize(v: &mut [f32]) {
    let magnitude = v.iter().map(|&x| f64::from(x) * f64::from(x)).sum::<f64>().sqrt();
    if magnitude > 1e-10 {
        for x in v.iter_mut() {
            *x /= magnitude as f32;
        }
    }
}

/// Cosine similarity of two unit vectors, i.e. their dot product.
/// Vectors of different length score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b).map(|(&x, &y)| f64::from(x) * f64::from(y)).sum()
}

fn read_len<R: Read>(r: &mut R) -> std::io::Result<usize> {
    Ok(r.read_u64::<LittleEndian>()? as usize)
}

fn write_len<W: Write>(w: &mut W, n: usize) -> std::io::Result<()> {
    w.write_u64::<LittleEndian>(n as u64)
}

fn read_vector<R: Read>(r: &mut R, dim: usize) -> std::io::Result<Vec<f32>> {
    let mut v = vec![0.0f32; dim];
    r.read_f32_into::<LittleEndian>(&mut v)?;
    Ok(v)
}

fn write_vector<W: Write>(w: &mut W, v: &[f32]) -> std::io::Result<()> {
    for &x in v {
        w.write_f32::<LittleEndian>(x)?;
    }
    Ok(())
}

/// Read the `[count][dim]` header shared by both caches, rejecting a
/// dimension other than `expected`.
fn read_header<R: Read>(r: &mut R, path: &Path, expected: usize) -> Result<usize> {
    let count = read_len(r).map_err(io_at(path))?;
    let dim = read_len(r).map_err(io_at(path))?;
    if dim != expected {
        return Err(IndexError::DimensionMismatch { path: path.to_path_buf(), expected, found: dim });
    }
    Ok(count)
}

/// word -> unit-length embedding.
#[derive(Debug, Clone)]
pub struct WordEmbeddings {
    dim: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl WordEmbeddings {
    pub fn new(dim: usize) -> Self {
        Self { dim, vectors: HashMap::new() }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn get(&self, word: &str) -> Option<&[f32]> {
        self.vectors.get(word).map(Vec::as_slice)
    }

    /// Normalize and store `vector`. Returns `false` (and stores nothing)
    /// when its length differs from the configured dimension.
    pub fn insert(&mut self, word: impl Into<String>, mut vector: Vec<f32>) -> bool {
        if vector.len() != self.dim {
            return false;
        }
        normalize(&mut vector);
        self.vectors.insert(word.into(), vector);
        true
    }

    /// Load plain-text vectors: one word followed by `dim` floats per line.
    /// Lines with the wrong number of values, or with a value that is not a
    /// finite float, are skipped with a warning.
    pub fn load_text(path: &Path, dim: usize) -> Result<Self> {
        let file = File::open(path).map_err(io_at(path))?;
        let mut embeddings = WordEmbeddings::new(dim);
        let mut skipped = 0usize;
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(io_at(path))?;
            let mut fields = line.split_whitespace();
            let Some(word) = fields.next() else { continue };
            let parsed: Option<Vec<f32>> =
                fields.map(|f| f.parse::<f32>().ok().filter(|x| x.is_finite())).collect();
            let Some(values) = parsed else {
                tracing::warn!(path = %path.display(), line = idx + 1, word, "skipping embedding with a non-finite value");
                skipped += 1;
                continue;
            };
            let found = values.len();
            if !embeddings.insert(word, values) {
                tracing::warn!(path = %path.display(), line = idx + 1, word, found, expected = dim, "skipping embedding with wrong dimension");
                skipped += 1;
                continue;
            }
            if embeddings.len() % 100_000 == 0 {
                tracing::debug!(loaded = embeddings.len(), "loading word embeddings");
            }
        }
        tracing::info!(path = %path.display(), words = embeddings.len(), skipped, "loaded text word embeddings");
        Ok(embeddings)
    }

    /// `[u64 count][u64 dim]`, then per word `[u64 len][utf-8 bytes][dim x f32]`,
    /// all little-endian. Words are written in sorted order.
    pub fn save_binary(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(io_at(path))?;
        let mut out = BufWriter::new(file);
        let mut words: Vec<&String> = self.vectors.keys().collect();
        words.sort();
        let write = |out: &mut BufWriter<File>| -> std::io::Result<()> {
            write_len(out, self.vectors.len())?;
            write_len(out, self.dim)?;
            for word in &words {
                write_len(out, word.len())?;
                out.write_all(word.as_bytes())?;
                write_vector(out, &self.vectors[*word])?;
            }
            out.flush()
        };
        write(&mut out).map_err(io_at(path))?;
        tracing::info!(path = %path.display(), words = self.len(), "saved word embeddings");
        Ok(())
    }

    /// Load a cache written by [`WordEmbeddings::save_binary`]. A header
    /// dimension other than `dim` fails without returning partial data.
    pub fn load_binary(path: &Path, dim: usize) -> Result<Self> {
        let file = File::open(path).map_err(io_at(path))?;
        let mut input = BufReader::new(file);
        let count = read_header(&mut input, path, dim)?;

        // count is untrusted until the records are actually read
        let mut vectors = HashMap::with_capacity(count.min(1 << 20));
        for i in 0..count {
            let len = read_len(&mut input).map_err(io_at(path))?;
            if len > MAX_WORD_BYTES {
                return Err(malformed(path, i + 1, format!("word length {len} exceeds {MAX_WORD_BYTES} bytes")));
            }
            let mut bytes = vec![0u8; len];
            input.read_exact(&mut bytes).map_err(io_at(path))?;
            let word = String::from_utf8(bytes).map_err(|_| IndexError::InvalidUtf8(path.to_path_buf()))?;
            let vector = read_vector(&mut input, dim).map_err(io_at(path))?;
            vectors.insert(word, vector);
        }
        tracing::info!(path = %path.display(), words = vectors.len(), "loaded binary word embeddings");
        Ok(Self { dim, vectors })
    }

    /// Weighted average of the known words' vectors, normalized to unit
    /// length. Unknown words are skipped; with no known word the result is
    /// the all-zero vector.
    pub fn average<'w, I>(&self, words: I) -> Vec<f32>
    where
        I: IntoIterator<Item = (&'w str, f32)>,
    {
        let mut avg = vec![0.0f32; self.dim];
        let mut total_weight = 0.0f32;
        for (word, weight) in words {
            let Some(v) = self.get(word) else { continue };
            for (acc, &x) in avg.iter_mut().zip(v) {
                *acc += x * weight;
            }
            total_weight += weight;
        }
        if total_weight > 0.0 {
            for acc in avg.iter_mut() {
                *acc /= total_weight;
            }
            normalize(&mut avg);
        }
        avg
    }
}

/// doc_id -> unit-length, frequency-weighted average of its word vectors.
#[derive(Debug, Clone)]
pub struct DocEmbeddings {
    dim: usize,
    vectors: BTreeMap<DocId, Vec<f32>>,
}

impl DocEmbeddings {
    pub fn new(dim: usize) -> Self {
        Self { dim, vectors: BTreeMap::new() }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn get(&self, doc_id: DocId) -> Option<&[f32]> {
        self.vectors.get(&doc_id).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (DocId, &[f32])> {
        self.vectors.iter().map(|(id, v)| (*id, v.as_slice()))
    }

    /// Embed every document of the forward index. Terms are weighted by
    /// their in-document frequency; terms without a word vector are ignored
    /// and documents with no embedded term get no entry at all.
    pub fn build(words: &WordEmbeddings, forward: &ForwardIndex, lexicon: &Lexicon) -> Self {
        let id_to_word = lexicon.id_to_word();
        let mut docs = DocEmbeddings::new(words.dim());
        let mut omitted = 0usize;
        for (doc_id, terms) in forward.iter() {
            let weighted: Vec<(&str, f32)> = terms
                .iter()
                .filter_map(|t| id_to_word.get(&t.term_id).map(|w| (*w, t.freq as f32)))
                .filter(|(w, _)| words.get(w).is_some())
                .collect();
            if weighted.is_empty() {
                omitted += 1;
                continue;
            }
            docs.vectors.insert(doc_id, words.average(weighted));
        }
        tracing::info!(embedded = docs.len(), omitted, "built document embeddings");
        docs
    }

    /// `[u64 count][u64 dim]`, then per document `[u64 doc_id][dim x f32]`,
    /// little-endian, ascending doc_id.
    pub fn save_binary(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(io_at(path))?;
        let mut out = BufWriter::new(file);
        let write = |out: &mut BufWriter<File>| -> std::io::Result<()> {
            write_len(out, self.vectors.len())?;
            write_len(out, self.dim)?;
            for (&doc_id, vector) in &self.vectors {
                out.write_u64::<LittleEndian>(u64::from(doc_id))?;
                write_vector(out, vector)?;
            }
            out.flush()
        };
        write(&mut out).map_err(io_at(path))?;
        tracing::info!(path = %path.display(), docs = self.len(), "saved document embeddings");
        Ok(())
    }

    pub fn load_binary(path: &Path, dim: usize) -> Result<Self> {
        let file = File::open(path).map_err(io_at(path))?;
        let mut input = BufReader::new(file);
        let count = read_header(&mut input, path, dim)?;

        let mut vectors = BTreeMap::new();
        for i in 0..count {
            let raw_id = input.read_u64::<LittleEndian>().map_err(io_at(path))?;
            let doc_id = DocId::try_from(raw_id)
                .map_err(|_| malformed(path, i + 1, format!("doc_id {raw_id} out of range")))?;
            let vector = read_vector(&mut input, dim).map_err(io_at(path))?;
            vectors.insert(doc_id, vector);
        }
        tracing::info!(path = %path.display(), docs = vectors.len(), "loaded document embeddings");
        Ok(Self { dim, vectors })
    }
}

/// Word and document embedding stores queried together.
#[derive(Debug, Clone)]
pub struct SemanticIndex {
    pub words: WordEmbeddings,
    pub docs: DocEmbeddings,
}

impl SemanticIndex {
    pub fn new(words: WordEmbeddings, docs: DocEmbeddings) -> Self {
        Self { words, docs }
    }

    /// Unweighted average of the query tokens' vectors, normalized.
    /// All-zero when no token has a vector.
    pub fn query_embedding<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<f32> {
        self.words.average(tokens.iter().map(|t| (t.as_ref(), 1.0)))
    }

    /// Rank documents by cosine similarity to the query. Documents scoring
    /// `<= 0` are not relevant and never returned.
    pub fn search<S: AsRef<str>>(
        &self,
        tokens: &[S],
        forward: &ForwardIndex,
        metadata: &MetadataStore,
        top_k: usize,
    ) -> Vec<SearchHit> {
        let query = self.query_embedding(tokens);
        if query.iter().all(|&x| x == 0.0) {
            tracing::debug!(tokens = tokens.len(), "query has no known embeddings");
            return Vec::new();
        }

        let mut hits: Vec<SearchHit> = self
            .docs
            .iter()
            .filter_map(|(doc_id, vector)| {
                let similarity = cosine_similarity(&query, vector);
                if similarity <= 0.0 {
                    return None;
                }
                let external_id = forward.external_id_of(doc_id)?;
                Some(metadata.hit(doc_id, external_id, similarity))
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IndexBuilder;
    use tempfile::tempdir;

    const DIM: usize = 3;

    fn words() -> WordEmbeddings {
        let mut w = WordEmbeddings::new(DIM);
        w.insert("fever", vec![1.0, 0.0, 0.0]);
        w.insert("cough", vec![0.0, 2.0, 0.0]);
        w.insert("virus", vec![1.0, 1.0, 0.0]);
        w.insert("bone", vec![-1.0, 0.0, 0.0]);
        w
    }

    #[test]
    fn self_similarity_is_one() {
        let mut v = vec![3.0, -4.0, 12.0];
        normalize(&mut v);
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn zero_vector_is_not_normalized() {
        let mut v = vec![0.0; DIM];
        normalize(&mut v);
        assert_eq!(v, vec![0.0; DIM]);
    }

    #[test]
    fn insert_normalizes_and_checks_dimension() {
        let w = words();
        let cough = w.get("cough").unwrap();
        assert!((cough[1] - 1.0).abs() < 1e-6);
        let mut w = w;
        assert!(!w.insert("short", vec![1.0]));
        assert!(w.get("short").is_none());
    }

    #[test]
    fn text_loader_skips_wrong_dimension_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("glove.txt");
        std::fs::write(&path, "fever 1 0 0\nbroken 1 2\ncough 0 3 0\n\nextra 1 2 3 4\n").unwrap();
        let w = WordEmbeddings::load_text(&path, DIM).unwrap();
        assert_eq!(w.len(), 2);
        assert!(w.get("broken").is_none());
        assert!(w.get("extra").is_none());
        assert_eq!(w.get("cough").unwrap(), &[0.0f32, 1.0, 0.0][..]);
    }

    #[test]
    fn word_binary_round_trip_and_dimension_check() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("words.bin");
        let w = words();
        w.save_binary(&path).unwrap();

        let loaded = WordEmbeddings::load_binary(&path, DIM).unwrap();
        assert_eq!(loaded.len(), w.len());
        for word in ["fever", "cough", "virus", "bone"] {
            assert_eq!(loaded.get(word), w.get(word));
        }
        let err = WordEmbeddings::load_binary(&path, 300).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 300, found: 3, .. }));
    }

    #[test]
    fn truncated_cache_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("words.bin");
        words().save_binary(&path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();
        assert!(WordEmbeddings::load_binary(&path, DIM).is_err());
    }

    fn raw_cache(path: &Path, fields: &[u64]) {
        let mut bytes = Vec::new();
        for &f in fields {
            bytes.write_u64::<LittleEndian>(f).unwrap();
        }
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn huge_word_count_fails_without_allocating() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("words.bin");
        raw_cache(&path, &[u64::MAX, DIM as u64]);
        assert!(matches!(WordEmbeddings::load_binary(&path, DIM), Err(IndexError::Io { .. })));
    }

    #[test]
    fn huge_word_length_is_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("words.bin");
        raw_cache(&path, &[1, DIM as u64, 1 << 62]);
        let err = WordEmbeddings::load_binary(&path, DIM).unwrap_err();
        assert!(matches!(err, IndexError::Malformed { line: 1, .. }));
    }

    #[test]
    fn text_loader_skips_non_finite_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("glove.txt");
        std::fs::write(&path, "fever 1 0 0\nbad nan 1 0\nworse 1 inf 0\ncough 0 1 x\n").unwrap();
        let w = WordEmbeddings::load_text(&path, DIM).unwrap();
        assert_eq!(w.len(), 1);
        assert!(w.get("bad").is_none());
        assert!(w.get("worse").is_none());
        assert!(w.get("cough").is_none());
    }

    #[test]
    fn document_embeddings_are_weighted_and_skip_unknown_docs() {
        let mut builder = IndexBuilder::new();
        builder.add_document("A", &["fever", "fever", "cough"]);
        builder.add_document("B", &["unknown", "words"]);
        builder.add_document("C", &["cough"]);
        let (lex, fwd, _) = builder.finish();

        let docs = DocEmbeddings::build(&words(), &fwd, &lex);
        assert_eq!(docs.len(), 2);
        assert!(docs.get(1).is_none());

        // (2*[1,0,0] + 1*[0,1,0]) / 3, normalized
        let a = docs.get(0).unwrap();
        let expected = [2.0 / 5f32.sqrt(), 1.0 / 5f32.sqrt(), 0.0];
        for (x, y) in a.iter().zip(expected) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn document_binary_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("docs.bin");
        let mut builder = IndexBuilder::new();
        builder.add_document("A", &["fever", "virus"]);
        builder.add_document("B", &["cough"]);
        let (lex, fwd, _) = builder.finish();
        let docs = DocEmbeddings::build(&words(), &fwd, &lex);
        docs.save_binary(&path).unwrap();

        let loaded = DocEmbeddings::load_binary(&path, DIM).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get(0), docs.get(0));
        assert_eq!(loaded.get(1), docs.get(1));
        assert!(matches!(
            DocEmbeddings::load_binary(&path, 4),
            Err(IndexError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn search_ranks_by_cosine_and_drops_non_positive() {
        let mut builder = IndexBuilder::new();
        builder.add_document("A", &["fever"]);
        builder.add_document("B", &["virus"]);
        builder.add_document("C", &["bone"]);
        builder.add_document("D", &["cough"]);
        let (lex, fwd, _) = builder.finish();
        let w = words();
        let docs = DocEmbeddings::build(&w, &fwd, &lex);
        let index = SemanticIndex::new(w, docs);
        let meta = MetadataStore::new();

        let hits = index.search(&["fever"], &fwd, &meta, 10);
        let ids: Vec<&str> = hits.iter().map(|h| h.external_id.as_str()).collect();
        // C is opposite (-1) and D orthogonal (0): both excluded
        assert_eq!(ids, vec!["A", "B"]);
        assert!((hits[0].score - 1.0).abs() < 1e-5);

        assert!(index.search(&["nothing"], &fwd, &meta, 10).is_empty());
        assert_eq!(index.search(&["fever"], &fwd, &meta, 1).len(), 1);
    }

    #[test]
    fn query_embedding_is_unweighted() {
        let index = SemanticIndex::new(words(), DocEmbeddings::new(DIM));
        let q = index.query_embedding(&["fever", "fever", "cough"]);
        // every token weighs 1, so the repeated one counts twice
        let expected = [2.0 / 5f32.sqrt(), 1.0 / 5f32.sqrt(), 0.0];
        for (x, y) in q.iter().zip(expected) {
            assert!((x - y).abs() < 1e-5);
        }
    }
}
