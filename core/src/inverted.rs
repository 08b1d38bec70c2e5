use crate::error::{io_at, malformed, IndexError, Result};
use crate::forward::ForwardIndex;
use crate::{DocId, TermId};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Number of consecutive term ids stored per barrel.
pub const BARREL_SIZE: TermId = 30_000;

/// Barrel holding `term_id`. Pure arithmetic; never stored.
#[inline]
pub fn barrel_of(term_id: TermId) -> usize {
    (term_id / BARREL_SIZE) as usize
}

/// `{base}_barrel{barrel_id}.csv`
pub fn barrel_path(base: &Path, barrel_id: usize) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(format!("_barrel{barrel_id}.csv"));
    PathBuf::from(name)
}

/// One partition of the inverted index: term_id -> posting list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Barrel {
    postings: BTreeMap<TermId, Vec<DocId>>,
}

impl Barrel {
    pub fn posting_list(&self, term_id: TermId) -> Option<&[DocId]> {
        self.postings.get(&term_id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    fn append(&mut self, term_id: TermId, doc_id: DocId) {
        let list = self.postings.entry(term_id).or_default();
        if list.last() != Some(&doc_id) {
            list.push(doc_id);
        }
    }

    fn finalize(&mut self) {
        for list in self.postings.values_mut() {
            list.sort_unstable();
            list.dedup();
        }
    }

    fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{}", self.postings.len())?;
        for (term_id, docs) in &self.postings {
            write!(out, "{term_id}")?;
            for doc_id in docs {
                write!(out, ",{doc_id}")?;
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

/// term_id -> sorted, duplicate-free doc_id list, partitioned into barrels
/// of [`BARREL_SIZE`] term ids. Barrels are created on first insertion.
#[derive(Debug, Clone, Default)]
pub struct InvertedIndex {
    barrels: BTreeMap<usize, Barrel>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build postings from a frozen forward index in one bulk pass.
    pub fn build(forward: &ForwardIndex) -> Self {
        let mut index = InvertedIndex::new();
        for (doc_id, terms) in forward.iter() {
            for t in terms {
                index.append(t.term_id, doc_id);
            }
        }
        index.finalize();
        tracing::info!(terms = index.num_terms(), barrels = index.num_barrels(), "built inverted index");
        index
    }

    /// Append `doc_id` to the postings of `term_id`, skipping it when it is
    /// already the last entry. Call [`InvertedIndex::finalize`] afterwards
    /// if doc ids were not appended in increasing order.
    pub fn append(&mut self, term_id: TermId, doc_id: DocId) {
        self.barrels.entry(barrel_of(term_id)).or_default().append(term_id, doc_id);
    }

    /// Sort and deduplicate every posting list.
    pub fn finalize(&mut self) {
        for barrel in self.barrels.values_mut() {
            barrel.finalize();
        }
    }

    pub fn posting_list(&self, term_id: TermId) -> Option<&[DocId]> {
        self.barrels.get(&barrel_of(term_id))?.posting_list(term_id)
    }

    pub fn barrel(&self, barrel_id: usize) -> Option<&Barrel> {
        self.barrels.get(&barrel_id)
    }

    /// Number of barrel files `save` writes: every id up to the highest populated one.
    pub fn num_barrels(&self) -> usize {
        self.barrels.keys().next_back().map_or(0, |last| last + 1)
    }

    pub fn num_terms(&self) -> usize {
        self.barrels.values().map(Barrel::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.num_terms() == 0
    }

    /// Write one file per barrel id from 0 to the highest populated barrel.
    /// Unpopulated ids in between get an empty file so reloading by
    /// sequential probe never stops early.
    pub fn save(&self, base: &Path) -> Result<()> {
        let empty = Barrel::default();
        for barrel_id in 0..self.num_barrels().max(1) {
            let path = barrel_path(base, barrel_id);
            let barrel = self.barrels.get(&barrel_id).unwrap_or(&empty);
            let file = File::create(&path).map_err(io_at(&path))?;
            let mut out = BufWriter::new(file);
            barrel.write_to(&mut out).and_then(|_| out.flush()).map_err(io_at(&path))?;
            tracing::debug!(path = %path.display(), terms = barrel.len(), "saved barrel");
        }
        tracing::info!(base = %base.display(), barrels = self.num_barrels(), terms = self.num_terms(), "saved inverted index");
        Ok(())
    }

    /// Probe `{base}_barrel0.csv`, `{base}_barrel1.csv`, ... until a file is
    /// missing. Fails with [`IndexError::NoIndex`] when barrel 0 is absent.
    pub fn load(base: &Path) -> Result<Self> {
        let first = barrel_path(base, 0);
        if !first.is_file() {
            return Err(IndexError::NoIndex(first));
        }
        let mut index = InvertedIndex::new();
        let mut barrel_id = 0;
        loop {
            let path = barrel_path(base, barrel_id);
            let file = match File::open(&path) {
                Ok(f) => f,
                Err(e) if e.kind() == io::ErrorKind::NotFound => break,
                Err(e) => return Err(io_at(&path)(e)),
            };
            index.read_barrel(&path, barrel_id, BufReader::new(file))?;
            barrel_id += 1;
        }
        index.finalize();
        tracing::info!(base = %base.display(), barrels = barrel_id, terms = index.num_terms(), "loaded inverted index");
        Ok(index)
    }

    fn read_barrel<R: BufRead>(&mut self, path: &Path, barrel_id: usize, reader: R) -> Result<()> {
        // first line is an informational entry count
        for (idx, line) in reader.lines().enumerate().skip(1) {
            let line = line.map_err(io_at(path))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split(',');
            let term_id: TermId = fields
                .next()
                .and_then(|f| f.trim().parse().ok())
                .ok_or_else(|| malformed(path, idx + 1, "invalid term_id"))?;
            if barrel_of(term_id) != barrel_id {
                tracing::warn!(path = %path.display(), term_id, "term stored in the wrong barrel; rerouting");
            }
            let barrel = self.barrels.entry(barrel_of(term_id)).or_default();
            let list = barrel.postings.entry(term_id).or_default();
            for field in fields {
                let doc_id = field
                    .trim()
                    .parse()
                    .map_err(|_| malformed(path, idx + 1, format!("invalid doc_id {field:?}")))?;
                list.push(doc_id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TermFreq;
    use tempfile::tempdir;

    fn forward(docs: &[&[(TermId, u32)]]) -> ForwardIndex {
        let mut fwd = ForwardIndex::new();
        for (i, terms) in docs.iter().enumerate() {
            fwd.register_document(format!("doc{i}"), terms.iter().map(|&(t, f)| TermFreq::new(t, f)));
        }
        fwd
    }

    #[test]
    fn barrel_routing_is_arithmetic() {
        assert_eq!(barrel_of(0), 0);
        assert_eq!(barrel_of(BARREL_SIZE - 1), 0);
        assert_eq!(barrel_of(BARREL_SIZE), 1);
        assert_eq!(barrel_of(BARREL_SIZE * 3 + 17), 3);
    }

    #[test]
    fn barrel_path_appends_suffix() {
        let p = barrel_path(Path::new("/tmp/idx/inverted_index"), 2);
        assert_eq!(p, PathBuf::from("/tmp/idx/inverted_index_barrel2.csv"));
    }

    #[test]
    fn postings_are_sorted_and_unique_even_for_repeated_terms() {
        let fwd = forward(&[&[(0, 5), (1, 1)], &[(0, 3)], &[(1, 2), (0, 1)]]);
        let inv = InvertedIndex::build(&fwd);
        assert_eq!(inv.posting_list(0), Some(&[0, 1, 2][..]));
        assert_eq!(inv.posting_list(1), Some(&[0, 2][..]));
        assert_eq!(inv.posting_list(2), None);
    }

    #[test]
    fn finalize_restores_order_after_out_of_order_appends() {
        let mut inv = InvertedIndex::new();
        for doc in [4, 1, 4, 3, 1] {
            inv.append(7, doc);
        }
        inv.finalize();
        assert_eq!(inv.posting_list(7), Some(&[1, 3, 4][..]));
    }

    #[test]
    fn terms_land_in_separate_barrels() {
        let high = BARREL_SIZE * 2 + 5;
        let fwd = forward(&[&[(3, 1), (high, 1)]]);
        let inv = InvertedIndex::build(&fwd);
        assert_eq!(inv.num_barrels(), 3);
        assert!(inv.barrel(1).is_none());
        assert_eq!(inv.barrel(2).unwrap().posting_list(high), Some(&[0][..]));
    }

    #[test]
    fn save_writes_dense_barrels_and_reloads() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("inverted_index");
        let high = BARREL_SIZE * 2 + 5;
        let fwd = forward(&[&[(3, 1), (high, 2)], &[(3, 4), (1, 1)]]);
        let inv = InvertedIndex::build(&fwd);
        inv.save(&base).unwrap();

        assert!(barrel_path(&base, 1).is_file());
        let barrel0 = std::fs::read_to_string(barrel_path(&base, 0)).unwrap();
        assert_eq!(barrel0, "2\n1,1\n3,0,1\n");

        let loaded = InvertedIndex::load(&base).unwrap();
        assert_eq!(loaded.num_terms(), 3);
        assert_eq!(loaded.posting_list(3), Some(&[0, 1][..]));
        assert_eq!(loaded.posting_list(high), Some(&[0][..]));
    }

    #[test]
    fn load_stops_at_first_missing_barrel() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("inv");
        std::fs::write(barrel_path(&base, 0), "1\n2,5,1,5\n").unwrap();
        let far = BARREL_SIZE * 2;
        std::fs::write(barrel_path(&base, 2), format!("1\n{far},9\n")).unwrap();

        let loaded = InvertedIndex::load(&base).unwrap();
        assert_eq!(loaded.posting_list(2), Some(&[1, 5][..]));
        assert_eq!(loaded.posting_list(far), None);
    }

    #[test]
    fn load_without_barrel_zero_is_no_index() {
        let dir = tempdir().unwrap();
        let err = InvertedIndex::load(&dir.path().join("inv")).unwrap_err();
        assert!(matches!(err, IndexError::NoIndex(_)));
    }
}
