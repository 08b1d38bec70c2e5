use crate::forward::ForwardIndex;
use crate::inverted::InvertedIndex;
use crate::lexicon::Lexicon;
use crate::metadata::MetadataStore;
use crate::{DocId, SearchHit, TermId};

/// Merge-intersection of two ascending doc_id sequences.
pub fn intersect_sorted(a: &[DocId], b: &[DocId]) -> Vec<DocId> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
        }
    }
    out
}

/// Merge-union of two ascending doc_id sequences, duplicate-free.
pub fn union_sorted(a: &[DocId], b: &[DocId]) -> Vec<DocId> {
    let mut out: Vec<DocId> = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    fn push(out: &mut Vec<DocId>, id: DocId) {
        if out.last() != Some(&id) {
            out.push(id);
        }
    }
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Equal => {
                push(&mut out, a[i]);
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => {
                push(&mut out, a[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                push(&mut out, b[j]);
                j += 1;
            }
        }
    }
    for &id in a[i..].iter().chain(&b[j..]) {
        push(&mut out, id);
    }
    out
}

/// Simple ranking: sum of the document's TFs for every query term.
pub fn score_by_tf_sum(forward: &ForwardIndex, doc_id: DocId, query_terms: &[TermId]) -> f64 {
    query_terms
        .iter()
        .map(|&t| f64::from(forward.term_frequency(doc_id, t)))
        .sum()
}

/// Resolve query tokens to term ids, dropping tokens the lexicon does not know.
/// Repeated tokens resolve to repeated ids.
pub fn resolve_terms<S: AsRef<str>>(lexicon: &Lexicon, tokens: &[S]) -> Vec<TermId> {
    tokens.iter().filter_map(|t| lexicon.id_of(t.as_ref())).collect()
}

/// Boolean AND retrieval with OR fallback, ranked by TF sum.
///
/// Holds only borrowed, read-only views of the loaded structures.
#[derive(Clone, Copy)]
pub struct BooleanSearcher<'a> {
    pub lexicon: &'a Lexicon,
    pub forward: &'a ForwardIndex,
    pub inverted: &'a InvertedIndex,
    pub metadata: &'a MetadataStore,
}

impl<'a> BooleanSearcher<'a> {
    pub fn new(
        lexicon: &'a Lexicon,
        forward: &'a ForwardIndex,
        inverted: &'a InvertedIndex,
        metadata: &'a MetadataStore,
    ) -> Self {
        Self { lexicon, forward, inverted, metadata }
    }

    /// Doc ids containing every query term, or any of them when no document
    /// contains all. Terms without postings are ignored.
    pub fn candidates(&self, query_terms: &[TermId]) -> Vec<DocId> {
        let postings: Vec<&[DocId]> = query_terms
            .iter()
            .filter_map(|&t| self.inverted.posting_list(t))
            .filter(|p| !p.is_empty())
            .collect();
        let Some((first, rest)) = postings.split_first() else {
            return Vec::new();
        };

        let mut docs = first.to_vec();
        for list in rest {
            docs = intersect_sorted(&docs, list);
            if docs.is_empty() {
                break;
            }
        }
        if docs.is_empty() {
            tracing::debug!(terms = query_terms.len(), "AND produced no candidates; falling back to OR");
            docs = rest.iter().fold(first.to_vec(), |acc, list| union_sorted(&acc, list));
        }
        docs
    }

    pub fn search<S: AsRef<str>>(&self, tokens: &[S], top_k: usize) -> Vec<SearchHit> {
        let query_terms = resolve_terms(self.lexicon, tokens);
        if query_terms.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit> = self
            .candidates(&query_terms)
            .into_iter()
            .filter_map(|doc_id| {
                let score = score_by_tf_sum(self.forward, doc_id, &query_terms);
                if score == 0.0 {
                    return None;
                }
                let external_id = self.forward.external_id_of(doc_id)?;
                Some(self.metadata.hit(doc_id, external_id, score))
            })
            .collect();

        // stable: equal scores keep ascending doc_id order
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        hits
    }
}
