use crate::lexicon::Lexicon;

/// Lexicon words starting with `raw_prefix`, most frequent first.
///
/// Only alphabetic characters of the prefix are kept (lowercased); an empty
/// normalized prefix yields no suggestions.
pub fn suggest(lexicon: &Lexicon, raw_prefix: &str, top_k: usize) -> Vec<String> {
    let prefix: String = raw_prefix
        .chars()
        .filter(|c| c.is_alphabetic())
        .flat_map(char::to_lowercase)
        .collect();
    if prefix.is_empty() {
        return Vec::new();
    }

    let mut matches: Vec<(&str, u64)> = lexicon
        .iter()
        .filter(|(word, _, _)| word.starts_with(&prefix))
        .map(|(word, _, freq)| (word, freq))
        .collect();
    matches.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    matches.into_iter().take(top_k).map(|(w, _)| w.to_string()).collect()
}
