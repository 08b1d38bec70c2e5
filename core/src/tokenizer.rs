use crate::error::{io_at, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use unicode_normalization::UnicodeNormalization;

/// Tokens shorter than this are dropped.
pub const MIN_TOKEN_LEN: usize = 3;

lazy_static! {
    static ref RE: Regex = Regex::new(r"\p{L}+").expect("valid regex");
    static ref DEFAULT_STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","shan't","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves",
            "one","two","using","also","however","may"
        ];
        words.iter().copied().collect()
    };
}

/// Text -> normalized terms. Stop words and the lemma dictionary are owned
/// by the tokenizer rather than kept in globals, so document and query
/// text share one explicitly configured instance.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    stopwords: HashSet<String>,
    lemmas: HashMap<String, String>,
    min_len: usize,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self {
            stopwords: DEFAULT_STOPWORDS.iter().map(|w| w.to_string()).collect(),
            lemmas: HashMap::new(),
            min_len: MIN_TOKEN_LEN,
        }
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lemmas(mut self, lemmas: HashMap<String, String>) -> Self {
        self.lemmas = lemmas;
        self
    }

    pub fn with_stopwords<I, S>(mut self, stopwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stopwords = stopwords.into_iter().map(Into::into).collect();
        self
    }

    pub fn lemma_count(&self) -> usize {
        self.lemmas.len()
    }

    /// Tokenize into terms: NFKC normalization, lowercase, letter runs only,
    /// short-token and stop-word removal, then lemmatization.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let normalized = text.nfkc().collect::<String>().to_lowercase();
        RE.find_iter(&normalized)
            .map(|m| m.as_str())
            .filter(|token| token.chars().count() >= self.min_len)
            .filter(|token| !self.stopwords.contains(*token))
            .map(|token| self.lemmatize(token).to_string())
            .collect()
    }

    pub fn lemmatize<'a>(&'a self, word: &'a str) -> &'a str {
        self.lemmas.get(word).map_or(word, String::as_str)
    }

    /// Read `word lemma` pairs, one per line. Lines with fewer than two
    /// fields are ignored.
    pub fn load_lemmas(path: &Path) -> Result<HashMap<String, String>> {
        let file = File::open(path).map_err(io_at(path))?;
        let mut lemmas = HashMap::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(io_at(path))?;
            let mut fields = line.split_whitespace();
            if let (Some(word), Some(lemma)) = (fields.next(), fields.next()) {
                lemmas.insert(word.to_lowercase(), lemma.to_lowercase());
            }
        }
        tracing::info!(path = %path.display(), entries = lemmas.len(), "loaded lemma dictionary");
        Ok(lemmas)
    }
}
