use criterion::{criterion_group, criterion_main, Criterion};
use cordex_core::{DocEmbeddings, IndexBuilder, SearchIndex, SemanticIndex, Tokenizer, WordEmbeddings};

const VOCAB: &[&str] = &[
    "fever", "cough", "coronavirus", "transmission", "vaccine", "patient", "symptom", "respiratory",
    "infection", "protein", "antibody", "clinical", "outbreak", "mortality", "influenza", "genome",
];

fn synthetic_index(num_docs: usize) -> SearchIndex {
    let mut builder = IndexBuilder::new();
    for d in 0..num_docs {
        let tokens: Vec<&str> = (0..40).map(|i| VOCAB[(d * 7 + i * i) % VOCAB.len()]).collect();
        builder.add_document(&format!("doc-{d}"), &tokens);
    }
    let (lex, fwd, inv) = builder.finish();

    let dim = 50;
    let mut words = WordEmbeddings::new(dim);
    for (w, word) in VOCAB.iter().enumerate() {
        words.insert(*word, (0..dim).map(|i| ((w * 31 + i * 17) % 11) as f32 - 5.0).collect());
    }
    let docs = DocEmbeddings::build(&words, &fwd, &lex);
    SearchIndex::new(lex, fwd, inv).with_semantic(SemanticIndex::new(words, docs))
}

fn bench_search(c: &mut Criterion) {
    let tokenizer = Tokenizer::new();
    let text = "Clinical features of coronavirus transmission among respiratory patients with fever and cough";
    c.bench_function("tokenize_sentence", |b| b.iter(|| tokenizer.tokenize(text)));

    let index = synthetic_index(5_000);
    c.bench_function("boolean_search", |b| b.iter(|| index.search("fever cough vaccine", 20)));
    c.bench_function("semantic_search", |b| b.iter(|| index.semantic_search("respiratory infection", 20)));
}

criterion_group!(benches, bench_search);
criterion_main!(benches);
