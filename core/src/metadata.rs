use crate::error::{io_at, Result};
use crate::{DocId, DocMeta, SearchHit};
use std::collections::HashMap;
use std::path::Path;

const ID_COLUMNS: [&str; 2] = ["cord_uid", "external_id"];

/// external_id -> (title, url) lookup used to decorate search results.
#[derive(Debug, Clone, Default)]
pub struct MetadataStore {
    by_external_id: HashMap<String, DocMeta>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, external_id: impl Into<String>, meta: DocMeta) {
        self.by_external_id.insert(external_id.into(), meta);
    }

    pub fn get(&self, external_id: &str) -> Option<&DocMeta> {
        self.by_external_id.get(external_id)
    }

    pub fn len(&self) -> usize {
        self.by_external_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_external_id.is_empty()
    }

    /// Build a result row; unknown ids leave title and url empty.
    pub fn hit(&self, doc_id: DocId, external_id: &str, score: f64) -> SearchHit {
        let meta = self.get(external_id).cloned().unwrap_or_default();
        SearchHit { external_id: external_id.to_string(), title: meta.title, url: meta.url, doc_id, score }
    }

    /// Load a CSV with a header row. The id column is `cord_uid` or
    /// `external_id`; `title` and `url` are optional columns located by name.
    pub fn load_csv(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(io_at(path))?;
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);
        let headers = reader.headers()?.clone();
        let column = |name: &str| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name));

        let Some(id_col) = ID_COLUMNS.iter().find_map(|name| column(name)) else {
            return Err(crate::error::malformed(path, 1, "no cord_uid or external_id column"));
        };
        let title_col = column("title");
        let url_col = column("url");

        let mut store = MetadataStore::new();
        for record in reader.records() {
            let record = record?;
            let external_id = record.get(id_col).unwrap_or("").trim();
            if external_id.is_empty() {
                continue;
            }
            let field = |col: Option<usize>| col.and_then(|c| record.get(c)).unwrap_or("").to_string();
            store.insert(external_id, DocMeta { title: field(title_col), url: field(url_col) });
        }
        tracing::info!(path = %path.display(), entries = store.len(), "loaded metadata");
        Ok(store)
    }

    /// Write `cord_uid,title,url` rows sorted by id.
    pub fn save_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(["cord_uid", "title", "url"])?;
        let mut ids: Vec<&String> = self.by_external_id.keys().collect();
        ids.sort();
        for id in ids {
            let meta = &self.by_external_id[id];
            writer.write_record([id.as_str(), meta.title.as_str(), meta.url.as_str()])?;
        }
        writer.flush().map_err(io_at(path))?;
        Ok(())
    }
}
