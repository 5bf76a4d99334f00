//! Embedded Tantivy keyword index.
//!
//! Target-script text has no word separators, so runs of script characters are indexed as
//! overlapping character bigrams while Latin words and digits are indexed whole. Queries go
//! through the same analysis and match any term.

use crate::index::{ChunkMetadata, IndexError, LexicalIndex, StoredDoc};
use crate::quality::ScriptProfile;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, STORED, STRING, Schema, TextFieldIndexing, TextOptions, Value,
};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term, doc};

const WRITER_MEMORY_BYTES: usize = 50_000_000;

/// Terms produced for `text`: lowercase Latin/digit words plus character bigrams for
/// target-script runs. A run of one script character yields that character.
pub fn lexical_terms(text: &str, script: &ScriptProfile) -> Vec<String> {
    let mut terms = Vec::new();
    let mut word = String::new();
    let mut run: Vec<char> = Vec::new();

    for c in text.chars().flat_map(char::to_lowercase) {
        if script.contains(c) {
            flush_word(&mut word, &mut terms);
            if c.is_alphanumeric() || is_script_letter(c) {
                run.push(c);
            } else {
                flush_run(&mut run, &mut terms);
            }
        } else if c.is_alphanumeric() {
            flush_run(&mut run, &mut terms);
            word.push(c);
        } else {
            flush_word(&mut word, &mut terms);
            flush_run(&mut run, &mut terms);
        }
    }
    flush_word(&mut word, &mut terms);
    flush_run(&mut run, &mut terms);
    terms
}

// Thai vowel signs and tone marks are not alphanumeric but belong inside words.
fn is_script_letter(c: char) -> bool {
    !c.is_whitespace() && !c.is_ascii_punctuation() && !matches!(c, '\u{0E2F}' | '\u{0E46}' | '\u{0E4F}' | '\u{0E5A}' | '\u{0E5B}')
}

fn flush_word(word: &mut String, terms: &mut Vec<String>) {
    if !word.is_empty() {
        terms.push(std::mem::take(word));
    }
}

fn flush_run(run: &mut Vec<char>, terms: &mut Vec<String>) {
    match run.len() {
        0 => {}
        1 => terms.push(run[0].to_string()),
        _ => terms.extend(run.windows(2).map(|pair| pair.iter().collect::<String>())),
    }
    run.clear();
}

struct Fields {
    id: Field,
    text: Field,
    metadata: Field,
    terms: Field,
}

fn build_schema() -> (Schema, Fields) {
    let mut builder = Schema::builder();
    let id = builder.add_text_field("id", STRING | STORED);
    let text = builder.add_text_field("text", STORED);
    let metadata = builder.add_text_field("metadata", STORED);
    let term_options = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer("whitespace")
            .set_index_option(IndexRecordOption::WithFreqs),
    );
    let terms = builder.add_text_field("terms", term_options);
    (
        builder.build(),
        Fields {
            id,
            text,
            metadata,
            terms,
        },
    )
}

struct Inner {
    fields: Fields,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
    script: ScriptProfile,
}

/// [`LexicalIndex`] stored in a Tantivy index.
#[derive(Clone)]
pub struct TantivyLexicalIndex {
    inner: Arc<Inner>,
}

fn lexical_error(error: impl std::fmt::Display) -> IndexError {
    IndexError::Lexical(error.to_string())
}

impl TantivyLexicalIndex {
    /// Open the index under `dir`, creating it when missing.
    pub fn open(dir: &Path, script: ScriptProfile) -> Result<Self, IndexError> {
        std::fs::create_dir_all(dir).map_err(lexical_error)?;
        let (schema, fields) = build_schema();
        let directory = MmapDirectory::open(dir).map_err(lexical_error)?;
        let index = Index::open_or_create(directory, schema).map_err(lexical_error)?;
        tracing::debug!(path = %dir.display(), "Opened lexical index");
        Self::from_index(index, fields, script)
    }

    /// Index held entirely in memory.
    pub fn in_memory(script: ScriptProfile) -> Result<Self, IndexError> {
        let (schema, fields) = build_schema();
        Self::from_index(Index::create_in_ram(schema), fields, script)
    }

    fn from_index(index: Index, fields: Fields, script: ScriptProfile) -> Result<Self, IndexError> {
        let writer = index
            .writer_with_num_threads(1, WRITER_MEMORY_BYTES)
            .map_err(lexical_error)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(lexical_error)?;
        Ok(Self {
            inner: Arc::new(Inner {
                fields,
                writer: Mutex::new(writer),
                reader,
                script,
            }),
        })
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T, IndexError>
    where
        T: Send + 'static,
        F: FnOnce(&Inner) -> Result<T, IndexError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || work(&inner))
            .await
            .map_err(|error| IndexError::Task(error.to_string()))?
    }
}

impl Inner {
    fn upsert(&self, docs: &[StoredDoc]) -> Result<usize, IndexError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| IndexError::Lexical("index writer lock poisoned".into()))?;
        for stored in docs {
            let metadata = serde_json::to_string(&stored.metadata).map_err(lexical_error)?;
            let terms = lexical_terms(&stored.text, &self.script).join(" ");
            writer.delete_term(Term::from_field_text(self.fields.id, &stored.id));
            writer
                .add_document(doc!(
                    self.fields.id => stored.id.clone(),
                    self.fields.text => stored.text.clone(),
                    self.fields.metadata => metadata,
                    self.fields.terms => terms,
                ))
                .map_err(lexical_error)?;
        }
        writer.commit().map_err(lexical_error)?;
        drop(writer);
        self.reader.reload().map_err(lexical_error)?;
        Ok(docs.len())
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<String>, IndexError> {
        let mut seen = HashSet::new();
        let clauses: Vec<(Occur, Box<dyn Query>)> = lexical_terms(query, &self.script)
            .into_iter()
            .filter(|term| seen.insert(term.clone()))
            .map(|term| {
                let query: Box<dyn Query> = Box::new(TermQuery::new(
                    Term::from_field_text(self.fields.terms, &term),
                    IndexRecordOption::WithFreqs,
                ));
                (Occur::Should, query)
            })
            .collect();
        if clauses.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let hits = searcher
            .search(&BooleanQuery::new(clauses), &TopDocs::with_limit(limit))
            .map_err(lexical_error)?;
        let mut ids = Vec::with_capacity(hits.len());
        for (_score, address) in hits {
            let document: TantivyDocument = searcher.doc(address).map_err(lexical_error)?;
            if let Some(id) = document.get_first(self.fields.id).and_then(|value| value.as_str()) {
                ids.push(id.to_string());
            }
        }
        Ok(ids)
    }

    fn fetch(&self, ids: &[String]) -> Result<Vec<StoredDoc>, IndexError> {
        let searcher = self.reader.searcher();
        let mut docs = Vec::with_capacity(ids.len());
        for id in ids {
            let query = TermQuery::new(
                Term::from_field_text(self.fields.id, id),
                IndexRecordOption::Basic,
            );
            let Some((_score, address)) = searcher
                .search(&query, &TopDocs::with_limit(1))
                .map_err(lexical_error)?
                .into_iter()
                .next()
            else {
                continue;
            };
            let document: TantivyDocument = searcher.doc(address).map_err(lexical_error)?;
            let text = document
                .get_first(self.fields.text)
                .and_then(|value| value.as_str())
                .unwrap_or_default()
                .to_string();
            let metadata = document
                .get_first(self.fields.metadata)
                .and_then(|value| value.as_str())
                .and_then(|raw| serde_json::from_str::<ChunkMetadata>(raw).ok())
                .unwrap_or_default();
            docs.push(StoredDoc {
                id: id.clone(),
                text,
                metadata,
            });
        }
        Ok(docs)
    }
}

#[async_trait]
impl LexicalIndex for TantivyLexicalIndex {
    async fn upsert(&self, docs: Vec<StoredDoc>) -> Result<usize, IndexError> {
        if docs.is_empty() {
            return Ok(0);
        }
        let written = self.blocking(move |inner| inner.upsert(&docs)).await?;
        tracing::debug!(docs = written, "Lexical documents upserted");
        Ok(written)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>, IndexError> {
        let query = query.to_string();
        self.blocking(move |inner| inner.search(&query, limit)).await
    }

    async fn fetch(&self, ids: &[String]) -> Result<Vec<StoredDoc>, IndexError> {
        let ids = ids.to_vec();
        self.blocking(move |inner| inner.fetch(&ids)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(id: &str, text: &str) -> StoredDoc {
        StoredDoc {
            id: id.into(),
            text: text.into(),
            metadata: ChunkMetadata {
                doc_id: id.into(),
                source: "report.txt".into(),
                page_start: 1,
                page_end: 1,
                ..ChunkMetadata::default()
            },
        }
    }

    #[test]
    fn terms_mix_words_and_bigrams() {
        let script = ScriptProfile::default();
        assert_eq!(
            lexical_terms("Budget 2024 งบประมาณ", &script),
            vec!["budget", "2024", "งบ", "บป", "ปร", "ระ", "ะม", "มา", "าณ"]
        );
        assert_eq!(lexical_terms("ก", &script), vec!["ก"]);
        assert!(lexical_terms("  ,,  ", &script).is_empty());
    }

    #[tokio::test]
    async fn search_ranks_matching_documents() {
        let index = TantivyLexicalIndex::in_memory(ScriptProfile::default()).expect("index");
        index
            .upsert(vec![
                stored("a", "The annual budget was approved."),
                stored("b", "Weather report for the northern provinces."),
                stored("c", "งบประมาณประจำปีได้รับการอนุมัติ"),
            ])
            .await
            .expect("upsert");

        assert_eq!(index.search("budget", 10).await.expect("search"), vec!["a"]);
        assert_eq!(index.search("งบประมาณ", 10).await.expect("search"), vec!["c"]);
        assert!(index.search("zzz", 10).await.expect("search").is_empty());
        assert!(index.search("   ", 10).await.expect("search").is_empty());
    }

    #[tokio::test]
    async fn upsert_replaces_existing_ids() {
        let index = TantivyLexicalIndex::in_memory(ScriptProfile::default()).expect("index");
        index.upsert(vec![stored("a", "old budget text")]).await.expect("upsert");
        index.upsert(vec![stored("a", "new forecast text")]).await.expect("upsert");

        assert!(index.search("budget", 10).await.expect("search").is_empty());
        assert_eq!(index.search("forecast", 10).await.expect("search"), vec!["a"]);
        let docs = index.fetch(&["a".to_string()]).await.expect("fetch");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "new forecast text");
    }

    #[tokio::test]
    async fn fetch_keeps_request_order_and_skips_unknown() {
        let index = TantivyLexicalIndex::in_memory(ScriptProfile::default()).expect("index");
        index
            .upsert(vec![stored("a", "alpha text"), stored("b", "beta text")])
            .await
            .expect("upsert");

        let docs = index
            .fetch(&["b".to_string(), "missing".to_string(), "a".to_string()])
            .await
            .expect("fetch");
        let ids: Vec<&str> = docs.iter().map(|doc| doc.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(docs[0].metadata.source, "report.txt");
    }

    #[tokio::test]
    async fn on_disk_index_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let index = TantivyLexicalIndex::open(dir.path(), ScriptProfile::default()).expect("open");
            index.upsert(vec![stored("a", "persistent budget")]).await.expect("upsert");
        }
        let index = TantivyLexicalIndex::open(dir.path(), ScriptProfile::default()).expect("reopen");
        assert_eq!(index.search("budget", 5).await.expect("search"), vec!["a"]);
    }
}
