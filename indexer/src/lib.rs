use anyhow::{Context, Result};
use engine::document_data_db::DOCUMENT_URL_TABLE;
use engine::{DocId, DocumentDataDb, Environment, PostingDb, NO_DOC};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One pre-tokenized document as produced by the extractor.
#[derive(Debug, Deserialize)]
pub struct InputDoc {
    pub id: DocId,
    pub url: String,
    #[serde(default)]
    pub terms: Vec<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub documents: usize,
    pub skipped: usize,
    pub terms: usize,
}

/// `.json`/`.jsonl` files under `input`, or `input` itself if it is a file.
pub fn collect_input_files(input: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
        files.sort();
    } else if input.is_file() {
        files.push(input.to_path_buf());
    }
    files
}

pub fn read_docs(file: &Path) -> Result<Vec<InputDoc>> {
    let f = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    let reader = BufReader::new(f);
    if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
        let mut docs = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let doc = serde_json::from_str(&line).with_context(|| format!("{}:{}", file.display(), n + 1))?;
            docs.push(doc);
        }
        return Ok(docs);
    }
    let json: Value = serde_json::from_reader(reader).with_context(|| format!("parsing {}", file.display()))?;
    Ok(match json {
        Value::Array(arr) => arr.into_iter().map(serde_json::from_value).collect::<Result<_, _>>()?,
        Value::Object(_) => vec![serde_json::from_value(json)?],
        _ => Vec::new(),
    })
}

/// Store every document's URL and add its id to each of its terms' posting
/// lists, in a single write transaction.
pub fn load(env: &Environment, docs: impl IntoIterator<Item = InputDoc>) -> Result<LoadStats> {
    let mut stats = LoadStats::default();
    let mut additions: BTreeMap<Vec<u8>, BTreeSet<DocId>> = BTreeMap::new();

    let txn = env.begin_write();
    {
        let urls = DocumentDataDb::open(DOCUMENT_URL_TABLE, &txn)?;
        for doc in docs {
            if doc.id == NO_DOC || doc.url.is_empty() {
                tracing::warn!(id = doc.id, url = %doc.url, "skipping document without id or url");
                stats.skipped += 1;
                continue;
            }
            urls.put(doc.id, doc.url.as_bytes())?;
            for term in doc.terms.into_iter().filter(|t| !t.is_empty()) {
                additions.entry(term.into_bytes()).or_default().insert(doc.id);
            }
            stats.documents += 1;
        }

        let postings = PostingDb::open(&txn)?;
        for (term, ids) in additions {
            let mut merged: BTreeSet<DocId> = postings.get(&term)?.into_iter().collect();
            merged.extend(ids);
            let list: Vec<DocId> = merged.into_iter().collect();
            postings.put(&term, &list)?;
            stats.terms += 1;
        }
    }
    txn.commit()?;

    tracing::info!(documents = stats.documents, skipped = stats.skipped, terms = stats.terms, "load complete");
    Ok(stats)
}

pub fn term_postings(env: &Environment, term: &str) -> Result<Value> {
    let txn = env.begin_read();
    let db = PostingDb::open(&txn)?;
    let ids = if term.is_empty() { Vec::new() } else { db.get(term.as_bytes())? };
    Ok(json!({ "term": term, "doc_ids": ids }))
}

pub fn prefix_postings(env: &Environment, prefix: &str) -> Result<Value> {
    let txn = env.begin_read();
    let db = PostingDb::open(&txn)?;
    let expansion = db.prefix_expand(prefix.as_bytes())?;
    let terms: Vec<String> = expansion.terms.iter().map(|t| String::from_utf8_lossy(t).into_owned()).collect();
    let ids: Vec<DocId> = expansion.iterator.map(|it| it.collect()).unwrap_or_default();
    Ok(json!({ "prefix": prefix, "terms": terms, "doc_ids": ids }))
}

pub fn document_url(env: &Environment, id: DocId) -> Result<Value> {
    if id == NO_DOC {
        return Ok(json!({ "error": "document ids start at 1" }));
    }
    let txn = env.begin_read();
    let db = DocumentDataDb::open(DOCUMENT_URL_TABLE, &txn)?;
    Ok(match db.get(id)? {
        Some(url) => json!({ "doc_id": id, "url": String::from_utf8_lossy(&url) }),
        None => json!({ "error": "not found" }),
    })
}

pub fn delete_document(env: &Environment, id: DocId) -> Result<bool> {
    if id == NO_DOC {
        return Ok(false);
    }
    let txn = env.begin_write();
    let removed = DocumentDataDb::open(DOCUMENT_URL_TABLE, &txn)?.del(id)?;
    txn.commit()?;
    Ok(removed)
}
