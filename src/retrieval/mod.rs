//! Document retrieval for the writing agent.
//!
//! [`KeywordRetriever`] ranks chunks by term overlap with the query. It is
//! in-process and has no embedding model; any [`Retriever`] can stand in.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{ColloquyError, Result};
use crate::tools::{AgentTool, AgentToolParameters, Tool};

/// Default number of chunks returned per query.
pub const DEFAULT_K: usize = 5;
/// Target chunk size in characters for [`KeywordRetriever::from_dir`].
pub const CHUNK_SIZE: usize = 1000;

/// A retrievable chunk of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: json!({}),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Up to `k` documents most relevant to `query`, best first.
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Document>>;
}

/// Term-overlap retriever over an in-memory document set.
#[derive(Debug, Default)]
pub struct KeywordRetriever {
    documents: Vec<(Document, HashSet<String>)>,
}

impl KeywordRetriever {
    pub fn from_documents(documents: Vec<Document>) -> Self {
        let documents = documents
            .into_iter()
            .map(|d| {
                let terms = terms(&d.content);
                (d, terms)
            })
            .collect();
        Self { documents }
    }

    /// Load every `.txt` and `.md` file under `dir`, split into chunks.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(ColloquyError::Configuration(format!(
                "knowledge directory {} does not exist",
                dir.display()
            )));
        }

        let mut files = Vec::new();
        collect_files(dir, &mut files)?;
        files.sort();

        let mut documents = Vec::new();
        for path in files {
            let text = match std::fs::read_to_string(&path) {
                Ok(t) => t,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable document");
                    continue;
                }
            };
            for (i, chunk) in chunk_text(&text, CHUNK_SIZE).into_iter().enumerate() {
                documents.push(Document::new(chunk).with_metadata(json!({
                    "source": path.display().to_string(),
                    "chunk": i,
                })));
            }
        }
        info!(dir = %dir.display(), chunks = documents.len(), "loaded knowledge base");
        Ok(Self::from_documents(documents))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl Retriever for KeywordRetriever {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Document>> {
        let query_terms = terms(query);
        let mut scored: Vec<(usize, usize)> = self
            .documents
            .iter()
            .enumerate()
            .map(|(idx, (_, doc_terms))| (idx, query_terms.intersection(doc_terms).count()))
            .filter(|(_, score)| *score > 0)
            .collect();
        // stable: equal scores keep corpus order
        scored.sort_by(|a, b| b.1.cmp(&a.1));

        debug!(query, hits = scored.len(), k, "keyword retrieval");
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(idx, _)| self.documents[idx].0.clone())
            .collect())
    }
}

/// `rag_document_retrieval` tool over `retriever`.
pub fn retrieval_tool(retriever: Arc<dyn Retriever>) -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "rag_document_retrieval",
        "Search the local knowledge base for passages relevant to a query. \
         Returns a list of {content, metadata} objects.",
        AgentToolParameters::object()
            .string("query", "What to look up", true)
            .integer("k", "Number of passages to return (default 5)", false)
            .build(),
        move |args, _ctx| {
            let retriever = retriever.clone();
            async move {
                let query = args.get_str("query")?.to_string();
                let k = args.get_u64_opt("k").map_or(DEFAULT_K, |k| k as usize);
                let docs = retriever.similarity_search(&query, k).await?;
                Ok::<_, ColloquyError>(serde_json::to_value(docs)?)
            }
        },
    ))
}

/// Lowercased word terms; CJK characters count as one term each.
fn terms(text: &str) -> HashSet<String> {
    let mut out = HashSet::new();
    let mut word = String::new();
    for ch in text.chars() {
        if is_cjk(ch) {
            if !word.is_empty() {
                out.insert(std::mem::take(&mut word));
            }
            out.insert(ch.to_string());
        } else if ch.is_alphanumeric() {
            word.extend(ch.to_lowercase());
        } else if !word.is_empty() {
            out.insert(std::mem::take(&mut word));
        }
    }
    if !word.is_empty() {
        out.insert(word);
    }
    out
}

fn is_cjk(ch: char) -> bool {
    matches!(ch as u32, 0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF)
}

/// Split on blank lines, packing paragraphs into chunks of at most `size` chars.
fn chunk_text(text: &str, size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if !current.is_empty() && current.chars().count() + para.chars().count() + 2 > size {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(para);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("txt") | Some("md")
        ) {
            out.push(path);
        }
    }
    Ok(())
}
