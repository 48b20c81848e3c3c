//! Graph Cypher QA chain.
//!
//! Turns a question into an answer in four steps: render the generation
//! prompt from the captured graph schema, ask the model for a Cypher
//! statement, run it read-only, then ask the model to phrase the rows as
//! an answer. The generated statement is not interpreted beyond the
//! read-only check.

use crate::graph_store::{Connector, GraphConfig, GraphStore, Neo4jConnector, Neo4jStore, StoreError};
use crate::llm::{GeminiClient, GeminiConfig, LanguageModel, LlmError};
use async_trait::async_trait;
use neo4rs::query;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_TOP_K: usize = 10;

const CYPHER_GENERATION_TEMPLATE: &str = "Task: Write a Cypher statement that answers a question about a graph database.
Rules:
- Use only the node labels, relationship types and properties listed in the schema.
- The statement must only read data.
- Reply with the Cypher statement alone, without explanations.

Schema:
{schema}

Question:
{question}";

const CYPHER_QA_TEMPLATE: &str = "You turn database results into a short, human readable answer.
The results below are authoritative; do not correct them from your own knowledge
and do not mention that they came from a database.
If the results are empty, say that you do not know the answer.

Results:
{context}

Question: {question}
Answer:";

#[derive(Debug, Error)]
pub enum QaError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("language model did not produce a Cypher statement")]
    EmptyCypher,
    #[error("generated statement is not read-only: {0}")]
    UnsafeCypher(String),
    #[error("failed to decode query results: {0}")]
    Decode(String),
}

impl QaError {
    /// The class of failure that a fresh connection may fix.
    pub fn is_service_unavailable(&self) -> bool {
        match self {
            QaError::Store(e) => e.is_unavailable(),
            QaError::Llm(e) => e.is_unavailable(),
            _ => false,
        }
    }
}

/// Answers natural-language questions about the graph.
#[async_trait]
pub trait QaChain: Send + Sync {
    async fn run(&self, question: &str) -> Result<String, QaError>;
}

/// Builds a chain with fresh connections; used on init and re-init.
#[async_trait]
pub trait QaChainFactory: Send + Sync {
    type Chain: QaChain;

    async fn build(&self) -> Result<Self::Chain, QaError>;
}

/// Read side of the graph as the QA chain uses it.
#[async_trait]
pub trait GraphReader: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    /// Labels, relationship types and their properties, rendered for a prompt.
    async fn schema(&self) -> Result<String, QaError>;

    /// Run `cypher` and return at most `limit` rows as JSON objects.
    async fn read_rows(&self, cypher: &str, limit: usize) -> Result<Vec<Value>, QaError>;
}

#[async_trait]
impl GraphReader for Neo4jStore {
    async fn ping(&self) -> Result<(), StoreError> {
        GraphStore::ping(self).await
    }

    async fn schema(&self) -> Result<String, QaError> {
        fetch_schema(self).await
    }

    async fn read_rows(&self, cypher: &str, limit: usize) -> Result<Vec<Value>, QaError> {
        self.fetch(query(cypher), limit)
            .await?
            .iter()
            .map(|row| row.to::<Value>().map_err(|e| QaError::Decode(e.to_string())))
            .collect()
    }
}

pub struct CypherQaChain<S: GraphReader, M: LanguageModel> {
    store: S,
    llm: M,
    schema: String,
    top_k: usize,
}

impl<S: GraphReader, M: LanguageModel> CypherQaChain<S, M> {
    /// Probe the store and capture its schema.
    pub async fn from_llm(store: S, llm: M) -> Result<Self, QaError> {
        store.ping().await?;
        let schema = store.schema().await?;
        debug!(%schema, "captured graph schema");
        Ok(Self {
            store,
            llm,
            schema,
            top_k: DEFAULT_TOP_K,
        })
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

#[async_trait]
impl<S: GraphReader, M: LanguageModel> QaChain for CypherQaChain<S, M> {
    async fn run(&self, question: &str) -> Result<String, QaError> {
        let generated = self
            .llm
            .complete(&generation_prompt(&self.schema, question))
            .await?;
        let cypher = extract_cypher(&generated).ok_or(QaError::EmptyCypher)?;
        ensure_read_only(&cypher)?;
        info!("🔎 Generated Cypher: {}", cypher);

        let rows = self.store.read_rows(&cypher, self.top_k).await?;
        let context = serde_json::to_string(&rows).map_err(|e| QaError::Decode(e.to_string()))?;
        debug!(rows = rows.len(), "query context: {}", context);

        let answer = self.llm.complete(&answer_prompt(&context, question)).await?;
        Ok(answer.trim().to_string())
    }
}

/// Production factory: a new Neo4j pool and Gemini client per build.
#[derive(Debug, Clone)]
pub struct Neo4jQaFactory {
    graph: GraphConfig,
    gemini: GeminiConfig,
    top_k: usize,
}

impl Neo4jQaFactory {
    pub fn new(graph: GraphConfig, gemini: GeminiConfig, top_k: usize) -> Self {
        Self { graph, gemini, top_k }
    }
}

#[async_trait]
impl QaChainFactory for Neo4jQaFactory {
    type Chain = CypherQaChain<Neo4jStore, GeminiClient>;

    async fn build(&self) -> Result<Self::Chain, QaError> {
        let store = Neo4jConnector::new(self.graph.clone()).connect().await?;
        let llm = GeminiClient::new(self.gemini.clone());
        Ok(CypherQaChain::from_llm(store, llm).await?.with_top_k(self.top_k))
    }
}

// ============================================================================
// Prompts and statement handling
// ============================================================================

pub(crate) fn generation_prompt(schema: &str, question: &str) -> String {
    CYPHER_GENERATION_TEMPLATE
        .replace("{schema}", schema)
        .replace("{question}", question.trim())
}

pub(crate) fn answer_prompt(context: &str, question: &str) -> String {
    CYPHER_QA_TEMPLATE
        .replace("{context}", context)
        .replace("{question}", question.trim())
}

/// Pull the statement out of a model reply, dropping markdown fences.
pub(crate) fn extract_cypher(reply: &str) -> Option<String> {
    let mut text = reply.trim();

    if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        // skip the info string (```cypher)
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        text = match body.find("```") {
            Some(end) => &body[..end],
            None => body,
        };
    }

    let text = text.trim();
    let text = text
        .strip_prefix("cypher")
        .or_else(|| text.strip_prefix("Cypher:"))
        .unwrap_or(text)
        .trim()
        .trim_end_matches(';')
        .trim();

    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn write_clause() -> &'static Regex {
    static WRITE_CLAUSE: OnceLock<Regex> = OnceLock::new();
    WRITE_CLAUSE.get_or_init(|| {
        Regex::new(r"(?i)\b(CREATE|MERGE|DELETE|DETACH|SET|REMOVE|DROP|FOREACH|LOAD\s+CSV)\b")
            .expect("write clause pattern is valid")
    })
}

/// The query side never mutates the graph.
///
/// Only clause keywords count: string literals, quoted identifiers and
/// comments are blanked before matching.
pub(crate) fn ensure_read_only(cypher: &str) -> Result<(), QaError> {
    let code = strip_literals(cypher);
    match write_clause().find(&code) {
        Some(m) => Err(QaError::UnsafeCypher(format!(
            "contains {}",
            m.as_str().to_uppercase()
        ))),
        None => Ok(()),
    }
}

fn strip_literals(cypher: &str) -> String {
    let mut out = String::with_capacity(cypher.len());
    let mut chars = cypher.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                while let Some(n) = chars.next() {
                    if n == '\\' && c != '`' {
                        chars.next();
                    } else if n == c {
                        // doubled backtick inside an identifier
                        if c == '`' && chars.peek() == Some(&'`') {
                            chars.next();
                            continue;
                        }
                        break;
                    }
                }
                out.push(' ');
            }
            '/' if chars.peek() == Some(&'/') => {
                for n in chars.by_ref() {
                    if n == '\n' {
                        break;
                    }
                }
                out.push('\n');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

// ============================================================================
// Schema introspection
// ============================================================================

const NODE_PROPERTIES: &str = "CALL db.schema.nodeTypeProperties()
     YIELD nodeLabels, propertyName, propertyTypes
     RETURN nodeLabels, propertyName, propertyTypes";

const REL_PROPERTIES: &str = "CALL db.schema.relTypeProperties()
     YIELD relType, propertyName, propertyTypes
     RETURN relType, propertyName, propertyTypes";

const REL_PATTERNS: &str = "MATCH (a)-[r]->(b)
     RETURN DISTINCT labels(a)[0] AS source, type(r) AS rel, labels(b)[0] AS target
     LIMIT 50";

const SCHEMA_ROW_LIMIT: usize = 1_000;

#[derive(Debug, Default, PartialEq)]
pub(crate) struct SchemaSummary {
    pub nodes: BTreeMap<String, Vec<(String, String)>>,
    pub relationships: BTreeMap<String, Vec<(String, String)>>,
    pub patterns: Vec<(String, String, String)>,
}

impl SchemaSummary {
    pub fn render(&self) -> String {
        let mut out = String::from("Node properties:\n");
        for (label, props) in &self.nodes {
            out.push_str(&format!("{} {{{}}}\n", label, render_props(props)));
        }
        out.push_str("Relationship properties:\n");
        for (rel, props) in &self.relationships {
            out.push_str(&format!("{} {{{}}}\n", rel, render_props(props)));
        }
        out.push_str("The relationships:\n");
        for (source, rel, target) in &self.patterns {
            out.push_str(&format!("(:{})-[:{}]->(:{})\n", source, rel, target));
        }
        out
    }
}

fn render_props(props: &[(String, String)]) -> String {
    props
        .iter()
        .map(|(name, kind)| format!("{}: {}", name, kind))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `":`Movie`"` -> `"Movie"`
fn clean_type_name(raw: &str) -> String {
    raw.trim_start_matches(':').trim_matches('`').to_string()
}

fn decode(e: impl std::fmt::Debug) -> QaError {
    QaError::Decode(format!("{:?}", e))
}

async fn fetch_schema(store: &Neo4jStore) -> Result<String, QaError> {
    let mut summary = SchemaSummary::default();

    for row in store.fetch(query(NODE_PROPERTIES), SCHEMA_ROW_LIMIT).await? {
        let labels: Vec<String> = row.get("nodeLabels").map_err(decode)?;
        let name: Option<String> = row.get("propertyName").map_err(decode)?;
        let types: Option<Vec<String>> = row.get("propertyTypes").map_err(decode)?;
        for label in labels {
            let entry = summary.nodes.entry(label).or_default();
            if let Some(name) = &name {
                entry.push((name.clone(), types.clone().unwrap_or_default().join("|")));
            }
        }
    }

    for row in store.fetch(query(REL_PROPERTIES), SCHEMA_ROW_LIMIT).await? {
        let rel: String = row.get("relType").map_err(decode)?;
        let name: Option<String> = row.get("propertyName").map_err(decode)?;
        let types: Option<Vec<String>> = row.get("propertyTypes").map_err(decode)?;
        if let Some(name) = name {
            summary
                .relationships
                .entry(clean_type_name(&rel))
                .or_default()
                .push((name, types.unwrap_or_default().join("|")));
        }
    }

    for row in store.fetch(query(REL_PATTERNS), SCHEMA_ROW_LIMIT).await? {
        let source: Option<String> = row.get("source").map_err(decode)?;
        let rel: String = row.get("rel").map_err(decode)?;
        let target: Option<String> = row.get("target").map_err(decode)?;
        if let (Some(source), Some(target)) = (source, target) {
            summary.patterns.push((source, rel, target));
        }
    }

    Ok(summary.render())
}
