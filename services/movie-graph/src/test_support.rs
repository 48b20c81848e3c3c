//! In-memory doubles for the graph store and the QA chain.

use crate::graph_store::{Connector, GraphStore, StoreError};
use crate::llm::{LanguageModel, LlmError};
use crate::movie::{Movie, Record};
use crate::qa_chain::{GraphReader, QaChain, QaChainFactory, QaError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Connect,
    Ping,
    Schema,
    /// Attempted upsert with the batch size; `false` when it was made to fail.
    Upsert(usize, bool),
    Close,
}

/// Shared state behind every handle a `FakeConnector` hands out.
#[derive(Debug, Default)]
pub struct FakeGraph {
    pub movies: BTreeMap<i64, Movie>,
    pub genres: BTreeSet<String>,
    pub has_genre: BTreeSet<(i64, String)>,
    pub events: Vec<StoreEvent>,
    pub connects: usize,
    pub closes: usize,
    pub failing_connects: usize,
    pub failing_pings: usize,
    /// Upsert outcomes consumed front to back; `false` fails that attempt.
    pub upsert_script: VecDeque<bool>,
}

impl FakeGraph {
    pub fn upsert_sizes(&self) -> Vec<usize> {
        self.events
            .iter()
            .filter_map(|e| match e {
                StoreEvent::Upsert(n, _) => Some(*n),
                _ => None,
            })
            .collect()
    }

    pub fn pings(&self) -> usize {
        self.events.iter().filter(|e| **e == StoreEvent::Ping).count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    graph: Arc<Mutex<FakeGraph>>,
}

impl FakeConnector {
    pub fn state(&self) -> MutexGuard<'_, FakeGraph> {
        self.graph.lock().expect("fake graph lock")
    }

    pub fn events(&self) -> Vec<StoreEvent> {
        self.state().events.clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Store = FakeStore;

    fn target(&self) -> &str {
        "memory://fake"
    }

    async fn connect(&self) -> Result<FakeStore, StoreError> {
        let mut state = self.state();
        state.connects += 1;
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        state.events.push(StoreEvent::Connect);
        Ok(FakeStore {
            graph: Arc::clone(&self.graph),
        })
    }
}

pub struct FakeStore {
    graph: Arc<Mutex<FakeGraph>>,
}

#[async_trait]
impl GraphStore for FakeStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut state = self.graph.lock().expect("fake graph lock");
        state.events.push(StoreEvent::Ping);
        if state.failing_pings > 0 {
            state.failing_pings -= 1;
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.graph
            .lock()
            .expect("fake graph lock")
            .events
            .push(StoreEvent::Schema);
        Ok(())
    }

    async fn upsert_movies(&self, movies: &[Movie]) -> Result<(), StoreError> {
        let mut state = self.graph.lock().expect("fake graph lock");
        let succeed = state.upsert_script.pop_front().unwrap_or(true);
        state.events.push(StoreEvent::Upsert(movies.len(), succeed));
        if !succeed {
            return Err(StoreError::Unavailable("session expired".into()));
        }

        // all or nothing, like a single autocommit statement
        for movie in movies {
            let mut node = movie.clone();
            node.genres.clear();
            state.movies.insert(movie.id, node);
            for genre in &movie.genres {
                state.genres.insert(genre.clone());
                state.has_genre.insert((movie.id, genre.clone()));
            }
        }
        Ok(())
    }

    fn close(self) {
        let mut state = self.graph.lock().expect("fake graph lock");
        state.closes += 1;
        state.events.push(StoreEvent::Close);
    }
}

/// `count` records with ids starting at 1 and two genres each.
pub fn sample_records(count: usize) -> Vec<Record> {
    (1..=count as i64)
        .map(|id| {
            let mut record = Record::new(id);
            record.title = Some(format!("Movie {}", id));
            record.vote_average = Some(6.5);
            record.vote_count = Some(100);
            record.popularity = Some(12.0);
            record.genres = crate::movie::GenreField::Text("Action, Drama".into());
            record
        })
        .collect()
}

// ============================================================================
// QA chain doubles
// ============================================================================

#[derive(Debug, Default)]
pub struct QaScript {
    pub builds: usize,
    pub failing_builds: usize,
    /// Number of upcoming runs that fail as service unavailable.
    pub unavailable_runs: usize,
    /// Questions that always fail with a non-retryable error.
    pub broken_questions: HashSet<String>,
    pub asked: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeQaFactory {
    script: Arc<Mutex<QaScript>>,
}

impl FakeQaFactory {
    pub fn script(&self) -> MutexGuard<'_, QaScript> {
        self.script.lock().expect("qa script lock")
    }
}

#[async_trait]
impl QaChainFactory for FakeQaFactory {
    type Chain = FakeQaChain;

    async fn build(&self) -> Result<FakeQaChain, QaError> {
        let mut script = self.script();
        script.builds += 1;
        if script.failing_builds > 0 {
            script.failing_builds -= 1;
            return Err(QaError::Store(StoreError::Unavailable("no route to host".into())));
        }
        Ok(FakeQaChain {
            script: Arc::clone(&self.script),
        })
    }
}

pub struct FakeQaChain {
    script: Arc<Mutex<QaScript>>,
}

#[async_trait]
impl QaChain for FakeQaChain {
    async fn run(&self, question: &str) -> Result<String, QaError> {
        let mut script = self.script.lock().expect("qa script lock");
        script.asked.push(question.to_string());
        if script.unavailable_runs > 0 {
            script.unavailable_runs -= 1;
            return Err(QaError::Store(StoreError::Unavailable("connection reset".into())));
        }
        if script.broken_questions.contains(question) {
            return Err(QaError::Llm(LlmError::Api {
                status: 400,
                body: "invalid prompt".into(),
            }));
        }
        Ok(format!("answer: {}", question))
    }
}

/// Graph reader with a canned schema and result set.
pub struct FakeReader {
    pub schema: String,
    pub rows: Vec<Value>,
    pub unavailable: bool,
    pub queries: Mutex<Vec<String>>,
}

impl FakeReader {
    pub fn new(rows: Vec<Value>) -> Self {
        Self {
            schema: "Node properties:\nMovie {title: String}\n".to_string(),
            rows,
            unavailable: false,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().expect("reader lock").clone()
    }
}

#[async_trait]
impl GraphReader for FakeReader {
    async fn ping(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(())
    }

    async fn schema(&self) -> Result<String, QaError> {
        Ok(self.schema.clone())
    }

    async fn read_rows(&self, cypher: &str, limit: usize) -> Result<Vec<Value>, QaError> {
        self.queries.lock().expect("reader lock").push(cypher.to_string());
        Ok(self.rows.iter().take(limit).cloned().collect())
    }
}

/// Replays scripted replies in order and records every prompt.
pub struct FakeModel {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl FakeModel {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("model lock").clone()
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().expect("model lock").push(prompt.to_string());
        self.replies
            .lock()
            .expect("model lock")
            .pop_front()
            .ok_or(LlmError::EmptyResponse)
    }
}
