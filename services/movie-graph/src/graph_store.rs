//! Graph store boundary.
//!
//! The loader and the connection manager only ever issue three kinds of
//! statement: the liveness probe, the idempotent schema bootstrap and the
//! bulk movie upsert. `GraphStore` captures exactly those; `Neo4jStore` is
//! the production implementation on top of neo4rs.

use crate::movie::Movie;
use async_trait::async_trait;
use neo4rs::{query, BoltType, ConfigBuilder, Graph, Query, Row};
use std::collections::HashMap;
use thiserror::Error;
use tracing::info;

// ============================================================================
// Statements
// ============================================================================

pub const PROBE_STATEMENT: &str = "RETURN 1";

/// Safe to run on every load: all use IF NOT EXISTS.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE CONSTRAINT movie_id IF NOT EXISTS FOR (m:Movie) REQUIRE m.id IS UNIQUE",
    "CREATE CONSTRAINT genre_name IF NOT EXISTS FOR (g:Genre) REQUIRE g.name IS UNIQUE",
    "CREATE INDEX movie_title IF NOT EXISTS FOR (m:Movie) ON (m.title)",
];

pub const MOVIE_UPSERT: &str = "UNWIND $movies AS movie
     MERGE (m:Movie {id: movie.id})
     SET m.title = movie.title,
         m.overview = movie.overview,
         m.release_date = movie.release_date,
         m.vote_average = COALESCE(movie.vote_average, 0.0),
         m.vote_count = COALESCE(movie.vote_count, 0),
         m.popularity = COALESCE(movie.popularity, 0.0)
     WITH m, movie
     UNWIND movie.genres AS genre
     WITH m, genre
     WHERE genre IS NOT NULL
     MERGE (g:Genre {name: genre})
     MERGE (m)-[:HAS_GENRE]->(g)";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport level failure; reconnecting may help.
    #[error("graph store unavailable: {0}")]
    Unavailable(String),
    #[error("graph store is not connected")]
    Disconnected,
    #[error("graph statement failed: {0}")]
    Statement(String),
    #[error("invalid graph store configuration: {0}")]
    Config(String),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Disconnected)
    }
}

impl From<neo4rs::Error> for StoreError {
    fn from(err: neo4rs::Error) -> Self {
        if is_transport_failure(&err) {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Statement(err.to_string())
        }
    }
}

/// An io error anywhere in the source chain, or a Neo4j transient error code.
fn is_transport_failure(err: &neo4rs::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<std::io::Error>() {
            return true;
        }
        source = e.source();
    }
    let message = err.to_string();
    message.contains("Neo.TransientError") || message.contains("ServiceUnavailable")
}

// ============================================================================
// Traits
// ============================================================================

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Trivial round trip used to decide whether the handle is alive.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Merge a whole batch in a single statement.
    async fn upsert_movies(&self, movies: &[Movie]) -> Result<(), StoreError>;

    /// Release the handle. Errors are not reported.
    fn close(self)
    where
        Self: Sized,
    {
    }
}

/// Opens store handles with a fixed set of credentials.
#[async_trait]
pub trait Connector: Send + Sync {
    type Store: GraphStore;

    /// Where this connector points, for log lines.
    fn target(&self) -> &str;

    async fn connect(&self) -> Result<Self::Store, StoreError>;
}

// ============================================================================
// Neo4j
// ============================================================================

#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct Neo4jConnector {
    config: GraphConfig,
}

impl Neo4jConnector {
    pub fn new(config: GraphConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for Neo4jConnector {
    type Store = Neo4jStore;

    fn target(&self) -> &str {
        &self.config.uri
    }

    async fn connect(&self) -> Result<Neo4jStore, StoreError> {
        let neo4j_config = ConfigBuilder::default()
            .uri(&self.config.uri)
            .user(&self.config.user)
            .password(&self.config.password)
            .db(self.config.database.as_str())
            .max_connections(4)
            .fetch_size(500)
            .build()
            .map_err(|e| StoreError::Config(e.to_string()))?;

        let graph = Graph::connect(neo4j_config).await?;
        Ok(Neo4jStore { graph })
    }
}

/// A neo4rs connection pool. Dropping it closes the pool.
#[derive(Clone)]
pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    /// Run a read statement and collect at most `limit` rows.
    pub async fn fetch(&self, q: Query, limit: usize) -> Result<Vec<Row>, StoreError> {
        let mut stream = self.graph.execute(q).await?;
        let mut rows = Vec::new();
        while rows.len() < limit {
            match stream.next().await? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.graph.run(query(PROBE_STATEMENT)).await?;
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA_STATEMENTS {
            self.graph.run(query(statement)).await?;
        }
        info!("   Schema ensured ({} statements)", SCHEMA_STATEMENTS.len());
        Ok(())
    }

    async fn upsert_movies(&self, movies: &[Movie]) -> Result<(), StoreError> {
        let params: Vec<HashMap<String, BoltType>> =
            movies.iter().map(Movie::to_bolt_map).collect();
        let q = query(MOVIE_UPSERT).param("movies", params);
        self.graph.run(q).await?;
        Ok(())
    }
}
