use crate::graph_store::GraphConfig;
use crate::llm::{GeminiConfig, DEFAULT_GEMINI_API_BASE, DEFAULT_GEMINI_MODEL};
use crate::qa_chain::DEFAULT_TOP_K;
use crate::loader::{LoaderConfig, DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE, DEFAULT_CHECKPOINT_INTERVAL};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_DATASET: &str = "tmdb_movies_2023.csv";
pub const DEFAULT_DATABASE: &str = "neo4j";

const REQUIRED: [&str; 4] = ["NEO4J_URI", "NEO4J_USER", "NEO4J_PASSWORD", "GEMINI_API_KEY"];

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub graph: GraphConfig,
    pub gemini: GeminiConfig,
    pub loader: LoaderConfig,
    /// Result rows handed to the model per question.
    pub qa_top_k: usize,
    pub dataset_path: PathBuf,
    pub skip_load: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source. Blank values count as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let missing: Vec<&'static str> = REQUIRED.iter().copied().filter(|name| get(*name).is_none()).collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }
        let required = |name: &str| get(name).unwrap_or_default();

        let loader = LoaderConfig {
            batch_size: parse_or(&get, "LOAD_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            checkpoint_interval: parse_or(&get, "LOAD_CHECKPOINT_INTERVAL", DEFAULT_CHECKPOINT_INTERVAL)?,
            batch_delay: Duration::from_millis(parse_or(
                &get,
                "LOAD_BATCH_DELAY_MS",
                DEFAULT_BATCH_DELAY.as_millis() as u64,
            )?),
        };
        if loader.batch_size == 0 {
            return Err(ConfigError::Invalid {
                name: "LOAD_BATCH_SIZE",
                value: "0".to_string(),
            });
        }
        let qa_top_k = parse_or(&get, "QA_TOP_K", DEFAULT_TOP_K)?;
        if qa_top_k == 0 {
            return Err(ConfigError::Invalid {
                name: "QA_TOP_K",
                value: "0".to_string(),
            });
        }

        Ok(Config {
            graph: GraphConfig {
                uri: required("NEO4J_URI"),
                user: required("NEO4J_USER"),
                password: required("NEO4J_PASSWORD"),
                database: get("NEO4J_DATABASE").unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            },
            gemini: GeminiConfig {
                api_key: required("GEMINI_API_KEY"),
                model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
                api_base: get("GEMINI_API_BASE").unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string()),
            },
            loader,
            qa_top_k,
            dataset_path: get("MOVIE_DATASET")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATASET)),
            skip_load: parse_or(&get, "SKIP_LOAD", false)?,
        })
    }
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}
