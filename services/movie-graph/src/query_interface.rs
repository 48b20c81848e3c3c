//! Resilient question-answering façade over a QA chain.
//!
//! Every question goes through `ask`: service-unavailable failures rebuild
//! the chain and retry (3 attempts in total), anything else is returned as
//! an `Error: ...` answer. Nothing raised by the chain escapes this type.

use crate::qa_chain::{QaChain, QaChainFactory, QaError};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

pub const MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(2);
pub const DEFAULT_MIN_RATING: f64 = 7.0;
pub const DEFAULT_TREND_YEAR: i32 = 2023;

pub const INSIGHT_QUESTIONS: [&str; 5] = [
    "What are the top 5 highest-rated movies with at least 1000 votes?",
    "Which genres have the most movies?",
    "What are the most popular movies released in 2023?",
    "What are the average ratings for each genre?",
    "What are some hidden gems (high rating but low vote count)?",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Insight {
    pub question: String,
    pub answer: String,
}

pub struct MovieQueryInterface<F: QaChainFactory> {
    factory: F,
    chain: F::Chain,
    retry_backoff: Duration,
}

impl<F: QaChainFactory> MovieQueryInterface<F> {
    pub async fn connect(factory: F) -> Result<Self, QaError> {
        Self::connect_with_backoff(factory, DEFAULT_RETRY_BACKOFF).await
    }

    /// Build the chain, retrying up to `MAX_ATTEMPTS` times. Exhaustion is fatal.
    pub async fn connect_with_backoff(factory: F, retry_backoff: Duration) -> Result<Self, QaError> {
        let chain = initialize(&factory, retry_backoff).await?;
        info!("✅ Query interface ready");
        Ok(Self {
            factory,
            chain,
            retry_backoff,
        })
    }

    /// Answer `question`, or describe the failure in the returned text.
    #[instrument(name = "ask", skip(self))]
    pub async fn ask(&mut self, question: &str) -> String {
        info!("❓ Querying: {}", question.trim());
        match self.execute_with_retry(question).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("❌ Error querying '{}': {}", question.trim(), e);
                format!("Error: {}", e)
            }
        }
    }

    async fn execute_with_retry(&mut self, question: &str) -> Result<String, QaError> {
        let mut attempt = 1;
        loop {
            match self.chain.run(question).await {
                Ok(answer) => return Ok(answer),
                Err(e) if e.is_service_unavailable() && attempt < MAX_ATTEMPTS => {
                    warn!(
                        "⚠️  Query attempt {}/{} failed: {}. Reinitializing connections...",
                        attempt, MAX_ATTEMPTS, e
                    );
                    sleep(self.retry_backoff).await;
                    self.chain = initialize(&self.factory, self.retry_backoff).await?;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// The fixed panel of questions, each answered on its own.
    pub async fn get_movie_insights(&mut self) -> Vec<Insight> {
        let mut insights = Vec::with_capacity(INSIGHT_QUESTIONS.len());
        for question in INSIGHT_QUESTIONS {
            let answer = self.ask(question).await;
            insights.push(Insight {
                question: question.to_string(),
                answer,
            });
        }
        insights
    }

    pub async fn get_personalized_recommendations(&mut self, movie_title: &str, min_rating: f64) -> String {
        self.ask(&recommendation_question(movie_title, min_rating)).await
    }

    pub async fn analyze_genre_trends(&mut self, year: i32) -> String {
        self.ask(&genre_trend_question(year)).await
    }

    pub async fn custom_query(&mut self, question: &str) -> String {
        self.ask(question).await
    }
}

async fn initialize<F: QaChainFactory>(factory: &F, backoff: Duration) -> Result<F::Chain, QaError> {
    let mut attempt = 1;
    loop {
        match factory.build().await {
            Ok(chain) => return Ok(chain),
            Err(e) if attempt < MAX_ATTEMPTS => {
                warn!(
                    "⚠️  Connection attempt {}/{} failed: {}. Retrying in {:?}...",
                    attempt, MAX_ATTEMPTS, e, backoff
                );
                sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => {
                error!("❌ Failed to initialize query interface after {} attempts: {}", MAX_ATTEMPTS, e);
                return Err(e);
            }
        }
    }
}

pub fn recommendation_question(movie_title: &str, min_rating: f64) -> String {
    format!(
        "Find movies similar to '{}' that:\n\
         1. Share at least 2 genres with it\n\
         2. Have a rating above {:.1}\n\
         3. Are sorted by popularity\n\
         Limit to top 5 recommendations.",
        movie_title, min_rating
    )
}

pub fn genre_trend_question(year: i32) -> String {
    format!(
        "For movies released in {}:\n\
         1. Which genres were most popular?\n\
         2. What was the average rating per genre?\n\
         3. Which genre combinations appeared most frequently?",
        year
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recommendation_question_template() {
        let q = recommendation_question("The Dark Knight", DEFAULT_MIN_RATING);
        assert!(q.contains("'The Dark Knight'"));
        assert!(q.contains("at least 2 genres"));
        assert!(q.contains("rating above 7.0"));
        assert!(q.contains("sorted by popularity"));
        assert!(q.contains("top 5"));
    }

    #[test]
    fn test_genre_trend_question_template() {
        let q = genre_trend_question(1999);
        assert!(q.starts_with("For movies released in 1999:"));
        assert!(q.contains("average rating per genre"));
        assert!(q.contains("genre combinations"));
    }

    #[test]
    fn test_insight_panel_is_fixed() {
        assert_eq!(INSIGHT_QUESTIONS.len(), 5);
        assert!(INSIGHT_QUESTIONS[0].contains("at least 1000 votes"));
        assert!(INSIGHT_QUESTIONS[4].contains("hidden gems"));
    }
}
