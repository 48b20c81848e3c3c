use anyhow::{Context, Result};
use movie_graph::config::Config;
use movie_graph::connection::{ConnectionManager, DEFAULT_RECONNECT_BACKOFF};
use movie_graph::graph_store::Neo4jConnector;
use movie_graph::loader::MovieGraphLoader;
use movie_graph::qa_chain::Neo4jQaFactory;
use movie_graph::query_interface::{MovieQueryInterface, DEFAULT_MIN_RATING, DEFAULT_TREND_YEAR};
use tracing::{error, info, warn};

const SAMPLE_TITLE: &str = "The Dark Knight";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("🚀 Movie Graph starting...");

    let config = Config::from_env().context("Failed to load configuration")?;

    if let Err(e) = run(config).await {
        error!("❌ {:#}", e);
        print_troubleshooting();
        return Err(e);
    }

    info!("👋 Movie Graph finished");
    Ok(())
}

async fn run(config: Config) -> Result<()> {
    if config.skip_load {
        info!("⏭️  SKIP_LOAD set, not loading {}", config.dataset_path.display());
    } else {
        let connection = ConnectionManager::connect(
            Neo4jConnector::new(config.graph.clone()),
            DEFAULT_RECONNECT_BACKOFF,
        )
        .await
        .context("Failed to connect to Neo4j")?;

        let mut loader = MovieGraphLoader::new(connection, config.loader.clone());
        let report = loader
            .load(&config.dataset_path)
            .await
            .context("Movie load failed")?;
        loader.close();

        let summary = serde_json::to_string(&report).context("Failed to serialize load report")?;
        info!("📋 Load report: {}", summary);

        if report.is_complete() {
            info!(
                "✅ Load {} complete: {} movies in {} batches",
                report.run_id, report.processed_records, report.batches
            );
        } else {
            warn!(
                "⚠️  Load {} incomplete: {}/{} movies, skipped ranges {:?}",
                report.run_id, report.processed_records, report.total_records, report.skipped_batches
            );
        }
    }

    let factory = Neo4jQaFactory::new(config.graph.clone(), config.gemini.clone(), config.qa_top_k);
    let mut queries = MovieQueryInterface::connect(factory)
        .await
        .context("Failed to initialize query interface")?;

    println!("\n=== Movie Database Insights ===");
    for insight in queries.get_movie_insights().await {
        println!("\nQ: {}", insight.question);
        println!("A: {}", insight.answer);
    }

    println!("\n=== Movie Recommendations ===");
    let recommendations = queries
        .get_personalized_recommendations(SAMPLE_TITLE, DEFAULT_MIN_RATING)
        .await;
    println!("\nRecommendations based on '{}':", SAMPLE_TITLE);
    println!("{}", recommendations);

    println!("\n=== Genre Trends Analysis ===");
    let trends = queries.analyze_genre_trends(DEFAULT_TREND_YEAR).await;
    println!("\nTrends for {}:", DEFAULT_TREND_YEAR);
    println!("{}", trends);

    Ok(())
}

fn print_troubleshooting() {
    eprintln!("\nTroubleshooting steps:");
    eprintln!("1. Verify that your Neo4j server is running");
    eprintln!("2. Check if your Neo4j credentials are correct");
    eprintln!("3. Ensure your Neo4j URI is correct (e.g., 'neo4j+s://<YOUR-URI>' for AuraDB)");
    eprintln!("4. Verify that your IP is allowed to connect to the Neo4j instance");
}
