//! cardgate - real-time payment authorization
//!
//! ```text
//! cardgate [--env <name>] [--fixtures <seed.json>] --request <file.json>
//! ```
//!
//! Loads `config/<env>.yaml`, connects to PostgreSQL when `postgres_url`
//! is set or seeds in-memory stores from the fixtures file otherwise,
//! authorizes the JSON request in `<file>` and prints the JSON response.
//! Startup fails when neither store is configured.
//!
//! The card data key is read from the env var named by
//! `encryption_key_env`; a missing or malformed key aborts startup.

use anyhow::{Context, Result, bail};
use std::sync::Arc;

use cardgate::authorization::{AuthorizationRequest, DecisionOrchestrator};
use cardgate::config::AppConfig;
use cardgate::db::Database;
use cardgate::enrichment::{DirectoryEnrichmentProvider, EnrichmentProvider};
use cardgate::store::{Fixtures, Stores};
use cardgate::tokenization::TokenizationService;
use cardgate::{PgAccountRepository, PgRuleRepository, PgTransactionRepository};

// ============================================================
// ARGUMENTS
// ============================================================

fn get_arg(names: &[&str]) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if names.contains(&args[i].as_str()) && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

fn get_env() -> String {
    get_arg(&["--env", "-e"]).unwrap_or_else(|| "dev".to_string())
}

// ============================================================
// WIRING
// ============================================================

/// Stores plus the enrichment provider that goes with them
async fn build_stores(config: &AppConfig) -> Result<(Stores, Arc<dyn EnrichmentProvider>)> {
    if let Some(url) = config.postgres_url.as_deref() {
        let db = Database::connect(url)
            .await
            .context("Failed to connect to PostgreSQL")?;
        db.health_check().await.context("PostgreSQL health check failed")?;
        db.apply_schema().await.context("Failed to apply schema")?;
        tracing::info!("Connected to PostgreSQL");

        let pool = db.pool().clone();
        let stores = Stores {
            accounts: Arc::new(PgAccountRepository::new(pool.clone())),
            rules: Arc::new(PgRuleRepository::new(pool.clone())),
            transactions: Arc::new(PgTransactionRepository::new(pool)),
        };
        return Ok((stores, Arc::new(DirectoryEnrichmentProvider::new())));
    }

    let Some(path) = get_arg(&["--fixtures", "-f"]).or_else(|| config.fixtures_path.clone()) else {
        bail!("No store configured: set postgres_url or fixtures_path, or pass --fixtures");
    };
    let fixtures = Fixtures::load(&path)?;
    tracing::info!(
        fixtures = %path,
        accounts = fixtures.accounts.len(),
        rules = fixtures.rules.len(),
        merchants = fixtures.merchants.len(),
        "Using in-memory stores"
    );
    Ok((fixtures.stores(), Arc::new(fixtures.enrichment_provider())))
}

// ============================================================
// MAIN
// ============================================================

#[tokio::main]
async fn main() -> Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env)?;
    let _log_guard = cardgate::logging::init_logging(&config);

    tracing::info!(
        env = %env,
        build = env!("CARDGATE_GIT_HASH"),
        "Starting cardgate"
    );

    let tokenization = TokenizationService::from_env(&config.encryption_key_env)
        .with_context(|| format!("Encryption key unavailable ({})", config.encryption_key_env))?;

    let Some(request_path) = get_arg(&["--request", "-r"]) else {
        bail!("usage: cardgate [--env <name>] --request <file.json>");
    };
    let body = std::fs::read_to_string(&request_path)
        .with_context(|| format!("Failed to read {}", request_path))?;
    let request: AuthorizationRequest =
        serde_json::from_str(&body).context("Malformed authorization request")?;

    let (stores, enrichment) = build_stores(&config).await?;
    let orchestrator = DecisionOrchestrator::new(stores, enrichment, tokenization, &config);

    let response = orchestrator.authorize(request).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
