use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use review_responder::config::AppConfig;
use review_responder::credentials::{CredentialStore, EnvCredentialStore};
use review_responder::generator::ResponseGenerator;
use review_responder::llm::create_provider;
use review_responder::marketplace::{ClientFactory, HttpClientFactory};
use review_responder::pipeline::{ModerationEvent, ProcessorDeps, ReviewProcessor, spawn_sync_loop};
use review_responder::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    // Initialize tracing: stdout, plus a daily rolling file when configured.
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    let _log_guard = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "review-responder.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(non_blocking.and(std::io::stdout))
                .with_ansi(false)
                .with_target(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_target(false)
                .init();
            None
        }
    };

    eprintln!("📦 Review Responder v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Check interval: {}s", config.check_interval.as_secs());
    eprintln!(
        "   Auto-send: {}",
        if config.auto_send { "enabled" } else { "disabled" }
    );

    // ── Model provider ──────────────────────────────────────────────
    let provider = create_provider(&config.llm)?;
    let generator = Arc::new(ResponseGenerator::new(provider, config.generator.clone()));

    // ── Database ────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);

    // ── Collaborators ───────────────────────────────────────────────
    let credentials: Arc<dyn CredentialStore> = Arc::new(EnvCredentialStore::new());
    let clients: Arc<dyn ClientFactory> = Arc::new(HttpClientFactory::new());

    // Moderation events go to the external approver surface; until one is
    // attached they are surfaced in the log.
    let (moderation_tx, mut moderation_rx) = tokio::sync::mpsc::channel::<ModerationEvent>(256);
    tokio::spawn(async move {
        while let Some(event) = moderation_rx.recv().await {
            info!(
                review_id = %event.review_id,
                account_id = %event.account_id,
                rating = event.rating,
                "Review reply awaiting approval"
            );
        }
    });

    let processor = Arc::new(ReviewProcessor::new(
        ProcessorDeps {
            store: db,
            credentials,
            clients,
            generator,
            moderation_tx: Some(moderation_tx),
        },
        config.auto_send,
    ));

    // ── Sync loop ───────────────────────────────────────────────────
    let (handle, shutdown) = spawn_sync_loop(processor, config.check_interval);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, draining current batch");
    shutdown.store(true, Ordering::Relaxed);

    // Give an in-flight batch a bounded window to drain between accounts.
    let _ = tokio::time::timeout(Duration::from_secs(30), handle).await;

    Ok(())
}
