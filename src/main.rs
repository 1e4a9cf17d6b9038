use std::sync::Arc;

use anyhow::Context;

use engage_booster::api::{self, AppState};
use engage_booster::channels::Dispatchers;
use engage_booster::config::AppConfig;
use engage_booster::content::ContentGenerator;
use engage_booster::events::{EventImporter, HttpFetcher};
use engage_booster::llm::create_provider;
use engage_booster::store::{Database, LibSqlBackend};
use engage_booster::workflow::{NotificationScheduler, RegistrationService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("Invalid configuration")?;

    eprintln!("📣 Engage Booster v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}", config.port);

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Content generation ──────────────────────────────────────────────
    let llm = match &config.llm {
        Some(llm_config) => match create_provider(llm_config) {
            Ok(provider) => {
                eprintln!("   LLM: {}", provider.model_name());
                Some(provider)
            }
            Err(e) => {
                tracing::warn!(error = %e, "LLM unavailable; using template messages");
                eprintln!("   LLM: unavailable (templates only)");
                None
            }
        },
        None => {
            eprintln!("   LLM: disabled (templates only)");
            None
        }
    };
    let generator = Arc::new(ContentGenerator::new(llm, config.generation.clone()));

    // ── Dispatch + scheduling ───────────────────────────────────────────
    eprintln!(
        "   Email: {}",
        match &config.email {
            Some(email) => format!("SMTP {}:{}", email.smtp_host, email.smtp_port),
            None => "simulated".to_string(),
        }
    );
    eprintln!(
        "   Chat: {}",
        if config.telegram_bot_token.is_some() {
            "telegram"
        } else {
            "simulated"
        }
    );

    let dispatchers = Dispatchers::from_config(&config);
    let scheduler = Arc::new(NotificationScheduler::new(
        Arc::clone(&db),
        Arc::clone(&generator),
        dispatchers,
        config.workflow.follow_up_delay,
    ));

    // ── Startup Recovery: re-arm notifications left pending ────────────
    let recovered = scheduler
        .recover_pending()
        .await
        .context("Failed to recover pending notifications")?;
    if recovered > 0 {
        eprintln!("   Recovered {} pending notifications from DB", recovered);
    }

    let registrations = Arc::new(RegistrationService::new(
        Arc::clone(&db),
        Arc::clone(&scheduler),
    ));
    let importer = Arc::new(EventImporter::new(
        Arc::clone(&db),
        Arc::clone(&generator),
        Arc::new(HttpFetcher::new()),
    ));

    let state = AppState {
        db,
        auth: config.auth.clone(),
        registrations,
        importer,
        generator,
    };
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "HTTP server started");
    eprintln!();

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested");
        })
        .await
        .context("HTTP server failed")?;

    scheduler.shutdown().await;
    Ok(())
}
