use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use bettermeals_agent::agent::{ConversationAgent, CookAssistant};
use bettermeals_agent::config::{Settings, SettingsLoader};
use bettermeals_agent::llm::create_provider;
use bettermeals_agent::store::{Database, LibSqlBackend};
use bettermeals_agent::tools::{BackendClient, default_registry};
use bettermeals_agent::webhook::{Dispatcher, app_router};
use bettermeals_agent::workflow::StoreFormChecker;
use bettermeals_agent::workflow::onboarding::OnboardingService;
use bettermeals_agent::workflow::weekly_plan::WeeklyPlanService;

/// Console logging plus an optional daily-rolling file. The returned guard
/// must live as long as the process to flush the file writer.
fn init_tracing(settings: &Settings) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.as_str()));
    let console = tracing_subscriber::fmt::layer().with_target(false);

    match &settings.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "bettermeals-agent.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // TLS for reqwest and the LLM clients.
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }

    let settings = SettingsLoader::from_process_env()
        .load()
        .await
        .context("Failed to load configuration")?;
    let _log_guard = init_tracing(&settings);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        env = %settings.env,
        backend = ?settings.llm_backend,
        supervisor_model = %settings.supervisor_model,
        worker_model = %settings.worker_model,
        tools_mode = ?settings.tools_mode,
        "Starting BetterMeals agent"
    );

    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&settings.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", settings.db_path.display()))?,
    );

    let supervisor_llm = create_provider(&settings.supervisor_llm()?)?;
    let worker_llm = create_provider(&settings.worker_llm()?)?;

    let backend = Arc::new(BackendClient::new(
        &settings.bm_api_base,
        &settings.bm_backend_api_base,
        settings.tools_mode,
    ));
    let tools = Arc::new(default_registry(Arc::clone(&backend)));
    tracing::info!(tools = tools.count(), "Tools registered");

    let forms = Arc::new(StoreFormChecker::new(Arc::clone(&db)));
    let onboarding = Arc::new(OnboardingService::new(
        Arc::clone(&db),
        forms.clone(),
        settings.replies.clone(),
    ));
    let weekly_plan = Arc::new(WeeklyPlanService::new(
        Arc::clone(&db),
        forms,
        backend,
        settings.replies.clone(),
    ));
    let cook = Arc::new(CookAssistant::new(Arc::clone(&db), Arc::clone(&worker_llm)));
    let agent =
        Arc::new(ConversationAgent::new(Arc::clone(&db), supervisor_llm, worker_llm, tools).await);

    let dispatcher = Arc::new(Dispatcher::new(db, cook, onboarding, weekly_plan, agent));
    let app = app_router(dispatcher);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, "Listening for WhatsApp webhooks");

    axum::serve(listener, app).await?;
    Ok(())
}
