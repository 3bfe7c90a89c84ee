use std::sync::Arc;
use std::time::Duration;

use dripcourse::billing::StripeClient;
use dripcourse::billing::client::BillingClient;
use dripcourse::config::{BillingConfig, GeneratorConfig, ServerConfig, SmtpConfig};
use dripcourse::email::{Mailer, SmtpMailer};
use dripcourse::plan::generator::PlanGenerator;
use dripcourse::plan::OpenAiGenerator;
use dripcourse::scheduler::cycle::DripCycle;
use dripcourse::scheduler::ticker::spawn_cycle_ticker;
use dripcourse::server::{AppDeps, build_router};
use dripcourse::store::{LibSqlBackend, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let server_config = ServerConfig::from_env();
    let smtp_config = SmtpConfig::from_env()?;
    let billing_config = BillingConfig::from_env()?;
    let generator_config = GeneratorConfig::from_env()?;

    eprintln!("📧 Dripcourse v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Base URL: {}", server_config.base_url);
    eprintln!("   API: http://0.0.0.0:{}/api", server_config.port);
    eprintln!("   Database: {}", server_config.db_path);
    eprintln!("   SMTP: {}:{}", smtp_config.host, smtp_config.port);
    if server_config.cron_secret.is_none() {
        eprintln!("   Cron: UNPROTECTED (set CRON_SECRET in production)");
    }

    // ── Database ────────────────────────────────────────────────────
    let db_path = std::path::Path::new(&server_config.db_path);
    let store: Arc<dyn Store> = Arc::new(LibSqlBackend::new_local(db_path).await?);

    // ── Services ────────────────────────────────────────────────────
    let webhook_secret = billing_config.webhook_secret.clone();
    let mailer: Arc<dyn Mailer> = Arc::new(SmtpMailer::new(&smtp_config)?);
    let billing: Arc<dyn BillingClient> = Arc::new(StripeClient::new(
        billing_config,
        server_config.base_url.clone(),
    )?);
    let generator: Arc<dyn PlanGenerator> = Arc::new(OpenAiGenerator::new(generator_config)?);

    let cycle = Arc::new(DripCycle::new(
        store.clone(),
        mailer.clone(),
        billing.clone(),
        server_config.base_url.clone(),
    ));

    // Safety-net ticker alongside the external cron trigger
    let _ticker_handle =
        spawn_cycle_ticker(cycle.clone(), Duration::from_secs(server_config.tick_secs));

    // ── HTTP server ─────────────────────────────────────────────────
    let app = build_router(AppDeps {
        store,
        mailer,
        billing,
        generator,
        cycle,
        base_url: server_config.base_url.clone(),
        cron_secret: server_config.cron_secret.clone(),
        webhook_secret,
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", server_config.port)).await?;
    tracing::info!(port = server_config.port, "Server started");
    axum::serve(listener, app).await?;

    Ok(())
}
