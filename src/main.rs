//! ClipMint billing service entry point.
//!
//! Wires the Postgres adapters, the Stripe gateway, the webhook
//! processing pipeline, and the background reconciler into an axum
//! server. Shutdown drains in-flight requests and stops the reconciler
//! between sweeps.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use axum::{routing::get, Router};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use clipmint_billing::adapters::events::TracingEventPublisher;
use clipmint_billing::adapters::http::billing::{
    billing_routes, health, webhook_routes, BillingHandlers,
};
use clipmint_billing::adapters::notifications::TracingNotificationSender;
use clipmint_billing::adapters::postgres::{
    PostgresCreditLedger, PostgresPaymentRecordStore, PostgresSubscriptionRepository,
    PostgresWebhookEventRepository,
};
use clipmint_billing::adapters::stripe::{StripeConfig, StripeGateway};
use clipmint_billing::application::handlers::billing::{
    BillingEventDispatcher, CancelSubscriptionHandler, CheckoutCompletedHandler,
    CreateCheckoutHandler, CreditGrants, HandleGatewayWebhookHandler, InvoicePaymentFailedHandler,
    InvoicePaymentSucceededHandler, InvoiceUpcomingHandler, SubscriptionLifecycleHandler,
};
use clipmint_billing::application::{Reconciler, ReconcilerConfig};
use clipmint_billing::config::AppConfig;
use clipmint_billing::domain::billing::{
    IdempotentWebhookProcessor, PlanCatalog, StripeWebhookVerifier,
};
use clipmint_billing::ports::{
    CreditLedger, EventPublisher, NotificationSender, PaymentGateway, PaymentRecordStore,
    SubscriptionRepository, WebhookEventRepository,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;

    init_tracing(&config);

    config.validate()?;

    tracing::info!(
        environment = ?config.server.environment,
        test_mode = config.payment.is_test_mode(),
        "Starting ClipMint billing service"
    );

    // ── Database ────────────────────────────────────────────────────────────
    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .idle_timeout(config.database.idle_timeout())
        .max_lifetime(config.database.max_lifetime())
        .connect(&config.database.url)
        .await?;

    if config.database.run_migrations {
        tracing::info!("Running database migrations");
        sqlx::migrate!().run(&pool).await?;
    }

    // ── Adapters ────────────────────────────────────────────────────────────
    let subscriptions: Arc<dyn SubscriptionRepository> =
        Arc::new(PostgresSubscriptionRepository::new(pool.clone()));
    let ledger: Arc<dyn CreditLedger> = Arc::new(PostgresCreditLedger::new(pool.clone()));
    let payments: Arc<dyn PaymentRecordStore> =
        Arc::new(PostgresPaymentRecordStore::new(pool.clone()));
    let webhook_events: Arc<dyn WebhookEventRepository> =
        Arc::new(PostgresWebhookEventRepository::new(pool.clone()));
    let publisher: Arc<dyn EventPublisher> = Arc::new(TracingEventPublisher::new());
    let notifications: Arc<dyn NotificationSender> = Arc::new(TracingNotificationSender::new());

    let mut stripe_config = StripeConfig::new(config.payment.secret_key.clone());
    if let Some(base_url) = &config.payment.api_base_url {
        stripe_config = stripe_config.with_base_url(base_url.as_str());
    }
    let gateway: Arc<dyn PaymentGateway> = Arc::new(StripeGateway::new(stripe_config));

    // ── Plan catalog and grants ─────────────────────────────────────────────
    let catalog = config.credits.plan_credits.iter().fold(
        PlanCatalog::standard(),
        |catalog, (code, credits)| catalog.with_monthly_credits(code, *credits),
    );
    let grants = CreditGrants::new(
        ledger.clone(),
        publisher.clone(),
        catalog.clone(),
        config.credits.signup_bonus_credits,
    );

    // ── Webhook pipeline ────────────────────────────────────────────────────
    let dispatcher = Arc::new(
        BillingEventDispatcher::new()
            .register(Arc::new(SubscriptionLifecycleHandler::new(
                subscriptions.clone(),
                publisher.clone(),
                notifications.clone(),
                grants.clone(),
            )))
            .register(Arc::new(CheckoutCompletedHandler::new(
                subscriptions.clone(),
                payments.clone(),
                publisher.clone(),
                notifications.clone(),
                grants.clone(),
            )))
            .register(Arc::new(InvoicePaymentSucceededHandler::new(
                subscriptions.clone(),
                payments.clone(),
                publisher.clone(),
                notifications.clone(),
                grants.clone(),
            )))
            .register(Arc::new(InvoicePaymentFailedHandler::new(
                subscriptions.clone(),
                publisher.clone(),
                notifications.clone(),
            )))
            .register(Arc::new(InvoiceUpcomingHandler::new(
                subscriptions.clone(),
                notifications.clone(),
                catalog.clone(),
            ))),
    );
    let processor = Arc::new(IdempotentWebhookProcessor::new(
        webhook_events.clone(),
        dispatcher,
    ));

    let verifier =
        StripeWebhookVerifier::new(SecretString::new(config.payment.webhook_secret.clone()));
    let webhook_handler = Arc::new(HandleGatewayWebhookHandler::new(verifier, processor.clone()));

    // ── Command handlers ────────────────────────────────────────────────────
    let checkout_handler = Arc::new(CreateCheckoutHandler::new(
        subscriptions.clone(),
        gateway.clone(),
        publisher.clone(),
        catalog.clone(),
    ));
    let cancel_handler = Arc::new(CancelSubscriptionHandler::new(
        subscriptions.clone(),
        gateway.clone(),
        publisher.clone(),
    ));

    // ── Reconciler ──────────────────────────────────────────────────────────
    let reconciler = Arc::new(Reconciler::with_config(
        subscriptions.clone(),
        gateway.clone(),
        webhook_events.clone(),
        processor,
        ReconcilerConfig::default()
            .with_sweep_interval(config.reconciler.sweep_interval())
            .with_freshness_threshold(config.reconciler.freshness_threshold())
            .with_batch_size(config.reconciler.batch_size),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler_task = tokio::spawn({
        let reconciler = reconciler.clone();
        async move { reconciler.run(shutdown_rx).await }
    });

    // ── HTTP server ─────────────────────────────────────────────────────────
    let handlers = BillingHandlers::new(
        webhook_handler,
        checkout_handler,
        cancel_handler,
        subscriptions,
        ledger,
        catalog,
    );

    let mut app = Router::new()
        .route("/health", get(health))
        .nest("/api/billing", billing_routes(handlers.clone()))
        .nest("/api/webhooks", webhook_routes(handlers))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )));

    let cors_origins: Vec<HeaderValue> = config
        .server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    if !cors_origins.is_empty() {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(cors_origins)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    let addr = config.server.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "ClipMint billing service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    // The watch flag is already set; the reconciler exits between sweeps.
    let _ = reconciler_task.await;
    tracing::info!("Shutdown complete");

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    if config.is_production() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Resolves on Ctrl+C or SIGTERM, then tells the reconciler to stop.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining");
    let _ = shutdown_tx.send(true);
}
