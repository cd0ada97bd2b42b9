// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use odx_books::{
    CatalogCache, CatalogSnapshot, DraftWriter, HttpBooksApi, MemoryFingerprintStore, OAuthConfig,
    QueueSettings, StaticCredentials, TokenCache,
};
use odx_config::AppConfig;
use odx_daemon::{AppState, build_app};
use odx_engine::{EngineClient, HttpEngineClient, LocalEngine};
use odx_match::ItemMatchOptions;
use odx_parser::{LoadLimits, ParseOptions};
use odx_relay::{MemoryOutbox, MemoryRetryQueue, Notifier, Publisher, Sweeper};
use odx_retry::RetryPolicy;
use odx_store::{
    AuditSink, CaseService, CaseStore, FileAuditSink, FileCaseStore, MemoryAuditSink,
    MemoryCaseStore,
};
use odx_telemetry::{CaseCounters, init_tracing};
use odx_workflow::{
    Activities, CaseNotifier, HttpBotClient, HttpBlobFetcher, LogNotifier, OrderWorkflow,
    TimerConfig, XlsxParserGateway,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "odx-daemon", version, about = "Orderdesk order-processing daemon")]
struct Args {
    /// Bind address; the port comes from PORT unless overridden here.
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Directory for incoming workbook copies.
    #[arg(long, default_value = ".orderdesk/incoming")]
    incoming_dir: std::path::PathBuf,

    /// Catalog refresh interval in seconds.
    #[arg(long, default_value_t = 3600)]
    catalog_refresh_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (config, warnings) = AppConfig::from_env().context("load configuration")?;
    init_tracing(&config.log_level);
    for warning in &warnings {
        warn!(%warning, "configuration warning");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Credentials and the accounting client come up first.
    let tokens = Arc::new(TokenCache::new(
        OAuthConfig {
            token_url: format!("{}/oauth/token", config.accounting_url),
            client_id: std::env::var("BOOKS_CLIENT_ID").unwrap_or_default(),
            client_secret: std::env::var("BOOKS_CLIENT_SECRET").unwrap_or_default(),
        },
        Box::new(StaticCredentials::new(
            std::env::var("BOOKS_REFRESH_TOKEN").unwrap_or_default(),
        )),
    ));
    let books_api = Arc::new(HttpBooksApi::new(config.accounting_url.clone(), tokens));

    let catalogs = if config.accounting_url.is_empty() {
        warn!("ACCOUNTING_URL not set; starting with empty catalogs");
        Arc::new(CatalogCache::with_snapshot(
            books_api.clone(),
            CatalogSnapshot::default(),
            Duration::from_secs(300),
        ))
    } else {
        Arc::new(
            CatalogCache::load(books_api.clone(), Duration::from_secs(300))
                .await
                .context("load accounting catalogs")?,
        )
    };
    tokio::spawn(
        catalogs
            .clone()
            .run_refresher(Duration::from_secs(args.catalog_refresh_secs), shutdown_rx.clone()),
    );

    // Reliability plumbing.
    let queue = Arc::new(MemoryRetryQueue::new());
    let outbox = Arc::new(MemoryOutbox::new());
    let drafts = Arc::new(DraftWriter::new(
        books_api,
        Arc::new(MemoryFingerprintStore::new()),
        queue.clone(),
        outbox.clone(),
        RetryPolicy::default(),
        QueueSettings::default(),
    ));

    let sweeper = Arc::new(Sweeper::new(
        queue,
        outbox.clone(),
        drafts.clone(),
        RetryPolicy::builder()
            .max_attempts(5)
            .initial_delay(Duration::from_secs(60))
            .multiplier(2.0)
            .max_delay(Duration::from_secs(3600))
            .build(),
        10,
    ));
    tokio::spawn(
        sweeper
            .clone()
            .run(Duration::from_secs(30), shutdown_rx.clone()),
    );

    // Case persistence.
    let store: Arc<dyn CaseStore> = if config.doc_db_endpoint.is_empty() {
        Arc::new(MemoryCaseStore::new())
    } else {
        Arc::new(FileCaseStore::new(&config.doc_db_endpoint))
    };
    let audit: Arc<dyn AuditSink> = if config.doc_db_endpoint.is_empty() {
        Arc::new(MemoryAuditSink::new())
    } else {
        Arc::new(FileAuditSink::new(
            std::path::Path::new(&config.doc_db_endpoint).join("audit.jsonl"),
        ))
    };
    let cases = CaseService::new(store, audit);

    // Notifications.
    let notifier: Arc<dyn CaseNotifier>;
    let event_notifier: Arc<dyn Notifier>;
    if config.bot_url.is_empty() {
        let log = Arc::new(LogNotifier);
        notifier = log.clone();
        event_notifier = log;
    } else {
        let bot = Arc::new(HttpBotClient::new(config.bot_url.clone()));
        notifier = bot.clone();
        event_notifier = bot;
    }

    let publisher = Arc::new(Publisher::new(outbox, event_notifier));
    tokio::spawn(
        publisher
            .clone()
            .run(Duration::from_secs(5), shutdown_rx.clone()),
    );

    // The saga and its engine.
    let activities = Arc::new(Activities {
        cases: cases.clone(),
        blobs: Arc::new(HttpBlobFetcher::new(&args.incoming_dir)),
        parser: Arc::new(XlsxParserGateway {
            options: ParseOptions {
                max_rows: config.max_rows,
                ..ParseOptions::default()
            },
            limits: LoadLimits {
                max_file_bytes: config.max_file_bytes,
                max_rows_per_sheet: config.max_rows,
                ..LoadLimits::default()
            },
        }),
        committee: if config.committee_url.is_empty() {
            Arc::new(odx_workflow::EchoCommittee)
        } else {
            Arc::new(odx_workflow::HttpCommittee::new(config.committee_url.clone()))
        },
        catalogs,
        drafts,
        notifier,
        item_match: ItemMatchOptions::default(),
    });
    let timers = TimerConfig {
        reminder: Duration::from_secs(config.timeout_reminder_hours * 3600),
        escalation: Duration::from_secs(config.timeout_escalation_hours * 3600),
        max_wait: Duration::from_secs(config.timeout_max_wait_days * 24 * 3600),
    };
    let workflow = Arc::new(OrderWorkflow::new(activities, timers));

    let engine: Arc<dyn EngineClient> = if config.engine_address.is_empty() {
        info!("ENGINE_ADDRESS not set; running the in-process engine");
        Arc::new(LocalEngine::new(workflow))
    } else {
        info!(address = %config.engine_address, "using the remote workflow engine");
        Arc::new(HttpEngineClient::new(config.engine_address.clone()))
    };

    // HTTP comes up last.
    let state = AppState {
        engine,
        cases,
        counters: Arc::new(CaseCounters::new()),
        started_at: Instant::now(),
    };
    let app = build_app(state);

    let bind = format!("{}:{}", args.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    info!(bind = %bind, "odx-daemon listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested; draining background workers");
            let _ = shutdown_tx.send(true);
        })
        .await
        .context("serve")?;

    // The publisher flushes once more on the shutdown flag; give it a beat.
    tokio::time::sleep(Duration::from_millis(200)).await;
    Ok(())
}
