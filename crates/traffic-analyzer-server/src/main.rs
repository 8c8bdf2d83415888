//! Entry point: wires configuration, logging, the database pool, and every
//! collaborator together, then either runs a one-shot batch mode or starts
//! the HTTP listener.

mod catalog_client;
mod config;
mod db;
mod error;
mod header_cache;
mod http;
mod ingest;
mod jobs;
mod packets;
mod pcap_reader;
mod peers;
mod reconcile_service;
mod render;
mod storage;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use catalog_client::{CatalogClient, Credential};
use config::{Cli, Config};
use header_cache::HeaderDictionary;
use http::AppState;
use ingest::Ingester;
use jobs::JobTracker;
use packets::PacketStore;
use peers::PeerResolver;
use reconcile_service::ReconciliationEngine;
use render::ReportRowSource;
use storage::ObjectStorage;

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli).map_err(|e| {
        eprintln!("configuration error: {e}");
        e
    })?;

    init_logging(&config.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting traffic-analyzer");

    let pool = db::connect(&config.db).await?;
    if let Err(e) = db::run_migrations(&pool).await {
        tracing::error!(error = %e, "schema migration failed, exiting");
        return Err(e.into());
    }
    let migrations_complete = Arc::new(std::sync::atomic::AtomicBool::new(true));
    if cli.migrate_only {
        tracing::info!("migrate-only mode, exiting after successful migration");
        return Ok(());
    }

    let credential = if !config.catalog.access_token.is_empty() {
        Some(Credential::Bearer(config.catalog.access_token.clone()))
    } else {
        None
    };
    let catalog = CatalogClient::new(config.catalog.base_url.clone(), credential)?;

    let storage = ObjectStorage::connect(
        &config.storage.endpoint,
        config.storage.access_key.as_deref(),
        config.storage.secret_key.as_deref(),
        config.storage.bucket.clone(),
    )
    .await;

    let headers = Arc::new(HeaderDictionary::new(pool.clone()));
    let peers = PeerResolver::new(pool.clone());
    let packets = PacketStore::new(pool.clone());
    let ingester = Ingester { peers, headers: headers.clone(), packets };

    let packets_for_reconcile = PacketStore::new(pool.clone());
    let reconciler = ReconciliationEngine::new(pool.clone(), catalog, packets_for_reconcile);

    let render_source = ReportRowSource::new(pool.clone());

    let (jobs, completion_rx) = JobTracker::new();
    let jobs = Arc::new(jobs);
    let jobs_for_consumer = jobs.clone();
    tokio::spawn(async move {
        jobs::run_completion_consumer(jobs_for_consumer.as_ref(), completion_rx, now_micros).await;
    });

    if let Some(capture_id) = &cli.capture_id {
        tracing::info!(capture_id, "batch ingest mode");
        let work_dir = std::path::PathBuf::from(&config.work_dir).join(capture_id);
        std::fs::create_dir_all(&work_dir)?;
        storage.stage_capture(capture_id, &work_dir).await?;
        let counters = ingester.ingest_directory(capture_id, &work_dir, &work_dir).await?;
        tracing::info!(
            total_frames = counters.total_frames,
            http_frames = counters.http_frames,
            persisted = counters.persisted,
            "batch ingest complete"
        );
        return Ok(());
    }

    let listen_address = config.listen_address.clone();
    let state = AppState {
        config: Arc::new(config),
        pool,
        jobs,
        ingester: Arc::new(ingester),
        storage: Arc::new(storage),
        reconciler: Arc::new(reconciler),
        render_source: Arc::new(render_source),
        headers,
        migrations_complete,
    };

    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(&listen_address).await?;
    tracing::info!(%listen_address, "listening");
    axum::serve(listener, router).await?;

    Ok(())
}

fn now_micros() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp() * 1_000_000
}
