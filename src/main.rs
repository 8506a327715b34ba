// src/main.rs
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use failtrace::classify::HttpOracle;
use failtrace::{source, IngestConfig, IngestRun};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,failtrace=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    std::panic::set_hook(Box::new(|info| {
        eprintln!("panic: {:?}", info);
    }));

    // ─── 2) inputs & config ──────────────────────────────────────────
    let patterns: Vec<String> = std::env::args().skip(1).collect();
    if patterns.is_empty() {
        info!("usage: failtrace <report.xlsx|reports/*.pptx> ...; exit");
        return Ok(());
    }

    let config = match std::env::var("FAILTRACE_CONFIG") {
        Ok(path) => {
            IngestConfig::load(&path).with_context(|| format!("loading config from {}", path))?
        }
        Err(_) => IngestConfig::default(),
    };
    let oracle = HttpOracle::from_config(&config.oracle)?;
    info!(oracle = oracle.is_some(), "classification oracle configured");

    let out_dir = PathBuf::from("assets");
    fs::create_dir_all(&out_dir)?;

    // ─── 3) expand input patterns ────────────────────────────────────
    let mut files: Vec<PathBuf> = Vec::new();
    for pattern in &patterns {
        let entries =
            glob::glob(pattern).with_context(|| format!("bad input pattern: {pattern}"))?;
        for entry in entries {
            match entry {
                Ok(path) => {
                    if source::is_supported_path(&path) {
                        files.push(path);
                    } else {
                        warn!(path = %path.display(), "skipping unsupported file");
                    }
                }
                Err(e) => warn!(error = %e, "unreadable glob entry"),
            }
        }
    }
    if files.is_empty() {
        info!("no input files matched; exit");
        return Ok(());
    }
    info!("{} files to ingest", files.len());

    // ─── 4) one independent run per file ─────────────────────────────
    let sem = Arc::new(Semaphore::new(4));
    let mut handles = Vec::with_capacity(files.len());
    for path in files {
        let config = config.clone();
        let oracle = oracle.clone();
        let out_dir = out_dir.clone();
        let sem = Arc::clone(&sem);

        handles.push(tokio::spawn(async move {
            let _permit = sem.acquire().await.unwrap();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            let mut run = IngestRun::new(config, oracle.as_ref(), None);
            match run.ingest_file(&path).await {
                Ok(rows) => {
                    let (assets, summary) = run.finish();
                    let stem = path
                        .file_stem()
                        .map(|s| s.to_string_lossy().to_string())
                        .unwrap_or_else(|| "assets".to_string());
                    let out_path = out_dir.join(format!("{stem}.json"));
                    let json = serde_json::to_string_pretty(&assets)?;
                    fs::write(&out_path, json)?;
                    info!(
                        file = %name,
                        rows,
                        assets = summary.assets,
                        folded = summary.components_folded,
                        rejected_rows = summary.rows_rejected,
                        rejected_customers = summary.customers_rejected,
                        out = %out_path.display(),
                        "ingested"
                    );
                    Ok::<_, anyhow::Error>(())
                }
                Err(e) => {
                    error!(file = %name, error = %e, "ingest failed");
                    Err(e.into())
                }
            }
        }));
    }

    // ─── 5) await all runs ───────────────────────────────────────────
    let mut failed = 0usize;
    for h in handles {
        match h.await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => failed += 1,
            Err(e) => {
                error!(error = %e, "run task failed");
                failed += 1;
            }
        }
    }
    if failed > 0 {
        warn!(failed, "some files were rejected");
    }
    info!("all done");
    Ok(())
}
