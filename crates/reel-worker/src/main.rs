//! Scripted video worker binary.
//!
//! Usage: `reel-worker <request.json|-> [job_id]`

use anyhow::Context;
use std::io::Read;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reel_media::JobContext;
use reel_models::{JobId, ScriptedVideoRequest};
use reel_worker::{
    metrics, FailureReport, JobLogger, PipelineError, PipelineFailure, PipelineStage,
    ScriptedVideoPipeline,
};

fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("reel_worker=info".parse()?)
        .add_directive("reel_media=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

fn read_request(source: &str) -> anyhow::Result<String> {
    if source == "-" {
        let mut payload = String::new();
        std::io::stdin()
            .read_to_string(&mut payload)
            .context("failed to read request from stdin")?;
        Ok(payload)
    } else {
        std::fs::read_to_string(source).with_context(|| format!("failed to read {source}"))
    }
}

/// Print the failure report and exit non-zero.
fn exit_with(report: FailureReport) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&report)?);
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    init_tracing()?;

    if let Some(port) = std::env::var("METRICS_PORT").ok().and_then(|p| p.parse().ok()) {
        metrics::init_metrics(port).context("failed to install Prometheus exporter")?;
        info!(port, "Metrics exporter listening");
    }

    let mut args = std::env::args().skip(1);
    let Some(source) = args.next() else {
        anyhow::bail!("usage: reel-worker <request.json|-> [job_id]");
    };
    let job_id = args.next().map(JobId::from_string).unwrap_or_default();

    let payload = read_request(&source)?;
    let request = match ScriptedVideoRequest::from_json(&payload) {
        Ok(request) => request,
        Err(e) => {
            let failure = PipelineFailure::new(PipelineStage::Decomposing, PipelineError::from(e));
            return exit_with(failure.report());
        }
    };

    let pipeline = ScriptedVideoPipeline::from_env().context("failed to build pipeline")?;

    let (mut ctx, cancel) = JobContext::new();
    if let Some(secs) = std::env::var("PIPELINE_JOB_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
    {
        ctx = ctx.with_timeout(Duration::from_secs(secs));
    }
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received interrupt, cancelling job");
            cancel.cancel();
        }
    });

    info!(job_id = %job_id, "Starting reel-worker job");
    let logger = JobLogger::new(&job_id, "scripted_video");
    match pipeline.run(&job_id, &request, &logger, &ctx).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(failure) => exit_with(failure.report()),
    }
}
