//! task-decomposer - command line entry point.
//!
//! Reads a task request as JSON from a file (or stdin when no path is given),
//! solves it and prints the result envelope. `--info` prints system info.

use std::io::Read;

use anyhow::Context;
use task_decomposer::{config::Config, HealthService, TaskRequest};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "task_decomposer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env()?;
    info!(
        "Loaded configuration: model={}, max_depth={}, max_subtasks={}",
        config.llm.default_model, config.limits.max_depth, config.limits.max_subtasks
    );

    let service = HealthService::from_config(&config).await?;

    let arg = std::env::args().nth(1);
    if arg.as_deref() == Some("--info") {
        println!("{}", serde_json::to_string_pretty(&service.system_info())?);
        return Ok(());
    }

    let raw = match arg {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read task file {}", path))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read task from stdin")?;
            buf
        }
    };
    let value: serde_json::Value =
        serde_json::from_str(&raw).context("Task request is not valid JSON")?;
    let request = TaskRequest::from_value(&value);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing subtasks atomically");
                cancel.cancel();
            }
        });
    }

    let envelope = service.solve(request, cancel).await;
    println!("{}", serde_json::to_string_pretty(&envelope.to_value())?);

    Ok(())
}
