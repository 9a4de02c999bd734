//! syncq CLI - Command-line client for the syncq daemon

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9633";
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Parser)]
#[command(name = "syncq")]
#[command(about = "Offline sync queue CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "SYNCQ_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Defer an operation until the network is back
    Enqueue {
        /// Operation kind (e.g., http)
        #[arg(short, long)]
        kind: String,

        /// Payload as JSON string
        #[arg(short, long)]
        payload: String,

        /// Attempts before the operation is abandoned
        #[arg(short, long)]
        max_attempts: Option<u32>,
    },

    /// Show queue and daemon status
    Status,

    /// Run a processing pass now
    Process,

    /// Drop every queued operation
    Clear,

    /// List abandoned operations
    Failed {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Run maintenance operations
    Maintenance {
        /// Force VACUUM even if not needed
        #[arg(long)]
        force_vacuum: bool,
    },
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueueStatus {
    size: usize,
    oldest_item_timestamp: Option<i64>,
    is_processing: bool,
}

#[derive(Deserialize)]
struct DeadLetter {
    item_id: String,
    operation: Operation,
    attempts: u32,
    max_attempts: u32,
    failed_at: i64,
    reason: String,
}

#[derive(Deserialize)]
struct Operation {
    kind: String,
}

#[derive(Tabled)]
struct DeadLetterRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Attempts")]
    attempts: String,
    #[tabled(rename = "Failed At")]
    failed_at: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

impl From<DeadLetter> for DeadLetterRow {
    fn from(letter: DeadLetter) -> Self {
        Self {
            id: letter.item_id,
            kind: letter.operation.kind,
            attempts: format!("{}/{}", letter.attempts, letter.max_attempts),
            failed_at: format_millis(letter.failed_at),
            reason: letter.reason,
        }
    }
}

fn format_millis(millis: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn print_status(status: &QueueStatus) {
    let size = if status.size == 0 {
        "0 (all synced)".green()
    } else {
        format!("{} pending", status.size).yellow()
    };
    println!("  {} {}", "Queue:".bold(), size);
    if let Some(oldest) = status.oldest_item_timestamp {
        println!("  {} {}", "Oldest:".bold(), format_millis(oldest));
    }
    if status.is_processing {
        println!("  {} {}", "Pass:".bold(), "running".cyan());
    }
}

async fn call_rpc(url: &str, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Enqueue {
            kind,
            payload,
            max_attempts,
        } => {
            let payload_json: serde_json::Value =
                serde_json::from_str(&payload).context("Invalid JSON payload")?;

            let params = json!({
                "kind": kind,
                "payload": payload_json,
                "max_attempts": max_attempts,
            });

            let result = call_rpc(&cli.rpc_url, "queue.enqueue.v1", params).await?;
            let item_id = result["item_id"].as_str().unwrap_or_default().to_string();
            let status: QueueStatus = serde_json::from_value(result["status"].clone())
                .context("Unexpected enqueue response")?;

            println!("{}", "✓ Operation queued".green().bold());
            println!("  {} {}", "Item:".bold(), item_id);
            print_status(&status);
        }

        Commands::Status => {
            println!("{}", "syncq Status".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "admin.stats.v1", json!({})).await {
                Ok(stats) => {
                    let online = stats["online"].as_bool().unwrap_or(false);
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!(
                        "  {} {}",
                        "Network:".bold(),
                        if online { "ONLINE".green() } else { "OFFLINE".red() }
                    );
                    println!();
                    print_status(&QueueStatus {
                        size: stats["queue_size"].as_u64().unwrap_or(0) as usize,
                        oldest_item_timestamp: stats["oldest_item_timestamp"].as_i64(),
                        is_processing: stats["is_processing"].as_bool().unwrap_or(false),
                    });
                    println!("  {} {}", "Dead letters:".bold(), stats["dead_letters"]);
                    println!("  {} {}", "Handlers:".bold(), stats["handlers"]);
                    println!();
                    let db_mb = stats["db_size_bytes"].as_i64().unwrap_or(0) as f64 / BYTES_PER_MB;
                    println!("  {} {:.2} MB", "DB Size:".bold(), db_mb);
                    println!("  {} {} seconds", "Uptime:".bold(), stats["uptime_seconds"]);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "DAEMON UNREACHABLE".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }

        Commands::Process => {
            let result = call_rpc(&cli.rpc_url, "queue.process.v1", json!({})).await?;
            let status: QueueStatus = serde_json::from_value(result)?;
            println!("{}", "✓ Processing pass finished".green().bold());
            print_status(&status);
        }

        Commands::Clear => {
            call_rpc(&cli.rpc_url, "queue.clear.v1", json!({})).await?;
            println!("{}", "✓ Queue cleared".green().bold());
        }

        Commands::Failed { limit } => {
            let result = call_rpc(
                &cli.rpc_url,
                "queue.dead_letters.v1",
                json!({ "limit": limit }),
            )
            .await?;
            let letters: Vec<DeadLetter> = serde_json::from_value(result["dead_letters"].clone())
                .context("Unexpected dead letter response")?;

            if letters.is_empty() {
                println!("{}", "No failed operations".green());
            } else {
                let rows: Vec<DeadLetterRow> = letters.into_iter().map(Into::into).collect();
                println!("{}", Table::new(rows));
            }
        }

        Commands::Maintenance { force_vacuum } => {
            println!("{}", "Running maintenance...".cyan().bold());
            println!();

            if force_vacuum {
                println!("  {} Force VACUUM enabled", "•".bold());
            }

            let params = json!({ "force_vacuum": force_vacuum });

            match call_rpc(&cli.rpc_url, "admin.maintenance.v1", params).await {
                Ok(result) => {
                    println!("  ✓ Maintenance completed");
                    println!();
                    if result["vacuum_run"].as_bool().unwrap_or(false) {
                        println!("  {} VACUUM executed", "✓".green());
                    } else {
                        println!("  ○ VACUUM skipped (not needed)");
                    }
                    println!(
                        "  {} {} dead letters deleted",
                        "✓".green(),
                        result["dead_letters_deleted"]
                    );
                    println!();
                    let size_before_mb =
                        result["db_size_before"].as_i64().unwrap_or(0) as f64 / BYTES_PER_MB;
                    let size_after_mb =
                        result["db_size_after"].as_i64().unwrap_or(0) as f64 / BYTES_PER_MB;
                    println!(
                        "  {} {:.2} MB → {:.2} MB",
                        "DB Size:".bold(),
                        size_before_mb,
                        size_after_mb
                    );
                }
                Err(e) => {
                    println!("  {} Maintenance failed: {}", "✗".red(), e);
                }
            }
        }
    }

    Ok(())
}
