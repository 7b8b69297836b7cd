//! dockweb CLI - Command-line interface for the dockweb server
//!
//! Follows container logs and manages relay sessions

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use futures::{SinkExt, StreamExt};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio_tungstenite::tungstenite::protocol::{frame::coding::CloseCode, CloseFrame};
use tokio_tungstenite::tungstenite::Message;

/// Prefix of the text frame the server sends when a log stream cannot be opened
const DIAGNOSTIC_PREFIX: &str = "error: cannot get logs";

/// dockweb CLI - Follow container logs from a dockweb server
#[derive(Parser)]
#[command(name = "dockweb")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CLI for dockweb - live container log relay", long_about = None)]
struct Cli {
    /// dockweb API URL
    #[arg(short, long, default_value = "http://127.0.0.1:8080", env = "DOCKWEB_API_URL")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Get server health status
    Health,

    /// Follow a container's logs until the stream ends
    Logs {
        /// Container ID or name
        container: String,
    },

    /// List active relay sessions
    Relays {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        output: String,
    },

    /// Cancel a relay session
    Cancel {
        /// Relay session ID
        session_id: String,
    },
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
    active_relays: u64,
    runtime_version: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RelaySummary {
    session_id: String,
    container_id: String,
    state: String,
    started_at: String,
    frames_sent: u64,
    bytes_forwarded: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct RelayListResponse {
    relays: Vec<RelaySummary>,
    total: usize,
}

/// Turn the HTTP API base URL into the log stream WebSocket URL
fn logs_url(api_url: &str, container: &str) -> String {
    let base = api_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{base}/api/v1/containers/{container}/logs")
}

/// The server explains a failed stream in a text frame sent before any log data.
fn is_diagnostic(first_text: &str) -> bool {
    first_text.starts_with(DIAGNOSTIC_PREFIX)
}

/// Describe how the server ended the stream. Returns `true` for a clean end.
fn report_close(frame: Option<&CloseFrame<'_>>) -> bool {
    match frame {
        Some(frame) if frame.code == CloseCode::Normal => {
            eprintln!("{} {}", "✓ Stream closed:".green(), frame.reason);
            true
        }
        Some(frame) if frame.code == CloseCode::Away => {
            eprintln!("{} {}", "Stream stopped:".yellow(), frame.reason);
            true
        }
        Some(frame) => {
            eprintln!("{} {} ({})", "✗ Stream failed:".red(), frame.reason, frame.code);
            false
        }
        None => {
            eprintln!("{}", "Stream closed without a reason".yellow());
            true
        }
    }
}

async fn follow_logs(api_url: &str, container: &str) -> Result<()> {
    let url = logs_url(api_url, container);
    let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .with_context(|| format!("Failed to open log stream at {url}"))?;

    let mut stdout = tokio::io::stdout();
    let mut clean = true;
    let mut first_frame = true;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            message = ws.next() => {
                let first = std::mem::replace(&mut first_frame, false);
                match message {
                    Some(Ok(Message::Text(text))) if first && is_diagnostic(&text) => {
                        eprintln!("{}", text.red());
                        clean = false;
                    }
                    Some(Ok(Message::Text(text))) => {
                        stdout.write_all(text.as_bytes()).await?;
                        stdout.flush().await?;
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        stdout.write_all(&bytes).await?;
                        stdout.flush().await?;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        clean &= report_close(frame.as_ref());
                        break;
                    }
                    // Pings are answered by the stream itself while it is polled
                    Some(Ok(_)) => first_frame = first,
                    Some(Err(e)) => anyhow::bail!("Log stream error: {e}"),
                    None => break,
                }
            }
            _ = &mut ctrl_c => {
                let _ = ws
                    .send(Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "client stopped".into(),
                    })))
                    .await;
                break;
            }
        }
    }

    if !clean {
        anyhow::bail!("Log stream for {container} did not end cleanly");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();

    match cli.command {
        Commands::Health => {
            let response = client
                .get(format!("{}/health", cli.api_url))
                .send()
                .context("Failed to get health")?;

            if !response.status().is_success() {
                anyhow::bail!("Health check failed: {}", response.status());
            }

            let health: HealthResponse = response.json().context("Failed to parse response")?;

            println!("{}", "dockweb Server Status".bright_cyan().bold());
            println!("{}", "=".repeat(40).bright_blue());
            println!("{} {}", "Status:".cyan(),
                if health.status == "healthy" {
                    health.status.green()
                } else {
                    health.status.yellow()
                }
            );
            println!("{} {}", "Version:".cyan(), health.version);
            println!("{} {}s", "Uptime:".cyan(), health.uptime_seconds);
            println!("{} {}", "Active Relays:".cyan(), health.active_relays);
            println!(
                "{} {}",
                "Runtime:".cyan(),
                health.runtime_version.as_deref().unwrap_or("unreachable")
            );
        }

        Commands::Logs { container } => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
            runtime.block_on(follow_logs(&cli.api_url, &container))?;
        }

        Commands::Relays { output } => {
            let response = client
                .get(format!("{}/api/v1/relays", cli.api_url))
                .send()
                .context("Failed to list relays")?;

            if !response.status().is_success() {
                anyhow::bail!("List failed: {}", response.status());
            }

            let listing: RelayListResponse = response.json().context("Failed to parse response")?;

            if output == "json" {
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                println!("{} {}", "Active relays:".bright_cyan().bold(), listing.total);
                for relay in listing.relays {
                    println!(
                        "  {} {} [{}] since {} ({} frames, {} bytes)",
                        relay.session_id.bright_white(),
                        relay.container_id,
                        relay.state,
                        relay.started_at,
                        relay.frames_sent,
                        relay.bytes_forwarded
                    );
                }
            }
        }

        Commands::Cancel { session_id } => {
            let response = client
                .delete(format!("{}/api/v1/relays/{}", cli.api_url, session_id))
                .send()
                .context("Failed to cancel relay")?;

            if !response.status().is_success() {
                let error_text = response.text().unwrap_or_else(|_| "Unknown error".to_string());
                anyhow::bail!("Cancel failed: {}", error_text);
            }

            println!("{} {}", "✓ Cancelled:".green(), session_id);
        }
    }

    Ok(())
}
