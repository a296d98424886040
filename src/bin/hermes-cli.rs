use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use hermes::upstream::ndjson::LineBuffer;
use serde_json::{json, Value};
use std::io::Write;

#[derive(Parser)]
#[command(name = "hermes-cli")]
#[command(about = "Command-line client for the Hermes inference sidecar", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:4020")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show upstream health and per-model slot usage
    Status,
    /// Run a single-shot generation
    Generate {
        model: String,
        prompt: String,
        /// Request timeout in milliseconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },
    /// Run a streamed generation, printing chunks as they arrive
    Stream {
        model: String,
        prompt: String,
        /// Request timeout in milliseconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Status => {
            let res = client.get(format!("{}/v1/status", base)).send().await?;
            print_response(res).await?;
        }
        Commands::Generate { model, prompt, timeout } => {
            let res = client
                .post(format!("{}/v1/llm/{}", base, model))
                .json(&body(&prompt, timeout))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Stream { model, prompt, timeout } => {
            let res = client
                .post(format!("{}/v1/llm/{}/stream", base, model))
                .json(&body(&prompt, timeout))
                .send()
                .await?;
            if !res.status().is_success() {
                return print_response(res).await;
            }
            print_stream(res).await?;
        }
    }

    Ok(())
}

fn body(prompt: &str, timeout: Option<u64>) -> Value {
    match timeout {
        Some(ms) => json!({ "prompt": prompt, "timeout": ms }),
        None => json!({ "prompt": prompt }),
    }
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: sidecar returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn print_stream(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let mut body = res.bytes_stream();
    let mut lines = LineBuffer::new();
    let mut stdout = std::io::stdout();

    while let Some(piece) = body.next().await {
        for line in lines.push(&piece?)? {
            let Ok(event) = serde_json::from_slice::<Value>(&line) else {
                continue;
            };
            if let Some(text) = event.get("chunk").and_then(Value::as_str) {
                write!(stdout, "{}", text)?;
                stdout.flush()?;
            } else if event.get("done").is_some() {
                writeln!(stdout)?;
                return Ok(());
            } else if let Some(message) = event.get("error").and_then(Value::as_str) {
                writeln!(stdout)?;
                eprintln!("Error: {}", message);
                return Ok(());
            }
        }
    }

    writeln!(stdout)?;
    Ok(())
}
