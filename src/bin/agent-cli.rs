use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "agent-cli")]
#[command(about = "Control-plane CLI for the mesh agent", long_about = None)]
struct Cli {
    #[arg(short, long, env = "MESH_AGENT_URL", default_value = "http://127.0.0.1:9900")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe the agent's health endpoint
    Health,
    /// Show agent type and version
    Info,
    /// Replace the list of request headers echoed on responses
    ForwardHeaders {
        /// Comma-separated header names
        headers: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Health => {
            let res = client.get(format!("{base}/health")).send().await?;
            if res.status().is_success() {
                println!("healthy");
            } else {
                eprintln!("Error: agent returned status {}", res.status());
                std::process::exit(1);
            }
        }
        Commands::Info => {
            let res = client.get(format!("{base}/agent-info")).send().await?;
            print_response(res).await?;
        }
        Commands::ForwardHeaders { headers } => {
            let body = json!({ "easeagent.progress.forwarded.headers": headers });
            let res = client.post(format!("{base}/config")).json(&body).send().await?;
            let status = res.status();
            if status.is_success() {
                println!("updated");
            } else {
                eprintln!("Error: agent returned status {status}");
                if let Ok(text) = res.text().await {
                    eprintln!("Response: {text}");
                }
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: agent returned status {status}");
        if let Ok(text) = res.text().await {
            eprintln!("Response: {text}");
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
