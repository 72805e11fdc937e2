use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shared::{cache::SessionCache, domain::EndpointId};
use storage::{Storage, StoredSnapshot};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://data/endpoint.sqlite3")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print one endpoint's snapshot, or a summary of all of them.
    Show { endpoint: Option<EndpointId> },
    /// Delete an endpoint's snapshot so it starts empty on next launch.
    Clear { endpoint: EndpointId },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::Show {
            endpoint: Some(endpoint),
        } => match storage.load_snapshot(endpoint).await? {
            Some(snapshot) => {
                let cache = decode(&snapshot)?;
                println!("updated_at={}", snapshot.updated_at.to_rfc3339());
                println!("{}", serde_json::to_string_pretty(&cache)?);
            }
            None => println!("no snapshot for {endpoint}"),
        },
        Command::Show { endpoint: None } => {
            let snapshots = storage.list_snapshots().await?;
            if snapshots.is_empty() {
                println!("no snapshots");
            }
            for snapshot in snapshots {
                let summary = decode(&snapshot)?.summary();
                println!(
                    "{} updated_at={} topic={} questions={} index={} transcriptions={} analysis={}",
                    snapshot.endpoint,
                    snapshot.updated_at.to_rfc3339(),
                    summary.topic.as_deref().unwrap_or("-"),
                    summary.question_count,
                    summary
                        .question_index
                        .map(|index| index.to_string())
                        .unwrap_or_else(|| "-".into()),
                    summary.transcriptions,
                    summary.has_analysis
                );
            }
        }
        Command::Clear { endpoint } => {
            if storage.clear_snapshot(endpoint).await? {
                println!("cleared snapshot for {endpoint}");
            } else {
                println!("no snapshot for {endpoint}");
            }
        }
    }

    Ok(())
}

fn decode(snapshot: &StoredSnapshot) -> Result<SessionCache> {
    serde_json::from_str(&snapshot.snapshot_json)
        .with_context(|| format!("corrupt snapshot for {}", snapshot.endpoint))
}
