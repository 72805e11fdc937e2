use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    backend::InterviewBackend,
    config::{load_settings, EndpointSettings},
    snapshot::SqliteSnapshotStore,
    view::ViewState,
    ClientEvent, EndpointClient,
};
use shared::{
    domain::EndpointId,
    protocol::{
        AnalysisTab, Message, Navigate, QuestionDetails, QuestionIndex, ScrollCommand,
        ScrollDirection, SessionData, SpeakCommand, TabChange, TranscriptionResult,
    },
};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    snapshot_db: Option<String>,
    #[arg(long)]
    backend_url: Option<String>,
    #[arg(long)]
    resend_after_ms: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the display endpoint and print what it shows.
    Display,
    /// Drive the interview from the controller endpoint.
    Controller {
        #[command(subcommand)]
        action: ControllerAction,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum ControllerAction {
    /// Start a session from the backend or from a JSON file.
    Start {
        #[arg(long, required_unless_present = "file")]
        topic: Option<String>,
        #[arg(long, default_value = "Medium")]
        difficulty: String,
        #[arg(long, default_value_t = 5)]
        count: usize,
        #[arg(long, conflicts_with = "topic")]
        file: Option<PathBuf>,
    },
    Index {
        index: usize,
    },
    /// Ask the display to read a question aloud.
    Speak {
        index: usize,
        #[arg(long)]
        text: Option<String>,
    },
    /// Record the speech-to-text outcome for a question.
    Transcript {
        index: usize,
        #[arg(long, required_unless_present = "error", conflicts_with = "error")]
        text: Option<String>,
        #[arg(long)]
        error: Option<String>,
    },
    /// Score the recorded transcripts and send the analysis.
    Analyze,
    Navigate {
        path: String,
    },
    Tab {
        tab: TabArg,
    },
    Scroll {
        direction: DirectionArg,
    },
    Details {
        #[command(subcommand)]
        action: DetailsAction,
    },
    /// Ask the host to replay its cached state to this controller.
    Resend,
    /// Print the controller's local view.
    Show,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum DetailsAction {
    Show { index: usize },
    Close,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum TabArg {
    Radar,
    Bar,
    Line,
}

impl From<TabArg> for AnalysisTab {
    fn from(tab: TabArg) -> Self {
        match tab {
            TabArg::Radar => AnalysisTab::Radar,
            TabArg::Bar => AnalysisTab::Bar,
            TabArg::Line => AnalysisTab::Line,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum DirectionArg {
    Up,
    Down,
}

impl From<DirectionArg> for ScrollDirection {
    fn from(direction: DirectionArg) -> Self {
        match direction {
            DirectionArg::Up => ScrollDirection::Up,
            DirectionArg::Down => ScrollDirection::Down,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = apply_overrides(load_settings(), &args);
    tracing_subscriber::fmt()
        .with_env_filter(settings.log_filter.as_str())
        .init();

    match args.command {
        Command::Display => run_display(&settings).await,
        Command::Controller { action } => run_controller(&settings, action).await,
    }
}

fn apply_overrides(mut settings: EndpointSettings, args: &Args) -> EndpointSettings {
    if let Some(v) = &args.server_url {
        settings.server_url = v.clone();
    }
    if let Some(v) = &args.snapshot_db {
        settings.snapshot_db = v.clone();
    }
    if let Some(v) = &args.backend_url {
        settings.backend_url = v.clone();
    }
    if let Some(ms) = args.resend_after_ms.filter(|ms| *ms > 0) {
        settings.resend_after = Duration::from_millis(ms);
    }
    settings
}

async fn connect(settings: &EndpointSettings, endpoint: EndpointId) -> Result<Arc<EndpointClient>> {
    let store = SqliteSnapshotStore::open(&settings.snapshot_db, endpoint).await?;
    EndpointClient::connect(
        &settings.server_url,
        endpoint,
        Arc::new(store),
        settings.resend_after,
    )
    .await
}

async fn run_display(settings: &EndpointSettings) -> Result<()> {
    let client = connect(settings, EndpointId::Display).await?;
    let mut events = client.subscribe_events();
    print_view(&client.view().await);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(ClientEvent::Restored(view)) => print_view(&view),
                Ok(ClientEvent::ViewUpdated { channel, replayed, mut view }) => {
                    println!(
                        "-- {}{}",
                        channel.name(),
                        if replayed { " (replayed)" } else { "" }
                    );
                    if let Some(direction) = view.take_scroll() {
                        println!("scroll {direction:?}");
                    }
                    print_view(&view);
                }
                Ok(ClientEvent::Attached { instance_id }) => {
                    info!(instance_id = instance_id.0, "display attached");
                }
                Ok(ClientEvent::ResendRequested) => println!("waiting for session, resend requested"),
                Ok(ClientEvent::Error(error)) => eprintln!("error: {error}"),
                Err(RecvError::Lagged(skipped)) => {
                    eprintln!("skipped {skipped} updates");
                    print_view(&client.view().await);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

fn print_view(view: &ViewState) {
    let Some(session) = &view.session else {
        println!("no interview in progress");
        return;
    };
    println!(
        "{} ({}) question {}/{}",
        session.topic,
        session.difficulty,
        view.current_index + 1,
        session.questions.len()
    );
    if let Some(question) = view.current_question() {
        println!("  Q: {}", question.question);
    }
    match view.current_transcript() {
        Some(TranscriptionResult {
            text: Some(text), ..
        }) => println!("  A: {text}"),
        Some(TranscriptionResult {
            error: Some(error), ..
        }) => println!("  transcription failed: {error}"),
        _ => {}
    }
    if let Some(analysis) = &view.analysis {
        println!(
            "  analysis: overall {:.1} across {} answers, tab {:?}",
            analysis.overall_score,
            analysis.analysis_results.len(),
            view.active_tab
        );
        if let Some(index) = view.open_details {
            if let Some(detail) = analysis.analysis_results.get(&index) {
                println!("  details for question {}: {}", index + 1, detail.feedback);
            }
        }
    }
    if let Some(path) = &view.navigation {
        println!("  at {path}");
    }
}

async fn run_controller(settings: &EndpointSettings, action: ControllerAction) -> Result<()> {
    let client = connect(settings, EndpointId::Controller).await?;
    let view = client.view().await;

    let outgoing = match &action {
        ControllerAction::Start {
            topic,
            difficulty,
            count,
            file,
        } => {
            let session = match (file, topic) {
                (Some(path), _) => load_session_file(path)?,
                (None, Some(topic)) => {
                    InterviewBackend::new(&settings.backend_url)?
                        .fetch_questions(topic, difficulty, *count)
                        .await?
                }
                (None, None) => return Err(anyhow!("either --topic or --file is required")),
            };
            vec![
                Message::SessionStart(session),
                Message::QuestionIndex(QuestionIndex { index: 0 }),
            ]
        }
        ControllerAction::Analyze => {
            let session = view
                .session
                .as_ref()
                .ok_or_else(|| anyhow!("no interview in progress"))?;
            let answers: BTreeMap<usize, String> = view
                .transcriptions
                .iter()
                .filter_map(|(index, result)| result.text.clone().map(|text| (*index, text)))
                .collect();
            let analysis = InterviewBackend::new(&settings.backend_url)?
                .analyze_session(session, &answers)
                .await?;
            vec![Message::AnalysisData(analysis)]
        }
        ControllerAction::Resend => {
            client.request_resend().await?;
            Vec::new()
        }
        ControllerAction::Show => {
            print_view(&view);
            Vec::new()
        }
        other => vec![controller_message(other, &view)?],
    };

    for message in outgoing {
        let channel = message.channel();
        client.send(EndpointId::Display, message).await?;
        info!(channel = channel.name(), "controller: sent to display");
    }
    client.flush().await?;
    Ok(())
}

fn load_session_file(path: &Path) -> Result<SessionData> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read session file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("session file {} is not valid session JSON", path.display()))
}

/// Messages that need nothing but the local view to build.
fn controller_message(action: &ControllerAction, view: &ViewState) -> Result<Message> {
    let message = match action {
        ControllerAction::Index { index } => {
            let session = view
                .session
                .as_ref()
                .ok_or_else(|| anyhow!("no interview in progress"))?;
            Message::QuestionIndex(QuestionIndex {
                index: session.clamp_index(*index),
            })
        }
        ControllerAction::Speak { index, text } => {
            let text = match text {
                Some(text) => text.clone(),
                None => view
                    .session
                    .as_ref()
                    .and_then(|session| session.questions.get(*index))
                    .map(|question| question.question.clone())
                    .ok_or_else(|| anyhow!("no question {index} to speak"))?,
            };
            Message::Speak(SpeakCommand {
                index: *index,
                text,
            })
        }
        ControllerAction::Transcript { index, text, error } => {
            Message::TranscriptionResult(match (text, error) {
                (Some(text), _) => TranscriptionResult::text(*index, text.clone()),
                (None, Some(error)) => TranscriptionResult::failed(*index, error.clone()),
                (None, None) => return Err(anyhow!("either --text or --error is required")),
            })
        }
        ControllerAction::Navigate { path } => Message::Navigate(Navigate { path: path.clone() }),
        ControllerAction::Tab { tab } => Message::TabChange(TabChange { tab: (*tab).into() }),
        ControllerAction::Scroll { direction } => Message::Scroll(ScrollCommand {
            direction: (*direction).into(),
        }),
        ControllerAction::Details { action } => Message::QuestionDetails(match action {
            DetailsAction::Show { index } => QuestionDetails::Show { index: *index },
            DetailsAction::Close => QuestionDetails::Close,
        }),
        ControllerAction::Start { .. }
        | ControllerAction::Analyze
        | ControllerAction::Resend
        | ControllerAction::Show => {
            return Err(anyhow!("{action:?} needs the host or backend"));
        }
    };
    Ok(message)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
