//! gridchat - talk to the grid assistant from a terminal.
//!
//! Holds a demo portfolio grid in memory, sends chat turns through a running
//! gridchat-server and applies the model's `updateGridState` calls locally.

mod command;
mod store;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gridchat_core::client::DEFAULT_CHAT_URL;
use gridchat_core::panel::{self, ChatPanel};
use gridchat_core::prompt::{DEFAULT_MODEL, SYSTEM_PROMPT};
use gridchat_core::{
    ChatClient, ChatEvent, ChatSession, Grid, GridApi, Toolbox, UpdateGridState,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::command::{Command, HELP};
use crate::store::FileBackedGrid;

#[derive(Parser)]
#[command(
    name = "gridchat",
    version,
    about = "Reshape a data grid by chatting with a language model"
)]
struct Cli {
    /// Chat endpoint of a running gridchat-server
    #[arg(long, env = "GRIDCHAT_URL", default_value = DEFAULT_CHAT_URL)]
    url: String,

    /// Model requested for every turn
    #[arg(long, env = "GRIDCHAT_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// JSON file the grid state is loaded from and saved to
    #[arg(long)]
    state_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let grid = Arc::new(
        FileBackedGrid::open(Grid::finance_demo(), cli.state_file.clone())
            .context("failed to load grid state")?,
    );
    let schema = grid.grid().schema();
    let toolbox = Toolbox::new().with(UpdateGridState::new(grid.clone(), schema.clone()));

    let mut panel = ChatPanel::new();
    panel.set_schema(schema.clone());
    panel.set_grid(grid.clone());

    let client = ChatClient::new(cli.url, toolbox);
    let mut session =
        ChatSession::new(cli.model, SYSTEM_PROMPT).with_tools(client.toolbox().specs());
    info!(url = client.url(), model = session.model(), "gridchat ready");

    if let Some(text) = panel::placeholder(&session) {
        println!("{text}");
    }
    println!("Type /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt()?;
        // Ctrl-C at the prompt quits; during a turn `run_turn` handles it.
        let Some(line) = command::read_line(&mut lines, tokio::signal::ctrl_c()).await? else {
            println!();
            break;
        };

        match command::parse(&line) {
            Command::Empty => {}
            Command::Quit => break,
            Command::Help => println!("{HELP}"),
            Command::Unknown(name) => println!("Unknown command {name}; try /help."),
            Command::Schema => println!("{}", panel::render_content(&schema)),
            Command::State => print_state(grid.as_ref())?,
            Command::History => print_history(&session),
            Command::Dismiss => {
                if session.error().is_none() {
                    println!("Nothing to dismiss.");
                } else {
                    session.dismiss_error();
                    println!("{}", panel::status_line(&session));
                }
            }
            Command::Retry => {
                if session.error().is_none() {
                    println!("Nothing to retry.");
                    continue;
                }
                run_turn(&client, &mut session, None).await;
            }
            Command::Send(text) => {
                panel.set_input(text);
                let Some(message) = panel.commit(&session) else {
                    continue;
                };
                run_turn(&client, &mut session, Some(message)).await;
            }
        }
    }

    Ok(())
}

/// Run one turn; Ctrl-C drops it and stops the session.
async fn run_turn(client: &ChatClient, session: &mut ChatSession, message: Option<String>) {
    let mut hinted = false;
    let outcome = {
        let on_event =
            |session: &ChatSession, event: ChatEvent| render_event(session, event, &mut hinted);
        let turn = async {
            match &message {
                Some(message) => client.send(session, message, on_event).await,
                None => client.reload(session, on_event).await,
            }
        };
        tokio::select! {
            result = turn => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        }
    };

    match outcome {
        Some(Ok(())) => {}
        Some(Err(e)) => debug!(error = %e, "turn failed"),
        None => {
            session.stop(true);
            println!("\n(stopped)");
        }
    }

    if let Some((error, retry)) = panel::error_banner(session) {
        println!("! {error}  [{retry}: /retry, dismiss: /dismiss]");
    }
    println!("{}", panel::status_line(session));
}

fn render_event(session: &ChatSession, event: ChatEvent, hinted: &mut bool) {
    match event {
        ChatEvent::GenerationStarted => {
            if panel::show_stop(session) && !*hinted {
                println!("  (Ctrl-C to stop)");
                *hinted = true;
            }
            if let Some(message) = session.messages().last() {
                print!("{}: ", panel::render_message(message).avatar);
            }
        }
        ChatEvent::ContentDelta(text) => print!("{text}"),
        ChatEvent::GenerationFinished => println!(),
        ChatEvent::ToolCallStarted { id, .. } | ChatEvent::ToolCallFinished { id, .. } => {
            if let Some(call) = session.tool_call(&id) {
                println!("   {}", panel::tool_call_label(call));
            }
        }
        ChatEvent::Error(_) | ChatEvent::TurnFinished => {}
    }
    let _ = std::io::stdout().flush();
}

fn print_history(session: &ChatSession) {
    for message in session.messages() {
        let rendered = panel::render_message(message);
        println!("{}: {}", rendered.avatar, rendered.body);
        for label in rendered.tool_calls {
            println!("   {label}");
        }
    }
}

fn print_state(grid: &dyn GridApi) -> Result<()> {
    let state = grid.state();
    for line in state.describe() {
        println!("  {line}");
    }
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

fn prompt() -> Result<()> {
    print!("> ");
    std::io::stdout().flush()?;
    Ok(())
}
