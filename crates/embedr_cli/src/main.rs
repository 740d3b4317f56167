use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, UNIX_EPOCH};

use checkpoint_store::{main_artifact_path, CheckpointStore};
use clap::Parser;
use embedr_cli::bridges::{self, BRIDGE_ENV_VAR, DEFAULT_BRIDGE_ID};
use embedr_cli::commands::{parse_slash_command, SlashCommand, HELP};
use embedr_cli::output::JsonLinesHost;
use embedr_session::{
    init_logging, GuiHost, SessionConfig, StreamController, TurnOutcome, TurnRequest,
};
use serde_json::{json, Value};
use transcript_store::{new_thread_id, TranscriptStore};

/// Drives assistant turns for one sketch project over stdin/stdout.
///
/// Each stdin line is either a prompt or a slash command; UI events are
/// written to stdout as JSON lines.
#[derive(Parser, Debug)]
#[command(name = "embedr_cli", version)]
struct Cli {
    /// Sketch project directory.
    project_dir: PathBuf,

    /// Conversation thread to continue; a new one is created when omitted.
    thread_id: Option<String>,

    #[arg(long, env = BRIDGE_ENV_VAR, default_value = DEFAULT_BRIDGE_ID)]
    bridge: String,
}

fn main() -> io::Result<()> {
    let cli = Cli::parse();
    let config = SessionConfig::from_env();
    init_logging(&config.log_level, config.log_format);

    let bridge = bridges::bridge_for_id(&cli.bridge).map_err(io::Error::other)?;
    let host = Arc::new(JsonLinesHost::stdout());
    let gui: Arc<dyn GuiHost> = Arc::clone(&host) as Arc<dyn GuiHost>;
    let controller = StreamController::new(config, bridge, gui);

    let thread_id = cli.thread_id.clone().unwrap_or_else(new_thread_id);
    tracing::info!(project = %cli.project_dir.display(), %thread_id, "session started");
    host.write_record(&json!({ "type": "session", "thread_id": thread_id }));

    let mut turns: Vec<JoinHandle<TurnOutcome>> = Vec::new();
    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let Some(command) = parse_slash_command(&line) else {
            let request = TurnRequest::new(&cli.project_dir, &thread_id, line);
            turns.push(controller.start_turn(request)?);
            turns.retain(|handle| !handle.is_finished());
            continue;
        };

        match command {
            SlashCommand::Quit => break,
            SlashCommand::Help => host.write_record(&json!({ "type": "help", "text": HELP })),
            SlashCommand::Cancel => {
                let cancelled = controller.cancel();
                host.write_record(&json!({ "type": "cancel", "live": cancelled }));
            }
            SlashCommand::Token {
                value,
                expires_at_ms,
            } => {
                let expires_at = UNIX_EPOCH + Duration::from_millis(expires_at_ms);
                if let Err(error) = controller.set_credential(&value, expires_at) {
                    host.write_record(&error_record(error.to_string()));
                }
            }
            SlashCommand::Board(fqbn) => controller.set_board(fqbn),
            SlashCommand::BoardOption { key, value } => controller.set_board_option(key, value),
            SlashCommand::Port(port) => controller.set_port(port),
            SlashCommand::Threads => {
                let record = match TranscriptStore::for_project(&cli.project_dir).list_threads() {
                    Ok(threads) => json!({ "type": "threads", "threads": threads }),
                    Err(error) => error_record(error.to_string()),
                };
                host.write_record(&record);
            }
            SlashCommand::Versions => host.write_record(&versions_record(&cli)),
            SlashCommand::Restore(snapshot) => {
                host.write_record(&restore_record(&cli, &snapshot));
            }
            SlashCommand::Invalid { command, usage } => {
                host.write_record(&error_record(format!("{command}: usage {usage}")));
            }
            SlashCommand::Unknown(command) => {
                host.write_record(&error_record(format!("Unknown command {command}. {HELP}")));
            }
        }
    }

    controller.cancel();
    for handle in turns {
        if handle.join().is_err() {
            tracing::error!("turn thread panicked");
        }
    }
    tracing::info!(%thread_id, "session closed");
    Ok(())
}

fn checkpoints(cli: &Cli) -> Option<CheckpointStore> {
    main_artifact_path(&cli.project_dir).map(CheckpointStore::for_artifact)
}

fn versions_record(cli: &Cli) -> Value {
    let Some(store) = checkpoints(cli) else {
        return error_record("No sketch file found in the project directory.".to_string());
    };
    match store.list() {
        Ok(entries) => json!({
            "type": "versions",
            "versions": entries
                .iter()
                .map(|entry| json!({
                    "version": entry.version,
                    "filename": entry.filename,
                    "timestamp": entry.timestamp,
                }))
                .collect::<Vec<_>>(),
        }),
        Err(error) => error_record(error.to_string()),
    }
}

fn restore_record(cli: &Cli, snapshot: &str) -> Value {
    let Some(store) = checkpoints(cli) else {
        return error_record("No sketch file found in the project directory.".to_string());
    };
    if snapshot.contains(['/', '\\']) || snapshot.starts_with('.') {
        return error_record(format!("Invalid snapshot name '{snapshot}'."));
    }
    let snapshot_path = store.versions_dir().join(snapshot);
    match store.restore(&snapshot_path) {
        Ok(content) => json!({ "type": "restored", "filename": snapshot, "bytes": content.len() }),
        Err(error) => error_record(error.to_string()),
    }
}

fn error_record(message: String) -> Value {
    json!({ "type": "command_error", "error": message })
}
