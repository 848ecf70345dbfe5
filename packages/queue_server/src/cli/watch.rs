//! `ptc watch`: follow one teacher's queue in the terminal.
//!
//! Keys (followed by Enter): `c` completes the current party, `s` skips it,
//! `q` quits.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use conference_queue::{RenderState, TeacherId};

use crate::client::{ConnectionStatus, SessionCommand, SessionEvent, run_watch_session};
use crate::config::ClientConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Command(SessionCommand),
    Quit,
}

fn parse_key(line: &str) -> Option<KeyAction> {
    match line.trim().to_ascii_lowercase().as_str() {
        "c" => Some(KeyAction::Command(SessionCommand::Complete)),
        "s" => Some(KeyAction::Command(SessionCommand::Skip)),
        "q" => Some(KeyAction::Quit),
        _ => None,
    }
}

fn format_status(status: ConnectionStatus) -> String {
    match status {
        ConnectionStatus::Connected => "[connected]".to_string(),
        ConnectionStatus::Disconnected => "[connection lost]".to_string(),
        ConnectionStatus::Reconnecting => "[reconnecting...]".to_string(),
    }
}

fn format_render(teacher_id: &TeacherId, state: &RenderState) -> String {
    format!("--- {} ---\n{}", teacher_id, state)
}

pub async fn watch_command(config: ClientConfig, teacher_id: TeacherId) -> Result<()> {
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let (event_tx, mut event_rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();

    let session = tokio::spawn(run_watch_session(
        config,
        teacher_id.clone(),
        cmd_rx,
        event_tx,
        cancel.clone(),
    ));

    println!("Watching {} (c = complete, s = skip, q = quit)", teacher_id);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = event_rx.recv() => match event {
                Some(SessionEvent::Status(status)) => println!("{}", format_status(status)),
                Some(SessionEvent::Render(state)) => print!("{}", format_render(&teacher_id, &state)),
                Some(SessionEvent::Notice(notice)) => println!("! {}", notice),
                None => break,
            },

            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match parse_key(&line) {
                    Some(KeyAction::Command(cmd)) => {
                        let _ = cmd_tx.send(cmd).await;
                    }
                    Some(KeyAction::Quit) => break,
                    None => {}
                },
                // Keep watching without a keyboard.
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("stdin read failed: {}", e);
                    stdin_open = false;
                }
            },

            _ = tokio::signal::ctrl_c() => break,
        }
    }

    cancel.cancel();
    session.await??;
    Ok(())
}
