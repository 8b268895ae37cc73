// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley shell` command implementation.
//!
//! Launches an interactive REPL with colored output and readline history.
//! Incoming messages, typing indicators, and errors are printed by a
//! background task as session events arrive.

use std::sync::Arc;

use colored::Colorize;
use parley_client::{ChatClient, SessionEvent, SessionState};
use parley_config::ParleyConfig;
use parley_core::{Message, MessageStatus, ParleyError, Sender};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One line of shell input.
#[derive(Debug, PartialEq, Eq)]
enum ShellCommand<'a> {
    Quit,
    Retry(&'a str),
    History,
    Status,
    Connect,
    Help,
    Send(&'a str),
    Unknown(&'a str),
}

impl<'a> ShellCommand<'a> {
    fn parse(input: &'a str) -> Self {
        let Some(command) = input.strip_prefix('/') else {
            return ShellCommand::Send(input);
        };
        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };
        match name {
            "quit" | "exit" => ShellCommand::Quit,
            "retry" if !arg.is_empty() => ShellCommand::Retry(arg),
            "history" => ShellCommand::History,
            "status" => ShellCommand::Status,
            "connect" => ShellCommand::Connect,
            "help" => ShellCommand::Help,
            _ => ShellCommand::Unknown(input),
        }
    }
}

/// Runs the `parley shell` interactive REPL.
pub async fn run_shell(config: ParleyConfig) -> Result<(), ParleyError> {
    let client = ChatClient::new(&config)?;
    let printer = spawn_printer(client.subscribe(), client.state().clone());

    if !client.state().has_credential() {
        println!(
            "{}",
            "no stored credential; run `parley login <user>` first".yellow()
        );
    }

    if let Err(e) = client.fetch_history().await {
        warn!(error = %e, "history not loaded");
    }
    client.connect()?;

    let mut rl = DefaultEditor::new()
        .map_err(|e| ParleyError::Internal(format!("failed to initialize readline: {e}")))?;

    println!("{}", "parley shell".bold().green());
    println!(
        "Type {} to exit, {} for commands.\n",
        "/quit".yellow(),
        "/help".yellow()
    );

    let prompt = format!("{}> ", "parley".green());
    loop {
        let line = tokio::task::block_in_place(|| rl.readline(&prompt));
        match line {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(&line);

                match ShellCommand::parse(trimmed) {
                    ShellCommand::Quit => break,
                    ShellCommand::Send(text) => {
                        if let Err(e) = client.send(text).await {
                            debug!(error = %e, "send failed");
                        }
                    }
                    ShellCommand::Retry(key) => retry(&client, key).await,
                    ShellCommand::History => match client.fetch_history().await {
                        Ok(_) => {}
                        Err(e) => eprintln!("{}: {e}", "error".red()),
                    },
                    ShellCommand::Status => print_status(&client),
                    ShellCommand::Connect => {
                        if let Err(e) = client.connect() {
                            eprintln!("{}: {e}", "error".red());
                        }
                    }
                    ShellCommand::Help => print_help(),
                    ShellCommand::Unknown(input) => {
                        eprintln!("{}: unknown command {input}", "error".red());
                        print_help();
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {e}", "error".red());
                break;
            }
        }
    }

    printer.abort();
    client.shutdown().await;
    println!("{}", "goodbye".dimmed());
    Ok(())
}

async fn retry(client: &ChatClient, key: &str) {
    let Some(original) = client.state().find_by_key(key) else {
        eprintln!("{}: no message with key {key}", "error".red());
        return;
    };
    match client.retry(key, &original.text).await {
        Ok(message) if message.status == MessageStatus::Acknowledged => {
            println!("{}", format!("{key} delivered").dimmed());
        }
        Ok(_) => println!("{}", format!("{key} sent").dimmed()),
        Err(e) => debug!(error = %e, "retry failed"),
    }
}

fn print_status(client: &ChatClient) {
    let status = client.status();
    let state = client.state();
    println!("channel:    {}", status.state);
    println!("connected:  {}", state.is_connected());
    if status.attempts > 0 {
        println!("reconnects: {}", status.attempts);
    }
    if let Some(delay) = status.next_delay {
        println!("next retry: {} ms", delay.as_millis());
    }
    println!(
        "credential: {}",
        if state.has_credential() { "stored" } else { "none" }
    );
    if let Some(error) = state.error() {
        println!("error:      [{}] {}", error.kind, error.message);
    }
}

fn print_help() {
    println!("  /retry <key>  deliver a failed message again");
    println!("  /history      reload the conversation");
    println!("  /status       show connection state");
    println!("  /connect      reconnect after giving up");
    println!("  /quit         leave the shell");
}

/// A message as one plain-text line.
fn plain_line(message: &Message) -> String {
    let mut line = format!(
        "{} {}: {}",
        message.timestamp.format("%H:%M"),
        message.sender,
        message.text
    );
    if message.status == MessageStatus::Failed {
        line.push_str(" (not delivered)");
    }
    line
}

/// A message as one colored line.
pub fn format_message(message: &Message) -> String {
    let line = plain_line(message);
    match (message.sender, message.status) {
        (_, MessageStatus::Failed) => line.red().to_string(),
        (Sender::User, _) => line.dimmed().to_string(),
        (Sender::Assistant, _) => line.cyan().to_string(),
    }
}

/// Print session events until aborted.
fn spawn_printer(
    mut events: broadcast::Receiver<SessionEvent>,
    state: Arc<SessionState>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "shell fell behind on session events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            print_event(&event, &state);
        }
    })
}

fn print_event(event: &SessionEvent, state: &SessionState) {
    match event {
        SessionEvent::MessageAdded(message) if message.sender == Sender::Assistant => {
            println!("{}", format_message(message));
        }
        SessionEvent::MessageUpdated {
            id,
            status: MessageStatus::Failed,
        } => {
            let key = state
                .messages()
                .into_iter()
                .find(|m| &m.id == id)
                .and_then(|m| m.idempotency_key);
            if let Some(key) = key {
                println!("{}", format!("not delivered; /retry {key}").yellow());
            }
        }
        SessionEvent::TypingChanged {
            participant,
            typing: true,
        } if participant != Sender::User.participant() => {
            println!("{}", format!("{participant} is typing...").dimmed());
        }
        SessionEvent::ConnectionChanged(connected) => {
            let text = if *connected { "connected" } else { "disconnected" };
            println!("{}", text.dimmed());
        }
        SessionEvent::ErrorRaised(error) => {
            let hint = if error.fatal { " (/connect to try again)" } else { "" };
            eprintln!("{}: {}{hint}", error.kind.as_ref().red(), error.message);
        }
        SessionEvent::HistoryReplaced(_) => {
            for message in state.messages() {
                println!("{}", format_message(&message));
            }
        }
        SessionEvent::LoggedOut => {
            println!(
                "{}",
                "session ended; run `parley login <user>` to continue".yellow()
            );
        }
        SessionEvent::AuthenticationRequired => {
            println!(
                "{}",
                "credential rejected; run `parley login <user>`".yellow()
            );
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn parses_commands() {
        assert_eq!(ShellCommand::parse("/quit"), ShellCommand::Quit);
        assert_eq!(ShellCommand::parse("/exit"), ShellCommand::Quit);
        assert_eq!(ShellCommand::parse("/retry msg_1_ab"), ShellCommand::Retry("msg_1_ab"));
        assert_eq!(ShellCommand::parse("/history"), ShellCommand::History);
        assert_eq!(ShellCommand::parse("/status"), ShellCommand::Status);
        assert_eq!(ShellCommand::parse("/connect"), ShellCommand::Connect);
        assert_eq!(ShellCommand::parse("/help"), ShellCommand::Help);
    }

    #[test]
    fn plain_text_is_sent() {
        assert_eq!(ShellCommand::parse("hello there"), ShellCommand::Send("hello there"));
    }

    #[test]
    fn retry_needs_a_key() {
        assert_eq!(ShellCommand::parse("/retry"), ShellCommand::Unknown("/retry"));
        assert_eq!(ShellCommand::parse("/nope"), ShellCommand::Unknown("/nope"));
    }

    #[test]
    fn message_lines() {
        let mut message = Message::outgoing("m1".into(), "k1".into(), "hi");
        message.timestamp = Utc.with_ymd_and_hms(2026, 1, 2, 9, 5, 0).unwrap();
        assert_eq!(plain_line(&message), "09:05 user: hi");

        message.status = MessageStatus::Failed;
        assert_eq!(plain_line(&message), "09:05 user: hi (not delivered)");
    }
}
