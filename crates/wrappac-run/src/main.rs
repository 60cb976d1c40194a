//! wrappac-run: run one command in a wrappac session from a terminal.
//!
//! Output is copied to stdout as it arrives, keys are forwarded to the
//! command, and `sudo`/`doas` password prompts are answered in place
//! without the password ever reaching the screen.

mod cli;
mod terminal;

use std::io;
use std::process::ExitCode;

use clap::Parser;
use crossterm::event::{Event, EventStream};
use futures::StreamExt;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use wrappac_session::{
    AnsiStripper, ConfigError, ControlChar, InputForwarder, LaunchConfig, Launcher, SessionControl,
    SessionError, SessionResult, SpawnError, TerminationCause, logging,
};

use crate::cli::Cli;
use crate::terminal::{Entry, PasswordEntry, RawMode};

#[derive(Debug, Error)]
enum RunError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("terminal: {0}")]
    Io(#[from] io::Error),
}

impl RunError {
    /// 127 when the command never started, as a shell reports it.
    const fn exit_status(&self) -> u8 {
        match self {
            Self::Spawn(_) => 127,
            Self::Config(_) | Self::Session(_) | Self::Io(_) => 1,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(result) => exit_code(&result),
        Err(e) => {
            eprintln!("wrappac-run: {e}");
            ExitCode::from(e.exit_status())
        }
    }
}

fn load_config(cli: &Cli) -> Result<LaunchConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => LaunchConfig::load(path)?,
        None => LaunchConfig::load_default()?,
    }
    .apply_env()?;

    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<SessionResult, RunError> {
    let config = load_config(&cli)?;
    logging::init(&config.logging)?;

    let launcher = Launcher::new(config);
    let mut session = launcher.launch(cli.invocation(terminal::size())).await?;
    let mut output = session.take_output().ok_or(SessionError::Closed)?;
    let mut prompts = session.take_prompts().ok_or(SessionError::Closed)?;
    let input = session.input();
    let control = session.control();

    let raw = RawMode::enable()?;
    let mut keys = raw.as_ref().map(|_| EventStream::new());
    let (resize_tx, mut resizes) = mpsc::unbounded_channel();
    let _winch = if raw.is_some() {
        Some(wrappac_pty::unix::on_window_change(move || {
            let _ = resize_tx.send(());
        })?)
    } else {
        drop(resize_tx);
        tokio::spawn(forward_stdin(input.clone()));
        None
    };

    let mut stripper = cli.plain.then(AnsiStripper::new);
    let mut stdout = tokio::io::stdout();
    let mut password: Option<PasswordEntry> = None;
    let mut prompts_open = true;

    loop {
        tokio::select! {
            chunk = output.recv() => {
                let Some(chunk) = chunk else { break };
                match stripper.as_mut() {
                    Some(stripper) => stdout.write_all(stripper.strip(&chunk.data).as_bytes()).await?,
                    None => stdout.write_all(&chunk.data).await?,
                }
                stdout.flush().await?;
            }
            prompt = prompts.recv(), if prompts_open => match prompt {
                Some(prompt) => {
                    stdout.write_all(format!("\r\n[{}] password: ", prompt.tool).as_bytes()).await?;
                    stdout.flush().await?;
                    password = Some(PasswordEntry::default());
                }
                None => prompts_open = false,
            },
            Some(event) = next_event(&mut keys) => {
                if let Event::Key(event) = event? {
                    if let Some((key, alt)) = terminal::translate(event) {
                        let entry = password.as_mut().map(|entry| entry.key(key));
                        match entry {
                            Some(Entry::Pending) => {}
                            Some(Entry::Done(secret)) => {
                                password = None;
                                stdout.write_all(b"\r\n").await?;
                                ignore_closed(input.send_password(&secret))?;
                            }
                            Some(Entry::Cancelled) => {
                                password = None;
                                ignore_closed(control.interrupt())?;
                            }
                            None if alt => ignore_closed(input.send_alt_key(key))?,
                            None => ignore_closed(input.send_key(key))?,
                        }
                    }
                }
            }
            Some(()) = resizes.recv() => resize(&control),
        }
    }

    let result = session.wait().await;
    drop(keys);
    drop(raw);
    let result = result?;

    if let Some(stderr) = &result.stderr {
        eprint!("{stderr}");
    }
    tracing::debug!(exit_code = result.exit_code, cause = ?result.cause, "command finished");
    Ok(result)
}

/// The next terminal event, or never when stdin is not a terminal.
async fn next_event(keys: &mut Option<EventStream>) -> Option<io::Result<Event>> {
    match keys {
        Some(keys) => keys.next().await,
        None => std::future::pending().await,
    }
}

fn resize(control: &SessionControl) {
    if let Some((cols, rows)) = terminal::size() {
        if let Err(e) = control.resize(cols, rows) {
            tracing::debug!(error = %e, "resize failed");
        }
    }
}

/// Copy piped stdin to the command, then send end-of-file.
async fn forward_stdin(input: InputForwarder) {
    let mut stdin = tokio::io::stdin();
    let mut buf = [0u8; 4096];
    loop {
        match stdin.read(&mut buf).await {
            Ok(0) => {
                let _ = input.send_control(ControlChar::CtrlD);
                return;
            }
            Ok(n) => {
                if input.send(&buf[..n]).is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed");
                return;
            }
        }
    }
}

/// Input sent after the command exited is dropped.
fn ignore_closed(result: Result<(), SessionError>) -> Result<(), SessionError> {
    match result {
        Err(SessionError::Closed) => Ok(()),
        other => other,
    }
}

/// Shell convention: the exit code, or 128 plus the signal number.
fn exit_code(result: &SessionResult) -> ExitCode {
    let code = match result.cause {
        TerminationCause::Exited => result.exit_code,
        TerminationCause::Signaled(signal) => 128 + signal,
        TerminationCause::Killed => 128 + 9,
    };
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
