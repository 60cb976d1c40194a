//! Starting sessions.

use std::collections::HashMap;
use std::ffi::OsString;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::Instrument;
use wrappac_pty::{PtyConfig, PtySystem, UnixPtyMaster, UnixPtySystem};

use super::forwarder::{self, InputForwarder};
use super::relay::{self, EventReceiver, MasterReader, Relay};
use super::reporter::{self, Reporter, ResultFuture};
use super::{Session, SessionControl, Shared};
use crate::config::LaunchConfig;
use crate::error::SpawnError;
use crate::escalation::{Prepared, RootMethod, prepare_argv};
use crate::invocation::{EnvOverlay, Invocation, StderrMode};
use crate::scrub::{PromptDetector, SecretScrubber, SecretSet};
use crate::types::{SessionId, SessionStatus, StatusCell};

/// Starts sessions with a shared [`LaunchConfig`].
#[derive(Debug, Clone, Default)]
pub struct Launcher {
    config: Arc<LaunchConfig>,
}

impl Launcher {
    /// Create a launcher.
    #[must_use]
    pub fn new(config: LaunchConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// The launcher's configuration.
    #[must_use]
    pub fn config(&self) -> &LaunchConfig {
        &self.config
    }

    /// Start `invocation` on a new pseudo-terminal.
    ///
    /// Returns as soon as the child has been spawned; output, input and the
    /// exit are handled by background tasks. Must be called within a tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError`] if the invocation is invalid, the program
    /// cannot be found or executed, or no pseudo-terminal is available. No
    /// output is produced for a failed launch.
    pub async fn launch(&self, invocation: Invocation) -> Result<Session, SpawnError> {
        self.launch_reading(invocation, MasterReader::new).await
    }

    /// Launch with the relay reading from `reader(master)` instead of the
    /// master itself.
    async fn launch_reading<R, F>(&self, invocation: Invocation, reader: F) -> Result<Session, SpawnError>
    where
        F: FnOnce(Arc<UnixPtyMaster>) -> R,
        R: AsyncRead + Unpin + Send + 'static,
    {
        validate(&invocation)?;
        let prepared = self.prepare(&invocation)?;
        let pty_config = self.pty_config(&invocation);

        let program = prepared.argv[0].as_str();
        let (master, mut child) = UnixPtySystem::spawn(program, &prepared.argv[1..], &pty_config)
            .await
            .map_err(|e| SpawnError::from_pty(program, e))?;
        let started = Instant::now();

        let id = SessionId::new();
        let pid = child.pid();
        let span = tracing::info_span!("session", id = %id, program = %program, pid);
        span.in_scope(|| {
            tracing::info!(
                command = %invocation.display_command(),
                escalated = prepared.tool.is_some(),
                masked = invocation.masked_input(),
                "session started"
            );
        });

        let (finished, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            id,
            status: StatusCell::new(),
            signaller: child.signaller(),
            master: Arc::new(master),
            secrets: SecretSet::default(),
            awaiting_password: Arc::new(AtomicBool::new(false)),
            masked: invocation.masked_input(),
            terminate_grace: self.config.terminate_grace,
            finished,
        });
        shared
            .status
            .transition(SessionStatus::Created, SessionStatus::Running);

        let stderr = child.take_stderr().map(|mut pipe| {
            tokio::spawn(
                async move {
                    let mut buf = Vec::new();
                    pipe.read_to_end(&mut buf).await.map(|_| buf)
                }
                .instrument(span.clone()),
            )
        });

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (prompt_tx, prompt_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let detector = prepared.tool.map(|tool| {
            PromptDetector::new(
                &self.config.password_marker,
                tool,
                Arc::clone(&shared.awaiting_password),
            )
        });
        let relay = Relay {
            shared: Arc::clone(&shared),
            output: output_tx,
            prompts: prompt_tx,
            detector,
            scrubber: SecretScrubber::new(shared.secrets.clone()),
            stop: stop_rx,
        };
        let reader = reader(Arc::clone(&shared.master));
        let relay = tokio::spawn(relay::run(relay, reader).instrument(span.clone()));

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        tokio::spawn(
            forwarder::run_writer(Arc::clone(&shared), input_rx).instrument(span.clone()),
        );

        let (result_tx, result_rx) = oneshot::channel();
        let reporter = Reporter {
            child,
            shared: Arc::clone(&shared),
            relay,
            stop_relay: Some(stop_tx),
            stderr,
            started,
            drain_timeout: self.config.drain_timeout,
            result: result_tx,
        };
        tokio::spawn(reporter::run(reporter).instrument(span));

        Ok(Session {
            control: SessionControl {
                shared: Arc::clone(&shared),
            },
            invocation,
            pid,
            tool: prepared.tool,
            input: InputForwarder::new(input_tx, shared),
            output: Some(EventReceiver::new(output_rx)),
            prompts: Some(EventReceiver::new(prompt_rx)),
            result: Some(ResultFuture::new(result_rx)),
        })
    }

    /// The argv to spawn, wrapped in `sudo`/`doas` when root was requested.
    ///
    /// [`RootMethod::Auto`] defers to the configured root method.
    fn prepare(&self, invocation: &Invocation) -> Result<Prepared, SpawnError> {
        let argv = match invocation.root() {
            Some(requested) => {
                let method = match requested {
                    RootMethod::Auto => self.config.root_method,
                    explicit => explicit,
                };
                let (tool, path) = method.resolve().ok_or_else(|| SpawnError::NotFound {
                    program: match method {
                        RootMethod::Auto => "sudo or doas".to_string(),
                        RootMethod::Sudo => "sudo".to_string(),
                        RootMethod::Doas => "doas".to_string(),
                    },
                })?;
                tracing::debug!(%tool, path = %path.display(), "running as root");

                let mut argv = Vec::with_capacity(invocation.argv().len() + 1);
                argv.push(path.to_string_lossy().into_owned());
                argv.extend_from_slice(invocation.argv());
                argv
            }
            None => invocation.argv().to_vec(),
        };
        Ok(prepare_argv(&argv, &self.config.password_marker))
    }

    fn pty_config(&self, invocation: &Invocation) -> PtyConfig {
        let (cols, rows) = invocation
            .window_size()
            .unwrap_or((self.config.cols, self.config.rows));

        let inherited: Vec<(OsString, OsString)> = if invocation.env().inherit {
            std::env::vars_os().collect()
        } else {
            Vec::new()
        };
        let env = compose_environment(inherited, &self.config, invocation.env());

        let mut builder = PtyConfig::builder()
            .environment(env)
            .window_size(cols, rows)
            .echo(!invocation.masked_input())
            .translate_newlines(invocation.translate_newlines())
            .separate_stderr(invocation.stderr() == StderrMode::Separate);
        if let Some(dir) = invocation.working_directory() {
            builder = builder.working_directory(dir);
        }
        builder.build()
    }
}

/// Build a child's environment.
///
/// Starts from `inherited`, adds the launcher's terminal defaults where a
/// variable is not already present, then applies the invocation overlay.
#[must_use]
pub fn compose_environment<I>(
    inherited: I,
    config: &LaunchConfig,
    overlay: &EnvOverlay,
) -> HashMap<OsString, OsString>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let mut env: HashMap<OsString, OsString> = inherited.into_iter().collect();

    for (key, value) in config.terminal_defaults() {
        env.entry(OsString::from(key))
            .or_insert_with(|| OsString::from(value));
    }
    for (key, value) in &overlay.set {
        env.insert(OsString::from(key), OsString::from(value));
    }
    for key in &overlay.remove {
        env.remove(&OsString::from(key));
    }

    env
}

/// Reject invocations the OS would refuse, before touching the OS.
fn validate(invocation: &Invocation) -> Result<(), SpawnError> {
    match invocation.program() {
        None => return Err(SpawnError::EmptyCommand),
        Some(program) if program.is_empty() => return Err(SpawnError::EmptyCommand),
        Some(_) => {}
    }

    for (index, arg) in invocation.argv().iter().enumerate() {
        if arg.contains('\0') {
            return Err(SpawnError::InvalidArgument {
                what: format!("argument {index}"),
                reason: "contains a NUL byte",
            });
        }
    }

    let env = invocation.env();
    for (key, value) in &env.set {
        if key.is_empty() || key.contains('=') || key.contains('\0') {
            return Err(SpawnError::InvalidArgument {
                what: format!("environment variable {key:?}"),
                reason: "name must be non-empty without '=' or NUL",
            });
        }
        if value.contains('\0') {
            return Err(SpawnError::InvalidArgument {
                what: format!("environment variable {key:?}"),
                reason: "value contains a NUL byte",
            });
        }
    }

    if let Some(dir) = invocation.working_directory() {
        if !dir.is_dir() {
            return Err(SpawnError::WorkingDirectory {
                path: dir.to_path_buf(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os(pairs: &[(&str, &str)]) -> Vec<(OsString, OsString)> {
        pairs
            .iter()
            .map(|(k, v)| (OsString::from(k), OsString::from(v)))
            .collect()
    }

    #[test]
    fn defaults_do_not_replace_inherited_values() {
        let overlay = EnvOverlay::default();
        let env = compose_environment(os(&[("TERM", "linux"), ("PATH", "/bin")]), &LaunchConfig::default(), &overlay);

        assert_eq!(env.get(&OsString::from("TERM")), Some(&OsString::from("linux")));
        assert_eq!(env.get(&OsString::from("NO_COLOR")), Some(&OsString::from("1")));
        assert_eq!(env.get(&OsString::from("PACMAN_COLOR")), Some(&OsString::from("never")));
    }

    #[test]
    fn overlay_wins_and_removes() {
        let inv = Invocation::builder("x")
            .env("NO_COLOR", "0")
            .env_remove("PATH")
            .build();
        let env = compose_environment(os(&[("PATH", "/bin")]), &LaunchConfig::default(), inv.env());

        assert_eq!(env.get(&OsString::from("NO_COLOR")), Some(&OsString::from("0")));
        assert!(!env.contains_key(&OsString::from("PATH")));
    }

    #[test]
    fn colored_output_skips_color_defaults() {
        let config = LaunchConfig::default().plain_output(false);
        let env = compose_environment(Vec::new(), &config, &EnvOverlay::default());
        assert_eq!(env.len(), 1);
        assert!(env.contains_key(&OsString::from("TERM")));
    }

    #[test]
    fn empty_argv_is_rejected() {
        let empty: [&str; 0] = [];
        assert!(matches!(validate(&Invocation::from_argv(empty)), Err(SpawnError::EmptyCommand)));
        assert!(matches!(validate(&Invocation::from_argv([""])), Err(SpawnError::EmptyCommand)));
    }

    #[test]
    fn nul_bytes_are_rejected() {
        let inv = Invocation::from_argv(["echo", "a\0b"]);
        assert!(matches!(validate(&inv), Err(SpawnError::InvalidArgument { .. })));

        let inv = Invocation::builder("env").env("BAD=NAME", "x").build();
        assert!(matches!(validate(&inv), Err(SpawnError::InvalidArgument { .. })));
    }

    /// Reader whose first read fails.
    struct BrokenTerminal;

    impl AsyncRead for BrokenTerminal {
        fn poll_read(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Err(std::io::Error::other("terminal went away")))
        }
    }

    #[tokio::test]
    async fn read_failure_kills_the_session() {
        let launcher = Launcher::new(LaunchConfig::default());
        let mut session = launcher
            .launch_reading(Invocation::from_argv(["sleep", "30"]), |_| BrokenTerminal)
            .await
            .expect("launch");

        let result = tokio::time::timeout(std::time::Duration::from_secs(10), session.wait())
            .await
            .expect("group was killed");

        assert!(
            matches!(&result, Err(crate::error::SessionError::Relay(e)) if e.bytes_read == 0),
            "result: {result:?}"
        );
        assert_eq!(session.status(), SessionStatus::Killed);
        assert!(!session.is_running());
        assert!(session.input().send_line("late").is_err());
    }

    #[test]
    fn missing_working_directory_is_rejected() {
        let inv = Invocation::builder("ls")
            .working_directory("/nonexistent/wrappac")
            .build();
        assert!(matches!(validate(&inv), Err(SpawnError::WorkingDirectory { .. })));
    }
}
