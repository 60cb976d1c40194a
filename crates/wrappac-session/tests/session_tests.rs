//! Integration tests for launching sessions and collecting their results.

#![cfg(unix)]

mod common;

use std::time::Duration;

use common::{finish, launch, launcher, run, text};
use wrappac_session::{
    ControlChar, Invocation, SessionError, SessionStatus, SpawnError, TerminationCause,
};

/// Test that a simple command delivers its output and a clean result.
#[tokio::test]
async fn echo_hello() {
    let mut session = launch(&["echo", "hello"]).await;
    assert!(session.pid() > 0);

    let (chunks, result) = finish(&mut session).await;

    assert_eq!(text(&chunks), "hello\n");
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.cause, TerminationCause::Exited);
    assert!(result.success());
    assert_eq!(result.output_bytes, 6);
    assert_eq!(result.stderr, None);
    assert_eq!(session.status(), SessionStatus::Exited);
}

/// Test that chunk sequence numbers start at zero and have no gaps.
#[tokio::test]
async fn sequence_numbers_are_contiguous() {
    let mut session = launch(&["sh", "-c", "for i in 1 2 3 4 5; do echo $i; sleep 0.02; done"]).await;
    let (chunks, _) = finish(&mut session).await;

    assert!(!chunks.is_empty());
    for (expected, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.seq, expected as u64);
        assert!(!chunk.data.is_empty());
    }
    assert_eq!(text(&chunks), "1\n2\n3\n4\n5\n");
}

/// Test that a missing program fails to launch.
#[tokio::test]
async fn nonexistent_command_is_not_found() {
    let err = launcher()
        .launch(Invocation::from_argv(["/nonexistent/wrappac-test-program"]))
        .await
        .expect_err("launch should fail");

    assert!(matches!(err, SpawnError::NotFound { .. }), "got {err:?}");
}

/// Test that an empty argv is rejected before any process is created.
#[tokio::test]
async fn empty_command_is_rejected() {
    let empty: [&str; 0] = [];
    let err = launcher()
        .launch(Invocation::from_argv(empty))
        .await
        .expect_err("launch should fail");
    assert!(matches!(err, SpawnError::EmptyCommand));
}

/// Test that non-zero exit codes are reported as-is.
#[tokio::test]
async fn exit_code_is_reported() {
    let (_, result) = run(&["sh", "-c", "exit 3"]).await;
    assert_eq!(result.exit_code, 3);
    assert_eq!(result.cause, TerminationCause::Exited);
    assert!(!result.success());
}

/// Test that a fast-exiting child loses no output.
#[tokio::test]
async fn fast_exit_output_is_complete() {
    let script = "i=0; while [ $i -lt 2000 ]; do echo line$i; i=$((i+1)); done";
    let (output, result) = run(&["sh", "-c", script]).await;

    assert!(result.success());
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 2000);
    assert_eq!(lines[0], "line0");
    assert_eq!(lines[1999], "line1999");
    assert_eq!(result.output_bytes, output.len() as u64);
}

/// Test that killing a session reports it as killed.
#[tokio::test]
async fn kill_reports_killed() {
    let mut session = launch(&["sleep", "30"]).await;
    assert!(session.is_running());

    assert!(session.kill());
    assert_eq!(session.status(), SessionStatus::Killed);

    let (_, result) = finish(&mut session).await;
    assert_eq!(result.cause, TerminationCause::Killed);
    assert_eq!(result.exit_code, -9);
    assert_eq!(session.status(), SessionStatus::Killed);
}

/// Test that interrupting delivers SIGINT to the command.
#[tokio::test]
async fn interrupt_signals_the_group() {
    let mut session = launch(&["sleep", "30"]).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    session.interrupt().expect("interrupt");

    let (_, result) = finish(&mut session).await;
    assert_eq!(result.cause, TerminationCause::Signaled(2));
    assert_eq!(result.exit_code, -2);
    assert_eq!(session.status(), SessionStatus::Exited);
}

/// Test that terminate escalates to SIGKILL when SIGTERM is ignored.
#[tokio::test]
async fn terminate_escalates_after_grace() {
    let mut session = launch(&["sh", "-c", "trap '' TERM; echo ready; sleep 30"]).await;
    let mut output = session.take_output().expect("output");
    let first = tokio::time::timeout(common::TEST_TIMEOUT, output.recv())
        .await
        .expect("ready in time")
        .expect("ready line");
    assert!(first.text().contains("ready"));

    assert!(session.terminate());
    assert_eq!(session.status(), SessionStatus::Killed);

    let result = tokio::time::timeout(common::TEST_TIMEOUT, session.wait())
        .await
        .expect("killed after grace")
        .expect("result");
    assert_eq!(result.cause, TerminationCause::Killed);
}

/// Test that input reaches the command and Ctrl+D ends it.
#[tokio::test]
async fn input_is_forwarded() {
    let mut session = launch(&["cat"]).await;
    let input = session.input();

    input.send_line("ping").expect("send line");
    input.send_control(ControlChar::CtrlD).expect("send eof");

    let (chunks, result) = finish(&mut session).await;
    assert!(result.success());
    assert!(text(&chunks).contains("ping"));
}

/// Test that writes after the session ended are refused.
#[tokio::test]
async fn input_after_exit_is_closed() {
    let mut session = launch(&["true"]).await;
    let input = session.input();
    finish(&mut session).await;

    assert!(matches!(input.send_str("late"), Err(SessionError::Closed)));
}

/// Test that separated stderr is returned in the result.
#[tokio::test]
async fn separate_stderr_is_collected() {
    let invocation = Invocation::builder("sh")
        .args(["-c", "echo out; echo err >&2"])
        .separate_stderr(true)
        .build();
    let mut session = launcher().launch(invocation).await.expect("launch");

    let (chunks, result) = finish(&mut session).await;
    assert_eq!(text(&chunks), "out\n");
    assert_eq!(result.stderr.as_deref(), Some("err\n"));
}

/// Test that the working directory is applied.
#[tokio::test]
async fn working_directory_is_used() {
    let dir = std::env::temp_dir().canonicalize().expect("temp dir");
    let invocation = Invocation::builder("pwd").working_directory(&dir).build();
    let mut session = launcher().launch(invocation).await.expect("launch");

    let (chunks, _) = finish(&mut session).await;
    assert_eq!(text(&chunks).trim_end(), dir.to_string_lossy());
}

/// Test that a missing working directory is rejected at launch.
#[tokio::test]
async fn missing_working_directory_is_rejected() {
    let invocation = Invocation::builder("pwd")
        .working_directory("/nonexistent/wrappac")
        .build();
    let err = launcher().launch(invocation).await.expect_err("launch should fail");
    assert!(matches!(err, SpawnError::WorkingDirectory { .. }));
}

/// Test that terminal defaults fill an empty environment.
#[tokio::test]
async fn terminal_defaults_are_applied() {
    let invocation = Invocation::builder("/bin/sh")
        .args(["-c", "echo \"$TERM $NO_COLOR $CLICOLOR $PACMAN_COLOR\""])
        .env_clear()
        .build();
    let mut session = launcher().launch(invocation).await.expect("launch");

    let (chunks, _) = finish(&mut session).await;
    assert_eq!(text(&chunks), "xterm-256color 1 0 never\n");
}

/// Test that the invocation's environment wins over the defaults.
#[tokio::test]
async fn overlay_overrides_defaults() {
    let invocation = Invocation::builder("/bin/sh")
        .args(["-c", "echo \"$TERM $NO_COLOR\""])
        .env_clear()
        .env("TERM", "vt100")
        .env("NO_COLOR", "")
        .build();
    let mut session = launcher().launch(invocation).await.expect("launch");

    let (chunks, _) = finish(&mut session).await;
    assert_eq!(text(&chunks), "vt100 \n");
}

/// Test that the initial size and resizes reach the terminal.
#[tokio::test]
async fn resize_is_visible_to_the_child() {
    let invocation = Invocation::builder("sh")
        .args(["-c", "stty size; sleep 0.5; stty size"])
        .window_size(100, 30)
        .build();
    let mut session = launcher().launch(invocation).await.expect("launch");
    let mut output = session.take_output().expect("output");

    let mut seen = String::new();
    while !seen.contains('\n') {
        let chunk = tokio::time::timeout(common::TEST_TIMEOUT, output.recv())
            .await
            .expect("first size")
            .expect("output open");
        seen.push_str(&chunk.text());
    }
    session.resize(120, 40).expect("resize");

    while let Some(chunk) = output.recv().await {
        seen.push_str(&chunk.text());
    }
    assert_eq!(seen, "30 100\n40 120\n");
}

/// Test that newline translation can be turned on.
#[tokio::test]
async fn newline_translation_is_optional() {
    let invocation = Invocation::builder("echo")
        .arg("hi")
        .translate_newlines(true)
        .build();
    let mut session = launcher().launch(invocation).await.expect("launch");

    let (chunks, _) = finish(&mut session).await;
    assert_eq!(text(&chunks), "hi\r\n");
}

/// Test that single-use handles are only handed out once.
#[tokio::test]
async fn handles_are_taken_once() {
    let mut session = launch(&["true"]).await;

    assert!(session.take_output().is_some());
    assert!(session.take_output().is_none());
    assert!(session.take_prompts().is_some());
    assert!(session.take_prompts().is_none());

    let first = session.result();
    assert!(first.await.is_ok());
    assert!(matches!(session.result().await, Err(SessionError::Closed)));
}

/// Test that the output stream works as a `futures::Stream`.
#[tokio::test]
async fn output_is_a_stream() {
    use futures::StreamExt;

    let mut session = launch(&["printf", "a\\nb\\n"]).await;
    let output = session.take_output().expect("output");
    let chunks: Vec<_> = output.collect().await;

    assert_eq!(text(&chunks), "a\nb\n");
    assert!(session.wait().await.expect("result").success());
}
