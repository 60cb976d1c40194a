//! Integration tests for the blocking facade.

#![cfg(unix)]

use std::time::Duration;

use wrappac_session::{
    BlockingLauncher, Invocation, LaunchConfig, SessionStatus, TerminationCause, TryRecvError,
};

fn launcher() -> BlockingLauncher {
    BlockingLauncher::new(LaunchConfig::default().terminate_grace(Duration::from_millis(200)))
        .expect("runtime")
}

/// Test launching, waiting and draining from a plain thread.
#[test]
fn wait_then_drain() {
    let launcher = launcher();
    let mut session = launcher
        .launch(Invocation::from_argv(["echo", "from a thread"]))
        .expect("launch");

    let result = session.wait().expect("result");
    assert!(result.success());

    let output: String = session.drain_output().iter().map(|c| c.text()).collect();
    assert_eq!(output, "from a thread\n");
    assert!(matches!(session.try_recv(), Err(TryRecvError::Disconnected)));
}

/// Test polling the result without blocking.
#[test]
fn poll_until_finished() {
    let launcher = launcher();
    let mut session = launcher
        .launch(Invocation::from_argv(["sh", "-c", "sleep 0.2; echo late"]))
        .expect("launch");

    assert!(session.try_result().is_none());
    let result = loop {
        if let Some(result) = session.try_result() {
            break result.expect("result");
        }
        std::thread::sleep(Duration::from_millis(20));
    };
    assert!(result.success());
    assert_eq!(session.status(), SessionStatus::Exited);
}

/// Test that terminate works from outside the runtime.
#[test]
fn terminate_from_a_plain_thread() {
    let launcher = launcher();
    let mut session = launcher
        .launch(Invocation::from_argv(["sleep", "30"]))
        .expect("launch");

    assert!(session.wait_timeout(Duration::from_millis(100)).is_none());
    assert!(session.terminate());

    let result = session
        .wait_timeout(Duration::from_secs(10))
        .expect("finished")
        .expect("result");
    assert_eq!(result.cause, TerminationCause::Killed);
}

/// Test that input can be sent without a runtime.
#[test]
fn input_from_a_plain_thread() {
    let launcher = launcher();
    let mut session = launcher
        .launch(Invocation::from_argv(["sh", "-c", "read x; echo x=$x"]))
        .expect("launch");

    session.input().send_line("42").expect("send");
    let result = session.wait().expect("result");
    assert!(result.success());

    let output: String = session.drain_output().iter().map(|c| c.text()).collect();
    assert!(output.contains("x=42"));
}

/// Test that a bounded wait works on a thread that never entered a runtime.
#[test]
fn wait_timeout_on_a_spawned_thread() {
    let handle = std::thread::spawn(|| {
        let launcher = launcher();
        let mut session = launcher
            .launch(Invocation::from_argv(["sh", "-c", "sleep 0.3; echo done"]))
            .expect("launch");

        let early = session.wait_timeout(Duration::from_millis(20));
        let late = session.wait_timeout(Duration::from_secs(10));
        (early.is_none(), late.map(|r| r.map(|r| r.success())))
    });

    let (timed_out, finished) = handle.join().expect("thread");
    assert!(timed_out);
    assert!(matches!(finished, Some(Ok(true))));
}
