//! Shared helpers for session integration tests.

#![allow(dead_code)]

use std::time::Duration;

use wrappac_session::{
    Invocation, LaunchConfig, Launcher, OutputChunk, Session, SessionResult,
};

/// Upper bound for any single test session.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A launcher with a short drain timeout and grace period.
pub fn launcher() -> Launcher {
    Launcher::new(
        LaunchConfig::default()
            .drain_timeout(Duration::from_millis(500))
            .terminate_grace(Duration::from_millis(300)),
    )
}

/// Launch `argv` with default options.
pub async fn launch(argv: &[&str]) -> Session {
    launcher()
        .launch(Invocation::from_argv(argv.iter().copied()))
        .await
        .expect("launch")
}

/// Read every output chunk, then the result.
pub async fn finish(session: &mut Session) -> (Vec<OutputChunk>, SessionResult) {
    let mut output = session.take_output().expect("output stream");
    let collect = async {
        let mut chunks = Vec::new();
        while let Some(chunk) = output.recv().await {
            chunks.push(chunk);
        }
        chunks
    };
    let chunks = tokio::time::timeout(TEST_TIMEOUT, collect)
        .await
        .expect("output ended");
    let result = tokio::time::timeout(TEST_TIMEOUT, session.wait())
        .await
        .expect("result published")
        .expect("session succeeded");
    (chunks, result)
}

/// Concatenated text of `chunks`.
pub fn text(chunks: &[OutputChunk]) -> String {
    chunks.iter().map(OutputChunk::text).collect()
}

/// Run `argv` to completion and return its text and result.
pub async fn run(argv: &[&str]) -> (String, SessionResult) {
    let mut session = launch(argv).await;
    let (chunks, result) = finish(&mut session).await;
    (text(&chunks), result)
}
