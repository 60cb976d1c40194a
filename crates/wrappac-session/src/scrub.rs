//! Streaming removal of byte patterns from session output.
//!
//! Output arrives in arbitrary read-sized pieces, so a pattern can be split
//! across two reads, and removing one match can join the bytes around it
//! into another. [`Holdback`] processes the stream one byte at a time on a
//! stack, removing a pattern as soon as it becomes the stack's suffix, and
//! only releases bytes that no later input can turn into a match. The
//! result does not depend on how the stream was chunked.
//!
//! Two users sit on top of it: [`PromptDetector`] strips the password prompt
//! marker and reports each occurrence, and [`SecretScrubber`] removes every
//! secret the input forwarder has written.

use std::sync::{Arc, Mutex};

use zeroize::Zeroizing;

use crate::escalation::EscalationTool;
use crate::types::PasswordPrompt;

/// Result of feeding bytes through a [`Holdback`].
#[derive(Debug, Default)]
pub(crate) struct Filtered {
    /// Bytes safe to deliver.
    pub output: Vec<u8>,
    /// Index into the pattern list of every match, in the order removed.
    pub matches: Vec<usize>,
}

/// A match that is itself the start of a longer pattern.
#[derive(Debug, Clone, Copy)]
struct Deferred {
    start: usize,
    len: usize,
    index: usize,
}

/// Pattern remover with a held-back tail.
#[derive(Default)]
pub(crate) struct Holdback {
    stack: Zeroizing<Vec<u8>>,
    deferred: Option<Deferred>,
}

impl std::fmt::Debug for Holdback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Holdback")
            .field("held", &self.stack.len())
            .field("deferred", &self.deferred.is_some())
            .finish()
    }
}

impl Holdback {
    /// Feed `data`, removing complete matches of `patterns`.
    ///
    /// When one match is the beginning of a longer pattern the longer one
    /// wins if the stream completes it.
    pub(crate) fn feed<P: AsRef<[u8]>>(&mut self, data: &[u8], patterns: &[P]) -> Filtered {
        let mut out = Filtered::default();
        self.push_all(data, patterns, &mut out.matches);
        out.output = self.release(patterns);
        out
    }

    /// Release everything still held back.
    pub(crate) fn finish<P: AsRef<[u8]>>(&mut self, patterns: &[P]) -> Filtered {
        let mut out = Filtered::default();
        while let Some(deferred) = self.deferred.take() {
            let replay = self.remove(deferred, &mut out.matches);
            self.push_all(&replay, patterns, &mut out.matches);
        }
        out.output = std::mem::take(&mut *self.stack);
        out
    }

    /// Number of bytes currently held back.
    pub(crate) fn held(&self) -> usize {
        self.stack.len()
    }

    fn push_all<P: AsRef<[u8]>>(&mut self, data: &[u8], patterns: &[P], matches: &mut Vec<usize>) {
        // Reversed so the next byte is popped from the end; replays are
        // pushed back on the same way.
        let mut input: Zeroizing<Vec<u8>> = Zeroizing::new(data.iter().rev().copied().collect());
        while let Some(byte) = input.pop() {
            self.stack.push(byte);
            match self.deferred {
                Some(deferred) => self.extend_deferred(deferred, patterns, matches, &mut input),
                None => self.match_suffix(patterns, matches),
            }
        }
    }

    fn match_suffix<P: AsRef<[u8]>>(&mut self, patterns: &[P], matches: &mut Vec<usize>) {
        let Some((index, len)) = longest_suffix(&self.stack, patterns) else {
            return;
        };
        let start = self.stack.len() - len;
        if could_extend(&self.stack[start..], patterns) {
            self.deferred = Some(Deferred { start, len, index });
        } else {
            self.stack.truncate(start);
            matches.push(index);
        }
    }

    fn extend_deferred<P: AsRef<[u8]>>(
        &mut self,
        deferred: Deferred,
        patterns: &[P],
        matches: &mut Vec<usize>,
        input: &mut Vec<u8>,
    ) {
        let region = &self.stack[deferred.start..];
        if let Some(index) = exact_match(region, patterns) {
            let len = region.len();
            if could_extend(region, patterns) {
                self.deferred = Some(Deferred { len, index, ..deferred });
            } else {
                self.stack.truncate(deferred.start);
                self.deferred = None;
                matches.push(index);
            }
        } else if !could_extend(region, patterns) {
            // The longer pattern did not happen: take the shorter match and
            // replay whatever followed it.
            self.deferred = None;
            let replay = self.remove(deferred, matches);
            input.extend(replay.iter().rev());
        }
    }

    /// Remove a deferred match, returning the bytes pushed after it.
    fn remove(&mut self, deferred: Deferred, matches: &mut Vec<usize>) -> Zeroizing<Vec<u8>> {
        let replay = Zeroizing::new(self.stack.split_off(deferred.start + deferred.len));
        self.stack.truncate(deferred.start);
        matches.push(deferred.index);
        replay
    }

    /// Hand out the bytes no future input can pull into a match.
    fn release<P: AsRef<[u8]>>(&mut self, patterns: &[P]) -> Vec<u8> {
        let len = self.stack.len();
        let mut keep = (1..len.min(max_len(patterns)) + 1)
            .rev()
            .find(|&k| could_extend(&self.stack[len - k..], patterns))
            .unwrap_or(0);
        if let Some(deferred) = self.deferred {
            keep = keep.max(len - deferred.start);
        }

        let released = len - keep;
        if let Some(deferred) = self.deferred.as_mut() {
            deferred.start -= released;
        }
        self.stack.drain(..released).collect()
    }
}

/// Whether `rest` is a proper prefix of some pattern, so more input could
/// still complete it.
fn could_extend<P: AsRef<[u8]>>(rest: &[u8], patterns: &[P]) -> bool {
    patterns.iter().any(|p| {
        let p = p.as_ref();
        rest.len() < p.len() && p.starts_with(rest)
    })
}

fn exact_match<P: AsRef<[u8]>>(region: &[u8], patterns: &[P]) -> Option<usize> {
    patterns.iter().position(|p| !region.is_empty() && p.as_ref() == region)
}

fn longest_suffix<P: AsRef<[u8]>>(stack: &[u8], patterns: &[P]) -> Option<(usize, usize)> {
    patterns
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.as_ref().is_empty() && stack.ends_with(p.as_ref()))
        .map(|(index, p)| (index, p.as_ref().len()))
        .max_by_key(|&(_, len)| len)
}

fn max_len<P: AsRef<[u8]>>(patterns: &[P]) -> usize {
    patterns.iter().map(|p| p.as_ref().len()).max().unwrap_or(0)
}

/// Detects and strips the privilege tool's password prompt marker.
#[derive(Debug)]
pub(crate) struct PromptDetector {
    marker: [Vec<u8>; 1],
    tool: EscalationTool,
    holdback: Holdback,
    awaiting: Arc<std::sync::atomic::AtomicBool>,
}

impl PromptDetector {
    pub(crate) fn new(
        marker: &str,
        tool: EscalationTool,
        awaiting: Arc<std::sync::atomic::AtomicBool>,
    ) -> Self {
        Self {
            marker: [marker.as_bytes().to_vec()],
            tool,
            holdback: Holdback::default(),
            awaiting,
        }
    }

    /// Strip markers from `data`. Returns a prompt when one is newly
    /// outstanding; repeated markers while a request is pending are only
    /// stripped.
    pub(crate) fn feed(&mut self, data: &[u8]) -> (Vec<u8>, Option<PasswordPrompt>) {
        let filtered = self.holdback.feed(data, &self.marker);
        (filtered.output, self.raise(filtered.matches.len()))
    }

    pub(crate) fn finish(&mut self) -> (Vec<u8>, Option<PasswordPrompt>) {
        let filtered = self.holdback.finish(&self.marker);
        (filtered.output, self.raise(filtered.matches.len()))
    }

    fn raise(&self, seen: usize) -> Option<PasswordPrompt> {
        use std::sync::atomic::Ordering;

        if seen == 0 || self.awaiting.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(PasswordPrompt { tool: self.tool })
    }
}

/// Secrets registered by the input forwarder.
#[derive(Debug, Clone, Default)]
pub(crate) struct SecretSet {
    inner: Arc<Mutex<Vec<Zeroizing<Vec<u8>>>>>,
}

impl SecretSet {
    /// Register `secret`; trailing line terminators are ignored.
    pub(crate) fn register(&self, secret: &[u8]) {
        let trimmed = trim_line_end(secret);
        if trimmed.is_empty() {
            return;
        }
        if let Ok(mut secrets) = self.inner.lock() {
            if !secrets.iter().any(|s| s.as_slice() == trimmed) {
                secrets.push(Zeroizing::new(trimmed.to_vec()));
            }
        }
    }

    /// Whether no secret has been registered.
    pub(crate) fn is_empty(&self) -> bool {
        self.inner.lock().map(|s| s.is_empty()).unwrap_or(true)
    }

    fn snapshot(&self) -> Vec<Zeroizing<Vec<u8>>> {
        self.inner.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

fn trim_line_end(mut bytes: &[u8]) -> &[u8] {
    while let [rest @ .., b'\r' | b'\n'] = bytes {
        bytes = rest;
    }
    bytes
}

/// Removes registered secrets from the output stream.
#[derive(Debug)]
pub(crate) struct SecretScrubber {
    secrets: SecretSet,
    holdback: Holdback,
}

impl SecretScrubber {
    pub(crate) fn new(secrets: SecretSet) -> Self {
        Self {
            secrets,
            holdback: Holdback::default(),
        }
    }

    pub(crate) fn feed(&mut self, data: &[u8]) -> Vec<u8> {
        if self.secrets.is_empty() && self.holdback.held() == 0 {
            return data.to_vec();
        }
        let secrets = self.secrets.snapshot();
        self.holdback.feed(data, &secrets).output
    }

    pub(crate) fn finish(&mut self) -> Vec<u8> {
        let secrets = self.secrets.snapshot();
        self.holdback.finish(&secrets).output
    }
}
