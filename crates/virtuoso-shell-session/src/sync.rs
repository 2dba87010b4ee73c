//! Prompt synchronization over a chunked output stream.
//!
//! Two wait modes:
//!
//! - **Raw**: the first prompt occurrence ends the wait. Used for the start-up
//!   handshake and for short introspection commands whose output never
//!   contains prompt-like text.
//! - **Ready-probe**: a uniquely tagged probe command is sent after the real
//!   input, and the wait ends only once the tag shows up. Output that merely
//!   looks like a prompt cannot end the wait early.
//!
//! Reads are event-driven with a bounded per-read wait so a dying interpreter
//! is noticed promptly, while a busy one is polled at a backed-off cadence
//! instead of a hot loop.

use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use virtuoso_shell_core::prompt::{PromptScheme, ReadyProbe};
use virtuoso_shell_core::traits::{ChunkRead, ChunkSource, TransportError};

/// Wait cadence for the ready-probe scan loop.
#[derive(Debug, Clone, Copy)]
pub struct SyncTiming {
    /// First bounded wait between scans.
    pub initial: Duration,
    /// Ceiling the wait backs off to while no output arrives.
    pub cap: Duration,
}

impl Default for SyncTiming {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(50),
            cap: Duration::from_millis(500),
        }
    }
}

/// Accumulates interpreter output until the session is synchronized again.
///
/// Bytes that arrive in the same chunk as a matched prompt are kept as
/// residue for the next wait, so back-to-back exchanges never lose output.
#[derive(Debug, Default)]
pub struct PromptSync {
    residual: String,
    timing: SyncTiming,
}

impl PromptSync {
    #[must_use]
    pub fn new(timing: SyncTiming) -> Self {
        Self {
            residual: String::new(),
            timing,
        }
    }

    /// Wait until the first primary-prompt occurrence.
    ///
    /// Returns everything accumulated before the prompt; the prompt itself is
    /// consumed. With `deadline` set, the whole wait is bounded.
    ///
    /// # Errors
    ///
    /// [`TransportError::Disconnected`] when the stream closes first, carrying
    /// the partial output. [`TransportError::Timeout`] when the deadline
    /// passes; the partial output is retained for a later wait.
    pub async fn wait_raw<S: ChunkSource>(
        &mut self,
        source: &mut S,
        prompts: &PromptScheme,
        deadline: Option<Duration>,
    ) -> Result<String, TransportError> {
        let started = Instant::now();
        let mut buf = std::mem::take(&mut self.residual);
        loop {
            if let Some((start, end)) = prompts.find_prompt(&buf) {
                self.residual = buf[end..].to_owned();
                buf.truncate(start);
                return Ok(buf);
            }
            let wait = match deadline {
                Some(limit) => {
                    let left = limit.saturating_sub(started.elapsed());
                    if left.is_zero() {
                        self.residual = buf;
                        return Err(TransportError::Timeout(limit));
                    }
                    Some(left)
                }
                None => None,
            };
            match source.recv_chunk(wait).await {
                ChunkRead::Data(chunk) => buf.push_str(&chunk),
                ChunkRead::Timeout => {}
                ChunkRead::Closed => return Err(TransportError::Disconnected { partial: buf }),
            }
        }
    }

    /// Wait until `probe`'s tag has been printed and the prompt after it has
    /// arrived.
    ///
    /// Returns everything accumulated before the tag; the tag line, the
    /// probe's own return value and the trailing prompt are all consumed so
    /// they cannot leak into a later exchange.
    ///
    /// # Errors
    ///
    /// [`TransportError::Disconnected`] when the stream closes first, carrying
    /// the partial output.
    pub async fn wait_ready<S: ChunkSource>(
        &mut self,
        source: &mut S,
        prompts: &PromptScheme,
        probe: &ReadyProbe,
    ) -> Result<String, TransportError> {
        let mut buf = std::mem::take(&mut self.residual);
        let mut wait = self.timing.initial;
        loop {
            if let Some(tag_at) = probe.find(&buf) {
                if let Some((_, after)) = prompts.find_prompt(&buf[tag_at..]) {
                    self.residual = buf[tag_at + after..].to_owned();
                    buf.truncate(tag_at);
                    return Ok(buf);
                }
            } else if prompts.find_prompt(&buf).is_some() {
                trace!("prompt-like output before the probe tag, still waiting");
            }
            match source.recv_chunk(Some(wait)).await {
                ChunkRead::Data(chunk) => {
                    buf.push_str(&chunk);
                    wait = self.timing.initial;
                }
                ChunkRead::Timeout => {
                    wait = (wait * 2).min(self.timing.cap);
                }
                ChunkRead::Closed => return Err(TransportError::Disconnected { partial: buf }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;

    use super::*;

    /// Replays a fixed script of chunk reads.
    struct ScriptedSource {
        script: VecDeque<ChunkRead>,
    }

    impl ScriptedSource {
        fn new(script: impl IntoIterator<Item = ChunkRead>) -> Self {
            Self {
                script: script.into_iter().collect(),
            }
        }

        fn data(chunks: &[&str]) -> Self {
            Self::new(chunks.iter().map(|c| ChunkRead::Data((*c).to_owned())))
        }
    }

    #[async_trait]
    impl ChunkSource for ScriptedSource {
        async fn recv_chunk(&mut self, wait: Option<Duration>) -> ChunkRead {
            let next = self.script.pop_front().unwrap_or(ChunkRead::Closed);
            if matches!(next, ChunkRead::Timeout) {
                tokio::time::sleep(wait.unwrap_or_default()).await;
            }
            next
        }
    }

    #[tokio::test]
    async fn raw_wait_returns_output_before_prompt() {
        let mut source = ScriptedSource::data(&["line one\nline ", "two\nvsh> "]);
        let mut sync = PromptSync::default();
        let out = sync
            .wait_raw(&mut source, &PromptScheme::default(), None)
            .await
            .unwrap();
        assert_eq!(out, "line one\nline two\n");
    }

    #[tokio::test]
    async fn raw_wait_keeps_overread_for_the_next_wait() {
        let mut source = ScriptedSource::data(&["first\nvsh> second\nvsh> "]);
        let mut sync = PromptSync::default();
        let scheme = PromptScheme::default();
        assert_eq!(sync.wait_raw(&mut source, &scheme, None).await.unwrap(), "first\n");
        assert_eq!(sync.wait_raw(&mut source, &scheme, None).await.unwrap(), "second\n");
    }

    #[tokio::test]
    async fn raw_wait_reports_disconnect_with_partial_output() {
        let mut source = ScriptedSource::new([
            ChunkRead::Data("half a li".to_owned()),
            ChunkRead::Closed,
        ]);
        let mut sync = PromptSync::default();
        let err = sync
            .wait_raw(&mut source, &PromptScheme::default(), None)
            .await
            .unwrap_err();
        match err {
            TransportError::Disconnected { partial } => assert_eq!(partial, "half a li"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn raw_wait_times_out_and_retains_the_buffer() {
        let mut source = ScriptedSource::new([
            ChunkRead::Data("slow".to_owned()),
            ChunkRead::Timeout,
        ]);
        let mut sync = PromptSync::default();
        let scheme = PromptScheme::default();
        let err = sync
            .wait_raw(&mut source, &scheme, Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
        // the retained buffer completes once the prompt finally arrives
        let mut rest = ScriptedSource::data(&[" output\nvsh> "]);
        assert_eq!(
            sync.wait_raw(&mut rest, &scheme, None).await.unwrap(),
            "slow output\n"
        );
    }

    #[tokio::test]
    async fn ready_wait_ignores_prompt_lookalikes_until_the_tag() {
        let probe = ReadyProbe::new();
        let scheme = PromptScheme::default();
        let tail = format!("vsh> {}\nt\nvsh> ", probe.tag());
        let mut source = ScriptedSource::data(&["printed: vsh> not done\n", "more\n", &tail]);
        let mut sync = PromptSync::default();
        let out = sync.wait_ready(&mut source, &scheme, &probe).await.unwrap();
        assert_eq!(out, "printed: vsh> not done\nmore\nvsh> ");
    }

    #[tokio::test]
    async fn ready_wait_consumes_the_probe_trailer() {
        let probe = ReadyProbe::new();
        let scheme = PromptScheme::default();
        let first = format!("a\nvsh> {}\nt\nvsh> ", probe.tag());
        let mut source = ScriptedSource::data(&[&first, "b\nvsh> "]);
        let mut sync = PromptSync::default();
        let out = sync.wait_ready(&mut source, &scheme, &probe).await.unwrap();
        assert_eq!(out, "a\nvsh> ");
        // nothing of the probe trailer pollutes the next raw wait
        assert_eq!(sync.wait_raw(&mut source, &scheme, None).await.unwrap(), "b\n");
    }

    #[tokio::test(start_paused = true)]
    async fn ready_wait_holds_until_the_trailing_prompt_arrives() {
        let probe = ReadyProbe::new();
        let scheme = PromptScheme::default();
        let tag_chunk = format!("out\nvsh> {}\n", probe.tag());
        let mut source = ScriptedSource::new([
            ChunkRead::Data(tag_chunk),
            ChunkRead::Timeout,
            ChunkRead::Data("t\nvsh> ".to_owned()),
        ]);
        let mut sync = PromptSync::default();
        let out = sync.wait_ready(&mut source, &scheme, &probe).await.unwrap();
        assert_eq!(out, "out\nvsh> ");
    }

    #[tokio::test]
    async fn ready_wait_reports_disconnect_with_partial_output() {
        let probe = ReadyProbe::new();
        let mut source = ScriptedSource::new([
            ChunkRead::Data("partial work\n".to_owned()),
            ChunkRead::Closed,
        ]);
        let mut sync = PromptSync::default();
        let err = sync
            .wait_ready(&mut source, &PromptScheme::default(), &probe)
            .await
            .unwrap_err();
        match err {
            TransportError::Disconnected { partial } => assert_eq!(partial, "partial work\n"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
