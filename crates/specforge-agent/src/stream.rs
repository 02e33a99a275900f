use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::process::ClaudeProcess;
use crate::types::{AgentEvent, Message, SpawnOptions};
use crate::{AgentError, Result};

// ─── EventStream ──────────────────────────────────────────────────────────

/// A finite, non-restartable stream of [`AgentEvent`]s for one agent turn.
///
/// A background task owns the [`ClaudeProcess`], translates assistant
/// messages into events and stops at the terminal `result` message. An
/// error result becomes a final `Err(AgentError::Turn)`. Dropping the stream
/// closes the channel; the task notices, stops reading and kills the
/// subprocess.
pub struct EventStream {
    rx: mpsc::Receiver<Result<AgentEvent>>,
}

impl EventStream {
    pub(crate) fn spawn(prompt: String, opts: SpawnOptions) -> Self {
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let mut process = match ClaudeProcess::spawn(&prompt, &opts).await {
                Ok(p) => p,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };
            pump(&mut process, &tx).await;
            process.kill().await;
        });

        EventStream { rx }
    }

    /// Wrap a raw receiver, for callers that script their own events.
    pub fn from_channel(rx: mpsc::Receiver<Result<AgentEvent>>) -> Self {
        Self { rx }
    }
}

impl Stream for EventStream {
    type Item = Result<AgentEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Forward one turn's worth of messages from `process` into `tx`.
async fn pump(process: &mut ClaudeProcess, tx: &mpsc::Sender<Result<AgentEvent>>) {
    let mut got_result = false;
    loop {
        let next = tokio::select! {
            _ = tx.closed() => return,
            next = process.next_message() => next,
        };
        match next {
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
            Ok(None) => break,
            Ok(Some(Message::System(sys))) => {
                tracing::debug!(session_id = %sys.session_id, model = ?sys.model, "agent session started");
            }
            Ok(Some(Message::Assistant(a))) => {
                for event in AgentEvent::from_assistant(&a) {
                    if tx.send(Ok(event)).await.is_err() {
                        return;
                    }
                }
            }
            Ok(Some(Message::Result(r))) => {
                got_result = true;
                if r.is_error() {
                    let detail = r.errors().join("; ");
                    let _ = tx
                        .send(Err(AgentError::Turn {
                            subtype: r.subtype().to_string(),
                            detail,
                        }))
                        .await;
                }
                break;
            }
        }
    }

    if !got_result {
        if let Some(exit_err) = process.wait_exit_error().await {
            let _ = tx.send(Err(exit_err)).await;
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tokio::process::Command;

    /// `cat` a temp file of JSON lines as the mock agent process.
    fn mock_stream(lines: &[&str]) -> EventStream {
        let mut f = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(f, "{}", line).unwrap();
        }
        let path = f.into_temp_path().keep().unwrap();

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut cmd = Command::new("cat");
            cmd.arg(&path);
            let mut process = ClaudeProcess::spawn_command(cmd).unwrap();
            pump(&mut process, &tx).await;
            process.kill().await;
            let _ = std::fs::remove_file(&path);
        });
        EventStream { rx }
    }

    const INIT_LINE: &str = r#"{"type":"system","subtype":"init","session_id":"s1","model":"m","cwd":"/tmp"}"#;
    const TEXT_LINE: &str = r#"{"type":"assistant","session_id":"s1","message":{"content":[{"type":"text","text":"working"},{"type":"tool_use","id":"t1","name":"Write","input":{}}]}}"#;
    const RESULT_LINE: &str = r#"{"type":"result","subtype":"success","session_id":"s1","result":"done","is_error":false,"num_turns":1}"#;
    const ERROR_LINE: &str = r#"{"type":"result","subtype":"error_max_turns","session_id":"s1","errors":["too many turns"]}"#;

    #[tokio::test]
    async fn stream_yields_text_and_tool_events() {
        let events: Vec<_> = mock_stream(&[INIT_LINE, TEXT_LINE, RESULT_LINE])
            .collect()
            .await;
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.is_ok()));
    }

    #[tokio::test]
    async fn stream_stops_at_result() {
        let events: Vec<_> = mock_stream(&[INIT_LINE, RESULT_LINE, TEXT_LINE])
            .collect()
            .await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn error_result_surfaces_as_turn_error() {
        let events: Vec<_> = mock_stream(&[INIT_LINE, TEXT_LINE, ERROR_LINE])
            .collect()
            .await;
        let last = events.last().unwrap();
        match last {
            Err(AgentError::Turn { subtype, detail }) => {
                assert_eq!(subtype, "error_max_turns");
                assert!(detail.contains("too many turns"));
            }
            other => panic!("expected turn error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn blank_and_unknown_lines_are_skipped() {
        let events: Vec<_> = mock_stream(&[
            INIT_LINE,
            "",
            r#"{"type":"rate_limit_event","session_id":"s1"}"#,
            TEXT_LINE,
            RESULT_LINE,
        ])
        .collect()
        .await;
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn garbage_line_is_a_parse_error() {
        let events: Vec<_> = mock_stream(&[INIT_LINE, "not json at all"]).collect().await;
        assert!(matches!(events.last(), Some(Err(AgentError::Parse { .. }))));
    }
}
