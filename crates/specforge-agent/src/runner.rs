use futures::StreamExt;

use crate::session::{AgentGateway, AgentSession, SessionConfig};
use crate::types::AgentEvent;
use crate::Result;

// ─── TurnSummary ──────────────────────────────────────────────────────────

/// What the agent did during one turn.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TurnSummary {
    /// Concatenated assistant text.
    pub text: String,
    /// Names of tools invoked, in order.
    pub tool_uses: Vec<String>,
}

// ─── Public API ───────────────────────────────────────────────────────────

/// Open a session, send `prompt`, drain the event stream and close.
///
/// `on_event` sees every event as it arrives (used for progress logging).
/// The session is closed on both the success and the error path.
pub async fn run_turn<F>(
    gateway: &dyn AgentGateway,
    config: &SessionConfig,
    prompt: &str,
    on_event: F,
) -> Result<TurnSummary>
where
    F: FnMut(&AgentEvent),
{
    let mut session = gateway.open(config).await?;
    let outcome = drive(session.as_mut(), prompt, on_event).await;
    let closed = session.close().await;
    let summary = outcome?;
    closed?;
    Ok(summary)
}

async fn drive<F>(session: &mut dyn AgentSession, prompt: &str, mut on_event: F) -> Result<TurnSummary>
where
    F: FnMut(&AgentEvent),
{
    session.send(prompt).await?;

    let mut summary = TurnSummary::default();
    let mut events = session.receive_events();
    while let Some(event) = events.next().await {
        let event = event?;
        on_event(&event);
        match event {
            AgentEvent::Text(text) => {
                if !summary.text.is_empty() {
                    summary.text.push('\n');
                }
                summary.text.push_str(&text);
            }
            AgentEvent::ToolUse { name, .. } => summary.tool_uses.push(name),
        }
    }
    Ok(summary)
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::EventStream;
    use crate::AgentError;
    use futures::future::BoxFuture;
    use futures::stream::BoxStream;
    use futures::FutureExt;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    struct FakeGateway {
        events: Mutex<Option<Vec<Result<AgentEvent>>>>,
        closed: Arc<Mutex<bool>>,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    struct FakeSession {
        events: Vec<Result<AgentEvent>>,
        closed: Arc<Mutex<bool>>,
        prompts: Arc<Mutex<Vec<String>>>,
    }

    impl AgentGateway for FakeGateway {
        fn open<'a>(
            &'a self,
            _config: &'a SessionConfig,
        ) -> BoxFuture<'a, Result<Box<dyn AgentSession>>> {
            let events = self.events.lock().unwrap().take().unwrap_or_default();
            let session: Box<dyn AgentSession> = Box::new(FakeSession {
                events,
                closed: Arc::clone(&self.closed),
                prompts: Arc::clone(&self.prompts),
            });
            async move { Ok(session) }.boxed()
        }
    }

    impl AgentSession for FakeSession {
        fn send<'a>(&'a mut self, prompt: &'a str) -> BoxFuture<'a, Result<()>> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            async { Ok(()) }.boxed()
        }

        fn receive_events(&mut self) -> BoxStream<'static, Result<AgentEvent>> {
            let (tx, rx) = mpsc::channel(32);
            let events = std::mem::take(&mut self.events);
            tokio::spawn(async move {
                for e in events {
                    if tx.send(e).await.is_err() {
                        break;
                    }
                }
            });
            EventStream::from_channel(rx).boxed()
        }

        fn close(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
            *self.closed.lock().unwrap() = true;
            async { Ok(()) }.boxed()
        }
    }

    fn gateway(events: Vec<Result<AgentEvent>>) -> FakeGateway {
        FakeGateway {
            events: Mutex::new(Some(events)),
            closed: Arc::new(Mutex::new(false)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn config() -> SessionConfig {
        SessionConfig {
            working_dir: "/tmp".into(),
            output_dir: "/tmp".into(),
            model: None,
        }
    }

    #[tokio::test]
    async fn run_turn_collects_text_and_tools() {
        let gw = gateway(vec![
            Ok(AgentEvent::Text("first".into())),
            Ok(AgentEvent::ToolUse {
                name: "Write".into(),
                input: serde_json::json!({}),
            }),
            Ok(AgentEvent::Text("second".into())),
        ]);
        let mut seen = 0;
        let summary = run_turn(&gw, &config(), "do it", |_| seen += 1)
            .await
            .unwrap();
        assert_eq!(seen, 3);
        assert_eq!(summary.text, "first\nsecond");
        assert_eq!(summary.tool_uses, vec!["Write".to_string()]);
        assert_eq!(gw.prompts.lock().unwrap().as_slice(), ["do it".to_string()]);
        assert!(*gw.closed.lock().unwrap());
    }

    #[tokio::test]
    async fn run_turn_closes_session_on_error() {
        let gw = gateway(vec![
            Ok(AgentEvent::Text("partial".into())),
            Err(AgentError::Process("crashed".into())),
        ]);
        let err = run_turn(&gw, &config(), "do it", |_| {}).await;
        assert!(err.is_err());
        assert!(*gw.closed.lock().unwrap());
    }
}
