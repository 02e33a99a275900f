//! In-process agent gateway for unit tests.

use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use specforge_agent::{AgentError, AgentEvent, AgentGateway, AgentSession, SessionConfig};

type Handler = dyn Fn(&str) -> Result<(), AgentError> + Send + Sync;

/// Runs `handler` on every prompt, then yields a single text event.
pub struct FnGateway {
    handler: Arc<Handler>,
    open_error: Option<String>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl FnGateway {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str) -> Result<(), AgentError> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            open_error: None,
            prompts: Arc::default(),
        }
    }

    /// A gateway whose sessions never open.
    pub fn failing(reason: &str) -> Self {
        let mut g = Self::new(|_| Ok(()));
        g.open_error = Some(reason.to_string());
        g
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl AgentGateway for FnGateway {
    fn open<'a>(
        &'a self,
        _config: &'a SessionConfig,
    ) -> BoxFuture<'a, specforge_agent::Result<Box<dyn AgentSession>>> {
        let result: specforge_agent::Result<Box<dyn AgentSession>> = match &self.open_error {
            Some(reason) => Err(AgentError::Process(reason.clone())),
            None => Ok(Box::new(FnSession {
                handler: Arc::clone(&self.handler),
                prompts: Arc::clone(&self.prompts),
                outcome: None,
            })),
        };
        futures::future::ready(result).boxed()
    }
}

struct FnSession {
    handler: Arc<Handler>,
    prompts: Arc<Mutex<Vec<String>>>,
    outcome: Option<Result<(), AgentError>>,
}

impl AgentSession for FnSession {
    fn send<'a>(&'a mut self, prompt: &'a str) -> BoxFuture<'a, specforge_agent::Result<()>> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.outcome = Some((self.handler)(prompt));
        futures::future::ready(Ok(())).boxed()
    }

    fn receive_events(&mut self) -> BoxStream<'static, specforge_agent::Result<AgentEvent>> {
        let item = match self.outcome.take() {
            Some(Err(e)) => Err(e),
            _ => Ok(AgentEvent::Text("done".to_string())),
        };
        futures::stream::iter(vec![item]).boxed()
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, specforge_agent::Result<()>> {
        futures::future::ready(Ok(())).boxed()
    }
}
