use std::path::PathBuf;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};

use crate::stream::EventStream;
use crate::types::{AgentEvent, PermissionMode, SpawnOptions};
use crate::{AgentError, Result};

// ─── Contract ─────────────────────────────────────────────────────────────

/// Where an agent session runs and which model it uses.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// The target project; the agent's working directory.
    pub working_dir: PathBuf,
    /// The task directory artifacts are written into.
    pub output_dir: PathBuf,
    pub model: Option<String>,
}

/// Opens scoped agent sessions. Object-safe so pipelines can hold a
/// `&dyn AgentGateway` and tests can substitute a scripted one.
pub trait AgentGateway: Send + Sync {
    fn open<'a>(
        &'a self,
        config: &'a SessionConfig,
    ) -> BoxFuture<'a, Result<Box<dyn AgentSession>>>;
}

/// One prompt/response exchange with the agent.
///
/// `send` is called once; `receive_events` hands out the turn's events and
/// can only be consumed once; `close` releases the session.
pub trait AgentSession: Send {
    fn send<'a>(&'a mut self, prompt: &'a str) -> BoxFuture<'a, Result<()>>;

    fn receive_events(&mut self) -> BoxStream<'static, Result<AgentEvent>>;

    fn close(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}

// ─── Claude CLI implementation ────────────────────────────────────────────

/// Gateway backed by the `claude` CLI in stream-json mode.
#[derive(Debug, Clone, Default)]
pub struct ClaudeGateway {
    base: SpawnOptions,
}

impl ClaudeGateway {
    pub fn new(base: SpawnOptions) -> Self {
        Self { base }
    }

    /// Per-session spawn options: the project is the working directory and
    /// the task directory is added so the agent can write artifacts there.
    fn spawn_options(&self, config: &SessionConfig) -> SpawnOptions {
        let mut opts = self.base.clone();
        opts.cwd = Some(config.working_dir.clone());
        if config.output_dir != config.working_dir {
            opts.additional_directories.push(config.output_dir.clone());
        }
        if config.model.is_some() {
            opts.model = config.model.clone();
        }
        if opts.permission_mode == PermissionMode::Default {
            opts.permission_mode = PermissionMode::BypassPermissions;
        }
        opts
    }
}

impl AgentGateway for ClaudeGateway {
    fn open<'a>(
        &'a self,
        config: &'a SessionConfig,
    ) -> BoxFuture<'a, Result<Box<dyn AgentSession>>> {
        async move {
            if !config.working_dir.is_dir() {
                return Err(AgentError::Session(format!(
                    "working directory does not exist: {}",
                    config.working_dir.display()
                )));
            }
            let session: Box<dyn AgentSession> = Box::new(ClaudeSession {
                opts: self.spawn_options(config),
                events: None,
                sent: false,
            });
            Ok(session)
        }
        .boxed()
    }
}

struct ClaudeSession {
    opts: SpawnOptions,
    events: Option<EventStream>,
    sent: bool,
}

impl AgentSession for ClaudeSession {
    fn send<'a>(&'a mut self, prompt: &'a str) -> BoxFuture<'a, Result<()>> {
        async move {
            if self.sent {
                return Err(AgentError::Session("prompt already sent".into()));
            }
            self.sent = true;
            self.events = Some(EventStream::spawn(prompt.to_string(), self.opts.clone()));
            Ok(())
        }
        .boxed()
    }

    fn receive_events(&mut self) -> BoxStream<'static, Result<AgentEvent>> {
        match self.events.take() {
            Some(events) => events.boxed(),
            None => stream::once(async {
                Err(AgentError::Session(
                    "no pending turn: prompt not sent or events already consumed".into(),
                ))
            })
            .boxed(),
        }
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        // Dropping an unconsumed stream stops the reader task, which kills
        // the subprocess.
        drop(self);
        async { Ok(()) }.boxed()
    }
}
