//! `specforge-agent` — the agent gateway used by the specforge pipelines.
//!
//! Drives the `claude` CLI over its `--output-format stream-json` protocol
//! and exposes it behind a small session contract so pipeline code never
//! touches the subprocess directly.
//!
//! # Architecture
//!
//! ```text
//! AgentGateway::open(SessionConfig)
//!     │
//!     ▼
//! AgentSession::send(prompt)   ← spawns `claude --output-format stream-json …`
//!     │
//!     ▼
//! receive_events()             ← finite stream of AgentEvent (text / tool use)
//!     │
//!     ▼
//! close()                      ← drops the reader, kills the subprocess
//! ```
//!
//! ```rust,ignore
//! use specforge_agent::{run_turn, ClaudeGateway, SessionConfig};
//!
//! let gw = ClaudeGateway::default();
//! let cfg = SessionConfig { working_dir: ".".into(), output_dir: ".".into(), model: None };
//! let summary = run_turn(&gw, &cfg, "Write spec.md", |_| {}).await?;
//! ```

pub mod error;
pub mod runner;
pub mod session;
pub mod stream;
pub mod types;

pub(crate) mod process;

pub use error::AgentError;
pub use runner::{run_turn, TurnSummary};
pub use session::{AgentGateway, AgentSession, ClaudeGateway, SessionConfig};
pub use stream::EventStream;
pub use types::{AgentEvent, PermissionMode, SpawnOptions};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, AgentError>;
