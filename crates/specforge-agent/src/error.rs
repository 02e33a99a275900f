use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse stream-json line: {source}\n  line: {line}")]
    Parse {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Process error: {0}")]
    Process(String),

    /// The agent finished its turn with an error result (max turns, budget,
    /// execution error).
    #[error("Agent turn failed ({subtype}): {detail}")]
    Turn { subtype: String, detail: String },

    #[error("Session error: {0}")]
    Session(String),
}
