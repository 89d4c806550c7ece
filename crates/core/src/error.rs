//! Error types for the session engine and its configuration.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("could not connect to driver at {address}: {source}")]
    Connection {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("undecodable protocol line {line:?}: {reason}")]
    ProtocolDecode { line: String, reason: String },

    #[error("replayed step offers {found} choices but the decision point has {expected}")]
    ProtocolViolation { expected: usize, found: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no active episode to report an outcome for")]
    NoActiveEpisode,

    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// The driver closed the stream. This is the normal end of a run, not a fault.
    #[error("driver finished the experiment")]
    EpisodeFinished,
}

impl SessionError {
    /// True for the clean end-of-run signal; false for every fault.
    pub fn is_episode_finished(&self) -> bool {
        matches!(self, SessionError::EpisodeFinished)
    }

    pub(crate) fn decode(line: &str, reason: impl ToString) -> Self {
        SessionError::ProtocolDecode {
            line: line.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),

    #[error("environment variable {name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
