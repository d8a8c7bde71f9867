use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    User,
    Runtime,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Runtime => "runtime",
        }
    }

    /// Process exit code: 2 for operator mistakes, 1 for runtime failures.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::User => 2,
            Self::Runtime => 1,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("transport error: {message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },
    #[error("invalid provider response: {0}")]
    Parse(String),
    #[error("location not found: {0}")]
    NotFound(String),
}

impl PipelineError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            status: Some(status),
            message: format!("http {status}: {}", message.into()),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Errors the orchestrator may absorb through stale cache or demo data.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Parse(_))
    }

    pub fn retryable(&self) -> bool {
        match self {
            Self::Transport { status: None, .. } => true,
            Self::Transport {
                status: Some(status),
                ..
            } => *status == 429 || (500..=599).contains(status),
            Self::Configuration(_) | Self::Parse(_) | Self::NotFound(_) => false,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) | Self::NotFound(_) => ErrorKind::User,
            Self::Transport { .. } | Self::Parse(_) => ErrorKind::Runtime,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }

    pub fn with_provider(self, provider: &'static str) -> Self {
        match self {
            Self::Transport { status, message } => Self::Transport {
                status,
                message: format!("{provider}: {message}"),
            },
            Self::Parse(message) => Self::Parse(format!("{provider}: {message}")),
            Self::NotFound(message) => Self::NotFound(format!("{provider}: {message}")),
            Self::Configuration(message) => Self::Configuration(message),
        }
    }
}
