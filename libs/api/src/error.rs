/// Category of a broker error. Lets the pipelines decide between
/// fail-fast at startup and retry-on-next-iteration at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid client configuration: permanent, fail at startup.
    Config,
    /// Broker unreachable / transport failure.
    Connection,
    /// Publish was not acknowledged by the broker.
    Publish,
    /// Consumption or offset bookkeeping failure.
    Consume,
    /// Local I/O error.
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Config => f.write_str("config"),
            ErrorKind::Connection => f.write_str("connection"),
            ErrorKind::Publish => f.write_str("publish"),
            ErrorKind::Consume => f.write_str("consume"),
            ErrorKind::Io => f.write_str("io"),
        }
    }
}

/// Unified error type for all broker capability methods.
///
/// Carries an `ErrorKind` for categorization and a human-readable message.
#[derive(Clone)]
pub struct BrokerError {
    kind: ErrorKind,
    message: String,
}

impl BrokerError {
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    /// Configuration error: permanent, fail at startup.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, msg)
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, msg)
    }

    pub fn publish(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Publish, msg)
    }

    pub fn consume(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Consume, msg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Debug for BrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for BrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for BrokerError {}

impl From<std::io::Error> for BrokerError {
    fn from(e: std::io::Error) -> Self { Self::new(ErrorKind::Io, e.to_string()) }
}
