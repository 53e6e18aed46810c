use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("config: {0}")]
    Config(String),

    #[error("io ({}): {source}", path.display())]
    Io { path: PathBuf, source: std::io::Error },

    #[error("size mismatch ({}): expected {expected} bytes, found {actual}", path.display())]
    SizeMismatch { path: PathBuf, expected: u64, actual: u64 },

    #[error("broker: {0}")]
    Broker(#[from] bridge_api::BrokerError),
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| PipelineError::Io { path, source }
    }
}
