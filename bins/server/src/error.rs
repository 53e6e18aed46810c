#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("no {0} configured")]
    NoComponents(&'static str),

    #[error("{0}")]
    Tls(#[from] broker_kafka::TlsError),

    #[error("broker: {0}")]
    Broker(#[from] bridge_api::BrokerError),

    #[error("{0}")]
    Pipeline(#[from] pipeline::PipelineError),

    #[error("metrics endpoint: {0}")]
    Metrics(String),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
