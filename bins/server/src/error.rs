use queue_api::QueueError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("engine: {0}")]
    Engine(#[from] QueueError),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
