use thiserror::Error;
use turnstile_model::ModelError;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("runtime has shut down")]
    ShutDown,

    #[error("failed to spawn machine thread: {0}")]
    Spawn(#[from] std::io::Error),
}
