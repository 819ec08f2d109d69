use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("query verification failed: {0}")]
    Verification(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("admin command {command} against {endpoint} failed: {message}")]
    Admin {
        endpoint: String,
        command: String,
        message: String,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for failures that indicate the system under test violated the
    /// correctness model being probed, as opposed to an infrastructure fault.
    pub fn is_verification(&self) -> bool {
        matches!(self, Error::Verification(_))
    }
}
