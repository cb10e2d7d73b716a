use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid package list: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The download backend refused or failed a transfer.
    #[error("download of {package_id} failed: {message}")]
    Backend { package_id: String, message: String },

    #[error("unknown package: {0}")]
    UnknownPackage(String),

    #[error("failed to resolve {0} directory")]
    MissingDir(&'static str),
}

impl Error {
    pub fn backend(package_id: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Backend {
            package_id: package_id.into(),
            message: message.into(),
        }
    }
}
