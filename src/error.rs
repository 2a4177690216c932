use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfabError {
    #[error("Failed to read/write DB file: {0}")]
    DbIOError(std::io::Error),
    #[error("Failed to serialize/deserialize DB operation: {0}")]
    DbSerializationError(serde_json::Error),
}
