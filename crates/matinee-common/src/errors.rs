#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("room not found: {0}")]
    NotFound(String),

    #[error("room {0} is full")]
    Full(String),

    #[error("could not allocate a unique room code after {0} attempts")]
    CreationExhausted(u32),

    #[error("not signed in")]
    NotAuthenticated,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store write failed at {path}: {reason}")]
    WriteFailed { path: String, reason: String },

    #[error("store read failed at {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("malformed record at {path}: {reason}")]
    Malformed { path: String, reason: String },
}

impl StoreError {
    pub fn write(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn read(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ReadFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("subtitles unavailable for {0}")]
    SubtitlesUnavailable(String),

    #[error("embedding count mismatch: {chunks} chunks, {vectors} vectors")]
    EmbeddingMismatch { chunks: usize, vectors: usize },

    #[error("embedding provider error: {0}")]
    Provider(String),

    #[error("language model error: {0}")]
    Model(String),
}

#[derive(Debug, thiserror::Error)]
pub enum MatineeError {
    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error("{0}")]
    Other(String),
}
