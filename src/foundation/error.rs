use std::path::PathBuf;

pub type SegueResult<T> = Result<T, SegueError>;

#[derive(thiserror::Error, Debug)]
pub enum SegueError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("ingest error for '{}': {reason}", .path.display())]
    Ingest { path: PathBuf, reason: String },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("media error: {0}")]
    Media(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("export error: {0}")]
    Export(String),

    #[error("ownership error: {0}")]
    Ownership(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SegueError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn ingest(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Ingest {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn media(msg: impl Into<String>) -> Self {
        Self::Media(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export(msg.into())
    }

    pub fn ownership(msg: impl Into<String>) -> Self {
        Self::Ownership(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

impl From<serde_json::Error> for SegueError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            SegueError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(SegueError::timeout("x").to_string().contains("timed out:"));
        assert!(SegueError::media("x").to_string().contains("media error:"));
        assert!(SegueError::render("x").to_string().contains("render error:"));
        assert!(SegueError::export("x").to_string().contains("export error:"));
        assert!(
            SegueError::ownership("x")
                .to_string()
                .contains("ownership error:")
        );
        assert!(
            SegueError::serde("x")
                .to_string()
                .contains("serialization error:")
        );
    }

    #[test]
    fn ingest_names_the_file() {
        let err = SegueError::ingest("clips/a.mp4", "no video stream");
        let msg = err.to_string();
        assert!(msg.contains("clips/a.mp4"));
        assert!(msg.contains("no video stream"));
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = SegueError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
