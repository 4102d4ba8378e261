// File replay source
//
// Reads a capture of protocol lines once, then reports end of stream. Useful
// for replaying recorded sessions and for exercising the chain offline.

use super::{SourceConnector, StreamSource};
use crate::error::{StreamError, StreamResult};
use async_trait::async_trait;
use tokio::fs::File;

#[derive(Debug, Clone)]
pub struct FileConnector {
    path: String,
}

impl FileConnector {
    pub fn new(path: String) -> Self {
        Self { path }
    }
}

#[async_trait]
impl SourceConnector for FileConnector {
    fn describe(&self) -> String {
        format!("file:{}", self.path)
    }

    async fn open(&self) -> StreamResult<StreamSource> {
        let file = File::open(&self.path)
            .await
            .map_err(|e| StreamError::Connection(format!("cannot open {}: {}", self.path, e)))?;
        Ok(StreamSource::new(self.describe(), file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file() {
        let err = FileConnector::new("/nonexistent/capture.txt".to_string())
            .open()
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::Connection(_)));
    }

    #[tokio::test]
    async fn test_label_uses_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().display().to_string();
        let source = FileConnector::new(path.clone()).open().await.unwrap();
        assert_eq!(source.label(), format!("file:{}", path));
    }
}
