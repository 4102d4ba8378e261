// TCP socket source
//
// Connects to a server that writes protocol lines, one burst per line.

use super::{SourceConnector, StreamSource};
use crate::error::{StreamError, StreamResult};
use async_trait::async_trait;
use tokio::net::TcpStream;

#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
}

impl TcpConnector {
    pub fn new(host: String, port: u16) -> Self {
        Self { host, port }
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[async_trait]
impl SourceConnector for TcpConnector {
    fn describe(&self) -> String {
        format!("tcp://{}", self.address())
    }

    async fn open(&self) -> StreamResult<StreamSource> {
        let addr = self.address();
        log::info!("Connecting to TCP: {}", addr);

        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| StreamError::Connection(format!("TCP connection to {} failed: {}", addr, e)))?;
        stream.set_nodelay(true).ok();

        Ok(StreamSource::new(self.describe(), stream))
    }
}
