// Remote command source
//
// Runs one command per device, typically an ssh session that starts the
// acquisition program on the board, and reads its line-buffered stdout. The
// template is executed through `sh -c` with `{address}` substituted.

use super::{SourceConnector, StreamSource};
use crate::error::{StreamError, StreamResult};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

pub const ADDRESS_PLACEHOLDER: &str = "{address}";

#[derive(Debug, Clone)]
pub struct CommandConnector {
    template: String,
    address: String,
}

impl CommandConnector {
    pub fn new(template: impl Into<String>, address: impl Into<String>) -> StreamResult<Self> {
        let template = template.into();
        if !template.contains(ADDRESS_PLACEHOLDER) {
            return Err(StreamError::InvalidConfig(format!(
                "command template '{}' has no {} placeholder",
                template, ADDRESS_PLACEHOLDER
            )));
        }
        Ok(Self {
            template,
            address: address.into(),
        })
    }

    pub fn command_line(&self) -> String {
        self.template.replace(ADDRESS_PLACEHOLDER, &self.address)
    }
}

#[async_trait]
impl SourceConnector for CommandConnector {
    fn describe(&self) -> String {
        format!("{} (command)", self.address)
    }

    async fn open(&self) -> StreamResult<StreamSource> {
        let command_line = self.command_line();
        log::debug!("Spawning source command: {}", command_line);

        let child = Command::new("sh")
            .arg("-c")
            .arg(&command_line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                StreamError::Connection(format!("{}: failed to spawn command: {}", self.address, e))
            })?;

        StreamSource::from_child(self.address.clone(), child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};

    #[test]
    fn test_template_substitution() {
        let connector =
            CommandConnector::new("ssh -q root@{address} 'measurements/stream.x'", "10.0.0.7")
                .unwrap();
        assert_eq!(
            connector.command_line(),
            "ssh -q root@10.0.0.7 'measurements/stream.x'"
        );
    }

    #[test]
    fn test_template_requires_placeholder() {
        assert!(CommandConnector::new("ssh root@board stream", "x").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawned_stdout_is_readable() {
        let connector = CommandConnector::new("echo 1 {address}", "0.5").unwrap();
        let source = connector.open().await.unwrap();
        assert_eq!(source.label(), "0.5");

        let (_, reader, process) = source.into_parts();
        assert!(process.is_some());
        let mut line = String::new();
        BufReader::new(reader).read_line(&mut line).await.unwrap();
        assert_eq!(line.trim(), "1 0.5");
    }
}
