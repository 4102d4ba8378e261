// Stream sources and their connectors
//
// A `StreamSource` is only a labelled readable end (plus, for spawned
// commands, the process handle that must stay alive with it). How it is
// obtained is the connector's business:
// - command: run a per-device command (typically ssh) and read its stdout
// - tcp: connect to a line server
// - file: replay a capture file once
//
// New kinds are added by implementing `SourceConnector`, adding a variant to
// `SourceSpec` and a match arm in `SourceSpec::connector`.

mod command;
mod file;
mod tcp;

use crate::error::{StreamError, StreamResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::io::AsyncRead;
use tokio::process::Child;

pub use command::{CommandConnector, ADDRESS_PLACEHOLDER};
pub use file::FileConnector;
pub use tcp::TcpConnector;

/// Readable end type accepted by the connection set
pub type SourceReader = Box<dyn AsyncRead + Send + Unpin>;

/// A labelled byte stream producing protocol lines
pub struct StreamSource {
    label: String,
    reader: SourceReader,
    process: Option<Child>,
}

impl StreamSource {
    pub fn new<R>(label: impl Into<String>, reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            label: label.into(),
            reader: Box::new(reader),
            process: None,
        }
    }

    /// Wrap a spawned process; its stdout must have been piped
    pub fn from_child(label: impl Into<String>, mut child: Child) -> StreamResult<Self> {
        let label = label.into();
        let stdout = child.stdout.take().ok_or_else(|| {
            StreamError::Connection(format!("{}: process stdout is not piped", label))
        })?;
        Ok(Self {
            label,
            reader: Box::new(stdout),
            process: Some(child),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn into_parts(self) -> (String, SourceReader, Option<Child>) {
        (self.label, self.reader, self.process)
    }
}

impl fmt::Debug for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSource")
            .field("label", &self.label)
            .field("process", &self.process.as_ref().and_then(|p| p.id()))
            .finish()
    }
}

/// Something that can open a `StreamSource`
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Label used for diagnostics before the source exists
    fn describe(&self) -> String;

    async fn open(&self) -> StreamResult<StreamSource>;
}

/// Declarative description of one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SourceSpec {
    /// Device address run through a command template
    #[serde(rename = "command")]
    Command { address: String },

    #[serde(rename = "tcp")]
    Tcp { host: String, port: u16 },

    #[serde(rename = "file")]
    File { path: String },
}

impl SourceSpec {
    /// Build the connector for this spec; `command_template` is used for
    /// `Command` specs and must contain `{address}`
    pub fn connector(&self, command_template: Option<&str>) -> StreamResult<Box<dyn SourceConnector>> {
        match self {
            SourceSpec::Command { address } => {
                let template = command_template.ok_or_else(|| {
                    StreamError::InvalidConfig(format!(
                        "source '{}' needs a command template",
                        address
                    ))
                })?;
                Ok(Box::new(CommandConnector::new(template, address.clone())?))
            }
            SourceSpec::Tcp { host, port } => Ok(Box::new(TcpConnector::new(host.clone(), *port))),
            SourceSpec::File { path } => Ok(Box::new(FileConnector::new(path.clone()))),
        }
    }
}

impl FromStr for SourceSpec {
    type Err = StreamError;

    /// `tcp://host:port`, `file:PATH`, anything else is a device address
    fn from_str(s: &str) -> StreamResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(StreamError::InvalidConfig("empty source".into()));
        }

        if let Some(rest) = s.strip_prefix("tcp://") {
            let (host, port) = rest.rsplit_once(':').ok_or_else(|| {
                StreamError::InvalidConfig(format!("tcp source '{}' is missing a port", s))
            })?;
            let port = port.parse::<u16>().map_err(|_| {
                StreamError::InvalidConfig(format!("tcp source '{}' has an invalid port", s))
            })?;
            if host.is_empty() {
                return Err(StreamError::InvalidConfig(format!(
                    "tcp source '{}' is missing a host",
                    s
                )));
            }
            return Ok(SourceSpec::Tcp {
                host: host.to_string(),
                port,
            });
        }

        if let Some(path) = s.strip_prefix("file:") {
            if path.is_empty() {
                return Err(StreamError::InvalidConfig("file source without a path".into()));
            }
            return Ok(SourceSpec::File {
                path: path.to_string(),
            });
        }

        Ok(SourceSpec::Command {
            address: s.to_string(),
        })
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Command { address } => write!(f, "{}", address),
            SourceSpec::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
            SourceSpec::File { path } => write!(f, "file:{}", path),
        }
    }
}

/// Open every spec in order; the result order is the registration order
///
/// Fails on the first source that cannot be opened. Sources opened before the
/// failure are dropped, which kills any spawned process.
pub async fn connect_all(
    specs: &[SourceSpec],
    command_template: Option<&str>,
) -> StreamResult<Vec<StreamSource>> {
    let mut sources = Vec::with_capacity(specs.len());
    for spec in specs {
        let connector = spec.connector(command_template)?;
        log::info!("Connecting source {}: {}", sources.len(), connector.describe());
        sources.push(connector.open().await?);
    }
    Ok(sources)
}
