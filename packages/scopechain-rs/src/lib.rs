pub mod bank;
pub mod config;
pub mod connection;
pub mod demux;
pub mod error;
pub mod protocol;
pub mod session;
pub mod source;
pub mod transform;
pub mod types;

pub use bank::{BankConfig, RingBufferBank};
pub use config::{ChainConfig, FillValue, LineLayout};
pub use connection::ConnectionSet;
pub use demux::Demux;
pub use error::{ProtocolError, StreamError, StreamResult};
pub use protocol::{DecodedLine, LineDecoder};
pub use session::AcquisitionSession;
pub use source::{connect_all, SourceConnector, SourceSpec, StreamSource};
pub use transform::{FnTransform, Identity, LogMagnitudeSpectrum, SampleTransform};
pub use types::*;
