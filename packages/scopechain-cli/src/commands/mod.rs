pub mod config;
pub mod decode;
pub mod watch;

use crate::exit_codes;
use scopechain_rs::{ChainConfig, StreamError, StreamResult};

/// Defaults, then the optional JSON file, then SCOPECHAIN_* variables
pub fn load_config(path: Option<&str>) -> StreamResult<ChainConfig> {
    let config = match path {
        Some(path) => ChainConfig::from_file(path)?,
        None => ChainConfig::default(),
    };
    config.with_env_overrides()
}

pub fn exit_code_for(error: &StreamError) -> i32 {
    match error {
        e if e.is_fatal() => exit_codes::FATAL_INCONSISTENCY,
        StreamError::Connection(_) | StreamError::SourceUnavailable { .. } => {
            exit_codes::CONNECTION_ERROR
        }
        StreamError::InvalidConfig(_)
        | StreamError::Protocol(_)
        | StreamError::WidthMismatch { .. }
        | StreamError::ChannelOutOfRange { .. } => exit_codes::INPUT_ERROR,
        _ => exit_codes::EXECUTION_ERROR,
    }
}
