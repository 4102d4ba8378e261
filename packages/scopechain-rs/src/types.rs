// Common types shared by the connection set, the bank and the session

use crate::error::StreamError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Global, dense channel number across all registered sources
pub type ChannelId = usize;

/// One validated sample vector routed to its global channel
///
/// Produced and consumed within a single read cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub channel: ChannelId,

    /// Registration index of the source that produced the line
    pub source: usize,

    /// Physical input on the source (1-based)
    pub selector: u8,

    #[serde(default)]
    pub sequence: Option<u64>,

    #[serde(default)]
    pub sample_rate: Option<f64>,

    pub samples: Vec<f64>,
}

/// Lifecycle of a registered source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceState {
    /// Reader task running, source is polled
    Active,

    /// End of stream reached, deregistered
    Closed,

    /// OS-level read failure, deregistered until reattached
    Failed,
}

/// A per-source failure reported by a read cycle
#[derive(Debug)]
pub struct SourceFault {
    pub index: usize,
    pub label: String,
    pub error: StreamError,
}

/// Everything one multiplexed read produced
#[derive(Debug, Default)]
pub struct ReadBatch {
    /// Valid records in the order their lines were read
    pub records: Vec<ChannelRecord>,

    /// Sources that reached end of stream during this read
    pub closed: Vec<usize>,

    /// Sources that failed during this read
    pub failed: Vec<SourceFault>,

    /// Lines rejected by the decoder
    pub dropped_lines: usize,
}

impl ReadBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.closed.is_empty() && self.failed.is_empty()
    }
}

/// Outcome of one session read: which channels changed, plus source notices
#[derive(Debug, Default)]
pub struct ReadReport {
    /// Distinct channels that received at least one insert
    pub channels: BTreeSet<ChannelId>,

    /// Number of records inserted
    pub records: usize,

    pub dropped_lines: usize,

    pub closed: Vec<usize>,

    pub failed: Vec<SourceFault>,
}

impl ReadReport {
    /// Nothing inserted and no source changed state
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.closed.is_empty() && self.failed.is_empty()
    }
}

/// Counters accumulated over the lifetime of a session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub reads: u64,
    pub records_inserted: u64,
    pub lines_dropped: u64,
    pub sources_closed: u64,
    pub sources_failed: u64,
    pub elapsed_secs: f64,
}
