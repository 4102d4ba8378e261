// Acquisition session
//
// Owns one connection set and the bank fed from it. Every read cycle moves all
// pending lines into the bank on the caller's task, so the bank has a single
// writer and readers see it only between cycles.

use crate::bank::{BankConfig, RingBufferBank};
use crate::config::ChainConfig;
use crate::connection::ConnectionSet;
use crate::error::{StreamError, StreamResult};
use crate::source::StreamSource;
use crate::transform::SampleTransform;
use crate::types::{ReadReport, SessionStats};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub struct AcquisitionSession {
    id: String,
    connections: ConnectionSet,
    bank: RingBufferBank,
    stats: SessionStats,
    started: Instant,
}

impl AcquisitionSession {
    pub fn new(connections: ConnectionSet, bank: RingBufferBank) -> StreamResult<Self> {
        if bank.channel_count() != connections.channel_count() {
            return Err(StreamError::InvalidConfig(format!(
                "bank holds {} channels, connection set provides {}",
                bank.channel_count(),
                connections.channel_count()
            )));
        }
        if bank.width() != connections.decoder().width() {
            return Err(StreamError::WidthMismatch {
                expected: connections.decoder().width(),
                actual: bank.width(),
            });
        }

        let id = uuid::Uuid::new_v4().to_string();
        log::info!(
            "Session {}: {} sources, {} channels, depth {}, width {}",
            id,
            connections.len(),
            bank.channel_count(),
            bank.depth(),
            bank.width()
        );

        Ok(Self {
            id,
            connections,
            bank,
            stats: SessionStats::default(),
            started: Instant::now(),
        })
    }

    /// Connect `sources` in order and size the bank to match
    pub fn from_config(
        config: &ChainConfig,
        sources: Vec<StreamSource>,
        transform: Option<Arc<dyn SampleTransform>>,
    ) -> StreamResult<Self> {
        let connections = ConnectionSet::connect(sources, config)?;
        let bank = RingBufferBank::new(
            BankConfig::from_chain(config, connections.channel_count()),
            transform,
        )?;
        Self::new(connections, bank)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn bank(&self) -> &RingBufferBank {
        &self.bank
    }

    pub fn connections(&self) -> &ConnectionSet {
        &self.connections
    }

    /// Used to reattach sources between cycles
    pub fn connections_mut(&mut self) -> &mut ConnectionSet {
        &mut self.connections
    }

    pub fn sample_rate(&self) -> Option<f64> {
        self.connections.sample_rate()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            elapsed_secs: self.started.elapsed().as_secs_f64(),
            ..self.stats.clone()
        }
    }

    /// One cycle: read every pending line and insert the records in read order
    ///
    /// Returns the distinct channels updated. Nothing ready within `timeout`
    /// yields an empty report and leaves the bank as it was.
    pub async fn read(&mut self, timeout: Duration) -> StreamResult<ReadReport> {
        let batch = self.connections.read(timeout).await?;
        let channels = self.bank.insert_batch(&batch.records)?;

        self.stats.reads += 1;
        self.stats.records_inserted += batch.records.len() as u64;
        self.stats.lines_dropped += batch.dropped_lines as u64;
        self.stats.sources_closed += batch.closed.len() as u64;
        self.stats.sources_failed += batch.failed.len() as u64;

        Ok(ReadReport {
            channels,
            records: batch.records.len(),
            dropped_lines: batch.dropped_lines,
            closed: batch.closed,
            failed: batch.failed,
        })
    }

    /// Read once per tick until cancelled, a fatal error occurs, or every
    /// source has ended
    ///
    /// `on_update` runs after each cycle that produced anything.
    pub async fn run<F>(
        &mut self,
        tick: Duration,
        timeout: Duration,
        cancel: CancellationToken,
        mut on_update: F,
    ) -> StreamResult<()>
    where
        F: FnMut(&ReadReport, &RingBufferBank),
    {
        if tick.is_zero() {
            return Err(StreamError::InvalidConfig(
                "session tick period must be positive".into(),
            ));
        }
        let mut ticker = interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    log::info!("Session {} cancelled", self.id);
                    return Ok(());
                }

                _ = ticker.tick() => {
                    let report = self.read(timeout).await?;
                    if !report.is_empty() {
                        on_update(&report, &self.bank);
                    }
                    if self.connections.active_sources() == 0 {
                        log::info!("Session {}: all sources ended", self.id);
                        return Ok(());
                    }
                }
            }
        }
    }
}
