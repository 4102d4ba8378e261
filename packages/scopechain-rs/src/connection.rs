// Connection set: multiplexed line reader over an ordered list of sources
//
// Each source gets a reader task that splits its stream into lines and queues
// them (bounded) for the caller. `read` waits until any queue has a line or the
// timeout passes, then drains in rounds: one line per ready source per round,
// in registration order, until a round finds nothing. Per-source line order is
// preserved, and a producer that stalls mid-line only blocks its own task.

use crate::config::ChainConfig;
use crate::demux::Demux;
use crate::error::{StreamError, StreamResult};
use crate::protocol::LineDecoder;
use crate::source::{SourceReader, StreamSource};
use crate::types::{ChannelRecord, ReadBatch, SourceFault, SourceState};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Read buffer per source; a 16k-sample line is roughly 130 KiB of text
const READ_BUFFER_BYTES: usize = 256 * 1024;

enum SourceEvent {
    Line(Vec<u8>),
    Closed,
    Failed(std::io::Error),
}

struct SourceSlot {
    label: String,
    state: SourceState,
    lines: mpsc::Receiver<SourceEvent>,
    reader_task: JoinHandle<()>,
    // Dropped with the slot; spawned commands are killed on drop
    _process: Option<Child>,
}

impl Drop for SourceSlot {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

pub struct ConnectionSet {
    slots: Vec<SourceSlot>,
    decoder: LineDecoder,
    demux: Demux,
    queue_capacity: usize,
    notify: Arc<Notify>,
    // Source notices from a read that ended in a fatal error
    held_closed: Vec<usize>,
    held_failed: Vec<SourceFault>,
}

impl ConnectionSet {
    /// Register `sources` in the given order and start reading them
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(sources: Vec<StreamSource>, config: &ChainConfig) -> StreamResult<Self> {
        config.validate()?;
        if sources.is_empty() {
            return Err(StreamError::InvalidConfig(
                "connection set needs at least one source".into(),
            ));
        }

        let notify = Arc::new(Notify::new());
        let slots = sources
            .into_iter()
            .enumerate()
            .map(|(index, source)| {
                log::info!("Registered source {}: {}", index, source.label());
                spawn_slot(source, config.line_queue_capacity, Arc::clone(&notify))
            })
            .collect();

        Ok(Self {
            slots,
            decoder: LineDecoder::new(config.layout, config.width, config.selectors_per_source),
            demux: Demux::new(config.selectors_per_source),
            queue_capacity: config.line_queue_capacity,
            notify,
            held_closed: Vec::new(),
            held_failed: Vec::new(),
        })
    }

    /// Registered sources, including closed and failed ones
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn channel_count(&self) -> usize {
        self.demux.channel_count(self.slots.len())
    }

    pub fn active_sources(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.state == SourceState::Active)
            .count()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.slots.iter().map(|slot| slot.label.as_str()).collect()
    }

    pub fn state(&self, index: usize) -> Option<SourceState> {
        self.slots.get(index).map(|slot| slot.state)
    }

    pub fn demux(&self) -> Demux {
        self.demux
    }

    pub fn decoder(&self) -> &LineDecoder {
        &self.decoder
    }

    pub fn sample_rate(&self) -> Option<f64> {
        self.decoder.sample_rate()
    }

    /// Drain every complete line currently pending, waiting up to `timeout`
    /// for the first one
    ///
    /// Malformed lines are logged and dropped. Closed and failed sources are
    /// reported once and deregistered. A sample-rate mismatch aborts the read
    /// with a fatal error; source notices gathered by that read are handed
    /// out by the next one.
    pub async fn read(&mut self, timeout: Duration) -> StreamResult<ReadBatch> {
        // Reader tasks must get a turn even on a current-thread runtime
        tokio::task::yield_now().await;

        let mut batch = ReadBatch {
            closed: std::mem::take(&mut self.held_closed),
            failed: std::mem::take(&mut self.held_failed),
            ..ReadBatch::default()
        };

        match self.drain(timeout, &mut batch).await {
            Ok(()) => Ok(batch),
            Err(e) => {
                for index in &batch.closed {
                    log::warn!("Source {} closed during a failed read", index);
                }
                for fault in &batch.failed {
                    log::warn!(
                        "Source {} failed during a failed read: {}",
                        fault.index,
                        fault.error
                    );
                }
                self.held_closed = batch.closed;
                self.held_failed = batch.failed;
                Err(e)
            }
        }
    }

    async fn drain(&mut self, timeout: Duration, batch: &mut ReadBatch) -> StreamResult<()> {
        let deadline = Instant::now() + timeout;

        loop {
            if self.poll_round(batch)? {
                break;
            }
            if !batch.is_empty() || timeout.is_zero() || self.active_sources() == 0 {
                return Ok(());
            }
            // A stale wakeup just costs one empty round
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return Ok(());
            }
        }

        while self.poll_round(batch)? {}
        Ok(())
    }

    /// Take at most one event from every active source; true if any had one
    fn poll_round(&mut self, batch: &mut ReadBatch) -> StreamResult<bool> {
        let mut ready = false;

        for index in 0..self.slots.len() {
            if self.slots[index].state != SourceState::Active {
                continue;
            }
            let event = match self.slots[index].lines.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => continue,
                Err(TryRecvError::Disconnected) => SourceEvent::Closed,
            };
            ready = true;

            match event {
                SourceEvent::Line(bytes) => self.accept_line(index, &bytes, batch)?,
                SourceEvent::Closed => {
                    let slot = &mut self.slots[index];
                    slot.state = SourceState::Closed;
                    log::info!(
                        "Source {} ({}) reached end of stream, deregistered",
                        index,
                        slot.label
                    );
                    batch.closed.push(index);
                }
                SourceEvent::Failed(e) => {
                    let slot = &mut self.slots[index];
                    slot.state = SourceState::Failed;
                    log::warn!("Source {} ({}) read failed: {}", index, slot.label, e);
                    batch.failed.push(SourceFault {
                        index,
                        label: slot.label.clone(),
                        error: StreamError::SourceUnavailable {
                            index,
                            label: slot.label.clone(),
                            reason: e.to_string(),
                        },
                    });
                }
            }
        }

        Ok(ready)
    }

    fn accept_line(&mut self, index: usize, bytes: &[u8], batch: &mut ReadBatch) -> StreamResult<()> {
        let label = self.slots[index].label.as_str();

        let line = match self.decoder.decode_bytes(bytes) {
            Ok(line) => line,
            Err(e) => {
                log::warn!("{}: invalid line dropped: {}", label, e);
                batch.dropped_lines += 1;
                return Ok(());
            }
        };

        if let Some(rate) = line.sample_rate {
            if let Err(e) = self.decoder.check_rate(label, rate) {
                log::error!("{}", e);
                return Err(e);
            }
        }

        let channel = self.demux.channel_id(index, line.selector);
        log::debug!("{}-{} -> channel {}", label, line.selector, channel);

        batch.records.push(ChannelRecord {
            channel,
            source: index,
            selector: line.selector,
            sequence: line.sequence,
            sample_rate: line.sample_rate,
            samples: line.samples,
        });
        Ok(())
    }

    /// Replace a closed or failed source, keeping its registration index and
    /// therefore its channel ids
    pub fn reattach(&mut self, index: usize, source: StreamSource) -> StreamResult<()> {
        let state = self.state(index).ok_or_else(|| {
            StreamError::InvalidConfig(format!(
                "no source registered at index {} ({} sources)",
                index,
                self.slots.len()
            ))
        })?;
        if state == SourceState::Active {
            return Err(StreamError::InvalidConfig(format!(
                "source {} ({}) is still active",
                index, self.slots[index].label
            )));
        }

        log::info!(
            "Reattaching source {}: {} -> {}",
            index,
            self.slots[index].label,
            source.label()
        );
        self.slots[index] = spawn_slot(source, self.queue_capacity, Arc::clone(&self.notify));
        Ok(())
    }

    /// Stop every reader task and release owned processes
    pub fn disconnect(&mut self) {
        for slot in &mut self.slots {
            slot.reader_task.abort();
            slot._process = None;
            slot.state = SourceState::Closed;
        }
        log::info!("Disconnected {} sources", self.slots.len());
    }
}

fn spawn_slot(source: StreamSource, capacity: usize, notify: Arc<Notify>) -> SourceSlot {
    let (label, reader, process) = source.into_parts();
    let (tx, rx) = mpsc::channel(capacity);
    let reader_task = tokio::spawn(pump_lines(reader, tx, notify));

    SourceSlot {
        label,
        state: SourceState::Active,
        lines: rx,
        reader_task,
        _process: process,
    }
}

async fn pump_lines(reader: SourceReader, tx: mpsc::Sender<SourceEvent>, notify: Arc<Notify>) {
    let mut reader = BufReader::with_capacity(READ_BUFFER_BYTES, reader);

    loop {
        let mut line = Vec::new();
        let event = match reader.read_until(b'\n', &mut line).await {
            Ok(0) => SourceEvent::Closed,
            Ok(_) => SourceEvent::Line(line),
            Err(e) => SourceEvent::Failed(e),
        };
        let last = !matches!(event, SourceEvent::Line(_));

        if tx.send(event).await.is_err() {
            // Connection set dropped
            return;
        }
        notify.notify_one();

        if last {
            return;
        }
    }
}
