// Ring buffer bank: fixed-depth rolling history per channel
//
// Storage is two `[channel][slot][sample]` arrays (raw and, optionally,
// transformed) that share one write cursor per channel. Logical slot 0 is the
// newest vector; the cursor advances instead of shifting the whole ring, so an
// insert costs O(W).

use crate::config::{ChainConfig, FillValue};
use crate::error::{StreamError, StreamResult};
use crate::transform::SampleTransform;
use crate::types::{ChannelId, ChannelRecord};
use ndarray::{s, Array2, Array3, ArrayView1, Axis};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Geometry and behavior of a bank, fixed at construction
#[derive(Debug, Clone, PartialEq)]
pub struct BankConfig {
    pub channels: usize,
    pub depth: usize,
    pub width: usize,
    pub fill: FillValue,
    pub mean_removal: bool,
    pub transformed_width: Option<usize>,
}

impl BankConfig {
    pub fn from_chain(config: &ChainConfig, channels: usize) -> Self {
        Self {
            channels,
            depth: config.depth,
            width: config.width,
            fill: config.fill,
            mean_removal: config.mean_removal,
            transformed_width: config.transformed_width,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct RingCursor {
    /// Physical slot of the newest vector
    head: usize,
    /// Occupied slots, saturates at depth
    len: usize,
    inserts: u64,
}

struct TransformedStore {
    transform: Arc<dyn SampleTransform>,
    width: usize,
    data: Array3<f64>,
}

/// A raw vector after validation and pre-processing, ready to commit
struct PreparedInsert {
    channel: ChannelId,
    raw: Vec<f64>,
    transformed: Option<Vec<f64>>,
}

pub struct RingBufferBank {
    config: BankConfig,
    raw: Array3<f64>,
    transformed: Option<TransformedStore>,
    cursors: Vec<RingCursor>,
}

impl RingBufferBank {
    /// Build a bank; the transform's width contract is checked here
    pub fn new(
        config: BankConfig,
        transform: Option<Arc<dyn SampleTransform>>,
    ) -> StreamResult<Self> {
        if config.channels == 0 || config.depth == 0 || config.width == 0 {
            return Err(StreamError::InvalidConfig(format!(
                "bank geometry must be positive, got channels={} depth={} width={}",
                config.channels, config.depth, config.width
            )));
        }

        let fill = config.fill.as_f64();
        let raw = Array3::from_elem((config.channels, config.depth, config.width), fill);

        let transformed = match transform {
            Some(transform) => {
                let width = transform.output_width(config.width)?;
                if let Some(expected) = config.transformed_width {
                    if expected != width {
                        return Err(StreamError::InvalidConfig(format!(
                            "transform '{}' produces {} values, configured transformed_width is {}",
                            transform.name(),
                            width,
                            expected
                        )));
                    }
                }
                log::debug!(
                    "Bank transform '{}': {} -> {} values",
                    transform.name(),
                    config.width,
                    width
                );
                Some(TransformedStore {
                    transform,
                    width,
                    data: Array3::from_elem((config.channels, config.depth, width), fill),
                })
            }
            None => {
                if config.transformed_width.is_some() {
                    return Err(StreamError::InvalidConfig(
                        "transformed_width configured without a transform".into(),
                    ));
                }
                None
            }
        };

        Ok(Self {
            cursors: vec![RingCursor::default(); config.channels],
            config,
            raw,
            transformed,
        })
    }

    pub fn config(&self) -> &BankConfig {
        &self.config
    }

    pub fn channel_count(&self) -> usize {
        self.config.channels
    }

    pub fn depth(&self) -> usize {
        self.config.depth
    }

    pub fn width(&self) -> usize {
        self.config.width
    }

    pub fn transformed_width(&self) -> Option<usize> {
        self.transformed.as_ref().map(|t| t.width)
    }

    pub fn has_transform(&self) -> bool {
        self.transformed.is_some()
    }

    /// Rotate `channel` by one slot and store `samples` as its newest vector
    ///
    /// On error nothing is modified.
    pub fn insert(&mut self, channel: ChannelId, samples: &[f64]) -> StreamResult<()> {
        let prepared = self.prepare(channel, samples)?;
        self.commit(prepared);
        Ok(())
    }

    /// Insert records in order and return the channels they touched
    ///
    /// Pre-processing and transforms run in parallel; commits stay sequential
    /// in record order. If any record is invalid the bank is left untouched.
    pub fn insert_batch(&mut self, records: &[ChannelRecord]) -> StreamResult<BTreeSet<ChannelId>> {
        let prepared = {
            let this = &*self;
            records
                .par_iter()
                .map(|record| this.prepare(record.channel, &record.samples))
                .collect::<StreamResult<Vec<_>>>()?
        };

        let mut touched = BTreeSet::new();
        for insert in prepared {
            touched.insert(insert.channel);
            self.commit(insert);
        }
        Ok(touched)
    }

    fn prepare(&self, channel: ChannelId, samples: &[f64]) -> StreamResult<PreparedInsert> {
        if channel >= self.config.channels {
            return Err(StreamError::ChannelOutOfRange {
                channel,
                channels: self.config.channels,
            });
        }
        if samples.len() != self.config.width {
            return Err(StreamError::WidthMismatch {
                expected: self.config.width,
                actual: samples.len(),
            });
        }

        let mut raw = samples.to_vec();
        if self.config.mean_removal {
            let mean = raw.iter().sum::<f64>() / raw.len() as f64;
            raw.iter_mut().for_each(|x| *x -= mean);
        }

        let transformed = self.transformed.as_ref().map(|store| {
            let mut out = vec![0.0; store.width];
            store.transform.apply(&raw, &mut out);
            out
        });

        Ok(PreparedInsert {
            channel,
            raw,
            transformed,
        })
    }

    fn commit(&mut self, insert: PreparedInsert) {
        let depth = self.config.depth;
        let cursor = &mut self.cursors[insert.channel];
        cursor.head = if cursor.len == 0 {
            0
        } else {
            (cursor.head + 1) % depth
        };
        cursor.len = (cursor.len + 1).min(depth);
        cursor.inserts += 1;
        let head = cursor.head;

        self.raw
            .slice_mut(s![insert.channel, head, ..])
            .assign(&ArrayView1::from(insert.raw.as_slice()));

        if let (Some(store), Some(values)) = (self.transformed.as_mut(), insert.transformed) {
            store
                .data
                .slice_mut(s![insert.channel, head, ..])
                .assign(&ArrayView1::from(values.as_slice()));
        }
    }

    /// Physical slot backing logical slot `slot` of `channel`
    fn physical(&self, channel: ChannelId, slot: usize) -> usize {
        let depth = self.config.depth;
        let cursor = &self.cursors[channel];
        if cursor.len == 0 {
            // Nothing written: every physical slot still holds the fill value
            return slot;
        }
        (cursor.head + depth - slot) % depth
    }

    fn in_range(&self, channel: ChannelId, slot: usize) -> bool {
        channel < self.config.channels && slot < self.config.depth
    }

    /// Raw vector at logical `slot` (0 = newest)
    pub fn raw_slot(&self, channel: ChannelId, slot: usize) -> Option<ArrayView1<'_, f64>> {
        if !self.in_range(channel, slot) {
            return None;
        }
        let physical = self.physical(channel, slot);
        Some(self.raw.slice(s![channel, physical, ..]))
    }

    /// Transformed vector at logical `slot`, if a transform is configured
    pub fn transformed_slot(
        &self,
        channel: ChannelId,
        slot: usize,
    ) -> Option<ArrayView1<'_, f64>> {
        if !self.in_range(channel, slot) {
            return None;
        }
        let physical = self.physical(channel, slot);
        self.transformed
            .as_ref()
            .map(|store| store.data.slice(s![channel, physical, ..]))
    }

    /// Newest raw vector of `channel`, if anything was inserted
    pub fn latest(&self, channel: ChannelId) -> Option<ArrayView1<'_, f64>> {
        if self.filled(channel) == 0 {
            return None;
        }
        self.raw_slot(channel, 0)
    }

    /// Occupied slots of `channel` (0..=depth)
    pub fn filled(&self, channel: ChannelId) -> usize {
        self.cursors.get(channel).map(|c| c.len).unwrap_or(0)
    }

    /// Total inserts into `channel` since construction or the last reset
    pub fn inserts(&self, channel: ChannelId) -> u64 {
        self.cursors.get(channel).map(|c| c.inserts).unwrap_or(0)
    }

    /// Owned copy of a channel's raw ring, shape (depth, width), newest first
    pub fn raw_history(&self, channel: ChannelId) -> Option<Array2<f64>> {
        if channel >= self.config.channels {
            return None;
        }
        let order: Vec<usize> = (0..self.config.depth)
            .map(|slot| self.physical(channel, slot))
            .collect();
        Some(
            self.raw
                .index_axis(Axis(0), channel)
                .select(Axis(0), &order),
        )
    }

    /// Owned copy of a channel's transformed ring, newest first
    pub fn transformed_history(&self, channel: ChannelId) -> Option<Array2<f64>> {
        if channel >= self.config.channels {
            return None;
        }
        let store = self.transformed.as_ref()?;
        let order: Vec<usize> = (0..self.config.depth)
            .map(|slot| self.physical(channel, slot))
            .collect();
        Some(
            store
                .data
                .index_axis(Axis(0), channel)
                .select(Axis(0), &order),
        )
    }

    /// Owned copy of every raw ring, shape (channels, depth, width), newest first
    pub fn raw_snapshot(&self) -> Array3<f64> {
        let mut snapshot = Array3::from_elem(self.raw.dim(), self.config.fill.as_f64());
        for channel in 0..self.config.channels {
            for slot in 0..self.config.depth {
                let physical = self.physical(channel, slot);
                snapshot
                    .slice_mut(s![channel, slot, ..])
                    .assign(&self.raw.slice(s![channel, physical, ..]));
            }
        }
        snapshot
    }

    /// Restore every slot to the fill value
    pub fn reset(&mut self) {
        let fill = self.config.fill.as_f64();
        self.raw.fill(fill);
        if let Some(store) = self.transformed.as_mut() {
            store.data.fill(fill);
        }
        self.cursors.iter_mut().for_each(|c| *c = RingCursor::default());
    }
}
