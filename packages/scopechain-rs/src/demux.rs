// Channel demultiplexing
//
// Channel ids are `selectors_per_source * source_index + (selector - 1)`, where
// `source_index` is the position of the source in the list handed to
// `ConnectionSet::connect`. Reordering that list renumbers every channel.

use crate::types::ChannelId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Demux {
    selectors_per_source: usize,
}

impl Demux {
    pub fn new(selectors_per_source: usize) -> Self {
        Self {
            selectors_per_source,
        }
    }

    pub fn selectors_per_source(&self) -> usize {
        self.selectors_per_source
    }

    /// Number of channels a chain of `sources` devices exposes
    pub fn channel_count(&self, sources: usize) -> usize {
        self.selectors_per_source * sources
    }

    /// Map a (source, 1-based selector) pair to its global channel
    ///
    /// The selector must already be validated against `selectors_per_source`.
    #[inline]
    pub fn channel_id(&self, source_index: usize, selector: u8) -> ChannelId {
        debug_assert!(selector >= 1 && usize::from(selector) <= self.selectors_per_source);
        self.selectors_per_source * source_index + (usize::from(selector) - 1)
    }

    /// Inverse of [`Demux::channel_id`]: (source index, selector)
    pub fn locate(&self, channel: ChannelId) -> (usize, u8) {
        let source = channel / self.selectors_per_source;
        let selector = (channel % self.selectors_per_source) as u8 + 1;
        (source, selector)
    }
}
