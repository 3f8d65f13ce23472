//! FIFO of decoded sample blocks waiting to be committed to the graph.

use std::collections::VecDeque;
use std::sync::Arc;

/// Immutable mono samples, shared with the render path without copying.
pub type SampleBlock = Arc<[f32]>;

/// Split one ingest's samples into blocks of `block_length`.
///
/// The remainder becomes a shorter final block; it is never merged with the
/// next ingest. Empty input yields no blocks.
pub fn split_into_blocks(samples: &[f32], block_length: usize) -> Vec<SampleBlock> {
    let block_length = block_length.max(1);
    samples.chunks(block_length).map(SampleBlock::from).collect()
}

#[derive(Default)]
pub struct PlaybackQueue {
    blocks: VecDeque<SampleBlock>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, blocks: impl IntoIterator<Item = SampleBlock>) {
        self.blocks.extend(blocks);
    }

    pub fn dequeue(&mut self) -> Option<SampleBlock> {
        self.blocks.pop_front()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Total samples buffered across all blocks.
    pub fn buffered_samples(&self) -> usize {
        self.blocks.iter().map(|b| b.len()).sum()
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }
}
