//! Batch planning: split a presentation into contiguous generation groups.

use slidecast_shared::Batch;

/// Slides per generation batch.
pub const BATCH_SIZE: usize = 3;

/// Partition `slides` into contiguous batches of `size`, the last possibly shorter.
///
/// Pure function of the slide count and group size. Empty input yields no
/// batches; a `size` of zero is treated as one.
pub fn plan_batches(slides: &[String], size: usize) -> Vec<Batch> {
    let size = size.max(1);
    slides
        .chunks(size)
        .enumerate()
        .map(|(i, chunk)| Batch::new(i * size, chunk.to_vec()))
        .collect()
}
