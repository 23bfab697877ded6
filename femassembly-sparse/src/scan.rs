//! Exclusive prefix sums turning per-row counts into CSR row offsets.
use rayon::prelude::*;
use std::cmp::max;

/// Smallest number of counts handled by a single block in [`par_exclusive_scan`].
const MIN_SCAN_BLOCK: usize = 4096;

/// Computes offsets `[0, c0, c0 + c1, ...]` of length `counts.len() + 1`.
pub fn exclusive_scan(counts: &[usize]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(counts.len() + 1);
    let mut running = 0;
    offsets.push(running);
    for count in counts {
        running += count;
        offsets.push(running);
    }
    offsets
}

/// Parallel version of [`exclusive_scan`] producing identical output.
///
/// The counts are split into blocks. Block sums are computed in parallel, scanned sequentially
/// (there are few of them) and finally every block is scanned in parallel starting from its
/// block offset.
pub fn par_exclusive_scan(counts: &[usize]) -> Vec<usize> {
    let n = counts.len();
    let block_size = max(MIN_SCAN_BLOCK, n / max(1, 4 * rayon::current_num_threads()));
    if n <= block_size {
        return exclusive_scan(counts);
    }

    let block_sums: Vec<usize> = counts
        .par_chunks(block_size)
        .map(|block| block.iter().sum())
        .collect();
    let block_offsets = exclusive_scan(&block_sums);

    let mut offsets = vec![0; n + 1];
    offsets[1..]
        .par_chunks_mut(block_size)
        .zip(counts.par_chunks(block_size))
        .zip(block_offsets.par_iter())
        .for_each(|((output, block), &start)| {
            let mut running = start;
            for (out, count) in output.iter_mut().zip(block) {
                running += count;
                *out = running;
            }
        });
    offsets
}
