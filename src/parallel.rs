//! Parallel processing utilities using Rayon.

use rayon::prelude::*;

/// Minimum items per thread before chunked parallelism pays off.
/// Below this, a thread should own the whole range.
pub const MIN_ITEMS_PER_THREAD: usize = 1000;

/// Configure the global thread pool. Call once at startup, before any
/// parallel work. A count of 0 keeps Rayon's default (all cores).
pub fn set_num_threads(threads: usize) -> Result<(), String> {
    if threads == 0 {
        return Ok(());
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .map_err(|e| format!("cannot configure {} threads: {}", threads, e))
}

/// Block size for dynamic scheduling over `total` items: aim for at
/// least [`MIN_ITEMS_PER_THREAD`] iterations per block, falling back to
/// an even split when the work is small.
pub fn block_size(total: usize) -> usize {
    let threads = rayon::current_num_threads().max(1);
    if total < MIN_ITEMS_PER_THREAD * threads {
        (total / threads).max(1)
    } else {
        MIN_ITEMS_PER_THREAD
    }
}

/// Map `f` over the 1-based read id range in parallel, collecting the
/// per-read results into a Vec indexed by read id (slot 0 is default).
pub fn par_map_reads<T, F>(num_reads: u32, f: F) -> Vec<T>
where
    T: Send + Default,
    F: Fn(u32) -> T + Sync,
{
    let mut out: Vec<T> = (0..=num_reads as usize).map(|_| T::default()).collect();

    out[1..]
        .par_iter_mut()
        .enumerate()
        .with_min_len(block_size(num_reads as usize))
        .for_each(|(i, slot)| {
            *slot = f(i as u32 + 1);
        });

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_size_small() {
        assert!(block_size(10) >= 1);
    }

    #[test]
    fn test_par_map_reads() {
        let v = par_map_reads(100, |id| id * 2);
        assert_eq!(v[0], 0);
        assert_eq!(v[1], 2);
        assert_eq!(v[100], 200);
    }
}
