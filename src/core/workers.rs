//! Small scoped worker pool for CPU-bound batch stages.
//!
//! Jobs are independent and read-only on their input; each worker owns its
//! output until it is sent back, and results are returned in input order.

use crossbeam_channel::unbounded;
use std::num::NonZeroUsize;
use std::thread;

/// Number of workers to use when the caller does not care.
pub fn default_worker_count() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Apply `job` to every item on up to `workers` threads.
pub fn parallel_map<T, R, F>(items: &[T], workers: usize, job: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    if items.is_empty() {
        return Vec::new();
    }
    let workers = workers.clamp(1, items.len());
    if workers == 1 {
        return items.iter().map(&job).collect();
    }

    let (job_tx, job_rx) = unbounded::<usize>();
    let (result_tx, result_rx) = unbounded::<(usize, R)>();
    for index in 0..items.len() {
        // Receiver is alive for the whole scope.
        let _ = job_tx.send(index);
    }
    drop(job_tx);

    thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let job = &job;
            scope.spawn(move || {
                for index in job_rx.iter() {
                    if result_tx.send((index, job(&items[index]))).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(result_tx);

    let mut results: Vec<(usize, R)> = result_rx.iter().collect();
    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, result)| result).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_keep_input_order() {
        let items: Vec<u64> = (0..100).collect();
        let squares = parallel_map(&items, 4, |x| x * x);
        assert_eq!(squares, items.iter().map(|x| x * x).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_input() {
        let items: Vec<u8> = Vec::new();
        assert!(parallel_map(&items, 8, |x| *x).is_empty());
    }

    #[test]
    fn test_single_worker() {
        let items = vec!["a", "bb", "ccc"];
        assert_eq!(parallel_map(&items, 1, |s| s.len()), vec![1, 2, 3]);
    }
}
