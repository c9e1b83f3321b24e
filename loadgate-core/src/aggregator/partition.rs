use serde::{Deserialize, Serialize};

/// One worker's share of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerAssignment {
    pub worker_id: u32,
    pub requests_to_process: u64,
    pub concurrency_limit: u32,
}

/// Splits the request budget evenly; the last worker also takes the remainder.
pub fn partition(total_requests: u64, worker_count: u32, concurrency: u32) -> Vec<WorkerAssignment> {
    if worker_count == 0 {
        return Vec::new();
    }

    let workers = u64::from(worker_count);
    let base = total_requests / workers;
    let remainder = total_requests % workers;

    (0..worker_count)
        .map(|worker_id| {
            let extra = if worker_id + 1 == worker_count {
                remainder
            } else {
                0
            };
            WorkerAssignment {
                worker_id,
                requests_to_process: base + extra,
                concurrency_limit: concurrency,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_split() {
        let parts = partition(1000, 4, 50);
        assert_eq!(parts.len(), 4);
        assert!(parts.iter().all(|a| a.requests_to_process == 250));
        assert!(parts.iter().all(|a| a.concurrency_limit == 50));
        let ids: Vec<u32> = parts.iter().map(|a| a.worker_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn remainder_goes_to_last_worker() {
        let parts = partition(10, 3, 1);
        let counts: Vec<u64> = parts.iter().map(|a| a.requests_to_process).collect();
        assert_eq!(counts, vec![3, 3, 4]);
        assert_eq!(counts.iter().sum::<u64>(), 10);
    }

    #[test]
    fn zero_workers_yields_nothing() {
        assert!(partition(10, 0, 1).is_empty());
    }
}
