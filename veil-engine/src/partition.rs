//! Work partitioning: disjoint PID sets per worker, and integer-PK ranges
//! for non-patient tables.

use veil_core::Value;

/// Split the patient universe into at most `workers` disjoint, contiguous
/// chunks. Input order is preserved; callers sort first for determinism.
/// All of one patient's tables are processed by whichever worker holds the
/// patient, so a scrubber is built exactly once.
pub fn partition_pids(pids: Vec<Value>, workers: usize) -> Vec<Vec<Value>> {
    let workers = workers.max(1);
    if pids.is_empty() {
        return Vec::new();
    }
    let chunk = pids.len().div_ceil(workers);
    pids.chunks(chunk).map(<[Value]>::to_vec).collect()
}

/// Split an inclusive integer-PK range into at most `workers` contiguous
/// subranges.
pub fn pk_ranges(min: i64, max: i64, workers: usize) -> Vec<(i64, i64)> {
    let workers = workers.max(1) as i64;
    if min > max {
        return Vec::new();
    }
    let span = max - min + 1;
    let per = (span + workers - 1) / workers;
    let mut ranges = Vec::new();
    let mut low = min;
    while low <= max {
        let high = (low + per - 1).min(max);
        ranges.push((low, high));
        low = high + 1;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pids_split_into_disjoint_chunks() {
        let pids: Vec<Value> = (1..=10).map(Value::Integer).collect();
        let parts = partition_pids(pids.clone(), 3);
        assert_eq!(parts.len(), 3);
        let total: usize = parts.iter().map(Vec::len).sum();
        assert_eq!(total, 10);
        // Disjoint and order-preserving.
        let flattened: Vec<Value> = parts.into_iter().flatten().collect();
        assert_eq!(flattened, pids);
    }

    #[test]
    fn fewer_pids_than_workers() {
        let parts = partition_pids(vec![Value::Integer(1)], 8);
        assert_eq!(parts.len(), 1);
        assert!(partition_pids(Vec::new(), 4).is_empty());
    }

    #[test]
    fn pk_ranges_cover_exactly() {
        let ranges = pk_ranges(1, 10, 3);
        assert_eq!(ranges, vec![(1, 4), (5, 8), (9, 10)]);
        assert_eq!(pk_ranges(5, 5, 4), vec![(5, 5)]);
        assert!(pk_ranges(10, 1, 4).is_empty());
    }
}
