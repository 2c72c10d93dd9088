//! Worker count resolution.

/// Resolve a signed jobs setting against `available` cores.
///
/// Positive values are taken as is. Zero and negative values mean "all
/// cores plus this many", so `-1` uses every core and `-2` leaves one free.
/// The result is never below 1.
pub fn resolve_jobs(jobs: i64, available: usize) -> usize {
    if jobs > 0 {
        return jobs as usize;
    }
    let resolved = available as i64 + 1 + jobs;
    resolved.max(1) as usize
}

/// Cores visible to this process.
pub fn available_parallelism() -> usize {
    num_cpus::get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_jobs_unchanged() {
        assert_eq!(resolve_jobs(1, 8), 1);
        assert_eq!(resolve_jobs(16, 8), 16);
    }

    #[test]
    fn test_non_positive_jobs_count_from_available() {
        assert_eq!(resolve_jobs(0, 8), 9);
        assert_eq!(resolve_jobs(-1, 8), 8);
        assert_eq!(resolve_jobs(-3, 8), 6);
    }

    #[test]
    fn test_floor_at_one() {
        assert_eq!(resolve_jobs(-20, 4), 1);
        assert_eq!(resolve_jobs(-1, 0), 1);
    }

    #[test]
    fn test_available_parallelism_is_positive() {
        assert!(available_parallelism() >= 1);
    }
}
