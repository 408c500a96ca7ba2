//! Property tests: every decomposition agrees with the serial kernel
//! bit for bit, for any shape, any rank count, and any i32 inputs.

use distmat::{Dims, JobConfig, Matrix, RemainderPolicy, multiply, run_job_with};
use proptest::prelude::*;

/// Shape, rank count, and inputs drawn from the full i32 range so products overflow.
fn job_inputs() -> impl Strategy<Value = (usize, Matrix, Matrix)> {
    (1usize..8, 1usize..6, 1usize..8, 1usize..6).prop_flat_map(|(m, n, k, ranks)| {
        (
            Just(ranks),
            prop::collection::vec(any::<i32>(), m * n),
            prop::collection::vec(any::<i32>(), n * k),
        )
            .prop_map(move |(ranks, a, b)| {
                (
                    ranks,
                    Matrix::from_vec(m, n, a).unwrap(),
                    Matrix::from_vec(n, k, b).unwrap(),
                )
            })
    })
}

fn dims(a: &Matrix, b: &Matrix) -> Dims {
    Dims::new(a.rows(), a.cols(), b.cols()).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn round_robin_matches_serial((ranks, a, b) in job_inputs()) {
        let config = JobConfig::new(dims(&a, &b), ranks, distmat::Strategy::RoundRobin).unwrap();
        let report = run_job_with(&config, &a, &b).unwrap();
        prop_assert_eq!(report.result, multiply(&a, &b).unwrap());
    }

    #[test]
    fn row_block_matches_serial_or_refuses((ranks, a, b) in job_inputs()) {
        let config = JobConfig::new(dims(&a, &b), ranks, distmat::Strategy::RowBlock)
            .unwrap()
            .with_remainder(RemainderPolicy::LastRank);

        match run_job_with(&config, &a, &b) {
            Ok(report) => prop_assert_eq!(report.result, multiply(&a, &b).unwrap()),
            Err(e) => {
                prop_assert!(e.is_infeasible());
                prop_assert!(a.rows() < ranks);
            }
        }
    }

    #[test]
    fn timing_stats_are_ordered((ranks, a, b) in job_inputs()) {
        let config = JobConfig::new(dims(&a, &b), ranks, distmat::Strategy::Serial).unwrap();
        let stats = run_job_with(&config, &a, &b).unwrap().stats;
        prop_assert!(stats.min <= stats.avg);
        prop_assert!(stats.avg <= stats.max);
    }
}
