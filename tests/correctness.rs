use distmat::comm::Topology;
use distmat::decomposition::{Decomposition, RoundRobin, RowBlock};
use distmat::kernels::Region;
use distmat::matrix::init::MatrixInit;
use distmat::{
    Dims, JobConfig, MatmulError, Matrix, RemainderPolicy, Strategy, multiply, multiply_distributed, run_job,
    run_job_with,
};

fn fixture() -> (Matrix, Matrix, Matrix) {
    let a = Matrix::from_rows(&[[1, 2], [3, 4], [5, 6], [7, 8]]);
    let b = Matrix::from_rows(&[[1, 0, 1, 0], [0, 1, 0, 1]]);
    let c = Matrix::from_rows(&[[1, 2, 1, 2], [3, 4, 3, 4], [5, 6, 5, 6], [7, 8, 7, 8]]);
    (a, b, c)
}

fn assert_matrices_equal(expected: &Matrix, actual: &Matrix, name: &str) {
    assert_eq!(
        (expected.rows(), expected.cols()),
        (actual.rows(), actual.cols()),
        "{}: shape mismatch",
        name
    );
    for i in 0..expected.rows() {
        for j in 0..expected.cols() {
            assert_eq!(
                expected.get(i, j),
                actual.get(i, j),
                "{}: mismatch at ({}, {})",
                name,
                i,
                j
            );
        }
    }
}

// ============================================================
// End-to-end scenario
// ============================================================

#[test]
fn test_fixture_serial() {
    let (a, b, expected) = fixture();
    assert_matrices_equal(&expected, &multiply(&a, &b).unwrap(), "serial");
}

#[test]
fn test_fixture_every_strategy() {
    let (a, b, expected) = fixture();

    for ranks in [1, 2, 4] {
        for strategy in Strategy::ALL {
            let c = multiply_distributed(&a, &b, ranks, strategy).unwrap();
            assert_matrices_equal(&expected, &c, &format!("{}_x{}", strategy, ranks));
        }
    }
}

// ============================================================
// Cross-strategy equivalence
// ============================================================

#[test]
fn test_strategies_match_serial_on_seeded_inputs() {
    // 12 rows divide evenly for 1..=4 ranks.
    let dims = Dims::new(12, 7, 9).unwrap();

    for seed in [1, 42, 2024] {
        let (a, b, _) = MatrixInit::new(seed).generate(dims);
        let expected = multiply(&a, &b).unwrap();

        for ranks in 1..=4 {
            for strategy in Strategy::ALL {
                let config = JobConfig::new(dims, ranks, strategy).unwrap().with_seed(seed);
                let report = run_job(&config).unwrap();
                assert_matrices_equal(
                    &expected,
                    &report.result,
                    &format!("seed_{}_{}_x{}", seed, strategy, ranks),
                );
            }
        }
    }
}

#[test]
fn test_overflow_wraps_identically() {
    let dims = Dims::new(4, 3, 5).unwrap();
    let a = Matrix::from_vec(4, 3, [i32::MAX, i32::MIN, 1_000_000_007].repeat(4)).unwrap();
    let b = Matrix::from_vec(3, 5, (0..15).map(|i| i32::MAX - i).collect()).unwrap();
    let expected = multiply(&a, &b).unwrap();

    for ranks in [1, 2, 4] {
        for strategy in Strategy::ALL {
            let config = JobConfig::new(dims, ranks, strategy).unwrap();
            let report = run_job_with(&config, &a, &b).unwrap();
            assert_matrices_equal(&expected, &report.result, &format!("overflow_{}_x{}", strategy, ranks));
        }
    }
}

#[test]
fn test_round_robin_more_ranks_than_columns() {
    // Ranks 2 and 3 own no columns at all.
    let a = Matrix::from_rows(&[[1, 2], [3, 4], [5, 6]]);
    let b = Matrix::from_rows(&[[1, 1], [2, 3]]);
    let c = multiply_distributed(&a, &b, 4, Strategy::RoundRobin).unwrap();
    assert_matrices_equal(&multiply(&a, &b).unwrap(), &c, "round_robin_sparse");
}

// ============================================================
// Coverage
// ============================================================

#[test]
fn test_round_robin_coverage() {
    let dims = Dims::new(5, 3, 11).unwrap();

    for w in 1..=4 {
        let regions: Vec<Region> = (0..w)
            .map(|r| RoundRobin.owned_region(Topology::new(r, w).unwrap(), dims).unwrap())
            .collect();
        for i in 0..dims.m {
            for j in 0..dims.k {
                let owners: Vec<usize> = (0..w).filter(|&r| regions[r].contains(i, j)).collect();
                assert_eq!(owners, vec![j % w], "cell ({}, {}) with {} ranks", i, j, w);
            }
        }
        let total: usize = regions.iter().map(|r| r.len(dims)).sum();
        assert_eq!(total, dims.m * dims.k);
    }
}

#[test]
fn test_row_block_coverage_divisible() {
    let dims = Dims::new(12, 2, 3).unwrap();

    for w in [1, 2, 3, 4] {
        let mut rows = Vec::new();
        for r in 0..w {
            let region = RowBlock::default().owned_region(Topology::new(r, w).unwrap(), dims).unwrap();
            assert_eq!(
                region,
                Region::RowRange {
                    start: r * dims.m / w,
                    end: (r + 1) * dims.m / w
                }
            );
            rows.extend(region.cells(dims).map(|(i, _)| i));
        }
        rows.dedup();
        assert_eq!(rows, (0..dims.m).collect::<Vec<_>>(), "{} ranks", w);
    }
}

// ============================================================
// Row-block remainder and infeasibility
// ============================================================

#[test]
fn test_uneven_rows_rejected() {
    let (a, b, _) = fixture();
    let config = JobConfig::new(Dims::new(4, 2, 4).unwrap(), 3, Strategy::RowBlock).unwrap();

    let err = run_job_with(&config, &a, &b).unwrap_err();
    assert!(matches!(
        err,
        MatmulError::UnevenRows {
            rows: 4,
            world_size: 3,
            remainder: 1
        }
    ));
}

#[test]
fn test_uneven_rows_assigned_to_last_rank() {
    let (a, b, expected) = fixture();
    let config = JobConfig::new(Dims::new(4, 2, 4).unwrap(), 3, Strategy::RowBlock)
        .unwrap()
        .with_remainder(RemainderPolicy::LastRank);

    let report = run_job_with(&config, &a, &b).unwrap();
    // Row 3 is the leftover row; it must be present, not zero.
    assert_eq!(report.result.row(3), &[7, 8, 7, 8]);
    assert_matrices_equal(&expected, &report.result, "last_rank_remainder");
}

#[test]
fn test_too_few_rows_aborts() {
    let a = Matrix::from_rows(&[[1, 2], [3, 4]]);
    let b = Matrix::from_rows(&[[1, 0], [0, 1]]);
    let config = JobConfig::new(Dims::new(2, 2, 2).unwrap(), 4, Strategy::RowBlock).unwrap();

    match run_job_with(&config, &a, &b) {
        Err(MatmulError::TooFewRows { rows, world_size }) => {
            assert_eq!((rows, world_size), (2, 4));
        }
        Err(other) => panic!("expected TooFewRows, got {}", other),
        Ok(report) => panic!("expected abort, got a {}x{} result", report.result.rows(), report.result.cols()),
    }
}

#[test]
fn test_too_few_rows_only_affects_row_block() {
    let a = Matrix::from_rows(&[[1, 2], [3, 4]]);
    let b = Matrix::from_rows(&[[1, 0], [0, 1]]);
    for strategy in [Strategy::Serial, Strategy::RoundRobin] {
        let c = multiply_distributed(&a, &b, 4, strategy).unwrap();
        assert_matrices_equal(&a, &c, &format!("identity_{}", strategy));
    }
}

// ============================================================
// Timing
// ============================================================

#[test]
fn test_timing_monotonicity() {
    let dims = Dims::new(12, 16, 16).unwrap();

    for ranks in 1..=4 {
        for strategy in Strategy::ALL {
            let report = run_job(&JobConfig::new(dims, ranks, strategy).unwrap()).unwrap();
            let stats = report.stats;
            assert!(stats.min >= 0.0);
            assert!(
                stats.min <= stats.avg && stats.avg <= stats.max,
                "{} x{}: {:?}",
                strategy,
                ranks,
                stats
            );
            assert_eq!(report.samples.len(), ranks);
            assert!(report.samples.iter().all(|&s| stats.min <= s && s <= stats.max));
        }
    }
}
