//! Job driver: initialise inputs, run one decomposition across the ranks,
//! time it, and hand the coordinator's view back to the caller.

use log::{debug, error, info};

use crate::comm::{Communicator, launch};
use crate::decomposition::{Decomposition, RemainderPolicy, Strategy};
use crate::error::{MatmulError, Result};
use crate::matrix::init::MatrixInit;
use crate::matrix::{Dims, Matrix};
use crate::timing::{Phase, TimingStats, aggregate, collect_samples};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobConfig {
    pub dims: Dims,
    pub world_size: usize,
    pub strategy: Strategy,
    pub remainder: RemainderPolicy,
    pub seed: u64,
}

impl JobConfig {
    pub fn new(dims: Dims, world_size: usize, strategy: Strategy) -> Result<Self> {
        if world_size == 0 {
            return Err(MatmulError::InvalidWorldSize(world_size));
        }
        Ok(Self {
            dims,
            world_size,
            strategy,
            remainder: RemainderPolicy::default(),
            seed: 42,
        })
    }

    pub fn with_remainder(mut self, remainder: RemainderPolicy) -> Self {
        self.remainder = remainder;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// What the coordinator knows at the end of a job.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub strategy: Strategy,
    pub world_size: usize,
    pub result: Matrix,
    pub stats: TimingStats,
    /// Raw per-rank phase time in seconds, indexed by rank.
    pub samples: Vec<f64>,
}

/// Run a job on seeded random inputs.
pub fn run_job(config: &JobConfig) -> Result<JobReport> {
    let init = MatrixInit::new(config.seed);
    execute(config, |_rank| {
        let (a, b, _c) = init.generate(config.dims);
        (a, b)
    })
}

/// Run this process's rank of a seeded job on a communicator someone else
/// set up, such as one rank of an `mpirun` launch.
///
/// Every rank calls this. The coordinator gets the report; the other ranks
/// get `None`.
pub fn run_on(comm: &dyn Communicator, config: &JobConfig) -> Result<Option<JobReport>> {
    if comm.world_size() != config.world_size {
        return Err(MatmulError::WorldSizeMismatch {
            expected: config.world_size,
            actual: comm.world_size(),
        });
    }

    let decomposition = config.strategy.build(config.remainder);
    if comm.topology().is_coordinator() {
        log_start(config, decomposition.as_ref());
    }
    let init = MatrixInit::new(config.seed);
    let view = run_rank(comm, decomposition.as_ref(), config, &|_rank| {
        let (a, b, _c) = init.generate(config.dims);
        (a, b)
    })?;
    Ok(view.map(|view| into_report(config, decomposition.as_ref(), view)))
}

/// Run a job on caller-provided inputs. Every rank works on its own copy.
pub fn run_job_with(config: &JobConfig, a: &Matrix, b: &Matrix) -> Result<JobReport> {
    let dims = crate::decomposition::dims_of(a, b)?;
    if dims != config.dims {
        return Err(MatmulError::ShapeMismatch(format!(
            "inputs are {:?}, job configured for {:?}",
            dims, config.dims
        )));
    }
    execute(config, |_rank| (a.clone(), b.clone()))
}

fn execute<I>(config: &JobConfig, inputs: I) -> Result<JobReport>
where
    I: Fn(usize) -> (Matrix, Matrix) + Sync,
{
    let decomposition = config.strategy.build(config.remainder);
    log_start(config, decomposition.as_ref());

    let outputs = launch(config.world_size, |comm| {
        run_rank(comm, decomposition.as_ref(), config, &inputs)
    })?;

    let coordinator = outputs.into_iter().flatten().next().ok_or_else(|| MatmulError::Transport {
        rank: crate::comm::COORDINATOR,
        message: "coordinator produced no report".into(),
    })?;
    Ok(into_report(config, decomposition.as_ref(), coordinator))
}

fn log_start(config: &JobConfig, decomposition: &dyn Decomposition) {
    info!(
        "{} job: {}x{} * {}x{} on {} ranks",
        decomposition.name(),
        config.dims.m,
        config.dims.n,
        config.dims.n,
        config.dims.k,
        config.world_size
    );
}

fn into_report(config: &JobConfig, decomposition: &dyn Decomposition, view: CoordinatorView) -> JobReport {
    let (result, stats, samples) = view;
    info!(
        "{} job done: min {:.6}s, max {:.6}s, avg {:.6}s",
        decomposition.name(),
        stats.min,
        stats.max,
        stats.avg
    );

    JobReport {
        strategy: config.strategy,
        world_size: config.world_size,
        result,
        stats,
        samples,
    }
}

type CoordinatorView = (Matrix, TimingStats, Vec<f64>);

fn run_rank<I>(
    comm: &dyn Communicator,
    decomposition: &dyn Decomposition,
    config: &JobConfig,
    inputs: &I,
) -> Result<Option<CoordinatorView>>
where
    I: Fn(usize) -> (Matrix, Matrix) + ?Sized,
{
    let topology = comm.topology();
    let (a, b) = inputs(topology.rank);

    // Every rank reaches the same verdict; only the coordinator reports it.
    if let Err(e) = decomposition.validate(config.dims, topology.world_size) {
        if topology.is_coordinator() {
            error!("{}", e);
        }
        return Err(e);
    }

    let phase = Phase::enter(comm)?;
    let assembled = decomposition.compute_and_assemble(comm, &a, &b)?;
    let sample = phase.exit(comm)?;
    debug!("rank {}: phase took {:.6}s", topology.rank, sample.as_secs_f64());

    let stats = aggregate(comm, sample)?;
    let samples = collect_samples(comm, sample)?;

    Ok(match (assembled, stats, samples) {
        (Some(c), Some(stats), Some(samples)) => Some((c, stats, samples)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ranks_rejected() {
        let dims = Dims::new(2, 2, 2).unwrap();
        assert!(matches!(
            JobConfig::new(dims, 0, Strategy::Serial),
            Err(MatmulError::InvalidWorldSize(0))
        ));
    }

    #[test]
    fn mismatched_inputs_rejected() {
        let dims = Dims::new(2, 2, 2).unwrap();
        let config = JobConfig::new(dims, 1, Strategy::Serial).unwrap();
        let a = Matrix::zeros(3, 2);
        let b = Matrix::zeros(2, 2);
        assert!(matches!(run_job_with(&config, &a, &b), Err(MatmulError::ShapeMismatch(_))));
    }

    #[test]
    fn seeded_job_matches_serial_product() {
        let dims = Dims::new(6, 5, 4).unwrap();
        let config = JobConfig::new(dims, 3, Strategy::RoundRobin).unwrap().with_seed(9);
        let report = run_job(&config).unwrap();

        let (a, b, _) = MatrixInit::new(9).generate(dims);
        assert_eq!(report.result, crate::matrix::multiply(&a, &b).unwrap());
        assert_eq!(report.samples.len(), 3);
    }

    #[test]
    fn run_on_reports_on_the_coordinator_only() {
        let dims = Dims::new(6, 3, 5).unwrap();
        let config = JobConfig::new(dims, 3, Strategy::RowBlock).unwrap().with_seed(5);
        let reports = launch(3, |comm| run_on(comm, &config)).unwrap();

        let (a, b, _) = MatrixInit::new(5).generate(dims);
        let report = reports[0].as_ref().unwrap();
        assert_eq!(report.result, crate::matrix::multiply(&a, &b).unwrap());
        assert_eq!(report.samples.len(), 3);
        assert!(reports[1].is_none() && reports[2].is_none());
    }

    #[test]
    fn run_on_rejects_a_communicator_of_the_wrong_size() {
        let dims = Dims::new(4, 2, 2).unwrap();
        let config = JobConfig::new(dims, 4, Strategy::Serial).unwrap();
        let err = launch(2, |comm| run_on(comm, &config)).unwrap_err();
        assert!(matches!(
            err,
            MatmulError::WorldSizeMismatch {
                expected: 4,
                actual: 2
            }
        ));
    }
}
