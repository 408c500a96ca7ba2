//! Command-line runner for distributed matrix multiplication.
//!
//! ```sh
//! distmat run --strategy row-block --ranks 4
//! distmat verify --max-ranks 4
//! mpirun -n 4 distmat run --transport mpi   # built with --features mpi
//! ```

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use distmat::report::{render_matrix, render_summary};
use distmat::{Dims, JobConfig, JobReport, MatmulError, RemainderPolicy, Strategy, multiply, run_job};

/// Exit status when the decomposition cannot split the matrix.
const EXIT_INFEASIBLE: i32 = 2;

#[derive(Parser)]
#[command(name = "distmat")]
#[command(about = "Distributed integer matrix multiplication")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Copy)]
struct Shape {
    /// Rows of A and C.
    #[arg(short, long, default_value_t = 300)]
    m: usize,
    /// Columns of A, rows of B.
    #[arg(short, long, default_value_t = 200)]
    n: usize,
    /// Columns of B and C.
    #[arg(short, long, default_value_t = 400)]
    k: usize,
    /// Seed for the random inputs.
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// Where the ranks run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Transport {
    /// One thread per rank in this process.
    Threads,
    /// One MPI process per rank; the world size comes from `mpirun`.
    Mpi,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one job and print its timings.
    Run {
        #[command(flatten)]
        shape: Shape,
        /// Number of ranks. Ignored under MPI.
        #[arg(short, long, default_value_t = 4)]
        ranks: usize,
        #[arg(short, long, value_enum, default_value_t = Transport::Threads)]
        transport: Transport,
        #[arg(short, long, value_enum, default_value_t = Strategy::RowBlock)]
        strategy: Strategy,
        /// How row-block handles rows that don't divide evenly.
        #[arg(long, value_enum, default_value_t = RemainderPolicy::Reject)]
        remainder: RemainderPolicy,
        /// Also print every cell of C.
        #[arg(long)]
        print_matrix: bool,
    },
    /// Run every strategy for 1..=max-ranks and check they match the serial result.
    Verify {
        #[command(flatten)]
        shape: Shape,
        #[arg(long, default_value_t = 4)]
        max_ranks: usize,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

/// 2 when the decomposition cannot split the matrix, 1 for anything else.
fn exit_code(e: &anyhow::Error) -> i32 {
    match e.downcast_ref::<MatmulError>() {
        Some(err) if err.is_infeasible() => EXIT_INFEASIBLE,
        _ => 1,
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run {
            shape,
            ranks,
            transport,
            strategy,
            remainder,
            print_matrix,
        } => {
            let dims = Dims::new(shape.m, shape.n, shape.k)?;
            let report = match transport {
                Transport::Threads => {
                    let config = JobConfig::new(dims, ranks, strategy)?
                        .with_remainder(remainder)
                        .with_seed(shape.seed);
                    Some(run_job(&config)?)
                }
                Transport::Mpi => run_mpi(dims, strategy, remainder, shape.seed)?,
            };

            // Under MPI only the coordinator has a report to print.
            if let Some(report) = report {
                if print_matrix {
                    print!("{}", render_matrix(&report.result));
                }
                println!();
                print!("{}", render_summary(&report));
            }
            Ok(())
        }
        Commands::Verify { shape, max_ranks } => verify(shape, max_ranks),
    }
}

#[cfg(feature = "mpi")]
fn run_mpi(dims: Dims, strategy: Strategy, remainder: RemainderPolicy, seed: u64) -> Result<Option<JobReport>> {
    use distmat::comm::{Communicator, MpiComm};

    let comm = MpiComm::init()?;
    let config = JobConfig::new(dims, comm.world_size(), strategy)?
        .with_remainder(remainder)
        .with_seed(seed);
    Ok(distmat::run_on(&comm, &config)?)
}

#[cfg(not(feature = "mpi"))]
fn run_mpi(_dims: Dims, _strategy: Strategy, _remainder: RemainderPolicy, _seed: u64) -> Result<Option<JobReport>> {
    Err(MatmulError::TransportUnavailable("built without the `mpi` feature".into()).into())
}

fn verify(shape: Shape, max_ranks: usize) -> Result<()> {
    let dims = Dims::new(shape.m, shape.n, shape.k)?;
    let (a, b, _) = distmat::matrix::init::MatrixInit::new(shape.seed).generate(dims);
    let expected = multiply(&a, &b)?;

    let mut checked = 0;
    for ranks in 1..=max_ranks {
        for strategy in Strategy::ALL {
            let config = JobConfig::new(dims, ranks, strategy)?.with_seed(shape.seed);
            let report = match run_job(&config) {
                Ok(report) => report,
                Err(e) if e.is_infeasible() => {
                    println!("{:>12} x{}: skipped ({})", strategy, ranks, e);
                    continue;
                }
                Err(e) => return Err(e).with_context(|| format!("{} on {} ranks", strategy, ranks)),
            };
            if report.result != expected {
                bail!("{} on {} ranks disagrees with the serial result", strategy, ranks);
            }
            println!("{:>12} x{}: ok (max {:.6}s)", strategy, ranks, report.stats.max);
            checked += 1;
        }
    }
    println!("\n{} runs match the serial result.", checked);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infeasible_jobs_exit_with_2() {
        let too_few = anyhow::Error::from(MatmulError::TooFewRows { rows: 2, world_size: 4 });
        let uneven = anyhow::Error::from(MatmulError::UnevenRows {
            rows: 4,
            world_size: 3,
            remainder: 1,
        });
        assert_eq!(exit_code(&too_few), EXIT_INFEASIBLE);
        assert_eq!(exit_code(&uneven), EXIT_INFEASIBLE);
    }

    #[test]
    fn other_failures_exit_with_1() {
        let transport = anyhow::Error::from(MatmulError::Transport {
            rank: 1,
            message: "hung up".into(),
        });
        assert_eq!(exit_code(&transport), 1);
        assert_eq!(exit_code(&anyhow::anyhow!("not a job error")), 1);
    }

    #[test]
    fn context_does_not_hide_infeasibility() {
        let err: Result<()> = Err(MatmulError::TooFewRows { rows: 1, world_size: 2 }.into());
        let err = err.context("row-block on 2 ranks").unwrap_err();
        assert_eq!(exit_code(&err), EXIT_INFEASIBLE);
    }

    #[test]
    fn infeasible_run_maps_to_exit_2_end_to_end() {
        let cli = Cli::parse_from(["distmat", "run", "-m", "2", "-n", "2", "-k", "2", "--ranks", "4"]);
        let err = dispatch(cli).unwrap_err();
        assert_eq!(exit_code(&err), EXIT_INFEASIBLE);
    }

    #[cfg(not(feature = "mpi"))]
    #[test]
    fn mpi_transport_needs_the_feature() {
        let cli = Cli::parse_from(["distmat", "run", "--transport", "mpi"]);
        let err = dispatch(cli).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MatmulError>(),
            Some(MatmulError::TransportUnavailable(_))
        ));
        assert_eq!(exit_code(&err), 1);
    }
}
