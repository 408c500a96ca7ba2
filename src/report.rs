//! Plain-text rendering of a finished job.

use std::fmt::Write;

use crate::job::JobReport;
use crate::matrix::Matrix;

/// Timing summary followed by one line per rank.
pub fn render_summary(report: &JobReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Strategy: {} on {} ranks", report.strategy, report.world_size);
    let _ = writeln!(out, "Min computation time: {:.6}", report.stats.min);
    let _ = writeln!(out, "Max computation time: {:.6}", report.stats.max);
    let _ = writeln!(out, "Avg computation time: {:.6}", report.stats.avg);
    out.push('\n');
    for (rank, secs) in report.samples.iter().enumerate() {
        let _ = writeln!(out, "Process {} computation time: {:.6}", rank, secs);
    }
    out
}

/// Every cell as `c[i][j]:value`, one per line.
pub fn render_matrix(c: &Matrix) -> String {
    let mut out = String::new();
    for i in 0..c.rows() {
        for (j, v) in c.row(i).iter().enumerate() {
            let _ = writeln!(out, "c[{}][{}]:{}", i, j, v);
        }
    }
    out
}
