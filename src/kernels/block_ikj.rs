use crate::matrix::Element;

/// Row-shard multiplication using i-k-j loop order.
///
/// The innermost loop walks B and C sequentially (stride 1). Indices are
/// shard-relative: row 0 of `a_block` is the first row this rank owns.
///
/// # Arguments
///
/// * `a_block` - Rows of A (rows × n), row-major
/// * `b` - Full matrix B (n × k), row-major
/// * `c_block` - Matching rows of C (rows × k), accumulated into
/// * `rows` - Rows in the shard
/// * `n` - Columns of A, rows of B
/// * `k` - Columns of B and C
///
/// # Panics
///
/// Panics if the slice sizes don't match rows, n, k.
pub fn matmul_block_ikj(
    a_block: &[Element],
    b: &[Element],
    c_block: &mut [Element],
    rows: usize,
    n: usize,
    k: usize,
) {
    assert_eq!(a_block.len(), rows * n, "A shard: expected {}x{}={} elements", rows, n, rows * n);
    assert_eq!(b.len(), n * k, "B: expected {}x{}={} elements", n, k, n * k);
    assert_eq!(c_block.len(), rows * k, "C shard: expected {}x{}={} elements", rows, k, rows * k);

    for i in 0..rows {
        let c_row = &mut c_block[i * k..(i + 1) * k];
        for p in 0..n {
            let a_ip = a_block[i * n + p];
            let b_row = &b[p * k..(p + 1) * k];
            for (c_ij, &b_pj) in c_row.iter_mut().zip(b_row) {
                *c_ij = c_ij.wrapping_add(a_ip.wrapping_mul(b_pj));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::naive_ijk::matmul_serial;

    #[test]
    fn matches_serial_on_whole_matrix() {
        let (m, n, k) = (5, 7, 3);
        let a: Vec<Element> = (0..m * n).map(|i| (i % 11) as Element).collect();
        let b: Vec<Element> = (0..n * k).map(|i| (i % 5) as Element).collect();

        let mut c_serial = vec![0; m * k];
        let mut c_block = vec![0; m * k];
        matmul_serial(&a, &b, &mut c_serial, m, n, k);
        matmul_block_ikj(&a, &b, &mut c_block, m, n, k);

        assert_eq!(c_serial, c_block);
    }
}
