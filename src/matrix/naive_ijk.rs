use super::Element;

/// Serial baseline using i-j-k loop order.
///
/// The textbook triple loop. Every other strategy is checked against this
/// one by exact equality.
///
/// # Arguments
///
/// * `a` - Matrix A (m × n), row-major
/// * `b` - Matrix B (n × k), row-major
/// * `c` - Matrix C (m × k), row-major, accumulated into (C += A * B)
/// * `m` - Rows of A and C
/// * `n` - Columns of A, rows of B
/// * `k` - Columns of B and C
///
/// # Panics
///
/// Panics if the slice sizes don't match m, n, k.
pub fn matmul_serial(a: &[Element], b: &[Element], c: &mut [Element], m: usize, n: usize, k: usize) {
    assert_eq!(a.len(), m * n, "A: expected {}x{}={} elements", m, n, m * n);
    assert_eq!(b.len(), n * k, "B: expected {}x{}={} elements", n, k, n * k);
    assert_eq!(c.len(), m * k, "C: expected {}x{}={} elements", m, k, m * k);

    for i in 0..m {
        for j in 0..k {
            let mut acc = c[i * k + j];
            for p in 0..n {
                acc = acc.wrapping_add(a[i * n + p].wrapping_mul(b[p * k + j]));
            }
            c[i * k + j] = acc;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_into_c() {
        let a = [1, 2, 3, 4];
        let b = [5, 6, 7, 8];
        let mut c = [1, 1, 1, 1];
        matmul_serial(&a, &b, &mut c, 2, 2, 2);
        assert_eq!(c, [20, 23, 44, 51]);
    }

    #[test]
    fn overflow_wraps() {
        let a = [i32::MAX, 2];
        let b = [2, i32::MAX];
        let mut c = [0];
        matmul_serial(&a, &b, &mut c, 1, 2, 1);
        let expected = i32::MAX.wrapping_mul(2).wrapping_add(i32::MAX.wrapping_mul(2));
        assert_eq!(c[0], expected);
    }
}
