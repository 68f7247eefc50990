//! The Fibonacci recurrence computed by the worker.
//!
//! Indexing starts at one: `fib(0) = 1`, `fib(1) = 1`,
//! `fib(n) = fib(n - 1) + fib(n - 2)`. Values are exchanged as decimal
//! text so the cache never depends on a fixed-width integer.

use crate::Index;

/// Compute the Fibonacci number at `index`.
pub fn fib(index: Index) -> u128 {
    let (mut a, mut b) = (1u128, 1u128);
    for _ in 2..=index.value() {
        (a, b) = (b, a + b);
    }
    b
}

/// The cache representation of `fib(index)`.
pub fn computed_value(index: Index) -> String {
    fib(index).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(n: i64) -> u128 {
        fib(Index::new(n).unwrap())
    }

    #[test]
    fn base_cases() {
        assert_eq!(at(0), 1);
        assert_eq!(at(1), 1);
    }

    #[test]
    fn small_indices() {
        let expected = [1, 1, 2, 3, 5, 8, 13, 21];
        for (n, want) in expected.iter().enumerate() {
            assert_eq!(at(n as i64), *want, "fib({n})");
        }
    }

    #[test]
    fn larger_indices() {
        assert_eq!(at(10), 89);
        assert_eq!(at(15), 987);
        assert_eq!(at(20), 10946);
    }

    #[test]
    fn maximum_index() {
        assert_eq!(at(40), 165_580_141);
    }

    #[test]
    fn computed_value_is_decimal_text() {
        assert_eq!(computed_value(Index::new(7).unwrap()), "21");
    }
}
