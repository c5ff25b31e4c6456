//! Segmented Sieve Engine
//!
//! Stateless prime computation shared by both sides of the protocol. The
//! coordinator bootstraps base primes over `[2, isqrt(N)]` once with
//! `simple_sieve`; workers then resolve any assigned block with
//! `sieve_segment` using those base primes, without restarting from 2.

/// Integer square root, rounded down.
pub fn isqrt(n: u64) -> u64 {
    if n < 2 {
        return n;
    }
    let mut x = (n as f64).sqrt() as u64;
    while x.checked_mul(x).is_none_or(|sq| sq > n) {
        x -= 1;
    }
    while (x + 1).checked_mul(x + 1).is_some_and(|sq| sq <= n) {
        x += 1;
    }
    x
}

/// Plain sieve of Eratosthenes over `[2, limit]`. Only used to bootstrap
/// the base primes, so `limit` is at most the square root of the range end.
pub fn simple_sieve(limit: u64) -> Vec<u64> {
    if limit < 2 {
        return Vec::new();
    }

    let n = limit as usize;
    let mut is_prime = vec![true; n + 1];
    let mut p = 2usize;
    while p * p <= n {
        if is_prime[p] {
            let mut m = p * p;
            while m <= n {
                is_prime[m] = false;
                m += p;
            }
        }
        p += 1;
    }

    (2..=n).filter(|&i| is_prime[i]).map(|i| i as u64).collect()
}

/// Finds all primes in `[lo, hi]` by marking multiples of the given base
/// primes, which must cover every prime up to the square root of `hi`.
///
/// Marking starts at `max(p*p, first multiple of p >= lo)`: composites
/// below `p*p` carry a smaller base prime as a factor and are marked by
/// that prime's pass. A `lo` below 2 is clamped to 2.
pub fn sieve_segment(base_primes: &[u64], lo: u64, hi: u64) -> Vec<u64> {
    let lo = lo.max(2);
    if hi < lo {
        return Vec::new();
    }

    let size = (hi - lo + 1) as usize;
    let mut is_prime = vec![true; size];

    for &p in base_primes {
        if p * p > hi {
            break;
        }

        let first = lo.div_ceil(p) * p;
        let mut m = first.max(p * p);
        while m <= hi {
            is_prime[(m - lo) as usize] = false;
            m += p;
        }
    }

    (lo..=hi).filter(|&v| is_prime[(v - lo) as usize]).collect()
}

/// Cheap integrity check carried alongside a block result: the wrapping
/// sum of the primes found. Lets the coordinator match duplicate submits
/// without recomputing the block.
pub fn checksum(primes: &[u64]) -> u64 {
    primes.iter().fold(0u64, |acc, &p| acc.wrapping_add(p))
}
