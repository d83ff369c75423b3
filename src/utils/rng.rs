//! Seedable random sources for the simulated data

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Build the generator for one simulation stream.
///
/// With a seed every stream is reproducible; `stream` keeps the holder and
/// whale generators from replaying each other's draws.
pub fn simulation_rng(seed: Option<u64>, stream: u64) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
        None => StdRng::from_entropy(),
    }
}

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Random lowercase base-36 string
pub fn base36<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}
