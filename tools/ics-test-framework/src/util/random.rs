/*!
   Utilities for random value generation.
*/

use rand::Rng;

pub fn random_u32() -> u32 {
    let mut rng = rand::thread_rng();
    rng.gen()
}

/// Generate `len` random bytes, e.g. for simulated keys and addresses.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen()).collect()
}
