//! Thread scheduler (spec.md §4.10, C7).
//!
//! Default is round-robin within a core, core index outer, matching
//! spec.md's description. `--random` scheduling (SPEC_FULL §B) substitutes
//! a seeded PRNG for exposing concurrency bugs in guest software, seeded
//! from wall-clock time the same way the original seeds from
//! `current_time_us()`.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

enum Policy {
    RoundRobin { next: usize },
    Random { rng: SmallRng },
}

pub struct Scheduler {
    policy: Policy,
    #[allow(dead_code)]
    num_cores: usize,
    #[allow(dead_code)]
    threads_per_core: usize,
}

impl Scheduler {
    pub fn new(num_cores: usize, threads_per_core: usize, randomize: bool, seed: u64) -> Self {
        let policy = if randomize {
            Policy::Random {
                rng: SmallRng::seed_from_u64(seed),
            }
        } else {
            Policy::RoundRobin { next: 0 }
        };
        Self {
            policy,
            num_cores,
            threads_per_core,
        }
    }

    /// Pick the next thread to step from `runnable` (global thread
    /// indices, core-major order already baked in by the caller). Returns
    /// `None` if `runnable` is empty.
    pub fn next_thread(&mut self, runnable: &[usize]) -> Option<usize> {
        if runnable.is_empty() {
            return None;
        }
        match &mut self.policy {
            Policy::RoundRobin { next } => {
                let chosen = runnable[*next % runnable.len()];
                *next = next.wrapping_add(1);
                Some(chosen)
            }
            Policy::Random { rng } => {
                let idx = rng.gen_range(0..runnable.len());
                Some(runnable[idx])
            }
        }
    }
}
