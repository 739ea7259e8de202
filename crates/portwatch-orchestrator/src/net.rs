//! Network throughput sampling
//!
//! Sums per-interface byte counters across one refresh interval into a
//! single up/down rate for the broadcast snapshot.

use portwatch_core::types::NetSpeed;
use std::time::Instant;
use sysinfo::Networks;

pub struct NetSampler {
    networks: Networks,
    last_sampled: Instant,
}

impl NetSampler {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
            last_sampled: Instant::now(),
        }
    }

    /// Refresh interface counters and compute the rate since the previous
    /// sample.
    pub fn sample(&mut self) -> NetSpeed {
        self.networks.refresh(true);
        let now = Instant::now();
        let dt = now.duration_since(self.last_sampled).as_secs_f64().max(0.001);
        self.last_sampled = now;

        let mut up = 0u64;
        let mut down = 0u64;
        for (_, data) in self.networks.iter() {
            up += data.transmitted();
            down += data.received();
        }

        NetSpeed {
            up_bytes_per_sec: (up as f64 / dt) as u64,
            down_bytes_per_sec: (down as f64 / dt) as u64,
        }
    }
}

impl Default for NetSampler {
    fn default() -> Self {
        Self::new()
    }
}
