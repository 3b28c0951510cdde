//! Fixed-interval polling loop.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, info};

/// Runs a cycle, waits, and repeats until shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poller {
    interval: Duration,
}

impl Poller {
    /// Creates a poller waiting `interval` between the end of one cycle and
    /// the start of the next.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Delay between cycles.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs `cycle` immediately and then after every interval until
    /// `shutdown` resolves. Returns the number of cycles started.
    ///
    /// A cycle in progress is allowed to finish; shutdown is observed while
    /// waiting. A failed cycle is logged and retried on the next tick.
    pub async fn run_until<S, F, Fut, E>(&self, shutdown: S, mut cycle: F) -> usize
    where
        S: Future<Output = ()>,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        tokio::pin!(shutdown);
        let mut cycles = 0;

        loop {
            cycles += 1;
            debug!(cycle = cycles, "Starting poll cycle");
            if let Err(e) = cycle().await {
                error!(cycle = cycles, error = %e, "Poll cycle failed, retrying next interval");
            }

            tokio::select! {
                () = &mut shutdown => {
                    info!(cycles, "Shutdown requested, stopping poller");
                    return cycles;
                }
                () = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
