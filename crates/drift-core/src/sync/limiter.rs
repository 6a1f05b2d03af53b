//! Bandwidth shaping

use std::time::Instant;

use tokio::sync::Mutex;

/// Token-rate shaper around a byte stream.
///
/// After each chunk of `n` bytes, [`throttle`](RateLimiter::throttle) sleeps
/// by the difference between the target elapsed time for the bytes consumed
/// so far and the actual elapsed time. A pool-wide cap composes with
/// per-folder caps by throttling through both limiters in sequence.
#[derive(Debug)]
pub struct RateLimiter {
    /// Bytes per second; `None` disables shaping.
    cap: Option<u64>,
    state: Mutex<LimiterState>,
}

#[derive(Debug)]
struct LimiterState {
    started: Option<Instant>,
    consumed: u64,
}

impl RateLimiter {
    pub fn new(cap: Option<u64>) -> Self {
        Self {
            cap,
            state: Mutex::new(LimiterState {
                started: None,
                consumed: 0,
            }),
        }
    }

    /// Unlimited shaper; `throttle` returns immediately.
    pub fn unlimited() -> Self {
        Self::new(None)
    }

    /// Account for `n` transferred bytes, sleeping if ahead of the cap.
    pub async fn throttle(&self, n: usize) {
        let Some(cap) = self.cap else {
            return;
        };
        if cap == 0 {
            return;
        }

        let sleep_for = {
            let mut state = self.state.lock().await;
            let started = *state.started.get_or_insert_with(Instant::now);
            state.consumed += n as u64;

            let target_secs = state.consumed as f64 / cap as f64;
            let actual_secs = started.elapsed().as_secs_f64();
            if target_secs > actual_secs {
                Some(std::time::Duration::from_secs_f64(target_secs - actual_secs))
            } else {
                None
            }
        };

        if let Some(delay) = sleep_for {
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unlimited_never_sleeps() {
        let limiter = RateLimiter::unlimited();
        let start = Instant::now();
        for _ in 0..100 {
            limiter.throttle(1 << 20).await;
        }
        assert!(start.elapsed().as_millis() < 100);
    }

    #[tokio::test]
    async fn capped_stream_holds_the_rate() {
        // 100 KiB/s cap, push 30 KiB: should take roughly 300 ms.
        let limiter = RateLimiter::new(Some(100 * 1024));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.throttle(10 * 1024).await;
        }
        let elapsed = start.elapsed();
        assert!(elapsed.as_millis() >= 200, "finished too fast: {elapsed:?}");
        assert!(elapsed.as_millis() < 1_500, "finished too slow: {elapsed:?}");
    }
}
