//! Cancellable watch loop for the unattended commands.
//!
//! The original behavior is "run the pass, sleep five minutes, repeat until
//! killed". The loop here keeps that shape but sleeps in short slices while
//! polling a cancellation token, so a Ctrl+C lands within a quarter second
//! instead of at the end of the pause.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::Result;
use tracing::{error, info};

const POLL_SLICE: Duration = Duration::from_millis(250);

/// Shared cancellation flag, cloned into signal handlers.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Run `pass` repeatedly with `interval` between the end of one pass and the
/// start of the next, until the token is cancelled.
///
/// A failing pass is logged and does not stop the loop: new videos keep
/// arriving whether or not the last pass liked what it found.
pub fn run_watch(
    interval: Duration,
    token: &CancelToken,
    mut pass: impl FnMut() -> Result<()>,
) -> Result<()> {
    loop {
        if token.is_cancelled() {
            info!("watch loop cancelled");
            return Ok(());
        }

        if let Err(err) = pass() {
            error!("watch pass failed: {err:?}");
        }

        let deadline = Instant::now() + interval;
        loop {
            if token.is_cancelled() {
                info!("watch loop cancelled");
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(POLL_SLICE.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_token_stops_before_the_first_pass() {
        let token = CancelToken::new();
        token.cancel();

        let mut runs = 0;
        run_watch(Duration::from_millis(1), &token, || {
            runs += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(runs, 0);
    }

    #[test]
    fn loop_stops_promptly_after_cancel() {
        let token = CancelToken::new();
        let cancel = token.clone();

        let mut runs = 0;
        run_watch(Duration::from_secs(60), &token, move || {
            runs += 1;
            cancel.cancel();
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn failing_passes_do_not_stop_the_loop() {
        let token = CancelToken::new();
        let cancel = token.clone();

        let mut runs = 0;
        run_watch(Duration::from_millis(1), &token, move || {
            runs += 1;
            if runs >= 3 {
                cancel.cancel();
            }
            anyhow::bail!("pass exploded")
        })
        .unwrap();
    }
}
