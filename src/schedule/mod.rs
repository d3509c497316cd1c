use anyhow::Result;
use futures::future::BoxFuture;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::crawler::JobSummary;

/// Parses a human interval like "90s", "15m", "2h" or "1d". A bare number is
/// taken as seconds.
pub fn parse_interval(s: &str) -> Result<Duration> {
    let s = s.trim();
    let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) => s.split_at(pos),
        None => (s, "s"),
    };
    let value: u64 = digits
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid interval '{}'", s))?;
    if value == 0 {
        return Err(anyhow::anyhow!("interval must be positive"));
    }
    let secs = match unit.trim() {
        "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        "d" => value * 86400,
        other => return Err(anyhow::anyhow!("unknown interval unit '{}'", other)),
    };
    Ok(Duration::from_secs(secs))
}

/// Runs `run` against `state` immediately and then once per interval until
/// the token is cancelled. A failed run is logged and the schedule keeps
/// going; the next tick is not pulled forward to make up for a long run.
/// Returns the number of runs performed.
pub async fn run_on_interval<S, F>(
    every: Duration,
    cancel: &CancellationToken,
    state: &mut S,
    mut run: F,
) -> u64
where
    S: ?Sized,
    F: for<'a> FnMut(&'a mut S, u64) -> BoxFuture<'a, Result<JobSummary>>,
{
    let mut timer = tokio::time::interval(every);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut runs = 0u64;

    loop {
        tokio::select! {
            // cancellation wins when both are ready
            biased;
            _ = cancel.cancelled() => {
                info!("Schedule stopped after {} runs", runs);
                return runs;
            }
            _ = timer.tick() => {}
        }

        runs += 1;
        match run(state, runs).await {
            Ok(summary) => info!("Scheduled run {} finished, {}", runs, summary),
            Err(e) => warn!("Scheduled run {} failed: {}", runs, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::JobStatus;
    use futures::FutureExt;

    fn dummy_summary() -> JobSummary {
        JobSummary {
            status: JobStatus::Completed,
            items_collected: 0,
            pages_completed: 0,
            pages_failed: 0,
            last_error: None,
        }
    }

    #[test]
    fn test_interval_units() {
        assert_eq!(parse_interval("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_interval("15m").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_interval("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_interval("1d").unwrap(), Duration::from_secs(86400));
        assert_eq!(parse_interval("45").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn test_bad_intervals_are_rejected() {
        assert!(parse_interval("0s").is_err());
        assert!(parse_interval("5y").is_err());
        assert!(parse_interval("soon").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_immediately_then_per_tick() {
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();

        let mut count = 0u64;
        let runs = run_on_interval(Duration::from_secs(60), &cancel, &mut count, |count, n| {
            let stopper = stopper.clone();
            async move {
                *count += 1;
                if n == 3 {
                    stopper.cancel();
                }
                Ok(dummy_summary())
            }
            .boxed()
        })
        .await;

        assert_eq!(runs, 3);
        assert_eq!(count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_runs_do_not_stop_the_schedule() {
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();

        let mut state = ();
        let runs = run_on_interval(Duration::from_secs(10), &cancel, &mut state, |_, n| {
            let stopper = stopper.clone();
            async move {
                if n == 2 {
                    stopper.cancel();
                }
                Err(anyhow::anyhow!("boom"))
            }
            .boxed()
        })
        .await;

        assert_eq!(runs, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start_never_runs() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut state = ();
        let runs = run_on_interval(Duration::from_secs(10), &cancel, &mut state, |_, _| {
            async { Ok(dummy_summary()) }.boxed()
        })
        .await;
        assert_eq!(runs, 0);
    }
}
