use crate::transport::{ScriptLanguage, Transport, TransportError, ALIVE_TIMEOUT};
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

pub const DEFAULT_TRANSPORT_BUDGET: Duration = Duration::from_secs(240);
pub const DEFAULT_EXECUTION_BUDGET: Duration = Duration::from_secs(300);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const READY_SCRIPT: &str = "1+1";
pub const EXECUTION_TIMEOUT: Duration = Duration::from_secs(15);
const PROGRESS_EVERY: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessPhase {
    Transport,
    Execution,
}

impl fmt::Display for ReadinessPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessPhase::Transport => f.write_str("transport"),
            ReadinessPhase::Execution => f.write_str("execution"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReadinessConfig {
    pub transport_budget: Duration,
    pub execution_budget: Duration,
    pub poll_interval: Duration,
    pub execution_timeout: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            transport_budget: DEFAULT_TRANSPORT_BUDGET,
            execution_budget: DEFAULT_EXECUTION_BUDGET,
            poll_interval: DEFAULT_POLL_INTERVAL,
            execution_timeout: EXECUTION_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: ReadinessPhase,
    pub attempts: u32,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessReport {
    pub transport: PhaseReport,
    pub execution: PhaseReport,
}

#[derive(Debug, thiserror::Error)]
pub enum ReadinessError {
    #[error("remote {phase} readiness timed out after {elapsed:?} ({attempts} attempts): {last_error}")]
    Timeout {
        phase: ReadinessPhase,
        attempts: u32,
        elapsed: Duration,
        last_error: String,
    },
}

impl ReadinessError {
    pub fn phase(&self) -> ReadinessPhase {
        match self {
            ReadinessError::Timeout { phase, .. } => *phase,
        }
    }
}

/// Brings a freshly launched remote from "not listening" to "able to execute".
///
/// A listener can accept connections before the embedded interpreter is up, so
/// transport liveness and execution liveness are awaited as separate phases,
/// each against its own budget.
pub fn wait_until_ready<T: Transport + ?Sized>(
    transport: &T,
    config: &ReadinessConfig,
) -> Result<ReadinessReport, ReadinessError> {
    info!(
        transport_budget = ?config.transport_budget,
        execution_budget = ?config.execution_budget,
        "waiting for remote scripting endpoint"
    );
    let transport_report = wait_phase(
        ReadinessPhase::Transport,
        config.transport_budget,
        config.poll_interval,
        |remaining| {
            transport
                .check_alive_within(ALIVE_TIMEOUT.min(remaining))
                .map(|_| ())
        },
    )?;
    let execution_report = wait_phase(
        ReadinessPhase::Execution,
        config.execution_budget,
        config.poll_interval,
        |remaining| {
            transport
                .execute(
                    ScriptLanguage::Python,
                    READY_SCRIPT,
                    config.execution_timeout.min(remaining),
                )
                .map(|_| ())
        },
    )?;
    Ok(ReadinessReport {
        transport: transport_report,
        execution: execution_report,
    })
}

pub fn wait_phase<F>(
    phase: ReadinessPhase,
    budget: Duration,
    poll_interval: Duration,
    mut attempt: F,
) -> Result<PhaseReport, ReadinessError>
where
    F: FnMut(Duration) -> Result<(), TransportError>,
{
    let start = Instant::now();
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match attempt(budget.saturating_sub(start.elapsed())) {
            Ok(()) => {
                let elapsed = start.elapsed();
                info!(%phase, attempts, ?elapsed, "remote ready");
                return Ok(PhaseReport {
                    phase,
                    attempts,
                    elapsed,
                });
            }
            Err(err) => {
                let elapsed = start.elapsed();
                if elapsed >= budget {
                    info!(%phase, attempts, ?elapsed, error = %err, "remote readiness timed out");
                    return Err(ReadinessError::Timeout {
                        phase,
                        attempts,
                        elapsed,
                        last_error: err.to_string(),
                    });
                }
                if attempts == 1 || attempts % PROGRESS_EVERY == 0 {
                    info!(%phase, attempts, elapsed_secs = elapsed.as_secs(), error = %err, "remote not ready, retrying");
                }
                let remaining = budget.saturating_sub(elapsed);
                thread::sleep(poll_interval.min(remaining));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refused() -> TransportError {
        TransportError::Status {
            status: 503,
            body: "starting".to_string(),
        }
    }

    #[test]
    fn phase_succeeds_after_retries() {
        let mut calls = 0;
        let report = wait_phase(
            ReadinessPhase::Execution,
            Duration::from_secs(5),
            Duration::from_millis(1),
            |_| {
                calls += 1;
                if calls < 3 {
                    Err(refused())
                } else {
                    Ok(())
                }
            },
        )
        .expect("ready");
        assert_eq!(report.attempts, 3);
        assert_eq!(report.phase, ReadinessPhase::Execution);
    }

    #[test]
    fn phase_times_out_within_budget_plus_interval() {
        let budget = Duration::from_millis(200);
        let interval = Duration::from_millis(50);
        let start = Instant::now();
        let err = wait_phase(ReadinessPhase::Transport, budget, interval, |_| {
            Err(refused())
        })
        .expect_err("never ready");
        let elapsed = start.elapsed();
        assert_eq!(err.phase(), ReadinessPhase::Transport);
        assert!(elapsed >= budget);
        assert!(
            elapsed <= budget + interval + Duration::from_millis(100),
            "took {elapsed:?}"
        );
    }

    #[test]
    fn deadline_shrinks_with_remaining_budget() {
        let budget = Duration::from_millis(100);
        let mut deadlines = Vec::new();
        wait_phase(
            ReadinessPhase::Transport,
            budget,
            Duration::from_millis(20),
            |remaining| {
                deadlines.push(remaining);
                Err(refused())
            },
        )
        .expect_err("never ready");
        assert!(deadlines.len() >= 2);
        assert!(deadlines[0] <= budget);
        assert!(deadlines.windows(2).all(|w| w[1] < w[0]));
    }
}
