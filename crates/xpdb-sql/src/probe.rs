//! "Is a SQL server of this dialect listening on host:port?"
//!
//! A throwaway connection with an empty user name is attempted. Reaching the
//! backend's authentication stage proves the dialect; any other failure means
//! something else answered. Attempts that time out are retried with a budget
//! growing by two seconds each time, until the budget reaches the ceiling.

use std::future::Future;
use std::time::Duration;

use crate::dialect::Dialect;

/// First attempt budget, and the increment after each timed-out attempt
pub const PROBE_STEP: Duration = Duration::from_secs(2);

/// Result of one probe attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The backend answered as the probed dialect
    Confirmed,
    /// Something answered, but not the probed dialect
    Foreign,
    /// No answer within the attempt budget
    TimedOut,
}

/// Run attempts with a growing budget until one is conclusive or the budget
/// reaches `ceiling`
pub async fn probe_with<F, Fut>(ceiling: Duration, mut attempt: F) -> bool
where
    F: FnMut(Duration) -> Fut,
    Fut: Future<Output = ProbeOutcome>,
{
    let mut budget = PROBE_STEP;
    while budget < ceiling {
        match attempt(budget).await {
            ProbeOutcome::Confirmed => return true,
            ProbeOutcome::Foreign => return false,
            ProbeOutcome::TimedOut => {
                tracing::debug!(budget_ms = budget.as_millis() as u64, "probe attempt timed out");
                budget += PROBE_STEP;
            }
        }
    }
    false
}

async fn attempt(dialect: Dialect, host: &str, port: u16, budget: Duration) -> ProbeOutcome {
    let connect = async {
        match dialect {
            #[cfg(feature = "postgres")]
            Dialect::Postgres => crate::postgres::probe(host, port).await,
            #[cfg(feature = "mysql")]
            Dialect::MySql => crate::mysql::probe(host, port).await,
            #[allow(unreachable_patterns)]
            _ => ProbeOutcome::Foreign,
        }
    };
    tokio::time::timeout(budget, connect)
        .await
        .unwrap_or(ProbeOutcome::TimedOut)
}

/// Whether a server of `dialect` listens on `host:port` (the dialect's
/// default port when `None`)
pub async fn is_sql_connection(
    host: &str,
    port: Option<u16>,
    timeout: Duration,
    dialect: Dialect,
) -> bool {
    let port = port.unwrap_or_else(|| dialect.default_port());
    let found = probe_with(timeout, |budget| attempt(dialect, host, port, budget)).await;
    tracing::debug!(host, port, %dialect, found, "dialect probe finished");
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_confirmed_first_attempt() {
        let mut calls = Vec::new();
        let found = probe_with(Duration::from_secs(10), |budget| {
            calls.push(budget);
            async { ProbeOutcome::Confirmed }
        })
        .await;
        assert!(found);
        assert_eq!(calls, vec![Duration::from_secs(2)]);
    }

    #[tokio::test]
    async fn test_foreign_stops_immediately() {
        let mut count = 0;
        let found = probe_with(Duration::from_secs(10), |_| {
            count += 1;
            async { ProbeOutcome::Foreign }
        })
        .await;
        assert!(!found);
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_timeouts_grow_budget_until_ceiling() {
        let mut calls = Vec::new();
        let found = probe_with(Duration::from_secs(8), |budget| {
            calls.push(budget);
            async { ProbeOutcome::TimedOut }
        })
        .await;
        assert!(!found);
        assert_eq!(
            calls,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(6)
            ]
        );
    }

    #[tokio::test]
    async fn test_retry_then_confirm() {
        let mut n = 0;
        let found = probe_with(Duration::from_secs(30), |_| {
            n += 1;
            let outcome = if n < 3 {
                ProbeOutcome::TimedOut
            } else {
                ProbeOutcome::Confirmed
            };
            async move { outcome }
        })
        .await;
        assert!(found);
        assert_eq!(n, 3);
    }

    #[tokio::test]
    async fn test_ceiling_below_first_step() {
        let found = probe_with(Duration::from_secs(1), |_| async { ProbeOutcome::Confirmed }).await;
        assert!(!found);
    }
}
