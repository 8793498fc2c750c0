//! Bounded-parallel fan-out of one operation over many hosts
//!
//! Every host gets its own tokio task; a semaphore caps how many run at once.
//! A failing host never aborts the others, and results come back in input
//! order.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::error::CoreError;

/// The default number of hosts contacted in parallel
pub const DEFAULT_MAX_PARALLELISM: usize = 16;

/// Result of running the fan-out operation against one host
#[derive(Debug)]
pub struct HostOutcome<T> {
    /// Host the operation ran against
    pub host: String,
    /// What the operation returned
    pub result: Result<T, CoreError>,
}

impl<T> HostOutcome<T> {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs an operation over a set of hosts with bounded parallelism
#[derive(Debug, Clone, Copy)]
pub struct PoolFanout {
    parallelism: usize,
}

impl Default for PoolFanout {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PARALLELISM)
    }
}

impl PoolFanout {
    /// A fan-out running at most `parallelism` operations at once
    /// (a value of zero is treated as one)
    #[must_use]
    pub fn new(parallelism: usize) -> Self {
        Self {
            parallelism: parallelism.max(1),
        }
    }

    #[must_use]
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Run `op` once per host and collect one outcome per host, in input order
    ///
    /// # Panics
    /// Resumes the panic of any operation that panicked
    pub async fn run_all<T, F, Fut>(&self, hosts: Vec<String>, op: F) -> Vec<HostOutcome<T>>
    where
        T: Send + 'static,
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, CoreError>> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut set = JoinSet::new();

        for (index, host) in hosts.iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let operation = op(host.clone());
            set.spawn(async move {
                // Hold onto the permit until the operation finishes; the
                // semaphore is never closed
                let _permit = semaphore.acquire_owned().await;
                (index, operation.await)
            });
        }

        debug!(hosts = hosts.len(), parallelism = self.parallelism, "fan-out started");

        let mut results: Vec<Option<Result<T, CoreError>>> = hosts.iter().map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => debug!(error = %e, "fan-out task cancelled"),
            }
        }

        hosts
            .into_iter()
            .zip(results)
            .map(|(host, result)| HostOutcome {
                result: result.unwrap_or_else(|| {
                    Err(CoreError::ActorError(format!("task for host {host} was cancelled")))
                }),
                host,
            })
            .collect()
    }
}

/// Split outcomes into successes, or fail naming every host that failed
///
/// # Errors
/// Returns `CoreError::GetPoolUpdatesFailed` if any host failed
pub fn all_succeeded<T>(outcomes: Vec<HostOutcome<T>>) -> Result<Vec<(String, T)>, CoreError> {
    let mut succeeded = Vec::with_capacity(outcomes.len());
    let mut failed = Vec::new();

    for outcome in outcomes {
        match outcome.result {
            Ok(value) => succeeded.push((outcome.host, value)),
            Err(e) => {
                tracing::warn!(host = %outcome.host, error = %e, "host failed during pool operation");
                failed.push(outcome.host);
            }
        }
    }

    if failed.is_empty() {
        Ok(succeeded)
    } else {
        Err(CoreError::GetPoolUpdatesFailed { hosts: failed })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    fn hosts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("host-{i}")).collect()
    }

    #[tokio::test]
    async fn test_one_failing_host_does_not_abort_others() {
        let fanout = PoolFanout::new(4);

        let outcomes = fanout
            .run_all(hosts(10), |host| async move {
                if host == "host-3" {
                    Err(CoreError::HostNotFound(host))
                } else {
                    Ok(host.len())
                }
            })
            .await;

        assert_eq!(outcomes.len(), 10);
        let failed: Vec<_> = outcomes.iter().filter(|o| !o.is_ok()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].host, "host-3");
    }

    #[tokio::test]
    async fn test_results_in_input_order() {
        let fanout = PoolFanout::default();

        let outcomes = fanout
            .run_all(hosts(8), |host| async move {
                // Later hosts finish first
                let index: u64 = host.trim_start_matches("host-").parse().unwrap();
                tokio::time::sleep(Duration::from_millis(40 - index * 5)).await;
                Ok(index)
            })
            .await;

        let order: Vec<u64> = outcomes.into_iter().map(|o| o.result.unwrap()).collect();
        assert_eq!(order, (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_never_exceeds_parallelism() {
        let limit = 3;
        let fanout = PoolFanout::new(limit);
        let running = Arc::new(AtomicUsize::new(0));

        let outcomes = fanout
            .run_all(hosts(limit * 10), |_host| {
                let running = Arc::clone(&running);
                async move {
                    let watermark = running.fetch_add(1, Ordering::SeqCst) + 1;
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(watermark)
                }
            })
            .await;

        for outcome in outcomes {
            let watermark = outcome.result.unwrap();
            assert!(watermark <= limit, "{} saw {watermark} concurrent ops", outcome.host);
        }
    }

    #[tokio::test]
    #[should_panic(expected = "boom")]
    async fn test_panic_is_propagated() {
        let fanout = PoolFanout::new(2);
        let _ = fanout
            .run_all(hosts(2), |host| async move {
                if host == "host-1" {
                    panic!("boom");
                }
                Ok(())
            })
            .await;
    }

    #[test]
    fn test_all_succeeded_names_failed_hosts() {
        let outcomes = vec![
            HostOutcome { host: "a".to_string(), result: Ok(1) },
            HostOutcome {
                host: "b".to_string(),
                result: Err(CoreError::ActorError("down".to_string())),
            },
        ];

        match all_succeeded(outcomes) {
            Err(CoreError::GetPoolUpdatesFailed { hosts }) => assert_eq!(hosts, vec!["b"]),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
