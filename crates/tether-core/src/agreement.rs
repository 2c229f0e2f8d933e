//! Agreement rounds over redundant concurrent attempts
//!
//! Traversal code often asks several independent sources the same question
//! (e.g. several STUN servers for the WAN address) and needs one answer.
//! [`agree`] runs every attempt concurrently and settles on the first value
//! reported by `min_agree` attempts, or on the most reported value once the
//! deadline passes.

use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::TetherError;

/// How an agreement round ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgreementOutcome<T> {
    /// `count` attempts reported `value`, meeting the quorum
    Quorum {
        /// The agreed value
        value: T,
        /// Tally at the moment of agreement
        count: usize,
    },
    /// No quorum; `value` had the highest tally when the round ended
    Plurality {
        /// The best-supported value
        value: T,
        /// Its tally
        count: usize,
    },
    /// No attempt produced a value
    NoAgreement,
}

impl<T> AgreementOutcome<T> {
    /// The winning value, if any
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Quorum { value, .. } | Self::Plurality { value, .. } => Some(value),
            Self::NoAgreement => None,
        }
    }

    /// Consume the outcome, keeping only the winning value
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Quorum { value, .. } | Self::Plurality { value, .. } => Some(value),
            Self::NoAgreement => None,
        }
    }

    /// Whether the round reached quorum
    pub fn is_quorum(&self) -> bool {
        matches!(self, Self::Quorum { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct Tally {
    count: usize,
    // completion sequence number at which `count` was reached
    reached_at: u64,
}

/// Tallies for one round, updated in completion order
#[derive(Debug)]
struct Round<T> {
    min_agree: usize,
    tallies: HashMap<T, Tally>,
    observed: u64,
}

impl<T: Eq + Hash + Clone> Round<T> {
    fn new(min_agree: usize) -> Self {
        Self {
            min_agree: min_agree.max(1),
            tallies: HashMap::new(),
            observed: 0,
        }
    }

    /// Record one result; returns the tally if it just met the quorum.
    fn record(&mut self, value: T) -> Option<usize> {
        self.observed += 1;
        let tally = self.tallies.entry(value).or_insert(Tally {
            count: 0,
            reached_at: 0,
        });
        tally.count += 1;
        tally.reached_at = self.observed;
        (tally.count >= self.min_agree).then_some(tally.count)
    }

    /// Highest tally wins; ties go to whichever value reached it first.
    fn into_best(self) -> AgreementOutcome<T> {
        self.tallies
            .into_iter()
            .min_by(|(_, a), (_, b)| {
                b.count
                    .cmp(&a.count)
                    .then_with(|| a.reached_at.cmp(&b.reached_at))
            })
            .map_or(AgreementOutcome::NoAgreement, |(value, tally)| {
                AgreementOutcome::Plurality {
                    value,
                    count: tally.count,
                }
            })
    }
}

/// Run `operations` concurrently and agree on a result.
///
/// Returns as soon as any value has been produced by `min_agree` operations
/// (a `min_agree` of zero is treated as one). Operations still pending at
/// that point keep running in the background unless `wait_all` is set, in
/// which case they are awaited and their outcomes discarded before
/// returning; the winner is already fixed either way.
///
/// If `timeout` elapses first, or every operation finishes without a
/// quorum, the value with the highest tally is returned, ties going to the
/// value that reached that tally earliest. Failed or panicked operations
/// contribute nothing.
pub async fn agree<T, E, F, I>(
    min_agree: usize,
    operations: I,
    timeout: Duration,
    wait_all: bool,
) -> AgreementOutcome<T>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Eq + Hash + Clone + Debug + Send + 'static,
    E: Display + Send + 'static,
{
    let deadline = Instant::now() + timeout;
    let mut pending: FuturesUnordered<JoinHandle<Result<T, E>>> =
        operations.into_iter().map(tokio::spawn).collect();
    let mut round = Round::new(min_agree);

    let expiry = tokio::time::sleep_until(deadline);
    tokio::pin!(expiry);

    loop {
        tokio::select! {
            biased;
            joined = pending.next() => match joined {
                None => {
                    debug!("all operations finished without quorum");
                    break;
                }
                Some(Ok(Ok(value))) => {
                    if let Some(count) = round.record(value.clone()) {
                        debug!(?value, count, remaining = pending.len(), "quorum reached");
                        if wait_all {
                            while pending.next().await.is_some() {}
                        }
                        return AgreementOutcome::Quorum { value, count };
                    }
                }
                Some(Ok(Err(error))) => {
                    debug!(error = %error, "operation failed, not counted");
                }
                Some(Err(join_error)) => {
                    warn!(error = %join_error, "operation aborted, not counted");
                }
            },
            _ = &mut expiry => {
                debug!(remaining = pending.len(), "agreement deadline reached");
                break;
            }
        }
    }

    round.into_best()
}

/// Await every operation and return the first value meeting `threshold`.
///
/// Failed operations are dropped. `filter` sees the surviving values before
/// they are sorted; the first run of equal values at least `threshold` long
/// wins.
pub async fn threshold_gather<T, E, F, I, P>(operations: I, filter: P, threshold: usize) -> Option<T>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
    T: Ord,
    E: Display,
    P: FnOnce(Vec<T>) -> Vec<T>,
{
    let results = futures::future::join_all(operations).await;
    let mut values: Vec<T> = results
        .into_iter()
        .filter_map(|result| match result {
            Ok(value) => Some(value),
            Err(error) => {
                debug!(error = %error, "gathered operation failed");
                None
            }
        })
        .collect();

    values = filter(values);
    values.sort();

    let threshold = threshold.max(1);
    let mut run = 0;
    let mut index = 0;
    while index < values.len() {
        run = if index > 0 && values[index] == values[index - 1] {
            run + 1
        } else {
            1
        };
        if run >= threshold {
            return Some(values.swap_remove(index));
        }
        index += 1;
    }
    None
}

/// Bound an operation with an optional timeout, unifying its error type.
pub async fn bounded<T, E, F>(
    operation: F,
    limit: Option<Duration>,
    label: &'static str,
) -> Result<T, TetherError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<TetherError>,
{
    let result = match limit {
        Some(limit) => tokio::time::timeout(limit, operation)
            .await
            .map_err(|_| TetherError::timeout(label))?,
        None => operation.await,
    };
    result.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    type Op = futures::future::BoxFuture<'static, Result<&'static str, TetherError>>;

    fn after(ms: u64, value: &'static str, done: &Arc<AtomicUsize>) -> Op {
        let done = done.clone();
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            done.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        })
    }

    fn fail_after(ms: u64) -> Op {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Err(TetherError::network("unreachable"))
        })
    }

    fn never() -> Op {
        Box::pin(futures::future::pending())
    }

    fn crash() -> Op {
        Box::pin(async {
            let crashed = true;
            if crashed {
                panic!("op crashed");
            }
            Ok("unreachable")
        })
    }

    fn assert_elapsed(start: Instant, ms: u64) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(ms) && elapsed < Duration::from_millis(ms + 5),
            "elapsed {elapsed:?}, expected ~{ms}ms"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn quorum_returns_without_waiting_for_stragglers() {
        let done = Arc::new(AtomicUsize::new(0));
        let ops = vec![
            after(10, "A", &done),
            after(20, "A", &done),
            after(30, "A", &done),
            after(40, "B", &done),
            after(50, "B", &done),
        ];

        let start = Instant::now();
        let outcome = agree(3, ops, Duration::from_secs(1), false).await;

        assert_eq!(
            outcome,
            AgreementOutcome::Quorum {
                value: "A",
                count: 3
            }
        );
        assert_elapsed(start, 30);
        assert_eq!(done.load(Ordering::SeqCst), 3);

        // Stragglers were left running, not cancelled.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(done.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_all_delays_return_but_keeps_winner() {
        let done = Arc::new(AtomicUsize::new(0));
        let ops = vec![
            after(10, "A", &done),
            after(20, "A", &done),
            after(30, "B", &done),
            after(40, "B", &done),
            after(50, "B", &done),
        ];

        let start = Instant::now();
        let outcome = agree(2, ops, Duration::from_secs(1), true).await;

        assert_eq!(outcome.value(), Some(&"A"));
        assert_elapsed(start, 50);
        assert_eq!(done.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_returns_plurality_with_earliest_tie_break() {
        let done = Arc::new(AtomicUsize::new(0));
        let ops = vec![
            after(10, "A", &done),
            after(20, "B", &done),
            after(30, "B", &done),
            after(40, "A", &done),
            never(),
        ];

        let outcome = agree(3, ops, Duration::from_millis(100), false).await;
        // A and B both have two; B got there first.
        assert_eq!(
            outcome,
            AgreementOutcome::Plurality {
                value: "B",
                count: 2
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn single_votes_tie_to_first_seen() {
        let done = Arc::new(AtomicUsize::new(0));
        let ops = vec![after(20, "late", &done), after(10, "early", &done), never()];

        let outcome = agree(2, ops, Duration::from_millis(50), false).await;
        assert_eq!(outcome.into_value(), Some("early"));
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_count_or_abort() {
        let done = Arc::new(AtomicUsize::new(0));
        let ops = vec![
            fail_after(1),
            fail_after(2),
            after(10, "A", &done),
            crash(),
            after(20, "A", &done),
        ];

        let outcome = agree(2, ops, Duration::from_secs(1), false).await;
        assert!(outcome.is_quorum());
        assert_eq!(outcome.value(), Some(&"A"));
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_observed_is_no_agreement() {
        let start = Instant::now();
        let outcome = agree(1, vec![never(), fail_after(5)], Duration::from_millis(80), false).await;
        assert_eq!(outcome, AgreementOutcome::NoAgreement);
        assert_elapsed(start, 80);

        let empty: Vec<Op> = Vec::new();
        assert_eq!(
            agree(1, empty, Duration::from_secs(5), false).await,
            AgreementOutcome::NoAgreement
        );
    }

    #[tokio::test(start_paused = true)]
    async fn finished_without_quorum_returns_before_deadline() {
        let done = Arc::new(AtomicUsize::new(0));
        let ops = vec![after(5, "A", &done), after(6, "B", &done), after(7, "B", &done)];

        let start = Instant::now();
        let outcome = agree(5, ops, Duration::from_secs(10), false).await;
        assert_eq!(
            outcome,
            AgreementOutcome::Plurality {
                value: "B",
                count: 2
            }
        );
        assert_elapsed(start, 7);
    }

    #[tokio::test]
    async fn threshold_gather_picks_first_sorted_run() {
        let values = [3u32, 1, 3, 2, 3, 1];
        let ops = values
            .iter()
            .map(|v| futures::future::ready(Ok::<_, TetherError>(*v)));
        assert_eq!(threshold_gather(ops, |v| v, 2).await, Some(1));

        let ops = values
            .iter()
            .map(|v| futures::future::ready(Ok::<_, TetherError>(*v)));
        let without_ones =
            |v: Vec<u32>| -> Vec<u32> { v.into_iter().filter(|x| *x != 1).collect() };
        assert_eq!(threshold_gather(ops, without_ones, 3).await, Some(3));

        let ops = values
            .iter()
            .map(|v| futures::future::ready(Ok::<_, TetherError>(*v)));
        assert_eq!(threshold_gather(ops, |v| v, 4).await, None);
    }

    #[tokio::test]
    async fn threshold_gather_drops_failures() {
        let ops = vec![
            futures::future::ready(Err(TetherError::network("down"))),
            futures::future::ready(Ok(7u8)),
            futures::future::ready(Err(TetherError::network("down"))),
        ];
        assert_eq!(threshold_gather(ops, |v| v, 1).await, Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_maps_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, TetherError>(1)
        };
        let err = bounded(slow, Some(Duration::from_secs(1)), "stun lookup")
            .await
            .unwrap_err();
        assert_eq!(err, TetherError::timeout("stun lookup"));

        let fast = async { Ok::<_, TetherError>(2) };
        assert_eq!(bounded(fast, None, "noop").await.unwrap(), 2);
    }

    #[test]
    fn round_tie_break_is_by_reach_order() {
        let mut round = Round::new(10);
        round.record("x");
        round.record("y");
        round.record("y");
        round.record("x");
        round.record("z");
        assert_eq!(round.into_best().into_value(), Some("y"));
    }
}
