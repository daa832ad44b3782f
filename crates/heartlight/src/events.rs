//! Event dispatch
//!
//! Polls a [`TriggerChain`] against a reference buffer and a query source,
//! and spawns the configured action as its own task every time the chain
//! fires. The polling loop never awaits an action: a multi-second ramp runs
//! alongside continued detection.
//!
//! Failures inside a poll (a chain step erroring, a non-flag result) are
//! logged, counted and passed to the optional error hook; polling carries
//! on. Shutdown is a broadcast signal; in-flight actions are drained before
//! [`EventDispatcher::run`] returns.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::buffer::SharedBuffer;
use crate::chain::Chain;
use crate::error::{Error, Result};
use crate::shared;
use crate::signal::Signal;
use crate::trigger::TriggerChain;

/// Work launched on each firing.
pub type Action = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Observer for per-poll failures.
pub type ErrorHook = Arc<dyn Fn(&Error) + Send + Sync>;

/// Wrap an async closure as an [`Action`].
pub fn action<F, Fut>(f: F) -> Action
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Where the trigger's query values come from on each poll.
#[derive(Debug, Clone)]
pub enum QuerySource {
    /// The reference buffer itself, usually combined with a query chain
    /// such as peak detection.
    Reference,
    /// A separate buffer, e.g. one holding detected peak positions.
    Buffer(SharedBuffer),
    /// Fixed values.
    Values(Vec<f64>),
}

/// Counters returned when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub polls: u64,
    pub firings: u64,
    pub errors: u64,
    pub actions_completed: u64,
    pub actions_failed: u64,
}

impl DispatchStats {
    fn record(&mut self, result: std::result::Result<anyhow::Result<()>, JoinError>) {
        match result {
            Ok(Ok(())) => self.actions_completed += 1,
            Ok(Err(_)) => self.actions_failed += 1,
            Err(e) => {
                error!(error = %e, "action task panicked");
                self.actions_failed += 1;
            }
        }
    }
}

/// Stops a running [`EventDispatcher`].
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: broadcast::Sender<()>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }
}

pub struct EventDispatcher {
    reference: SharedBuffer,
    query: QuerySource,
    query_chain: Chain,
    poll_interval: Duration,
    error_hook: Option<ErrorHook>,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl EventDispatcher {
    pub fn new(reference: SharedBuffer, query: QuerySource) -> Self {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        Self {
            reference,
            query,
            query_chain: Chain::new(),
            poll_interval: Duration::from_millis(5),
            error_hook: None,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Chain applied to the query snapshot before evaluation.
    pub fn with_query_chain(mut self, chain: Chain) -> Self {
        self.query_chain = chain;
        self
    }

    /// Delay between polls. Zero only yields to the runtime.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn on_error(mut self, hook: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.error_hook = Some(Arc::new(hook));
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// One evaluation of the trigger chain against current data.
    pub fn poll_once(&self, trigger: &mut TriggerChain) -> Result<bool> {
        let reference = shared::read(&self.reference).series();
        let raw = match &self.query {
            QuerySource::Reference => reference.samples.clone(),
            QuerySource::Buffer(buffer) => shared::read(buffer).snapshot(),
            QuerySource::Values(values) => values.clone(),
        };

        let query = if raw.is_empty() || self.query_chain.is_empty() {
            raw
        } else {
            match self.query_chain.run(Signal::Array(raw))? {
                Signal::Array(values) => values,
                Signal::Scalar(value) => vec![value],
                other => {
                    return Err(Error::shape("query values", other.describe()));
                }
            }
        };

        trigger.evaluate(&reference, &query)
    }

    /// Poll until shut down, spawning `action` on every firing.
    pub async fn run(mut self, mut trigger: TriggerChain, action: Action) -> DispatchStats {
        let mut actions: JoinSet<anyhow::Result<()>> = JoinSet::new();
        let mut stats = DispatchStats::default();
        info!(poll_ms = self.poll_interval.as_millis() as u64, "event dispatcher started");

        loop {
            stats.polls += 1;
            match self.poll_once(&mut trigger) {
                Ok(true) => {
                    stats.firings += 1;
                    let id = Uuid::new_v4();
                    debug!(action.id = %id, "trigger fired");
                    let work = action();
                    actions.spawn(
                        async move {
                            let result = work.await;
                            match &result {
                                Ok(()) => debug!("action completed"),
                                Err(e) => warn!(error = %e, "action failed"),
                            }
                            result
                        }
                        .instrument(info_span!("action", action.id = %id)),
                    );
                }
                Ok(false) => {}
                Err(e) => {
                    stats.errors += 1;
                    warn!(error = %e, "trigger poll failed");
                    if let Some(hook) = &self.error_hook {
                        hook(&e);
                    }
                }
            }

            while let Some(result) = actions.try_join_next() {
                stats.record(result);
            }

            let interval = self.poll_interval;
            let wait = async move {
                if interval.is_zero() {
                    tokio::task::yield_now().await;
                } else {
                    tokio::time::sleep(interval).await;
                }
            };

            tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => {
                    info!("shutdown signal received");
                    break;
                }
                _ = wait => {}
            }
        }

        if !actions.is_empty() {
            info!(in_flight = actions.len(), "waiting for actions to finish");
        }
        while let Some(result) = actions.join_next().await {
            stats.record(result);
        }

        info!(
            polls = stats.polls,
            firings = stats.firings,
            errors = stats.errors,
            "event dispatcher stopped"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{SampleBuffer, Series};
    use crate::chain::Step;
    use crate::shared::shared;
    use crate::trigger::TriggerSource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fires on the first `n` polls.
    struct FireTimes(u32);

    impl TriggerSource for FireTimes {
        fn evaluate(&mut self, _: &Series, _: &[f64], _: bool) -> Result<Signal> {
            let fire = self.0 > 0;
            self.0 = self.0.saturating_sub(1);
            Ok(Signal::Flag(fire))
        }
    }

    fn reference() -> SharedBuffer {
        shared(SampleBuffer::from_samples(vec![0.0; 8]))
    }

    fn counting_action(delay: Duration, counter: Arc<AtomicUsize>) -> Action {
        action(move || {
            let counter = counter.clone();
            async move {
                tokio::time::sleep(delay).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_actions_run_concurrently_with_polling() {
        let dispatcher = EventDispatcher::new(reference(), QuerySource::Values(vec![1.0]))
            .poll_interval(Duration::from_millis(5));
        let handle = dispatcher.shutdown_handle();
        let completed = Arc::new(AtomicUsize::new(0));

        let task = tokio::spawn(dispatcher.run(
            TriggerChain::new(FireTimes(3)),
            counting_action(Duration::from_secs(1), completed.clone()),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        // three firings already, none of the one-second actions finished
        assert_eq!(completed.load(Ordering::SeqCst), 0);

        handle.shutdown();
        let stats = task.await.unwrap();
        assert_eq!(stats.firings, 3);
        assert_eq!(stats.actions_completed, 3);
        assert_eq!(completed.load(Ordering::SeqCst), 3);
        assert!(stats.polls >= 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_errors_are_isolated() {
        let errors = Arc::new(AtomicUsize::new(0));
        let seen = errors.clone();
        let dispatcher = EventDispatcher::new(reference(), QuerySource::Values(vec![1.0]))
            .poll_interval(Duration::from_millis(10))
            .on_error(move |e| {
                assert!(matches!(e, Error::InvalidChain { .. }));
                seen.fetch_add(1, Ordering::SeqCst);
            });
        let handle = dispatcher.shutdown_handle();

        let not_a_flag = TriggerChain::new(FireTimes(0))
            .with_steps(Chain::new().then(Step::new("number", |_, _| Ok(Signal::Scalar(0.0)))));
        let task = tokio::spawn(dispatcher.run(
            not_a_flag,
            counting_action(Duration::ZERO, Arc::new(AtomicUsize::new(0))),
        ));

        tokio::time::sleep(Duration::from_millis(35)).await;
        handle.shutdown();
        let stats = task.await.unwrap();

        assert!(stats.errors >= 3);
        assert_eq!(stats.errors as usize, errors.load(Ordering::SeqCst));
        assert_eq!(stats.firings, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_actions_are_counted() {
        let dispatcher = EventDispatcher::new(reference(), QuerySource::Values(vec![1.0]));
        let handle = dispatcher.shutdown_handle();
        let failing = action(|| async { Err::<(), _>(anyhow::anyhow!("fixture offline")) });

        let task = tokio::spawn(dispatcher.run(TriggerChain::new(FireTimes(2)), failing));
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.shutdown();

        let stats = task.await.unwrap();
        assert_eq!(stats.firings, 2);
        assert_eq!(stats.actions_failed, 2);
        assert_eq!(stats.actions_completed, 0);
    }

    #[tokio::test]
    async fn test_shutdown_before_run_stops_after_one_poll() {
        let dispatcher = EventDispatcher::new(reference(), QuerySource::Reference);
        dispatcher.shutdown_handle().shutdown();

        let stats = dispatcher
            .run(
                TriggerChain::new(FireTimes(0)),
                counting_action(Duration::ZERO, Arc::new(AtomicUsize::new(0))),
            )
            .await;
        assert_eq!(stats.polls, 1);
    }

    #[test]
    fn test_poll_once_applies_query_chain() {
        let reference = shared(SampleBuffer::from_samples(vec![0.0, 1.0, 5.0, 1.0, 0.0, 0.0]));
        let dispatcher = EventDispatcher::new(reference, QuerySource::Reference)
            .with_query_chain(Chain::new().then(crate::functions::peaks()));
        let mut trigger =
            TriggerChain::new(crate::trigger::TriggerDetector::new(0)).fixed_index();

        // peak at 2; first observation sets the baseline
        assert!(!dispatcher.poll_once(&mut trigger).unwrap());
    }
}
