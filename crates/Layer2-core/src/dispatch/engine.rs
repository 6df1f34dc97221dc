//! Bounded concurrent dispatch of a protocol handler across targets
//!
//! Every target gets its own task up front; a semaphore caps how many of
//! them are inside the handler at once. A handler error or panic becomes a
//! failed `RunOutcome` for that target and never affects its siblings.

use super::progress::ProgressObserver;
use crate::context::Context;
use crate::plugin::{panic_message, ProtocolHandle, ProtocolHandler};
use crate::target::TargetSpec;
use futures::FutureExt;
use nexec_foundation::{Jitter, RunArgs};
use rand::Rng;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("{0}")]
    Failed(String),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

/// Result of one handler invocation
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub target: TargetSpec,
    pub result: Result<(), DispatchError>,
    pub duration: Duration,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Clone)]
pub struct DispatchEngine {
    max_concurrent: usize,
    show_progress: bool,
    jitter: Option<Jitter>,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl DispatchEngine {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            show_progress: true,
            jitter: None,
            observer: None,
        }
    }

    /// Bound, progress switch and jitter taken from the run arguments.
    ///
    /// An unparsable jitter is ignored here; the runner rejects it earlier.
    pub fn from_args(args: &RunArgs) -> Self {
        let mut engine = Self::new(args.threads).with_progress_enabled(!args.no_progress);
        engine.jitter = args.jitter().ok().flatten();
        engine
    }

    /// Sleep a random delay within `jitter` before each invocation.
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = Some(jitter);
        self
    }

    pub fn with_progress_enabled(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Invoke the handler once per target and collect every outcome.
    ///
    /// Outcomes arrive in completion order. Progress is only reported for
    /// runs with more than one target.
    pub async fn run(
        &self,
        handle: &ProtocolHandle,
        ctx: Arc<Context>,
        targets: Vec<TargetSpec>,
    ) -> Vec<RunOutcome> {
        let mut outcomes = Vec::with_capacity(targets.len());
        self.run_into(handle, ctx, targets, &mut outcomes).await;
        outcomes
    }

    /// Like `run`, but pushes each outcome into `outcomes` as it completes,
    /// so a caller that abandons the future keeps what already finished.
    pub async fn run_into(
        &self,
        handle: &ProtocolHandle,
        ctx: Arc<Context>,
        targets: Vec<TargetSpec>,
        outcomes: &mut Vec<RunOutcome>,
    ) {
        let total = targets.len();
        if total == 0 {
            return;
        }

        let observer = self
            .observer
            .as_ref()
            .filter(|_| self.show_progress && total > 1);
        if let Some(observer) = observer {
            observer.start(
                total as u64,
                &format!("Running nexec against {} targets", total),
            );
        }

        debug!(
            protocol = handle.name(),
            targets = total,
            max_concurrent = self.max_concurrent,
            "Dispatching"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();
        for target in targets {
            let semaphore = Arc::clone(&semaphore);
            let handler = Arc::clone(handle.handler());
            let ctx = Arc::clone(&ctx);
            let jitter = self.jitter;
            tasks.spawn(async move {
                // The semaphore is never closed, so acquisition only waits
                let _permit = semaphore.acquire_owned().await.ok();
                if let Some(jitter) = jitter {
                    tokio::time::sleep(jitter_delay(jitter)).await;
                }
                invoke(handler, ctx, target).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!("Dispatch task did not complete: {}", e),
            }
            if let Some(observer) = observer {
                observer.advance();
            }
        }

        if let Some(observer) = observer {
            observer.finish();
        }
    }
}

fn jitter_delay(jitter: Jitter) -> Duration {
    let (min, max) = jitter.bounds();
    let secs = if max > min {
        rand::thread_rng().gen_range(min..=max)
    } else {
        min
    };
    Duration::from_secs_f64(secs)
}

async fn invoke(
    handler: Arc<dyn ProtocolHandler>,
    ctx: Arc<Context>,
    target: TargetSpec,
) -> RunOutcome {
    let started = Instant::now();
    let call = AssertUnwindSafe(handler.run(ctx, target.clone()))
        .catch_unwind()
        .await;

    let result = match call {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!(host = %target, protocol = handler.name(), error = ?e, "Target failed: {}", e);
            Err(DispatchError::Failed(e.to_string()))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(host = %target, protocol = handler.name(), "Handler panicked: {}", message);
            Err(DispatchError::Panicked(message))
        }
    };

    RunOutcome {
        target,
        result,
        duration: started.elapsed(),
    }
}

impl std::fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("max_concurrent", &self.max_concurrent)
            .field("show_progress", &self.show_progress)
            .field("jitter", &self.jitter)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nexec_foundation::{Error, ProtocolStore, Result};
    use parking_lot::Mutex;

    struct Flaky;

    #[async_trait]
    impl ProtocolHandler for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn run(&self, _ctx: Arc<Context>, target: TargetSpec) -> Result<()> {
            match target.host.as_str() {
                "bad" => Err(Error::Connection("refused".into())),
                "boom" => panic!("handler exploded"),
                _ => Ok(()),
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ProgressObserver for Recorder {
        fn start(&self, total: u64, _message: &str) {
            self.events.lock().push(format!("start:{}", total));
        }

        fn advance(&self) {
            self.events.lock().push("advance".into());
        }

        fn finish(&self) {
            self.events.lock().push("finish".into());
        }
    }

    fn ctx() -> Arc<Context> {
        let store = Arc::new(ProtocolStore::in_memory("flaky").unwrap());
        Arc::new(Context::new(store, Arc::new(RunArgs::for_protocol("flaky"))))
    }

    fn targets(hosts: &[&str]) -> Vec<TargetSpec> {
        hosts.iter().map(|h| TargetSpec::new(*h)).collect()
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let handle = ProtocolHandle::new("flaky", Arc::new(Flaky));
        let outcomes = DispatchEngine::new(4)
            .run(&handle, ctx(), targets(&["ok1", "bad", "boom", "ok2"]))
            .await;

        assert_eq!(outcomes.len(), 4);
        let by_host = |h: &str| outcomes.iter().find(|o| o.target.host == h).unwrap();
        assert!(by_host("ok1").is_success());
        assert!(by_host("ok2").is_success());
        assert!(matches!(by_host("bad").result, Err(DispatchError::Failed(_))));
        assert_eq!(
            by_host("boom").result,
            Err(DispatchError::Panicked("handler exploded".into()))
        );
    }

    #[tokio::test]
    async fn test_progress_per_completion() {
        let recorder = Arc::new(Recorder::default());
        let handle = ProtocolHandle::new("flaky", Arc::new(Flaky));
        DispatchEngine::new(2)
            .with_observer(recorder.clone())
            .run(&handle, ctx(), targets(&["a", "bad", "c"]))
            .await;

        let events = recorder.events.lock().clone();
        assert_eq!(
            events,
            vec!["start:3", "advance", "advance", "advance", "finish"]
        );
    }

    #[tokio::test]
    async fn test_no_progress_for_single_target_or_when_disabled() {
        let recorder = Arc::new(Recorder::default());
        let handle = ProtocolHandle::new("flaky", Arc::new(Flaky));

        let engine = DispatchEngine::new(2).with_observer(recorder.clone());
        engine.run(&handle, ctx(), targets(&["a"])).await;
        engine
            .clone()
            .with_progress_enabled(false)
            .run(&handle, ctx(), targets(&["a", "b"]))
            .await;

        assert!(recorder.events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_empty_target_list() {
        let handle = ProtocolHandle::new("flaky", Arc::new(Flaky));
        assert!(DispatchEngine::new(1).run(&handle, ctx(), Vec::new()).await.is_empty());
    }

    #[test]
    fn test_jitter_delay_within_bounds() {
        let jitter = Jitter::parse("0.1-0.2").unwrap();
        for _ in 0..50 {
            let delay = jitter_delay(jitter);
            assert!(delay >= Duration::from_millis(100) && delay <= Duration::from_millis(200));
        }
        assert_eq!(jitter_delay(Jitter::parse("0").unwrap()), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_jitter_delays_each_invocation() {
        let handle = ProtocolHandle::new("flaky", Arc::new(Flaky));
        let engine = DispatchEngine::new(1).with_jitter(Jitter::parse("0.03-0.03").unwrap());

        let started = Instant::now();
        let outcomes = engine.run(&handle, ctx(), targets(&["a", "b"])).await;
        assert_eq!(outcomes.len(), 2);
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_from_args_reads_jitter() {
        let mut args = RunArgs::for_protocol("flaky");
        args.jitter = Some("1-2".into());
        assert!(DispatchEngine::from_args(&args).jitter.is_some());
        args.jitter = Some("nonsense".into());
        assert!(DispatchEngine::from_args(&args).jitter.is_none());
    }

    struct Stalls;

    #[async_trait]
    impl ProtocolHandler for Stalls {
        fn name(&self) -> &str {
            "stalls"
        }

        async fn run(&self, _ctx: Arc<Context>, target: TargetSpec) -> Result<()> {
            if target.host == "stuck" {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_abandoned_run_keeps_finished_outcomes() {
        let handle = ProtocolHandle::new("stalls", Arc::new(Stalls));
        let mut outcomes = Vec::new();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(100),
            DispatchEngine::new(2).run_into(
                &handle,
                ctx(),
                targets(&["a", "stuck"]),
                &mut outcomes,
            ),
        )
        .await;

        assert!(abandoned.is_err());
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].target.host, "a");
    }

    #[test]
    fn test_zero_bound_is_raised_to_one() {
        assert_eq!(DispatchEngine::new(0).max_concurrent(), 1);
    }
}
