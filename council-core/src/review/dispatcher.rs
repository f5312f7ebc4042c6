//! Review dispatch over a registry of collaborators

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;

use crate::progress::{ProgressEvent, ProgressSink};
use crate::snapshot::FileSnapshot;
use crate::{Error, Result};

use super::verdict::ReviewVerdict;

/// A review collaborator
#[async_trait]
pub trait Reviewer: Send + Sync {
    /// Registry key for this reviewer
    fn name(&self) -> &str;

    /// Review a snapshot and return a verdict
    async fn review(&self, snapshot: &FileSnapshot) -> Result<ReviewVerdict>;
}

/// How to run the enabled reviewers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    Sequential,
    #[default]
    Parallel,
}

/// Registry of reviewers, kept in registration order
#[derive(Default)]
pub struct ReviewDispatcher {
    reviewers: Vec<Arc<dyn Reviewer>>,
    enabled: HashMap<String, bool>,
    progress: Option<Arc<dyn ProgressSink>>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for ReviewDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewDispatcher")
            .field("reviewers", &self.names())
            .field("enabled", &self.enabled)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ReviewDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reviewer; a reviewer with the same name is replaced in place
    pub fn register(&mut self, reviewer: Arc<dyn Reviewer>) {
        match self
            .reviewers
            .iter()
            .position(|r| r.name() == reviewer.name())
        {
            Some(idx) => self.reviewers[idx] = reviewer,
            None => self.reviewers.push(reviewer),
        }
    }

    /// Builder form of `register`
    pub fn with_reviewer(mut self, reviewer: Arc<dyn Reviewer>) -> Self {
        self.register(reviewer);
        self
    }

    /// Enable or disable a reviewer by name (reviewers default to enabled)
    pub fn set_enabled(&mut self, name: impl Into<String>, enabled: bool) {
        self.enabled.insert(name.into(), enabled);
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Per-reviewer timeout
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Names of all registered reviewers, in registration order
    pub fn names(&self) -> Vec<&str> {
        self.reviewers.iter().map(|r| r.name()).collect()
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.get(name).copied().unwrap_or(true)
    }

    fn enabled_reviewers(&self) -> impl Iterator<Item = &Arc<dyn Reviewer>> {
        self.reviewers.iter().filter(|r| self.is_enabled(r.name()))
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(ref sink) = self.progress {
            sink.emit(event);
        }
    }

    async fn invoke(&self, reviewer: &dyn Reviewer, snapshot: &FileSnapshot) -> Result<ReviewVerdict> {
        let name = reviewer.name().to_string();
        self.emit(ProgressEvent::CollaboratorStarted { name: name.clone() });

        let verdict = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, reviewer.review(snapshot))
                .await
                .map_err(|_| Error::Timeout(limit))??,
            None => reviewer.review(snapshot).await?,
        };

        self.emit(ProgressEvent::CollaboratorCompleted {
            name,
            status: verdict.status(),
            issues: verdict.issues().len(),
        });
        Ok(verdict)
    }

    /// Run a single reviewer by name, whether or not it is enabled
    pub async fn run_one(&self, name: &str, snapshot: &FileSnapshot) -> Result<ReviewVerdict> {
        let reviewer = self
            .reviewers
            .iter()
            .find(|r| r.name() == name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        self.invoke(reviewer.as_ref(), snapshot).await
    }

    /// Run enabled reviewers one at a time, in registration order
    pub async fn run_all_sequential(&self, snapshot: &FileSnapshot) -> Result<Vec<ReviewVerdict>> {
        let mut verdicts = Vec::new();
        for reviewer in self.enabled_reviewers() {
            verdicts.push(self.invoke(reviewer.as_ref(), snapshot).await?);
        }
        Ok(verdicts)
    }

    /// Start every enabled reviewer, then wait for all of them to settle
    ///
    /// Every reviewer runs to completion even if another fails; the first
    /// error in registration order is returned.
    pub async fn run_all_parallel(&self, snapshot: &FileSnapshot) -> Result<Vec<ReviewVerdict>> {
        let pending = self
            .enabled_reviewers()
            .map(|reviewer| self.invoke(reviewer.as_ref(), snapshot));
        join_all(pending).await.into_iter().collect()
    }

    pub async fn run_all(&self, snapshot: &FileSnapshot, mode: DispatchMode) -> Result<Vec<ReviewVerdict>> {
        match mode {
            DispatchMode::Sequential => self.run_all_sequential(snapshot).await,
            DispatchMode::Parallel => self.run_all_parallel(snapshot).await,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::progress::testing::RecordingProgress;
    use crate::review::verdict::ReviewStatus;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_run_one_not_found() {
        let dispatcher = ReviewDispatcher::new();
        let err = dispatcher
            .run_one("ghost", &FileSnapshot::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(ref n) if n == "ghost"));
    }

    #[tokio::test]
    async fn test_run_one_emits_start_and_complete() {
        let progress = Arc::new(RecordingProgress::default());
        let dispatcher = ReviewDispatcher::new()
            .with_reviewer(ScriptedReviewer::new("qa", vec![(ReviewStatus::Warn, 2)]))
            .with_progress(progress.clone());

        let verdict = dispatcher.run_one("qa", &FileSnapshot::default()).await.unwrap();
        assert_eq!(verdict.status(), ReviewStatus::Warn);

        let events = progress.events();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            ProgressEvent::CollaboratorStarted {
                name: "qa".to_string()
            }
        );
        assert_eq!(
            events[1],
            ProgressEvent::CollaboratorCompleted {
                name: "qa".to_string(),
                status: ReviewStatus::Warn,
                issues: 2
            }
        );
    }

    #[tokio::test]
    async fn test_sequential_registration_order_and_enabled() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = ReviewDispatcher::new();
        for name in ["warden", "qa", "architect"] {
            dispatcher.register(Arc::new(OrderedReviewer {
                name: name.to_string(),
                log: log.clone(),
            }));
        }
        dispatcher.set_enabled("qa", false);

        let verdicts = dispatcher
            .run_all_sequential(&FileSnapshot::default())
            .await
            .unwrap();
        assert_eq!(verdicts.len(), 2);
        assert_eq!(*log.lock().unwrap(), vec!["warden", "architect"]);
    }

    #[tokio::test]
    async fn test_parallel_collects_all() {
        let dispatcher = ReviewDispatcher::new()
            .with_reviewer(ScriptedReviewer::new("a", vec![(ReviewStatus::Pass, 0)]))
            .with_reviewer(ScriptedReviewer::new("b", vec![(ReviewStatus::Fail, 3)]));

        let verdicts = dispatcher
            .run_all(&FileSnapshot::default(), DispatchMode::Parallel)
            .await
            .unwrap();
        assert_eq!(verdicts.len(), 2);
        assert_eq!(verdicts.iter().map(|v| v.issues().len()).sum::<usize>(), 3);
    }

    #[tokio::test]
    async fn test_parallel_failure_propagates_after_all_settle() {
        let survivor = ScriptedReviewer::new("survivor", vec![(ReviewStatus::Pass, 0)]);
        let dispatcher = ReviewDispatcher::new()
            .with_reviewer(Arc::new(FailingReviewer {
                name: "broken".to_string(),
            }))
            .with_reviewer(survivor.clone());

        let result = dispatcher.run_all_parallel(&FileSnapshot::default()).await;
        assert!(matches!(result, Err(Error::Agent(_))));
        assert_eq!(survivor.calls(), 1);
    }

    #[tokio::test]
    async fn test_register_replaces_same_name() {
        let mut dispatcher = ReviewDispatcher::new();
        dispatcher.register(ScriptedReviewer::new("qa", vec![(ReviewStatus::Fail, 1)]));
        dispatcher.register(ScriptedReviewer::new("other", vec![(ReviewStatus::Pass, 0)]));
        dispatcher.register(ScriptedReviewer::new("qa", vec![(ReviewStatus::Pass, 0)]));
        assert_eq!(dispatcher.names(), vec!["qa", "other"]);

        let verdict = dispatcher.run_one("qa", &FileSnapshot::default()).await.unwrap();
        assert_eq!(verdict.status(), ReviewStatus::Pass);
    }

    struct SlowReviewer;

    #[async_trait]
    impl Reviewer for SlowReviewer {
        fn name(&self) -> &str {
            "slow"
        }

        async fn review(&self, _snapshot: &FileSnapshot) -> Result<ReviewVerdict> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ReviewVerdict::new("slow", ReviewStatus::Pass, vec![], "")?)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let dispatcher = ReviewDispatcher::new()
            .with_reviewer(Arc::new(SlowReviewer))
            .with_timeout(Some(Duration::from_secs(1)));
        let err = dispatcher
            .run_one("slow", &FileSnapshot::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }
}
