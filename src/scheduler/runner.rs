// * The agent loop: fixed cadence, bounded iterations, failure recovery.
// *
// * One logical worker drives session → extraction → publish on a fixed
// * interval, compensating for work time. Iteration failures never stop the
// * loop; the FailureTracker decides when to force a session recreate.
// * Shutdown is cooperative and lands between iterations, never mid-publish.

use std::time::{Duration, Instant};

use futures::future::join_all;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::extract::{ExtractError, Extractor, MetricKind};
use crate::ops::telemetry;
use crate::publish::{PublishError, Publisher};
use crate::scheduler::policy::FailureTracker;
use crate::session::{SessionError, SessionManager};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub iteration_timeout: Duration,
    pub max_consecutive_failures: u32,
}

// * What one completed iteration did.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub published: Vec<MetricKind>,
    pub skipped: Vec<MetricKind>,
}

#[derive(Error, Debug)]
pub enum CycleError {
    #[error("session stage failed: {0}")]
    Session(#[from] SessionError),

    #[error("extraction stage failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("no metric could be extracted this cycle")]
    NoReadings,

    #[error("publish stage failed for {} metric(s)", .0.len())]
    Publish(Vec<PublishError>),
}

// * Seam between the loop and the stages it drives, so the scheduling and
// * recovery policy can be exercised with a scripted stand-in.
#[allow(async_fn_in_trait)]
pub trait Cycle {
    async fn run_cycle(&mut self) -> Result<CycleReport, CycleError>;

    // * Forced teardown-and-recreate of whatever session state exists.
    async fn recreate_session(&mut self);
}

// * Production cycle: SessionManager → Extractor → Publisher.
pub struct AgentCycle {
    session: SessionManager,
    extractor: Extractor,
    publisher: Publisher,
}

impl AgentCycle {
    pub fn new(session: SessionManager, extractor: Extractor, publisher: Publisher) -> Self {
        Self {
            session,
            extractor,
            publisher,
        }
    }
}

impl Cycle for AgentCycle {
    async fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        let page = self.session.ensure_ready().await?;
        let outcome = self.extractor.extract(&page).await?;

        // * A missing metric is "nothing to publish for it this cycle",
        // * logged per metric, not a fatal error.
        for failure in &outcome.failures {
            warn!(
                metric = %failure.metric,
                reason = %failure.reason,
                "metric unavailable this cycle"
            );
            telemetry::record_extraction_failure(failure.metric.id());
        }
        if outcome.readings.is_empty() {
            return Err(CycleError::NoReadings);
        }

        // * The readings are independent updates; send them concurrently and
        // * wait for every attempt before the iteration completes.
        let results = join_all(
            outcome
                .readings
                .iter()
                .map(|reading| self.publisher.publish(reading)),
        )
        .await;

        let mut report = CycleReport {
            published: Vec::new(),
            skipped: outcome.failures.iter().map(|f| f.metric).collect(),
        };
        let mut errors = Vec::new();
        for (reading, result) in outcome.readings.iter().zip(results) {
            match result {
                Ok(()) => {
                    telemetry::record_publish(reading.metric.id(), "success");
                    report.published.push(reading.metric);
                }
                Err(err) => {
                    error!(metric = %err.metric(), error = %err, "publish failed");
                    telemetry::record_publish(reading.metric.id(), "failure");
                    errors.push(err);
                }
            }
        }

        if !errors.is_empty() {
            return Err(CycleError::Publish(errors));
        }
        Ok(report)
    }

    async fn recreate_session(&mut self) {
        self.session.teardown().await;
        telemetry::record_session_recreate();
    }
}

pub struct Scheduler<C: Cycle> {
    cycle: C,
    cfg: SchedulerConfig,
    tracker: FailureTracker,
}

impl<C: Cycle> Scheduler<C> {
    pub fn new(cycle: C, cfg: SchedulerConfig) -> Self {
        let tracker = FailureTracker::new(cfg.max_consecutive_failures);
        Self {
            cycle,
            cfg,
            tracker,
        }
    }

    // * Runs until the shutdown channel flips. Each iteration is bounded by
    // * the iteration timeout; the sleep is the interval minus work time,
    // * never negative.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_s = self.cfg.interval.as_secs(),
            iteration_timeout_s = self.cfg.iteration_timeout.as_secs(),
            "agent loop starting"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let started = Instant::now();
            let outcome =
                tokio::time::timeout(self.cfg.iteration_timeout, self.cycle.run_cycle()).await;
            telemetry::observe_cycle_duration(started.elapsed().as_secs_f64());

            match outcome {
                Ok(Ok(report)) => {
                    self.tracker.record_success();
                    telemetry::record_cycle("success");
                    debug!(
                        published = report.published.len(),
                        skipped = report.skipped.len(),
                        "cycle complete"
                    );
                }
                Ok(Err(err)) => self.handle_failure(&err.to_string()).await,
                Err(_) => {
                    self.handle_failure(&format!(
                        "iteration abandoned after {}s",
                        self.cfg.iteration_timeout.as_secs()
                    ))
                    .await
                }
            }
            telemetry::set_consecutive_failures(self.tracker.consecutive() as i64);

            let sleep_for = self.cfg.interval.saturating_sub(started.elapsed());
            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("agent loop stopped");
    }

    async fn handle_failure(&mut self, context: &str) {
        telemetry::record_cycle("failure");
        error!(
            error = context,
            consecutive = self.tracker.consecutive() + 1,
            "cycle failed"
        );
        if self.tracker.record_failure() {
            warn!("consecutive failure threshold reached, recreating session");
            self.cycle.recreate_session().await;
        }
    }
}
