use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use cronwork_core::config::WorkerConfig;
use cronwork_core::{TaskEvent, TaskEventKind};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::{
    error::{Result, SchedulerError},
    executor::{Executor, ResultFeed},
    schedule::{CronCompiler, TriggerCompiler},
    sink::LogSink,
    table::ScheduleTable,
    tracker::ExecutionTracker,
    types::{TaskExecutionResult, TaskSchedulePlan},
};

/// The scheduling state machine: schedule table, execution tracker, and the
/// rules that move tasks between them.
///
/// Every method takes the current time explicitly and performs no waiting.
/// [`SchedulerEngine`] drives it from a single task; tests drive it directly.
pub struct Scheduler {
    table: ScheduleTable,
    tracker: ExecutionTracker,
    compiler: Arc<dyn TriggerCompiler>,
    executor: Arc<dyn Executor>,
    sink: Arc<dyn LogSink>,
    /// Handed to the executor with every submission.
    results: ResultFeed,
    idle_interval: TimeDelta,
}

impl Scheduler {
    pub fn new(executor: Arc<dyn Executor>, sink: Arc<dyn LogSink>, results: ResultFeed) -> Self {
        Self {
            table: ScheduleTable::new(),
            tracker: ExecutionTracker::new(),
            compiler: Arc::new(CronCompiler),
            executor,
            sink,
            results,
            idle_interval: TimeDelta::seconds(1),
        }
    }

    /// Use a different trigger dialect.
    pub fn with_compiler(mut self, compiler: Arc<dyn TriggerCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    /// Delay returned by [`try_schedule`](Self::try_schedule) while the table is empty.
    ///
    /// Raised to one millisecond if smaller, so an empty table never spins.
    pub fn with_idle_interval(mut self, idle_interval: TimeDelta) -> Self {
        self.idle_interval = idle_interval.max(TimeDelta::milliseconds(1));
        self
    }

    /// Apply one change event.
    ///
    /// SAVE compiles and (re)plans the task; a bad expression is returned as
    /// an error and leaves the table as it was. DELETE drops the plan. KILL
    /// cancels the in-flight execution, if any, and leaves the plan alone.
    pub fn apply(&mut self, event: TaskEvent, now: DateTime<Utc>) -> Result<()> {
        let name = event.task.name.clone();
        match event.kind {
            TaskEventKind::Save => {
                let plan = self.table.save(event.task, self.compiler.as_ref(), now)?;
                debug!(task = %name, next = %plan.next_fire_time, "task planned");
            }
            TaskEventKind::Delete => {
                if self.table.remove(&name).is_some() {
                    debug!(task = %name, "task unplanned");
                }
            }
            TaskEventKind::Kill => {
                if self.tracker.request_cancel(&name) {
                    info!(task = %name, "kill requested for running execution");
                }
            }
        }
        Ok(())
    }

    /// Dispatch every due plan, advance its fire time, and return how long
    /// to wait before the next pass.
    ///
    /// A due plan is advanced past `now` even when its dispatch was
    /// suppressed, so a long-running task does not make the loop spin.
    /// The returned delay may be zero or negative; callers wake immediately.
    pub fn try_schedule(&mut self, now: DateTime<Utc>) -> TimeDelta {
        if self.table.is_empty() {
            return self.idle_interval;
        }

        let mut nearest: Option<DateTime<Utc>> = None;
        let mut exhausted = Vec::new();

        for plan in self.table.plans_mut() {
            if plan.is_due(now) {
                if let Some(info) = self.tracker.try_dispatch(plan, now) {
                    info!(
                        task = %info.task.name,
                        execution_id = %info.execution_id,
                        plan_time = %info.plan_time,
                        "dispatching task"
                    );
                    self.executor.submit(info, self.results.clone());
                }
                if !plan.advance(now) {
                    exhausted.push(plan.task.name.clone());
                    continue;
                }
            }
            if nearest.map_or(true, |t| plan.next_fire_time < t) {
                nearest = Some(plan.next_fire_time);
            }
        }

        for name in exhausted {
            warn!(task = %name, "trigger has no future fire times, task unplanned");
            self.table.remove(&name);
        }

        match nearest {
            Some(next) => next - now,
            None => self.idle_interval,
        }
    }

    /// Retire the tracker entry for a finished execution and record it.
    ///
    /// The entry is removed whatever the outcome. Lock-contention results are
    /// not logged; everything else goes to the sink, whose failures are only
    /// reported locally.
    pub fn handle_result(&mut self, result: TaskExecutionResult) {
        let info = &result.execution_info;
        if self.tracker.complete(info).is_none() {
            warn!(
                task = %info.task.name,
                execution_id = %info.execution_id,
                "result for an execution that is not tracked"
            );
        }

        let Some(record) = result.to_log_record() else {
            debug!(task = %info.task.name, "lock held by another worker, nothing to log");
            return;
        };

        match &result.error {
            None => info!(task = %record.task_name, duration_ms = record.duration_ms(), "task finished"),
            Some(e) => warn!(task = %record.task_name, error = %e, "task failed"),
        }

        if let Err(e) = self.sink.append(record) {
            error!(task = %info.task.name, error = %e, "failed to append task log");
        }
    }

    /// Cancel the in-flight execution of `name`. See [`ExecutionTracker::request_cancel`].
    pub fn request_cancel(&self, name: &str) -> bool {
        self.tracker.request_cancel(name)
    }

    /// Cancel every in-flight execution; returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        self.tracker.cancel_all()
    }

    pub fn plan(&self, name: &str) -> Option<&TaskSchedulePlan> {
        self.table.get(name)
    }

    pub fn plan_count(&self) -> usize {
        self.table.len()
    }

    pub fn is_executing(&self, name: &str) -> bool {
        self.tracker.is_executing(name)
    }

    pub fn executing_count(&self) -> usize {
        self.tracker.len()
    }
}

/// Cheap, cloneable entry point into a running [`SchedulerEngine`].
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    events: mpsc::Sender<TaskEvent>,
    results: ResultFeed,
}

impl SchedulerHandle {
    /// Enqueue a task event, waiting while the channel is full.
    pub async fn push_event(&self, event: TaskEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| SchedulerError::ChannelClosed { channel: "event" })
    }

    /// Enqueue a task event without waiting.
    pub fn try_push_event(&self, event: TaskEvent) -> Result<()> {
        self.events.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SchedulerError::ChannelFull { channel: "event" },
            mpsc::error::TrySendError::Closed(_) => {
                SchedulerError::ChannelClosed { channel: "event" }
            }
        })
    }

    /// Result channel for executors that report outside a submission.
    pub fn result_feed(&self) -> ResultFeed {
        self.results.clone()
    }
}

/// Single-task event loop owning a [`Scheduler`].
///
/// Waits on task events, execution results and one countdown timer; after
/// each wake-up it runs a scheduling pass and re-arms the timer.
pub struct SchedulerEngine {
    scheduler: Scheduler,
    events_tx: mpsc::Sender<TaskEvent>,
    events: mpsc::Receiver<TaskEvent>,
    results: mpsc::Receiver<TaskExecutionResult>,
    result_feed: ResultFeed,
}

impl SchedulerEngine {
    pub fn new(config: &WorkerConfig, executor: Arc<dyn Executor>, sink: Arc<dyn LogSink>) -> Self {
        let (events_tx, events) = mpsc::channel(config.event_capacity.max(1));
        let (result_feed, results) = ResultFeed::channel(config.result_capacity.max(1));
        let idle = TimeDelta::milliseconds(config.idle_interval_ms.max(1) as i64);
        let scheduler =
            Scheduler::new(executor, sink, result_feed.clone()).with_idle_interval(idle);
        Self {
            scheduler,
            events_tx,
            events,
            results,
            result_feed,
        }
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn TriggerCompiler>) -> Self {
        self.scheduler = self.scheduler.with_compiler(compiler);
        self
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            events: self.events_tx.clone(),
            results: self.result_feed.clone(),
        }
    }

    /// Main event loop. Runs until `shutdown` broadcasts `true` or its
    /// sender is dropped. In-flight executions are cancelled on the way out
    /// and their results are still logged if they arrive within a short grace
    /// period.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let Self {
            mut scheduler,
            events_tx,
            mut events,
            mut results,
            ..
        } = self;
        // The loop only listens; external handles own the event senders.
        drop(events_tx);

        info!("scheduler engine started");
        let timer = tokio::time::sleep(wake_delay(scheduler.try_schedule(Utc::now())));
        tokio::pin!(timer);

        loop {
            tokio::select! {
                Some(event) = events.recv() => {
                    let (kind, name) = (event.kind, event.task_name().to_string());
                    if let Err(e) = scheduler.apply(event, Utc::now()) {
                        warn!(task = %name, %kind, error = %e, "task event rejected");
                    }
                }
                Some(result) = results.recv() => {
                    scheduler.handle_result(result);
                }
                () = &mut timer => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }

            let delay = scheduler.try_schedule(Utc::now());
            timer.as_mut().reset(Instant::now() + wake_delay(delay));
        }

        let cancelled = scheduler.cancel_all();
        info!(
            planned = scheduler.plan_count(),
            cancelled, "scheduler engine shutting down"
        );

        // Record the killed runs too, but never wait on them for long.
        let grace = tokio::time::sleep(SHUTDOWN_GRACE);
        tokio::pin!(grace);
        while !scheduler.tracker.is_empty() {
            tokio::select! {
                Some(result) = results.recv() => scheduler.handle_result(result),
                () = &mut grace => {
                    warn!(
                        abandoned = scheduler.executing_count(),
                        "executions still running at shutdown"
                    );
                    break;
                }
            }
        }
    }
}

/// How long `run` keeps collecting results after cancelling at shutdown.
const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(5);

/// Non-positive delays mean "due already".
fn wake_delay(delay: TimeDelta) -> std::time::Duration {
    delay.to_std().unwrap_or(std::time::Duration::ZERO)
}
