//! Bridge from the task store to the scheduler's event channel.

use std::collections::HashSet;
use std::sync::Arc;

use cronwork_core::{Task, TaskEvent, TaskEventKind};
use cronwork_scheduler::SchedulerHandle;
use cronwork_store::TaskStore;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Feed every store change into the scheduler until shutdown.
///
/// Starts with a SAVE per existing task. If the subscription lags behind the
/// store, the forwarder takes a fresh snapshot and replays it, deleting tasks
/// that vanished in the meantime.
pub async fn forward_events(
    store: Arc<TaskStore>,
    scheduler: SchedulerHandle,
    mut shutdown: watch::Receiver<bool>,
) {
    let (snapshot, mut rx) = store.watch();
    let mut known = HashSet::new();
    if !replay(&scheduler, &mut known, snapshot).await {
        return;
    }
    info!(tasks = known.len(), "task watch started");

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(event) => {
                    track(&mut known, &event);
                    debug!(task = %event.task_name(), kind = %event.kind, "forwarding task event");
                    if scheduler.push_event(event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "task watch lagged, resynchronising");
                    let (snapshot, fresh) = store.watch();
                    rx = fresh;
                    if !replay(&scheduler, &mut known, snapshot).await {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("task watch stopped");
}

/// Events that bring a scheduler which has seen `known` in line with `snapshot`.
fn resync_events(known: &HashSet<String>, snapshot: Vec<Task>) -> Vec<TaskEvent> {
    let present: HashSet<&str> = snapshot.iter().map(|t| t.name.as_str()).collect();
    let mut events: Vec<TaskEvent> = known
        .iter()
        .filter(|name| !present.contains(name.as_str()))
        .map(|name| TaskEvent::delete(name.clone()))
        .collect();
    events.sort_by(|a, b| a.task.name.cmp(&b.task.name));
    events.extend(snapshot.into_iter().map(TaskEvent::save));
    events
}

/// Push a snapshot replay. Returns `false` once the scheduler is gone.
async fn replay(
    scheduler: &SchedulerHandle,
    known: &mut HashSet<String>,
    snapshot: Vec<Task>,
) -> bool {
    for event in resync_events(known, snapshot) {
        track(known, &event);
        if scheduler.push_event(event).await.is_err() {
            return false;
        }
    }
    true
}

fn track(known: &mut HashSet<String>, event: &TaskEvent) {
    match event.kind {
        TaskEventKind::Save => {
            known.insert(event.task.name.clone());
        }
        TaskEventKind::Delete => {
            known.remove(&event.task.name);
        }
        TaskEventKind::Kill => {}
    }
}
