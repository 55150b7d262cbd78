//! Periodic driver for automatic session transitions

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::{CoreEngine, CoreEvent};

/// Calls `CoreEngine::tick` every interval and forwards the events.
///
/// Ticks never overlap: a slow tick delays the next one instead of
/// bunching them up.
pub struct Scheduler {
    engine: Arc<CoreEngine>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(engine: Arc<CoreEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    pub fn start(self, events: mpsc::UnboundedSender<CoreEvent>) -> SchedulerHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_ms = self.interval.as_millis() as u64, "Scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let emitted = self.engine.tick(rollcall_util::now()).await;
                        if !emitted.is_empty() {
                            debug!(count = emitted.len(), "Tick produced events");
                        }
                        for event in emitted {
                            if events.send(event).is_err() {
                                warn!("Event receiver dropped, stopping scheduler");
                                return;
                            }
                        }
                    }
                    _ = stop_rx.changed() => {
                        info!("Scheduler stopped");
                        return;
                    }
                }
            }
        });

        SchedulerHandle { stop_tx, task }
    }
}

/// Handle to a running scheduler
pub struct SchedulerHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop after the tick in progress, if any, completes
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Scheduler task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockVerifier;
    use rollcall_api::{MethodSet, ScheduleType, SessionDraft, SessionStatus};
    use rollcall_config::ServiceSettings;
    use rollcall_store::SqliteStore;
    use rollcall_util::OwnerId;

    #[tokio::test]
    async fn test_scheduler_opens_due_session() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let engine = Arc::new(CoreEngine::new(
            &ServiceSettings::default(),
            store,
            Arc::new(MockVerifier::default()),
        ));

        let now = rollcall_util::now();
        let session = engine
            .create_session(
                SessionDraft {
                    owner_id: OwnerId::new("ta"),
                    title: "Lab".into(),
                    geofence: None,
                    start_time: now,
                    end_time: None,
                    duration_minutes: Some(60),
                    grace_period_minutes: 0,
                    schedule_type: ScheduleType::OneTime,
                    recurrence: None,
                    auto_start: true,
                    auto_end: true,
                    methods: MethodSet::MANUAL,
                },
                now - chrono::Duration::minutes(1),
            )
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = Scheduler::new(engine.clone(), Duration::from_millis(20)).start(tx);

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, CoreEvent::SessionOpened { .. }));

        handle.stop().await;
        assert_eq!(
            engine.get_session(&session.id).unwrap().status,
            SessionStatus::Open
        );
    }
}
