//! The per-node cluster coordinator.
//!
//! One [`ClusterCoordinator`] per process. Its decision loop ticks every
//! second and decides whether this node should check in for normal
//! scheduling, missed-alert recovery, or cleanup; its dispatch loop executes
//! the resulting task against the store and the evaluation engine. The loops
//! talk over two capacity-1 queues, so at most one task is ever in flight,
//! and only the decision loop touches [`AlertingState`].

use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use takt_core::config::ClusterConfig;
use takt_core::{AlertRunType, AlertStatus, AlertingState, HeartbeatRecord};
use takt_scheduling::{partition_rules, schedule_missed_rules};
use takt_store::{HeartbeatStore, Retention, RuleStore, StoreError};

use crate::clock::CoordClock;
use crate::engine::AlertEngine;
use crate::error::CoordinatorError;
use crate::task::{DispatchStatus, DispatchTask, TaskKind};

/// Entry point: wires the decision and dispatch loops together and runs both
/// until `shutdown` is signalled.
pub struct ClusterCoordinator {
    cfg: ClusterConfig,
    store: Arc<dyn HeartbeatStore>,
    rules: Arc<dyn RuleStore>,
    engine: Arc<dyn AlertEngine>,
    clock: Arc<dyn CoordClock>,
}

impl ClusterCoordinator {
    pub fn new(
        cfg: ClusterConfig,
        store: Arc<dyn HeartbeatStore>,
        rules: Arc<dyn RuleStore>,
        engine: Arc<dyn AlertEngine>,
        clock: Arc<dyn CoordClock>,
    ) -> Self {
        Self {
            cfg,
            store,
            rules,
            engine,
            clock,
        }
    }

    /// Run until shutdown. Each loop tolerates failures inside its own
    /// iteration; only shutdown (or a torn queue) ends it.
    pub async fn run(self, shutdown: Arc<Notify>) -> Result<(), CoordinatorError> {
        info!(node_id = %self.cfg.node_id, "initializing cluster coordinator");

        let (task_tx, task_rx) = mpsc::channel(1);
        let (status_tx, status_rx) = mpsc::channel(1);

        let mut decision = DecisionLoop {
            cfg: self.cfg.clone(),
            store: self.store.clone(),
            rules: self.rules.clone(),
            engine: self.engine.clone(),
            clock: self.clock,
            state: AlertingState::new(),
            task_tx,
            status_rx,
        };
        let dispatcher = Dispatcher {
            cfg: self.cfg,
            store: self.store,
            rules: self.rules,
            engine: self.engine,
            status_tx,
        };

        let (decision_res, dispatch_res) = tokio::join!(
            decision.run(shutdown.clone()),
            dispatcher.run(task_rx, shutdown),
        );
        info!("cluster coordinator has terminated");
        decision_res.and(dispatch_res)
    }
}

// ── Decision loop ────────────────────────────────────────────────────

struct DecisionLoop {
    cfg: ClusterConfig,
    store: Arc<dyn HeartbeatStore>,
    rules: Arc<dyn RuleStore>,
    engine: Arc<dyn AlertEngine>,
    clock: Arc<dyn CoordClock>,
    state: AlertingState,
    task_tx: mpsc::Sender<DispatchTask>,
    status_rx: mpsc::Receiver<DispatchStatus>,
}

impl DecisionLoop {
    async fn run(&mut self, shutdown: Arc<Notify>) -> Result<(), CoordinatorError> {
        info!("decision loop started");
        // One pinned shutdown future for the whole loop, polled before the
        // other arms: a signal arriving while an arm body runs is still seen
        // on the next pass.
        let notified = shutdown.notified();
        tokio::pin!(notified);
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = &mut notified => {
                    info!("decision loop done");
                    return Ok(());
                }
                status = self.status_rx.recv() => {
                    match status {
                        Some(status) => self.handle_status(status).await,
                        None => {
                            error!("dispatch loop went away");
                            return Err(CoordinatorError::ChannelClosed);
                        }
                    }
                }
                _ = ticker.tick() => {
                    let now = self.clock.now();
                    self.tick(now).await;
                }
            }
        }
    }

    /// One decision pass. Every fallible step is handled here so a bad tick
    /// never escapes the loop.
    async fn tick(&mut self, now: DateTime<Utc>) {
        if !self.cfg.alerting_enabled || !self.cfg.execute_alerts {
            return;
        }

        if self.is_time_for_cleanup(now) {
            info!("time to run the cleanup scheduler on one node");
            self.schedule_cleanup().await;
            if self.is_time_for_missing(now) {
                self.schedule_missing().await;
            }
            self.schedule_normal().await;
        } else if self.is_time_for_missing(now) {
            debug!("time to run the missed-alert scheduler on one node");
            self.schedule_missing().await;
            self.schedule_normal().await;
        } else if now.second() == 0 {
            debug!("time to run the normal alert scheduler");
            self.schedule_normal().await;
        }

        if now.second() != 0
            && self.state.status != AlertStatus::Ready
            && self.execution_completed().await
        {
            // Change status in memory, then record it in the store: this
            // READY row is what next minute's membership is computed from.
            self.set_state(AlertStatus::Ready, AlertRunType::Normal);
            self.check_in_current_state().await;
        }
    }

    fn is_time_for_cleanup(&self, now: DateTime<Utc>) -> bool {
        // `from_env` clamps the periods to >= 1, but the config struct is
        // public; a zero period means every boundary, never a panic.
        let period = self.cfg.cleanup_period_hours.max(1);
        now.hour() % period == 0 && now.minute() == 0 && now.second() == 0
    }

    fn is_time_for_missing(&self, now: DateTime<Utc>) -> bool {
        let interval = self.cfg.missing_check_interval_mins.max(1);
        now.minute() % interval == 0 && now.second() == 0
    }

    /// Whether all jobs handed to the engine this cycle have been consumed.
    async fn execution_completed(&self) -> bool {
        match self.state.status {
            AlertStatus::Scheduling => false,
            AlertStatus::Processing => match self.engine.pending_job_count().await {
                Ok(count) => {
                    debug!(count, "pending alert jobs");
                    count == 0
                }
                Err(e) => {
                    error!(error = %e, "failed to get pending alert job count");
                    false
                }
            },
            _ => true,
        }
    }

    /// Try to win this period's cleanup election and dispatch the purge.
    async fn schedule_cleanup(&mut self) {
        if self.state.status != AlertStatus::Ready {
            return;
        }
        let last_heartbeat = match self.store.last_interval().await {
            Ok(hb) => hb,
            Err(e) => {
                error!(error = %e, "failed to get last heartbeat");
                return;
            }
        };

        // Skip if some node already ran cleanup this period.
        let window_start = last_heartbeat - self.cfg.cleanup_period_hours as i64 * 3600;
        match self
            .store
            .find_cleanup_window(window_start, last_heartbeat)
            .await
        {
            Ok(prior) if !prior.is_empty() => {
                debug!("cleanup already ran this period");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "cleanup window check failed");
                return;
            }
        }

        self.set_state(AlertStatus::Scheduling, AlertRunType::Cleanup);
        match self.store.check_in(&self.candidate(), 1).await {
            Ok(_) => {}
            Err(StoreError::AdmissionLimitReached) => {
                info!("other node is running the cleanup job");
                self.set_state(AlertStatus::Ready, AlertRunType::Normal);
                return;
            }
            Err(e) => {
                debug!(error = %e, "cleanup check-in failed");
                self.set_state(AlertStatus::Ready, AlertRunType::Normal);
                return;
            }
        }

        info!("scheduling cleanup");
        self.enqueue(DispatchTask::Cleanup { last_heartbeat }).await;
    }

    /// Try to win the missed-alert election and dispatch the catch-up batch.
    async fn schedule_missing(&mut self) {
        if self.state.status != AlertStatus::Ready {
            return;
        }
        self.set_state(AlertStatus::Scheduling, AlertRunType::Missing);
        match self.store.check_in(&self.candidate(), 1).await {
            Ok(_) => {}
            Err(StoreError::AdmissionLimitReached) => {
                info!("other node picked to process missed alerts");
                self.set_state(AlertStatus::Ready, AlertRunType::Normal);
                return;
            }
            Err(e) => {
                debug!(error = %e, "missed-alert check-in failed");
                self.set_state(AlertStatus::Ready, AlertRunType::Normal);
                return;
            }
        }

        info!(node_id = %self.cfg.node_id, "scheduling missed alerts");
        let missing = match self
            .rules
            .find_missing(self.cfg.missing_delay_secs, self.cfg.missing_lookback_secs)
            .await
        {
            Ok(missing) => missing,
            Err(e) => {
                error!(error = %e, "failed to fetch missed alerts");
                self.set_state(AlertStatus::Ready, AlertRunType::Normal);
                return;
            }
        };
        debug!(count = missing.len(), "missed alerts found");
        if missing.is_empty() {
            self.set_state(AlertStatus::Ready, AlertRunType::Normal);
            return;
        }
        self.enqueue(DispatchTask::MissingAlerts(missing)).await;
    }

    /// Regular per-minute path: resolve this node's shard for the last
    /// completed interval and dispatch it.
    async fn schedule_normal(&mut self) {
        if self.state.status != AlertStatus::Ready {
            return;
        }
        let last_heartbeat = match self.store.last_interval().await {
            Ok(hb) => hb,
            Err(e) => {
                error!(error = %e, "failed to get last heartbeat");
                return;
            }
        };

        // Our shard for this interval was fixed when we checked in READY
        // during the previous minute. No row yet means we are new this
        // minute: check in now and join at the next interval.
        let own = match self
            .store
            .find_by_node_and_heartbeat(&self.cfg.node_id, last_heartbeat)
            .await
        {
            Ok(Some(own)) => own,
            Ok(None) => {
                warn!(heartbeat = last_heartbeat, "no heartbeat record for this node yet");
                self.check_in_current_state().await;
                return;
            }
            Err(e) => {
                error!(error = %e, heartbeat = last_heartbeat, "failed to resolve own heartbeat");
                return;
            }
        };

        let node_count = match self.store.count_ready(last_heartbeat).await {
            Ok(count) => count,
            Err(e) => {
                error!(error = %e, heartbeat = last_heartbeat, "failed to get active node count");
                return;
            }
        };
        debug!(node_count, "active nodes for interval");
        if node_count == 0 {
            warn!("found node count 0");
            return;
        }

        self.set_state(AlertStatus::Scheduling, AlertRunType::Normal);
        self.state.last_processed_interval = last_heartbeat;
        self.enqueue(DispatchTask::PartitionAlerts {
            part_id: own.part_id,
            node_count,
            interval: last_heartbeat,
        })
        .await;
    }

    /// Apply the state transition a finished dispatch implies.
    async fn handle_status(&mut self, status: DispatchStatus) {
        if !status.success {
            error!(kind = %status.kind, error = %status.errmsg, "failed to dispatch task");
            self.set_state(AlertStatus::Ready, AlertRunType::Normal);
            return;
        }
        match status.kind {
            TaskKind::PartitionAlerts => {
                self.set_state_only(AlertStatus::Processing);
            }
            TaskKind::MissingAlerts | TaskKind::Cleanup => {
                // Back to READY so this node's regular shard still runs this
                // interval: its READY check-in from the last heartbeat already
                // counts toward the partitioning.
                if status.kind == TaskKind::Cleanup {
                    info!("cleanup task completed");
                }
                self.set_state(AlertStatus::Ready, AlertRunType::Normal);
                self.schedule_normal().await;
            }
        }
    }

    async fn enqueue(&mut self, task: DispatchTask) {
        let kind = task.kind();
        if self.task_tx.send(task).await.is_err() {
            error!(%kind, "dispatch loop unavailable, dropping task");
            self.set_state(AlertStatus::Ready, AlertRunType::Normal);
        }
    }

    /// Record the current in-memory state as a heartbeat row, unbounded.
    async fn check_in_current_state(&self) {
        if let Err(e) = self.store.check_in(&self.candidate(), 0).await {
            error!(error = %e, "failed to check in");
        }
    }

    fn candidate(&self) -> HeartbeatRecord {
        HeartbeatRecord {
            node_id: self.cfg.node_id.clone(),
            heartbeat: 0, // resolved by the store
            part_id: 0,
            run_type: self.state.run_type,
            status: self.state.status,
        }
    }

    fn set_state(&mut self, status: AlertStatus, run_type: AlertRunType) {
        self.set_state_only(status);
        debug!(run_type = %run_type, "alerting run type");
        self.state.run_type = run_type;
    }

    fn set_state_only(&mut self, status: AlertStatus) {
        info!("alerting state: {} -> {}", self.state.status, status);
        self.state.status = status;
    }
}

// ── Dispatch loop ────────────────────────────────────────────────────

struct Dispatcher {
    cfg: ClusterConfig,
    store: Arc<dyn HeartbeatStore>,
    rules: Arc<dyn RuleStore>,
    engine: Arc<dyn AlertEngine>,
    status_tx: mpsc::Sender<DispatchStatus>,
}

impl Dispatcher {
    async fn run(
        &self,
        mut task_rx: mpsc::Receiver<DispatchTask>,
        shutdown: Arc<Notify>,
    ) -> Result<(), CoordinatorError> {
        info!("dispatch loop started");
        let notified = shutdown.notified();
        tokio::pin!(notified);
        loop {
            tokio::select! {
                biased;
                _ = &mut notified => {
                    info!("dispatch loop done");
                    return Ok(());
                }
                task = task_rx.recv() => {
                    let Some(task) = task else {
                        error!("decision loop went away");
                        return Err(CoordinatorError::ChannelClosed);
                    };
                    let status = self.execute(task).await;
                    if self.status_tx.send(status).await.is_err() {
                        return Err(CoordinatorError::ChannelClosed);
                    }
                }
            }
        }
    }

    /// Execute one task and reduce the outcome to a status message. Always
    /// produces exactly one status, success or failure.
    async fn execute(&self, task: DispatchTask) -> DispatchStatus {
        let kind = task.kind();
        match self.try_execute(task).await {
            Ok(()) => DispatchStatus::ok(kind),
            Err(e) => DispatchStatus::failed(kind, e.to_string()),
        }
    }

    async fn try_execute(&self, task: DispatchTask) -> Result<(), CoordinatorError> {
        match task {
            DispatchTask::PartitionAlerts {
                part_id,
                node_count,
                interval,
            } => {
                let rules = self.rules.fetch_all().await?;
                let jobs = partition_rules(&rules, part_id, node_count, interval)?;
                info!(jobs = jobs.len(), part_id, node_count, "submitting normal alerts batch");
                for job in jobs {
                    self.engine.push_job(job).await?;
                }
            }
            DispatchTask::MissingAlerts(missed) => {
                let jobs = schedule_missed_rules(&missed, self.cfg.missing_delay_secs);
                info!(jobs = jobs.len(), "submitting missed alerts batch");
                for job in jobs {
                    self.engine.push_job(job).await?;
                }
            }
            DispatchTask::Cleanup { last_heartbeat } => {
                info!("running cleanup job");
                let report = self
                    .store
                    .purge_older_than(
                        last_heartbeat,
                        Retention {
                            heartbeat_secs: self.cfg.heartbeat_retention_secs,
                            annotation_secs: self.cfg.annotation_retention_secs,
                        },
                    )
                    .await?;
                info!(
                    heartbeats = report.heartbeats_deleted,
                    annotations = report.annotations_deleted,
                    "cleanup deleted rows"
                );
            }
        }
        Ok(())
    }
}
