use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::{counter, histogram};
use sqlx::Error as SqlxError;
use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use hirehub_storage::Database;

use crate::mutation::Clock;

const BATCH_LIMIT: i64 = 1000;
const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
const MAX_TTL_HOURS: u64 = 24 * 365 * 100;

/// Background worker that prunes the change log and checkpoints the WAL.
#[derive(Clone)]
pub struct MaintenanceWorker {
    database: Database,
    ttl: ChronoDuration,
    clock: Clock,
    interval: Duration,
}

/// Outcome of one change log sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: u64,
    pub busy: bool,
}

impl MaintenanceWorker {
    pub fn new(database: Database, ttl_hours: u64) -> Self {
        Self {
            database,
            ttl: ChronoDuration::hours(ttl_hours.min(MAX_TTL_HOURS) as i64),
            clock: Arc::new(Utc::now),
            interval: DEFAULT_INTERVAL,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run_loop().await;
        })
    }

    async fn run_loop(self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = self.run_once().await {
                error!(stage = "storage", error = %err, "maintenance run failed");
            }
        }
    }

    /// Executes one maintenance cycle (TTL + checkpoint).
    pub async fn run_once(&self) -> Result<SweepReport, MaintenanceError> {
        let now = (self.clock)();
        let threshold = now - self.ttl;

        let report = self.prune_change_log(threshold).await?;
        info!(
            stage = "storage",
            table = "change_log",
            deleted = report.deleted,
            busy = report.busy,
            threshold = %threshold.to_rfc3339(),
            "change_log TTL sweep completed"
        );

        self.run_checkpoint().await?;
        Ok(report)
    }

    async fn prune_change_log(&self, threshold: DateTime<Utc>) -> Result<SweepReport, MaintenanceError> {
        let repo = self.database.change_log();
        let mut report = SweepReport {
            deleted: 0,
            busy: false,
        };

        loop {
            match repo.delete_older_than_batch(threshold, BATCH_LIMIT).await {
                Ok(0) => break,
                Ok(batch_deleted) => {
                    report.deleted += batch_deleted;
                    counter!("db_ttl_deleted_total", "table" => "change_log").increment(batch_deleted);
                }
                Err(err) if is_sqlite_busy(&err) => {
                    report.busy = true;
                    counter!("db_busy_total", "op" => "ttl").increment(1);
                    warn!(stage = "storage", table = "change_log", error = %err, "ttl delete hit busy timeout");
                    break;
                }
                Err(err) => return Err(MaintenanceError::TtlDelete { source: err }),
            }
        }

        Ok(report)
    }

    async fn run_checkpoint(&self) -> Result<(), MaintenanceError> {
        let start = std::time::Instant::now();

        match self.database.wal_checkpoint_truncate().await {
            Ok(stats) => {
                let duration = start.elapsed().as_secs_f64();
                histogram!("db_checkpoint_seconds").record(duration);
                if stats.busy_frames > 0 {
                    counter!("db_busy_total", "op" => "checkpoint").increment(1);
                    warn!(
                        stage = "storage",
                        busy_frames = stats.busy_frames,
                        log_frames = stats.log_frames,
                        checkpointed_frames = stats.checkpointed_frames,
                        duration_secs = duration,
                        "WAL checkpoint completed with busy frames"
                    );
                } else {
                    info!(
                        stage = "storage",
                        log_frames = stats.log_frames,
                        checkpointed_frames = stats.checkpointed_frames,
                        duration_secs = duration,
                        "WAL checkpoint completed"
                    );
                }
                Ok(())
            }
            Err(err) if is_sqlite_busy(&err) => {
                counter!("db_busy_total", "op" => "checkpoint").increment(1);
                warn!(stage = "storage", error = %err, "WAL checkpoint hit busy timeout");
                Ok(())
            }
            Err(err) => Err(MaintenanceError::Checkpoint { source: err }),
        }
    }
}

#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error("failed to delete expired change log rows")]
    TtlDelete {
        #[source]
        source: SqlxError,
    },
    #[error("failed to run WAL checkpoint")]
    Checkpoint {
        #[source]
        source: SqlxError,
    },
}

fn is_sqlite_busy(err: &SqlxError) -> bool {
    match err {
        SqlxError::Database(db_err) => matches!(db_err.code().as_deref(), Some("5") | Some("6")),
        _ => false,
    }
}
