use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use trailguard_core::CadenceConfig;

use crate::jobs::Jobs;

/// Commands to control the running daemon.
#[derive(Debug, Clone, Copy)]
pub enum DaemonCommand {
    /// Run every job once, immediately.
    RunAll,
    /// Stop all job loops.
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobKind {
    SignalScan,
    RiskSweep,
    ConvictionCheck,
    HealthAudit,
    Report,
}

impl JobKind {
    const ALL: [JobKind; 5] = [
        JobKind::SignalScan,
        JobKind::RiskSweep,
        JobKind::ConvictionCheck,
        JobKind::HealthAudit,
        JobKind::Report,
    ];

    fn name(self) -> &'static str {
        match self {
            JobKind::SignalScan => "signal-scan",
            JobKind::RiskSweep => "risk-sweep",
            JobKind::ConvictionCheck => "conviction-check",
            JobKind::HealthAudit => "health-audit",
            JobKind::Report => "report",
        }
    }

    fn period(self, cadence: &CadenceConfig) -> Duration {
        let secs = match self {
            JobKind::SignalScan => cadence.signal_scan_secs,
            JobKind::RiskSweep => cadence.risk_sweep_secs,
            JobKind::ConvictionCheck => cadence.conviction_check_secs,
            JobKind::HealthAudit => cadence.health_audit_secs,
            JobKind::Report => cadence.report_secs,
        };
        Duration::from_secs(secs.max(1))
    }
}

async fn run_job(jobs: &Jobs, kind: JobKind) {
    let result = match kind {
        JobKind::SignalScan => jobs.signal_scan().await,
        JobKind::RiskSweep => jobs.risk_sweep().await,
        JobKind::ConvictionCheck => jobs.conviction_check().await,
        JobKind::HealthAudit => jobs.health_audit().await,
        JobKind::Report => jobs.report().await,
    };
    if let Err(e) = result {
        tracing::warn!(job = kind.name(), "job pass failed: {e:#}");
    }
}

/// Runs every job on its own cadence. Jobs overlap freely in wall-clock
/// time; correctness rests on the store lease and the slot ledger, not on
/// scheduling.
pub struct Daemon {
    jobs: Arc<Jobs>,
    cadence: CadenceConfig,
}

impl Daemon {
    pub fn new(jobs: Arc<Jobs>, cadence: CadenceConfig) -> Self {
        Self { jobs, cadence }
    }

    pub fn jobs(&self) -> &Arc<Jobs> {
        &self.jobs
    }

    /// Run every job exactly once, in dependency-friendly order. Used by
    /// one-shot CLI invocations and the `RunAll` command.
    pub async fn run_once(&self) -> Result<()> {
        for kind in JobKind::ALL {
            run_job(&self.jobs, kind).await;
        }
        Ok(())
    }

    /// Spawns one loop per job plus a control task, and returns the command
    /// channel. The loops stop on `Shutdown` or when the channel closes.
    pub fn spawn(self) -> mpsc::Sender<DaemonCommand> {
        let (tx, mut rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);

        for kind in JobKind::ALL {
            let jobs = Arc::clone(&self.jobs);
            let period = kind.period(&self.cadence);
            let mut stop = stop_rx.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                tracing::info!(job = kind.name(), ?period, "job loop started");
                loop {
                    tokio::select! {
                        _ = interval.tick() => run_job(&jobs, kind).await,
                        result = stop.changed() => {
                            if result.is_err() || *stop.borrow() {
                                break;
                            }
                        }
                    }
                }
                tracing::info!(job = kind.name(), "job loop stopped");
            });
        }

        let jobs = self.jobs;
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    DaemonCommand::RunAll => {
                        tracing::info!("running all jobs on demand");
                        for kind in JobKind::ALL {
                            run_job(&jobs, kind).await;
                        }
                    }
                    DaemonCommand::Shutdown => {
                        tracing::info!("daemon shutting down");
                        break;
                    }
                }
            }
            // Dropped sender also lands here and stops the loops.
            let _ = stop_tx.send(true);
        });

        tx
    }
}
