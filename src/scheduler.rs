//! Periodic probe sweeps.
//!
//! One sweep probes every configured target with bounded concurrency,
//! classifies each sample and stores the measurement. The pause between
//! sweeps is measured from sweep completion, so a slow sweep never
//! causes overlapping runs.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::config::Target;
use crate::probe::{
    check_alert_conditions, classify, AlertThresholds, LatencyThresholds, ProbeRunner,
};
use crate::storage::{LogLevel, LogStore, Measurement, MeasurementStore};

pub struct Scheduler {
    targets: Vec<Target>,
    runner: Arc<ProbeRunner>,
    thresholds: LatencyThresholds,
    alerts: AlertThresholds,
    interval: Duration,
    concurrency: usize,
    measurements: MeasurementStore,
    logs: LogStore,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        targets: Vec<Target>,
        runner: ProbeRunner,
        thresholds: LatencyThresholds,
        alerts: AlertThresholds,
        interval: Duration,
        concurrency: usize,
        measurements: MeasurementStore,
        logs: LogStore,
    ) -> Self {
        Self {
            targets,
            runner: Arc::new(runner),
            thresholds,
            alerts,
            interval,
            concurrency,
            measurements,
            logs,
        }
    }

    /// Run sweeps until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            targets = self.targets.len(),
            interval = ?self.interval,
            concurrency = self.concurrency,
            "scheduler started"
        );

        loop {
            self.sweep().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler stopping");
                        return;
                    }
                }
            }
        }
    }

    /// Probe every target once, at most `concurrency` in flight.
    pub async fn sweep(&self) {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for target in self.targets.clone() {
            let semaphore = Arc::clone(&semaphore);
            let runner = Arc::clone(&self.runner);
            let thresholds = self.thresholds;
            let alerts = self.alerts;
            let measurements = self.measurements.clone();
            let logs = self.logs.clone();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                probe_target(&target, &runner, &thresholds, &alerts, &measurements, &logs).await;
            });
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(err) = result {
                error!(error = %err, "probe task panicked");
            }
        }

        debug!(targets = self.targets.len(), "sweep complete");
    }
}

async fn probe_target(
    target: &Target,
    runner: &ProbeRunner,
    thresholds: &LatencyThresholds,
    alerts: &AlertThresholds,
    measurements: &MeasurementStore,
    logs: &LogStore,
) {
    let ts = Utc::now();
    let stats = runner.probe(&target.ip).await;
    let classification = classify(&stats, thresholds);

    debug!(
        ip = %target.ip,
        country = %target.country,
        bucket = %classification.bucket,
        avg = ?stats.avg_time,
        "probe classified"
    );

    if classification.is_high_latency {
        if let Some(avg) = stats.avg_time {
            logs.record(
                LogLevel::Warning,
                "LATENCY_ANALYZER",
                format!("{}: high latency ({avg:.1}ms)", target.country),
                None,
            )
            .await;
        }
    }

    for breach in check_alert_conditions(&stats, alerts) {
        logs.record(
            LogLevel::Warning,
            "ALERTS",
            format!("{} ({}): {breach}", target.country, target.ip),
            None,
        )
        .await;
    }

    let measurement = Measurement {
        id: None,
        server_ip: target.ip.clone(),
        country: target.country.clone(),
        partner: target.partner.clone(),
        dn_ext: target.dn_ext.clone(),
        ts,
        packets_transmitted: stats.packets_transmitted,
        packets_received: stats.packets_received,
        packets_lost: stats.packets_lost,
        loss_percentage: stats.loss_percentage,
        min_time: stats.min_time,
        avg_time: stats.avg_time,
        max_time: stats.max_time,
        mdev_time: stats.mdev_time,
        is_high_latency: classification.is_high_latency,
        success: stats.success,
        concerns: classification.concerns,
    };

    if let Err(err) = measurements.insert(&measurement).await {
        error!(ip = %target.ip, error = %err, "failed to store measurement");
        logs.record(
            LogLevel::Error,
            "PING",
            format!("error storing ping results for {}", target.ip),
            Some(err.to_string()),
        )
        .await;
    }
}
