use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::trigger_engine::TriggerEngine;
use crate::domain::ports::MetricsReporter;
use crate::domain::value_objects::DeviceId;

/// Periodically reads every device and runs triggers for changes made outside the hub
pub struct DriftPoller {
    engine: Arc<TriggerEngine>,
    interval: Duration,
    metrics: Arc<dyn MetricsReporter>,
}

impl DriftPoller {
    pub fn new(engine: Arc<TriggerEngine>, interval: Duration, metrics: Arc<dyn MetricsReporter>) -> Self {
        Self {
            engine,
            interval,
            metrics,
        }
    }

    /// One pass over all devices. Returns the devices whose state drifted.
    ///
    /// The first observation of a device only seeds the cache. Unreadable devices are skipped.
    pub async fn poll_once(&self) -> Vec<DeviceId> {
        let registry = Arc::clone(self.engine.registry());
        let observed = Arc::clone(self.engine.observed());
        let mut drifted = Vec::new();

        for device in registry.devices() {
            let id = device.id();
            let status = match registry.read(id).await {
                Ok(status) => status,
                Err(err) => {
                    tracing::debug!(device = %id, error = %err, "State check failed");
                    continue;
                }
            };

            match observed.get(id) {
                None => {
                    observed.record(id, status.state);
                }
                Some(previous) if previous == status.state => {}
                Some(_) => {
                    tracing::info!(
                        device = %id,
                        state = status.state,
                        "[{}] {} changed state outside the hub",
                        id.kind().label(),
                        device.label()
                    );
                    self.metrics.report_drift(id);

                    // Cascade first so its own writes are not mistaken for drift next pass
                    if let Err(err) = self.engine.propagate_from(id, status.state).await {
                        tracing::warn!(device = %id, error = %err, "Drift propagation failed");
                    }
                    observed.record(id, status.state);
                    drifted.push(id.clone());
                }
            }
        }

        drifted
    }

    /// Poll until `shutdown` flips to true
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(interval = ?self.interval, "State checks started");
            loop {
                self.poll_once().await;

                tokio::select! {
                    _ = tokio::time::sleep(self.interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("State checks stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::device_registry::{Device, DeviceRegistry, ObservedStates};
    use crate::application::services::testing::{CountingMetrics, SwitchBank};

    fn poller(bank: &mut SwitchBank) -> (Arc<DriftPoller>, Arc<CountingMetrics>) {
        let mut registry = DeviceRegistry::new();
        let psu = bank.add(DeviceId::psu("1"));
        let light = bank.add(DeviceId::light("1"));
        let broken = bank.add_broken(DeviceId::light("2"));
        registry
            .register(Device::new(DeviceId::psu("1"), psu).with_triggers(vec!["light:1".parse().unwrap()]))
            .unwrap();
        registry.register(Device::new(DeviceId::light("1"), light)).unwrap();
        registry.register(Device::new(DeviceId::light("2"), broken)).unwrap();

        let metrics = Arc::new(CountingMetrics::default());
        let engine = Arc::new(TriggerEngine::new(
            Arc::new(registry),
            Arc::new(ObservedStates::new()),
            metrics.clone(),
        ));
        let poller = Arc::new(DriftPoller::new(engine, Duration::from_millis(10), metrics.clone()));
        (poller, metrics)
    }

    #[tokio::test]
    async fn test_first_pass_only_seeds() {
        let mut bank = SwitchBank::default();
        let (poller, _) = poller(&mut bank);
        bank.switches[&DeviceId::psu("1")].force(true);

        assert!(poller.poll_once().await.is_empty());
        assert!(bank.writes().is_empty());
    }

    #[tokio::test]
    async fn test_external_change_fires_triggers_once() {
        let mut bank = SwitchBank::default();
        let (poller, metrics) = poller(&mut bank);
        poller.poll_once().await;

        bank.switches[&DeviceId::psu("1")].force(true);
        assert_eq!(poller.poll_once().await, [DeviceId::psu("1")]);
        assert_eq!(bank.writes(), [(DeviceId::light("1"), true)]);
        assert_eq!(*metrics.drifts.lock(), [DeviceId::psu("1")]);

        // The cascade's own write is not drift
        assert!(poller.poll_once().await.is_empty());
    }

    #[tokio::test]
    async fn test_local_switch_is_not_drift() {
        let mut bank = SwitchBank::default();
        let (poller, _) = poller(&mut bank);
        poller.poll_once().await;

        poller.engine.set(&DeviceId::psu("1"), true).await.unwrap();
        assert!(poller.poll_once().await.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_stops_on_shutdown() {
        let mut bank = SwitchBank::default();
        let (poller, _) = poller(&mut bank);
        let (tx, rx) = watch::channel(false);

        let handle = Arc::clone(&poller).spawn(rx);
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }
}
