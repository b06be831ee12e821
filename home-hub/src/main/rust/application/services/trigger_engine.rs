use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::device_registry::{DeviceRegistry, ObservedStates};
use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::MetricsReporter;
use crate::domain::value_objects::{DeviceId, Trigger};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Bookkeeping for one propagation starting from a single state change
#[derive(Debug, Default)]
pub struct Cascade {
    visited: HashSet<DeviceId>,
    switched: Vec<(DeviceId, bool)>,
    failures: usize,
}

impl Cascade {
    fn rooted(root: &DeviceId) -> Self {
        let mut cascade = Self::default();
        cascade.visited.insert(root.clone());
        cascade
    }

    /// Devices switched by triggers, in firing order
    pub fn switched(&self) -> &[(DeviceId, bool)] {
        &self.switched
    }

    /// Triggers that failed or were skipped
    pub fn failures(&self) -> usize {
        self.failures
    }
}

/// Switches devices and runs their triggers depth-first.
///
/// Within one cascade each device is switched at most once, so trigger cycles terminate.
/// A failing trigger is logged and does not stop its siblings.
pub struct TriggerEngine {
    registry: Arc<DeviceRegistry>,
    observed: Arc<ObservedStates>,
    metrics: Arc<dyn MetricsReporter>,
}

impl TriggerEngine {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        observed: Arc<ObservedStates>,
        metrics: Arc<dyn MetricsReporter>,
    ) -> Self {
        Self {
            registry,
            observed,
            metrics,
        }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn observed(&self) -> &Arc<ObservedStates> {
        &self.observed
    }

    /// Switch `id` and then run its triggers. Only a failure of `id` itself is returned.
    pub async fn set(&self, id: &DeviceId, on: bool) -> Result<Cascade> {
        let device = self.registry.get(id)?;
        self.registry.apply(id, on).await?;
        self.observed.record(id, on);

        let mut cascade = Cascade::rooted(id);
        self.run_triggers(device.triggers(), on, &mut cascade).await;
        Ok(cascade)
    }

    /// Run the triggers of `source` for a change that already happened outside the hub
    pub async fn propagate_from(&self, source: &DeviceId, value: bool) -> Result<Cascade> {
        let device = self.registry.get(source)?;
        let mut cascade = Cascade::rooted(source);
        self.run_triggers(device.triggers(), value, &mut cascade).await;
        Ok(cascade)
    }

    /// Run an ad hoc trigger list with a fresh cascade
    pub async fn propagate(&self, triggers: &[Trigger], value: bool) -> Cascade {
        let mut cascade = Cascade::default();
        self.run_triggers(triggers, value, &mut cascade).await;
        cascade
    }

    fn run_triggers<'a>(
        &'a self,
        triggers: &'a [Trigger],
        value: bool,
        cascade: &'a mut Cascade,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            for trigger in triggers {
                match self.fire(trigger, value, cascade).await {
                    Ok(()) => {}
                    Err(DomainError::TriggerCycle(target)) => {
                        cascade.failures += 1;
                        tracing::warn!(trigger = %trigger, "Skipping trigger, {} was already switched", target);
                    }
                    Err(err) => {
                        cascade.failures += 1;
                        self.metrics.report_trigger_failure(trigger.target());
                        let err = DomainError::TriggerFailure {
                            trigger: trigger.to_string(),
                            reason: err.to_string(),
                        };
                        tracing::warn!(error = %err, "Trigger failed");
                    }
                }
            }
        })
    }

    async fn fire(&self, trigger: &Trigger, value: bool, cascade: &mut Cascade) -> Result<()> {
        let target = trigger.target();
        if !cascade.visited.insert(target.clone()) {
            return Err(DomainError::TriggerCycle(target.clone()));
        }

        let effective = trigger.effective_value(value);
        let device = self.registry.get(target)?;
        self.registry.apply(target, effective).await?;
        self.observed.record(target, effective);
        cascade.switched.push((target.clone(), effective));

        self.run_triggers(device.triggers(), effective, cascade).await;
        Ok(())
    }
}
