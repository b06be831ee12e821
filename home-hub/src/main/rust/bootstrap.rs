use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::application::services::{
    BroadcastOptions, Broadcaster, CameraChannel, CameraStream, CameraWatchdog, Device, DeviceRegistry,
    DriftPoller, Hub, ObservedStates, Placeholders, TriggerEngine,
};
use crate::config::{parse_triggers, HubConfig, PsuType};
use crate::domain::ports::{DecoderLauncher, DeviceDriver, GpioPort, MetricsReporter};
use crate::domain::value_objects::{find_trigger_cycle, DeviceId};
use crate::infrastructure::devices::{CameraDevice, GpioRelay, SmartPlug, SmartPlugClient};

/// Adapters the hub is wired against
pub struct Adapters {
    pub launcher: Arc<dyn DecoderLauncher>,
    pub gpio: Arc<dyn GpioPort>,
    pub metrics: Arc<dyn MetricsReporter>,
}

/// A wired hub plus the background tasks serving it
pub struct HubRuntime {
    hub: Arc<Hub>,
    poller: Option<Arc<DriftPoller>>,
    tasks: Vec<JoinHandle<()>>,
}

impl HubRuntime {
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Start drift checks if configured
    pub fn start_polling(&mut self, shutdown: watch::Receiver<bool>) {
        if let Some(poller) = &self.poller {
            self.tasks.push(Arc::clone(poller).spawn(shutdown));
        }
    }

    /// Stop every camera and background task
    pub async fn shutdown(self) {
        self.hub.shutdown().await;
        for task in self.tasks {
            task.abort();
        }
    }
}

/// Build the device registry, camera channels and watchdogs described by `config`,
/// then start the cameras marked for autostart
pub async fn build_hub(config: &HubConfig, adapters: Adapters) -> anyhow::Result<HubRuntime> {
    let Adapters {
        launcher,
        gpio,
        metrics,
    } = adapters;

    let placeholders = Placeholders::new(
        load_placeholder(config.camera_off_path.as_deref()).await?,
        load_placeholder(config.camera_error_path.as_deref()).await?,
    );
    let options = BroadcastOptions {
        queue_capacity: config.viewer_queue_capacity,
        placeholder_interval: config.placeholder_interval(),
        placeholders,
    };

    let mut registry = DeviceRegistry::new();

    for (id, psu) in &config.psus {
        let driver: Arc<dyn DeviceDriver> = match psu.kind {
            PsuType::Gpio => {
                let pin = psu.gpio.with_context(|| format!("PSU {} has no gpio pin", id))?;
                Arc::new(GpioRelay::new(Arc::clone(&gpio), pin))
            }
            PsuType::SmartPlug => {
                let address = psu
                    .address
                    .clone()
                    .with_context(|| format!("PSU {} has no address", id))?;
                Arc::new(SmartPlug::new(SmartPlugClient::new(address, psu.plug_port)))
            }
        };
        let device = Device::new(DeviceId::psu(id), driver)
            .with_name(psu.name.clone())
            .with_triggers(parse_triggers(&psu.triggers)?);
        registry.register(device)?;
    }

    for (id, light) in &config.lights {
        let driver = Arc::new(GpioRelay::new(Arc::clone(&gpio), light.gpio));
        let device = Device::new(DeviceId::light(id), driver)
            .with_name(light.name.clone())
            .with_triggers(parse_triggers(&light.triggers)?);
        registry.register(device)?;
    }

    let mut cameras = BTreeMap::new();
    for (id, entry) in &config.cameras {
        let stream = Arc::new(CameraStream::new(
            id.clone(),
            entry.to_camera_config()?,
            Arc::clone(&launcher),
        ));
        let device = Device::new(DeviceId::camera(id), Arc::new(CameraDevice::new(Arc::clone(&stream))))
            .with_name(entry.name.clone())
            .with_triggers(parse_triggers(&entry.triggers)?);
        registry.register(device)?;

        let broadcaster = Broadcaster::new(stream, options.clone(), Arc::clone(&metrics));
        cameras.insert(id.clone(), CameraChannel::new(broadcaster));
    }

    registry.validate_triggers()?;
    if let Some(cycle) = find_trigger_cycle(&registry.trigger_graph()) {
        let path: Vec<String> = cycle.iter().map(ToString::to_string).collect();
        tracing::warn!(
            cycle = %path.join(" -> "),
            "Trigger cycle configured, each device is switched at most once per change"
        );
    }

    let registry = Arc::new(registry);
    let engine = Arc::new(TriggerEngine::new(
        Arc::clone(&registry),
        Arc::new(ObservedStates::new()),
        Arc::clone(&metrics),
    ));

    let retry = config.retry_policy()?;
    let mut tasks = Vec::new();
    for (id, channel) in &cameras {
        let label = registry.get(&DeviceId::camera(id))?.label();
        tasks.push(channel.broadcaster().spawn_relay());
        tasks.push(
            CameraWatchdog::new(Arc::clone(channel.stream()), label, retry.clone(), Arc::clone(&metrics)).spawn(),
        );
    }

    let poller = config
        .state_check_interval()
        .map(|interval| Arc::new(DriftPoller::new(Arc::clone(&engine), interval, Arc::clone(&metrics))));

    let hub = Arc::new(Hub::new(engine, cameras));

    for (id, entry) in &config.cameras {
        if !entry.autostart {
            continue;
        }
        if let Some(channel) = hub.camera(id) {
            // The watchdog logs the failure and schedules the retry
            if let Err(err) = channel.stream().start().await {
                tracing::debug!(camera = %id, error = %err, "Autostart failed");
            }
        }
    }

    tracing::info!(
        devices = registry.len(),
        cameras = config.cameras.len(),
        "Hub ready"
    );

    Ok(HubRuntime { hub, poller, tasks })
}

async fn load_placeholder(path: Option<&Path>) -> anyhow::Result<Option<Bytes>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let jpeg = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read placeholder image {}", path.display()))?;
    Ok(Some(Bytes::from(jpeg)))
}
