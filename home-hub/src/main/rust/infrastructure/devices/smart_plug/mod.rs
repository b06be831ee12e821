pub mod codec;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::DeviceDriver;
use crate::domain::value_objects::DeviceStatus;

pub const DEFAULT_PLUG_PORT: u16 = 9999;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Responses larger than this are treated as corrupt
const MAX_RESPONSE_BYTES: u32 = 1024 * 1024;

/// The parts of `system.get_sysinfo` the hub uses
#[derive(Debug, Clone, Deserialize)]
pub struct SysInfo {
    pub relay_state: u8,
    #[serde(default)]
    pub on_time: u64,
    pub mac: Option<String>,
    #[serde(default)]
    pub err_code: i64,
}

/// Request/response client for one smart plug
#[derive(Debug, Clone)]
pub struct SmartPlugClient {
    address: String,
    port: u16,
    timeout: Duration,
}

impl SmartPlugClient {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send one command and return the decoded JSON response
    pub async fn request(&self, command: &Value) -> Result<Value> {
        let target = format!("{}:{}", self.address, self.port);
        let payload = serde_json::to_vec(command).map_err(|e| DomainError::Protocol(e.to_string()))?;

        let exchange = async {
            let mut socket = TcpStream::connect(&target).await?;
            socket.write_all(&codec::encode_frame(&payload)).await?;

            let len = socket.read_u32().await?;
            if len > MAX_RESPONSE_BYTES {
                return Err(DomainError::Protocol(format!("response of {} bytes is too large", len)));
            }
            let mut body = vec![0u8; len as usize];
            socket.read_exact(&mut body).await?;
            Ok::<_, DomainError>(body)
        };

        let body = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| DomainError::DeviceIo(format!("smart plug {} timed out", target)))??;

        serde_json::from_slice(&codec::decrypt(&body))
            .map_err(|e| DomainError::Protocol(format!("invalid response from {}: {}", target, e)))
    }

    pub async fn sysinfo(&self) -> Result<SysInfo> {
        let response = self.request(&json!({ "system": { "get_sysinfo": null } })).await?;
        let info: SysInfo = serde_json::from_value(response["system"]["get_sysinfo"].clone())
            .map_err(|e| DomainError::Protocol(format!("unexpected get_sysinfo response: {}", e)))?;
        check_err_code("get_sysinfo", info.err_code)?;
        Ok(info)
    }

    pub async fn set_relay_state(&self, on: bool) -> Result<()> {
        let command = json!({ "system": { "set_relay_state": { "state": u8::from(on) } } });
        let response = self.request(&command).await?;

        let result = &response["system"]["set_relay_state"];
        if !result.is_object() {
            return Err(DomainError::Protocol("missing set_relay_state result".to_string()));
        }
        check_err_code("set_relay_state", result["err_code"].as_i64().unwrap_or(0))
    }
}

/// Start of the current on period, or None when the reported uptime is out of range
fn on_since(on_time: u64) -> Option<DateTime<Utc>> {
    let uptime = i64::try_from(on_time).ok().and_then(chrono::Duration::try_seconds)?;
    Utc::now().checked_sub_signed(uptime)
}

fn check_err_code(method: &str, code: i64) -> Result<()> {
    if code != 0 {
        return Err(DomainError::Protocol(format!("{} returned err_code {}", method, code)));
    }
    Ok(())
}

/// A PSU behind a smart plug
pub struct SmartPlug {
    client: SmartPlugClient,
}

impl SmartPlug {
    pub fn new(client: SmartPlugClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeviceDriver for SmartPlug {
    async fn read_state(&self) -> Result<DeviceStatus> {
        let info = self.client.sysinfo().await?;
        let state = info.relay_state != 0;
        let on_since = if state { on_since(info.on_time) } else { None };

        Ok(DeviceStatus {
            state,
            on_since,
            mac: info.mac,
            stream: None,
        })
    }

    async fn set_state(&self, on: bool) -> Result<()> {
        self.client.set_relay_state(on).await
    }
}
