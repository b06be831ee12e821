use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use warp::http::header::{HeaderValue, CACHE_CONTROL, CONTENT_TYPE};
use warp::http::StatusCode;
use warp::hyper::Body;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use super::ChannelSink;
use crate::application::services::{Hub, STREAM_CONTENT_TYPE};
use crate::domain::value_objects::{DeviceId, DeviceKind};

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct SetStateBody {
    state: Option<bool>,
}

/// Every hub endpoint. Unmatched requests get a JSON 404.
pub fn routes(hub: Arc<Hub>) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let with_hub = warp::any().map(move || Arc::clone(&hub));

    let list = warp::get()
        .and(warp::path!("psus").map(|| DeviceKind::Psu))
        .or(warp::get().and(warp::path!("lights").map(|| DeviceKind::Light)))
        .unify()
        .or(warp::get().and(warp::path!("cameras").map(|| DeviceKind::Camera)))
        .unify()
        .and(with_hub.clone())
        .then(list_devices);

    let stream = warp::get()
        .and(warp::path!("camera" / String / "stream"))
        .and(with_hub.clone())
        .then(stream_camera);

    let still = warp::get()
        .and(warp::path!("camera" / String / "still"))
        .and(with_hub.clone())
        .then(still_image);

    let get_device = warp::get()
        .and(warp::path!(String / String))
        .and(with_hub.clone())
        .then(get_device);

    let set_device = warp::post()
        .and(warp::path!(String / String))
        .and(warp::body::bytes())
        .and(with_hub.clone())
        .then(set_device);

    let device_action = warp::post()
        .and(warp::path!(String / String / String))
        .and(with_hub)
        .then(device_action);

    list.or(stream)
        .unify()
        .or(still)
        .unify()
        .or(get_device)
        .unify()
        .or(set_device)
        .unify()
        .or(device_action)
        .unify()
        .recover(|_: Rejection| async { Ok::<_, Infallible>(not_found()) })
        .unify()
        .with(warp::trace::request())
}

/// Bind the hub API on `addr`, serving until `shutdown` resolves
pub fn bind(
    hub: Arc<Hub>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, impl Future<Output = ()>), warp::Error> {
    warp::serve(routes(hub)).try_bind_with_graceful_shutdown(addr, shutdown)
}

fn json_reply<T: Serialize>(value: &T, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(value), status).into_response()
}

fn error_reply(status: StatusCode) -> Response {
    let error = status.canonical_reason().unwrap_or("Error");
    json_reply(&ErrorBody { error }, status)
}

fn not_found() -> Response {
    error_reply(StatusCode::NOT_FOUND)
}

fn resolve(hub: &Hub, kind: &str, id: String) -> Option<DeviceId> {
    let kind = kind.parse::<DeviceKind>().ok()?;
    let device = DeviceId::new(kind, id);
    hub.registry().contains(&device).then_some(device)
}

async fn list_devices(kind: DeviceKind, hub: Arc<Hub>) -> Response {
    json_reply(&hub.list(kind).await, StatusCode::OK)
}

async fn get_device(kind: String, id: String, hub: Arc<Hub>) -> Response {
    let Some(device) = resolve(&hub, &kind, id) else {
        return not_found();
    };
    switch(&hub, &device, None).await
}

async fn set_device(kind: String, id: String, body: Bytes, hub: Arc<Hub>) -> Response {
    let Some(device) = resolve(&hub, &kind, id) else {
        return not_found();
    };

    let request = if body.iter().all(u8::is_ascii_whitespace) {
        SetStateBody::default()
    } else {
        match serde_json::from_slice::<SetStateBody>(&body) {
            Ok(request) => request,
            Err(err) => {
                tracing::debug!(device = %device, error = %err, "Rejected set request");
                return error_reply(StatusCode::BAD_REQUEST);
            }
        }
    };
    switch(&hub, &device, request.state).await
}

async fn device_action(kind: String, id: String, action: String, hub: Arc<Hub>) -> Response {
    let on = match action.as_str() {
        "on" => true,
        "off" => false,
        _ => return not_found(),
    };
    let Some(device) = resolve(&hub, &kind, id) else {
        return not_found();
    };
    switch(&hub, &device, Some(on)).await
}

/// Optionally switch, then reply with the device status
async fn switch(hub: &Hub, device: &DeviceId, state: Option<bool>) -> Response {
    let result = match state {
        Some(on) => hub.set(device, on).await,
        None => hub.status(device).await,
    };

    match result {
        Ok(status) => json_reply(&status, StatusCode::OK),
        Err(err) => {
            tracing::error!(device = %device, error = %err, "Device request failed");
            error_reply(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn stream_camera(id: String, hub: Arc<Hub>) -> Response {
    let Some(channel) = hub.camera(&id) else {
        return not_found();
    };

    let (sink, rx) = ChannelSink::pair();
    channel.broadcaster().subscribe(Box::new(sink));

    let body = Body::wrap_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(STREAM_CONTENT_TYPE));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache, no-store"));
    response
}

async fn still_image(id: String, hub: Arc<Hub>) -> Response {
    let Some(channel) = hub.camera(&id) else {
        return not_found();
    };

    match channel.broadcaster().still().await {
        Some(jpeg) => {
            let mut response = Response::new(Body::from(jpeg));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("image/jpeg"));
            response
        }
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::testing::{CountingMetrics, FailingLauncher, SwitchBank};
    use crate::application::services::{
        BroadcastOptions, Broadcaster, CameraChannel, CameraStream, Device, DeviceRegistry, ObservedStates,
        TriggerEngine,
    };
    use crate::domain::value_objects::CameraConfig;
    use crate::infrastructure::devices::CameraDevice;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;

    fn hub(bank: &mut SwitchBank) -> Arc<Hub> {
        let metrics = Arc::new(CountingMetrics::default());
        let mut registry = DeviceRegistry::new();
        let psu = bank.add(DeviceId::psu("1"));
        registry
            .register(Device::new(DeviceId::psu("1"), psu).with_triggers(vec!["light:1".parse().unwrap()]))
            .unwrap();
        let light = bank.add(DeviceId::light("1"));
        registry.register(Device::new(DeviceId::light("1"), light)).unwrap();
        let broken = bank.add_broken(DeviceId::light("2"));
        registry.register(Device::new(DeviceId::light("2"), broken)).unwrap();

        let config = CameraConfig::new("rtsp://camera.local/stream").unwrap();
        let stream = Arc::new(CameraStream::new("1", config, Arc::new(FailingLauncher)));
        registry
            .register(Device::new(DeviceId::camera("1"), Arc::new(CameraDevice::new(stream.clone()))))
            .unwrap();
        let broadcaster = Broadcaster::new(stream, BroadcastOptions::default(), metrics.clone());
        let cameras = BTreeMap::from([("1".to_string(), CameraChannel::new(broadcaster))]);

        let engine = TriggerEngine::new(Arc::new(registry), Arc::new(ObservedStates::new()), metrics);
        Arc::new(Hub::new(Arc::new(engine), cameras))
    }

    fn body_json(response: &warp::http::Response<Bytes>) -> Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[tokio::test]
    async fn test_list_psus() {
        let mut bank = SwitchBank::default();
        let api = routes(hub(&mut bank));

        let response = warp::test::request().path("/psus").reply(&api).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(&response), json!([{ "state": false }]));
    }

    #[tokio::test]
    async fn test_list_lights_has_null_for_unreadable() {
        let mut bank = SwitchBank::default();
        let api = routes(hub(&mut bank));

        let response = warp::test::request().path("/lights").reply(&api).await;
        assert_eq!(body_json(&response), json!([{ "state": false }, null]));
    }

    #[tokio::test]
    async fn test_get_device_statuses() {
        let mut bank = SwitchBank::default();
        let api = routes(hub(&mut bank));

        let response = warp::test::request().path("/light/1").reply(&api).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = warp::test::request().path("/light/2").reply(&api).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(&response), json!({ "error": "Internal Server Error" }));

        let response = warp::test::request().path("/camera/1").reply(&api).await;
        assert_eq!(body_json(&response), json!({ "state": false, "stream": "idle" }));
    }

    #[tokio::test]
    async fn test_unknown_paths_are_json_404() {
        let mut bank = SwitchBank::default();
        let api = routes(hub(&mut bank));

        for path in ["/psu/9", "/fan/1", "/nothing", "/camera/9/stream"] {
            let response = warp::test::request().path(path).reply(&api).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", path);
            assert_eq!(body_json(&response), json!({ "error": "Not Found" }));
        }

        let response = warp::test::request().method("DELETE").path("/psus").reply(&api).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_post_state_runs_triggers() {
        let mut bank = SwitchBank::default();
        let api = routes(hub(&mut bank));

        let response = warp::test::request()
            .method("POST")
            .path("/psu/1")
            .json(&json!({ "state": true }))
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(&response), json!({ "state": true }));
        assert!(bank.switches[&DeviceId::light("1")].is_on());
    }

    #[tokio::test]
    async fn test_post_without_state_only_reads() {
        let mut bank = SwitchBank::default();
        let api = routes(hub(&mut bank));

        let response = warp::test::request().method("POST").path("/psu/1").reply(&api).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(bank.writes().is_empty());
    }

    #[tokio::test]
    async fn test_post_invalid_body_is_400() {
        let mut bank = SwitchBank::default();
        let api = routes(hub(&mut bank));

        let response = warp::test::request()
            .method("POST")
            .path("/light/1")
            .body(r#"{"state":"yes"}"#)
            .reply(&api)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(&response), json!({ "error": "Bad Request" }));
    }

    #[tokio::test]
    async fn test_on_off_actions() {
        let mut bank = SwitchBank::default();
        let api = routes(hub(&mut bank));

        let response = warp::test::request().method("POST").path("/light/1/on").reply(&api).await;
        assert_eq!(body_json(&response), json!({ "state": true }));

        let response = warp::test::request().method("POST").path("/light/1/off").reply(&api).await;
        assert_eq!(body_json(&response), json!({ "state": false }));

        let response = warp::test::request().method("POST").path("/light/1/toggle").reply(&api).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_camera_that_cannot_start_is_500() {
        let mut bank = SwitchBank::default();
        let api = routes(hub(&mut bank));

        let response = warp::test::request().method("POST").path("/camera/1/on").reply(&api).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = warp::test::request().path("/camera/1").reply(&api).await;
        assert_eq!(body_json(&response), json!({ "state": false, "stream": "error" }));
    }

    #[tokio::test]
    async fn test_still_of_idle_camera_is_204() {
        let mut bank = SwitchBank::default();
        let api = routes(hub(&mut bank));

        let response = warp::test::request().path("/camera/1/still").reply(&api).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
