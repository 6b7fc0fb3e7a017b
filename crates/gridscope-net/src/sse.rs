//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Network connectivity and edge adapters."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Server-sent event streams: network change events and the health heartbeat.
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use chrono::Local;
use futures::stream::{self, Stream, StreamExt};
use gridscope_core::TopologyService;
use serde_json::json;
use tracing::debug;

/// Event name carried by network change notifications.
pub const CHANGE_EVENT: &str = "network-changed";

const STREAM_HEADERS: [(&str, &str); 2] = [
    ("x-accel-buffering", "no"),
    ("access-control-allow-origin", "*"),
];

fn respond<S>(events: S) -> Response
where
    S: Stream<Item = Result<Event, axum::Error>> + Send + 'static,
{
    (STREAM_HEADERS, Sse::new(events).keep_alive(KeepAlive::default())).into_response()
}

/// Forward every change event published after the client connects.
pub fn change_stream(service: &TopologyService) -> Response {
    let subscription = service.subscribe();
    debug!("change stream subscriber connected");
    let events = subscription.into_stream().map(|change| {
        Event::default()
            .event(CHANGE_EVENT)
            .id(change.version.to_string())
            .json_data(&change)
    });
    respond(events)
}

/// Heartbeat payload sent on the health stream.
pub fn heartbeat() -> serde_json::Value {
    json!({
        "status": "OK",
        "timestamp": Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    })
}

/// Emit a heartbeat immediately and then every `period`.
pub fn health_stream(period: Duration) -> Response {
    let ticks = stream::unfold(tokio::time::interval(period), |mut interval| async move {
        interval.tick().await;
        Some((Event::default().json_data(heartbeat()), interval))
    });
    respond(ticks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_reports_ok_with_timestamp() {
        let beat = heartbeat();
        assert_eq!(beat["status"], "OK");
        let timestamp = beat["timestamp"].as_str().unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%d %H:%M:%S").is_ok());
    }
}
