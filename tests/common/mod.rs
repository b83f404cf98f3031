//! In-process fake of the `/v2/monitor/{id}` telemetry endpoint.

#![allow(dead_code)]

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// How the fake answers for one subject.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Valid payload with every sensor at `value`; R2 flagged if `anomaly`
    Healthy { value: u16, anomaly: bool },
    /// Respond with this status and a plain-text body
    Status(u16),
    /// 200 with a body lacking the expected shape
    Malformed,
}

impl Behavior {
    pub fn healthy(value: u16, anomaly: bool) -> Self {
        Behavior::Healthy { value, anomaly }
    }
}

#[derive(Clone, Default)]
pub struct FakeSource {
    behaviors: Arc<Mutex<HashMap<u32, Behavior>>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, subject_id: u32, behavior: Behavior) {
        self.behaviors.lock().unwrap().insert(subject_id, behavior);
    }

    /// Serve on a random loopback port; returns the base URL.
    pub async fn spawn(&self) -> String {
        let app = Router::new()
            .route("/v2/monitor/:id", get(monitor))
            .with_state(self.clone());
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("Failed to bind fake source");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }
}

pub fn monitor_body(subject_id: u32, value: u16, anomaly: bool) -> serde_json::Value {
    let names = ["L0", "L1", "L2", "R0", "R1", "R2"];
    let sensors: Vec<_> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            serde_json::json!({
                "id": i,
                "name": name,
                "value": value,
                "anomaly": anomaly && *name == "R2",
            })
        })
        .collect();
    serde_json::json!({
        "firstname": format!("First{subject_id}"),
        "lastname": format!("Last{subject_id}"),
        "birthdate": "1990",
        "disabled": subject_id % 2 == 0,
        "trace": {"sensors": sensors},
    })
}

async fn monitor(State(fake): State<FakeSource>, Path(id): Path<u32>) -> Response {
    let behavior = fake.behaviors.lock().unwrap().get(&id).cloned();
    match behavior {
        Some(Behavior::Healthy { value, anomaly }) => {
            axum::Json(monitor_body(id, value, anomaly)).into_response()
        }
        Some(Behavior::Status(code)) => (
            StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            "unavailable",
        )
            .into_response(),
        Some(Behavior::Malformed) => {
            axum::Json(serde_json::json!({"firstname": "A", "lastname": "B", "trace": {}}))
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "no such subject").into_response(),
    }
}
