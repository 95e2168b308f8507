use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::server::AppState;
use crate::supervisor::RouteSnapshot;

#[derive(Debug, Serialize)]
pub struct ServersInfo {
    pub server_processes: Vec<RouteSnapshot>,
}

/// Every named route with its port, socket and process status.
pub async fn servers_info(State(state): State<AppState>) -> Json<ServersInfo> {
    Json(ServersInfo {
        server_processes: state.registry.snapshot(),
    })
}
