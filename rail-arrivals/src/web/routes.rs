//! HTTP route handlers.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use tracing::warn;

use crate::engine::SLOT_COUNT;
use crate::slots::SlotView;

use super::dto::*;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/trackers", get(list_trackers))
        .route("/trackers/:id", get(tracker))
        .route("/trackers/:id/slots/:n", get(tracker_slot))
        .route("/lines/:line_id/stops", get(line_stops))
        .with_state(state)
}

/// Health check endpoint.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.store.snapshot().await;
    Json(HealthResponse {
        status: "ok",
        schedule_loaded: snapshot.is_some(),
        schedule_loaded_at: snapshot.map(|s| s.loaded_at().to_rfc3339()),
        trackers: state.trackers.len(),
    })
}

/// All trackers with a short status each.
async fn list_trackers(State(state): State<AppState>) -> Json<TrackerListResponse> {
    let publications =
        futures::future::join_all(state.trackers.iter().map(|h| h.board.current())).await;

    let trackers = state
        .trackers
        .iter()
        .zip(&publications)
        .map(|(handle, publication)| TrackerSummary::new(handle, publication))
        .collect();
    Json(TrackerListResponse { trackers })
}

/// A tracker's full publication.
async fn tracker(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TrackerResponse>, AppError> {
    let handle = state.tracker(&id).ok_or_else(|| AppError::NotFound {
        message: format!("Unknown tracker: {id}"),
    })?;
    let publication = handle.board.current().await;
    Ok(Json(TrackerResponse::new(&id, &publication)))
}

/// One slot (1-3) of a tracker.
async fn tracker_slot(
    State(state): State<AppState>,
    Path((id, n)): Path<(String, usize)>,
) -> Result<Json<SlotView>, AppError> {
    if !(1..=SLOT_COUNT).contains(&n) {
        return Err(AppError::BadRequest {
            message: format!("Slot must be between 1 and {SLOT_COUNT}, got {n}"),
        });
    }
    let handle = state.tracker(&id).ok_or_else(|| AppError::NotFound {
        message: format!("Unknown tracker: {id}"),
    })?;

    let publication = handle.board.current().await;
    publication
        .view(n)
        .map(Json)
        .ok_or_else(|| AppError::Internal {
            message: format!("Slot {n} missing from publication"),
        })
}

/// Stops served by a line, for picking a station pair.
async fn line_stops(
    State(state): State<AppState>,
    Path(line_id): Path<String>,
) -> Result<Json<LineStopsResponse>, AppError> {
    let snapshot = state
        .store
        .snapshot()
        .await
        .ok_or_else(|| AppError::Unavailable {
            message: "Static schedule not loaded yet".to_string(),
        })?;

    let route = snapshot.route(&line_id).ok_or_else(|| AppError::NotFound {
        message: format!("Unknown line: {line_id}"),
    })?;
    let stops = snapshot.stops_for_line(&line_id);

    Ok(Json(LineStopsResponse::new(route, &stops)))
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    BadRequest { message: String },
    NotFound { message: String },
    Unavailable { message: String },
    Internal { message: String },
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let message = match self {
            AppError::BadRequest { message }
            | AppError::NotFound { message }
            | AppError::Unavailable { message }
            | AppError::Internal { message } => message,
        };

        warn!(%status, %message, "request failed");

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use chrono_tz::America::Chicago;

    use crate::config::TrackerConfig;
    use crate::domain::{RouteId, StopId, TripId};
    use crate::engine::{ArrivalCandidate, TrackerTarget};
    use crate::schedule::{GtfsTables, ScheduleStore};
    use crate::slots::{Publication, SlotBoard};
    use crate::web::TrackerHandle;

    fn tables() -> GtfsTables {
        GtfsTables {
            stops: "stop_id,stop_name\nOAKPARK,Oak Park\nOTC,Chicago OTC\nELBURN,Elburn\n".into(),
            routes: "route_id,route_long_name\nUP-W,Union Pacific West\n".into(),
            trips: "route_id,service_id,trip_id\nUP-W,WK,UW40\n".into(),
            stop_times: "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
                UW40,21:40:00,21:40:00,ELBURN,1\n\
                UW40,22:30:00,22:30:00,OAKPARK,2\n\
                UW40,22:49:00,22:49:00,OTC,3\n"
                .into(),
            calendar: None,
            calendar_dates: None,
        }
    }

    async fn state() -> AppState {
        let store = Arc::new(ScheduleStore::with_snapshot(tables().build(Utc::now()).unwrap()));

        let board = Arc::new(SlotBoard::new());
        let target = TrackerTarget {
            line_id: RouteId::new("UP-W"),
            line_name: "Union Pacific West".into(),
            departure_stop: StopId::new("OAKPARK"),
            arrival_stop: StopId::new("OTC"),
            departure_name: "Oak Park".into(),
            arrival_name: "Chicago OTC".into(),
            grace: chrono::Duration::minutes(5),
        };
        let departure = Chicago.with_ymd_and_hms(2024, 3, 15, 22, 30, 0).unwrap();
        let candidate = ArrivalCandidate {
            trip_id: TripId::new("UW40"),
            service_date: departure.date_naive(),
            departure,
            arrival: Some(Chicago.with_ymd_and_hms(2024, 3, 15, 22, 49, 0).unwrap()),
            departure_station: "Oak Park".into(),
            arrival_station: "Chicago OTC".into(),
            has_realtime: false,
        };
        let now = Chicago.with_ymd_and_hms(2024, 3, 15, 22, 0, 0).unwrap();
        board
            .publish(Publication::new(&target, vec![candidate], Some(now), now))
            .await;

        let handle = TrackerHandle::new(TrackerConfig::new("upw", "UP-W", "OAKPARK", "OTC"), board);
        AppState::new(store, vec![handle])
    }

    #[tokio::test]
    async fn health_reports_schedule() {
        let Json(health) = health(State(state().await)).await;
        assert_eq!(health.status, "ok");
        assert!(health.schedule_loaded);
        assert_eq!(health.trackers, 1);

        let empty = AppState::new(Arc::new(ScheduleStore::new()), vec![]);
        let Json(health) = super::health(State(empty)).await;
        assert!(!health.schedule_loaded);
        assert!(health.schedule_loaded_at.is_none());
    }

    #[tokio::test]
    async fn lists_trackers() {
        let Json(list) = list_trackers(State(state().await)).await;
        assert_eq!(list.trackers.len(), 1);
        assert_eq!(list.trackers[0].id, "upw");
        assert_eq!(list.trackers[0].filled, 1);
        assert!(list.trackers[0].last_update.is_some());
    }

    #[tokio::test]
    async fn tracker_publication() {
        let Json(response) = tracker(State(state().await), Path("upw".into()))
            .await
            .unwrap();
        assert_eq!(response.line_name, "Union Pacific West");
        assert_eq!(response.slots[0].state, "22:30 → 22:49");
        assert_eq!(response.slots[1].state, "No data");

        let err = tracker(State(state().await), Path("nope".into()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn single_slot() {
        let Json(view) = tracker_slot(State(state().await), Path(("upw".into(), 1)))
            .await
            .unwrap();
        assert_eq!(view.attributes.trip_id.as_deref(), Some("UW40"));
        assert_eq!(view.attributes.train_number, 1);

        let err = tracker_slot(State(state().await), Path(("upw".into(), 4)))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = tracker_slot(State(state().await), Path(("upw".into(), 0)))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stops_for_line() {
        let Json(response) = line_stops(State(state().await), Path("UP-W".into()))
            .await
            .unwrap();
        let ids: Vec<&str> = response.stops.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["ELBURN", "OAKPARK", "OTC"]);

        let err = line_stops(State(state().await), Path("BNSF".into()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let empty = AppState::new(Arc::new(ScheduleStore::new()), vec![]);
        let err = line_stops(State(empty), Path("UP-W".into())).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn error_response_status() {
        let response = AppError::BadRequest {
            message: "bad".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
