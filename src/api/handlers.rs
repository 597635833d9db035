use crate::alert::Alert;
use crate::api::ApiContext;
use crate::api::responses::{
    AlertResponse, ErrorCode, ErrorResponse, HealthStatus, HealthSuccessResponse,
    HistorySampleResponse, IngestAcceptedResponse, IngestRejectedResponse, IngestStatus,
    StatusSuccessResponse, ZoneDetailResponse, ZoneStatusResponse,
};
use crate::error::{AppError, IngestError, RejectReason};
use crate::ingest::IngestionGateway;
use crate::status::{Freshness, StatusAggregator, ZoneDetail, ZoneStatus};
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::error;

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Debug)]
enum TimestampError {
    Format(time::error::Format),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::Format(err) => write!(f, "timestamp format error: {err}"),
        }
    }
}

/// JSON body with an explicit status code, or the shared error body.
pub enum JsonResponse<T> {
    Success { status: StatusCode, body: T },
    Error { status: StatusCode, body: ErrorResponse },
}

impl<T: Serialize> IntoResponse for JsonResponse<T> {
    fn into_response(self) -> Response {
        match self {
            JsonResponse::Success { status, body } => (status, Json(body)).into_response(),
            JsonResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub type StatusResponse = JsonResponse<StatusSuccessResponse>;
pub type ZoneResponse = JsonResponse<ZoneDetailResponse>;
pub type HealthResponse = JsonResponse<HealthSuccessResponse>;

pub enum IngestResponse {
    Accepted(IngestAcceptedResponse),
    Rejected {
        status: StatusCode,
        body: IngestRejectedResponse,
    },
    Error {
        status: StatusCode,
        body: ErrorResponse,
    },
}

impl IntoResponse for IngestResponse {
    fn into_response(self) -> Response {
        match self {
            IngestResponse::Accepted(body) => (StatusCode::OK, Json(body)).into_response(),
            IngestResponse::Rejected { status, body } => (status, Json(body)).into_response(),
            IngestResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn post_ingest(State(context): State<ApiContext>, body: Bytes) -> impl IntoResponse {
    build_ingest_response(&context.gateway, &body, OffsetDateTime::now_utc())
}

pub async fn get_status(State(context): State<ApiContext>) -> impl IntoResponse {
    build_status_response(&context.status, OffsetDateTime::now_utc())
}

pub async fn get_zone(
    State(context): State<ApiContext>,
    Path(zone_id): Path<String>,
) -> impl IntoResponse {
    build_zone_response(&context.status, &zone_id, OffsetDateTime::now_utc())
}

pub async fn get_health(State(context): State<ApiContext>) -> impl IntoResponse {
    build_health_response(&context.status, OffsetDateTime::now_utc())
}

fn build_ingest_response(
    gateway: &IngestionGateway,
    body: &[u8],
    now: OffsetDateTime,
) -> IngestResponse {
    match gateway.ingest(body, now) {
        Ok(accepted) => IngestResponse::Accepted(IngestAcceptedResponse {
            status: IngestStatus::Ok,
            source_id: accepted.source_id,
            zone_id: accepted.zone_id,
            density: accepted.density,
            risk_level: accepted.risk_level,
        }),
        Err(IngestError::Rejected(rejection)) => match format_timestamp(now) {
            Ok(timestamp) => IngestResponse::Rejected {
                status: rejection_status(rejection.reason),
                body: IngestRejectedResponse {
                    status: IngestStatus::Rejected,
                    reason: rejection.reason,
                    message: rejection.detail,
                    timestamp,
                },
            },
            Err(_) => IngestResponse::Error {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: internal_error("/api/ingest", "timestamp formatting failure"),
            },
        },
        Err(IngestError::Internal(err)) => IngestResponse::Error {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: internal_error("/api/ingest", &err.to_string()),
        },
    }
}

fn rejection_status(reason: RejectReason) -> StatusCode {
    match reason {
        RejectReason::MalformedPayload => StatusCode::BAD_REQUEST,
        RejectReason::UnmappedSensor | RejectReason::InvalidValue => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        RejectReason::StaleReading => StatusCode::CONFLICT,
    }
}

fn build_status_response(aggregator: &StatusAggregator, now: OffsetDateTime) -> StatusResponse {
    let status = match aggregator.current_status(now) {
        Ok(status) => status,
        Err(err) => return internal_json_error("/api/status", &err.to_string()),
    };

    let mapped = status
        .zones
        .iter()
        .map(map_zone_status)
        .collect::<Result<Vec<_>, _>>()
        .and_then(|zones| {
            let alerts = status
                .alerts
                .iter()
                .map(map_alert)
                .collect::<Result<Vec<_>, _>>()?;
            Ok((zones, alerts, format_timestamp(now)?))
        });

    match mapped {
        Ok((zones, alerts, timestamp)) => JsonResponse::Success {
            status: StatusCode::OK,
            body: StatusSuccessResponse {
                zones,
                alerts,
                timestamp,
            },
        },
        Err(_) => internal_json_error("/api/status", "timestamp formatting failure"),
    }
}

fn build_zone_response(
    aggregator: &StatusAggregator,
    zone_id: &str,
    now: OffsetDateTime,
) -> ZoneResponse {
    let detail = match aggregator.zone_detail(zone_id, now) {
        Ok(detail) => detail,
        Err(AppError::UnknownZone(zone_id)) => {
            return match format_timestamp(now) {
                Ok(timestamp) => JsonResponse::Error {
                    status: StatusCode::NOT_FOUND,
                    body: ErrorResponse {
                        error_code: ErrorCode::UnknownZone,
                        error_message: format!("Unknown zone: {zone_id}"),
                        timestamp,
                    },
                },
                Err(_) => internal_json_error("/api/zones", "timestamp formatting failure"),
            };
        }
        Err(err) => return internal_json_error("/api/zones", &err.to_string()),
    };

    let mapped = map_zone_detail(&detail, now);

    match mapped {
        Ok(body) => JsonResponse::Success {
            status: StatusCode::OK,
            body,
        },
        Err(_) => internal_json_error("/api/zones", "timestamp formatting failure"),
    }
}

fn map_zone_detail(detail: &ZoneDetail, now: OffsetDateTime) -> Result<ZoneDetailResponse, TimestampError> {
    let history = detail
        .history
        .iter()
        .map(|sample| {
            Ok(HistorySampleResponse {
                timestamp: format_timestamp(sample.timestamp)?,
                density: sample.density,
            })
        })
        .collect::<Result<Vec<_>, TimestampError>>()?;
    Ok(ZoneDetailResponse {
        zone: map_zone_status(&detail.status)?,
        aggregated_count: detail.aggregated_count,
        alert: detail.status.alert.as_ref().map(map_alert).transpose()?,
        history,
        timestamp: format_timestamp(now)?,
    })
}

fn build_health_response(aggregator: &StatusAggregator, now: OffsetDateTime) -> HealthResponse {
    let status = match aggregator.current_status(now) {
        Ok(status) => status,
        Err(err) => return internal_json_error("/api/health", &err.to_string()),
    };

    let fresh_zones = status
        .zones
        .iter()
        .filter(|zone| zone.freshness == Freshness::Fresh)
        .count();
    let total_zones = status.zones.len();
    let health = derive_health_status(fresh_zones, total_zones);

    let timestamp = match format_timestamp(now) {
        Ok(formatted) => formatted,
        Err(_) => return internal_json_error("/api/health", "timestamp formatting failure"),
    };

    let status_code = match health {
        HealthStatus::Ko => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
    };

    JsonResponse::Success {
        status: status_code,
        body: HealthSuccessResponse {
            status: health,
            fresh_zones,
            total_zones,
            timestamp,
        },
    }
}

fn derive_health_status(fresh_zones: usize, total_zones: usize) -> HealthStatus {
    if fresh_zones == 0 {
        HealthStatus::Ko
    } else if fresh_zones < total_zones {
        HealthStatus::Degraded
    } else {
        HealthStatus::Ok
    }
}

fn map_zone_status(zone: &ZoneStatus) -> Result<ZoneStatusResponse, TimestampError> {
    Ok(ZoneStatusResponse {
        zone_id: zone.zone_id.clone(),
        display_name: zone.display_name.clone(),
        status: zone.freshness,
        density: zone.density,
        risk_level: zone.risk_level,
        predicted_risk_level: zone.predicted_risk_level,
        trend: zone.trend,
        last_updated: zone.last_updated.map(format_timestamp).transpose()?,
    })
}

fn map_alert(alert: &Alert) -> Result<AlertResponse, TimestampError> {
    Ok(AlertResponse {
        id: alert.id.clone(),
        zone_id: alert.zone_id.clone(),
        title: alert.title.clone(),
        message: alert.message.clone(),
        severity: alert.severity,
        timestamp: format_timestamp(alert.created_at)?,
    })
}

fn internal_json_error<T>(endpoint: &str, message: &str) -> JsonResponse<T> {
    JsonResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: internal_error(endpoint, message),
    }
}

fn internal_error(endpoint: &str, message: &str) -> ErrorResponse {
    error!(
        endpoint = endpoint,
        message = message,
        "Internal error while handling request"
    );
    let formatted = format_timestamp(OffsetDateTime::now_utc()).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format internal error timestamp");
        "1970-01-01T00:00:00Z".to_string()
    });
    ErrorResponse {
        error_code: ErrorCode::InternalError,
        error_message: INTERNAL_ERROR_MESSAGE.to_string(),
        timestamp: formatted,
    }
}

fn format_timestamp(timestamp: OffsetDateTime) -> Result<String, TimestampError> {
    timestamp
        .to_offset(time::UtcOffset::UTC)
        .format(&Rfc3339)
        .map_err(TimestampError::Format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertEngine, AlertLevel, AlertPolicy};
    use crate::risk::RiskLevel;
    use crate::state::{DEFAULT_HISTORY_CAPACITY, ZoneStore};
    use crate::status::StatusSettings;
    use crate::zone::{ZoneConfig, ZoneRegistry};
    use serde_json::json;
    use std::sync::Arc;
    use time::Duration;
    use time::macros::datetime;

    const START: OffsetDateTime = datetime!(2026-01-11 12:00:00 UTC);

    fn context() -> (IngestionGateway, StatusAggregator) {
        let registry = ZoneRegistry::new(vec![
            ZoneConfig {
                zone_id: "gate_a".to_string(),
                display_name: "Main Gate A".to_string(),
                capacity: 200.0,
                sensor_ids: vec!["cam_01".to_string()],
            },
            ZoneConfig {
                zone_id: "stage_front".to_string(),
                display_name: "Stage Front".to_string(),
                capacity: 300.0,
                sensor_ids: vec!["cam_02".to_string()],
            },
        ])
        .expect("valid registry");
        let store = Arc::new(ZoneStore::new(Arc::new(registry), DEFAULT_HISTORY_CAPACITY));
        let gateway = IngestionGateway::new(Arc::clone(&store), AlertEngine::new(AlertPolicy::default()));
        let aggregator = StatusAggregator::new(store, StatusSettings::default());
        (gateway, aggregator)
    }

    fn payload(source_id: &str, second: i64, count: i64) -> Vec<u8> {
        let timestamp = format_timestamp(START + Duration::seconds(second)).expect("format");
        serde_json::to_vec(&json!({
            "source_id": source_id,
            "source_type": "camera",
            "timestamp": timestamp,
            "data": { "count": count }
        }))
        .expect("serialize payload")
    }

    #[test]
    fn ingest_handler_returns_ok_for_valid_reading() {
        let (gateway, _aggregator) = context();

        let response = build_ingest_response(&gateway, &payload("cam_01", 0, 170), START);

        match response {
            IngestResponse::Accepted(body) => {
                assert_eq!(body.status, IngestStatus::Ok);
                assert_eq!(body.zone_id, "gate_a");
                assert_eq!(body.density, 0.85);
                assert_eq!(body.risk_level, RiskLevel::High);
            }
            _ => panic!("expected accepted response"),
        }
    }

    #[test]
    fn ingest_handler_maps_rejections_to_status_codes() {
        let (gateway, _aggregator) = context();
        let _ = build_ingest_response(&gateway, &payload("cam_01", 10, 50), START);

        let cases = [
            (b"{".to_vec(), StatusCode::BAD_REQUEST, RejectReason::MalformedPayload),
            (payload("cam_99", 11, 5), StatusCode::UNPROCESSABLE_ENTITY, RejectReason::UnmappedSensor),
            (payload("cam_01", 12, -1), StatusCode::UNPROCESSABLE_ENTITY, RejectReason::InvalidValue),
            (payload("cam_01", 9, 60), StatusCode::CONFLICT, RejectReason::StaleReading),
        ];

        for (body, expected_status, expected_reason) in cases {
            match build_ingest_response(&gateway, &body, START) {
                IngestResponse::Rejected { status, body } => {
                    assert_eq!(status, expected_status);
                    assert_eq!(body.reason, expected_reason);
                    assert_eq!(body.status, IngestStatus::Rejected);
                    assert_eq!(body.timestamp, "2026-01-11T12:00:00Z");
                }
                _ => panic!("expected rejection for {expected_reason}"),
            }
        }
    }

    #[test]
    fn status_handler_lists_zones_and_active_alerts() {
        let (gateway, aggregator) = context();
        let _ = build_ingest_response(&gateway, &payload("cam_01", 0, 170), START);

        let response = build_status_response(&aggregator, START + Duration::seconds(2));

        match response {
            JsonResponse::Success { status, body } => {
                assert_eq!(status, StatusCode::OK);
                assert_eq!(body.zones.len(), 2);
                assert_eq!(body.zones[0].status, Freshness::Fresh);
                assert_eq!(body.zones[0].risk_level, Some(RiskLevel::High));
                assert_eq!(body.zones[0].last_updated.as_deref(), Some("2026-01-11T12:00:00Z"));
                assert_eq!(body.zones[1].status, Freshness::Unknown);
                assert_eq!(body.zones[1].density, None);
                assert_eq!(body.alerts.len(), 1);
                assert_eq!(body.alerts[0].id, "gate_a-1");
                assert_eq!(body.alerts[0].severity, AlertLevel::Warning);
                assert_eq!(body.timestamp, "2026-01-11T12:00:02Z");
            }
            JsonResponse::Error { status, .. } => panic!("expected success, got {status}"),
        }
    }

    #[test]
    fn status_handler_returns_internal_error_when_zone_lock_poisoned() {
        let (gateway, aggregator) = context();
        let store = Arc::clone(gateway.store());
        let _ = std::thread::spawn(move || {
            let _ = store.with_zone::<()>("gate_a", |_| panic!("poison zone lock"));
        })
        .join();

        let response = build_status_response(&aggregator, START);

        match response {
            JsonResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body.error_code, ErrorCode::InternalError);
                assert_eq!(body.error_message, "Internal server error");
            }
            JsonResponse::Success { .. } => panic!("expected internal error response"),
        }
    }

    #[test]
    fn zone_handler_returns_history() {
        let (gateway, aggregator) = context();
        let _ = build_ingest_response(&gateway, &payload("cam_02", 0, 90), START);
        let _ = build_ingest_response(&gateway, &payload("cam_02", 5, 120), START);

        let response = build_zone_response(&aggregator, "stage_front", START + Duration::seconds(6));

        match response {
            JsonResponse::Success { body, .. } => {
                assert_eq!(body.zone.zone_id, "stage_front");
                assert_eq!(body.aggregated_count, 120);
                assert_eq!(body.history.len(), 2);
                assert_eq!(body.history[1].timestamp, "2026-01-11T12:00:05Z");
                assert!(body.alert.is_none());
            }
            JsonResponse::Error { status, .. } => panic!("expected success, got {status}"),
        }
    }

    #[test]
    fn zone_handler_returns_not_found_for_unknown_zone() {
        let (_gateway, aggregator) = context();

        let response = build_zone_response(&aggregator, "backstage", START);

        match response {
            JsonResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(body.error_code, ErrorCode::UnknownZone);
            }
            JsonResponse::Success { .. } => panic!("expected not found"),
        }
    }

    #[test]
    fn health_reflects_zone_freshness() {
        let (gateway, aggregator) = context();

        match build_health_response(&aggregator, START) {
            JsonResponse::Success { status, body } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body.status, HealthStatus::Ko);
            }
            JsonResponse::Error { .. } => panic!("expected health body"),
        }

        let _ = build_ingest_response(&gateway, &payload("cam_01", 0, 10), START);
        match build_health_response(&aggregator, START + Duration::seconds(1)) {
            JsonResponse::Success { status, body } => {
                assert_eq!(status, StatusCode::OK);
                assert_eq!(body.status, HealthStatus::Degraded);
                assert_eq!(body.fresh_zones, 1);
                assert_eq!(body.total_zones, 2);
            }
            JsonResponse::Error { .. } => panic!("expected health body"),
        }

        let _ = build_ingest_response(&gateway, &payload("cam_02", 1, 10), START);
        match build_health_response(&aggregator, START + Duration::seconds(2)) {
            JsonResponse::Success { body, .. } => assert_eq!(body.status, HealthStatus::Ok),
            JsonResponse::Error { .. } => panic!("expected health body"),
        }
    }

    #[test]
    fn format_timestamp_normalizes_to_utc() {
        let formatted = format_timestamp(datetime!(2026-01-11 14:30:00 +02:00)).expect("format");

        assert_eq!(formatted, "2026-01-11T12:30:00Z");
    }
}
