use crate::alert::AlertLevel;
use crate::error::RejectReason;
use crate::risk::RiskLevel;
use crate::risk::trend::Trend;
use crate::status::Freshness;
use serde::Serialize;

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Ok,
    Rejected,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct IngestAcceptedResponse {
    pub status: IngestStatus,
    pub source_id: String,
    pub zone_id: String,
    pub density: f64,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct IngestRejectedResponse {
    pub status: IngestStatus,
    pub reason: RejectReason,
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct StatusSuccessResponse {
    pub zones: Vec<ZoneStatusResponse>,
    pub alerts: Vec<AlertResponse>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ZoneStatusResponse {
    pub zone_id: String,
    pub display_name: String,
    pub status: Freshness,
    pub density: Option<f64>,
    pub risk_level: Option<RiskLevel>,
    pub predicted_risk_level: Option<RiskLevel>,
    pub trend: Option<Trend>,
    pub last_updated: Option<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct AlertResponse {
    pub id: String,
    pub zone_id: String,
    pub title: String,
    pub message: String,
    pub severity: AlertLevel,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ZoneDetailResponse {
    #[serde(flatten)]
    pub zone: ZoneStatusResponse,
    pub aggregated_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<AlertResponse>,
    pub history: Vec<HistorySampleResponse>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HistorySampleResponse {
    pub timestamp: String,
    pub density: f64,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Ko,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthSuccessResponse {
    pub status: HealthStatus,
    pub fresh_zones: usize,
    pub total_zones: usize,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ErrorResponse {
    pub error_code: ErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    UnknownZone,
    InternalError,
}
