//! Domain Model
//! Plain data records mirrored by the persistent store. The store is the
//! authority; nothing here performs I/O behind an attribute access.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    Pending,
    Assigned,
    InTransit,
    Delivered,
    Failed,
    Cancelled,
}

impl PackageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "assigned" => Some(Self::Assigned),
            "in_transit" => Some(Self::InTransit),
            "delivered" => Some(Self::Delivered),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
    Completed,
}

impl SwapStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Cancelled | Self::Completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub vehicle_type: String,
    pub vehicle_capacity_kg: f64,
    pub is_active: bool,
    pub experience_days: i64,
    pub total_deliveries: i64,
    pub successful_deliveries: i64,
    pub failed_deliveries: i64,
    /// Stored value; authoritative definition is successful/total.
    pub success_rate: f64,
    pub avg_delivery_time_minutes: f64,
    pub current_latitude: Option<f64>,
    pub current_longitude: Option<f64>,
    pub fcm_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub id: String,
    pub tracking_number: String,
    pub status: PackageStatus,
    pub weight_kg: f64,
    pub is_fragile: bool,
    pub delivery_latitude: f64,
    pub delivery_longitude: f64,
    pub delivery_address: String,
    pub floor_number: i64,
    pub time_window_hours: Option<f64>,
    pub priority: i64,
    pub distance_from_hub_km: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// The binding of one package to one driver on one operational date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    pub driver_id: String,
    pub package_id: String,
    pub assignment_date: NaiveDate,
    pub predicted_difficulty: f64,
    pub actual_difficulty: Option<f64>,
    pub accepted: bool,
    pub completed: bool,
    pub failed: bool,
    pub assigned_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub explanation_json: Option<String>,
}

impl Assignment {
    /// Completed or failed assignments are immutable.
    pub fn is_terminal(&self) -> bool {
        self.completed || self.failed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: String,
    pub assignment_id: String,
    pub delivered_at: DateTime<Utc>,
    pub actual_time_minutes: f64,
    pub success: bool,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthEvent {
    pub id: String,
    pub driver_id: String,
    pub recorded_at: DateTime<Utc>,
    pub heart_rate_bpm: i64,
    /// 1-10 self-reported scale.
    pub fatigue_level: i64,
    pub hours_worked: f64,
    pub hours_since_last_break: f64,
    pub packages_delivered: i64,
    pub packages_remaining: i64,
    pub total_distance_km: f64,
    pub predicted_risk_score: f64,
    pub risk_severity: RiskSeverity,
    pub break_recommended_minutes: Option<i64>,
    pub break_urgency: Option<String>,
    pub break_reason: Option<String>,
    /// Set when a push alert went out for this event (dedup marker).
    pub alerted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Swap {
    pub id: String,
    pub proposer_id: String,
    pub acceptor_id: String,
    pub offered_package_id: String,
    pub requested_package_id: String,
    /// Drivers each assignment belonged to at proposal time. The exchange
    /// transaction re-checks these to detect a lost race.
    pub expected_offered_driver_id: String,
    pub expected_requested_driver_id: String,
    pub status: SwapStatus,
    pub reason: Option<String>,
    pub compatibility_score: Option<f64>,
    pub distance_saved_km: Option<f64>,
    pub proposed_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsurancePayout {
    pub id: String,
    pub driver_id: String,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub driver_failure_rate: f64,
    pub population_mean: f64,
    pub population_std: f64,
    pub z_score: f64,
    pub excess_failures: f64,
    pub payout_amount: f64,
    pub eligible: bool,
    pub approved: bool,
    pub paid: bool,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpsLog {
    pub id: String,
    pub driver_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub recorded_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Feature descriptors (inference inputs)
// ---------------------------------------------------------------------------

/// Driver-side inputs for difficulty scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverFeatures {
    pub experience_days: f64,
    pub avg_delivery_time_minutes: f64,
    pub success_rate: f64,
    pub vehicle_capacity_kg: f64,
}

impl From<&Driver> for DriverFeatures {
    fn from(d: &Driver) -> Self {
        Self {
            experience_days: d.experience_days as f64,
            avg_delivery_time_minutes: d.avg_delivery_time_minutes,
            success_rate: d.success_rate,
            vehicle_capacity_kg: d.vehicle_capacity_kg,
        }
    }
}

/// Package-side inputs for difficulty scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageFeatures {
    pub weight_kg: f64,
    pub distance_km: f64,
    pub floor_number: f64,
    pub is_fragile: bool,
    pub time_window_hours: f64,
}

impl From<&Package> for PackageFeatures {
    fn from(p: &Package) -> Self {
        Self {
            weight_kg: p.weight_kg,
            distance_km: p.distance_from_hub_km.unwrap_or(10.0),
            floor_number: p.floor_number as f64,
            is_fragile: p.is_fragile,
            time_window_hours: p.time_window_hours.unwrap_or(4.0),
        }
    }
}

/// Vitals snapshot for health-risk scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthVitals {
    pub heart_rate_bpm: f64,
    pub fatigue_level: f64,
    pub hours_worked: f64,
    pub hours_since_last_break: f64,
}

/// Workload snapshot for health-risk scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadSnapshot {
    pub packages_delivered: f64,
    pub packages_remaining: f64,
    pub total_distance_km: f64,
    pub avg_package_difficulty: f64,
}

/// A concrete break recommendation from the advisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakPlan {
    pub duration_minutes: i64,
    pub urgency: String,
    pub reason: String,
    pub timing: String,
}

// ---------------------------------------------------------------------------
// WebSocket protocol
// ---------------------------------------------------------------------------

/// Client -> server frames, routed by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
    LocationUpdate { latitude: f64, longitude: f64 },
    DeliveryStatus { package_id: String, status: String },
}

/// Server -> client frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected {
        driver_id: String,
        message: String,
    },
    Pong {
        timestamp: String,
    },
    LocationReceived {
        status: String,
    },
    StatusReceived {
        package_id: String,
    },
    BreakRecommendation {
        risk_score: f64,
        severity: String,
        duration_minutes: i64,
        urgency: String,
        reason: String,
    },
    AssignmentsReady {
        package_count: usize,
        assignment_date: String,
    },
}
