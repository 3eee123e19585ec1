use serde::{Deserialize, Serialize};

/// Per-event sales figures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventStats {
    pub event_id: String,
    pub title: String,
    pub category: Option<String>,
    pub total_bookings: i64,
    pub revenue: f64,
    pub tickets_remaining: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStats {
    pub total_registrations: i64,
    pub occupancy_percentage: f64,
    pub cancellation_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attendee {
    pub id: String,
    pub email: String,
    pub role: String,
}
