use chrono::DateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Draft,
    Published,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventStatus::Draft => write!(f, "Draft"),
            EventStatus::Published => write!(f, "Published"),
            EventStatus::Cancelled => write!(f, "Cancelled"),
            EventStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketType {
    pub id: String,
    pub event_id: String,
    pub name: String,
    pub price: f64,
    pub capacity: i64,
    pub remaining_tickets: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub location: String,
    pub start_time: String,
    pub end_time: Option<String>,
    #[serde(default)]
    pub total_tickets: i64,
    #[serde(default)]
    pub remaining_tickets: i64,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub status: EventStatus,
    pub image_url: Option<String>,
    #[serde(default)]
    pub ticket_types: Vec<TicketType>,
}

impl Event {
    pub fn is_sold_out(&self) -> bool {
        self.remaining_tickets <= 0
    }

    /// Start time formatted for display, or the raw value if unparseable
    pub fn start_display(&self) -> String {
        match DateTime::parse_from_rfc3339(&self.start_time) {
            Ok(dt) => dt.format("%b %d, %Y %H:%M").to_string(),
            Err(_) => self.start_time.clone(),
        }
    }

    pub fn price_display(&self) -> String {
        if self.price <= 0.0 {
            "Free".to_string()
        } else {
            format!("${:.2}", self.price)
        }
    }
}

/// Filters for the public event listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventListParams {
    pub category: Option<String>,
    pub q: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl EventListParams {
    pub fn to_query(&self) -> Vec<(&'static str, Option<String>)> {
        vec![
            ("category", self.category.clone()),
            ("q", self.q.clone()),
            ("page", self.page.map(|p| p.to_string())),
            ("limit", self.limit.map(|l| l.to_string())),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub description: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub start_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    pub total_tickets: i64,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EventStatus>,
}

/// Partial update; only set fields are sent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateEventRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tickets: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EventStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedEvent {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatAvailability {
    pub remaining_seats: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedImage {
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_with_ticket_types() {
        let json = r#"{
            "id": "e1",
            "title": "RustConf",
            "description": "Talks",
            "category": "tech",
            "location": "Montreal",
            "start_time": "2026-09-10T09:00:00Z",
            "total_tickets": 500,
            "remaining_tickets": 0,
            "price": 0,
            "status": "published",
            "ticket_types": [
                {"id": "t1", "event_id": "e1", "name": "GA", "price": 99.5, "capacity": 400, "remaining_tickets": 12}
            ]
        }"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.status, EventStatus::Published);
        assert!(event.is_sold_out());
        assert_eq!(event.price_display(), "Free");
        assert_eq!(event.start_display(), "Sep 10, 2026 09:00");
        assert_eq!(event.ticket_types[0].remaining_tickets, 12);
    }

    #[test]
    fn test_unknown_status_does_not_fail() {
        let json = r#"{"id": "e2", "title": "X", "start_time": "soon", "status": "archived"}"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.status, EventStatus::Unknown);
        assert_eq!(event.start_display(), "soon");
    }

    #[test]
    fn test_list_params_query() {
        let params = EventListParams {
            category: Some("music".to_string()),
            page: Some(2),
            ..Default::default()
        };
        let query = params.to_query();
        assert!(query.contains(&("category", Some("music".to_string()))));
        assert!(query.contains(&("page", Some("2".to_string()))));
        assert!(query.contains(&("q", None)));
    }

    #[test]
    fn test_update_request_serializes_only_set_fields() {
        let update = UpdateEventRequest {
            price: Some(25.0),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&update).unwrap(), r#"{"price":25.0}"#);
    }
}
