use serde::{Deserialize, Serialize};

use super::event::{Event, TicketType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RsvpStatus {
    #[serde(rename = "rsvp_yes")]
    Yes,
    #[serde(rename = "rsvp_no")]
    No,
    #[serde(rename = "rsvp_maybe")]
    Maybe,
}

impl std::fmt::Display for RsvpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RsvpStatus::Yes => write!(f, "Going"),
            RsvpStatus::No => write!(f, "Not Going"),
            RsvpStatus::Maybe => write!(f, "Maybe"),
        }
    }
}

impl std::str::FromStr for RsvpStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yes" | "y" | "rsvp_yes" => Ok(RsvpStatus::Yes),
            "no" | "n" | "rsvp_no" => Ok(RsvpStatus::No),
            "maybe" | "m" | "rsvp_maybe" => Ok(RsvpStatus::Maybe),
            other => Err(format!("unknown RSVP status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketDetail {
    pub id: String,
    pub registration_id: String,
    pub ticket_code: String,
    #[serde(default)]
    pub qr_code_url: String,
    #[serde(default)]
    pub pdf_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub id: String,
    pub event_id: String,
    pub user_id: String,
    pub ticket_type_id: Option<String>,
    /// confirmed, cancelled, or one of the rsvp_* values
    pub status: String,
    pub created_at: String,
    pub event: Event,
    pub ticket_type: Option<TicketType>,
    pub ticket: Option<TicketDetail>,
}

impl Registration {
    pub fn is_cancelled(&self) -> bool {
        self.status == "cancelled"
    }

    pub fn rsvp(&self) -> Option<RsvpStatus> {
        serde_json::from_value(serde_json::Value::String(self.status.clone())).ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRegistrationRequest {
    pub event_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_type_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RsvpUpdate {
    pub status: RsvpStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub to_email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsvp_status_wire_format() {
        let update = RsvpUpdate {
            status: RsvpStatus::Maybe,
        };
        assert_eq!(serde_json::to_string(&update).unwrap(), r#"{"status":"rsvp_maybe"}"#);
    }

    #[test]
    fn test_rsvp_status_from_str() {
        assert_eq!("yes".parse::<RsvpStatus>().unwrap(), RsvpStatus::Yes);
        assert_eq!("NO".parse::<RsvpStatus>().unwrap(), RsvpStatus::No);
        assert_eq!("rsvp_maybe".parse::<RsvpStatus>().unwrap(), RsvpStatus::Maybe);
        assert!("later".parse::<RsvpStatus>().is_err());
    }

    #[test]
    fn test_registration_rsvp_from_status() {
        let json = r#"{
            "id": "r1", "event_id": "e1", "user_id": "u1", "status": "rsvp_no",
            "created_at": "2026-01-01T00:00:00Z",
            "event": {"id": "e1", "title": "Gala", "start_time": "2026-02-01T19:00:00Z"},
            "ticket": {"id": "t1", "registration_id": "r1", "ticket_code": "TCK-1"}
        }"#;
        let reg: Registration = serde_json::from_str(json).unwrap();
        assert_eq!(reg.rsvp(), Some(RsvpStatus::No));
        assert!(!reg.is_cancelled());
        assert_eq!(reg.ticket.unwrap().ticket_code, "TCK-1");
    }
}
