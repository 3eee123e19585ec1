//! One method per remote endpoint.
//!
//! These are thin wrappers: they pick the verb and path and name the payload
//! type carried in the envelope. Nothing here knows about authentication
//! beyond `sign_in`, which hands the issued credential to the session manager.

use std::path::Path;

use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tracing::info;

use crate::auth::{Identity, SessionError};
use crate::models::{
    Attendee, CreateEventRequest, CreateRegistrationRequest, CreatedEvent, Event, EventListParams,
    EventStats, ForgotPasswordRequest, LoginRequest, LoginResponse, RegisterRequest, Registration,
    ResetPasswordRequest, RsvpStatus, RsvpUpdate, SeatAvailability, SystemStats, TicketType,
    TransferRequest, UpdateEventRequest, UploadedImage,
};

use super::{ApiClient, ApiError, ApiResponse};

/// Multipart field name the upload endpoint expects
const IMAGE_FIELD: &str = "image";

/// Failure modes of `ApiClient::sign_in`
#[derive(thiserror::Error, Debug)]
pub enum SignInError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Login response did not include a token")]
    MissingToken,
}

impl ApiClient {
    // ===== Auth =====

    pub async fn login(&self, body: &LoginRequest) -> Result<ApiResponse<LoginResponse>, ApiError> {
        self.post("/auth/login", body).await
    }

    pub async fn register(&self, body: &RegisterRequest) -> Result<ApiResponse, ApiError> {
        self.post("/auth/register", body).await
    }

    pub async fn forgot_password(
        &self,
        body: &ForgotPasswordRequest,
    ) -> Result<ApiResponse, ApiError> {
        self.post("/auth/forgot-password", body).await
    }

    pub async fn reset_password(
        &self,
        body: &ResetPasswordRequest,
    ) -> Result<ApiResponse, ApiError> {
        self.post("/auth/reset-password", body).await
    }

    /// Log in with email and password and install the resulting session.
    ///
    /// The identity is derived from the issued credential's claims; the
    /// session manager treats it as a full identity replacement.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, SignInError> {
        let response = self
            .login(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await?;

        let token = response
            .into_data()
            .map(|d| d.token)
            .filter(|t| !t.is_empty())
            .ok_or(SignInError::MissingToken)?;

        let identity = Identity::from_credential(&token, email)?;
        self.session().login(token, identity.clone())?;
        info!(user = %identity.email, role = %identity.role, "Login successful");
        Ok(identity)
    }

    // ===== Events =====

    pub async fn list_events(
        &self,
        params: &EventListParams,
    ) -> Result<ApiResponse<Vec<Event>>, ApiError> {
        self.get("/events/", &params.to_query()).await
    }

    pub async fn event(&self, id: &str) -> Result<ApiResponse<Event>, ApiError> {
        self.get(&format!("/events/{}", id), &[]).await
    }

    pub async fn event_seats(&self, id: &str) -> Result<ApiResponse<SeatAvailability>, ApiError> {
        self.get(&format!("/events/{}/seats", id), &[]).await
    }

    pub async fn ticket_types(&self, id: &str) -> Result<ApiResponse<Vec<TicketType>>, ApiError> {
        self.get(&format!("/events/{}/ticket-types", id), &[]).await
    }

    // ===== Admin event mutations =====

    pub async fn create_event(
        &self,
        body: &CreateEventRequest,
    ) -> Result<ApiResponse<CreatedEvent>, ApiError> {
        self.post("/admin/events/", body).await
    }

    pub async fn update_event(
        &self,
        id: &str,
        body: &UpdateEventRequest,
    ) -> Result<ApiResponse<Event>, ApiError> {
        self.put(&format!("/admin/events/{}", id), body).await
    }

    pub async fn delete_event(&self, id: &str) -> Result<ApiResponse, ApiError> {
        self.delete(&format!("/admin/events/{}", id)).await
    }

    /// Upload an event cover image read from `path`
    pub async fn upload_event_image(
        &self,
        path: &Path,
    ) -> Result<ApiResponse<UploadedImage>, ApiError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ApiError::InvalidRequest(format!("{}: {}", path.display(), e)))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| IMAGE_FIELD.to_string());

        let form = Form::new().part(IMAGE_FIELD, Part::bytes(bytes).file_name(file_name));
        self.upload("/admin/upload", form).await
    }

    // ===== Registrations =====

    pub async fn my_registrations(&self) -> Result<ApiResponse<Vec<Registration>>, ApiError> {
        self.get("/registrations/", &[]).await
    }

    pub async fn register_for_event(
        &self,
        body: &CreateRegistrationRequest,
    ) -> Result<ApiResponse<Registration>, ApiError> {
        self.post("/registrations/", body).await
    }

    pub async fn cancel_registration(&self, id: &str) -> Result<ApiResponse, ApiError> {
        self.delete(&format!("/registrations/{}", id)).await
    }

    pub async fn update_rsvp(
        &self,
        id: &str,
        status: RsvpStatus,
    ) -> Result<ApiResponse<Registration>, ApiError> {
        self.put(&format!("/registrations/{}/rsvp", id), &RsvpUpdate { status })
            .await
    }

    pub async fn transfer_ticket(
        &self,
        id: &str,
        to_email: &str,
    ) -> Result<ApiResponse<Value>, ApiError> {
        let body = TransferRequest {
            to_email: to_email.to_string(),
        };
        self.post(&format!("/registrations/{}/transfer", id), &body)
            .await
    }

    // ===== Admin analytics =====

    pub async fn analytics(&self) -> Result<ApiResponse<Vec<EventStats>>, ApiError> {
        self.get("/admin/analytics", &[]).await
    }

    pub async fn analytics_summary(&self) -> Result<ApiResponse<SystemStats>, ApiError> {
        self.get("/admin/analytics/summary", &[]).await
    }

    pub async fn attendees(&self, event_id: &str) -> Result<ApiResponse<Vec<Attendee>>, ApiError> {
        self.get(&format!("/admin/events/{}/attendees", event_id), &[])
            .await
    }
}
