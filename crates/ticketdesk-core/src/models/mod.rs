//! Data models for the ticketing service.
//!
//! This module contains the request and response payloads carried inside the
//! service envelope:
//!
//! - Auth: `LoginRequest`, `LoginResponse`, `RegisterRequest`, password reset
//! - `Event`, `TicketType`: the public catalog, plus admin mutations
//! - `Registration`, `TicketDetail`: the signed-in user's tickets
//! - Admin analytics: `EventStats`, `SystemStats`, `Attendee`

pub mod admin;
pub mod auth;
pub mod event;
pub mod registration;

pub use admin::{Attendee, EventStats, SystemStats};
pub use auth::{
    ForgotPasswordRequest, LoginRequest, LoginResponse, RegisterRequest, ResetPasswordRequest,
};
pub use event::{
    CreateEventRequest, CreatedEvent, Event, EventListParams, EventStatus, SeatAvailability,
    TicketType, UpdateEventRequest, UploadedImage,
};
pub use registration::{
    CreateRegistrationRequest, Registration, RsvpStatus, RsvpUpdate, TicketDetail,
    TransferRequest,
};
