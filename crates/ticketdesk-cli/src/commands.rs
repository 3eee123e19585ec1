//! Subcommand definitions and their handlers.
//!
//! Reads go through the retry policy; mutations are sent once.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use chrono::Utc;
use clap::Subcommand;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, warn};

use ticketdesk_core::cache::CacheManager;
use ticketdesk_core::models::{
    CreateEventRequest, CreateRegistrationRequest, Event, EventListParams, ForgotPasswordRequest,
    RegisterRequest, Registration, ResetPasswordRequest, RsvpStatus, UpdateEventRequest,
};
use ticketdesk_core::api::SignInError;
use ticketdesk_core::{ApiClient, ApiError, Config, RetryPolicy, SessionEvent};

use crate::format::{
    format_date, format_money, format_optional, format_remaining, truncate_string,
};

/// How long to wait for the session manager to react to a rejected request
const EXPIRY_SETTLE_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in with email and password
    Login {
        /// Account email (defaults to the last one used)
        email: Option<String>,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show who is signed in and when the session expires
    Status,
    /// Create a new account
    Signup {
        email: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Request a password reset email
    ForgotPassword { email: String },
    /// Set a new password using the token from a reset email
    ResetPassword { token: String },
    /// List published events
    Events {
        #[arg(long)]
        category: Option<String>,
        /// Free-text search
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
        /// Ignore the local cache
        #[arg(long)]
        refresh: bool,
    },
    /// Show one event with its ticket types and seat availability
    Event { id: String },
    /// List your tickets
    Tickets {
        /// Ignore the local cache
        #[arg(long)]
        refresh: bool,
    },
    /// Book a ticket for an event
    Book {
        event_id: String,
        #[arg(long)]
        ticket_type: Option<String>,
    },
    /// Cancel a registration
    Cancel { id: String },
    /// Update your RSVP (yes, no, maybe)
    Rsvp { id: String, status: RsvpStatus },
    /// Transfer a ticket to another account
    Transfer { id: String, to_email: String },
    /// Administrative commands
    #[command(subcommand)]
    Admin(AdminCommand),
}

#[derive(Subcommand, Debug)]
pub enum AdminCommand {
    /// Per-event sales figures
    Analytics,
    /// System-wide totals
    Summary,
    /// List attendees of an event
    Attendees { event_id: String },
    /// Create an event from a JSON file
    CreateEvent { file: PathBuf },
    /// Apply a partial update from a JSON file
    UpdateEvent { id: String, file: PathBuf },
    /// Delete an event
    DeleteEvent { id: String },
    /// Upload an event cover image
    Upload { image: PathBuf },
}

/// Everything a command needs
pub struct Context {
    pub config: Config,
    pub client: ApiClient,
    pub cache: CacheManager,
    pub retry: RetryPolicy,
}

impl Context {
    fn require_session(&self) -> Result<()> {
        if !self.client.session().is_authenticated() {
            bail!("Not signed in. Run `ticketdesk login` first.");
        }
        Ok(())
    }

    fn require_admin(&self) -> Result<()> {
        self.require_session()?;
        if !self.client.session().is_admin() {
            bail!("This command requires an admin account");
        }
        Ok(())
    }

    /// React to session events raised while the command ran.
    ///
    /// Session-scoped cache entries are dropped on every change of identity.
    /// A rejected request expires the session asynchronously, so when the
    /// command failed with 401 this briefly waits for the expiry to land.
    pub async fn settle_session_events(
        &self,
        events: &mut broadcast::Receiver<SessionEvent>,
        unauthorized: bool,
    ) {
        if unauthorized {
            match tokio::time::timeout(EXPIRY_SETTLE_TIMEOUT, events.recv()).await {
                Ok(Ok(event)) => self.on_session_event(&event),
                Ok(Err(e)) => debug!(error = %e, "Session event channel closed"),
                Err(_) => debug!("No session event after rejected request"),
            }
        }

        loop {
            match events.try_recv() {
                Ok(event) => self.on_session_event(&event),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed session events");
                    self.clear_cache();
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }

    fn on_session_event(&self, event: &SessionEvent) {
        debug!(?event, "Session event");
        self.clear_cache();
        if let SessionEvent::Expired { .. } = event {
            eprintln!("Session expired, please sign in again.");
        }
    }

    fn clear_cache(&self) {
        if let Err(e) = self.cache.clear() {
            warn!(error = %e, "Failed to clear cache");
        }
    }

    /// A ticket changed hands or state; ticket counts on events move with it
    fn after_ticket_change(&self) {
        if let Err(e) = self.cache.invalidate_registrations() {
            warn!(error = %e, "Failed to invalidate cached registrations");
        }
        self.after_event_change();
    }

    fn after_event_change(&self) {
        if let Err(e) = self.cache.invalidate_events() {
            warn!(error = %e, "Failed to invalidate cached events");
        }
    }
}

pub async fn run(ctx: &mut Context, command: Command) -> Result<()> {
    match command {
        Command::Login { email } => login(ctx, email).await,
        Command::Logout => {
            ctx.client.session().logout();
            println!("Signed out.");
            Ok(())
        }
        Command::Status => {
            status(ctx);
            Ok(())
        }
        Command::Signup { email, name } => signup(ctx, email, name).await,
        Command::ForgotPassword { email } => {
            let response = ctx
                .client
                .forgot_password(&ForgotPasswordRequest { email })
                .await?;
            println!(
                "{}",
                format_optional(
                    response.message.as_deref(),
                    "If the account exists, a reset link has been sent."
                )
            );
            Ok(())
        }
        Command::ResetPassword { token } => {
            let password = rpassword::prompt_password("New password: ")?;
            ctx.client
                .reset_password(&ResetPasswordRequest { token, password })
                .await?;
            println!("Password updated. You can now sign in.");
            Ok(())
        }
        Command::Events {
            category,
            search,
            page,
            limit,
            refresh,
        } => {
            let params = EventListParams {
                category,
                q: search,
                page,
                limit,
            };
            list_events(ctx, &params, refresh).await
        }
        Command::Event { id } => show_event(ctx, &id).await,
        Command::Tickets { refresh } => list_tickets(ctx, refresh).await,
        Command::Book {
            event_id,
            ticket_type,
        } => {
            ctx.require_session()?;
            let body = CreateRegistrationRequest {
                event_id,
                ticket_type_id: ticket_type,
            };
            let registration = ctx
                .client
                .register_for_event(&body)
                .await?
                .into_data()
                .context("Registration response had no data")?;
            ctx.after_ticket_change();
            println!(
                "Booked {} (registration {})",
                registration.event.title, registration.id
            );
            Ok(())
        }
        Command::Cancel { id } => {
            ctx.require_session()?;
            ctx.client.cancel_registration(&id).await?;
            ctx.after_ticket_change();
            println!("Registration {} cancelled.", id);
            Ok(())
        }
        Command::Rsvp { id, status } => {
            ctx.require_session()?;
            ctx.client.update_rsvp(&id, status).await?;
            if let Err(e) = ctx.cache.invalidate_registrations() {
                warn!(error = %e, "Failed to invalidate cached registrations");
            }
            println!("RSVP updated: {}", status);
            Ok(())
        }
        Command::Transfer { id, to_email } => {
            ctx.require_session()?;
            ctx.client.transfer_ticket(&id, &to_email).await?;
            ctx.after_ticket_change();
            println!("Ticket transferred to {}.", to_email);
            Ok(())
        }
        Command::Admin(command) => {
            ctx.require_admin()?;
            admin(ctx, command).await
        }
    }
}

// ===== Session =====

async fn login(ctx: &mut Context, email: Option<String>) -> Result<()> {
    let email = match email.or_else(|| ctx.config.last_email.clone()) {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    if email.is_empty() {
        bail!("Email is required");
    }
    let password = rpassword::prompt_password("Password: ")?;
    if password.is_empty() {
        bail!("Password is required");
    }

    let identity = ctx.client.sign_in(&email, &password).await?;

    ctx.config.last_email = Some(email);
    if let Err(e) = ctx.config.save() {
        warn!(error = %e, "Failed to save config");
    }

    println!("Signed in as {} ({})", identity.email, identity.role);
    Ok(())
}

fn status(ctx: &Context) {
    let session = ctx.client.session();
    match session.identity() {
        Some(identity) => {
            println!("Signed in as {} ({})", identity.email, identity.role);
            match session.expires_at() {
                Some(exp) => println!(
                    "Session expires {}",
                    format_remaining(exp, Utc::now().timestamp())
                ),
                None => println!("Session expiry unknown"),
            }
        }
        None => println!("Not signed in."),
    }
    println!("API: {}", ctx.client.base_url());
}

async fn signup(ctx: &Context, email: String, name: Option<String>) -> Result<()> {
    let password = rpassword::prompt_password("Choose a password: ")?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if password != confirm {
        bail!("Passwords do not match");
    }

    ctx.client
        .register(&RegisterRequest {
            email: email.clone(),
            password,
            name,
            role: None,
        })
        .await?;
    println!("Account created for {}. Run `ticketdesk login` to sign in.", email);
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

// ===== Events =====

async fn list_events(ctx: &Context, params: &EventListParams, refresh: bool) -> Result<()> {
    // Only the unfiltered first page is cached
    let cacheable = *params == EventListParams::default();

    if cacheable && !refresh {
        match ctx.cache.load_events() {
            Ok(Some(cached)) if !cached.is_stale() => {
                print_events(&cached.data);
                println!("(cached {})", cached.age_display());
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Ignoring unreadable events cache"),
        }
    }

    let response = ctx.retry.run(|| ctx.client.list_events(params)).await?;
    let meta = response.meta.clone();
    let events = response.into_data().unwrap_or_default();

    if cacheable {
        if let Err(e) = ctx.cache.save_events(&events) {
            warn!(error = %e, "Failed to cache events");
        }
    }

    print_events(&events);
    if let Some(meta) = meta {
        println!("Page {} of {} ({} events)", meta.page, meta.total_pages.max(1), meta.total);
        if meta.has_next_page() {
            println!("More results: --page {}", meta.page + 1);
        }
    }
    Ok(())
}

fn print_events(events: &[Event]) {
    if events.is_empty() {
        println!("No events found.");
        return;
    }
    println!(
        "{:<12} {:<32} {:<14} {:<20} {:>9} {:>7}",
        "ID", "TITLE", "CATEGORY", "STARTS", "PRICE", "LEFT"
    );
    for event in events {
        let left = if event.is_sold_out() {
            "SOLD OUT".to_string()
        } else {
            event.remaining_tickets.to_string()
        };
        println!(
            "{:<12} {:<32} {:<14} {:<20} {:>9} {:>7}",
            truncate_string(&event.id, 12),
            truncate_string(&event.title, 32),
            truncate_string(&event.category, 14),
            event.start_display(),
            event.price_display(),
            left
        );
    }
}

async fn show_event(ctx: &Context, id: &str) -> Result<()> {
    let event = ctx
        .retry
        .run(|| ctx.client.event(id))
        .await?
        .into_data()
        .context("Event response had no data")?;

    println!("{} [{}]", event.title, event.status);
    println!("  When:     {}", event.start_display());
    if let Some(end) = event.end_time.as_deref() {
        println!("  Until:    {}", format_date(end));
    }
    println!("  Where:    {}", format_optional(Some(event.location.as_str()), "TBA"));
    println!("  Category: {}", format_optional(Some(event.category.as_str()), "-"));
    println!("  Price:    {}", event.price_display());
    if !event.description.is_empty() {
        println!();
        println!("{}", event.description);
    }

    match ctx.retry.run(|| ctx.client.event_seats(id)).await {
        Ok(response) => {
            if let Some(seats) = response.into_data() {
                println!();
                println!("Seats remaining: {}", seats.remaining_seats);
            }
        }
        Err(e) => debug!(error = %e, "Seat availability unavailable"),
    }

    let ticket_types = ctx
        .retry
        .run(|| ctx.client.ticket_types(id))
        .await?
        .into_data()
        .unwrap_or_default();
    if !ticket_types.is_empty() {
        println!();
        println!("{:<12} {:<24} {:>9} {:>9}", "TYPE ID", "NAME", "PRICE", "LEFT");
        for tt in &ticket_types {
            println!(
                "{:<12} {:<24} {:>9} {:>9}",
                truncate_string(&tt.id, 12),
                truncate_string(&tt.name, 24),
                format_money(tt.price),
                tt.remaining_tickets
            );
        }
    }
    Ok(())
}

// ===== Tickets =====

async fn list_tickets(ctx: &Context, refresh: bool) -> Result<()> {
    ctx.require_session()?;

    if !refresh {
        match ctx.cache.load_registrations() {
            Ok(Some(cached)) if !cached.is_stale() => {
                print_registrations(&cached.data);
                println!("(cached {})", cached.age_display());
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Ignoring unreadable registrations cache"),
        }
    }

    let registrations = ctx
        .retry
        .run(|| ctx.client.my_registrations())
        .await?
        .into_data()
        .unwrap_or_default();

    if let Err(e) = ctx.cache.save_registrations(&registrations) {
        warn!(error = %e, "Failed to cache registrations");
    }
    print_registrations(&registrations);
    Ok(())
}

fn print_registrations(registrations: &[Registration]) {
    if registrations.is_empty() {
        println!("You have no tickets.");
        return;
    }
    println!(
        "{:<12} {:<32} {:<20} {:<12} {:<10}",
        "ID", "EVENT", "STARTS", "STATUS", "CODE"
    );
    for r in registrations {
        let status = match r.rsvp() {
            Some(rsvp) => rsvp.to_string(),
            None if r.is_cancelled() => "Cancelled".to_string(),
            None => "Confirmed".to_string(),
        };
        let code = r.ticket.as_ref().map(|t| t.ticket_code.as_str());
        println!(
            "{:<12} {:<32} {:<20} {:<12} {:<10}",
            truncate_string(&r.id, 12),
            truncate_string(&r.event.title, 32),
            r.event.start_display(),
            status,
            format_optional(code, "-")
        );
    }
}

// ===== Admin =====

async fn admin(ctx: &Context, command: AdminCommand) -> Result<()> {
    match command {
        AdminCommand::Analytics => {
            let stats = ctx
                .retry
                .run(|| ctx.client.analytics())
                .await?
                .into_data()
                .unwrap_or_default();
            println!(
                "{:<32} {:<14} {:>9} {:>12} {:>9}",
                "EVENT", "CATEGORY", "BOOKINGS", "REVENUE", "LEFT"
            );
            for s in &stats {
                println!(
                    "{:<32} {:<14} {:>9} {:>12} {:>9}",
                    truncate_string(&s.title, 32),
                    format_optional(s.category.as_deref(), "-"),
                    s.total_bookings,
                    format_money(s.revenue),
                    s.tickets_remaining
                );
            }
        }
        AdminCommand::Summary => {
            let summary = ctx
                .retry
                .run(|| ctx.client.analytics_summary())
                .await?
                .into_data()
                .context("Summary response had no data")?;
            println!("Registrations: {}", summary.total_registrations);
            println!("Occupancy:     {:.1}%", summary.occupancy_percentage);
            println!("Cancellations: {:.1}%", summary.cancellation_rate);
        }
        AdminCommand::Attendees { event_id } => {
            let attendees = ctx
                .retry
                .run(|| ctx.client.attendees(&event_id))
                .await?
                .into_data()
                .unwrap_or_default();
            if attendees.is_empty() {
                println!("No attendees yet.");
            }
            for a in &attendees {
                println!("{:<12} {:<36} {}", truncate_string(&a.id, 12), a.email, a.role);
            }
        }
        AdminCommand::CreateEvent { file } => {
            let body: CreateEventRequest = read_json(&file)?;
            let created = ctx
                .client
                .create_event(&body)
                .await?
                .into_data()
                .context("Create response had no data")?;
            ctx.after_event_change();
            println!("Created event {}", created.id);
        }
        AdminCommand::UpdateEvent { id, file } => {
            let body: UpdateEventRequest = read_json(&file)?;
            ctx.client.update_event(&id, &body).await?;
            ctx.after_event_change();
            println!("Updated event {}", id);
        }
        AdminCommand::DeleteEvent { id } => {
            ctx.client.delete_event(&id).await?;
            ctx.after_event_change();
            println!("Deleted event {}", id);
        }
        AdminCommand::Upload { image } => {
            let uploaded = ctx
                .client
                .upload_event_image(&image)
                .await?
                .into_data()
                .context("Upload response had no data")?;
            println!("{}", uploaded.url);
        }
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Whether `error` is (or wraps) a 401 from the service
pub fn is_unauthorized(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        if let Some(api) = cause.downcast_ref::<ApiError>() {
            return api.is_unauthorized();
        }
        // Transparent wrapper: its source() skips the inner ApiError
        matches!(
            cause.downcast_ref::<SignInError>(),
            Some(SignInError::Api(e)) if e.is_unauthorized()
        )
    })
}
