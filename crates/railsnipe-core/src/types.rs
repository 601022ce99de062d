// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the engine, the stores, and the gateway.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::TaskError;
use crate::records::TrainOption;

/// Unique identifier for a reservation task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque reference to the user a task or session acts for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserRef(pub String);

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The booking system being automated against.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum Provider {
    Srt,
    Ktx,
}

/// Key of one authenticated session: a user at a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub user: UserRef,
    pub provider: Provider,
}

impl SessionKey {
    pub fn new(user: impl Into<String>, provider: Provider) -> Self {
        Self {
            user: UserRef(user.into()),
            provider,
        }
    }

    /// The key under which the encrypted handle is persisted.
    pub fn storage_key(&self) -> String {
        format!("session:{}:{}", self.provider, self.user)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a [`crate::PluginAdapter`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Upstream,
    Storage,
    Notifier,
    Vault,
}

// --- Reservation request ---

/// Passenger categories recognised by both providers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PassengerKind {
    Adult,
    Child,
    Senior,
    Disability1to3,
    Disability4to6,
}

/// Passenger composition: one count per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Passengers {
    pub adult: u32,
    pub child: u32,
    pub senior: u32,
    pub disability1to3: u32,
    pub disability4to6: u32,
}

impl Passengers {
    pub fn adults(count: u32) -> Self {
        Self {
            adult: count,
            ..Self::default()
        }
    }

    pub fn total(&self) -> u32 {
        self.counts().map(|(_, n)| n).fold(0u32, u32::saturating_add)
    }

    /// Non-zero counts in a fixed category order.
    pub fn counts(&self) -> impl Iterator<Item = (PassengerKind, u32)> {
        [
            (PassengerKind::Adult, self.adult),
            (PassengerKind::Child, self.child),
            (PassengerKind::Senior, self.senior),
            (PassengerKind::Disability1to3, self.disability1to3),
            (PassengerKind::Disability4to6, self.disability4to6),
        ]
        .into_iter()
        .filter(|(_, n)| *n > 0)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SeatClass {
    General,
    Special,
}

/// Ordered seat-class fallback policy.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SeatPolicy {
    #[default]
    GeneralFirst,
    GeneralOnly,
    SpecialFirst,
    SpecialOnly,
}

impl SeatPolicy {
    /// Seat classes to try, most preferred first.
    pub fn classes(self) -> &'static [SeatClass] {
        match self {
            Self::GeneralFirst => &[SeatClass::General, SeatClass::Special],
            Self::GeneralOnly => &[SeatClass::General],
            Self::SpecialFirst => &[SeatClass::Special, SeatClass::General],
            Self::SpecialOnly => &[SeatClass::Special],
        }
    }

    /// The single-class policy that pins a reservation to `class`.
    pub fn only(class: SeatClass) -> Self {
        match class {
            SeatClass::General => Self::GeneralOnly,
            SeatClass::Special => Self::SpecialOnly,
        }
    }
}

/// Route, date and departure window of a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub origin: String,
    pub destination: String,
    pub date: NaiveDate,
    /// Earliest acceptable departure.
    pub depart_after: NaiveTime,
    /// Latest acceptable departure, if bounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depart_before: Option<NaiveTime>,
}

impl SearchCriteria {
    pub fn window_contains(&self, departure: NaiveTime) -> bool {
        departure >= self.depart_after && self.depart_before.is_none_or(|end| departure <= end)
    }
}

/// Immutable input of one reservation task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub user: UserRef,
    pub provider: Provider,
    #[serde(flatten)]
    pub criteria: SearchCriteria,
    #[serde(default)]
    pub passengers: Passengers,
    /// Train numbers in priority order; the first open one wins.
    pub candidates: Vec<String>,
    #[serde(default)]
    pub seat_policy: SeatPolicy,
    #[serde(default)]
    pub auto_payment: bool,
}

impl ReservationRequest {
    pub fn session_key(&self) -> SessionKey {
        SessionKey {
            user: self.user.clone(),
            provider: self.provider,
        }
    }

    /// Checks the request is well-formed, returning a human-readable reason otherwise.
    pub fn validate(&self) -> Result<(), String> {
        if self.passengers.total() == 0 {
            return Err("at least one passenger is required".into());
        }
        if self.candidates.is_empty() {
            return Err("no candidate trains given".into());
        }
        if self.candidates.iter().any(|c| c.trim().is_empty()) {
            return Err("candidate train numbers must not be blank".into());
        }
        let origin = self.criteria.origin.trim();
        let destination = self.criteria.destination.trim();
        if origin.is_empty() || destination.is_empty() {
            return Err("origin and destination are required".into());
        }
        if origin == destination {
            return Err(format!("origin and destination are both {origin}"));
        }
        if let Some(end) = self.criteria.depart_before
            && end < self.criteria.depart_after
        {
            return Err(format!(
                "departure window ends ({end}) before it starts ({})",
                self.criteria.depart_after
            ));
        }
        Ok(())
    }
}

// --- Task lifecycle ---

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }

    /// Legal lifecycle edges. No state is skipped and terminal states are final.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Cancelled)
                | (Self::Running, Self::Success)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Cancelled)
        )
    }
}

/// Payload of a successful task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingResult {
    pub record_ref: ExternalRecordRef,
    pub train: TrainOption,
    pub seat_class: SeatClass,
    pub summary: String,
    #[serde(default)]
    pub seats: Vec<String>,
    pub paid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_error: Option<String>,
}

/// Observable state of a reservation task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskState {
    pub task_id: TaskId,
    pub user: UserRef,
    pub provider: Provider,
    pub status: TaskStatus,
    pub attempt_count: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_progress_message: Option<String>,
    #[serde(default)]
    pub last_error: Option<TaskError>,
    #[serde(default)]
    pub result: Option<BookingResult>,
    /// Sequence number of the last event folded into this snapshot.
    #[serde(default)]
    pub last_sequence: u64,
}

impl TaskState {
    pub fn pending(task_id: TaskId, request: &ReservationRequest) -> Self {
        Self {
            task_id,
            user: request.user.clone(),
            provider: request.provider,
            status: TaskStatus::Pending,
            attempt_count: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            last_progress_message: None,
            last_error: None,
            result: None,
            last_sequence: 0,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProgressKind {
    Update,
    Progress,
    Success,
    Failed,
    Error,
}

impl ProgressKind {
    /// Kinds delivered to the notification collaborator.
    pub fn is_terminal_notice(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// One append-only progress event of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub task_id: TaskId,
    pub sequence: u64,
    #[serde(rename = "type")]
    pub kind: ProgressKind,
    pub attempt_count: u64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    pub emitted_at: DateTime<Utc>,
}

// --- Sessions ---

/// Login material for a (user, provider) pair.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub login_id: String,
    pub password: SecretString,
}

/// What a successful login returns, before the manager stamps expiry.
#[derive(Clone, Default)]
pub struct SessionMaterial {
    pub cookies: BTreeMap<String, String>,
    pub token: String,
    /// Provider-reported lifetime, if any.
    pub expires_in_secs: Option<u64>,
    pub refreshable: bool,
}

impl fmt::Debug for SessionMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionMaterial")
            .field("cookies", &format_args!("[{} REDACTED]", self.cookies.len()))
            .field("token", &"[REDACTED]")
            .field("expires_in_secs", &self.expires_in_secs)
            .field("refreshable", &self.refreshable)
            .finish()
    }
}

/// One authenticated connection to a provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHandle {
    pub key: SessionKey,
    pub cookies: BTreeMap<String, String>,
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub refreshable: bool,
}

impl SessionHandle {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("key", &self.key)
            .field("token", &"[REDACTED]")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("refreshable", &self.refreshable)
            .finish()
    }
}

/// Ciphertext as persisted by a session store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBlob {
    pub nonce: [u8; 12],
    pub ciphertext: Vec<u8>,
}

// --- Records, payments, notifications ---

/// Stable caller-visible key of an upstream reservation or ticket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalRecordRef(pub String);

impl fmt::Display for ExternalRecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusinessType {
    Personal,
    Corporate,
}

impl BusinessType {
    /// Provider code: `J` for personal cards, `S` for corporate ones.
    pub fn code(self) -> &'static str {
        match self {
            Self::Personal => "J",
            Self::Corporate => "S",
        }
    }
}

/// Card used for automatic payment.
#[derive(Clone, Deserialize)]
pub struct CardInfo {
    pub number: SecretString,
    /// First two digits of the card PIN.
    pub password: SecretString,
    /// Birth date (YYMMDD) or business registration number.
    pub birthday: SecretString,
    /// Expiry as YYMM.
    pub expire: SecretString,
}

impl CardInfo {
    /// Six digits is a birth date (personal); anything longer is a business number.
    pub fn business_type(&self) -> BusinessType {
        if self.birthday.expose_secret().len() == 6 {
            BusinessType::Personal
        } else {
            BusinessType::Corporate
        }
    }

    /// All but the last four digits replaced by `*`.
    pub fn masked_number(&self) -> String {
        let chars: Vec<char> = self.number.expose_secret().chars().collect();
        if chars.len() < 4 {
            return "*".repeat(chars.len());
        }
        let split = chars.len() - 4;
        let visible: String = chars[split..].iter().collect();
        format!("{}{visible}", "*".repeat(split))
    }
}

impl fmt::Debug for CardInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardInfo")
            .field("number", &self.masked_number())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Failure,
}
