// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Booking management by reference.
//!
//! Every operation fetches the user's listing again and resolves the
//! reference against it, so the record handed to cancel or pay is always one
//! the provider returned in the same session.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use railsnipe_core::{
    ErrorClass, ExternalRecordRef, PaymentMethods, Provider, RailsnipeError, RawRecord,
    SessionHandle, SessionKey, UpstreamClient, UserRef,
};
use railsnipe_session::SessionManager;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::resolver;
use crate::task::with_timeout;

/// One entry of a user's booking listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingSummary {
    pub record_ref: ExternalRecordRef,
    pub provider: Provider,
    pub summary: String,
    pub seats: Vec<String>,
    pub is_ticket: bool,
    pub paid: bool,
    pub waiting: bool,
}

impl BookingSummary {
    pub fn of(record: &RawRecord) -> Self {
        Self {
            record_ref: resolver::derive_ref(record),
            provider: record.provider(),
            summary: record.describe(),
            seats: record.seats().iter().map(ToString::to_string).collect(),
            is_ticket: record.is_ticket(),
            paid: record.is_paid(),
            waiting: record.is_waiting(),
        }
    }
}

pub struct BookingDesk {
    upstream: Arc<dyn UpstreamClient>,
    sessions: Arc<SessionManager>,
    payments: Arc<dyn PaymentMethods>,
    call_timeout: Duration,
}

impl BookingDesk {
    pub fn new(
        upstream: Arc<dyn UpstreamClient>,
        sessions: Arc<SessionManager>,
        payments: Arc<dyn PaymentMethods>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            upstream,
            sessions,
            payments,
            call_timeout,
        }
    }

    /// The user's current reservations and tickets.
    #[instrument(skip_all, fields(user = %user, provider = %provider))]
    pub async fn list(
        &self,
        user: &UserRef,
        provider: Provider,
    ) -> Result<Vec<BookingSummary>, RailsnipeError> {
        let key = SessionKey {
            user: user.clone(),
            provider,
        };
        self.with_session(&key, move |handle| async move {
            let records = self.fetch(&handle).await?;
            Ok(records.iter().map(BookingSummary::of).collect())
        })
        .await
    }

    /// Cancels the booking `target` refers to. Issued tickets are refunded.
    #[instrument(skip_all, fields(user = %user, provider = %provider, record_ref = %target))]
    pub async fn cancel(
        &self,
        user: &UserRef,
        provider: Provider,
        target: &ExternalRecordRef,
    ) -> Result<BookingSummary, RailsnipeError> {
        let key = SessionKey {
            user: user.clone(),
            provider,
        };
        let cancelled = self
            .with_session(&key, move |handle| async move {
                let records = self.fetch(&handle).await?;
                let record = resolver::resolve(&records, target)?;
                with_timeout(self.call_timeout, self.upstream.cancel(&handle, record)).await?;
                Ok(BookingSummary::of(record))
            })
            .await?;
        info!(summary = %cancelled.summary, ticket = cancelled.is_ticket, "booking cancelled");
        Ok(cancelled)
    }

    /// Pays the unpaid reservation `target` refers to with the stored card.
    #[instrument(skip_all, fields(user = %user, provider = %provider, record_ref = %target))]
    pub async fn pay(
        &self,
        user: &UserRef,
        provider: Provider,
        target: &ExternalRecordRef,
    ) -> Result<BookingSummary, RailsnipeError> {
        let key = SessionKey {
            user: user.clone(),
            provider,
        };
        let paid = self
            .with_session(&key, move |handle| async move {
                let records = self.fetch(&handle).await?;
                let record = resolver::resolve(&records, target)?;
                if record.is_paid() {
                    return Err(RailsnipeError::Validation(format!(
                        "{} is already paid",
                        record.describe()
                    )));
                }
                if record.is_waiting() {
                    return Err(RailsnipeError::Validation(format!(
                        "{} is waitlisted and cannot be paid yet",
                        record.describe()
                    )));
                }
                let card = self
                    .payments
                    .card_for(user, provider)
                    .await?
                    .ok_or_else(|| {
                        RailsnipeError::Validation(format!(
                            "no payment card stored for {user} at {provider}"
                        ))
                    })?;
                with_timeout(self.call_timeout, self.upstream.pay(&handle, record, &card)).await?;
                let mut summary = BookingSummary::of(record);
                summary.paid = true;
                Ok(summary)
            })
            .await?;
        info!(summary = %paid.summary, "booking paid");
        Ok(paid)
    }

    async fn fetch(&self, handle: &SessionHandle) -> Result<Vec<RawRecord>, RailsnipeError> {
        let records =
            with_timeout(self.call_timeout, self.upstream.list_reservations(handle)).await?;
        Ok(records)
    }

    /// Runs `op` with a session, retrying once with a fresh login when the
    /// provider reports the session expired.
    async fn with_session<T, F, Fut>(&self, key: &SessionKey, op: F) -> Result<T, RailsnipeError>
    where
        F: Fn(Arc<SessionHandle>) -> Fut,
        Fut: Future<Output = Result<T, RailsnipeError>>,
    {
        let mut retried = false;
        loop {
            let handle = self.sessions.acquire(key).await?;
            match op(handle.clone()).await {
                Err(RailsnipeError::Upstream(e))
                    if e.class == ErrorClass::SessionExpired && !retried =>
                {
                    warn!(key = %key, "session expired; logging in again");
                    self.sessions.invalidate_handle(&handle).await?;
                    retried = true;
                }
                other => return other,
            }
        }
    }
}
