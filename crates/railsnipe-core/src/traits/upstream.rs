// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The booking provider, consumed as opaque remote calls.

use async_trait::async_trait;

use crate::error::UpstreamError;
use crate::records::{RawRecord, TrainOption};
use crate::types::{
    CardInfo, Credentials, Passengers, SearchCriteria, SeatPolicy, SessionHandle, SessionKey,
    SessionMaterial,
};

/// Search, reserve, cancel and pay against a provider.
///
/// Every failure is returned already classified so the retry scheduler can
/// act on it without inspecting transport details.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Lists current availability for the route and date.
    async fn search(
        &self,
        session: &SessionHandle,
        criteria: &SearchCriteria,
    ) -> Result<Vec<TrainOption>, UpstreamError>;

    /// Reserves seats on `train`. A waitlisted result is returned as a record
    /// with `is_waiting` set, not as an error.
    async fn reserve(
        &self,
        session: &SessionHandle,
        train: &TrainOption,
        passengers: &Passengers,
        seat_policy: SeatPolicy,
    ) -> Result<RawRecord, UpstreamError>;

    /// Cancels a reservation or refunds a ticket.
    async fn cancel(&self, session: &SessionHandle, record: &RawRecord)
    -> Result<(), UpstreamError>;

    /// Pays an unpaid reservation with `card`.
    async fn pay(
        &self,
        session: &SessionHandle,
        record: &RawRecord,
        card: &CardInfo,
    ) -> Result<(), UpstreamError>;

    /// Lists the user's reservations and tickets.
    async fn list_reservations(
        &self,
        session: &SessionHandle,
    ) -> Result<Vec<RawRecord>, UpstreamError>;
}

/// Exchanges credentials for fresh session material.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn login(
        &self,
        key: &SessionKey,
        credentials: &Credentials,
    ) -> Result<SessionMaterial, UpstreamError>;
}
