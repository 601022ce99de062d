// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted provider and authenticator.
//!
//! Each operation pops its next result from a FIFO script. When a script
//! runs dry a fixed default applies: search returns the configured listing,
//! reserve fails with a sold-out message, pay and cancel succeed.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use railsnipe_core::{
    Authenticator, CardInfo, Credentials, ErrorClass, Passengers, RawRecord, SearchCriteria,
    SeatPolicy, SessionHandle, SessionKey, SessionMaterial, TrainOption, UpstreamClient,
    UpstreamError,
};

/// One observed call, with the session token it was made with.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamCall {
    Search { token: String },
    Reserve { token: String, train_no: String, policy: SeatPolicy },
    Pay { token: String, record: RawRecord },
    Cancel { token: String, record: RawRecord },
    List { token: String },
}

type Script<T> = Mutex<VecDeque<Result<T, UpstreamError>>>;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A provider whose responses are queued up front.
#[derive(Default)]
pub struct ScriptedUpstream {
    listing: Mutex<Vec<TrainOption>>,
    search: Script<Vec<TrainOption>>,
    reserve: Script<RawRecord>,
    pay: Script<()>,
    cancel: Script<()>,
    list: Script<Vec<RawRecord>>,
    bookings: Mutex<Vec<RawRecord>>,
    reserve_delay: Mutex<Duration>,
    calls: Mutex<Vec<UpstreamCall>>,
}

impl ScriptedUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// The listing search returns once its script is empty.
    pub fn with_listing(self, trains: Vec<TrainOption>) -> Self {
        *lock(&self.listing) = trains;
        self
    }

    /// Records the booking listing returned by `list_reservations`.
    pub fn with_bookings(self, records: Vec<RawRecord>) -> Self {
        *lock(&self.bookings) = records;
        self
    }

    /// Every reserve call sleeps this long before answering.
    pub fn with_reserve_delay(self, delay: Duration) -> Self {
        *lock(&self.reserve_delay) = delay;
        self
    }

    pub fn push_search(&self, result: Result<Vec<TrainOption>, UpstreamError>) {
        lock(&self.search).push_back(result);
    }

    pub fn push_reserve(&self, result: Result<RawRecord, UpstreamError>) {
        lock(&self.reserve).push_back(result);
    }

    pub fn push_pay(&self, result: Result<(), UpstreamError>) {
        lock(&self.pay).push_back(result);
    }

    pub fn push_cancel(&self, result: Result<(), UpstreamError>) {
        lock(&self.cancel).push_back(result);
    }

    pub fn push_list(&self, result: Result<Vec<RawRecord>, UpstreamError>) {
        lock(&self.list).push_back(result);
    }

    pub fn set_listing(&self, trains: Vec<TrainOption>) {
        *lock(&self.listing) = trains;
    }

    pub fn calls(&self) -> Vec<UpstreamCall> {
        lock(&self.calls).clone()
    }

    pub fn reserve_calls(&self) -> usize {
        self.count(|c| matches!(c, UpstreamCall::Reserve { .. }))
    }

    pub fn search_calls(&self) -> usize {
        self.count(|c| matches!(c, UpstreamCall::Search { .. }))
    }

    pub fn pay_calls(&self) -> usize {
        self.count(|c| matches!(c, UpstreamCall::Pay { .. }))
    }

    /// The current booking listing, reflecting cancels and payments.
    pub fn bookings(&self) -> Vec<RawRecord> {
        lock(&self.bookings).clone()
    }

    fn count(&self, pred: impl Fn(&UpstreamCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: UpstreamCall) {
        lock(&self.calls).push(call);
    }
}

/// The sold-out error a real provider returns when nothing is left.
pub fn sold_out_error() -> UpstreamError {
    UpstreamError::new(ErrorClass::NoSeat, "잔여석없음")
}

#[async_trait]
impl UpstreamClient for ScriptedUpstream {
    async fn search(
        &self,
        session: &SessionHandle,
        _criteria: &SearchCriteria,
    ) -> Result<Vec<TrainOption>, UpstreamError> {
        self.record(UpstreamCall::Search {
            token: session.token.clone(),
        });
        let scripted = lock(&self.search).pop_front();
        scripted.unwrap_or_else(|| Ok(lock(&self.listing).clone()))
    }

    async fn reserve(
        &self,
        session: &SessionHandle,
        train: &TrainOption,
        _passengers: &Passengers,
        seat_policy: SeatPolicy,
    ) -> Result<RawRecord, UpstreamError> {
        self.record(UpstreamCall::Reserve {
            token: session.token.clone(),
            train_no: train.train_no.clone(),
            policy: seat_policy,
        });
        let delay = *lock(&self.reserve_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let result = lock(&self.reserve)
            .pop_front()
            .unwrap_or_else(|| Err(sold_out_error()));
        if let Ok(record) = &result {
            lock(&self.bookings).push(record.clone());
        }
        result
    }

    async fn cancel(&self, session: &SessionHandle, record: &RawRecord) -> Result<(), UpstreamError> {
        self.record(UpstreamCall::Cancel {
            token: session.token.clone(),
            record: record.clone(),
        });
        let result = lock(&self.cancel).pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            lock(&self.bookings).retain(|r| r != record);
        }
        result
    }

    async fn pay(
        &self,
        session: &SessionHandle,
        record: &RawRecord,
        _card: &CardInfo,
    ) -> Result<(), UpstreamError> {
        self.record(UpstreamCall::Pay {
            token: session.token.clone(),
            record: record.clone(),
        });
        let result = lock(&self.pay).pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            for booked in lock(&self.bookings).iter_mut() {
                if *booked == *record
                    && let RawRecord::SrtReservation(r) = booked
                {
                    r.paid = true;
                }
            }
        }
        result
    }

    async fn list_reservations(
        &self,
        session: &SessionHandle,
    ) -> Result<Vec<RawRecord>, UpstreamError> {
        self.record(UpstreamCall::List {
            token: session.token.clone(),
        });
        let scripted = lock(&self.list).pop_front();
        scripted.unwrap_or_else(|| Ok(lock(&self.bookings).clone()))
    }
}

/// An authenticator that counts logins and issues `token-{n}`.
#[derive(Default)]
pub struct ScriptedAuthenticator {
    logins: AtomicUsize,
    delay: Duration,
    script: Script<SessionMaterial>,
}

impl ScriptedAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every login takes this long, widening the window for concurrent callers.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push(&self, result: Result<SessionMaterial, UpstreamError>) {
        lock(&self.script).push_back(result);
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authenticator for ScriptedAuthenticator {
    async fn login(
        &self,
        _key: &SessionKey,
        _credentials: &Credentials,
    ) -> Result<SessionMaterial, UpstreamError> {
        let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let scripted = lock(&self.script).pop_front();
        scripted.unwrap_or_else(|| {
            Ok(SessionMaterial {
                cookies: BTreeMap::from([("JSESSIONID".to_string(), format!("cookie-{n}"))]),
                token: format!("token-{n}"),
                expires_in_secs: None,
                refreshable: true,
            })
        })
    }
}
