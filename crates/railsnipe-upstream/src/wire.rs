// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request and response bodies of the provider bridge.

use std::collections::BTreeMap;

use railsnipe_core::{Passengers, SeatPolicy, TrainOption};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize)]
pub struct LoginRequest<'a> {
    pub login_id: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
    #[serde(default)]
    pub expires_in_secs: Option<u64>,
    #[serde(default = "default_refreshable")]
    pub refreshable: bool,
}

fn default_refreshable() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub trains: Vec<TrainOption>,
}

#[derive(Serialize)]
pub struct ReserveRequest<'a> {
    pub train: &'a TrainOption,
    pub passengers: &'a Passengers,
    pub seat_policy: SeatPolicy,
}

/// A single record, as the provider shaped it.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecordBody {
    pub record: Value,
}

#[derive(Serialize)]
pub struct PayRequest<'a> {
    pub record: Value,
    pub card: CardPayload<'a>,
}

/// Card fields as the providers name them. Built only at the moment of the
/// pay call and never logged.
#[derive(Serialize)]
pub struct CardPayload<'a> {
    pub number: &'a str,
    pub password: &'a str,
    pub validation_number: &'a str,
    pub expire: &'a str,
    pub business_type: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ListingResponse {
    #[serde(default)]
    pub records: Vec<Value>,
}

/// Error body; the bridge relays the provider's own message text.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub error: Option<ErrorDetail>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn into_message(self) -> Option<String> {
        self.error
            .map(|detail| match detail.code {
                Some(code) => format!("{} ({code})", detail.message),
                None => detail.message,
            })
            .or(self.message)
            .filter(|m| !m.trim().is_empty())
    }
}
