// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the provider bridge.
//!
//! Provides [`HttpUpstream`], which implements both [`UpstreamClient`] and
//! [`Authenticator`]. It never retries on its own: every failure is
//! classified and handed to the retry scheduler, which owns pacing.

use std::time::Duration;

use async_trait::async_trait;
use railsnipe_config::model::UpstreamConfig;
use railsnipe_core::{
    AdapterType, Authenticator, CardInfo, Credentials, ErrorClass, HealthStatus, Passengers,
    PluginAdapter, RailsnipeError, RawRecord, SearchCriteria, SeatPolicy, SessionHandle,
    SessionKey, SessionMaterial, TrainOption, UpstreamClient, UpstreamError,
};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::wire::{
    CardPayload, ErrorResponse, ListingResponse, LoginRequest, LoginResponse, PayRequest,
    RecordBody, ReserveRequest, SearchResponse,
};

/// Header carrying the provider session token.
const SESSION_TOKEN_HEADER: &str = "x-session-token";

/// HTTP client for provider bridge communication.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUpstream {
    /// Creates a client for the bridge at `config.base_url`.
    ///
    /// `call_timeout` bounds every request end to end.
    pub fn new(config: &UpstreamConfig, call_timeout: Duration) -> Result<Self, RailsnipeError> {
        let mut headers = HeaderMap::new();
        headers.insert("accept", HeaderValue::from_static("application/json"));
        if let Some(api_key) = &config.api_key {
            let mut value = HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| RailsnipeError::Config(format!("invalid upstream api key: {e}")))?;
            value.set_sensitive(true);
            headers.insert("authorization", value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(call_timeout)
            .build()
            .map_err(|e| RailsnipeError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, key: &SessionKey, op: &str) -> String {
        format!(
            "{}/v1/{}/{op}",
            self.base_url,
            key.provider.to_string().to_lowercase()
        )
    }

    /// A request carrying the session's token and cookies.
    fn authed(&self, builder: RequestBuilder, session: &SessionHandle) -> RequestBuilder {
        let builder = builder.header(SESSION_TOKEN_HEADER, &session.token);
        if session.cookies.is_empty() {
            return builder;
        }
        let cookie = session
            .cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        builder.header("cookie", cookie)
    }

    /// Sends the request and returns the body of a successful response.
    async fn send(&self, builder: RequestBuilder, op: &'static str) -> Result<String, UpstreamError> {
        let response = builder.send().await.map_err(|e| transport_error(op, &e))?;
        let status = response.status();
        debug!(op, status = %status, "bridge response received");
        let body = response.text().await.map_err(|e| transport_error(op, &e))?;
        if status.is_success() {
            Ok(body)
        } else {
            let error = classify_failure(status, &body);
            warn!(op, status = %status, class = %error.class, "bridge call failed");
            Err(error)
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        op: &'static str,
    ) -> Result<T, UpstreamError> {
        let body = self.send(builder, op).await?;
        serde_json::from_str(&body).map_err(|e| {
            UpstreamError::new(
                ErrorClass::Rejected,
                format!("malformed {op} response: {e}"),
            )
        })
    }
}

fn transport_error(op: &str, e: &reqwest::Error) -> UpstreamError {
    UpstreamError::transient(format!("{op} request failed: {e}"))
}

/// Classifies a non-2xx response.
///
/// The provider's own message wins when it is recognised; otherwise the
/// status code decides.
pub fn classify_failure(status: StatusCode, body: &str) -> UpstreamError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(ErrorResponse::into_message)
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| format!("bridge returned {status}"));

    let by_message = ErrorClass::classify_message(&message);
    if by_message != ErrorClass::Rejected {
        return UpstreamError::new(by_message, message);
    }
    let class = match status.as_u16() {
        401 => ErrorClass::SessionExpired,
        400 | 422 => ErrorClass::ValidationError,
        429 => ErrorClass::BotDetected,
        408 | 500 | 502 | 503 | 504 => ErrorClass::TransientNetwork,
        _ => ErrorClass::Rejected,
    };
    UpstreamError::new(class, message)
}

#[async_trait]
impl PluginAdapter for HttpUpstream {
    fn name(&self) -> &str {
        "http-upstream"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Upstream
    }

    async fn health_check(&self) -> Result<HealthStatus, RailsnipeError> {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => Ok(HealthStatus::Healthy),
            Ok(response) => Ok(HealthStatus::Degraded(format!(
                "bridge returned {}",
                response.status()
            ))),
            Err(e) => Ok(HealthStatus::Unhealthy(format!("bridge unreachable: {e}"))),
        }
    }

    async fn shutdown(&self) -> Result<(), RailsnipeError> {
        Ok(())
    }
}

#[async_trait]
impl Authenticator for HttpUpstream {
    async fn login(
        &self,
        key: &SessionKey,
        credentials: &Credentials,
    ) -> Result<SessionMaterial, UpstreamError> {
        let request = LoginRequest {
            login_id: &credentials.login_id,
            password: credentials.password.expose_secret(),
        };
        let builder = self.client.post(self.url(key, "login")).json(&request);
        let login: LoginResponse = self.send_json(builder, "login").await.map_err(|e| {
            // A refused login is a credentials problem, not an expired session.
            if e.class == ErrorClass::SessionExpired {
                UpstreamError::new(ErrorClass::InvalidCredentials, e.message)
            } else {
                e
            }
        })?;
        debug!(key = %key, cookies = login.cookies.len(), "logged in");
        Ok(SessionMaterial {
            cookies: login.cookies,
            token: login.token,
            expires_in_secs: login.expires_in_secs,
            refreshable: login.refreshable,
        })
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstream {
    async fn search(
        &self,
        session: &SessionHandle,
        criteria: &SearchCriteria,
    ) -> Result<Vec<TrainOption>, UpstreamError> {
        let builder = self.client.post(self.url(&session.key, "search")).json(criteria);
        let listing: SearchResponse = self.send_json(self.authed(builder, session), "search").await?;
        Ok(listing.trains)
    }

    async fn reserve(
        &self,
        session: &SessionHandle,
        train: &TrainOption,
        passengers: &Passengers,
        seat_policy: SeatPolicy,
    ) -> Result<RawRecord, UpstreamError> {
        let request = ReserveRequest {
            train,
            passengers,
            seat_policy,
        };
        let builder = self.client.post(self.url(&session.key, "reserve")).json(&request);
        let body: RecordBody = self.send_json(self.authed(builder, session), "reserve").await?;
        Ok(RawRecord::from_value(session.key.provider, body.record))
    }

    async fn cancel(&self, session: &SessionHandle, record: &RawRecord) -> Result<(), UpstreamError> {
        let request = RecordBody {
            record: record.payload(),
        };
        let op = if record.is_ticket() { "refund" } else { "cancel" };
        let builder = self.client.post(self.url(&session.key, op)).json(&request);
        self.send(self.authed(builder, session), "cancel").await?;
        Ok(())
    }

    async fn pay(
        &self,
        session: &SessionHandle,
        record: &RawRecord,
        card: &CardInfo,
    ) -> Result<(), UpstreamError> {
        let request = PayRequest {
            record: record.payload(),
            card: CardPayload {
                number: card.number.expose_secret(),
                password: card.password.expose_secret(),
                validation_number: card.birthday.expose_secret(),
                expire: card.expire.expose_secret(),
                business_type: card.business_type().code(),
            },
        };
        let builder = self.client.post(self.url(&session.key, "pay")).json(&request);
        self.send(self.authed(builder, session), "pay").await?;
        debug!(card = %card.masked_number(), "payment accepted");
        Ok(())
    }

    async fn list_reservations(
        &self,
        session: &SessionHandle,
    ) -> Result<Vec<RawRecord>, UpstreamError> {
        let builder = self.client.get(self.url(&session.key, "reservations"));
        let listing: ListingResponse = self
            .send_json(self.authed(builder, session), "reservations")
            .await?;
        let provider = session.key.provider;
        Ok(listing
            .records
            .into_iter()
            .map(|value| RawRecord::from_value(provider, value))
            .collect())
    }
}
