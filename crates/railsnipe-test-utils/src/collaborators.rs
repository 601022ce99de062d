// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed credentials and cards, and a notifier that remembers what it sent.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use railsnipe_core::{
    CardInfo, CredentialSource, Credentials, NotificationKind, Notifier, PaymentMethods, Provider,
    RailsnipeError, SessionKey, UserRef,
};
use secrecy::SecretString;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Credentials and cards held in plain maps.
#[derive(Default)]
pub struct StaticCredentials {
    logins: Mutex<HashMap<SessionKey, Credentials>>,
    cards: Mutex<HashMap<(UserRef, Provider), CardInfo>>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_login(self, user: &str, provider: Provider, login_id: &str, password: &str) -> Self {
        lock(&self.logins).insert(
            SessionKey::new(user, provider),
            Credentials {
                login_id: login_id.to_string(),
                password: SecretString::from(password.to_string()),
            },
        );
        self
    }

    pub fn with_card(self, user: &str, provider: Provider) -> Self {
        lock(&self.cards).insert((UserRef(user.to_string()), provider), test_card());
        self
    }
}

/// A personal card with a well-known number.
pub fn test_card() -> CardInfo {
    CardInfo {
        number: SecretString::from("9410123456781234"),
        password: SecretString::from("12"),
        birthday: SecretString::from("900101"),
        expire: SecretString::from("2812"),
    }
}

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn credentials(&self, key: &SessionKey) -> Result<Option<Credentials>, RailsnipeError> {
        Ok(lock(&self.logins).get(key).cloned())
    }
}

#[async_trait]
impl PaymentMethods for StaticCredentials {
    async fn card_for(
        &self,
        user: &UserRef,
        provider: Provider,
    ) -> Result<Option<CardInfo>, RailsnipeError> {
        Ok(lock(&self.cards).get(&(user.clone(), provider)).cloned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub user: UserRef,
    pub kind: NotificationKind,
    pub message: String,
}

/// Notifier that records every delivery, optionally failing all of them.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.failing.store(true, Ordering::SeqCst);
        notifier
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        user: &UserRef,
        kind: NotificationKind,
        message: &str,
    ) -> Result<(), RailsnipeError> {
        lock(&self.sent).push(SentNotification {
            user: user.clone(),
            kind,
            message: message.to_string(),
        });
        if self.failing.load(Ordering::SeqCst) {
            return Err(RailsnipeError::Notify {
                message: "delivery refused".to_string(),
                source: None,
            });
        }
        Ok(())
    }
}
