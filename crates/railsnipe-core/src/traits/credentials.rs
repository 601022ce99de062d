// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;

use crate::error::RailsnipeError;
use crate::types::{CardInfo, Credentials, Provider, SessionKey, UserRef};

/// Supplies provider logins so any worker can re-authenticate a user.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn credentials(&self, key: &SessionKey) -> Result<Option<Credentials>, RailsnipeError>;
}

/// Supplies the card used for automatic payment.
#[async_trait]
pub trait PaymentMethods: Send + Sync {
    async fn card_for(
        &self,
        user: &UserRef,
        provider: Provider,
    ) -> Result<Option<CardInfo>, RailsnipeError>;
}
