// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;

use crate::error::RailsnipeError;
use crate::types::{NotificationKind, UserRef};

/// Outbound notification delivery.
///
/// Callers treat delivery as fire-and-forget: errors are logged, never
/// propagated into task state.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        user: &UserRef,
        kind: NotificationKind,
        message: &str,
    ) -> Result<(), RailsnipeError>;
}
