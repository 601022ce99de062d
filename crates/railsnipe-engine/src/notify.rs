// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Terminal notification texts and the logging notifier.

use async_trait::async_trait;
use railsnipe_core::{BookingResult, NotificationKind, Notifier, RailsnipeError, TaskError, UserRef};
use tracing::info;

/// The message sent when a task books seats.
pub fn success_message(result: &BookingResult) -> String {
    let mut lines = vec![
        "🎫 🎉 예매 성공!!! 🎉 🎫".to_string(),
        result.summary.clone(),
        result.train.describe(),
    ];
    lines.extend(result.seats.iter().cloned());
    lines.push(match (&result.payment_error, result.paid) {
        (_, true) => "결제 완료".to_string(),
        (Some(error), false) => format!("결제 실패: {error}"),
        (None, false) => "결제 대기".to_string(),
    });
    lines.join("\n")
}

/// The message sent when a task fails.
pub fn failure_message(error: &TaskError) -> String {
    format!("❌ 예약 실패\n\n{}", error.message)
}

/// Notifier used when no delivery channel is configured: it only logs.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        user: &UserRef,
        kind: NotificationKind,
        message: &str,
    ) -> Result<(), RailsnipeError> {
        info!(user = %user, kind = %kind, message, "notification");
        Ok(())
    }
}
