// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the railsnipe reservation engine.
//!
//! This crate provides the domain types shared by every other crate in the
//! workspace, the error taxonomy used to classify upstream failures, and the
//! collaborator traits the engine is written against. It performs no I/O.

pub mod error;
pub mod records;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{ErrorClass, ErrorKind, RailsnipeError, TaskError, UpstreamError};
pub use records::{
    KtxReservation, KtxTicket, OpaqueRecord, RawRecord, SeatTicket, SrtReservation, TrainOption,
};
pub use types::{
    AdapterType, BookingResult, BusinessType, CardInfo, Credentials, EncryptedBlob,
    ExternalRecordRef, HealthStatus, NotificationKind, PassengerKind, Passengers, ProgressEvent,
    ProgressKind, Provider, ReservationRequest, SearchCriteria, SeatClass, SeatPolicy,
    SessionHandle, SessionKey, SessionMaterial, TaskId, TaskState, TaskStatus, UserRef,
};

pub use traits::{
    Authenticator, CredentialSource, Notifier, PaymentMethods, PluginAdapter, SessionStore,
    TaskJournal, UpstreamClient,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn railsnipe_error_has_all_variants() {
        let _config = RailsnipeError::Config("test".into());
        let _storage = RailsnipeError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _vault = RailsnipeError::Vault("test".into());
        let _upstream = RailsnipeError::from(UpstreamError::new(ErrorClass::NoSeat, "sold out"));
        let _auth = RailsnipeError::Auth {
            key: "session:SRT:alice".into(),
            message: "test".into(),
        };
        let _validation = RailsnipeError::Validation("test".into());
        let _task = RailsnipeError::TaskNotFound("t-1".into());
        let _record = RailsnipeError::RecordNotFound("abc".into());
        let _notify = RailsnipeError::Notify {
            message: "test".into(),
            source: None,
        };
        let _timeout = RailsnipeError::Timeout {
            duration: std::time::Duration::from_secs(15),
        };
        let _internal = RailsnipeError::Internal("test".into());
    }

    #[test]
    fn adapter_type_round_trips_through_strings() {
        use std::str::FromStr;

        let variants = [
            AdapterType::Upstream,
            AdapterType::Storage,
            AdapterType::Notifier,
            AdapterType::Vault,
        ];
        for variant in &variants {
            let s = variant.to_string();
            let parsed = AdapterType::from_str(&s).expect("should parse back");
            assert_eq!(*variant, parsed);
        }
    }

    #[test]
    fn health_status_variants() {
        let healthy = HealthStatus::Healthy;
        let degraded = HealthStatus::Degraded("slow".into());
        let unhealthy = HealthStatus::Unhealthy("down".into());

        assert_eq!(healthy, HealthStatus::Healthy);
        assert_ne!(degraded, healthy);
        assert_ne!(unhealthy, healthy);
    }

    #[test]
    fn all_trait_modules_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_upstream<T: UpstreamClient>() {}
        fn _assert_authenticator<T: Authenticator>() {}
        fn _assert_session_store<T: SessionStore>() {}
        fn _assert_task_journal<T: TaskJournal>() {}
        fn _assert_credentials<T: CredentialSource>() {}
        fn _assert_payments<T: PaymentMethods>() {}
        fn _assert_notifier<T: Notifier>() {}
    }
}
