// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Object resolver: stable references for upstream records.
//!
//! Providers hand out no handle that survives between calls, yet cancel and
//! pay need the exact record they returned. A reference is therefore derived
//! from the booking number, and resolving it recomputes the derivation over
//! a freshly fetched listing.

use railsnipe_core::{ExternalRecordRef, RailsnipeError, RawRecord};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Identifier fields probed, in order, when a payload has no known shape.
const OPAQUE_ID_FIELDS: &[&str] = &[
    "reservation_number",
    "pnr_no",
    "rsv_id",
    "reservation_id",
    "ticket_no",
    "booking_id",
];

/// The reference matched nothing in the listing. Refetch and show the user
/// the current list; the booking may have been cancelled or paid elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no booking matches reference {0}")]
pub struct NotFound(pub ExternalRecordRef);

impl From<NotFound> for RailsnipeError {
    fn from(e: NotFound) -> Self {
        RailsnipeError::RecordNotFound(e.0.0)
    }
}

/// The identity a record is referenced by.
///
/// Typed shapes use their booking number. Opaque payloads are scanned for a
/// well-known identifier field, first at the top level and then one object
/// deep; failing that the description stands in.
pub fn booking_number(record: &RawRecord) -> String {
    match record {
        RawRecord::SrtReservation(r) => r.reservation_number.clone(),
        RawRecord::KtxTicket(t) => t.pnr_no.clone(),
        RawRecord::KtxReservation(r) => r.rsv_id.clone(),
        RawRecord::Opaque(o) => scan_identifier(&o.body).unwrap_or_else(|| record.describe()),
    }
}

fn scan_identifier(body: &Value) -> Option<String> {
    let top = body.as_object()?;
    let direct = |obj: &serde_json::Map<String, Value>| {
        OPAQUE_ID_FIELDS
            .iter()
            .find_map(|field| obj.get(*field).and_then(identifier_text))
    };
    direct(top).or_else(|| top.values().filter_map(Value::as_object).find_map(direct))
}

fn identifier_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Derives the reference of `record`.
///
/// The provider and booking number are hashed, so a ticket and a
/// reservation for the same booking share a reference.
pub fn derive_ref(record: &RawRecord) -> ExternalRecordRef {
    let mut hasher = Sha256::new();
    hasher.update(record.provider().to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(booking_number(record).as_bytes());
    let digest = hasher.finalize();
    ExternalRecordRef(hex::encode(&digest[..16]))
}

/// Finds the record in `records` whose derived reference is `target`.
///
/// Tickets are checked before reservations, so when a booking shows up as
/// both the issued ticket is returned.
pub fn resolve<'a>(
    records: &'a [RawRecord],
    target: &ExternalRecordRef,
) -> Result<&'a RawRecord, NotFound> {
    let tickets = records.iter().filter(|r| r.is_ticket());
    let others = records.iter().filter(|r| !r.is_ticket());
    tickets
        .chain(others)
        .find(|record| derive_ref(record) == *target)
        .ok_or_else(|| NotFound(target.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use railsnipe_core::{OpaqueRecord, Provider};
    use serde_json::json;

    fn srt(number: &str, paid: bool) -> RawRecord {
        RawRecord::from_value(
            Provider::Srt,
            json!({
                "reservation_number": number,
                "train_no": "305",
                "paid": paid,
                "tickets": [{"car": "3", "seat": "7A"}]
            }),
        )
    }

    fn opaque(body: Value) -> RawRecord {
        RawRecord::Opaque(OpaqueRecord {
            provider: Provider::Ktx,
            is_ticket: false,
            body,
        })
    }

    #[test]
    fn same_booking_derives_the_same_ref() {
        assert_eq!(derive_ref(&srt("100", false)), derive_ref(&srt("100", true)));
        assert_ne!(derive_ref(&srt("100", false)), derive_ref(&srt("101", false)));
    }

    #[test]
    fn provider_is_part_of_the_identity() {
        let srt_record = srt("7", false);
        let ktx_record = RawRecord::from_value(Provider::Ktx, json!({"rsv_id": "7"}));
        assert_ne!(derive_ref(&srt_record), derive_ref(&ktx_record));
    }

    #[test]
    fn ref_is_stable_hex() {
        let r = derive_ref(&srt("320251102000123", false));
        assert_eq!(r.0.len(), 32);
        assert!(r.0.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(r, derive_ref(&srt("320251102000123", false)));
    }

    #[test]
    fn resolve_is_idempotent() {
        let listing = vec![srt("1", false), srt("2", false), srt("3", true)];
        let target = derive_ref(&listing[1]);
        let first = resolve(&listing, &target).unwrap();
        let second = resolve(&listing, &target).unwrap();
        assert_eq!(first, &listing[1]);
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn missing_record_is_not_found() {
        let listing = vec![srt("1", false)];
        let gone = derive_ref(&srt("9", false));
        assert_eq!(resolve(&listing, &gone), Err(NotFound(gone.clone())));
        let err: RailsnipeError = NotFound(gone).into();
        assert!(matches!(err, RailsnipeError::RecordNotFound(_)));
    }

    #[test]
    fn ticket_wins_over_reservation_of_the_same_booking() {
        let listing = vec![srt("5", false), srt("5", true)];
        let found = resolve(&listing, &derive_ref(&listing[0])).unwrap();
        assert!(found.is_ticket());
    }

    #[test]
    fn opaque_payloads_are_scanned_for_identifiers() {
        let nested = opaque(json!({"booking": {"ticket_no": "T-42"}, "train_no": "101"}));
        assert_eq!(booking_number(&nested), "T-42");

        let numeric = opaque(json!({"reservation_id": 98765}));
        assert_eq!(booking_number(&numeric), "98765");

        let top_wins = opaque(json!({"booking_id": "B-1", "inner": {"pnr_no": "P-1"}}));
        assert_eq!(booking_number(&top_wins), "B-1");
    }

    #[test]
    fn opaque_without_identifier_falls_back_to_description() {
        let record = opaque(json!({"description": "[KTX 101] 서울 -> 부산", "pnr_no": ""}));
        assert_eq!(booking_number(&record), "[KTX 101] 서울 -> 부산");

        let other = opaque(json!({"description": "[KTX 103] 서울 -> 부산"}));
        let listing = vec![record.clone(), other.clone()];
        assert_eq!(resolve(&listing, &derive_ref(&other)).unwrap(), &other);
    }
}
