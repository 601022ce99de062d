// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Upstream record shapes: train listings, reservations and tickets.
//!
//! Providers return loosely-typed nested payloads. Known shapes are parsed
//! into typed variants of [`RawRecord`]; anything else is kept verbatim as
//! [`OpaqueRecord`] so identifiers can still be extracted from it.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::types::{Provider, SeatClass};

/// One train from a search listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainOption {
    pub train_no: String,
    #[serde(default)]
    pub train_name: String,
    pub dep_station: String,
    pub arr_station: String,
    pub dep_time: NaiveTime,
    pub arr_time: NaiveTime,
    #[serde(default)]
    pub general_available: bool,
    #[serde(default)]
    pub special_available: bool,
    #[serde(default)]
    pub standby_available: bool,
}

impl TrainOption {
    pub fn has_open(&self, class: SeatClass) -> bool {
        match class {
            SeatClass::General => self.general_available,
            SeatClass::Special => self.special_available,
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "[{} {}] {}({}) -> {}({})",
            self.train_name,
            self.train_no,
            self.dep_station,
            self.dep_time.format("%H:%M"),
            self.arr_station,
            self.arr_time.format("%H:%M"),
        )
    }
}

/// A seat inside a reservation or ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatTicket {
    pub car: String,
    pub seat: String,
    #[serde(default)]
    pub seat_class: Option<SeatClass>,
    #[serde(default)]
    pub passenger: Option<String>,
    #[serde(default)]
    pub price: Option<u64>,
}

impl std::fmt::Display for SeatTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}호차 {}", self.car, self.seat)?;
        if let Some(passenger) = &self.passenger {
            write!(f, " ({passenger})")?;
        }
        Ok(())
    }
}

/// An SRT reservation, paid or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrtReservation {
    pub reservation_number: String,
    #[serde(default)]
    pub train_no: String,
    #[serde(default)]
    pub train_name: String,
    #[serde(default)]
    pub dep_date: String,
    #[serde(default)]
    pub dep_time: String,
    #[serde(default)]
    pub dep_station: String,
    #[serde(default)]
    pub arr_station: String,
    #[serde(default)]
    pub total_cost: Option<u64>,
    #[serde(default)]
    pub paid: bool,
    #[serde(default)]
    pub is_waiting: bool,
    #[serde(default)]
    pub payment_deadline: Option<String>,
    #[serde(default)]
    pub tickets: Vec<SeatTicket>,
    /// The provider's payload exactly as received, handed back for cancel and pay.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub raw: serde_json::Value,
}

/// A KTX reservation that has not been issued as a ticket yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KtxReservation {
    pub rsv_id: String,
    #[serde(default)]
    pub train_no: String,
    #[serde(default)]
    pub train_name: String,
    #[serde(default)]
    pub dep_date: String,
    #[serde(default)]
    pub dep_time: String,
    #[serde(default)]
    pub dep_station: String,
    #[serde(default)]
    pub arr_station: String,
    #[serde(default)]
    pub price: Option<u64>,
    #[serde(default)]
    pub is_waiting: bool,
    #[serde(default)]
    pub payment_deadline: Option<String>,
    #[serde(default)]
    pub seats: Vec<SeatTicket>,
    /// The provider's payload exactly as received, handed back for cancel and pay.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub raw: serde_json::Value,
}

/// A paid KTX ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KtxTicket {
    pub pnr_no: String,
    #[serde(default)]
    pub train_no: String,
    #[serde(default)]
    pub train_name: String,
    #[serde(default)]
    pub dep_date: String,
    #[serde(default)]
    pub dep_time: String,
    #[serde(default)]
    pub dep_station: String,
    #[serde(default)]
    pub arr_station: String,
    #[serde(default)]
    pub price: Option<u64>,
    #[serde(default)]
    pub seats: Vec<SeatTicket>,
    /// The provider's payload exactly as received, handed back for cancel and pay.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub raw: serde_json::Value,
}

/// A payload of unknown shape, kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpaqueRecord {
    pub provider: Provider,
    #[serde(default)]
    pub is_ticket: bool,
    pub body: serde_json::Value,
}

/// Anything a provider returns for a reservation or ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum RawRecord {
    SrtReservation(SrtReservation),
    KtxReservation(KtxReservation),
    KtxTicket(KtxTicket),
    Opaque(OpaqueRecord),
}

impl RawRecord {
    /// Parses a provider payload into the most specific known shape.
    ///
    /// Shapes are recognised by their booking-number field. A payload that
    /// carries the field but fails to parse is kept as opaque.
    pub fn from_value(provider: Provider, value: serde_json::Value) -> Self {
        let has = |field: &str| value.get(field).is_some_and(|v| !v.is_null());
        let typed = match provider {
            Provider::Srt if has("reservation_number") => {
                serde_json::from_value(value.clone()).map(Self::SrtReservation).ok()
            }
            Provider::Ktx if has("pnr_no") => {
                serde_json::from_value(value.clone()).map(Self::KtxTicket).ok()
            }
            Provider::Ktx if has("rsv_id") => {
                serde_json::from_value(value.clone()).map(Self::KtxReservation).ok()
            }
            _ => None,
        };
        if let Some(mut record) = typed {
            if let Some(raw) = record.raw_mut() {
                *raw = value;
            }
            return record;
        }
        let is_ticket = bool_field(&value, "is_ticket");
        Self::Opaque(OpaqueRecord {
            provider,
            is_ticket,
            body: value,
        })
    }

    fn raw_mut(&mut self) -> Option<&mut serde_json::Value> {
        match self {
            Self::SrtReservation(r) => Some(&mut r.raw),
            Self::KtxReservation(r) => Some(&mut r.raw),
            Self::KtxTicket(t) => Some(&mut t.raw),
            Self::Opaque(_) => None,
        }
    }

    /// The payload handed back to the provider for cancel and pay.
    ///
    /// This is the provider's own object, unmodified. Records built locally
    /// without one fall back to their typed fields.
    pub fn payload(&self) -> serde_json::Value {
        let typed = match self {
            Self::SrtReservation(r) if r.raw.is_null() => serde_json::to_value(r),
            Self::KtxReservation(r) if r.raw.is_null() => serde_json::to_value(r),
            Self::KtxTicket(t) if t.raw.is_null() => serde_json::to_value(t),
            Self::SrtReservation(SrtReservation { raw, .. })
            | Self::KtxReservation(KtxReservation { raw, .. })
            | Self::KtxTicket(KtxTicket { raw, .. }) => return raw.clone(),
            Self::Opaque(o) => return o.body.clone(),
        };
        typed.unwrap_or_default()
    }

    pub fn provider(&self) -> Provider {
        match self {
            Self::SrtReservation(_) => Provider::Srt,
            Self::KtxReservation(_) | Self::KtxTicket(_) => Provider::Ktx,
            Self::Opaque(o) => o.provider,
        }
    }

    /// Issued tickets are cancelled by refund rather than by reservation cancel.
    pub fn is_ticket(&self) -> bool {
        match self {
            Self::SrtReservation(r) => r.paid,
            Self::KtxReservation(_) => false,
            Self::KtxTicket(_) => true,
            Self::Opaque(o) => o.is_ticket,
        }
    }

    pub fn is_paid(&self) -> bool {
        match self {
            Self::SrtReservation(r) => r.paid,
            Self::KtxReservation(_) => false,
            Self::KtxTicket(_) => true,
            Self::Opaque(o) => o.is_ticket || bool_field(&o.body, "paid"),
        }
    }

    pub fn is_waiting(&self) -> bool {
        match self {
            Self::SrtReservation(r) => r.is_waiting,
            Self::KtxReservation(r) => r.is_waiting,
            Self::KtxTicket(_) => false,
            Self::Opaque(o) => bool_field(&o.body, "is_waiting"),
        }
    }

    /// True when the provider actually holds seats for this booking.
    pub fn is_confirmed(&self) -> bool {
        match self {
            Self::SrtReservation(r) => !r.is_waiting && !r.tickets.is_empty(),
            other => !other.is_waiting(),
        }
    }

    pub fn train_no(&self) -> Option<&str> {
        let train_no = match self {
            Self::SrtReservation(r) => r.train_no.as_str(),
            Self::KtxReservation(r) => r.train_no.as_str(),
            Self::KtxTicket(t) => t.train_no.as_str(),
            Self::Opaque(o) => o.body.get("train_no").and_then(serde_json::Value::as_str)?,
        };
        (!train_no.is_empty()).then_some(train_no)
    }

    pub fn seats(&self) -> &[SeatTicket] {
        match self {
            Self::SrtReservation(r) => &r.tickets,
            Self::KtxReservation(r) => &r.seats,
            Self::KtxTicket(t) => &t.seats,
            Self::Opaque(_) => &[],
        }
    }

    /// One-line human summary, also the identity of last resort.
    pub fn describe(&self) -> String {
        let line = |name: &str, no: &str, date: &str, time: &str, from: &str, to: &str| {
            format!("[{name} {no}] {date} {time} {from} -> {to}")
        };
        match self {
            Self::SrtReservation(r) => {
                let mut s = line(
                    &r.train_name,
                    &r.train_no,
                    &r.dep_date,
                    &r.dep_time,
                    &r.dep_station,
                    &r.arr_station,
                );
                if let Some(cost) = r.total_cost {
                    s.push_str(&format!(" {cost}원"));
                }
                if r.is_waiting {
                    s.push_str(" 예약대기");
                } else if !r.paid {
                    s.push_str(" 결제대기");
                }
                s
            }
            Self::KtxReservation(r) => line(
                &r.train_name,
                &r.train_no,
                &r.dep_date,
                &r.dep_time,
                &r.dep_station,
                &r.arr_station,
            ),
            Self::KtxTicket(t) => line(
                &t.train_name,
                &t.train_no,
                &t.dep_date,
                &t.dep_time,
                &t.dep_station,
                &t.arr_station,
            ),
            Self::Opaque(o) => o
                .body
                .get("description")
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| o.body.to_string()),
        }
    }
}

fn bool_field(body: &serde_json::Value, field: &str) -> bool {
    body.get(field)
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false)
}
