// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ready-made requests, trains and records.

use chrono::{NaiveDate, NaiveTime};
use railsnipe_core::{
    KtxTicket, Passengers, Provider, RawRecord, ReservationRequest, SearchCriteria, SeatClass,
    SeatPolicy, SeatTicket, SrtReservation, TrainOption, UserRef,
};

pub fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).expect("valid time")
}

/// A one-adult SRT request from 수서 to 부산 for the given candidates.
pub fn request(user: &str, candidates: &[&str]) -> ReservationRequest {
    ReservationRequest {
        user: UserRef(user.to_string()),
        provider: Provider::Srt,
        criteria: SearchCriteria {
            origin: "수서".to_string(),
            destination: "부산".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 11, 2).expect("valid date"),
            depart_after: time(6, 0),
            depart_before: None,
        },
        passengers: Passengers::adults(1),
        candidates: candidates.iter().map(|c| c.to_string()).collect(),
        seat_policy: SeatPolicy::GeneralFirst,
        auto_payment: false,
    }
}

/// A listed train. `general` / `special` say which classes are open.
pub fn train(train_no: &str, dep: NaiveTime, general: bool, special: bool) -> TrainOption {
    TrainOption {
        train_no: train_no.to_string(),
        train_name: "SRT".to_string(),
        dep_station: "수서".to_string(),
        arr_station: "부산".to_string(),
        dep_time: dep,
        arr_time: dep + chrono::Duration::minutes(150),
        general_available: general,
        special_available: special,
        standby_available: false,
    }
}

pub fn sold_out(train_no: &str, dep: NaiveTime) -> TrainOption {
    train(train_no, dep, false, false)
}

/// A confirmed, unpaid SRT reservation with one seat.
pub fn srt_reservation(number: &str, train_no: &str) -> RawRecord {
    RawRecord::SrtReservation(SrtReservation {
        reservation_number: number.to_string(),
        train_no: train_no.to_string(),
        train_name: "SRT".to_string(),
        dep_date: "20261102".to_string(),
        dep_time: "083000".to_string(),
        dep_station: "수서".to_string(),
        arr_station: "부산".to_string(),
        total_cost: Some(52_900),
        paid: false,
        is_waiting: false,
        payment_deadline: Some("20261101 2359".to_string()),
        tickets: vec![SeatTicket {
            car: "3".to_string(),
            seat: "7A".to_string(),
            seat_class: Some(SeatClass::General),
            passenger: Some("어른/청소년".to_string()),
            price: Some(52_900),
        }],
        raw: serde_json::Value::Null,
    })
}

/// A waitlisted SRT reservation.
pub fn srt_waiting(number: &str, train_no: &str) -> RawRecord {
    match srt_reservation(number, train_no) {
        RawRecord::SrtReservation(mut r) => {
            r.is_waiting = true;
            r.tickets.clear();
            RawRecord::SrtReservation(r)
        }
        other => other,
    }
}

pub fn ktx_ticket(pnr: &str, train_no: &str) -> RawRecord {
    RawRecord::KtxTicket(KtxTicket {
        pnr_no: pnr.to_string(),
        train_no: train_no.to_string(),
        train_name: "KTX".to_string(),
        dep_date: "20261102".to_string(),
        dep_time: "070000".to_string(),
        dep_station: "서울".to_string(),
        arr_station: "부산".to_string(),
        price: Some(59_800),
        seats: vec![SeatTicket {
            car: "12".to_string(),
            seat: "3D".to_string(),
            seat_class: Some(SeatClass::General),
            passenger: None,
            price: Some(59_800),
        }],
        raw: serde_json::Value::Null,
    })
}
