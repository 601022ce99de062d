// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. Time-dependent queries take `now` as epoch milliseconds.

pub mod claims;
pub mod sessions;
pub mod tasks;
