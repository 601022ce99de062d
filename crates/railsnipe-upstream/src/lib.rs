// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP provider client for railsnipe.
//!
//! Speaks JSON to a provider bridge: one endpoint per operation under
//! `/v1/{provider}/`, with the session token and cookies of the caller's
//! [`SessionHandle`](railsnipe_core::SessionHandle) attached to every call.
//! Failures come back already classified for the retry scheduler.

pub mod client;
pub mod wire;

pub use client::HttpUpstream;
