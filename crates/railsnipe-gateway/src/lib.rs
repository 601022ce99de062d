// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP and WebSocket surface of the railsnipe task supervisor.
//!
//! Exposes task submission, status, cancellation and live progress, plus
//! booking management by reference. Every route except `/health` requires
//! a bearer token.

pub mod auth;
pub mod handlers;
pub mod server;
pub mod ws;

pub use auth::AuthConfig;
pub use server::{GatewayState, router, start_server};
