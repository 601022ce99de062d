// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared, encrypted provider sessions for every railsnipe worker.

pub mod error;
pub mod manager;

pub use error::AuthError;
pub use manager::{default_worker_id, SessionManager};
