// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for railsnipe.
//!
//! One database file holds the key ring, the credential vault, encrypted
//! session handles, authentication claims, and task snapshots. Every worker
//! process points at the same file.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::SqliteStore;
pub use database::Database;
