// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for railsnipe integration tests.
//!
//! Provides scripted and in-memory collaborators plus a harness that wires
//! them into a complete engine, for fast, deterministic tests without a
//! provider, a database or a messaging service.
//!
//! # Components
//!
//! - [`ScriptedUpstream`] / [`ScriptedAuthenticator`] - provider responses queued up front
//! - [`MemorySessionStore`] / [`MemoryJournal`] - in-memory persistence
//! - [`RecordingNotifier`] - captures terminal notifications
//! - [`EngineHarness`] - supervisor and booking desk over all of the above

pub mod collaborators;
pub mod fixtures;
pub mod harness;
pub mod stores;
pub mod upstream;

pub use collaborators::{RecordingNotifier, SentNotification, StaticCredentials, test_card};
pub use harness::{EngineHarness, EngineHarnessBuilder, fast_retry};
pub use stores::{MemoryJournal, MemorySessionStore};
pub use upstream::{ScriptedAuthenticator, ScriptedUpstream, UpstreamCall, sold_out_error};
