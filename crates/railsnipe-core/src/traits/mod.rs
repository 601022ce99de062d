// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits the engine is written against.
//!
//! Concrete adapters (SQLite, HTTP, Telegram) additionally implement the
//! [`PluginAdapter`] base trait for identity and health reporting.

pub mod adapter;
pub mod credentials;
pub mod journal;
pub mod notify;
pub mod session;
pub mod upstream;

pub use adapter::PluginAdapter;
pub use credentials::{CredentialSource, PaymentMethods};
pub use journal::TaskJournal;
pub use notify::Notifier;
pub use session::SessionStore;
pub use upstream::{Authenticator, UpstreamClient};
