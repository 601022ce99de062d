// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The reservation engine.
//!
//! A [`TaskSupervisor`] runs one [`ReservationTask`] per accepted request.
//! Each task repeats search, select and reserve until it books a seat, hits
//! a fatal error or is cancelled, pacing itself with the [`RetryPolicy`].
//! Progress is fanned out to any number of live subscribers, and the
//! [`BookingDesk`] cancels or pays existing bookings by reference.

pub mod bookings;
pub mod broadcast;
pub mod janitor;
pub mod notify;
pub mod resolver;
pub mod scheduler;
pub mod shutdown;
pub mod supervisor;
pub mod task;

pub use bookings::{BookingDesk, BookingSummary};
pub use broadcast::{LiveUpdate, ProgressFeed, ProgressPublisher, Subscription};
pub use notify::LogNotifier;
pub use resolver::{NotFound, derive_ref, resolve};
pub use scheduler::{Decision, RetryPolicy, RetryState};
pub use shutdown::install_signal_handler;
pub use supervisor::TaskSupervisor;
pub use task::{ReservationTask, TaskDeps};
