// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity collaborators for the mnemo service: flat-JSON user and
//! session persistence plus the startup-loaded role registry.
//!
//! The memory core treats these as external collaborators; it only ever
//! receives ids and uses them as scope keys.

pub mod roles;
pub mod sessions;
pub mod users;

pub use roles::{RoleProfile, RoleRegistry};
pub use sessions::{Session, SessionStore};
pub use users::{User, UserStore};
