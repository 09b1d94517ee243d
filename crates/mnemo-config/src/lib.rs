// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loading, model, and validation for the mnemo service.
//!
//! Configuration merges compiled defaults, `mnemo.toml` (XDG hierarchy),
//! and the documented environment keys, then passes semantic validation
//! before the service starts.

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::ConfigError;
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::MnemoConfig;
pub use validation::validate_config;
