//! ngcforge Settings Crate
//!
//! Handles application configuration and its projection onto the generator.

pub mod config;
pub mod error;

pub use config::{Catalog, Config, GeneralSettings, NgcSettings, PathSettings, PreambleVar};
pub use error::{SettingsError, SettingsResult};
