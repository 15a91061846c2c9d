//! # ngcforge core
//!
//! Error kinds, the unit system, the tool table and the services the feature
//! compiler consumes from its host (file resolution, controller link).

pub mod controller;
pub mod data;
pub mod error;
pub mod resolver;
pub mod units;

pub use controller::{ControllerLink, Detached};
pub use data::{ToolEntry, ToolLookup, ToolTable};
pub use error::{Error, MacroError, ParseError, ResolutionError, Result};
pub use resolver::{FileResolver, SearchPath};
pub use units::MeasurementSystem;
