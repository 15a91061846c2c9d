//! # ngcforge features
//!
//! Turns a tree of parameterised feature instances into an RS274/NGC program.
//!
//! - **template**: feature definition files and the template cache
//! - **param**: typed parameters, unit conversion and value formatting
//! - **feature**: instances, hooks and validation
//! - **tree**: the ordered, nested feature document
//! - **macros** / **codegen**: text block expansion and program assembly
//! - **serialization**: the XML project format
//! - **history**: snapshot based undo/redo
//! - **migration**: upgrading instances saved against older templates
//! - **project**: the editing facade a front end drives
//! - **refresh**: debounced regeneration and controller hand-off

pub mod codegen;
pub mod diagnostics;
pub mod expr;
pub mod feature;
pub mod history;
pub mod hooks;
pub mod macros;
pub mod migration;
pub mod param;
pub mod project;
pub mod refresh;
pub mod serialization;
pub mod template;
pub mod tree;

pub use codegen::{to_gcode, GeneratedProgram, GenerationOptions, LATHE_INIT, MILL_INIT};
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use feature::FeatureInstance;
pub use history::UndoLog;
pub use migration::MigrationReport;
pub use param::{ParamType, Parameter, ValueContext};
pub use project::Project;
pub use refresh::{AutoRefresh, RefreshScheduler, RefreshTicket};
pub use serialization::UiState;
pub use template::{FeatureTemplate, TemplateRegistry};
pub use tree::{Direction, Document, InsertAt, NodeId};
