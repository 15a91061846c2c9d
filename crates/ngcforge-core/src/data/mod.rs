//! Data tables consumed by the feature compiler

pub mod tools;

pub use tools::{ToolEntry, ToolLookup, ToolTable};
