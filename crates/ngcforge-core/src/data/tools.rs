//! Tool table module
//!
//! This module provides:
//! - Parsing of the controller's tool table file (`T<n> P<pocket> ... ;description`)
//! - Tool number to description lookup used when displaying `tool` parameters
//! - The option list offered for tool selection

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Lookup used by parameter display formatting.
pub trait ToolLookup {
    /// Description for a tool number, `None` when the table has no such tool
    fn description(&self, tool_number: u32) -> Option<&str>;

    /// Display text for a tool parameter value
    fn display_text(&self, tool_number: &str) -> String {
        let number = tool_number.trim().parse::<u32>().unwrap_or(0);
        match self.description(number) {
            Some(desc) if number != 0 => format!("{} - {}", number, desc),
            _ => "0 - None".to_string(),
        }
    }
}

/// Single tool table entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEntry {
    /// Tool number (`T` word)
    pub number: u32,
    /// Lathe orientation (`Q` word), 0 when absent
    pub orientation: u32,
    /// Text after the `;`
    pub description: String,
}

/// Tool table loaded from a controller tool file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolTable {
    tools: BTreeMap<u32, ToolEntry>,
}

impl ToolTable {
    /// Create an empty tool table
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse tool table text.
    ///
    /// Only lines carrying a `;` description are tool lines; tool 0 is skipped.
    pub fn parse(text: &str) -> Self {
        let mut table = Self::new();
        for line in text.lines() {
            let line = line.trim();
            let Some((words, desc)) = line.split_once(';') else {
                continue;
            };
            let mut number = 0;
            let mut orientation = 0;
            for word in words.split_whitespace() {
                if word.len() < 2 {
                    continue;
                }
                let (letter, rest) = word.split_at(1);
                match letter {
                    "T" | "t" => number = rest.parse().unwrap_or(0),
                    "Q" | "q" => orientation = rest.parse().unwrap_or(0),
                    _ => {}
                }
            }
            if number == 0 {
                continue;
            }
            let description = if desc.trim().is_empty() {
                "no description".to_string()
            } else {
                desc.trim().to_string()
            };
            table.insert(ToolEntry {
                number,
                orientation,
                description,
            });
        }
        table
    }

    /// Load a tool table file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let table = Self::parse(&text);
        tracing::debug!("Loaded {} tools from {}", table.len(), path.display());
        Ok(table)
    }

    /// Add or replace an entry
    pub fn insert(&mut self, entry: ToolEntry) {
        self.tools.insert(entry.number, entry);
    }

    /// Get a tool by number
    pub fn get(&self, number: u32) -> Option<&ToolEntry> {
        self.tools.get(&number)
    }

    /// Orientation of a tool, 0 for unknown tools
    pub fn orientation(&self, number: u32) -> u32 {
        self.get(number).map(|t| t.orientation).unwrap_or(0)
    }

    /// Selection list in `label=value:label=value` form, tool 0 first
    pub fn options(&self) -> String {
        let mut parts = vec!["0 - None=0".to_string()];
        for tool in self.tools.values() {
            parts.push(format!(
                "{} - {}={}",
                tool.number, tool.description, tool.number
            ));
        }
        parts.join(":")
    }

    /// Get the number of tools in the table
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl ToolLookup for ToolTable {
    fn description(&self, tool_number: u32) -> Option<&str> {
        self.get(tool_number).map(|t| t.description.as_str())
    }
}
