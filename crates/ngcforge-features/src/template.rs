//! Feature template loader
//!
//! A definition file is INI-like:
//!
//! ```text
//! [SUBROUTINE]
//! type = pocket
//! name = Pocket
//! version = 1.2
//! order = depth feed
//!
//! [PARAM_DEPTH]
//! type = float
//! value = -0.125
//!
//! [CALL]
//! content =
//! 	o<pocket> call [#param_depth]
//! ```
//!
//! A continuation line starts with one space or tab. That first character is
//! dropped and the rest of the line is kept byte-for-byte, so G-code
//! indentation survives loading.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use ngcforge_core::{Error, FileResolver, ParseError, ResolutionError, Result};
use tracing::debug;

use crate::param::Parameter;

/// Text blocks of a feature
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextBlocks {
    pub definitions: String,
    pub before: String,
    pub call: String,
    pub after: String,
    pub validation: String,
    pub init: String,
}

impl TextBlocks {
    /// Section names, in the order blocks are stored
    pub const SECTIONS: [&'static str; 6] =
        ["DEFINITIONS", "BEFORE", "CALL", "AFTER", "VALIDATION", "INIT"];

    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "definitions" => Some(&self.definitions),
            "before" => Some(&self.before),
            "call" => Some(&self.call),
            "after" => Some(&self.after),
            "validation" => Some(&self.validation),
            "init" => Some(&self.init),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut String> {
        match key {
            "definitions" => Some(&mut self.definitions),
            "before" => Some(&mut self.before),
            "call" => Some(&mut self.call),
            "after" => Some(&mut self.after),
            "validation" => Some(&mut self.validation),
            "init" => Some(&mut self.init),
            _ => None,
        }
    }

    /// `(key, text)` pairs in storage order
    pub fn entries(&self) -> [(&'static str, &str); 6] {
        [
            ("definitions", &self.definitions),
            ("before", &self.before),
            ("call", &self.call),
            ("after", &self.after),
            ("validation", &self.validation),
            ("init", &self.init),
        ]
    }
}

/// Immutable description of a feature type, loaded from one definition file.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTemplate {
    pub type_id: String,
    pub name: String,
    pub version: String,
    /// Source name the template was resolved from
    pub src: Option<String>,
    pub indent: usize,
    /// Parameter ids in display order
    pub order: Vec<String>,
    pub params: BTreeMap<String, Parameter>,
    pub blocks: TextBlocks,
    /// Other `[SUBROUTINE]` keys (`icon`, `image`, `help`, ...)
    pub attrs: BTreeMap<String, String>,
}

#[derive(Debug)]
struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

impl Section {
    fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn definition_error(source_name: &str, line: usize, reason: &str) -> ParseError {
    ParseError::Definition {
        source_name: source_name.to_string(),
        line,
        reason: reason.to_string(),
    }
}

/// Split INI text into sections, keeping continuation-line indentation.
fn parse_sections(source_name: &str, text: &str) -> std::result::Result<Vec<Section>, ParseError> {
    let text = text.replace("_(\"", "").replace("\")", "");
    let mut sections: Vec<Section> = Vec::new();
    // key being filled and its collected lines
    let mut current: Option<(String, Vec<String>)> = None;

    fn flush(sections: &mut [Section], current: &mut Option<(String, Vec<String>)>) {
        if let (Some((key, mut lines)), Some(section)) = (current.take(), sections.last_mut()) {
            while lines.len() > 1 && lines.last().is_some_and(|l| l.is_empty()) {
                lines.pop();
            }
            section.entries.push((key, lines.join("\n")));
        }
    }

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let raw = raw.strip_suffix('\r').unwrap_or(raw);

        if raw.trim().is_empty() {
            if let Some((_, lines)) = current.as_mut() {
                lines.push(String::new());
            }
            continue;
        }
        if raw.starts_with(' ') || raw.starts_with('\t') {
            match current.as_mut() {
                Some((_, lines)) => lines.push(raw[1..].to_string()),
                None => {
                    return Err(definition_error(
                        source_name,
                        line_no,
                        "continuation line without a key",
                    ))
                }
            }
            continue;
        }
        if raw.starts_with('#') || raw.starts_with(';') {
            continue;
        }

        flush(&mut sections, &mut current);
        if let Some(rest) = raw.strip_prefix('[') {
            let name = rest
                .split_once(']')
                .map(|(name, _)| name.trim())
                .ok_or_else(|| definition_error(source_name, line_no, "unterminated section header"))?;
            if !sections.iter().any(|s| s.name == name) {
                sections.push(Section {
                    name: name.to_string(),
                    entries: Vec::new(),
                });
            } else if let Some(pos) = sections.iter().position(|s| s.name == name) {
                // repeated headers merge into the first occurrence
                let existing = sections.remove(pos);
                sections.push(existing);
            }
            continue;
        }

        if sections.is_empty() {
            return Err(definition_error(source_name, line_no, "key outside of any section"));
        }
        let sep = raw
            .find(['=', ':'])
            .ok_or_else(|| definition_error(source_name, line_no, "expected 'key = value'"))?;
        let key = raw[..sep].trim().to_lowercase();
        let value = raw[sep + 1..].trim().to_string();
        current = Some((key, vec![value]));
    }
    flush(&mut sections, &mut current);
    Ok(sections)
}

fn normalize_order_id(word: &str) -> String {
    let upper = word.to_uppercase();
    if upper.starts_with("PARAM_") {
        upper
    } else {
        format!("PARAM_{}", upper)
    }
}

impl FeatureTemplate {
    /// Id carried by the template itself; instances count up from it
    pub fn template_id(&self) -> String {
        format!("{}_000", self.type_id)
    }

    pub fn version_number(&self) -> f64 {
        ngcforge_core::units::float_or_zero(&self.version)
    }

    /// Parameters in display order
    pub fn ordered_params(&self) -> impl Iterator<Item = &Parameter> {
        self.order.iter().filter_map(|id| self.params.get(id))
    }

    /// Parse definition text.
    pub fn parse(source_name: &str, text: &str) -> std::result::Result<Self, ParseError> {
        let sections = parse_sections(source_name, text)?;
        let sub = sections
            .iter()
            .find(|s| s.name == "SUBROUTINE")
            .ok_or_else(|| ParseError::MissingSection {
                source_name: source_name.to_string(),
                section: "SUBROUTINE".to_string(),
            })?;
        let type_id = sub
            .get("type")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ParseError::MissingField {
                source_name: source_name.to_string(),
                section: "SUBROUTINE".to_string(),
                field: "type".to_string(),
            })?
            .to_string();

        let mut attrs = BTreeMap::new();
        for (key, value) in &sub.entries {
            if !matches!(key.as_str(), "type" | "name" | "version" | "order" | "indent") {
                attrs.insert(key.clone(), value.clone());
            }
        }

        let declared: Vec<&Section> = sections
            .iter()
            .filter(|s| s.name.starts_with("PARAM_"))
            .collect();
        let mut order_names: Vec<String> = sub
            .get("order")
            .unwrap_or("")
            .split_whitespace()
            .map(normalize_order_id)
            .filter(|name| declared.iter().any(|s| &s.name == name))
            .collect();
        order_names.dedup();
        for section in &declared {
            if !order_names.contains(&section.name) {
                order_names.push(section.name.clone());
            }
        }

        let mut params = BTreeMap::new();
        let mut order = Vec::with_capacity(order_names.len());
        for name in &order_names {
            let Some(section) = declared.iter().find(|s| &s.name == name) else {
                continue;
            };
            let id = section.name.to_lowercase();
            let param = Parameter::from_attrs(
                &id,
                section.entries.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            );
            if params
                .values()
                .any(|p: &Parameter| p.call == param.call)
            {
                return Err(definition_error(
                    source_name,
                    0,
                    &format!("duplicate call token {}", param.call),
                ));
            }
            order.push(id.clone());
            params.insert(id, param);
        }

        let mut blocks = TextBlocks::default();
        for section in TextBlocks::SECTIONS {
            let content = sections
                .iter()
                .find(|s| s.name == section)
                .and_then(|s| s.get("content"))
                .unwrap_or("");
            if let Some(slot) = blocks.get_mut(&section.to_lowercase()) {
                *slot = content.to_string();
            }
        }

        let template = Self {
            name: sub.get("name").unwrap_or(&type_id).to_string(),
            version: sub.get("version").unwrap_or("0").trim().to_string(),
            indent: ngcforge_core::units::int_or_zero(sub.get("indent").unwrap_or("0")).max(0)
                as usize,
            type_id,
            src: None,
            order,
            params,
            blocks,
            attrs,
        };
        debug!(
            "Parsed template {} v{} with {} parameters",
            template.type_id,
            template.version,
            template.params.len()
        );
        Ok(template)
    }

    /// Read and parse a definition file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mut template = Self::parse(&name, &text)?;
        template.src = Some(name);
        Ok(template)
    }
}

/// Cache of parsed templates keyed by source name.
pub struct TemplateRegistry {
    resolver: Rc<dyn FileResolver>,
    templates: BTreeMap<String, Rc<FeatureTemplate>>,
}

impl TemplateRegistry {
    pub fn new(resolver: Rc<dyn FileResolver>) -> Self {
        Self {
            resolver,
            templates: BTreeMap::new(),
        }
    }

    /// Register an already parsed template under `src`
    pub fn insert(&mut self, src: &str, mut template: FeatureTemplate) -> Rc<FeatureTemplate> {
        template.src = Some(src.to_string());
        let template = Rc::new(template);
        self.templates.insert(src.to_string(), Rc::clone(&template));
        template
    }

    /// Cached template, loading it through the resolver on first use
    pub fn get(&mut self, src: &str) -> Result<Rc<FeatureTemplate>> {
        if let Some(t) = self.templates.get(src) {
            return Ok(Rc::clone(t));
        }
        self.reload(src)
    }

    /// Parse `src` again, replacing any cached copy
    pub fn reload(&mut self, src: &str) -> Result<Rc<FeatureTemplate>> {
        let path = self
            .resolver
            .search_path(src, &["cfg"])
            .ok_or_else(|| {
                Error::from(ResolutionError::TemplateNotFound {
                    name: src.to_string(),
                })
            })?;
        let template = FeatureTemplate::load(&path)?;
        Ok(self.insert(src, template))
    }

    pub fn unload(&mut self, src: &str) -> bool {
        self.templates.remove(src).is_some()
    }

    pub fn contains(&self, src: &str) -> bool {
        self.templates.contains_key(src)
    }

    pub fn resolver(&self) -> Rc<dyn FileResolver> {
        Rc::clone(&self.resolver)
    }
}
