//! Parameter model
//!
//! A parameter is a typed value holder attached to a feature. Float values are
//! stored in base (imperial) units as canonical `.`-separated decimal strings; a
//! float carrying `metric_value` is convertible and shows millimetres when the
//! display unit system is metric.

use std::collections::BTreeMap;

use ngcforge_core::units::{self, MeasurementSystem, MM_PER_INCH};
use ngcforge_core::ToolLookup;

use crate::tree::NodeId;

/// Lower clamp bound when a template declares none
pub const DEFAULT_MIN: &str = "-999999.9";
/// Upper clamp bound when a template declares none
pub const DEFAULT_MAX: &str = "999999.9";
/// Display digits when neither the parameter nor the configuration sets any
pub const DEFAULT_DIGITS: usize = 3;

const NGC_DIGITS: usize = 6;
const STORE_DIGITS: usize = 10;

/// Unit system and number formatting in effect for an operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueContext {
    /// Units the user edits and reads values in
    pub display_units: MeasurementSystem,
    /// Units of the machine the program is generated for
    pub machine_units: MeasurementSystem,
    pub decimal_separator: char,
    pub default_digits: usize,
}

impl Default for ValueContext {
    fn default() -> Self {
        Self {
            display_units: MeasurementSystem::Metric,
            machine_units: MeasurementSystem::Metric,
            decimal_separator: '.',
            default_digits: DEFAULT_DIGITS,
        }
    }
}

impl ValueContext {
    /// Same units for display and machine
    pub fn with_units(units: MeasurementSystem) -> Self {
        Self {
            display_units: units,
            machine_units: units,
            ..Self::default()
        }
    }
}

/// Parameter data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParamType {
    Bool,
    Int,
    Float,
    #[default]
    String,
    List,
    Combo,
    ComboUser,
    Tool,
    Filename,
    PrjName,
    Gcode,
    GcLines,
    Text,
    Engrave,
    Items,
    Header,
    SubHeader,
}

impl ParamType {
    /// Unknown names map to `String`
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "bool" | "boolean" => Self::Bool,
            "int" => Self::Int,
            "float" => Self::Float,
            "list" => Self::List,
            "combo" => Self::Combo,
            "combo-user" => Self::ComboUser,
            "tool" => Self::Tool,
            "filename" => Self::Filename,
            "prjname" => Self::PrjName,
            "gcode" => Self::Gcode,
            "gc-lines" => Self::GcLines,
            "text" => Self::Text,
            "engrave" => Self::Engrave,
            "items" => Self::Items,
            "header" => Self::Header,
            "sub-header" => Self::SubHeader,
            _ => Self::String,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::List => "list",
            Self::Combo => "combo",
            Self::ComboUser => "combo-user",
            Self::Tool => "tool",
            Self::Filename => "filename",
            Self::PrjName => "prjname",
            Self::Gcode => "gcode",
            Self::GcLines => "gc-lines",
            Self::Text => "text",
            Self::Engrave => "engrave",
            Self::Items => "items",
            Self::Header => "header",
            Self::SubHeader => "sub-header",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }

    pub fn is_header(self) -> bool {
        matches!(self, Self::Header | Self::SubHeader)
    }
}

/// A named, typed value on a feature.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Parameter {
    /// Lowercase section name, e.g. `param_depth`
    pub id: String,
    pub kind: ParamType,
    pub name: String,
    pub value: String,
    pub metric_value: Option<String>,
    pub minimum_value: Option<String>,
    pub maximum_value: Option<String>,
    pub digits: Option<usize>,
    pub options: String,
    /// Token replaced in text blocks, `#<id>` unless overridden
    pub call: String,
    pub tool_tip: String,
    pub header: String,
    pub hidden: bool,
    pub grayed: bool,
    pub on_change: String,
    pub value_changed: String,
    pub not_allowed: Option<String>,
    pub old_type: Option<ParamType>,
    /// Template-author extension keys (`prefix`, `suffix`, `icon`, ...)
    pub extra: BTreeMap<String, String>,
    /// Nested features, only ever non-empty for `items` parameters
    pub children: Vec<NodeId>,
}

fn truthy(text: &str) -> bool {
    matches!(
        text.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "2"
    )
}

fn canonical_decimal(v: f64) -> String {
    let s = units::format_fixed(v, STORE_DIGITS);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

fn round_to(v: f64, digits: usize) -> f64 {
    units::float_or_zero(&units::format_fixed(v, digits))
}

impl Parameter {
    pub fn new(id: impl Into<String>, kind: ParamType) -> Self {
        let id = id.into();
        Self {
            call: format!("#{}", id),
            id,
            kind,
            ..Self::default()
        }
    }

    /// Build from `key = value` pairs of a definition section or project element
    pub fn from_attrs<'a>(id: &str, attrs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut param = Self::new(id, ParamType::String);
        for (key, value) in attrs {
            param.set_attr(key, value);
        }
        if param.kind == ParamType::Float {
            param.value = canonical_decimal(units::float_or_zero(&param.value));
            param.sync_metric_value();
        } else if param.kind == ParamType::Int {
            param.value = units::int_or_zero(&param.value).to_string();
        }
        param
    }

    /// Set one attribute by its file key
    pub fn set_attr(&mut self, key: &str, value: &str) {
        match key {
            "id" => self.id = value.to_string(),
            "type" => self.kind = ParamType::from_name(value),
            "name" => self.name = value.to_string(),
            "value" => self.value = value.to_string(),
            "metric_value" => self.metric_value = Some(value.to_string()),
            "minimum_value" => self.minimum_value = Some(value.to_string()),
            "maximum_value" => self.maximum_value = Some(value.to_string()),
            "digits" => self.digits = value.trim().parse().ok(),
            "options" => self.options = value.to_string(),
            "call" => self.call = value.trim().to_string(),
            "tool_tip" => self.tool_tip = value.to_string(),
            "header" => self.header = value.to_string(),
            "hidden" => self.hidden = truthy(value),
            "grayed" => self.grayed = truthy(value),
            "on_change" => self.on_change = value.to_string(),
            "value_changed" => self.value_changed = value.to_string(),
            "not_allowed" => self.not_allowed = Some(value.to_string()),
            "old_type" => self.old_type = Some(ParamType::from_name(value)),
            _ => {
                self.extra.insert(key.to_string(), value.to_string());
            }
        }
    }

    /// Attributes in file order; absent optional fields are skipped.
    pub fn attrs(&self) -> Vec<(String, String)> {
        let mut out = vec![
            ("type".to_string(), self.kind.as_str().to_string()),
            ("id".to_string(), self.id.clone()),
        ];
        let optional = [
            ("name", Some(&self.name).filter(|s| !s.is_empty()).cloned()),
            ("call", Some(self.call.clone())),
            ("value", Some(self.value.clone())),
            ("metric_value", self.metric_value.clone()),
            ("minimum_value", self.minimum_value.clone()),
            ("maximum_value", self.maximum_value.clone()),
            ("digits", self.digits.map(|d| d.to_string())),
            ("options", Some(&self.options).filter(|s| !s.is_empty()).cloned()),
            ("tool_tip", Some(&self.tool_tip).filter(|s| !s.is_empty()).cloned()),
            ("header", Some(&self.header).filter(|s| !s.is_empty()).cloned()),
            ("on_change", Some(&self.on_change).filter(|s| !s.is_empty()).cloned()),
            ("value_changed", Some(&self.value_changed).filter(|s| !s.is_empty()).cloned()),
            ("hidden", self.hidden.then(|| "2".to_string())),
            ("grayed", self.grayed.then(|| "1".to_string())),
            ("not_allowed", self.not_allowed.clone()),
            ("old_type", self.old_type.map(|t| t.as_str().to_string())),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                out.push((key.to_string(), value));
            }
        }
        out.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        out
    }

    /// Id without the `param_` prefix
    pub fn short_name(&self) -> &str {
        self.id.strip_prefix("param_").unwrap_or(&self.id)
    }

    pub fn tooltip(&self) -> &str {
        if self.tool_tip.is_empty() {
            &self.name
        } else {
            &self.tool_tip
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.extra.get("prefix").map(String::as_str).filter(|s| !s.is_empty())
    }

    pub fn suffix(&self) -> Option<&str> {
        self.extra.get("suffix").map(String::as_str).filter(|s| !s.is_empty())
    }

    pub fn is_items(&self) -> bool {
        self.kind == ParamType::Items
    }

    /// Float with a paired millimetre value
    pub fn is_convertible(&self) -> bool {
        self.kind == ParamType::Float && self.metric_value.is_some()
    }

    pub fn digits(&self, ctx: &ValueContext) -> usize {
        if self.kind == ParamType::Int {
            0
        } else {
            self.digits.unwrap_or(ctx.default_digits)
        }
    }

    fn factor(&self, units: MeasurementSystem) -> f64 {
        if self.is_convertible() && units.is_metric() {
            MM_PER_INCH
        } else {
            1.0
        }
    }

    fn display_number(&self, ctx: &ValueContext) -> f64 {
        units::float_or_zero(&self.value) * self.factor(ctx.display_units)
    }

    /// Lower bound in display units
    pub fn min_value(&self, ctx: &ValueContext) -> f64 {
        let raw = self.minimum_value.as_deref().unwrap_or(DEFAULT_MIN);
        units::float_or_zero(raw) * self.factor(ctx.display_units)
    }

    /// Upper bound in display units
    pub fn max_value(&self, ctx: &ValueContext) -> f64 {
        let raw = self.maximum_value.as_deref().unwrap_or(DEFAULT_MAX);
        units::float_or_zero(raw) * self.factor(ctx.display_units)
    }

    pub(crate) fn sync_metric_value(&mut self) {
        if self.metric_value.is_some() {
            let base = units::float_or_zero(&self.value);
            self.metric_value = Some(canonical_decimal(units::inch_to_mm(base)));
        }
    }

    /// `label=value:label=value` pairs of `options`
    pub fn option_pairs(&self) -> Vec<(&str, &str)> {
        self.options
            .split(':')
            .filter(|s| !s.is_empty())
            .map(|opt| opt.split_once('=').unwrap_or((opt, opt)))
            .collect()
    }

    /// Stored value in the unit-appropriate form, without display formatting
    pub fn get_value(&self, ctx: &ValueContext) -> String {
        match self.kind {
            ParamType::Float => units::format_fixed(self.display_number(ctx), NGC_DIGITS),
            _ => self.value.clone(),
        }
    }

    /// Value formatted for the user, decorated with prefix and suffix
    pub fn get_display_string(&self, ctx: &ValueContext, tools: &dyn ToolLookup) -> String {
        let body = match self.kind {
            ParamType::Float => units::localize(
                &units::format_fixed(self.display_number(ctx), self.digits(ctx)),
                ctx.decimal_separator,
            ),
            ParamType::Int => units::int_or_zero(&self.value).to_string(),
            ParamType::Bool => {
                if truthy(&self.value) {
                    "Yes".to_string()
                } else {
                    "No".to_string()
                }
            }
            ParamType::Combo | ParamType::ComboUser | ParamType::List => self
                .option_pairs()
                .into_iter()
                .find(|(_, v)| *v == self.value)
                .map(|(label, _)| label.to_string())
                .unwrap_or_else(|| self.value.clone()),
            ParamType::Tool => tools.display_text(&self.value),
            _ => self.value.clone(),
        };
        [self.prefix(), Some(body.as_str()), self.suffix()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn strip_decoration<'a>(&self, text: &'a str) -> &'a str {
        let mut s = text.trim();
        if let Some(prefix) = self.prefix() {
            s = s.strip_prefix(prefix).unwrap_or(s).trim_start();
        }
        if let Some(suffix) = self.suffix() {
            s = s.strip_suffix(suffix).unwrap_or(s).trim_end();
        }
        s
    }

    /// Value substituted into G-code for the call token
    pub fn ngc_value(&self, ctx: &ValueContext) -> String {
        match self.kind {
            ParamType::Gcode if self.value.is_empty() => "0".to_string(),
            ParamType::Float => units::format_fixed(
                units::float_or_zero(&self.value) * self.factor(ctx.machine_units),
                NGC_DIGITS,
            ),
            _ => self.value.clone(),
        }
    }

    /// Substitution text, multi-line types wrapped line by line
    pub fn rendered(&self, ctx: &ValueContext) -> String {
        match self.kind {
            ParamType::Text => self
                .value
                .split('\n')
                .map(|line| format!("( {} )\n", line))
                .collect(),
            ParamType::GcLines => {
                let mut out = String::from("\n");
                for line in self.value.split('\n') {
                    out.push('\t');
                    out.push_str(line);
                    out.push('\n');
                }
                out
            }
            _ => self.ngc_value(ctx),
        }
    }

    /// Store a new value without running hooks.
    ///
    /// Returns false, leaving the value untouched, when the canonical form of
    /// `new` equals the current one or is the declared `not_allowed` value.
    pub fn set_value(&mut self, new: &str, ctx: &ValueContext) -> bool {
        match self.kind {
            ParamType::Float => {
                let digits = self.digits(ctx);
                let factor = self.factor(ctx.display_units);
                let parsed = units::float_or_zero(self.strip_decoration(new));
                let v = round_to(parsed, digits).clamp(self.min_value(ctx), self.max_value(ctx));
                let text = units::format_fixed(v, digits);
                if text == units::format_fixed(self.display_number(ctx), digits) {
                    return false;
                }
                if let Some(na) = &self.not_allowed {
                    if text == units::format_fixed(units::float_or_zero(na) * factor, digits) {
                        return false;
                    }
                }
                self.value = canonical_decimal(v / factor);
                if self.metric_value.is_some() {
                    let mm = if factor == MM_PER_INCH {
                        v
                    } else {
                        units::inch_to_mm(v)
                    };
                    self.metric_value = Some(canonical_decimal(mm));
                }
                true
            }
            ParamType::Int => {
                let min = self.min_value(ctx).trunc() as i64;
                let max = self.max_value(ctx).trunc() as i64;
                let v = units::int_or_zero(self.strip_decoration(new)).clamp(min, max);
                if v == units::int_or_zero(&self.value) {
                    return false;
                }
                if self.not_allowed.as_deref().map(units::int_or_zero) == Some(v) {
                    return false;
                }
                self.value = v.to_string();
                true
            }
            ParamType::Bool => {
                let v = if truthy(self.strip_decoration(new)) { "1" } else { "0" };
                let old = if truthy(&self.value) { "1" } else { "0" };
                if v == old && !self.value.is_empty() {
                    return false;
                }
                self.value = v.to_string();
                true
            }
            _ => {
                if new == self.value || self.not_allowed.as_deref() == Some(new) {
                    return false;
                }
                self.value = new.to_string();
                true
            }
        }
    }

    /// Hide or show; returns true when a hidden parameter became visible
    pub fn set_hidden(&mut self, hide: bool) -> bool {
        let was_hidden = self.hidden;
        self.hidden = hide;
        was_hidden && !hide
    }

    pub fn set_grayed(&mut self, grayed: bool) {
        self.grayed = grayed;
    }

    /// Toggle between header and sub-header
    pub fn change_group(&mut self) -> bool {
        match self.kind {
            ParamType::SubHeader if self.header.is_empty() => {
                self.kind = ParamType::Header;
                true
            }
            ParamType::Header => {
                self.kind = ParamType::SubHeader;
                true
            }
            _ => false,
        }
    }

    /// Turn a numeric parameter into a raw G-code expression
    pub fn to_gcode_type(&mut self, ctx: &ValueContext) -> bool {
        if !self.kind.is_numeric() {
            return false;
        }
        if self.kind == ParamType::Float {
            self.value = canonical_decimal(self.display_number(ctx));
        }
        self.old_type = Some(self.kind);
        self.kind = ParamType::Gcode;
        true
    }

    /// Undo `to_gcode_type`, clamping the expression's numeric reading
    pub fn revert_type(&mut self) -> bool {
        let base = ValueContext::with_units(MeasurementSystem::Imperial);
        match self.old_type.take() {
            Some(ParamType::Float) => {
                self.kind = ParamType::Float;
                let v = units::float_or_zero(&self.value)
                    .clamp(self.min_value(&base), self.max_value(&base));
                self.value = canonical_decimal(v);
                self.sync_metric_value();
                true
            }
            Some(ParamType::Int) => {
                self.kind = ParamType::Int;
                let v = units::int_or_zero(&self.value).clamp(
                    self.min_value(&base).trunc() as i64,
                    self.max_value(&base).trunc() as i64,
                );
                self.value = v.to_string();
                true
            }
            other => {
                self.old_type = other;
                false
            }
        }
    }
}
