//! Feature instances
//!
//! An instance is a copy of a template's parameters and text blocks with the
//! user's values applied. Items parameters hold the ids of nested instances;
//! the tree module owns the nodes themselves.

use std::collections::BTreeMap;

use ngcforge_core::units;
use ngcforge_core::ResolutionError;
use tracing::warn;

use crate::expr::{self, EvalError, Scope, Value};
use crate::hooks::{self, Effect, Hook};
use crate::param::{ParamType, Parameter, ValueContext};
use crate::template::{FeatureTemplate, TextBlocks};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureInstance {
    pub type_id: String,
    /// `<type>_NNN`, unique within a document
    pub id: String,
    pub name: String,
    pub version: String,
    /// Template source name, used by migration
    pub src: Option<String>,
    /// Feature-level value shown next to the name
    pub value: String,
    pub indent: usize,
    pub blocks: TextBlocks,
    pub attrs: BTreeMap<String, String>,
    pub params: Vec<Parameter>,
    /// Assigned the first time `#ID` is expanded; never persisted
    pub short_id: Option<u32>,
}

impl FeatureInstance {
    /// Fresh instance carrying the template's defaults; `id` is the template id.
    pub fn from_template(template: &FeatureTemplate) -> Self {
        Self {
            type_id: template.type_id.clone(),
            id: template.template_id(),
            name: template.name.clone(),
            version: template.version.clone(),
            src: template.src.clone(),
            value: String::new(),
            indent: template.indent,
            blocks: template.blocks.clone(),
            attrs: template.attrs.clone(),
            params: template.ordered_params().cloned().collect(),
            short_id: None,
        }
    }

    pub fn version_number(&self) -> f64 {
        units::float_or_zero(&self.version)
    }

    /// Indent leader, one tab per declared level
    pub fn getindent(&self) -> String {
        "\t".repeat(self.indent)
    }

    /// Position of a parameter given its id, call token, or token without `#`
    pub fn param_index(&self, key: &str) -> Option<usize> {
        self.params.iter().position(|p| {
            p.id == key || p.call == key || p.call.strip_prefix('#') == Some(key)
        })
    }

    pub fn get_param(&self, key: &str) -> Option<&Parameter> {
        self.param_index(key).map(|i| &self.params[i])
    }

    pub fn get_param_mut(&mut self, key: &str) -> Option<&mut Parameter> {
        self.param_index(key).map(move |i| &mut self.params[i])
    }

    /// Indices of `items` parameters
    pub fn items_params(&self) -> impl Iterator<Item = usize> + '_ {
        self.params
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_items())
            .map(|(i, _)| i)
    }

    pub fn has_items(&self) -> bool {
        self.items_params().next().is_some()
    }

    pub fn hidden_count(&self) -> i64 {
        units::int_or_zero(self.attrs.get("hidden_count").map(String::as_str).unwrap_or("0"))
    }

    /// Hide one parameter and bump the hidden count
    pub fn hide_param(&mut self, key: &str) -> bool {
        let Some(p) = self.get_param_mut(key) else {
            return false;
        };
        if p.hidden {
            return false;
        }
        p.set_hidden(true);
        let count = self.hidden_count() + 1;
        self.attrs.insert("hidden_count".to_string(), count.to_string());
        true
    }

    /// Unhide everything; true when anything was hidden
    pub fn show_all_params(&mut self) -> bool {
        let mut shown = false;
        for p in &mut self.params {
            shown |= p.set_hidden(false);
        }
        self.attrs.insert("hidden_count".to_string(), "0".to_string());
        shown
    }

    pub fn set_param_grayed(&mut self, key: &str, grayed: bool) -> bool {
        match self.get_param_mut(key) {
            Some(p) => {
                p.set_grayed(grayed);
                true
            }
            None => false,
        }
    }

    /// Set a parameter value, running its `on_change` and `value_changed` hooks.
    ///
    /// Returns `Ok(false)` when the value did not change or a hook cancelled.
    pub fn set_param_value(
        &mut self,
        key: &str,
        new: &str,
        ctx: &ValueContext,
    ) -> Result<bool, ResolutionError> {
        let idx = self.param_index(key).ok_or_else(|| ResolutionError::ParamNotFound {
            feature: self.id.clone(),
            param: key.to_string(),
        })?;
        let old = self.params[idx].get_value(ctx);
        let mut proposed = new.to_string();

        let on_change = self.params[idx].on_change.clone();
        if !on_change.trim().is_empty() {
            match self.run_hook(&on_change, Some(&proposed), Some(&old), ctx) {
                Ok(outcome) if outcome.cancelled => return Ok(false),
                Ok(outcome) => {
                    if let Some(v) = outcome.proposed {
                        proposed = v;
                    }
                    self.apply_effects(outcome.effects, ctx);
                }
                Err(err) => warn!("{}: on_change hook of {} failed: {}", self.id, key, err),
            }
        }

        if !self.params[idx].set_value(&proposed, ctx) {
            return Ok(false);
        }

        let value_changed = self.params[idx].value_changed.clone();
        if !value_changed.trim().is_empty() {
            let current = self.params[idx].get_value(ctx);
            match self.run_hook(&value_changed, Some(&current), Some(&old), ctx) {
                Ok(outcome) => self.apply_effects(outcome.effects, ctx),
                Err(err) => warn!("{}: value_changed hook of {} failed: {}", self.id, key, err),
            }
        }
        Ok(true)
    }

    /// Run the template's `init` block
    pub fn run_init(&mut self, ctx: &ValueContext) {
        let init = self.blocks.init.clone();
        if init.trim().is_empty() {
            return;
        }
        match self.run_hook(&init, None, None, ctx) {
            Ok(outcome) => self.apply_effects(outcome.effects, ctx),
            Err(err) => warn!("{}: init hook failed: {}", self.id, err),
        }
    }

    fn run_hook(
        &self,
        script: &str,
        proposed: Option<&str>,
        old: Option<&str>,
        ctx: &ValueContext,
    ) -> Result<hooks::HookOutcome, EvalError> {
        let hook = Hook::parse(script)?;
        let mut scope = HookScope {
            feature: self,
            ctx,
            proposed,
            old,
        };
        hook.run(&mut scope)
    }

    fn apply_effects(&mut self, effects: Vec<Effect>, ctx: &ValueContext) {
        for effect in effects {
            let applied = match &effect {
                Effect::SetParam(tok, v) => self
                    .get_param_mut(tok)
                    .map(|p| {
                        p.set_value(v, ctx);
                    })
                    .is_some(),
                Effect::Hide(tok) => {
                    self.hide_param(tok);
                    self.param_index(tok).is_some()
                }
                Effect::Show(tok) => self
                    .get_param_mut(tok)
                    .map(|p| {
                        p.set_hidden(false);
                    })
                    .is_some(),
                Effect::Gray(tok) => self.set_param_grayed(tok, true),
                Effect::Ungray(tok) => self.set_param_grayed(tok, false),
            };
            if !applied {
                warn!("{}: hook refers to unknown parameter in {:?}", self.id, effect);
            }
        }
    }

    /// Evaluate the validation block; returns the messages of failed checks.
    ///
    /// Parameter tokens are substituted before the checks are evaluated.
    pub fn validate(&self, ctx: &ValueContext) -> Vec<String> {
        if self.blocks.validation.trim().is_empty() {
            return Vec::new();
        }
        let text = self.replace_params(&self.blocks.validation, ctx);
        let mut scope = HookScope {
            feature: self,
            ctx,
            proposed: None,
            old: None,
        };
        let mut failures = Vec::new();
        for check in hooks::parse_checks(&text) {
            match expr::evaluate(&check.condition, &mut scope) {
                Ok(v) if v.truthy() => {}
                Ok(_) => failures.push(check.message),
                Err(err) => failures.push(format!("{} ({})", check.message, err)),
            }
        }
        failures
    }

    /// Substitute every parameter's call token in `text`.
    ///
    /// A token only matches when the next character is not `[A-Za-z0-9_]`,
    /// so `#feed` never matches inside `#feedrate`.
    pub fn replace_params(&self, text: &str, ctx: &ValueContext) -> String {
        let mut out = text.to_string();
        for p in &self.params {
            if p.call.is_empty() || p.is_items() || !out.contains(p.call.as_str()) {
                continue;
            }
            let pattern = format!("{}([^A-Za-z0-9_]|$)", regex::escape(&p.call));
            if let Ok(re) = regex::Regex::new(&pattern) {
                let rendered = p.rendered(ctx);
                out = re
                    .replace_all(&out, |caps: &regex::Captures<'_>| {
                        format!("{}{}", rendered, &caps[1])
                    })
                    .into_owned();
            }
        }
        out
    }

    /// Value of a parameter as an expression value, in machine units
    pub(crate) fn param_value(&self, key: &str, ctx: &ValueContext) -> Option<Value> {
        let p = self.get_param(key)?;
        Some(match p.kind {
            ParamType::Float | ParamType::Int => Value::from_text(&p.ngc_value(ctx)),
            _ => Value::from_text(&p.value),
        })
    }

    /// `self.<name>` lookups
    pub(crate) fn attribute_value(&self, name: &str, ctx: &ValueContext) -> Option<Value> {
        match name {
            "id" => Some(Value::Str(self.id.clone())),
            "name" => Some(Value::Str(self.name.clone())),
            "type" => Some(Value::Str(self.type_id.clone())),
            "value" => Some(Value::from_text(&self.value)),
            "version" => Some(Value::Num(self.version_number())),
            "short_id" => self.short_id.map(|s| Value::Num(f64::from(s))),
            _ => self
                .param_value(name, ctx)
                .or_else(|| self.attrs.get(name).map(|v| Value::Str(v.clone()))),
        }
    }
}

struct HookScope<'a> {
    feature: &'a FeatureInstance,
    ctx: &'a ValueContext,
    proposed: Option<&'a str>,
    old: Option<&'a str>,
}

impl Scope for HookScope<'_> {
    fn param(&self, key: &str) -> Option<Value> {
        let p = self.feature.get_param(key)?;
        Some(Value::from_text(&p.get_value(self.ctx)))
    }

    fn attribute(&self, name: &str) -> Option<Value> {
        self.feature.attribute_value(name, self.ctx)
    }

    fn variable(&self, name: &str) -> Option<Value> {
        match name {
            "value" => self.proposed.map(Value::from_text),
            "old" => self.old.map(Value::from_text),
            _ => None,
        }
    }
}
