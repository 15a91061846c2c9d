//! Text block expansion
//!
//! Expands one text block of one instance: directory placeholders, parameter
//! tokens, then the `<import>`, `<eval>`, `<exec>` and `<subprocess>`
//! directives, then the id placeholders. Failures become diagnostics and the
//! offending directive expands to empty text (subprocess output excepted).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use ngcforge_core::{FileResolver, MacroError, ResolutionError};
use regex::{Captures, Regex};
use tracing::{debug, warn};

use crate::diagnostics::Diagnostic;
use crate::expr::{self, EvalError, Scope, Value};
use crate::feature::FeatureInstance;
use crate::param::ValueContext;
use crate::tree::{Document, NodeId};

fn import_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<import>(.*?)</import>").expect("invalid regex pattern"))
}

fn eval_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<eval>(.*?)</eval>").expect("invalid regex pattern"))
}

fn exec_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<exec>(.*?)</exec>").expect("invalid regex pattern"))
}

fn subprocess_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<subprocess>(.*?)</subprocess>").expect("invalid regex pattern")
    })
}

/// Strip the common leading indentation; tabs count as two spaces
pub fn dedent(block: &str) -> String {
    let block = block.replace('\t', "  ");
    let indent = block
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    let mut out = String::new();
    for line in block.lines() {
        out.push_str(line.get(indent..).unwrap_or(line.trim_start()));
        out.push('\n');
    }
    out
}

/// Trim surrounding blank lines and prefix each line with `leader`
pub fn wrap_block(text: &str, leader: &str) -> String {
    let s = text
        .trim_start_matches('\n')
        .trim_end_matches(['\n', '\t']);
    if s.is_empty() {
        return String::new();
    }
    if leader.is_empty() {
        return format!("\n{}\n\n", s);
    }
    let mut out = String::from("\n");
    for line in s.split('\n') {
        out.push_str(leader);
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    out
}

/// State threaded through one generation run
pub struct GenerationContext<'a> {
    pub values: ValueContext,
    pub resolver: &'a dyn FileResolver,
    /// Substituted for `%NCAM_DIR%`
    pub install_dir: PathBuf,
    /// Substituted for `%SYS_DIR%`
    pub sys_dir: PathBuf,
    emitted: HashSet<String>,
    included: HashSet<PathBuf>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> GenerationContext<'a> {
    pub fn new(values: ValueContext, resolver: &'a dyn FileResolver, install_dir: &Path) -> Self {
        Self {
            values,
            resolver,
            install_dir: install_dir.to_path_buf(),
            sys_dir: install_dir.to_path_buf(),
            emitted: HashSet::new(),
            included: HashSet::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn with_sys_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sys_dir = dir.into();
        self
    }

    /// Clear per-run state before a new generation
    pub fn reset(&mut self) {
        self.emitted.clear();
        self.included.clear();
        self.diagnostics.clear();
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        warn!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
    }

    pub fn definitions_emitted(&self, type_id: &str) -> bool {
        self.emitted.contains(type_id)
    }

    pub fn mark_definitions(&mut self, type_id: &str) {
        self.emitted.insert(type_id.to_string());
    }

    /// Expand a text block of the instance at `node`
    pub fn process(&mut self, doc: &mut Document, node: NodeId, text: &str, leader: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        let mut s = {
            let Some(feature) = doc.feature(node) else {
                return String::new();
            };
            let mut s = text
                .replace("%NCAM_DIR%", &self.install_dir.display().to_string())
                .replace("%SYS_DIR%", &self.sys_dir.display().to_string());
            s = feature.replace_params(&s, &self.values);
            s = self.expand_imports(feature, &s);
            s = self.expand_evals(feature, &s);
            s = self.expand_execs(feature, &s);
            s = self.expand_subprocesses(feature, &s);
            s.replace("#sub_name", &feature.name)
                .replace("#self_id", &feature.id)
        };

        // imports and command output may carry #ID too
        if s.contains("#ID") {
            if let Some(short) = doc.short_id(node) {
                s = s.replace("#ID", &short.to_string());
            }
        }
        wrap_block(&s, leader)
    }

    fn expand_imports(&mut self, feature: &FeatureInstance, s: &str) -> String {
        if !import_regex().is_match(s) {
            return s.to_string();
        }
        import_regex()
            .replace_all(s, |caps: &Captures<'_>| {
                let name = caps[1].trim();
                let Some(path) = self.resolver.search_path(name, &["projects"]) else {
                    self.report(Diagnostic::from_resolution(
                        &feature.id,
                        ResolutionError::FileNotFound {
                            name: name.to_string(),
                        },
                    ));
                    return String::new();
                };
                match std::fs::read_to_string(&path) {
                    Ok(content) => content,
                    Err(err) => {
                        self.report(Diagnostic::from_macro(
                            &feature.id,
                            MacroError::Import {
                                name: name.to_string(),
                                reason: err.to_string(),
                            },
                        ));
                        String::new()
                    }
                }
            })
            .into_owned()
    }

    fn expand_evals(&mut self, feature: &FeatureInstance, s: &str) -> String {
        if !eval_regex().is_match(s) {
            return s.to_string();
        }
        let values = self.values;
        let resolver = self.resolver;
        let mut failures = Vec::new();
        let out = {
            let mut scope = MacroScope {
                feature,
                ctx: &values,
                resolver,
                included: &mut self.included,
            };
            eval_regex()
                .replace_all(s, |caps: &Captures<'_>| {
                    let src = &caps[1];
                    match expr::evaluate(src, &mut scope) {
                        Ok(v) => v.to_string(),
                        Err(err) => {
                            failures.push(MacroError::Eval {
                                expr: src.to_string(),
                                reason: err.to_string(),
                            });
                            String::new()
                        }
                    }
                })
                .into_owned()
        };
        for err in failures {
            self.report(Diagnostic::from_macro(&feature.id, err));
        }
        out
    }

    fn expand_execs(&mut self, feature: &FeatureInstance, s: &str) -> String {
        if !exec_regex().is_match(s) {
            return s.to_string();
        }
        exec_regex()
            .replace_all(s, |caps: &Captures<'_>| {
                debug!("Skipping exec block:\n{}", dedent(&caps[1]));
                self.report(Diagnostic::from_macro(
                    &feature.id,
                    MacroError::Exec {
                        feature: feature.id.clone(),
                    },
                ));
                String::new()
            })
            .into_owned()
    }

    fn expand_subprocesses(&mut self, feature: &FeatureInstance, s: &str) -> String {
        if !subprocess_regex().is_match(s) {
            return s.to_string();
        }
        subprocess_regex()
            .replace_all(s, |caps: &Captures<'_>| {
                let command = dedent(&caps[1]);
                debug!("Running subprocess for {}: {}", feature.id, command.trim());
                match Command::new("sh").arg("-c").arg(&command).output() {
                    Ok(output) => {
                        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                        text.push_str(&String::from_utf8_lossy(&output.stderr));
                        if !output.status.success() {
                            self.report(Diagnostic::from_macro(
                                &feature.id,
                                MacroError::Subprocess {
                                    command: command.trim().to_string(),
                                    code: output.status.code(),
                                    output: text.clone(),
                                },
                            ));
                        }
                        text
                    }
                    Err(err) => {
                        self.report(Diagnostic::from_macro(
                            &feature.id,
                            MacroError::Subprocess {
                                command: command.trim().to_string(),
                                code: None,
                                output: err.to_string(),
                            },
                        ));
                        String::new()
                    }
                }
            })
            .into_owned()
    }
}

/// `<eval>` scope: the instance as `self`, plus library includes
struct MacroScope<'s> {
    feature: &'s FeatureInstance,
    ctx: &'s ValueContext,
    resolver: &'s dyn FileResolver,
    included: &'s mut HashSet<PathBuf>,
}

impl Scope for MacroScope<'_> {
    fn param(&self, key: &str) -> Option<Value> {
        self.feature.param_value(key, self.ctx)
    }

    fn attribute(&self, name: &str) -> Option<Value> {
        self.feature.attribute_value(name, self.ctx)
    }

    fn include(&mut self, name: &str, once: bool) -> Result<String, EvalError> {
        let path = self
            .resolver
            .search_path(name, &["lib"])
            .ok_or_else(|| EvalError::Include(format!("library file '{}' not found", name)))?;
        if once && !self.included.insert(path.clone()) {
            return Ok(String::new());
        }
        std::fs::read_to_string(&path)
            .map_err(|e| EvalError::Include(format!("{}: {}", path.display(), e)))
    }
}
