//! G-code generation
//!
//! Walks the document depth first. Each instance contributes its `before` and
//! `call` blocks, then its nested instances one indent level deeper, then its
//! `after` block. `definitions` blocks are collected separately and emitted
//! once per feature type ahead of the program body.

use std::path::PathBuf;

use ngcforge_core::FileResolver;
use tracing::{debug, info};

use crate::diagnostics::Diagnostic;
use crate::macros::GenerationContext;
use crate::param::ValueContext;
use crate::tree::{Document, NodeId};

/// Startup codes for mill and plasma catalogs
pub const MILL_INIT: &str = "G17 G40 G49 G90 G92.1 G94 G54 G64 p0.001";
/// Startup codes for the lathe catalog
pub const LATHE_INIT: &str = "G18 G40 G49 G90 G92.1 G94 G54 G64 p0.001";

const HEADER: &str = "(*** G-code generated by ngcforge ***)";
const END_OF_DEFINITIONS: &str = "(end sub definitions)\n\n";

/// Machine-level settings that shape the generated program.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub values: ValueContext,
    pub init_str: String,
    pub post_amble: String,
    /// Bracket the program with `%` lines instead of ending with `M2`
    pub use_pct_signs: bool,
    /// `#<name> = value` assignments written after the init string
    pub preamble_vars: Vec<(String, String)>,
    pub install_dir: PathBuf,
    pub sys_dir: Option<PathBuf>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            values: ValueContext::default(),
            init_str: MILL_INIT.to_string(),
            post_amble: String::new(),
            use_pct_signs: false,
            preamble_vars: Vec::new(),
            install_dir: PathBuf::new(),
            sys_dir: None,
        }
    }
}

impl GenerationOptions {
    fn preamble(&self) -> String {
        let mut s = String::new();
        if self.use_pct_signs {
            s.push_str("%\n");
        }
        s.push_str(HEADER);
        s.push_str("\n\n");
        s.push_str(self.values.machine_units.gcode());
        s.push('\n');
        s.push_str(&self.init_str);
        s.push_str("\n\n");
        for (name, value) in &self.preamble_vars {
            s.push_str(&format!("#<{}> = {}\n", name, value));
        }
        if !self.preamble_vars.is_empty() {
            s.push('\n');
        }
        s
    }

    fn closing(&self) -> &'static str {
        if self.use_pct_signs {
            "\n%\n"
        } else {
            "\nM2\n"
        }
    }
}

/// Output of one generation run
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedProgram {
    pub text: String,
    /// Validation, macro and resolution issues; none of them stop generation
    pub diagnostics: Vec<Diagnostic>,
}

impl GeneratedProgram {
    pub fn has_warnings(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

fn emit(
    gen: &mut GenerationContext<'_>,
    doc: &mut Document,
    node: NodeId,
    leader: &str,
    definitions: &mut String,
    body: &mut String,
) {
    let Some(feature) = doc.feature(node) else {
        return;
    };
    for message in feature.validate(&gen.values) {
        gen.report(Diagnostic::validation(&feature.id, message));
    }
    let type_id = feature.type_id.clone();
    let blocks = feature.blocks.clone();
    let sub_leader = format!("{}{}", leader, feature.getindent());

    if !gen.definitions_emitted(&type_id) && !blocks.definitions.is_empty() {
        let defs = gen.process(doc, node, &blocks.definitions, "");
        // a block that expands to nothing leaves the type open for a later instance
        if !defs.is_empty() {
            gen.mark_definitions(&type_id);
            definitions.push_str(&defs);
        }
    }

    body.push_str(&gen.process(doc, node, &blocks.before, leader));
    body.push_str(&gen.process(doc, node, &blocks.call, leader));
    let child_leader = format!("{}\t", sub_leader);
    for child in doc.children(node) {
        emit(gen, doc, child, &child_leader, definitions, body);
    }
    body.push_str(&gen.process(doc, node, &blocks.after, leader));
}

/// Render the whole document as one NC program
pub fn to_gcode(
    doc: &mut Document,
    options: &GenerationOptions,
    resolver: &dyn FileResolver,
) -> GeneratedProgram {
    let mut gen = GenerationContext::new(options.values, resolver, &options.install_dir);
    if let Some(sys) = &options.sys_dir {
        gen = gen.with_sys_dir(sys.clone());
    }
    gen.reset();

    let mut definitions = String::new();
    let mut body = String::new();
    for root in doc.roots().to_vec() {
        emit(&mut gen, doc, root, "", &mut definitions, &mut body);
    }

    let mut text = options.preamble();
    text.push_str(&definitions);
    text.push_str(END_OF_DEFINITIONS);
    text.push_str(&body);
    text.push_str(&options.post_amble);
    text.push_str(options.closing());

    let diagnostics = gen.take_diagnostics();
    info!(
        "Generated {} lines of G-code ({} warnings)",
        text.lines().count(),
        diagnostics.len()
    );
    debug!("Features rendered: {}", doc.len());
    GeneratedProgram { text, diagnostics }
}
