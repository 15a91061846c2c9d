//! Project facade
//!
//! Owns the document, its view hints, the undo log and the template
//! registry, and exposes the edit operations a front end drives. Every
//! operation that changes the document commits a snapshot.

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use ngcforge_core::{Error, FileResolver, ResolutionError, Result, ToolTable};
use tracing::{debug, info, warn};

use crate::codegen::{self, GeneratedProgram, GenerationOptions};
use crate::history::UndoLog;
use crate::migration::{self, MigrationReport};
use crate::param::ValueContext;
use crate::serialization::{self, UiState};
use crate::template::TemplateRegistry;
use crate::tree::{Direction, Document, InsertAt, NodeId};

pub struct Project {
    document: Document,
    ui: UiState,
    history: UndoLog,
    registry: TemplateRegistry,
    resolver: Rc<dyn FileResolver>,
    options: GenerationOptions,
    tools: ToolTable,
    path: Option<PathBuf>,
    clipboard: Option<String>,
}

impl Project {
    /// Empty project; the empty document is the first undo snapshot
    pub fn new(resolver: Rc<dyn FileResolver>, options: GenerationOptions) -> Self {
        let mut project = Self {
            document: Document::new(),
            ui: UiState::default(),
            history: UndoLog::new(),
            registry: TemplateRegistry::new(resolver.clone()),
            resolver,
            options,
            tools: ToolTable::new(),
            path: None,
            clipboard: None,
        };
        project.reset_history();
        project
    }

    pub fn with_undo_len(mut self, max_len: usize) -> Self {
        self.history = UndoLog::with_max_len(max_len);
        self.reset_history();
        self
    }

    fn reset_history(&mut self) {
        self.history.clear();
        match self.to_text() {
            Ok(snapshot) => self.history.commit(snapshot),
            Err(err) => warn!("Initial snapshot not recorded: {}", err),
        }
    }

    pub fn with_tools(mut self, tools: ToolTable) -> Self {
        self.tools = tools;
        self
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn ui(&self) -> &UiState {
        &self.ui
    }

    pub fn ui_mut(&mut self) -> &mut UiState {
        &mut self.ui
    }

    pub fn history(&self) -> &UndoLog {
        &self.history
    }

    pub fn registry_mut(&mut self) -> &mut TemplateRegistry {
        &mut self.registry
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: GenerationOptions) {
        self.options = options;
    }

    pub fn tools(&self) -> &ToolTable {
        &self.tools
    }

    pub fn values(&self) -> &ValueContext {
        &self.options.values
    }

    /// File the project was last loaded from or saved to
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Arena id of an instance
    pub fn node(&self, instance_id: &str) -> Result<NodeId> {
        self.document.find_by_id(instance_id).ok_or_else(|| {
            ResolutionError::InstanceNotFound {
                id: instance_id.to_string(),
            }
            .into()
        })
    }

    fn instance_id(&self, node: NodeId) -> String {
        self.document
            .feature(node)
            .map(|f| f.id.clone())
            .unwrap_or_default()
    }

    /// Replace the document with parsed project text, migrating outdated instances.
    ///
    /// The current document is kept when the text does not parse.
    pub fn load_text(&mut self, text: &str) -> Result<MigrationReport> {
        let (mut document, ui) = serialization::from_text(text)?;
        let report = migration::migrate(&mut document, &mut self.registry, &self.options.values);
        self.document = document;
        self.ui = ui;
        self.history.clear();
        self.commit()?;
        Ok(report)
    }

    pub fn load_project(&mut self, path: &Path) -> Result<MigrationReport> {
        let text = fs::read_to_string(path)?;
        let report = self.load_text(&text)?;
        info!("Loaded project {} ({} features)", path.display(), self.document.len());
        self.path = Some(path.to_path_buf());
        Ok(report)
    }

    pub fn to_text(&self) -> Result<String> {
        serialization::to_text(&self.document, &self.ui)
    }

    pub fn save_project(&mut self, path: &Path) -> Result<()> {
        fs::write(path, self.to_text()?)?;
        info!("Saved project {}", path.display());
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    pub fn generate(&mut self) -> GeneratedProgram {
        codegen::to_gcode(&mut self.document, &self.options, self.resolver.as_ref())
    }

    /// Generate and write the program to `path`
    pub fn write_ngc(&mut self, path: &Path) -> Result<GeneratedProgram> {
        let program = self.generate();
        fs::write(path, &program.text)?;
        debug!("Wrote {}", path.display());
        Ok(program)
    }

    /// Snapshot the current document into the undo log
    pub fn commit(&mut self) -> Result<()> {
        let snapshot = self.to_text()?;
        self.history.commit(snapshot);
        Ok(())
    }

    fn restore(&mut self, snapshot: &str) -> Result<()> {
        let (document, ui) = serialization::from_text(snapshot)?;
        self.document = document;
        self.ui = ui;
        Ok(())
    }

    /// Step back one snapshot; false when there is nothing to undo
    pub fn undo(&mut self) -> Result<bool> {
        let Some(snapshot) = self.history.undo().map(str::to_string) else {
            return Ok(false);
        };
        self.restore(&snapshot)?;
        Ok(true)
    }

    pub fn redo(&mut self) -> Result<bool> {
        let Some(snapshot) = self.history.redo().map(str::to_string) else {
            return Ok(false);
        };
        self.restore(&snapshot)?;
        Ok(true)
    }

    /// Add an instance of the template at `src`; returns the new instance id
    pub fn add_feature(&mut self, src: &str, at: InsertAt) -> Result<String> {
        let template = self.registry.get(src)?;
        let node = self.document.add_instance(&template, at, &self.options.values);
        self.commit()?;
        Ok(self.instance_id(node))
    }

    pub fn remove_feature(&mut self, instance_id: &str) -> Result<()> {
        let node = self.node(instance_id)?;
        if self.document.remove_instance(node) {
            self.commit()?;
        }
        Ok(())
    }

    pub fn move_feature(&mut self, instance_id: &str, direction: Direction) -> Result<bool> {
        let node = self.node(instance_id)?;
        let moved = self.document.move_instance(node, direction);
        if moved {
            self.commit()?;
        }
        Ok(moved)
    }

    pub fn append_to_items(&mut self, instance_id: &str, container_id: &str) -> Result<bool> {
        let node = self.node(instance_id)?;
        let container = self.node(container_id)?;
        let moved = self.document.append_to_items(node, container);
        if moved {
            self.commit()?;
        }
        Ok(moved)
    }

    pub fn remove_from_items(&mut self, instance_id: &str) -> Result<bool> {
        let node = self.node(instance_id)?;
        let moved = self.document.remove_from_items(node);
        if moved {
            self.commit()?;
        }
        Ok(moved)
    }

    /// Deep copy placed after the original; returns the copy's id
    pub fn duplicate_feature(&mut self, instance_id: &str) -> Result<String> {
        let node = self.node(instance_id)?;
        let copy = self
            .document
            .duplicate(node)
            .ok_or_else(|| Error::other(format!("cannot duplicate {}", instance_id)))?;
        self.commit()?;
        Ok(self.instance_id(copy))
    }

    /// Set a parameter through its hooks; commits when the value changed
    pub fn set_parameter(&mut self, instance_id: &str, param: &str, value: &str) -> Result<bool> {
        let node = self.node(instance_id)?;
        let values = self.options.values;
        let changed = match self.document.feature_mut(node) {
            Some(feature) => feature.set_param_value(param, value, &values)?,
            None => false,
        };
        if changed {
            self.commit()?;
        }
        Ok(changed)
    }

    /// Serialize the subtree at `instance_id` and keep it as the clipboard
    pub fn copy(&mut self, instance_id: &str) -> Result<String> {
        let node = self.node(instance_id)?;
        let snippet = self
            .document
            .extract(node)
            .ok_or_else(|| Error::other(format!("cannot copy {}", instance_id)))?;
        let text = serialization::to_text(&snippet, &UiState::default())?;
        self.clipboard = Some(text.clone());
        Ok(text)
    }

    pub fn clipboard(&self) -> Option<&str> {
        self.clipboard.as_deref()
    }

    /// Insert the features of a copied snippet; returns their new ids
    pub fn paste(&mut self, snippet: &str, at: InsertAt) -> Result<Vec<String>> {
        let (parsed, _) = serialization::from_text(snippet)?;
        let nodes = self.document.graft(&parsed, at);
        if !nodes.is_empty() {
            self.commit()?;
        }
        Ok(nodes.into_iter().map(|n| self.instance_id(n)).collect())
    }
}
