//! Upgrade instances saved against an older template version
//!
//! A fresh instance is built from the current template and the user's values
//! are copied over by matching call token. Parameters the new template no
//! longer declares are dropped; new ones keep their defaults.

use ngcforge_core::ResolutionError;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::diagnostics::Diagnostic;
use crate::feature::FeatureInstance;
use crate::param::ValueContext;
use crate::template::{FeatureTemplate, TemplateRegistry};
use crate::tree::Document;

/// Outcome of a migration pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MigrationReport {
    /// `(old id, new id)` of every upgraded instance
    pub migrated: Vec<(String, String)>,
    pub diagnostics: Vec<Diagnostic>,
}

impl MigrationReport {
    pub fn is_empty(&self) -> bool {
        self.migrated.is_empty() && self.diagnostics.is_empty()
    }
}

/// True when `template` is newer than the version `feature` was saved with
pub fn needs_migration(feature: &FeatureInstance, template: &FeatureTemplate) -> bool {
    template.version_number() > feature.version_number()
}

/// Build the upgraded instance.
///
/// Returns `None` when `old` has nested instances and the new template has no
/// items parameter left to hold them.
pub fn migrate_instance(
    old: &FeatureInstance,
    template: &FeatureTemplate,
    ctx: &ValueContext,
) -> Option<FeatureInstance> {
    let mut new = FeatureInstance::from_template(template);
    new.id = old.id.clone();
    new.name = old.name.clone();
    new.value = old.value.clone();
    if let Some(count) = old.attrs.get("hidden_count") {
        new.attrs.insert("hidden_count".to_string(), count.clone());
    }

    for param in &mut new.params {
        let Some(prev) = old.params.iter().find(|p| p.call == param.call) else {
            continue;
        };
        if param.is_items() {
            continue;
        }
        param.value = prev.value.clone();
        if prev.minimum_value.is_some() {
            param.minimum_value = prev.minimum_value.clone();
        }
        if prev.maximum_value.is_some() {
            param.maximum_value = prev.maximum_value.clone();
        }
        param.hidden = prev.hidden;
        param.grayed = prev.grayed;
        if let Some(path) = prev.extra.get("path") {
            param.extra.insert("path".to_string(), path.clone());
        }
        param.sync_metric_value();
    }

    let first_items = new.items_params().next();
    for prev in old.params.iter().filter(|p| p.is_items() && !p.children.is_empty()) {
        let target = new
            .params
            .iter()
            .position(|p| p.is_items() && p.call == prev.call)
            .or(first_items)?;
        new.params[target].children.extend(prev.children.iter().copied());
    }

    new.run_init(ctx);
    Some(new)
}

/// Upgrade every outdated instance of `doc`, resolving templates by `src`
pub fn migrate(
    doc: &mut Document,
    registry: &mut TemplateRegistry,
    ctx: &ValueContext,
) -> MigrationReport {
    let mut report = MigrationReport::default();
    for (node, _) in doc.walk() {
        let Some(old) = doc.feature(node) else {
            continue;
        };
        let Some(src) = old.src.clone() else {
            debug!("{} has no template source, left as is", old.id);
            continue;
        };
        let template = match registry.get(&src) {
            Ok(t) => t,
            Err(err) => {
                let resolution = ResolutionError::TemplateNotFound { name: src.clone() };
                warn!("{}: {}", old.id, err);
                report
                    .diagnostics
                    .push(Diagnostic::from_resolution(&old.id, resolution));
                continue;
            }
        };
        if !needs_migration(old, &template) {
            continue;
        }
        let Some(mut new) = migrate_instance(old, &template, ctx) else {
            warn!(
                "{}: template {} v{} has nowhere to keep nested features, not migrated",
                old.id, src, template.version
            );
            continue;
        };
        let old_id = old.id.clone();
        debug!("Migrating {} from v{} to v{}", old_id, old.version, template.version);

        new.id.clear();
        doc.replace_feature(node, new);
        let fresh = doc.next_feature_id(&template.type_id);
        if let Some(f) = doc.feature_mut(node) {
            f.id = fresh.clone();
        }
        report.migrated.push((old_id, fresh));
    }
    if !report.migrated.is_empty() {
        info!("Migrated {} features to newer templates", report.migrated.len());
    }
    report
}
