//! # ngcforge
//!
//! Compiles a tree of parameterised machining features into an RS274/NGC
//! program for LinuxCNC-style controllers.
//!
//! ## Architecture
//!
//! ngcforge is organized as a workspace with multiple crates:
//!
//! 1. **ngcforge-core** - Error kinds, units, tool table, file resolution
//! 2. **ngcforge-features** - Templates, feature tree, macros, code generation, projects
//! 3. **ngcforge-settings** - Configuration files
//! 4. **ngcforge** - Command-line front end that integrates all crates

use std::path::Path;
use std::rc::Rc;

use anyhow::Context;
use ngcforge_core::{FileResolver, ToolTable};
use ngcforge_features::Project;
use ngcforge_settings::Config;

pub use ngcforge_core::{Error, Result};
pub use ngcforge_features::{GeneratedProgram, MigrationReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging
///
/// Honours `RUST_LOG`; the default directive is INFO, or DEBUG when
/// `verbose` is set. Logs go to stderr so stdout carries only command output.
pub fn init_logging(verbose: bool) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let env_filter = EnvFilter::from_default_env().add_directive(level.into());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to install the log subscriber")?;
    Ok(())
}

/// Config from `path`, or from the default location when none is given
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => {
            let path = Config::default_path()?;
            Config::load_or_default(&path)
                .with_context(|| format!("Failed to load config {}", path.display()))
        }
    }
}

/// Empty project wired to the directories and machine settings of `config`
pub fn open_project(config: &Config) -> anyhow::Result<Project> {
    let resolver: Rc<dyn FileResolver> = Rc::new(config.resolver());
    let mut project = Project::new(resolver, config.generation_options())
        .with_undo_len(config.general.undo_max_len);
    if let Some(table) = &config.paths.tool_table {
        let tools = ToolTable::load(table)
            .with_context(|| format!("Failed to read tool table {}", table.display()))?;
        project = project.with_tools(tools);
    }
    Ok(project)
}

/// Tree listing with one `path  name (id)` line per feature, nested features indented
pub fn tree_listing(project: &Project) -> String {
    let doc = project.document();
    let mut out = String::new();
    for (node, depth) in doc.walk() {
        let (Some(feature), Some(path)) = (doc.feature(node), doc.path_of(node)) else {
            continue;
        };
        out.push_str(&format!(
            "{:<12}{}{} ({})\n",
            path,
            "  ".repeat(depth),
            feature.name,
            feature.id
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ngcforge_features::InsertAt;
    use std::fs;

    #[test]
    fn test_tree_listing_shows_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("cfg")).unwrap();
        fs::write(
            dir.path().join("cfg/group.cfg"),
            "[SUBROUTINE]\ntype = group\nname = Group\n\n[PARAM_ITEMS]\ntype = items\n",
        )
        .unwrap();

        let mut config = Config::default();
        config.paths.base_dir = dir.path().to_path_buf();
        let mut project = open_project(&config).unwrap();
        let outer = project.add_feature("group.cfg", InsertAt::End).unwrap();
        let node = project.node(&outer).unwrap();
        project.add_feature("group.cfg", InsertAt::Into(node)).unwrap();

        let listing = tree_listing(&project);
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0 "));
        assert!(lines[0].ends_with("Group (group_001)"));
        assert!(lines[1].starts_with("0:0:0"));
        assert!(lines[1].ends_with("  Group (group_002)"));
    }

    #[test]
    fn test_missing_tool_table_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.paths.base_dir = dir.path().to_path_buf();
        config.paths.tool_table = Some(dir.path().join("missing.tbl"));
        assert!(open_project(&config).is_err());
    }
}
