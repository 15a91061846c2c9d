//! Configuration for ngcforge
//!
//! Supports JSON and TOML file formats. Configuration is organized into
//! sections:
//! - General preferences (units, number formatting, undo depth, refresh)
//! - Program framing (catalog, init string, post-amble, preamble variables)
//! - Paths (base and install directories, libraries, tool table, output)

pub use ngcforge_core::units::MeasurementSystem;
use ngcforge_core::SearchPath;
use ngcforge_features::{GenerationOptions, ValueContext, LATHE_INIT, MILL_INIT};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{SettingsError, SettingsResult};

/// Largest digits count a parameter may be displayed with
pub const MAX_DIGITS: usize = 10;

/// Machine catalog the templates are picked from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Catalog {
    #[default]
    Mill,
    Lathe,
    Plasma,
}

impl Catalog {
    /// Startup codes used when no override is configured
    pub fn default_init(self) -> &'static str {
        match self {
            Self::Lathe => LATHE_INIT,
            Self::Mill | Self::Plasma => MILL_INIT,
        }
    }
}

impl fmt::Display for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mill => write!(f, "Mill"),
            Self::Lathe => write!(f, "Lathe"),
            Self::Plasma => write!(f, "Plasma"),
        }
    }
}

/// User preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Units values are edited in
    pub display_units: MeasurementSystem,
    /// Units of the machine the program is generated for
    pub machine_units: MeasurementSystem,
    /// Default decimal places for float parameters
    pub digits: usize,
    pub decimal_separator: char,
    /// Snapshots kept by the undo log
    pub undo_max_len: usize,
    /// Debounce delay before regenerating after an edit
    pub refresh_interval_ms: u64,
    pub auto_refresh: bool,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            display_units: MeasurementSystem::Metric,
            machine_units: MeasurementSystem::Metric,
            digits: 3,
            decimal_separator: '.',
            undo_max_len: 200,
            refresh_interval_ms: 300,
            auto_refresh: true,
        }
    }
}

/// One `#<name> = value` line of the preamble
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreambleVar {
    pub name: String,
    pub value: String,
}

/// How the generated program is framed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NgcSettings {
    pub catalog: Catalog,
    /// Overrides the catalog's startup codes
    pub init_str: Option<String>,
    pub post_amble: String,
    /// Bracket the program with `%` lines instead of ending with `M2`
    pub use_pct_signs: bool,
    pub preamble_vars: Vec<PreambleVar>,
}

impl NgcSettings {
    pub fn init_str(&self) -> &str {
        self.init_str
            .as_deref()
            .unwrap_or_else(|| self.catalog.default_init())
    }
}

/// Filesystem locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Root holding `cfg/`, `lib/`, `catalogs/`, `projects/` and `graphics/`
    pub base_dir: PathBuf,
    /// Substituted for `%NCAM_DIR%`; the base directory when unset
    pub install_dir: Option<PathBuf>,
    /// Searched after the standard sub-directories
    pub lib_dirs: Vec<PathBuf>,
    pub tool_table: Option<PathBuf>,
    /// Program written by generation, relative to the base directory
    pub output_file: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            base_dir: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("ngcforge"),
            install_dir: None,
            lib_dirs: Vec::new(),
            tool_table: None,
            output_file: PathBuf::from("ncam.ngc"),
        }
    }
}

impl PathSettings {
    pub fn install_dir(&self) -> &Path {
        self.install_dir.as_deref().unwrap_or(&self.base_dir)
    }

    pub fn output_path(&self) -> PathBuf {
        self.base_dir.join(&self.output_file)
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub general: GeneralSettings,
    pub ngc: NgcSettings,
    pub paths: PathSettings,
}

enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> SettingsResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(SettingsError::UnsupportedFormat(
            other.unwrap_or("<none>").to_string(),
        )),
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// `<config dir>/ngcforge/config.toml`
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("ngcforge").join("config.toml"))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no configuration directory on this platform".into())
            })
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path)?;
        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };
        config.validate()?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Defaults when `path` does not exist yet
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;
        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        if self.general.undo_max_len == 0 {
            return Err(SettingsError::invalid(
                "general.undo_max_len",
                "must be > 0",
            ));
        }
        if self.general.digits > MAX_DIGITS {
            return Err(SettingsError::invalid(
                "general.digits",
                format!("must be at most {}", MAX_DIGITS),
            ));
        }
        if !matches!(self.general.decimal_separator, '.' | ',') {
            return Err(SettingsError::invalid(
                "general.decimal_separator",
                "must be '.' or ','",
            ));
        }
        if self.paths.output_file.as_os_str().is_empty() {
            return Err(SettingsError::invalid("paths.output_file", "must not be empty"));
        }
        Ok(())
    }

    pub fn value_context(&self) -> ValueContext {
        ValueContext {
            display_units: self.general.display_units,
            machine_units: self.general.machine_units,
            decimal_separator: self.general.decimal_separator,
            default_digits: self.general.digits,
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.general.refresh_interval_ms)
    }

    /// Generator settings derived from this config
    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            values: self.value_context(),
            init_str: self.ngc.init_str().to_string(),
            post_amble: self.ngc.post_amble.clone(),
            use_pct_signs: self.ngc.use_pct_signs,
            preamble_vars: self
                .ngc
                .preamble_vars
                .iter()
                .map(|v| (v.name.clone(), v.value.clone()))
                .collect(),
            install_dir: self.paths.install_dir().to_path_buf(),
            sys_dir: None,
        }
    }

    /// File resolver rooted at the base directory
    pub fn resolver(&self) -> SearchPath {
        SearchPath::new(&self.paths.base_dir).with_extra_dirs(self.paths.lib_dirs.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.general.digits, 3);
        assert_eq!(config.ngc.init_str(), MILL_INIT);
        assert_eq!(config.paths.output_file, PathBuf::from("ncam.ngc"));
    }

    #[test]
    fn test_lathe_uses_g18() {
        let mut config = Config::default();
        config.ngc.catalog = Catalog::Lathe;
        assert!(config.generation_options().init_str.starts_with("G18"));
        config.ngc.init_str = Some("G17 G90".to_string());
        assert_eq!(config.generation_options().init_str, "G17 G90");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.general.undo_max_len = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.general.digits = 11;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.general.decimal_separator = ';';
        assert!(matches!(
            config.validate(),
            Err(SettingsError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn test_generation_options_projection() {
        let mut config = Config::default();
        config.general.machine_units = MeasurementSystem::Imperial;
        config.general.decimal_separator = ',';
        config.ngc.preamble_vars = vec![PreambleVar {
            name: "_tool_change_z".to_string(),
            value: "2".to_string(),
        }];
        config.paths.base_dir = PathBuf::from("/opt/ngcforge");

        let options = config.generation_options();
        assert_eq!(options.values.machine_units, MeasurementSystem::Imperial);
        assert_eq!(options.values.decimal_separator, ',');
        assert_eq!(
            options.preamble_vars,
            vec![("_tool_change_z".to_string(), "2".to_string())]
        );
        assert_eq!(options.install_dir, PathBuf::from("/opt/ngcforge"));
    }
}
