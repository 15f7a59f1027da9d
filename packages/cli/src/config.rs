use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use structdoc_editor::{LoadOptions, SaveOptions};

pub const DEFAULT_CONFIG_NAME: &str = "structdoc.config.json";

/// Structdoc configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Directory scanned for schema files
    #[serde(default = "default_schema_dir")]
    pub schema_dir: String,

    /// Extension of schema files inside `schema_dir`
    #[serde(default = "default_schema_extension")]
    pub schema_extension: String,

    /// Root used by `new` when none is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_definition: Option<String>,

    /// Plain collections are written without their wrapper element
    #[serde(default)]
    pub array_mode: bool,

    #[serde(default = "default_indent")]
    pub indent: String,

    /// Window in which consecutive edits of one item merge into one undo step
    #[serde(default = "default_grouping_ms")]
    pub grouping_ms: u64,
}

fn default_schema_dir() -> String {
    "schema".to_string()
}

fn default_schema_extension() -> String {
    "xmldef".to_string()
}

fn default_indent() -> String {
    "  ".to_string()
}

fn default_grouping_ms() -> u64 {
    500
}

impl Config {
    /// Load config from a directory
    pub fn load(cwd: &str) -> anyhow::Result<Self> {
        let config_path = PathBuf::from(cwd).join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Get absolute path to the schema directory
    pub fn get_schema_dir(&self, cwd: &str) -> PathBuf {
        PathBuf::from(cwd).join(&self.schema_dir)
    }

    pub fn save_options(&self) -> SaveOptions {
        SaveOptions {
            array_mode: self.array_mode,
            indent: self.indent.clone(),
        }
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            array_mode: self.array_mode,
        }
    }

    pub fn grouping(&self) -> Duration {
        Duration::from_millis(self.grouping_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_dir: default_schema_dir(),
            schema_extension: default_schema_extension(),
            root_definition: None,
            array_mode: false,
            indent: default_indent(),
            grouping_ms: default_grouping_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "schemaDir": "defs",
            "schemaExtension": "xml",
            "rootDefinition": "Character",
            "arrayMode": true,
            "indent": "\t",
            "groupingMs": 250
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.schema_dir, "defs");
        assert_eq!(config.schema_extension, "xml");
        assert_eq!(config.root_definition.as_deref(), Some("Character"));
        assert!(config.array_mode);
        assert_eq!(config.save_options().indent, "\t");
        assert!(config.load_options().array_mode);
        assert_eq!(config.grouping(), Duration::from_millis(250));
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.schema_dir, "schema");
        assert_eq!(config.schema_extension, "xmldef");
        assert_eq!(config.root_definition, None);
        assert_eq!(config.indent, "  ");
        assert_eq!(config.grouping_ms, 500);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: Config = serde_json::from_str(r#"{ "arrayMode": true }"#).unwrap();
        assert_eq!(config, Config { array_mode: true, ..Config::default() });
    }

    #[test]
    fn test_load_without_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().display().to_string()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_reads_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_NAME),
            r#"{ "schemaDir": "defs" }"#,
        )
        .unwrap();
        let cwd = dir.path().display().to_string();
        let config = Config::load(&cwd).unwrap();
        assert_eq!(config.get_schema_dir(&cwd), dir.path().join("defs"));
    }
}
