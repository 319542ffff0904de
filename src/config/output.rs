//! Output/persistence configuration (`output` block of the experiment YAML).

use serde::{Deserialize, Serialize};

fn default_directory() -> String {
    "./runs".to_string()
}

fn default_database_filename() -> String {
    "experiment.db".to_string()
}

/// The `output` block of the experiment YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory under which this run's SQLite database is created.
    /// Resolved relative to the experiment YAML's own directory.
    #[serde(default = "default_directory")]
    pub directory: String,
    /// Filename of the SQLite database within `directory`.
    ///
    /// Serialized as `database` in the experiment YAML (§6).
    #[serde(rename = "database", default = "default_database_filename")]
    pub database_filename: String,
    /// Emit a per-iteration human-readable summary line in addition to
    /// structured tracing events.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            database_filename: default_database_filename(),
            verbose: false,
        }
    }
}

impl OutputConfig {
    /// Full path to this run's SQLite database file.
    pub fn database_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.directory).join(&self.database_filename)
    }
}
