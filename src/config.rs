use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use crate::data::rows::Table;
use crate::errors::Result;

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct UserConfig {
    /// Input .osm file. A `.xz` suffix means xz compressed.
    pub data_path: String,
    /// Outputs go to `<dest_path>/<input file name>/`.
    pub dest_path: String,
    #[serde(default = "all_tables")]
    pub tables: Vec<Table>,
    /// Log and skip lines that fail to parse instead of aborting.
    #[serde(default)]
    pub skip_invalid_lines: bool,
    /// Skip lines irrelevant to the selected tables before tokenizing them.
    #[serde(default = "enabled")]
    pub prefilter: bool,
    #[serde(default)]
    pub progress: bool,
    #[serde(default = "info_level")]
    pub log_level: String,
}

fn all_tables() -> Vec<Table> {
    Table::ALL.to_vec()
}

fn enabled() -> bool {
    true
}

fn info_level() -> String {
    "info".to_string()
}

pub fn load_user_config(path: &Path) -> Result<UserConfig> {
    let file = File::open(path).map_err(|err| format!("Could not open config file {}: {}", path.display(), err))?;
    let config = serde_json::from_reader(BufReader::new(file))?;
    Ok(config)
}
