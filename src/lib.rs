pub mod config;
pub mod data;
pub mod errors;
pub mod etl;
pub mod parser;
pub mod xml;

use std::fs::create_dir_all;
use std::path::{Path, PathBuf};

use crate::config::UserConfig;
use crate::errors::Result;
use crate::etl::parse_osm::ParseOsmEtl;
use crate::etl::Etl;

/// Output directory for the configured input: `<dest_path>/<input file name>`.
pub fn create_output_dir(config: &UserConfig) -> Result<PathBuf> {
    let input_fname = Path::new(&config.data_path)
        .file_name()
        .ok_or("Could not get input file name")?;
    let output_dir = Path::new(&config.dest_path).join(input_fname);
    create_dir_all(&output_dir)?;
    Ok(output_dir)
}

/// Parses the configured input into its output directory and returns it.
pub fn run(config: &UserConfig, clean: bool) -> Result<PathBuf> {
    let input = Path::new(&config.data_path);
    if !input.is_file() {
        return Err(format!("Could not open {}: not a file", input.display()).into());
    }
    let output_dir = create_output_dir(config)?;
    let mut etl = ParseOsmEtl::new(config);
    etl.process(&output_dir, clean)?;
    Ok(output_dir)
}
