use std::io;
use std::path::PathBuf;

use clap::Parser;
use log::info;
use structured_logger::json::new_writer;
use structured_logger::Builder;

use osm_stream_parser::config::load_user_config;
use osm_stream_parser::data::rows::Table;
use osm_stream_parser::errors::Result;
use osm_stream_parser::etl::parse_osm::load_cached;

#[derive(Debug, Parser)]
#[command(name = "osm-stream-parser", about = "Line-based OSM XML to row tables")]
struct Arguments {
    /// JSON configuration file
    #[arg(short, long, value_name = "path", default_value = "config/osm_import.json")]
    config: PathBuf,
    /// Remove cached outputs before running
    #[arg(long)]
    clean: bool,
}

fn setup_logging(level: &str) {
    Builder::with_level(level)
        .with_target_writer("*", new_writer(io::stdout()))
        .init();
}

fn main() -> Result<()> {
    let arguments = Arguments::parse();
    let user_config = load_user_config(&arguments.config)?;
    setup_logging(&user_config.log_level);

    let output_dir = osm_stream_parser::run(&user_config, arguments.clean)?;

    let tables = load_cached(&output_dir)?;
    info!(
        nodes = tables.len(Table::Nodes),
        ways = tables.len(Table::Ways),
        relations = tables.len(Table::Relations);
        "Read tables from cache"
    );

    Ok(())
}
