use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use pretty_assertions::assert_eq;
use rstest::rstest;
use xz::write::XzEncoder;

use osm_stream_parser::config::UserConfig;
use osm_stream_parser::data::rows::Table;
use osm_stream_parser::etl::parse_osm::load_cached;

const SAMPLE: &str = "tests/data/sample.osm";

fn config(data_path: &Path, dest_path: &Path, tables: Vec<Table>) -> UserConfig {
    UserConfig {
        data_path: data_path.to_string_lossy().into_owned(),
        dest_path: dest_path.to_string_lossy().into_owned(),
        tables,
        skip_invalid_lines: false,
        prefilter: true,
        progress: false,
        log_level: "info".to_string(),
    }
}

fn compressed_sample(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("sample.osm.xz");
    let mut encoder = XzEncoder::new(File::create(&path).unwrap(), 6);
    encoder.write_all(&fs::read(SAMPLE).unwrap()).unwrap();
    encoder.finish().unwrap();
    path
}

#[rstest]
#[case::plain(false)]
#[case::xz(true)]
fn writes_tables_for_every_selected_kind(#[case] compressed: bool) {
    let dir = tempfile::tempdir().unwrap();
    let input = if compressed { compressed_sample(dir.path()) } else { Path::new(SAMPLE).to_path_buf() };
    let config = config(&input, &dir.path().join("output"), Table::ALL.to_vec());

    let output_dir = osm_stream_parser::run(&config, false).unwrap();
    assert_eq!(output_dir, dir.path().join("output").join(input.file_name().unwrap()));

    let tables = load_cached(&output_dir).unwrap();
    assert_eq!(tables.len(Table::Nodes), 4);
    assert_eq!(tables.len(Table::Ways), 1);
    assert_eq!(tables.len(Table::Relations), 1);

    let relation = &tables.relations[0];
    assert_eq!(relation.common.id, "R56688");
    assert_eq!(relation.common.version, 28);
    assert_eq!(relation.members.get("N261728686").map(String::as_str), Some("null"));
    assert_eq!(relation.members.get("W26659127").map(String::as_str), Some("path"));

    let ways = fs::read_to_string(output_dir.join("ways.jsonl")).unwrap();
    let way: serde_json::Value = serde_json::from_str(ways.trim_end()).unwrap();
    assert_eq!(way["ID"], "W26659127");
    assert_eq!(way["Nodes"], serde_json::json!(["N298884269", "N298884272", "N261728686"]));
    assert_eq!(way["Tags"]["name"], "Pastower Straße");
}

#[test]
fn cached_output_is_reused_until_cleaned() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(Path::new(SAMPLE), dir.path(), vec![Table::Relations]);

    let output_dir = osm_stream_parser::run(&config, false).unwrap();
    assert!(!output_dir.join("nodes.jsonl").exists());
    fs::remove_file(output_dir.join("relations.jsonl")).unwrap();

    osm_stream_parser::run(&config, false).unwrap();
    assert!(!output_dir.join("relations.jsonl").exists());

    osm_stream_parser::run(&config, true).unwrap();
    let relations = fs::read_to_string(output_dir.join("relations.jsonl")).unwrap();
    assert_eq!(relations.lines().count(), 1);
    assert_eq!(load_cached(&output_dir).unwrap().len(Table::Relations), 1);
}

#[test]
fn missing_input_fails_before_creating_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("output");
    let config = config(&dir.path().join("absent.osm"), &dest, Table::ALL.to_vec());

    let error = osm_stream_parser::run(&config, false).unwrap_err();
    assert!(error.message.starts_with("Could not open"));
    assert!(!dest.exists());
    assert!(load_cached(&dest.join("absent.osm")).is_err());
}
