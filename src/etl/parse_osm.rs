use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use regex::Regex;
use serde::Serialize;
use xz::bufread::XzDecoder;

use crate::config::UserConfig;
use crate::data::osm::ElementKind;
use crate::data::rows::Table;
use crate::data::OsmTables;
use crate::errors::Result;
use crate::etl::Etl;
use crate::parser::OsmParser;

pub const ETL_NAME: &str = "parse_osm";
pub const OUTPUT_FILE_NAME: &str = "osm_elements.rkyv";

const BYTE_ORDER_MARK: char = '\u{feff}';

/// Line and record counts of one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ParseSummary {
    pub lines_read: u64,
    pub lines_skipped: u64,
    pub nodes: u64,
    pub ways: u64,
    pub relations: u64,
    /// Ways and relations closed with too few children.
    pub dropped: u64,
}

impl ParseSummary {
    fn count(&mut self, kind: ElementKind) {
        match kind {
            ElementKind::Node => self.nodes += 1,
            ElementKind::Way => self.ways += 1,
            ElementKind::Relation => self.relations += 1,
        }
    }
}

pub struct Output {
    pub tables: OsmTables,
    pub summary: ParseSummary,
}

pub struct ParseOsmEtl<'a> {
    config: &'a UserConfig,
}

impl ParseOsmEtl<'_> {
    pub fn new(config: &UserConfig) -> ParseOsmEtl<'_> {
        ParseOsmEtl {
            config
        }
    }

    fn output_path(dir: &Path) -> PathBuf {
        dir.join(OUTPUT_FILE_NAME)
    }

    /// Configured tables in canonical order, without duplicates.
    fn selected_tables(&self) -> Vec<Table> {
        Table::ALL
            .into_iter()
            .filter(|table| self.config.tables.contains(table))
            .collect()
    }

    /// Matches the lines that can affect a selected table. `None` when every
    /// line has to be parsed.
    fn line_filter(&self) -> Result<Option<Regex>> {
        let tables = self.selected_tables();
        if !self.config.prefilter || tables.is_empty() || tables.len() == Table::ALL.len() {
            return Ok(None);
        }

        let mut names: Vec<&str> = tables
            .iter()
            .flat_map(|table| table.markup_names().iter().copied())
            .collect();
        names.sort_unstable();
        names.dedup();

        let pattern = format!(r"^\s*</?(?:{})\b", names.join("|"));
        Ok(Some(Regex::new(&pattern)?))
    }
}

impl Etl for ParseOsmEtl<'_> {
    type Input = Box<dyn BufRead>;
    type Output = Output;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn is_cached(&self, dir: &Path) -> Result<bool> {
        Ok(Self::output_path(dir).try_exists()?)
    }

    fn clean(&self, dir: &Path) -> Result<()> {
        for table in Table::ALL {
            let path = dir.join(table.file_name());
            if path.try_exists()? {
                fs::remove_file(path)?;
            }
        }
        fs::remove_file(Self::output_path(dir))?;
        Ok(())
    }

    fn extract(&mut self) -> Result<Self::Input> {
        open_input(Path::new(&self.config.data_path))
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        let tables_selected = self.selected_tables();
        let filter = self.line_filter()?;
        let lines: Box<dyn Iterator<Item = io::Result<String>>> = if self.config.progress {
            Box::new(tqdm::tqdm(input.lines()))
        } else {
            Box::new(input.lines())
        };

        let mut parser = OsmParser::new();
        let mut tables = OsmTables::default();
        let mut summary = ParseSummary::default();

        for (index, line) in lines.enumerate() {
            let mut line = line?;
            let line_number = index + 1;
            if line_number == 1 && line.starts_with(BYTE_ORDER_MARK) {
                line.drain(..BYTE_ORDER_MARK.len_utf8());
            }
            summary.lines_read += 1;

            let relevant = filter.as_ref().map_or(true, |filter| filter.is_match(&line));
            if line.trim().is_empty() || !relevant {
                summary.lines_skipped += 1;
                continue;
            }

            if let Err(err) = parser.parse(&line) {
                if !self.config.skip_invalid_lines {
                    return Err(format!("Line {}: {}", line_number, err).into());
                }
                let err = err.to_string();
                warn!(line = line_number, err = err.as_str(); "Skipping line that failed to parse");
                summary.lines_skipped += 1;
                continue;
            }

            if let Some(element) = parser.completed() {
                summary.count(element.kind());
                for table in &tables_selected {
                    tables.accept(*table, element)?;
                }
            }
        }
        summary.dropped = parser.dropped();

        info!(
            lines_read = summary.lines_read,
            lines_skipped = summary.lines_skipped,
            nodes = summary.nodes,
            ways = summary.ways,
            relations = summary.relations,
            dropped = summary.dropped;
            "Parsed OSM file"
        );

        Ok(Output {
            tables,
            summary,
        })
    }

    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
        for table in self.selected_tables() {
            let mut writer = BufWriter::new(File::create(dir.join(table.file_name()))?);
            match table {
                Table::Nodes => write_rows(&mut writer, &output.tables.nodes)?,
                Table::Ways => write_rows(&mut writer, &output.tables.ways)?,
                Table::Relations => write_rows(&mut writer, &output.tables.relations)?,
            }
            writer.flush()?;
        }

        // Written last: its presence marks a finished run.
        let bytes = rkyv::to_bytes::<_, 256>(&output.tables)
            .map_err(|err| format!("Could not serialize tables: {:?}", err))?;
        fs::write(Self::output_path(dir), &bytes)?;
        Ok(())
    }
}

fn open_input(path: &Path) -> Result<Box<dyn BufRead>> {
    if !path.is_file() {
        return Err(format!("Could not open {}: not a file", path.display()).into());
    }
    let file = File::open(path).map_err(|err| format!("Could not open {}: {}", path.display(), err))?;
    let file_reader = BufReader::new(file);

    if path.extension().is_some_and(|extension| extension == "xz") {
        Ok(Box::new(BufReader::new(XzDecoder::new(file_reader))))
    } else {
        Ok(Box::new(file_reader))
    }
}

fn write_rows<W: Write, T: Serialize>(writer: &mut W, rows: &[T]) -> Result<()> {
    for row in rows {
        serde_json::to_writer(&mut *writer, row)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

/// Reads back the tables archived by a finished run in `dir`.
pub fn load_cached(dir: &Path) -> Result<OsmTables> {
    let bytes = fs::read(dir.join(OUTPUT_FILE_NAME))?;
    let mut aligned = rkyv::AlignedVec::with_capacity(bytes.len());
    aligned.extend_from_slice(&bytes);

    let tables = rkyv::from_bytes::<OsmTables>(&aligned)
        .map_err(|err| format!("Could not deserialize {}: {:?}", OUTPUT_FILE_NAME, err))?;
    Ok(tables)
}
