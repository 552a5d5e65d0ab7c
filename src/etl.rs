pub mod parse_osm;

use std::path::Path;
use log::{info, error};

use crate::errors::Result;


pub trait Etl {
    type Input;
    type Output;

    fn etl_name(&self) -> &str;

    fn is_cached(&self, dir: &Path) -> Result<bool>;
    fn clean(&self, dir: &Path) -> Result<()>;

    fn extract(&mut self) -> Result<Self::Input>;
    fn transform(&mut self, input: Self::Input) -> Result<Self::Output>;
    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()>;

    /// Runs extract, transform and load unless `dir` already holds the output.
    /// With `clean`, any previous output is removed first.
    fn process(&mut self, dir: &Path, clean: bool) -> Result<()> {
        let etl_name = self.etl_name().to_string();
        info!(etl_name = etl_name.as_str(); "Starting ETL process");

        if clean && self.is_cached(dir)? {
            info!(etl_name = etl_name.as_str(); "Removing cached output");
            self.clean(dir)?;
        }

        if self.is_cached(dir)? {
            info!(etl_name = etl_name.as_str(); "Using cached value");
        } else {
            let input = stage(&etl_name, "extract", || self.extract())?;
            let output = stage(&etl_name, "transform", || self.transform(input))?;
            stage(&etl_name, "load", || self.load(dir, output))?;
        }
        info!(etl_name = etl_name.as_str(); "Process finished");
        Ok(())
    }
}

fn stage<T>(etl_name: &str, stage: &str, run: impl FnOnce() -> Result<T>) -> Result<T> {
    info!(etl_name = etl_name, stage = stage; "Running stage");
    run().map_err(|err| {
        error!(etl_name = etl_name, stage = stage, err = err.message.as_str(); "Stage failed with error");
        err
    })
}
