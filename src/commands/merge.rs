use clap;
use std::str::FromStr;
use crate::rec::{RecordFile,RecordFileType};
use crate::STDRESULT;

/// Merge every input into one image.  Later inputs win where they overlap.
/// The output format comes from `--output-format`, defaulting to the format
/// of the first input.
pub fn merge(cmd: &clap::ArgMatches) -> STDRESULT {
    let paths: Vec<&String> = match cmd.get_many::<String>("inputs") {
        Some(vals) => vals.collect(),
        None => Vec::new()
    };
    if paths.len() < 2 {
        log::error!("merge wants at least two inputs");
        return Err(Box::new(super::CommandError::InvalidCommand));
    }
    let mut sources: Vec<Box<dyn RecordFile>> = Vec::new();
    for path in &paths {
        sources.push(match path.as_str() {
            "-" => crate::load_stdin()?,
            p => crate::load(p)?
        });
    }
    let typ = match cmd.get_one::<String>("oformat") {
        Some(fmt) => RecordFileType::from_str(fmt)?,
        None => sources[0].what_am_i()
    };
    let mut merged = crate::merge(&sources,typ)?;
    let dat = merged.to_bytes()?;
    super::write_output(cmd,&dat)
}
