use clap;
use std::str::FromStr;
use crate::rec;
use crate::rec::{RecordFile,RecordFileType};
use crate::STDRESULT;

/// Check every record level invariant, reporting all problems rather than
/// stopping at the first.  Structural damage that defeats even the lax
/// parser still errors out immediately.
pub fn validate(cmd: &clap::ArgMatches) -> STDRESULT {
    let dat = super::read_input(cmd)?;
    let typ = match cmd.get_one::<String>("iformat") {
        Some(fmt) => RecordFileType::from_str(fmt)?,
        None => {
            // detection needs a clean parse, so a broken file wants `-i`
            let probe = rec::create_file_from_bytestream(&dat,None)?;
            probe.what_am_i()
        }
    };
    let mut file = rec::create_file(typ);
    let mut problems = file.parse_lax(&dat)?;
    problems.append(&mut file.validate_records());
    if problems.is_empty() {
        eprintln!("Passing");
        return Ok(());
    }
    for p in &problems {
        eprintln!("{}",p);
    }
    Err(Box::new(rec::Error::Validation { field: "records", reason: format!("{} problems",problems.len()) }))
}
