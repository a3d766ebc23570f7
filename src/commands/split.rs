use clap;
use std::str::FromStr;
use log::info;
use crate::rec;
use crate::rec::{RecordFile,RecordFileType};
use crate::STDRESULT;

/// `out.hex` becomes `out.0.hex`, `out.1.hex`, ...; a path without an
/// extension just gets the index appended.
fn numbered_path(dest: &str,idx: usize) -> String {
    match dest.rsplit_once('.') {
        Some((stem,ext)) => format!("{}.{}.{}",stem,idx,ext),
        None => format!("{}.{}",dest,idx)
    }
}

/// Cut the image along address boundaries that are multiples of the given
/// size and write each non-empty piece to its own numbered file.
pub fn split(cmd: &clap::ArgMatches) -> STDRESULT {
    let file = super::load_input(cmd)?;
    let size = match cmd.get_one::<String>("value") {
        Some(v) => super::parse_u64(v)?,
        None => {
            log::error!("split needs a piece size in `--value`");
            return Err(Box::new(super::CommandError::InvalidCommand));
        }
    };
    let dest = match cmd.get_one::<String>("dest") {
        Some(p) if p != "-" => p.clone(),
        _ => {
            log::error!("split writes multiple files and needs a destination path");
            return Err(Box::new(super::CommandError::InvalidCommand));
        }
    };
    let typ = match cmd.get_one::<String>("oformat") {
        Some(fmt) => RecordFileType::from_str(fmt)?,
        None => file.what_am_i()
    };
    let pieces = file.split(size)?;
    for (idx,piece) in pieces.iter().enumerate() {
        let mut out = rec::create_file(typ);
        out.set_memory(piece)?;
        let dat = out.to_bytes()?;
        let path = numbered_path(&dest,idx);
        std::fs::write(&path,dat)?;
        info!("wrote {}",path);
    }
    println!("{} pieces",pieces.len());
    Ok(())
}
