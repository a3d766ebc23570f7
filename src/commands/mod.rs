//! # CLI Subcommands
//!
//! Contains modules that run the subcommands.  Shared plumbing for reading
//! the input stream, picking formats, and writing the result lives here.

pub mod convert;
pub mod merge;
pub mod edit;
pub mod split;
pub mod validate;
pub mod print;
pub mod completions;

use std::io::{Read,Write};
use std::str::FromStr;
use crate::rec;
use crate::rec::{RecordFile,RecordFileType};
use crate::{DYNERR,STDRESULT};

#[derive(thiserror::Error,Debug)]
pub enum CommandError {
    #[error("Command could not be interpreted")]
    InvalidCommand,
    #[error("One of the parameters was out of range")]
    OutOfRange
}

/// Parse a number accepting decimal or a 0x/0o/0b prefix.
pub fn parse_u64(s: &str) -> Result<u64,DYNERR> {
    let s = s.trim();
    let ans = match s.get(..2) {
        Some("0x") | Some("0X") => u64::from_str_radix(&s[2..],16),
        Some("0o") | Some("0O") => u64::from_str_radix(&s[2..],8),
        Some("0b") | Some("0B") => u64::from_str_radix(&s[2..],2),
        _ => u64::from_str(s)
    };
    match ans {
        Ok(v) => Ok(v),
        Err(_) => {
            log::error!("could not interpret `{}` as a number",s);
            Err(Box::new(CommandError::OutOfRange))
        }
    }
}

/// Like `parse_u64` with an optional leading minus sign.
pub fn parse_i64(s: &str) -> Result<i64,DYNERR> {
    let s = s.trim();
    let (mag,sign) = match s.strip_prefix('-') {
        Some(rest) => (parse_u64(rest)?,-1),
        None => (parse_u64(s)?,1)
    };
    match i64::try_from(mag) {
        Ok(v) => Ok(sign * v),
        Err(_) => {
            log::error!("`{}` does not fit a signed offset",s);
            Err(Box::new(CommandError::OutOfRange))
        }
    }
}

/// Parse a hex byte string such as `FF` or `DEADBEEF`, 0x prefix tolerated.
pub fn parse_bytes(s: &str) -> Result<Vec<u8>,DYNERR> {
    let digits = s.trim().trim_start_matches("0x").trim_start_matches("0X");
    match hex::decode(digits) {
        Ok(v) if v.len() > 0 => Ok(v),
        _ => {
            log::error!("could not interpret `{}` as hex bytes",s);
            Err(Box::new(CommandError::OutOfRange))
        }
    }
}

pub fn get_addr(cmd: &clap::ArgMatches,key: &str) -> Result<Option<u64>,DYNERR> {
    match cmd.get_one::<String>(key) {
        Some(s) => Ok(Some(parse_u64(s)?)),
        None => Ok(None)
    }
}

/// Both ends of the range are demanded.
pub fn get_range(cmd: &clap::ArgMatches) -> Result<(u64,u64),DYNERR> {
    match (get_addr(cmd,"start")?,get_addr(cmd,"end")?) {
        (Some(s),Some(e)) => Ok((s,e)),
        _ => {
            log::error!("this command needs both `--start` and `--end`");
            Err(Box::new(CommandError::InvalidCommand))
        }
    }
}

/// Bytes from the input path, or from stdin when the path is `-` or absent.
pub fn read_input(cmd: &clap::ArgMatches) -> Result<Vec<u8>,DYNERR> {
    match cmd.get_one::<String>("input") {
        Some(path) if path != "-" => Ok(std::fs::read(path)?),
        _ => {
            if atty::is(atty::Stream::Stdin) {
                log::error!("cannot use console input, please pipe something in or give a path");
                return Err(Box::new(CommandError::InvalidCommand));
            }
            let mut dat = Vec::new();
            std::io::stdin().read_to_end(&mut dat)?;
            Ok(dat)
        }
    }
}

/// Extension of the input path, if a usable one was given.  An extension no
/// format claims must not restrict detection, so it is dropped here.
fn input_ext(cmd: &clap::ArgMatches) -> Option<String> {
    match cmd.get_one::<String>("input") {
        Some(path) if path != "-" => match path.split('.').last() {
            Some(ext) if rec::is_known_extension(ext) => Some(ext.to_string()),
            _ => None
        },
        _ => None
    }
}

/// Load the input as a record file, honoring `--input-format` if present,
/// otherwise detecting from extension and content.
pub fn load_input(cmd: &clap::ArgMatches) -> Result<Box<dyn RecordFile>,DYNERR> {
    let dat = read_input(cmd)?;
    match cmd.get_one::<String>("iformat") {
        Some(fmt) => {
            let mut file = rec::create_file(RecordFileType::from_str(fmt)?);
            file.parse(&dat)?;
            Ok(file)
        },
        None => rec::create_file_from_bytestream(&dat,input_ext(cmd).as_deref())
    }
}

/// Write wire bytes to the destination path, or stdout when it is `-` or absent.
pub fn write_output(cmd: &clap::ArgMatches,dat: &[u8]) -> STDRESULT {
    match cmd.get_one::<String>("dest") {
        Some(path) if path != "-" => {
            std::fs::write(path,dat)?;
            Ok(())
        },
        _ => {
            std::io::stdout().write_all(dat)?;
            Ok(())
        }
    }
}

/// Serialize the file, converting first if `--output-format` asks for a
/// different format, and write it to the destination.
pub fn finish(cmd: &clap::ArgMatches,file: Box<dyn RecordFile>) -> STDRESULT {
    let mut file = match cmd.get_one::<String>("oformat") {
        Some(fmt) => {
            let typ = RecordFileType::from_str(fmt)?;
            match typ == file.what_am_i() {
                true => file,
                false => crate::convert(&file,typ)?
            }
        },
        None => file
    };
    let dat = file.to_bytes()?;
    write_output(cmd,&dat)
}
