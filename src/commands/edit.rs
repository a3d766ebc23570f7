//! Range edits on one image: every function here loads the input, applies a
//! single memory operation, and hands off to the shared output path, so an
//! edit can change formats in the same breath via `--output-format`.

use clap;
use crate::rec::RecordFile;
use crate::STDRESULT;

pub fn crop(cmd: &clap::ArgMatches) -> STDRESULT {
    let mut file = super::load_input(cmd)?;
    let (start,end) = super::get_range(cmd)?;
    file.crop(start,end)?;
    super::finish(cmd,file)
}

/// Keep the range, discard the rest, output the kept part.
pub fn cut(cmd: &clap::ArgMatches) -> STDRESULT {
    let mut file = super::load_input(cmd)?;
    let (start,end) = super::get_range(cmd)?;
    let part = file.cut(start,end)?;
    file.set_memory(&part)?;
    super::finish(cmd,file)
}

/// Hole the range, leaving addresses outside it alone.
pub fn clear(cmd: &clap::ArgMatches) -> STDRESULT {
    let mut file = super::load_input(cmd)?;
    let (start,end) = super::get_range(cmd)?;
    file.clear(start,end)?;
    super::finish(cmd,file)
}

/// Hole the range and shift higher addresses down over it.
pub fn delete(cmd: &clap::ArgMatches) -> STDRESULT {
    let mut file = super::load_input(cmd)?;
    let (start,end) = super::get_range(cmd)?;
    file.delete(start,end)?;
    super::finish(cmd,file)
}

pub fn fill(cmd: &clap::ArgMatches) -> STDRESULT {
    let mut file = super::load_input(cmd)?;
    let (start,end) = super::get_range(cmd)?;
    let pattern = match cmd.get_one::<String>("value") {
        Some(v) => super::parse_bytes(v)?,
        None => {
            log::error!("fill needs a byte pattern in `--value`");
            return Err(Box::new(super::CommandError::InvalidCommand));
        }
    };
    file.fill(start,end,&pattern)?;
    super::finish(cmd,file)
}

pub fn flood(cmd: &clap::ArgMatches) -> STDRESULT {
    let mut file = super::load_input(cmd)?;
    let (start,end) = super::get_range(cmd)?;
    let pattern = match cmd.get_one::<String>("value") {
        Some(v) => super::parse_bytes(v)?,
        None => {
            log::error!("flood needs a byte pattern in `--value`");
            return Err(Box::new(super::CommandError::InvalidCommand));
        }
    };
    file.flood(start,end,&pattern)?;
    super::finish(cmd,file)
}

pub fn shift(cmd: &clap::ArgMatches) -> STDRESULT {
    let mut file = super::load_input(cmd)?;
    let amount = match cmd.get_one::<String>("value") {
        Some(v) => super::parse_i64(v)?,
        None => {
            log::error!("shift needs a displacement in `--value`");
            return Err(Box::new(super::CommandError::InvalidCommand));
        }
    };
    file.shift(amount)?;
    super::finish(cmd,file)
}

pub fn align(cmd: &clap::ArgMatches) -> STDRESULT {
    let mut file = super::load_input(cmd)?;
    let base = match cmd.get_one::<String>("value") {
        Some(v) => super::parse_u64(v)?,
        None => {
            log::error!("align needs a base in `--value`");
            return Err(Box::new(super::CommandError::InvalidCommand));
        }
    };
    let fill = match cmd.get_one::<String>("fill") {
        Some(v) => {
            let bytes = super::parse_bytes(v)?;
            if bytes.len() != 1 {
                log::error!("the alignment fill must be a single byte");
                return Err(Box::new(super::CommandError::OutOfRange));
            }
            bytes[0]
        },
        None => 0x00
    };
    file.align(base,fill)?;
    super::finish(cmd,file)
}

/// Print the address of the first match of the byte pattern.
pub fn find(cmd: &clap::ArgMatches) -> STDRESULT {
    let file = super::load_input(cmd)?;
    let pattern = match cmd.get_one::<String>("value") {
        Some(v) => super::parse_bytes(v)?,
        None => {
            log::error!("find needs a byte pattern in `--value`");
            return Err(Box::new(super::CommandError::InvalidCommand));
        }
    };
    let addr = file.find(&pattern,super::get_addr(cmd,"start")?,super::get_addr(cmd,"end")?)?;
    println!("{:#x}",addr);
    Ok(())
}
