//! Image display shells: a colored address/hex/ascii table, plus `xxd` and
//! `hexdump -C` lookalikes.  All three render only the populated rows, so a
//! sparse image with a big hole does not scroll a screenful of padding.

use clap;
use colored::Colorize;
use crate::mem::SparseImage;
use crate::rec::RecordFile;
use crate::{STDRESULT,DYNERR};

/// The image clipped to the requested range, or the whole image.
fn ranged(cmd: &clap::ArgMatches,file: &Box<dyn RecordFile>) -> Result<SparseImage,DYNERR> {
    match (super::get_addr(cmd,"start")?,super::get_addr(cmd,"end")?) {
        (Some(s),Some(e)) => file.view(s,e),
        (None,None) => Ok(file.memory().clone()),
        _ => {
            log::error!("give both ends of the range, or neither");
            Err(Box::new(super::CommandError::InvalidCommand))
        }
    }
}

/// Ascending 16 byte row addresses that contain at least one populated byte.
fn rows(img: &SparseImage) -> Vec<u64> {
    let mut ans: Vec<u64> = Vec::new();
    for (start,dat) in img.blocks() {
        let mut row = (start / 16) * 16;
        let end = start + dat.len() as u64;
        while row < end {
            if ans.last() != Some(&row) {
                ans.push(row);
            }
            row = row.saturating_add(16);
            if row == u64::MAX {
                break;
            }
        }
    }
    ans
}

/// One row of the image as 16 optional bytes.
fn row_cells(img: &SparseImage,row: u64) -> [Option<u8>;16] {
    let mut cells = [None;16];
    if let Ok(piece) = img.extract(row,row.saturating_add(16)) {
        for (s,d) in piece.blocks() {
            for (k,b) in d.iter().enumerate() {
                cells[(s - row) as usize + k] = Some(*b);
            }
        }
    }
    cells
}

fn ascii_cell(cell: Option<u8>) -> char {
    match cell {
        Some(b) if b >= 32 && b < 127 => b as char,
        Some(_) => '.',
        None => ' '
    }
}

/// Address/hex/ascii table with a colored address column on a terminal.
pub fn print(cmd: &clap::ArgMatches) -> STDRESULT {
    let file = super::load_input(cmd)?;
    let img = ranged(cmd,&file)?;
    let color = atty::is(atty::Stream::Stdout);
    for row in rows(&img) {
        let cells = row_cells(&img,row);
        let addr = format!("{:08X}",row);
        match color {
            true => print!("{} : ",addr.cyan()),
            false => print!("{} : ",addr)
        };
        for cell in cells {
            match cell {
                Some(b) => print!("{:02X} ",b),
                None => print!("   ")
            };
        }
        let txt: String = cells.iter().map(|c| ascii_cell(*c)).collect();
        println!("| {}",txt);
    }
    Ok(())
}

/// The classic xxd layout: byte pairs in groups of two, lower case hex.
pub fn xxd(cmd: &clap::ArgMatches) -> STDRESULT {
    let file = super::load_input(cmd)?;
    let img = ranged(cmd,&file)?;
    for row in rows(&img) {
        let cells = row_cells(&img,row);
        print!("{:08x}: ",row);
        for (i,cell) in cells.iter().enumerate() {
            match cell {
                Some(b) => print!("{:02x}",b),
                None => print!("  ")
            };
            if i % 2 == 1 {
                print!(" ");
            }
        }
        let txt: String = cells.iter().map(|c| ascii_cell(*c)).collect();
        println!(" {}",txt);
    }
    Ok(())
}

/// The `hexdump -C` layout: single bytes with a mid-row gap, ascii in pipes.
pub fn hexdump(cmd: &clap::ArgMatches) -> STDRESULT {
    let file = super::load_input(cmd)?;
    let img = ranged(cmd,&file)?;
    let mut last_end: Option<u64> = None;
    for row in rows(&img) {
        let cells = row_cells(&img,row);
        if let Some(e) = last_end {
            if e != row {
                println!("*");
            }
        }
        print!("{:08x}  ",row);
        for (i,cell) in cells.iter().enumerate() {
            match cell {
                Some(b) => print!("{:02x} ",b),
                None => print!("   ")
            };
            if i == 7 {
                print!(" ");
            }
        }
        let txt: String = cells.iter().map(|c| ascii_cell(*c)).collect();
        println!(" |{}|",txt.trim_end());
        last_end = Some(row.saturating_add(16));
    }
    if let Some(e) = last_end {
        println!("{:08x}",e);
    }
    Ok(())
}
