//! # `hexkit` main library
//!
//! This library manipulates the hexadecimal record files used to carry
//! firmware and configuration images: Intel HEX, Motorola S-record, TI-TXT,
//! Tektronix standard and extended, MOS Technology, ASCII-hex, AVR generic,
//! and raw binary.
//!
//! ## Architecture
//!
//! Operations are built around two layers:
//! * `mem::SparseImage` stores possibly non-contiguous bytes keyed by address,
//!   and supports range reads, writes, fills, floods, crops, merges, and more
//! * `rec::RecordFile` is the trait object for one file of some wire format;
//!   it owns a record list and a `SparseImage` and keeps the two in sync
//!
//! Parsing a file projects its records onto the sparse image.  Edits go
//! through the image and flag the records stale; serializing regenerates
//! them.  Converting between formats is therefore just handing one file's
//! image to another file type.
//!
//! ## Formats
//!
//! Each format lives in a submodule of `rec` and supplies its `Tag`,
//! `Record`, and `RecordFile` implementation.  Detection works from the file
//! extension when there is one, falling back to trying each parser against
//! the content.

pub mod mem;
pub mod rec;
pub mod commands;

use std::io::Read;
use log::{info,debug};
use rec::{RecordFile,RecordFileType};
use mem::SparseImage;

type DYNERR = Box<dyn std::error::Error>;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

const KNOWN_FILE_EXTENSIONS: &str = "hex,ihex,ihx,mcs,srec,mot,s19,s28,s37,txt,titxt,tek,xtek,mos,ahex,ahx,avr,bin,raw,dat";

/// Save the record file (make changes permanent).  Stale records are
/// regenerated from the memory first.
pub fn save(file: &mut Box<dyn RecordFile>,path: &str) -> STDRESULT {
    let dat = file.to_bytes()?;
    std::fs::write(path,dat)?;
    Ok(())
}

/// Given a bytestream return a record file, or Err if the bytestream cannot
/// be interpreted.  Optional `maybe_ext` restricts the types that will be
/// tried based on file extension.
pub fn load_bytes(dat: &[u8],maybe_ext: Option<&str>) -> Result<Box<dyn RecordFile>,DYNERR> {
    rec::create_file_from_bytestream(dat,maybe_ext)
}

/// Calls `load_bytes` getting the bytes from a file.
/// File extension will be used to restrict the types that are tried,
/// unless the extension is unknown, in which case all will be tried.
pub fn load(path: &str) -> Result<Box<dyn RecordFile>,DYNERR> {
    let dat = std::fs::read(path)?;
    let mut maybe_ext = path.split('.').last();
    if let Some(ext) = maybe_ext {
        if !KNOWN_FILE_EXTENSIONS.contains(&ext.to_lowercase()) {
            maybe_ext = None;
        }
    }
    load_bytes(&dat,maybe_ext)
}

/// Calls `load_bytes` getting the bytes from stdin.
/// All types will be tried heuristically.
pub fn load_stdin() -> Result<Box<dyn RecordFile>,DYNERR> {
    let mut dat = Vec::new();
    std::io::stdin().read_to_end(&mut dat)?;
    load_bytes(&dat,None)
}

/// Parse a file as a specific type, no detection.
pub fn load_as(path: &str,typ: RecordFileType) -> Result<Box<dyn RecordFile>,DYNERR> {
    let dat = std::fs::read(path)?;
    let mut file = rec::create_file(typ);
    file.parse(&dat)?;
    Ok(file)
}

/// Best guess at the canonical format name for a path, first by extension,
/// then by trying the candidate parsers on the content.
pub fn guess_format_name(path: &str) -> Result<String,DYNERR> {
    let typ = rec::guess_file_type(path)?;
    Ok(typ.to_string())
}

/// Re-express a record file in another format.  The memory, start address,
/// and header travel as far as the target format can carry them.
pub fn convert(src: &Box<dyn RecordFile>,typ: RecordFileType) -> Result<Box<dyn RecordFile>,DYNERR> {
    let mut dst = rec::create_file(typ);
    dst.set_memory(src.memory())?;
    if let Some(addr) = src.start_address() {
        if dst.set_start_address(Some(addr)).is_err() {
            debug!("target format drops the start address");
        }
    }
    if let Some(hdr) = src.header() {
        if dst.set_header(Some(&hdr)).is_err() {
            debug!("target format drops the header");
        }
    }
    dst.update_records()?;
    info!("converted {} to {}",src.what_am_i(),typ);
    Ok(dst)
}

/// Merge any number of record files into one image of the given format.
/// Later sources win where addresses overlap.
pub fn merge(sources: &[Box<dyn RecordFile>],typ: RecordFileType) -> Result<Box<dyn RecordFile>,DYNERR> {
    let mut merged = SparseImage::new();
    let mut start: Option<u64> = None;
    let mut header: Option<Vec<u8>> = None;
    for src in sources {
        merged.merge(src.memory())?;
        if src.start_address().is_some() {
            start = src.start_address();
        }
        if src.header().is_some() {
            header = src.header();
        }
    }
    let mut dst = rec::create_file(typ);
    dst.set_memory(&merged)?;
    if start.is_some() && dst.set_start_address(start).is_err() {
        debug!("target format drops the start address");
    }
    if header.is_some() && dst.set_header(header.as_deref()).is_err() {
        debug!("target format drops the header");
    }
    dst.update_records()?;
    Ok(dst)
}

/// Display binary to stdout in columns of hex and ascii
pub fn display_block(start_addr: u64,block: &[u8]) {
    let mut slice_start = 0;
    loop {
        let row_label = start_addr + slice_start as u64;
        let mut slice_end = slice_start + 16;
        if slice_end > block.len() {
            slice_end = block.len();
        }
        let slice = &block[slice_start..slice_end];
        let txt: Vec<u8> = slice.iter().map(|c| match *c {
            x if x < 32 => '.' as u8,
            x if x < 127 => x,
            _ => '.' as u8
        }).collect();
        print!("{:08X} : ",row_label);
        for byte in slice {
            print!("{:02X} ",byte);
        }
        for _blank in slice_end..slice_start+16 {
            print!("   ");
        }
        println!("| {}",String::from_utf8_lossy(&txt));
        slice_start += 16;
        if slice_end == block.len() {
            break;
        }
    }
}

/// Display every populated block of an image, one table per block.
pub fn display_image(img: &SparseImage) {
    for (start,dat) in img.blocks() {
        display_block(start,dat);
    }
}

#[test]
fn convert_round_trip_preserves_memory() {
    use crate::rec::RecordFileType::*;
    let mut src = rec::create_file(Ihex);
    src.memory_mut().write(0x8000,&[1,2,3,4,5]).expect("write failed");
    src.memory_mut().write(0x8100,&[9]).expect("write failed");
    src.set_start_address(Some(0x8000)).expect("start refused");
    for typ in [Srec,TiTxt,XTek,AsciiHex] {
        let there = convert(&src,typ).expect("convert failed");
        let back = convert(&there,Ihex).expect("convert failed");
        assert_eq!(back.memory(),src.memory());
    }
    // formats with a start address carry it across
    let there = convert(&src,Srec).expect("convert failed");
    assert_eq!(there.start_address(),Some(0x8000));
}

#[test]
fn merge_last_source_wins() {
    use crate::rec::RecordFileType::*;
    let mut a = rec::create_file(TiTxt);
    a.memory_mut().write(0xf000,&[0xaa,0xbb]).expect("write failed");
    let mut b = rec::create_file(TiTxt);
    b.memory_mut().write(0xf002,&[0xcc,0xdd]).expect("write failed");
    let mut merged = merge(&[a,b],TiTxt).expect("merge failed");
    assert_eq!(merged.to_bytes().expect("serialize failed"),b"@F000\nAA BB CC DD\nq\n".to_vec());
}

#[test]
fn guessing_survives_unclaimed_extensions() {
    let dir = tempfile::tempdir().expect("no temp dir");
    // no dot at all, and an extension no format claims: both must fall
    // back to content sniffing
    for name in ["firmware","fw.img"] {
        let path = dir.path().join(name);
        std::fs::write(&path,":0100000041BE\r\n:00000001FF\r\n").expect("write failed");
        assert_eq!(guess_format_name(path.to_str().unwrap()).expect("guess failed"),"ihex");
    }
    let path = dir.path().join("image.mot");
    std::fs::write(&path,"S0030000FC\r\nS9030000FC\r\n").expect("write failed");
    assert_eq!(guess_format_name(path.to_str().unwrap()).expect("guess failed"),"srec");
}

#[test]
fn sniffing_identifies_formats() {
    let cases: Vec<(&[u8],&str)> = vec![
        (b":00000001FF\r\n","ihex"),
        (b"S0030000FC\r\nS9030000FC\r\n","srec"),
        (b"@F000\nAA\nq\n","titxt"),
        (b";0000000000\n","mos"),
        (b"000000:940C\n","avr")
    ];
    for (dat,name) in cases {
        let file = load_bytes(dat,None).expect("sniff failed");
        assert_eq!(file.what_am_i().to_string(),name);
    }
    // anything at all is acceptable raw binary
    let file = load_bytes(b"\x00\x01\x02",None).expect("sniff failed");
    assert_eq!(file.what_am_i().to_string(),"bin");
}
