//! # Record File Module
//!
//! Record files are represented by objects implementing the `RecordFile` trait.
//! The object type is named for the wire format it handles, e.g., `IhexFile`.
//! Each format module also defines its `Record` (one parsed line) and `Tag`
//! (the record kind, with the on-wire numeric value where the format has one).
//!
//! ## Basic Functions
//!
//! A record file owns an ordered record list and a `SparseImage`.  Parsing
//! fills the record list and projects it onto the image; serializing walks the
//! image and regenerates the records.  Between those two points the image can
//! be edited freely; the record list is flagged stale and refreshed on demand.
//!
//! ## Round Trips
//!
//! Each record preserves surrounding whitespace in its `before` and `after`
//! fields, so parse followed by serialize reproduces a well formed file byte
//! for byte.  Hex fields are canonically upper case; lower case input is
//! accepted and normalized.
//!
//! ## Format Detection
//!
//! `create_file_from_bytestream` tries each format whose extension list matches
//! (or all of them when no extension is given), accepting the first whose
//! parser takes the stream.  The raw binary type accepts anything and is
//! always tried last.

pub mod ihex;
pub mod srec;
pub mod titxt;
pub mod tek;
pub mod xtek;
pub mod mos;
pub mod ascii;
pub mod avr;
pub mod raw;

use std::str::FromStr;
use std::fmt;
use log::{info,warn};
use crate::mem::SparseImage;
use crate::{STDRESULT,DYNERR};

/// Enumerates record file errors.  The `Display` trait will print the equivalent long message.
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error("line {line}: checksum should be {expected:04X}, found {found:04X}")]
    Checksum { line: usize, expected: u32, found: u32 },
    #[error("bad {field}: {reason}")]
    Validation { field: &'static str, reason: String },
    #[error("unknown format name")]
    UnknownFormatName,
    #[error("content does not match any record format")]
    FormatMismatch,
    #[error("address does not fit the format")]
    AddressRange
}

/// Capabilities every format's record kind can answer.
/// Format specific predicates (`is_extension`, `is_start`, ...) are inherent
/// methods on the concrete tag enums.
pub trait RecordTag {
    /// does the payload carry user memory content
    fn is_data(&self) -> bool;
    /// does this record end the file
    fn is_file_termination(&self) -> bool;
}

#[derive(PartialEq,Eq,Clone,Copy,Debug)]
pub enum RecordFileType {
    Ihex,
    Srec,
    TiTxt,
    Tek,
    XTek,
    Mos,
    AsciiHex,
    Avr,
    Binary
}

/// Canonical detection order: strictest syntax first, raw binary last since
/// it accepts any stream.
pub const SNIFF_ORDER: [RecordFileType;9] = [
    RecordFileType::Ihex,
    RecordFileType::Srec,
    RecordFileType::Mos,
    RecordFileType::XTek,
    RecordFileType::Tek,
    RecordFileType::TiTxt,
    RecordFileType::Avr,
    RecordFileType::AsciiHex,
    RecordFileType::Binary
];

/// match command line argument to record file type
impl FromStr for RecordFileType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self,Self::Err> {
        match s {
            "ihex" => Ok(Self::Ihex),
            "hex" => Ok(Self::Ihex),
            "srec" => Ok(Self::Srec),
            "mot" => Ok(Self::Srec),
            "titxt" => Ok(Self::TiTxt),
            "tek" => Ok(Self::Tek),
            "xtek" => Ok(Self::XTek),
            "mos" => Ok(Self::Mos),
            "ascii" => Ok(Self::AsciiHex),
            "avr" => Ok(Self::Avr),
            "bin" => Ok(Self::Binary),
            "raw" => Ok(Self::Binary),
            _ => Err(Error::UnknownFormatName)
        }
    }
}

impl fmt::Display for RecordFileType {
    fn fmt(&self,f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ihex => write!(f,"ihex"),
            Self::Srec => write!(f,"srec"),
            Self::TiTxt => write!(f,"titxt"),
            Self::Tek => write!(f,"tek"),
            Self::XTek => write!(f,"xtek"),
            Self::Mos => write!(f,"mos"),
            Self::AsciiHex => write!(f,"ascii"),
            Self::Avr => write!(f,"avr"),
            Self::Binary => write!(f,"bin")
        }
    }
}

/// The main trait for working with any kind of record file.
/// Parsing replaces both the record list and the memory; edits go through
/// `memory_mut` and flag the record list stale; `to_bytes` refreshes stale
/// records before serializing.
pub trait RecordFile {
    fn what_am_i(&self) -> RecordFileType;
    fn file_extensions(&self) -> Vec<String>;
    /// Strict parse replacing all content.  Fails at the first malformed line.
    fn parse(&mut self,dat: &[u8]) -> STDRESULT;
    /// Parse demoting checksum and record validation problems to returned warnings.
    fn parse_lax(&mut self,dat: &[u8]) -> Result<Vec<String>,DYNERR>;
    /// Serialize to wire bytes, regenerating records first if the memory was edited.
    fn to_bytes(&mut self) -> Result<Vec<u8>,DYNERR>;
    /// Project the record list onto the memory (records are the source of truth).
    fn apply_records(&mut self) -> STDRESULT;
    /// Regenerate the record list from the memory (memory is the source of truth).
    fn update_records(&mut self) -> STDRESULT;
    /// Re-check the record side invariants, one message per violation.
    fn validate_records(&self) -> Vec<String>;
    fn memory(&self) -> &SparseImage;
    /// Mutable memory access; leaves the record list stale until `update_records`.
    fn memory_mut(&mut self) -> &mut SparseImage;
    /// Replace the memory wholesale; the record list becomes stale.
    fn set_memory(&mut self,mem: &SparseImage) -> STDRESULT;
    /// True when the record list no longer reflects the memory.
    fn is_stale(&self) -> bool;
    /// Force regeneration of the record list on the next serialize.
    fn discard_records(&mut self);
    /// Throw away memory side edits and reapply the record list.
    fn discard_memory(&mut self) -> STDRESULT;
    fn start_address(&self) -> Option<u64>;
    fn set_start_address(&mut self,addr: Option<u64>) -> STDRESULT;
    fn header(&self) -> Option<Vec<u8>>;
    fn set_header(&mut self,dat: Option<&[u8]>) -> STDRESULT;
    /// Cap on data bytes per emitted data record.
    fn max_data_len(&self) -> usize;
    fn set_max_data_len(&mut self,len: usize) -> STDRESULT;
    /// Largest address the format can represent.
    fn address_ceiling(&self) -> u64;

    // Image edits below operate on the memory and leave the records stale.

    fn crop(&mut self,start: u64,end: u64) -> STDRESULT {
        self.memory_mut().crop(start,end)
    }
    /// Hole the range.
    fn clear(&mut self,start: u64,end: u64) -> STDRESULT {
        self.memory_mut().clear(start,end)
    }
    /// Hole the range and close the gap by shifting higher addresses down.
    fn delete(&mut self,start: u64,end: u64) -> STDRESULT {
        self.memory_mut().remove(start,end)
    }
    /// Remove the range from the image and return it as a new image.
    fn cut(&mut self,start: u64,end: u64) -> Result<SparseImage,DYNERR> {
        let part = self.memory().extract(start,end)?;
        self.memory_mut().delete(start,end)?;
        Ok(part)
    }
    fn fill(&mut self,start: u64,end: u64,pattern: &[u8]) -> STDRESULT {
        self.memory_mut().fill(start,end,pattern)
    }
    fn flood(&mut self,start: u64,end: u64,pattern: &[u8]) -> STDRESULT {
        self.memory_mut().flood(start,end,pattern)
    }
    fn find(&self,pattern: &[u8],start: Option<u64>,end: Option<u64>) -> Result<u64,DYNERR> {
        self.memory().find(pattern,start,end)
    }
    fn shift(&mut self,amount: i64) -> STDRESULT {
        self.memory_mut().shift(amount)
    }
    fn align(&mut self,base: u64,fill: u8) -> STDRESULT {
        self.memory_mut().align(base,fill)
    }
    /// Write bytes at the current end of the image.
    fn append(&mut self,dat: &[u8]) -> STDRESULT {
        let at = self.memory().end().unwrap_or(0);
        self.memory_mut().write(at,dat)
    }
    /// Write another image after this one's end, leaving `gap` unpopulated
    /// addresses between them.
    fn extend(&mut self,other: &SparseImage,gap: u64) -> STDRESULT {
        let base = self.memory().end().unwrap_or(0) + gap;
        let mut shifted = other.clone();
        match other.first() {
            Some(s) if s >= base => shifted.shift(-((s - base) as i64))?,
            Some(s) => shifted.shift((base - s) as i64)?,
            None => return Ok(())
        };
        self.memory_mut().merge(&shifted)
    }
    fn merge(&mut self,other: &SparseImage) -> STDRESULT {
        self.memory_mut().merge(other)
    }
    /// Read-only window on the image.
    fn view(&self,start: u64,end: u64) -> Result<SparseImage,DYNERR> {
        self.memory().extract(start,end)
    }
    /// Cut the image along absolute address boundaries that are multiples of
    /// `size`, returning the non-empty pieces in ascending order.
    fn split(&self,size: u64) -> Result<Vec<SparseImage>,DYNERR> {
        if size == 0 {
            return Err(Box::new(crate::mem::Error::BadRange));
        }
        let mut ans: Vec<SparseImage> = Vec::new();
        let (first,end) = match (self.memory().first(),self.memory().end()) {
            (Some(s),Some(e)) => (s,e),
            _ => return Ok(ans)
        };
        let mut edge = (first / size) * size;
        while edge < end {
            let stop = edge.saturating_add(size);
            let piece = self.memory().extract(edge,stop)?;
            if !piece.is_empty() {
                ans.push(piece);
            }
            if stop == u64::MAX {
                break;
            }
            edge = stop;
        }
        Ok(ans)
    }
    /// Display the image to stdout in the standard address/hex/ascii table.
    fn print(&self) {
        crate::display_image(self.memory());
    }
}

/// Canonical extension list for a format, lower case, no dots.
pub fn file_extensions(typ: RecordFileType) -> Vec<String> {
    let exts: &[&str] = match typ {
        RecordFileType::Ihex => &["hex","ihex","ihx","mcs"],
        RecordFileType::Srec => &["srec","mot","s19","s28","s37"],
        RecordFileType::TiTxt => &["txt","titxt"],
        RecordFileType::Tek => &["tek"],
        RecordFileType::XTek => &["xtek"],
        RecordFileType::Mos => &["mos"],
        RecordFileType::AsciiHex => &["ahex","ahx"],
        RecordFileType::Avr => &["avr"],
        RecordFileType::Binary => &["bin","raw","dat"]
    };
    exts.iter().map(|x| x.to_string()).collect()
}

/// Create an empty file of the given type with format defaults.
pub fn create_file(typ: RecordFileType) -> Box<dyn RecordFile> {
    match typ {
        RecordFileType::Ihex => Box::new(ihex::IhexFile::new()),
        RecordFileType::Srec => Box::new(srec::SrecFile::new()),
        RecordFileType::TiTxt => Box::new(titxt::TiTxtFile::new()),
        RecordFileType::Tek => Box::new(tek::TekFile::new()),
        RecordFileType::XTek => Box::new(xtek::XTekFile::new()),
        RecordFileType::Mos => Box::new(mos::MosFile::new()),
        RecordFileType::AsciiHex => Box::new(ascii::AsciiHexFile::new()),
        RecordFileType::Avr => Box::new(avr::AvrFile::new()),
        RecordFileType::Binary => Box::new(raw::BinaryFile::new())
    }
}

/// Given a bytestream return a record file, or Err if the bytestream cannot
/// be interpreted.  Optional `maybe_ext` restricts the types that will be
/// tried based on file extension.
pub fn create_file_from_bytestream(dat: &[u8],maybe_ext: Option<&str>) -> Result<Box<dyn RecordFile>,DYNERR> {
    let ext = match maybe_ext {
        Some(x) => x.to_string().to_lowercase(),
        None => "".to_string()
    };
    for typ in SNIFF_ORDER {
        if file_extensions(typ).contains(&ext) || ext == "" {
            let mut file = create_file(typ);
            match file.parse(dat) {
                Ok(()) => {
                    info!("identified {} content",typ);
                    return Ok(file);
                },
                Err(e) => {
                    log::debug!("not {}: {}",typ,e);
                }
            }
        }
    }
    warn!("cannot match any record format");
    Err(Box::new(Error::FormatMismatch))
}

/// Does any format claim this extension (lower case, no dot).
pub fn is_known_extension(ext: &str) -> bool {
    let ext = ext.to_lowercase();
    SNIFF_ORDER.iter().any(|typ| file_extensions(*typ).contains(&ext))
}

/// Best guess at the type for a path, first by extension, then by trying the
/// candidate parsers on the content.  An extension no format claims does not
/// restrict the candidates.
pub fn guess_file_type(path: &str) -> Result<RecordFileType,DYNERR> {
    let mut maybe_ext = path.split('.').last();
    if let Some(ext) = maybe_ext {
        if !is_known_extension(ext) {
            maybe_ext = None;
        }
    }
    let dat = std::fs::read(path)?;
    let file = create_file_from_bytestream(&dat,maybe_ext)?;
    Ok(file.what_am_i())
}

// Shared line plumbing used by the per-format parsers.

/// Split a buffer into physical lines, the terminator staying with its line.
/// The last line may lack a terminator.
pub(crate) fn split_lines(dat: &[u8]) -> Vec<&[u8]> {
    let mut ans: Vec<&[u8]> = Vec::new();
    let mut beg = 0;
    for i in 0..dat.len() {
        if dat[i] == b'\n' {
            ans.push(&dat[beg..i+1]);
            beg = i + 1;
        }
    }
    if beg < dat.len() {
        ans.push(&dat[beg..]);
    }
    ans
}

/// Separate a line into (before,body,after), `before` being leading ascii
/// whitespace and `after` trailing whitespace including the terminator.
pub(crate) fn trim_line(line: &[u8]) -> (&[u8],&[u8],&[u8]) {
    let mut beg = 0;
    while beg < line.len() && line[beg].is_ascii_whitespace() {
        beg += 1;
    }
    let mut end = line.len();
    while end > beg && line[end-1].is_ascii_whitespace() {
        end -= 1;
    }
    (&line[..beg],&line[beg..end],&line[end..])
}

/// Interpret a record body as text, erroring on non-ascii content.
pub(crate) fn body_str(line_num: usize,body: &[u8]) -> Result<&str,Error> {
    match std::str::from_utf8(body) {
        Ok(s) if s.is_ascii() => Ok(s),
        _ => Err(Error::Parse { line: line_num, reason: "record contains non-ascii bytes".to_string() })
    }
}

/// Decode a 2 hex digit field.
pub(crate) fn hex_u8(line_num: usize,txt: &str) -> Result<u8,Error> {
    match u8::from_str_radix(txt,16) {
        Ok(v) => Ok(v),
        Err(_) => Err(Error::Parse { line: line_num, reason: format!("bad hex field `{}`",txt) })
    }
}

/// Decode a hex field of up to 16 digits.
pub(crate) fn hex_u64(line_num: usize,txt: &str) -> Result<u64,Error> {
    match u64::from_str_radix(txt,16) {
        Ok(v) => Ok(v),
        Err(_) => Err(Error::Parse { line: line_num, reason: format!("bad hex field `{}`",txt) })
    }
}

/// Decode a run of hex digit pairs.
pub(crate) fn hex_bytes(line_num: usize,txt: &str) -> Result<Vec<u8>,Error> {
    match hex::decode(txt) {
        Ok(v) => Ok(v),
        Err(_) => Err(Error::Parse { line: line_num, reason: format!("bad hex data `{}`",txt) })
    }
}

/// Sum of the hex digit values in the text, used by the Tektronix checksums.
pub(crate) fn hex_digit_sum(txt: &str) -> u32 {
    let mut ans: u32 = 0;
    for c in txt.chars() {
        if let Some(v) = c.to_digit(16) {
            ans += v;
        }
    }
    ans
}

#[test]
fn line_splitting() {
    let dat = b"abc\r\ndef\nno-term";
    let lines = split_lines(dat);
    assert_eq!(lines.len(),3);
    assert_eq!(lines[0],b"abc\r\n");
    assert_eq!(lines[1],b"def\n");
    assert_eq!(lines[2],b"no-term");
    let (before,body,after) = trim_line(lines[0]);
    assert_eq!(before,b"");
    assert_eq!(body,b"abc");
    assert_eq!(after,b"\r\n");
}

#[test]
fn digit_sums() {
    assert_eq!(hex_digit_sum("FF00"),30);
    assert_eq!(hex_digit_sum("1234"),10);
}

#[test]
fn image_edits_through_the_trait() {
    let mut f: Box<dyn RecordFile> = create_file(RecordFileType::Ihex);
    f.memory_mut().write(0x100,&[1,2,3,4]).expect("write failed");
    assert!(f.is_stale());
    f.append(&[5,6]).expect("append failed");
    assert_eq!(f.memory().end(),Some(0x106));
    let tail = SparseImage::from_buffer(0,&[9]);
    f.extend(&tail,2).expect("extend failed");
    assert_eq!(f.memory().read(0x108,0x109,None).expect("hole"),vec![9]);
    let part = f.cut(0x102,0x104).expect("cut failed");
    assert_eq!(part.read(0x102,0x104,None).expect("hole"),vec![3,4]);
    assert!(f.memory().read(0x102,0x104,None).is_err());
    f.update_records().expect("update failed");
    assert!(!f.is_stale());
}

#[test]
fn split_cuts_at_absolute_boundaries() {
    let mut f: Box<dyn RecordFile> = create_file(RecordFileType::Srec);
    f.memory_mut().write(0xf0,&[0xaa;0x20]).expect("write failed");
    let pieces = f.split(0x100).expect("split failed");
    assert_eq!(pieces.len(),2);
    assert_eq!((pieces[0].first(),pieces[0].end()),(Some(0xf0),Some(0x100)));
    assert_eq!((pieces[1].first(),pieces[1].end()),(Some(0x100),Some(0x110)));
}
