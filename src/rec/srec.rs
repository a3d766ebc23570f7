//! # Support for Motorola S-record files
//!
//! Every record is one line `SNCCAA..DD..KK`.  The digit `N` selects the
//! record kind and, for data and start records, the address width: S1/S2/S3
//! carry data behind 16/24/32 bit addresses, S7/S8/S9 carry the start address
//! at 32/24/16 bits, S5/S6 carry a 16/24 bit record count, S0 is the header.
//! `CC` counts the address, data, and checksum bytes; the checksum is the
//! one's complement of the low byte of the sum of count, address, and data.
//!
//! All data records of one file should use a single address width.  The width
//! chosen on output is the smallest that fits the highest data address.

use log::warn;
use regex::Regex;
use num_traits::FromPrimitive;
use num_derive::FromPrimitive;
use crate::mem::SparseImage;
use crate::{STDRESULT,DYNERR};
use super::{Error,RecordFile,RecordFileType,RecordTag};

/// 32 bit address and checksum leave this many data bytes under the count cap
pub const MAX_DATA_LEN: usize = 250;
const DEFAULT_DATA_LEN: usize = 16;
const ADDRESS_CEILING: u64 = 0xffffffff;

pub fn line_patt() -> Regex {
    Regex::new(r"^S([0-9])([0-9A-Fa-f]{2})([0-9A-Fa-f]*)$").expect("unreachable")
}

#[derive(FromPrimitive,PartialEq,Eq,Clone,Copy,Debug)]
pub enum Tag {
    Header = 0,
    Data16 = 1,
    Data24 = 2,
    Data32 = 3,
    Count16 = 5,
    Count24 = 6,
    Start32 = 7,
    Start24 = 8,
    Start16 = 9
}

impl RecordTag for Tag {
    fn is_data(&self) -> bool {
        matches!(self,Tag::Data16 | Tag::Data24 | Tag::Data32)
    }
    fn is_file_termination(&self) -> bool {
        self.is_start()
    }
}

impl Tag {
    pub fn is_header(&self) -> bool {
        *self == Tag::Header
    }
    pub fn is_count(&self) -> bool {
        matches!(self,Tag::Count16 | Tag::Count24)
    }
    /// start records double as the file termination
    pub fn is_start(&self) -> bool {
        matches!(self,Tag::Start32 | Tag::Start24 | Tag::Start16)
    }
    /// width of the address field in bytes
    pub fn address_width(&self) -> usize {
        match self {
            Tag::Header | Tag::Data16 | Tag::Count16 | Tag::Start16 => 2,
            Tag::Data24 | Tag::Count24 | Tag::Start24 => 3,
            Tag::Data32 | Tag::Start32 => 4
        }
    }
}

/// data tag for an address width in bytes
fn data_tag(width: usize) -> Tag {
    match width {
        2 => Tag::Data16,
        3 => Tag::Data24,
        _ => Tag::Data32
    }
}

/// start tag matching a data width in bytes
fn start_tag(width: usize) -> Tag {
    match width {
        2 => Tag::Start16,
        3 => Tag::Start24,
        _ => Tag::Start32
    }
}

/// smallest data width in bytes that fits the address
fn width_for(addr: u64) -> usize {
    match addr {
        a if a <= 0xffff => 2,
        a if a <= 0xffffff => 3,
        _ => 4
    }
}

/// One parsed line.  The count and checksum are derived, not stored.
#[derive(Clone,Debug)]
pub struct Record {
    pub tag: Tag,
    pub address: u64,
    pub data: Vec<u8>,
    pub before: Vec<u8>,
    pub after: Vec<u8>
}

impl Record {
    pub fn new(tag: Tag,address: u64,data: Vec<u8>) -> Self {
        Self {
            tag,
            address,
            data,
            before: Vec::new(),
            after: b"\r\n".to_vec()
        }
    }
    /// count of address, data, and checksum bytes as stored on the wire
    pub fn count(&self) -> u8 {
        (self.tag.address_width() + self.data.len() + 1) as u8
    }
    /// one's complement of the low byte of the sum of count, address, and data
    pub fn checksum(&self) -> u8 {
        let mut sum: u32 = self.count() as u32;
        for i in 0..self.tag.address_width() {
            sum += (self.address >> (8*i)) as u32 & 0xff;
        }
        for b in &self.data {
            sum += *b as u32;
        }
        !sum as u8
    }
    pub fn parse(line_num: usize,patt: &Regex,before: &[u8],body: &str,after: &[u8],lax: bool,warnings: &mut Vec<String>) -> Result<Self,Error> {
        let caps = match patt.captures(body) {
            Some(c) => c,
            None => return Err(Error::Parse { line: line_num, reason: "line does not fit the record layout".to_string() })
        };
        let tag = match Tag::from_u8(caps[1].parse::<u8>().expect("unreachable")) {
            Some(t) => t,
            None => return Err(Error::Parse { line: line_num, reason: format!("reserved record kind S{}",&caps[1]) })
        };
        let count = super::hex_u8(line_num,&caps[2])? as usize;
        let trailing = super::hex_bytes(line_num,&caps[3])?;
        if trailing.len() != count {
            return Err(Error::Parse { line: line_num, reason: format!("count {} disagrees with line length",count) });
        }
        let width = tag.address_width();
        if count < width + 1 {
            return Err(Error::Parse { line: line_num, reason: format!("count {} cannot hold the address field",count) });
        }
        let mut address: u64 = 0;
        for i in 0..width {
            address = address << 8 | trailing[i] as u64;
        }
        let ans = Self {
            tag,
            address,
            data: trailing[width..count-1].to_vec(),
            before: before.to_vec(),
            after: after.to_vec()
        };
        let found = trailing[count-1];
        if found != ans.checksum() {
            let err = Error::Checksum { line: line_num, expected: ans.checksum() as u32, found: found as u32 };
            if !lax {
                return Err(err);
            }
            warnings.push(err.to_string());
        }
        Ok(ans)
    }
    /// Exact wire bytes including any surrounding whitespace.
    pub fn serialize(&self) -> Vec<u8> {
        let width = self.tag.address_width();
        let mut addr = String::new();
        for i in (0..width).rev() {
            addr += &format!("{:02X}",(self.address >> (8*i)) as u8);
        }
        let body = format!("S{}{:02X}{}{}{:02X}",
            self.tag as u8,
            self.count(),
            addr,
            hex::encode_upper(&self.data),
            self.checksum());
        [self.before.clone(),body.into_bytes(),self.after.clone()].concat()
    }
    pub fn validate(&self) -> Vec<String> {
        let mut ans = Vec::new();
        let width = self.tag.address_width();
        if self.address >> (8*width) != 0 {
            ans.push(format!("address {:X} does not fit {} bits",self.address,8*width));
        }
        if self.tag.address_width() + self.data.len() + 1 > 255 {
            ans.push(format!("data length {} overflows the count field",self.data.len()));
        }
        if !self.tag.is_data() && !self.tag.is_header() && self.data.len() > 0 {
            ans.push(format!("tag S{} carries no data, found {} bytes",self.tag as u8,self.data.len()));
        }
        ans
    }
}

/// Ordered records plus the sparse memory they project onto.
#[derive(Clone)]
pub struct SrecFile {
    records: Vec<Record>,
    memory: SparseImage,
    header: Option<Vec<u8>>,
    start: Option<u64>,
    maxdatalen: usize,
    stale: bool
}

pub fn file_extensions() -> Vec<String> {
    super::file_extensions(RecordFileType::Srec)
}

impl SrecFile {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            memory: SparseImage::new_bounded(None,Some(ADDRESS_CEILING + 1)),
            header: None,
            start: None,
            maxdatalen: DEFAULT_DATA_LEN,
            stale: true
        }
    }
    pub fn from_bytes(dat: &[u8]) -> Result<Self,DYNERR> {
        let mut ans = Self::new();
        ans.parse(dat)?;
        Ok(ans)
    }
    pub fn from_memory(mem: &SparseImage) -> Result<Self,DYNERR> {
        let mut ans = Self::new();
        ans.set_memory(mem)?;
        Ok(ans)
    }
    pub fn from_blocks(blocks: Vec<(u64,Vec<u8>)>) -> Result<Self,DYNERR> {
        let mut mem = SparseImage::new();
        for (addr,dat) in blocks {
            mem.write(addr,&dat)?;
        }
        Self::from_memory(&mem)
    }
    pub fn records(&self) -> &[Record] {
        &self.records
    }
    fn parse_records(&mut self,dat: &[u8],lax: bool) -> Result<Vec<String>,DYNERR> {
        let patt = line_patt();
        let mut warnings: Vec<String> = Vec::new();
        let mut records: Vec<Record> = Vec::new();
        let mut pending: Vec<u8> = Vec::new();
        let mut data_width: Option<usize> = None;
        let mut data_count: u64 = 0;
        let mut claimed_count: Option<(usize,u64)> = None;
        let mut term_at: Option<usize> = None;
        let lines = super::split_lines(dat);
        for (i,line) in lines.iter().enumerate() {
            let line_num = i + 1;
            let (before,body,after) = super::trim_line(line);
            if body.is_empty() {
                pending.extend_from_slice(line);
                continue;
            }
            let body = super::body_str(line_num,body)?;
            let mut rec = Record::parse(line_num,&patt,before,body,after,lax,&mut warnings)?;
            if !pending.is_empty() {
                let mut full = pending.clone();
                full.append(&mut rec.before);
                rec.before = full;
                pending.clear();
            }
            if rec.tag.is_data() {
                data_count += 1;
                let width = rec.tag.address_width();
                match data_width {
                    None => data_width = Some(width),
                    Some(w) if w != width => {
                        let err = Error::Validation { field: "address width", reason: format!("line {}: file mixes {} and {} bit data addresses",line_num,8*w,8*width) };
                        if !lax {
                            return Err(Box::new(err));
                        }
                        warnings.push(err.to_string());
                        data_width = Some(width);
                    },
                    _ => {}
                }
            }
            if rec.tag.is_count() {
                claimed_count = Some((line_num,rec.address));
            }
            let term = rec.tag.is_start();
            records.push(rec);
            if term {
                term_at = Some(i);
                break;
            }
        }
        if let Some((line_num,claimed)) = claimed_count {
            if claimed != data_count {
                let err = Error::Validation { field: "count", reason: format!("line {}: count record says {}, file has {} data records",line_num,claimed,data_count) };
                if !lax {
                    return Err(Box::new(err));
                }
                warnings.push(err.to_string());
            }
        }
        if let Some(i) = term_at {
            let rest: Vec<u8> = lines[i+1..].concat();
            if !rest.is_empty() {
                warn!("{} bytes after the termination record are preserved but ignored",rest.len());
                records.last_mut().unwrap().after.extend_from_slice(&rest);
            }
        }
        self.records = records;
        self.apply_records()?;
        Ok(warnings)
    }
}

impl RecordFile for SrecFile {
    fn what_am_i(&self) -> RecordFileType {
        RecordFileType::Srec
    }
    fn file_extensions(&self) -> Vec<String> {
        file_extensions()
    }
    fn parse(&mut self,dat: &[u8]) -> STDRESULT {
        self.parse_records(dat,false)?;
        Ok(())
    }
    fn parse_lax(&mut self,dat: &[u8]) -> Result<Vec<String>,DYNERR> {
        self.parse_records(dat,true)
    }
    fn to_bytes(&mut self) -> Result<Vec<u8>,DYNERR> {
        if self.stale {
            self.update_records()?;
        }
        let mut ans: Vec<u8> = Vec::new();
        for rec in &self.records {
            ans.append(&mut rec.serialize());
        }
        Ok(ans)
    }
    fn apply_records(&mut self) -> STDRESULT {
        let mut memory = SparseImage::new_bounded(None,Some(ADDRESS_CEILING + 1));
        let mut header: Option<Vec<u8>> = None;
        let mut start: Option<u64> = None;
        for rec in &self.records {
            match rec.tag {
                Tag::Header => header = Some(rec.data.clone()),
                Tag::Data16 | Tag::Data24 | Tag::Data32 => memory.write(rec.address,&rec.data)?,
                Tag::Count16 | Tag::Count24 => {},
                Tag::Start32 | Tag::Start24 | Tag::Start16 => start = Some(rec.address)
            }
        }
        self.memory = memory;
        self.header = header;
        self.start = start;
        self.stale = false;
        Ok(())
    }
    fn update_records(&mut self) -> STDRESULT {
        if let Some(e) = self.memory.end() {
            if e > ADDRESS_CEILING + 1 {
                return Err(Box::new(Error::AddressRange));
            }
        }
        let width = match self.memory.end() {
            Some(e) => width_for(e - 1),
            None => 2
        };
        let mut records: Vec<Record> = Vec::new();
        records.push(Record::new(Tag::Header,0,self.header.clone().unwrap_or_default()));
        let mut data_count: u64 = 0;
        let blocks: Vec<(u64,Vec<u8>)> = self.memory.blocks().map(|(s,d)| (s,d.to_vec())).collect();
        for (block_start,dat) in blocks {
            let mut curs = 0usize;
            while curs < dat.len() {
                let stop = usize::min(dat.len(),curs + self.maxdatalen);
                records.push(Record::new(data_tag(width),block_start + curs as u64,dat[curs..stop].to_vec()));
                data_count += 1;
                curs = stop;
            }
        }
        let count_tag = match data_count {
            n if n <= 0xffff => Tag::Count16,
            _ => Tag::Count24
        };
        records.push(Record::new(count_tag,data_count,Vec::new()));
        records.push(Record::new(start_tag(width),self.start.unwrap_or(0),Vec::new()));
        self.records = records;
        self.stale = false;
        Ok(())
    }
    fn validate_records(&self) -> Vec<String> {
        let mut ans: Vec<String> = Vec::new();
        let mut widths: Vec<usize> = Vec::new();
        for (i,rec) in self.records.iter().enumerate() {
            for msg in rec.validate() {
                ans.push(format!("record {}: {}",i+1,msg));
            }
            if rec.tag.is_header() && i != 0 {
                ans.push(format!("record {}: header is not the first record",i+1));
            }
            if rec.tag.is_data() && !widths.contains(&rec.tag.address_width()) {
                widths.push(rec.tag.address_width());
            }
            if rec.tag.is_start() && i + 1 != self.records.len() {
                ans.push(format!("record {}: termination is not the last record",i+1));
            }
        }
        if widths.len() > 1 {
            ans.push("file mixes data address widths".to_string());
        }
        ans
    }
    fn memory(&self) -> &SparseImage {
        &self.memory
    }
    fn memory_mut(&mut self) -> &mut SparseImage {
        self.stale = true;
        &mut self.memory
    }
    fn set_memory(&mut self,mem: &SparseImage) -> STDRESULT {
        if let Some(e) = mem.end() {
            if e > ADDRESS_CEILING + 1 {
                return Err(Box::new(Error::AddressRange));
            }
        }
        let mut copy = mem.clone();
        copy.set_bounds(None,Some(ADDRESS_CEILING + 1));
        self.memory = copy;
        self.stale = true;
        Ok(())
    }
    fn is_stale(&self) -> bool {
        self.stale
    }
    fn discard_records(&mut self) {
        self.stale = true;
    }
    fn discard_memory(&mut self) -> STDRESULT {
        self.apply_records()
    }
    fn start_address(&self) -> Option<u64> {
        self.start
    }
    fn set_start_address(&mut self,addr: Option<u64>) -> STDRESULT {
        match addr {
            Some(a) if a > ADDRESS_CEILING => Err(Box::new(Error::AddressRange)),
            _ => {
                self.start = addr;
                self.stale = true;
                Ok(())
            }
        }
    }
    fn header(&self) -> Option<Vec<u8>> {
        self.header.clone()
    }
    fn set_header(&mut self,dat: Option<&[u8]>) -> STDRESULT {
        if let Some(h) = dat {
            if h.len() > MAX_DATA_LEN {
                return Err(Box::new(Error::Validation { field: "header", reason: format!("must be at most {} bytes",MAX_DATA_LEN) }));
            }
        }
        self.header = dat.map(|h| h.to_vec());
        self.stale = true;
        Ok(())
    }
    fn max_data_len(&self) -> usize {
        self.maxdatalen
    }
    fn set_max_data_len(&mut self,len: usize) -> STDRESULT {
        if len < 1 || len > MAX_DATA_LEN {
            return Err(Box::new(Error::Validation { field: "maxdatalen", reason: format!("must be 1 to {}",MAX_DATA_LEN) }));
        }
        self.maxdatalen = len;
        self.stale = true;
        Ok(())
    }
    fn address_ceiling(&self) -> u64 {
        ADDRESS_CEILING
    }
}

#[test]
fn parse_full_chain() {
    let dat = b"S0030000FC\r\nS1080000010203040AE3\r\nS5030001FB\r\nS9030000FC\r\n";
    let f = SrecFile::from_bytes(dat).expect("parse failed");
    assert_eq!(f.header(),Some(Vec::new()));
    assert_eq!(f.start_address(),Some(0));
    let data_recs: Vec<&Record> = f.records().iter().filter(|r| r.tag.is_data()).collect();
    assert_eq!(data_recs.len(),1);
    assert_eq!(data_recs[0].address,0);
    assert_eq!(data_recs[0].data,vec![1,2,3,4,0x0a]);
    assert_eq!(f.memory().read(0,5,None).expect("hole"),vec![1,2,3,4,0x0a]);
}

#[test]
fn round_trip_is_byte_exact() {
    let dat = b"S00F000068656C6C6F202020202000003C\r\nS11F00007C0802A6900100049421FFF07C6C1B787C8C23783C6000003863000026\r\nS5030001FB\r\nS9030000FC\r\n";
    let mut f = SrecFile::from_bytes(dat).expect("parse failed");
    assert_eq!(f.to_bytes().expect("serialize failed"),dat.to_vec());
}

#[test]
fn checksum_failure_names_the_line() {
    let dat = b"S0030000FC\r\nS1080000010203040AE4\r\nS9030000FC\r\n";
    match SrecFile::from_bytes(dat) {
        Err(e) => assert!(e.to_string().starts_with("line 2")),
        Ok(_) => panic!("bad checksum accepted")
    }
}

#[test]
fn mixed_widths_strict_vs_lax() {
    let dat = b"S0030000FC\r\nS104000011EA\r\nS20500010000F9\r\nS9030000FC\r\n";
    assert!(SrecFile::from_bytes(dat).is_err());
    let mut f = SrecFile::new();
    let warnings = f.parse_lax(dat).expect("lax parse failed");
    assert_eq!(warnings.len(),1);
    assert!(warnings[0].contains("mixes"));
}

#[test]
fn width_follows_max_address() {
    let mut f = SrecFile::new();
    f.memory_mut().write(0x10000,&[1,2]).expect("write failed");
    f.update_records().expect("update failed");
    let data_recs: Vec<&Record> = f.records().iter().filter(|r| r.tag.is_data()).collect();
    assert_eq!(data_recs[0].tag,Tag::Data24);
    assert_eq!(f.records().last().unwrap().tag,Tag::Start24);

    let mut f = SrecFile::new();
    f.memory_mut().write(0x1000000,&[1,2]).expect("write failed");
    f.update_records().expect("update failed");
    let data_recs: Vec<&Record> = f.records().iter().filter(|r| r.tag.is_data()).collect();
    assert_eq!(data_recs[0].tag,Tag::Data32);
    assert_eq!(f.records().last().unwrap().tag,Tag::Start32);
}

#[test]
fn count_record_mismatch_rejected() {
    let dat = b"S0030000FC\r\nS104000011EA\r\nS5030002FA\r\nS9030000FC\r\n";
    match SrecFile::from_bytes(dat) {
        Err(e) => assert!(e.to_string().contains("count")),
        Ok(_) => panic!("bad count accepted")
    }
}

#[test]
fn empty_image_is_header_and_terminator() {
    let mut f = SrecFile::new();
    let wire = f.to_bytes().expect("serialize failed");
    assert_eq!(wire,b"S0030000FC\r\nS5030000FC\r\nS9030000FC\r\n".to_vec());
}
