//! # Support for Intel HEX record files
//!
//! Every record is one line `:CCAAAATTDD...KK`, where `CC` is the data byte
//! count, `AAAA` a 16 bit address, `TT` the tag, and `KK` the two's complement
//! checksum of everything from the count through the last data byte.
//! Addresses above 64K are reached through extension records: an extended
//! segment address scales its payload by 16, an extended linear address
//! supplies the upper 16 bits.  A file carries exactly one EOF record and at
//! most one start address record.

use log::warn;
use regex::Regex;
use num_traits::FromPrimitive;
use num_derive::FromPrimitive;
use crate::mem::SparseImage;
use crate::{STDRESULT,DYNERR};
use super::{Error,RecordFile,RecordFileType,RecordTag};

/// hard cap imposed by the 2 digit count field
pub const MAX_DATA_LEN: usize = 255;
const DEFAULT_DATA_LEN: usize = 16;
const ADDRESS_CEILING: u64 = 0xffffffff;

pub fn line_patt() -> Regex {
    Regex::new(r"^:([0-9A-Fa-f]{2})([0-9A-Fa-f]{4})([0-9A-Fa-f]{2})([0-9A-Fa-f]*)$").expect("unreachable")
}

#[derive(FromPrimitive,PartialEq,Eq,Clone,Copy,Debug)]
pub enum Tag {
    Data = 0,
    Eof = 1,
    ExtendedSegmentAddress = 2,
    StartSegmentAddress = 3,
    ExtendedLinearAddress = 4,
    StartLinearAddress = 5
}

impl RecordTag for Tag {
    fn is_data(&self) -> bool {
        *self == Tag::Data
    }
    fn is_file_termination(&self) -> bool {
        *self == Tag::Eof
    }
}

impl Tag {
    pub fn is_eof(&self) -> bool {
        *self == Tag::Eof
    }
    /// does the record change the address base of following data records
    pub fn is_extension(&self) -> bool {
        matches!(self,Tag::ExtendedSegmentAddress | Tag::ExtendedLinearAddress)
    }
    pub fn is_start(&self) -> bool {
        matches!(self,Tag::StartSegmentAddress | Tag::StartLinearAddress)
    }
    /// payload length the tag demands, None if unconstrained
    fn data_len(&self) -> Option<usize> {
        match self {
            Tag::Data => None,
            Tag::Eof => Some(0),
            Tag::ExtendedSegmentAddress => Some(2),
            Tag::StartSegmentAddress => Some(4),
            Tag::ExtendedLinearAddress => Some(2),
            Tag::StartLinearAddress => Some(4)
        }
    }
}

/// Program entry point as carried on the wire, either CS:IP words or a 32 bit EIP.
#[derive(PartialEq,Clone,Copy,Debug)]
pub enum Start {
    Segment(u32),
    Linear(u32)
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
    pub fn count(&self) -> u8 {
        self.data.len() as u8
    }
    /// two's complement of the sum of count, address bytes, tag, and data
    pub fn checksum(&self) -> u8 {
        let mut sum: u32 = self.data.len() as u32;
        sum += (self.address >> 8) as u32 & 0xff;
        sum += self.address as u32 & 0xff;
        sum += self.tag as u32;
        for b in &self.data {
            sum += *b as u32;
        }
        (0x100 - (sum & 0xff)) as u8 & 0xff
    }
    /// Parse the body of one line, `patt` coming from `line_patt`.  In lax mode
    /// a checksum mismatch is demoted to a warning.
    pub fn parse(line_num: usize,patt: &Regex,before: &[u8],body: &str,after: &[u8],lax: bool,warnings: &mut Vec<String>) -> Result<Self,Error> {
        let caps = match patt.captures(body) {
            Some(c) => c,
            None => return Err(Error::Parse { line: line_num, reason: "line does not fit the record layout".to_string() })
        };
        let count = super::hex_u8(line_num,&caps[1])? as usize;
        let address = super::hex_u64(line_num,&caps[2])?;
        let tag = match Tag::from_u8(super::hex_u8(line_num,&caps[3])?) {
            Some(t) => t,
            None => return Err(Error::Parse { line: line_num, reason: "unknown record tag".to_string() })
        };
        let trailing = super::hex_bytes(line_num,&caps[4])?;
        if trailing.len() != count + 1 {
            return Err(Error::Parse { line: line_num, reason: format!("count {} disagrees with line length",count) });
        }
        let ans = Self {
            tag,
            address,
            data: trailing[..count].to_vec(),
            before: before.to_vec(),
            after: after.to_vec()
        };
        let found = trailing[count];
        if found != ans.checksum() {
            let err = Error::Checksum { line: line_num, expected: ans.checksum() as u32, found: found as u32 };
            if !lax {
                return Err(err);
            }
            warnings.push(err.to_string());
        }
        if let Some(expected) = ans.tag.data_len() {
            if ans.data.len() != expected {
                let err = Error::Validation { field: "data", reason: format!("tag requires {} data bytes, found {}",expected,ans.data.len()) };
                if !lax {
                    return Err(err);
                }
                warnings.push(err.to_string());
            }
        }
        Ok(ans)
    }
    /// Exact wire bytes including any surrounding whitespace.
    pub fn serialize(&self) -> Vec<u8> {
        let body = format!(":{:02X}{:04X}{:02X}{}{:02X}",
            self.count(),
            self.address & 0xffff,
            self.tag as u8,
            hex::encode_upper(&self.data),
            self.checksum());
        [self.before.clone(),body.into_bytes(),self.after.clone()].concat()
    }
    /// record side invariants, one message per violation
    pub fn validate(&self) -> Vec<String> {
        let mut ans = Vec::new();
        if self.address > 0xffff {
            ans.push(format!("address {:X} does not fit 16 bits",self.address));
        }
        if self.data.len() > MAX_DATA_LEN {
            ans.push(format!("data length {} exceeds {}",self.data.len(),MAX_DATA_LEN));
        }
        if let Some(expected) = self.tag.data_len() {
            if self.data.len() != expected {
                ans.push(format!("tag {} requires {} data bytes, found {}",self.tag as u8,expected,self.data.len()));
            }
        }
        ans
    }
}

/// Ordered records plus the sparse memory they project onto.
#[derive(Clone)]
pub struct IhexFile {
    records: Vec<Record>,
    memory: SparseImage,
    start: Option<Start>,
    maxdatalen: usize,
    stale: bool
}

pub fn file_extensions() -> Vec<String> {
    super::file_extensions(RecordFileType::Ihex)
}

impl IhexFile {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            memory: SparseImage::new_bounded(None,Some(ADDRESS_CEILING + 1)),
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
    pub fn start_record(&self) -> Option<Start> {
        self.start
    }
    pub fn set_start_record(&mut self,start: Option<Start>) {
        self.start = start;
        self.stale = true;
    }
    fn parse_records(&mut self,dat: &[u8],lax: bool) -> Result<Vec<String>,DYNERR> {
        let patt = line_patt();
        let mut warnings: Vec<String> = Vec::new();
        let mut records: Vec<Record> = Vec::new();
        let mut pending: Vec<u8> = Vec::new();
        let mut eof_at: Option<usize> = None;
        let mut start_count = 0;
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
            if rec.tag.is_start() {
                start_count += 1;
                if start_count > 1 {
                    let err = Error::Validation { field: "start", reason: "more than one start address record".to_string() };
                    if !lax {
                        return Err(Box::new(err));
                    }
                    warnings.push(err.to_string());
                }
            }
            let eof = rec.tag.is_eof();
            records.push(rec);
            if eof {
                eof_at = Some(i);
                break;
            }
        }
        match eof_at {
            Some(i) => {
                // anything after the EOF is preserved verbatim, never interpreted
                let rest: Vec<u8> = lines[i+1..].concat();
                if !rest.is_empty() {
                    warn!("{} bytes after the EOF record are preserved but ignored",rest.len());
                    records.last_mut().unwrap().after.extend_from_slice(&rest);
                }
            },
            None => {
                let err = Error::Parse { line: lines.len(), reason: "missing EOF record".to_string() };
                if !lax {
                    return Err(Box::new(err));
                }
                warnings.push(err.to_string());
            }
        }
        self.records = records;
        self.apply_records()?;
        Ok(warnings)
    }
}

impl RecordFile for IhexFile {
    fn what_am_i(&self) -> RecordFileType {
        RecordFileType::Ihex
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
        let mut start: Option<Start> = None;
        let mut base: u64 = 0;
        for rec in &self.records {
            // malformed payload lengths can survive a lax parse, so the guards matter
            match rec.tag {
                Tag::Data => memory.write(base + rec.address,&rec.data)?,
                Tag::ExtendedSegmentAddress if rec.data.len() == 2 => {
                    base = 16 * u16::from_be_bytes([rec.data[0],rec.data[1]]) as u64;
                },
                Tag::ExtendedLinearAddress if rec.data.len() == 2 => {
                    base = (u16::from_be_bytes([rec.data[0],rec.data[1]]) as u64) << 16;
                },
                Tag::StartSegmentAddress if rec.data.len() == 4 => {
                    start = Some(Start::Segment(u32::from_be_bytes([rec.data[0],rec.data[1],rec.data[2],rec.data[3]])));
                },
                Tag::StartLinearAddress if rec.data.len() == 4 => {
                    start = Some(Start::Linear(u32::from_be_bytes([rec.data[0],rec.data[1],rec.data[2],rec.data[3]])));
                },
                _ => {}
            }
        }
        self.memory = memory;
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
        let mut records: Vec<Record> = Vec::new();
        let mut base: u64 = 0;
        let blocks: Vec<(u64,Vec<u8>)> = self.memory.blocks().map(|(s,d)| (s,d.to_vec())).collect();
        for (block_start,dat) in blocks {
            let block_end = block_start + dat.len() as u64;
            let mut curs = block_start;
            while curs < block_end {
                // chunks stop at the 64K boundary so the 16 bit address never wraps
                let boundary = (curs >> 16 << 16) + 0x10000;
                let stop = [block_end,curs + self.maxdatalen as u64,boundary].into_iter().min().unwrap();
                if curs >> 16 << 16 != base {
                    base = curs >> 16 << 16;
                    records.push(Record::new(Tag::ExtendedLinearAddress,0,((base >> 16) as u16).to_be_bytes().to_vec()));
                }
                records.push(Record::new(Tag::Data,curs & 0xffff,dat[(curs-block_start) as usize..(stop-block_start) as usize].to_vec()));
                curs = stop;
            }
        }
        match self.start {
            Some(Start::Segment(v)) => records.push(Record::new(Tag::StartSegmentAddress,0,v.to_be_bytes().to_vec())),
            Some(Start::Linear(v)) => records.push(Record::new(Tag::StartLinearAddress,0,v.to_be_bytes().to_vec())),
            None => {}
        }
        records.push(Record::new(Tag::Eof,0,Vec::new()));
        self.records = records;
        self.stale = false;
        Ok(())
    }
    fn validate_records(&self) -> Vec<String> {
        let mut ans: Vec<String> = Vec::new();
        let mut eof_count = 0;
        let mut start_count = 0;
        for (i,rec) in self.records.iter().enumerate() {
            for msg in rec.validate() {
                ans.push(format!("record {}: {}",i+1,msg));
            }
            if rec.tag.is_eof() {
                eof_count += 1;
                if i + 1 != self.records.len() {
                    ans.push(format!("record {}: EOF is not the last record",i+1));
                }
            }
            if rec.tag.is_start() {
                start_count += 1;
            }
        }
        if eof_count != 1 {
            ans.push(format!("expected exactly one EOF record, found {}",eof_count));
        }
        if start_count > 1 {
            ans.push(format!("expected at most one start address record, found {}",start_count));
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
        match self.start {
            Some(Start::Segment(v)) => Some(v as u64),
            Some(Start::Linear(v)) => Some(v as u64),
            None => None
        }
    }
    fn set_start_address(&mut self,addr: Option<u64>) -> STDRESULT {
        match addr {
            Some(a) if a > ADDRESS_CEILING => Err(Box::new(Error::AddressRange)),
            Some(a) => {
                // keep the wire variant when one was already chosen
                self.start = match self.start {
                    Some(Start::Segment(_)) => Some(Start::Segment(a as u32)),
                    _ => Some(Start::Linear(a as u32))
                };
                self.stale = true;
                Ok(())
            },
            None => {
                self.start = None;
                self.stale = true;
                Ok(())
            }
        }
    }
    fn header(&self) -> Option<Vec<u8>> {
        None
    }
    fn set_header(&mut self,dat: Option<&[u8]>) -> STDRESULT {
        match dat {
            Some(_) => Err(Box::new(Error::Validation { field: "header", reason: "format has no header record".to_string() })),
            None => Ok(())
        }
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
fn parse_data_and_eof() {
    let dat = b":0B0010006164647265737320676170A7\r\n:00000001FF\r\n";
    let f = IhexFile::from_bytes(dat).expect("parse failed");
    assert_eq!(f.records().len(),2);
    assert_eq!(f.records()[0].tag,Tag::Data);
    assert_eq!(f.records()[0].address,0x10);
    assert_eq!(f.records()[0].data,b"address gap".to_vec());
    assert_eq!(f.records()[0].checksum(),0xa7);
    assert_eq!(f.records()[1].tag,Tag::Eof);
    assert_eq!(f.memory().read(0x10,0x1b,None).expect("hole"),b"address gap".to_vec());
}

#[test]
fn round_trip_is_byte_exact() {
    let dat = b":0B0010006164647265737320676170A7\r\n:020000021200EA\r\n:0100000041BE\r\n:00000001FF\r\n";
    let mut f = IhexFile::from_bytes(dat).expect("parse failed");
    assert_eq!(f.to_bytes().expect("serialize failed"),dat.to_vec());
    // segment extension scales by 16
    assert_eq!(f.memory().read(0x12000,0x12001,None).expect("hole"),vec![0x41]);
}

#[test]
fn bad_checksum_strict_and_lax() {
    let dat = b":0B0010006164647265737320676170A8\r\n:00000001FF\r\n";
    assert!(IhexFile::from_bytes(dat).is_err());
    let mut f = IhexFile::new();
    let warnings = f.parse_lax(dat).expect("lax parse failed");
    assert_eq!(warnings.len(),1);
    assert!(warnings[0].contains("checksum"));
}

#[test]
fn max_data_split() {
    let mut f = IhexFile::new();
    f.set_max_data_len(255).expect("bad len");
    f.memory_mut().write(0,&[0x11;600]).expect("write failed");
    f.update_records().expect("update failed");
    let data_recs: Vec<&Record> = f.records().iter().filter(|r| r.tag.is_data()).collect();
    assert_eq!(data_recs.len(),3);
    assert_eq!((data_recs[0].address,data_recs[0].data.len()),(0,255));
    assert_eq!((data_recs[1].address,data_recs[1].data.len()),(255,255));
    assert_eq!((data_recs[2].address,data_recs[2].data.len()),(510,90));
    assert_eq!(f.records().last().unwrap().tag,Tag::Eof);
}

#[test]
fn crossing_64k_emits_extension() {
    let mut f = IhexFile::new();
    f.memory_mut().write(0xfffe,&[1,2,3,4]).expect("write failed");
    f.update_records().expect("update failed");
    let tags: Vec<Tag> = f.records().iter().map(|r| r.tag).collect();
    assert_eq!(tags,vec![Tag::Data,Tag::ExtendedLinearAddress,Tag::Data,Tag::Eof]);
    assert_eq!(f.records()[0].address,0xfffe);
    assert_eq!(f.records()[1].data,vec![0,1]);
    assert_eq!(f.records()[2].address,0);
    // round trip back through the records
    let mut copy = f.clone();
    copy.apply_records().expect("apply failed");
    assert_eq!(copy.memory(),f.memory());
}

#[test]
fn start_address_survives() {
    let mut f = IhexFile::new();
    f.memory_mut().write(0x100,&[0;4]).expect("write failed");
    f.set_start_record(Some(Start::Segment(0x12345678)));
    let wire = f.to_bytes().expect("serialize failed");
    let f2 = IhexFile::from_bytes(&wire).expect("parse failed");
    assert_eq!(f2.start_record(),Some(Start::Segment(0x12345678)));
}

#[test]
fn empty_image_is_eof_only() {
    let mut f = IhexFile::new();
    let wire = f.to_bytes().expect("serialize failed");
    assert_eq!(wire,b":00000001FF\r\n".to_vec());
}

#[test]
fn address_ceiling_respected() {
    let mut f = IhexFile::new();
    assert!(f.memory_mut().write(0xffffffff,&[1]).is_ok());
    assert!(f.memory_mut().write(0xffffffff,&[1,2]).is_err());
}
