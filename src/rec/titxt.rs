//! # Support for TI-TXT record files
//!
//! The Texas Instruments format has three record kinds: an address record
//! `@XXXX`, a data record of whitespace separated hex bytes, and the
//! terminator `q`.  Data records write at a running address that each address
//! record resets.  There are no checksums.
//!
//! Addresses are officially 16 bits; up to 8 hex digits are accepted on input
//! and emitted on output when the address demands it.

use regex::Regex;
use crate::mem::SparseImage;
use crate::{STDRESULT,DYNERR};
use super::{Error,RecordFile,RecordFileType,RecordTag};

/// the official layout puts at most this many bytes on a line
pub const MAX_DATA_LEN: usize = 16;
const ADDRESS_CEILING: u64 = 0xffffffff;

pub fn addr_patt() -> Regex {
    Regex::new(r"^@([0-9A-Fa-f]{1,8})$").expect("unreachable")
}

pub fn data_patt() -> Regex {
    Regex::new(r"^[0-9A-Fa-f]{2}(\s+[0-9A-Fa-f]{2})*$").expect("unreachable")
}

#[derive(PartialEq,Eq,Clone,Copy,Debug)]
pub enum Tag {
    Address,
    Data,
    Eof
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
    pub fn is_address(&self) -> bool {
        *self == Tag::Address
    }
}

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
            after: b"\n".to_vec()
        }
    }
    pub fn count(&self) -> usize {
        self.data.len()
    }
    pub fn parse(line_num: usize,addr_patt: &Regex,data_patt: &Regex,before: &[u8],body: &str,after: &[u8],lax: bool,warnings: &mut Vec<String>) -> Result<Self,Error> {
        let (tag,address,data) = if body == "q" || body == "Q" {
            (Tag::Eof,0,Vec::new())
        } else if let Some(caps) = addr_patt.captures(body) {
            (Tag::Address,super::hex_u64(line_num,&caps[1])?,Vec::new())
        } else if data_patt.is_match(body) {
            let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            let data = super::hex_bytes(line_num,&compact)?;
            if data.len() > MAX_DATA_LEN {
                let err = Error::Validation { field: "data", reason: format!("line {}: {} bytes on a line, limit is {}",line_num,data.len(),MAX_DATA_LEN) };
                if !lax {
                    return Err(err);
                }
                warnings.push(err.to_string());
            }
            (Tag::Data,0,data)
        } else {
            return Err(Error::Parse { line: line_num, reason: "line does not fit the record layout".to_string() });
        };
        Ok(Self {
            tag,
            address,
            data,
            before: before.to_vec(),
            after: after.to_vec()
        })
    }
    pub fn serialize(&self) -> Vec<u8> {
        let body = match self.tag {
            Tag::Address => format!("@{:04X}",self.address),
            Tag::Eof => "q".to_string(),
            Tag::Data => {
                let pairs: Vec<String> = self.data.iter().map(|b| format!("{:02X}",b)).collect();
                pairs.join(" ")
            }
        };
        [self.before.clone(),body.into_bytes(),self.after.clone()].concat()
    }
    pub fn validate(&self) -> Vec<String> {
        let mut ans = Vec::new();
        if self.address > ADDRESS_CEILING {
            ans.push(format!("address {:X} does not fit 32 bits",self.address));
        }
        if self.tag.is_data() && self.data.len() > MAX_DATA_LEN {
            ans.push(format!("data length {} exceeds {}",self.data.len(),MAX_DATA_LEN));
        }
        ans
    }
}

/// Ordered records plus the sparse memory they project onto.
#[derive(Clone)]
pub struct TiTxtFile {
    records: Vec<Record>,
    memory: SparseImage,
    maxdatalen: usize,
    stale: bool
}

pub fn file_extensions() -> Vec<String> {
    super::file_extensions(RecordFileType::TiTxt)
}

impl TiTxtFile {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            memory: SparseImage::new_bounded(None,Some(ADDRESS_CEILING + 1)),
            maxdatalen: MAX_DATA_LEN,
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
        let addr_patt = addr_patt();
        let data_patt = data_patt();
        let mut warnings: Vec<String> = Vec::new();
        let mut records: Vec<Record> = Vec::new();
        let mut pending: Vec<u8> = Vec::new();
        let mut eof_at: Option<usize> = None;
        let lines = super::split_lines(dat);
        for (i,line) in lines.iter().enumerate() {
            let line_num = i + 1;
            let (before,body,after) = super::trim_line(line);
            if body.is_empty() {
                pending.extend_from_slice(line);
                continue;
            }
            let body = super::body_str(line_num,body)?;
            let mut rec = Record::parse(line_num,&addr_patt,&data_patt,before,body,after,lax,&mut warnings)?;
            if !pending.is_empty() {
                let mut full = pending.clone();
                full.append(&mut rec.before);
                rec.before = full;
                pending.clear();
            }
            let eof = rec.tag.is_file_termination();
            records.push(rec);
            if eof {
                eof_at = Some(i);
                break;
            }
        }
        match eof_at {
            Some(i) => {
                let rest: Vec<u8> = lines[i+1..].concat();
                if !rest.is_empty() {
                    log::warn!("{} bytes after the terminator are preserved but ignored",rest.len());
                    records.last_mut().unwrap().after.extend_from_slice(&rest);
                }
            },
            None => {
                let err = Error::Parse { line: lines.len(), reason: "missing `q` terminator".to_string() };
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

impl RecordFile for TiTxtFile {
    fn what_am_i(&self) -> RecordFileType {
        RecordFileType::TiTxt
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
        let mut curs: u64 = 0;
        for rec in &self.records {
            match rec.tag {
                Tag::Address => curs = rec.address,
                Tag::Data => {
                    memory.write(curs,&rec.data)?;
                    curs += rec.data.len() as u64;
                },
                Tag::Eof => {}
            }
        }
        self.memory = memory;
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
        let blocks: Vec<(u64,Vec<u8>)> = self.memory.blocks().map(|(s,d)| (s,d.to_vec())).collect();
        for (block_start,dat) in blocks {
            records.push(Record::new(Tag::Address,block_start,Vec::new()));
            let mut curs = 0usize;
            while curs < dat.len() {
                let stop = usize::min(dat.len(),curs + self.maxdatalen);
                records.push(Record::new(Tag::Data,0,dat[curs..stop].to_vec()));
                curs = stop;
            }
        }
        records.push(Record::new(Tag::Eof,0,Vec::new()));
        self.records = records;
        self.stale = false;
        Ok(())
    }
    fn validate_records(&self) -> Vec<String> {
        let mut ans: Vec<String> = Vec::new();
        let mut eof_count = 0;
        for (i,rec) in self.records.iter().enumerate() {
            for msg in rec.validate() {
                ans.push(format!("record {}: {}",i+1,msg));
            }
            if rec.tag.is_file_termination() {
                eof_count += 1;
                if i + 1 != self.records.len() {
                    ans.push(format!("record {}: terminator is not the last record",i+1));
                }
            }
        }
        if eof_count != 1 {
            ans.push(format!("expected exactly one `q` record, found {}",eof_count));
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
        None
    }
    fn set_start_address(&mut self,addr: Option<u64>) -> STDRESULT {
        match addr {
            Some(_) => Err(Box::new(Error::Validation { field: "start", reason: "format has no start address record".to_string() })),
            None => Ok(())
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
fn parse_and_round_trip() {
    let dat = b"@F000\nAA BB\nq\n";
    let mut f = TiTxtFile::from_bytes(dat).expect("parse failed");
    assert_eq!(f.memory().read(0xf000,0xf002,None).expect("hole"),vec![0xaa,0xbb]);
    assert_eq!(f.to_bytes().expect("serialize failed"),dat.to_vec());
}

#[test]
fn sequential_data_advances() {
    let dat = b"@F000\n01 02 03 04 05 06 07 08 09 0A 0B 0C 0D 0E 0F 10\n11 12\nq\n";
    let f = TiTxtFile::from_bytes(dat).expect("parse failed");
    assert_eq!(f.memory().read(0xf00f,0xf012,None).expect("hole"),vec![0x10,0x11,0x12]);
}

#[test]
fn merged_images_reserialize_as_one_run() {
    let mut f = TiTxtFile::from_bytes(b"@F000\nAA BB\nq\n").expect("parse failed");
    let g = TiTxtFile::from_bytes(b"@F002\nCC DD\nq\n").expect("parse failed");
    f.merge(g.memory()).expect("merge failed");
    assert_eq!(f.to_bytes().expect("serialize failed"),b"@F000\nAA BB CC DD\nq\n".to_vec());
}

#[test]
fn missing_terminator_strict_vs_lax() {
    let dat = b"@F000\nAA BB\n";
    assert!(TiTxtFile::from_bytes(dat).is_err());
    let mut f = TiTxtFile::new();
    let warnings = f.parse_lax(dat).expect("lax parse failed");
    assert_eq!(warnings.len(),1);
    assert_eq!(f.memory().read(0xf000,0xf002,None).expect("hole"),vec![0xaa,0xbb]);
}

#[test]
fn gaps_get_fresh_address_records() {
    let mut f = TiTxtFile::new();
    f.memory_mut().write(0x100,&[1,2]).expect("write failed");
    f.memory_mut().write(0x200,&[3]).expect("write failed");
    assert_eq!(f.to_bytes().expect("serialize failed"),b"@0100\n01 02\n@0200\n03\nq\n".to_vec());
}

#[test]
fn empty_image_is_terminator_only() {
    let mut f = TiTxtFile::new();
    assert_eq!(f.to_bytes().expect("serialize failed"),b"q\n".to_vec());
}
