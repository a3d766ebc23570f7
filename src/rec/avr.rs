//! # Support for AVR generic record files
//!
//! Every record is one line `AAAAAA:HHLL`: a 6 digit word address and one
//! 16 bit word, high byte first.  Byte addresses are twice the word address.
//! There are no checksums and no termination record; the file simply ends.
//!
//! Because the wire carries whole words, serializing demands word aligned
//! data; an image with odd block edges is refused rather than padded.

use regex::Regex;
use crate::mem::SparseImage;
use crate::{STDRESULT,DYNERR};
use super::{Error,RecordFile,RecordFileType,RecordTag};

/// every record carries exactly one word
pub const WORD_LEN: usize = 2;
const ADDRESS_CEILING: u64 = 2 * 0x1000000 - 1;

pub fn line_patt() -> Regex {
    Regex::new(r"^([0-9A-Fa-f]{6}):([0-9A-Fa-f]{4})$").expect("unreachable")
}

#[derive(PartialEq,Eq,Clone,Copy,Debug)]
pub enum Tag {
    Data
}

impl RecordTag for Tag {
    fn is_data(&self) -> bool {
        true
    }
    fn is_file_termination(&self) -> bool {
        false
    }
}

/// One parsed line.  The address is the word address as on the wire.
#[derive(Clone,Debug)]
pub struct Record {
    pub tag: Tag,
    pub address: u64,
    pub data: Vec<u8>,
    pub before: Vec<u8>,
    pub after: Vec<u8>
}

impl Record {
    pub fn new(address: u64,data: Vec<u8>) -> Self {
        Self {
            tag: Tag::Data,
            address,
            data,
            before: Vec::new(),
            after: b"\n".to_vec()
        }
    }
    pub fn parse(line_num: usize,patt: &Regex,before: &[u8],body: &str,after: &[u8]) -> Result<Self,Error> {
        let caps = match patt.captures(body) {
            Some(c) => c,
            None => return Err(Error::Parse { line: line_num, reason: "line does not fit the record layout".to_string() })
        };
        Ok(Self {
            tag: Tag::Data,
            address: super::hex_u64(line_num,&caps[1])?,
            data: super::hex_bytes(line_num,&caps[2])?,
            before: before.to_vec(),
            after: after.to_vec()
        })
    }
    pub fn serialize(&self) -> Vec<u8> {
        let body = format!("{:06X}:{}",self.address,hex::encode_upper(&self.data));
        [self.before.clone(),body.into_bytes(),self.after.clone()].concat()
    }
    pub fn validate(&self) -> Vec<String> {
        let mut ans = Vec::new();
        if self.address > 0xffffff {
            ans.push(format!("word address {:X} does not fit 6 digits",self.address));
        }
        if self.data.len() != WORD_LEN {
            ans.push(format!("expected one word of data, found {} bytes",self.data.len()));
        }
        ans
    }
}

/// Ordered records plus the sparse memory they project onto.
#[derive(Clone)]
pub struct AvrFile {
    records: Vec<Record>,
    memory: SparseImage,
    stale: bool
}

pub fn file_extensions() -> Vec<String> {
    super::file_extensions(RecordFileType::Avr)
}

impl AvrFile {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            memory: SparseImage::new_bounded(None,Some(ADDRESS_CEILING + 1)),
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
    fn parse_records(&mut self,dat: &[u8]) -> Result<Vec<String>,DYNERR> {
        let patt = line_patt();
        let mut records: Vec<Record> = Vec::new();
        let mut pending: Vec<u8> = Vec::new();
        for (i,line) in super::split_lines(dat).iter().enumerate() {
            let line_num = i + 1;
            let (before,body,after) = super::trim_line(line);
            if body.is_empty() {
                pending.extend_from_slice(line);
                continue;
            }
            let body = super::body_str(line_num,body)?;
            let mut rec = Record::parse(line_num,&patt,before,body,after)?;
            if !pending.is_empty() {
                let mut full = pending.clone();
                full.append(&mut rec.before);
                rec.before = full;
                pending.clear();
            }
            records.push(rec);
        }
        if !pending.is_empty() {
            if let Some(last) = records.last_mut() {
                last.after.append(&mut pending);
            }
        }
        self.records = records;
        self.apply_records()?;
        Ok(Vec::new())
    }
}

impl RecordFile for AvrFile {
    fn what_am_i(&self) -> RecordFileType {
        RecordFileType::Avr
    }
    fn file_extensions(&self) -> Vec<String> {
        file_extensions()
    }
    fn parse(&mut self,dat: &[u8]) -> STDRESULT {
        self.parse_records(dat)?;
        Ok(())
    }
    fn parse_lax(&mut self,dat: &[u8]) -> Result<Vec<String>,DYNERR> {
        self.parse_records(dat)
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
        for rec in &self.records {
            memory.write(2 * rec.address,&rec.data)?;
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
            if block_start % 2 != 0 || dat.len() % 2 != 0 {
                return Err(Box::new(Error::Validation { field: "data", reason: format!("block at {:X} is not word aligned",block_start) }));
            }
            for w in 0..dat.len() / 2 {
                records.push(Record::new(block_start / 2 + w as u64,dat[2*w..2*w+2].to_vec()));
            }
        }
        self.records = records;
        self.stale = false;
        Ok(())
    }
    fn validate_records(&self) -> Vec<String> {
        let mut ans: Vec<String> = Vec::new();
        for (i,rec) in self.records.iter().enumerate() {
            for msg in rec.validate() {
                ans.push(format!("record {}: {}",i+1,msg));
            }
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
        WORD_LEN
    }
    fn set_max_data_len(&mut self,len: usize) -> STDRESULT {
        match len {
            WORD_LEN => Ok(()),
            _ => Err(Box::new(Error::Validation { field: "maxdatalen", reason: "format carries exactly one word per record".to_string() }))
        }
    }
    fn address_ceiling(&self) -> u64 {
        ADDRESS_CEILING
    }
}

#[test]
fn parse_and_round_trip() {
    let dat = b"000000:940C\n000001:0072\n";
    let mut f = AvrFile::from_bytes(dat).expect("parse failed");
    assert_eq!(f.memory().read(0,4,None).expect("hole"),vec![0x94,0x0c,0x00,0x72]);
    assert_eq!(f.to_bytes().expect("serialize failed"),dat.to_vec());
}

#[test]
fn word_addresses_double() {
    let dat = b"000100:AABB\n";
    let f = AvrFile::from_bytes(dat).expect("parse failed");
    assert_eq!(f.memory().read(0x200,0x202,None).expect("hole"),vec![0xaa,0xbb]);
}

#[test]
fn unaligned_memory_refused() {
    let mut f = AvrFile::new();
    f.memory_mut().write(3,&[1,2]).expect("write failed");
    assert!(f.update_records().is_err());
}

#[test]
fn update_emits_one_word_per_line() {
    let mut f = AvrFile::new();
    f.memory_mut().write(0x10,&[1,2,3,4]).expect("write failed");
    assert_eq!(f.to_bytes().expect("serialize failed"),b"000008:0102\n000009:0304\n".to_vec());
}
