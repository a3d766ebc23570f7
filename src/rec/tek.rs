//! # Support for standard Tektronix hex files
//!
//! Every record is one line `/AAAACCKKDD...`: a 16 bit address, a 2 digit
//! data byte count, a 2 digit checksum, then the data.  The checksum is the
//! sum, mod 256, of the hex digit values of the address and data fields.
//! A record with count zero terminates the file and carries the start address.

use regex::Regex;
use crate::mem::SparseImage;
use crate::{STDRESULT,DYNERR};
use super::{Error,RecordFile,RecordFileType,RecordTag};

/// hard cap imposed by the 2 digit count field
pub const MAX_DATA_LEN: usize = 255;
const DEFAULT_DATA_LEN: usize = 16;
const ADDRESS_CEILING: u64 = 0xffff;

pub fn line_patt() -> Regex {
    Regex::new(r"^/([0-9A-Fa-f]{4})([0-9A-Fa-f]{2})([0-9A-Fa-f]{2})([0-9A-Fa-f]*)$").expect("unreachable")
}

#[derive(PartialEq,Eq,Clone,Copy,Debug)]
pub enum Tag {
    Data,
    Term
}

impl RecordTag for Tag {
    fn is_data(&self) -> bool {
        *self == Tag::Data
    }
    fn is_file_termination(&self) -> bool {
        *self == Tag::Term
    }
}

impl Tag {
    /// the termination record's address is the program entry point
    pub fn is_start(&self) -> bool {
        *self == Tag::Term
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
    pub fn count(&self) -> u8 {
        self.data.len() as u8
    }
    /// sum mod 256 of the hex digit values of the address and data fields
    pub fn checksum(&self) -> u8 {
        let addr = format!("{:04X}",self.address & 0xffff);
        let dat = hex::encode_upper(&self.data);
        (super::hex_digit_sum(&addr) + super::hex_digit_sum(&dat)) as u8
    }
    pub fn parse(line_num: usize,patt: &Regex,before: &[u8],body: &str,after: &[u8],lax: bool,warnings: &mut Vec<String>) -> Result<Self,Error> {
        let caps = match patt.captures(body) {
            Some(c) => c,
            None => return Err(Error::Parse { line: line_num, reason: "line does not fit the record layout".to_string() })
        };
        let address = super::hex_u64(line_num,&caps[1])?;
        let count = super::hex_u8(line_num,&caps[2])? as usize;
        let found = super::hex_u8(line_num,&caps[3])?;
        let data = super::hex_bytes(line_num,&caps[4])?;
        if data.len() != count {
            return Err(Error::Parse { line: line_num, reason: format!("count {} disagrees with line length",count) });
        }
        let ans = Self {
            tag: match count {
                0 => Tag::Term,
                _ => Tag::Data
            },
            address,
            data,
            before: before.to_vec(),
            after: after.to_vec()
        };
        if found != ans.checksum() {
            let err = Error::Checksum { line: line_num, expected: ans.checksum() as u32, found: found as u32 };
            if !lax {
                return Err(err);
            }
            warnings.push(err.to_string());
        }
        Ok(ans)
    }
    pub fn serialize(&self) -> Vec<u8> {
        let body = format!("/{:04X}{:02X}{:02X}{}",
            self.address & 0xffff,
            self.count(),
            self.checksum(),
            hex::encode_upper(&self.data));
        [self.before.clone(),body.into_bytes(),self.after.clone()].concat()
    }
    pub fn validate(&self) -> Vec<String> {
        let mut ans = Vec::new();
        if self.address > ADDRESS_CEILING {
            ans.push(format!("address {:X} does not fit 16 bits",self.address));
        }
        if self.data.len() > MAX_DATA_LEN {
            ans.push(format!("data length {} exceeds {}",self.data.len(),MAX_DATA_LEN));
        }
        ans
    }
}

/// Ordered records plus the sparse memory they project onto.
#[derive(Clone)]
pub struct TekFile {
    records: Vec<Record>,
    memory: SparseImage,
    start: Option<u64>,
    maxdatalen: usize,
    stale: bool
}

pub fn file_extensions() -> Vec<String> {
    super::file_extensions(RecordFileType::Tek)
}

impl TekFile {
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
    fn parse_records(&mut self,dat: &[u8],lax: bool) -> Result<Vec<String>,DYNERR> {
        let patt = line_patt();
        let mut warnings: Vec<String> = Vec::new();
        let mut records: Vec<Record> = Vec::new();
        let mut pending: Vec<u8> = Vec::new();
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
            let term = rec.tag.is_file_termination();
            records.push(rec);
            if term {
                term_at = Some(i);
                break;
            }
        }
        match term_at {
            Some(i) => {
                let rest: Vec<u8> = lines[i+1..].concat();
                if !rest.is_empty() {
                    log::warn!("{} bytes after the termination record are preserved but ignored",rest.len());
                    records.last_mut().unwrap().after.extend_from_slice(&rest);
                }
            },
            None => {
                let err = Error::Parse { line: lines.len(), reason: "missing termination record".to_string() };
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

impl RecordFile for TekFile {
    fn what_am_i(&self) -> RecordFileType {
        RecordFileType::Tek
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
        let mut start: Option<u64> = None;
        for rec in &self.records {
            match rec.tag {
                Tag::Data => memory.write(rec.address,&rec.data)?,
                Tag::Term => start = Some(rec.address)
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
        let blocks: Vec<(u64,Vec<u8>)> = self.memory.blocks().map(|(s,d)| (s,d.to_vec())).collect();
        for (block_start,dat) in blocks {
            let mut curs = 0usize;
            while curs < dat.len() {
                let stop = usize::min(dat.len(),curs + self.maxdatalen);
                records.push(Record::new(Tag::Data,block_start + curs as u64,dat[curs..stop].to_vec()));
                curs = stop;
            }
        }
        records.push(Record::new(Tag::Term,self.start.unwrap_or(0),Vec::new()));
        self.records = records;
        self.stale = false;
        Ok(())
    }
    fn validate_records(&self) -> Vec<String> {
        let mut ans: Vec<String> = Vec::new();
        let mut term_count = 0;
        for (i,rec) in self.records.iter().enumerate() {
            for msg in rec.validate() {
                ans.push(format!("record {}: {}",i+1,msg));
            }
            if rec.tag.is_file_termination() {
                term_count += 1;
                if i + 1 != self.records.len() {
                    ans.push(format!("record {}: termination is not the last record",i+1));
                }
            }
        }
        if term_count != 1 {
            ans.push(format!("expected exactly one termination record, found {}",term_count));
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
    // digit sum: address 1+0+0+0 plus data 2+0+C+0, count digits excluded
    let dat = b"/1000020F20C0\n/00000000\n";
    let mut f = TekFile::from_bytes(dat).expect("parse failed");
    assert_eq!(f.memory().read(0x1000,0x1002,None).expect("hole"),vec![0x20,0xc0]);
    assert_eq!(f.to_bytes().expect("serialize failed"),dat.to_vec());
}

#[test]
fn termination_carries_start() {
    let dat = b"/1000010311\n/20000002\n";
    let f = TekFile::from_bytes(dat).expect("parse failed");
    assert_eq!(f.start_address(),Some(0x2000));
}

#[test]
fn bad_checksum_strict_vs_lax() {
    let dat = b"/1000020820C0\n/00000000\n";
    assert!(TekFile::from_bytes(dat).is_err());
    let mut f = TekFile::new();
    let warnings = f.parse_lax(dat).expect("lax parse failed");
    assert_eq!(warnings.len(),1);
}

#[test]
fn update_splits_blocks() {
    let mut f = TekFile::new();
    f.set_max_data_len(4).expect("bad len");
    f.memory_mut().write(0x100,&[0xff;6]).expect("write failed");
    f.update_records().expect("update failed");
    let data_recs: Vec<&Record> = f.records().iter().filter(|r| r.tag.is_data()).collect();
    assert_eq!(data_recs.len(),2);
    assert_eq!((data_recs[0].address,data_recs[0].data.len()),(0x100,4));
    assert_eq!((data_recs[1].address,data_recs[1].data.len()),(0x104,2));
}
