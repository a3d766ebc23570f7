//! # Support for extended Tektronix hex files
//!
//! Every record is one line `%LLTKKNAA..DD..`: a 2 digit length counting all
//! characters after the percent sign (the length digits included), a 1 digit
//! tag (6 data, 8 termination), a 2 digit checksum, then a variable length
//! address whose digit count is given by the leading nibble `N` (0 meaning 16),
//! then the data.  The checksum is the sum, mod 256, of the hex digit values
//! of every field except the checksum itself.
//!
//! The variable address field reaches the full 64 bit space, so this is the
//! only text format here with no address ceiling.

use regex::Regex;
use crate::mem::SparseImage;
use crate::{STDRESULT,DYNERR};
use super::{Error,RecordFile,RecordFileType,RecordTag};

/// keeps the length field under its 2 digit cap with the longest address
pub const MAX_DATA_LEN: usize = 64;
const DEFAULT_DATA_LEN: usize = 16;

pub fn line_patt() -> Regex {
    Regex::new(r"^%([0-9A-Fa-f]{2})([0-9A-Fa-f])([0-9A-Fa-f]{2})([0-9A-Fa-f])([0-9A-Fa-f]*)$").expect("unreachable")
}

#[derive(PartialEq,Eq,Clone,Copy,Debug)]
pub enum Tag {
    Data = 6,
    Term = 8
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

/// One parsed line.  The address digit count from the wire is kept so a
/// zero padded address round trips unchanged.
#[derive(Clone,Debug)]
pub struct Record {
    pub tag: Tag,
    pub address: u64,
    pub addr_digits: usize,
    pub data: Vec<u8>,
    pub before: Vec<u8>,
    pub after: Vec<u8>
}

impl Record {
    pub fn new(tag: Tag,address: u64,data: Vec<u8>) -> Self {
        Self {
            tag,
            address,
            addr_digits: format!("{:X}",address).len(),
            data,
            before: Vec::new(),
            after: b"\n".to_vec()
        }
    }
    /// characters after the percent sign, the length digits included
    pub fn count(&self) -> u8 {
        (6 + self.addr_digits + 2 * self.data.len()) as u8
    }
    fn fields(&self) -> (String,char,char,String,String) {
        let nibble = char::from_digit((self.addr_digits % 16) as u32,16).expect("unreachable").to_ascii_uppercase();
        (
            format!("{:02X}",self.count()),
            char::from_digit(self.tag as u32,16).expect("unreachable"),
            nibble,
            format!("{:0>width$X}",self.address,width = self.addr_digits),
            hex::encode_upper(&self.data)
        )
    }
    /// sum mod 256 of the hex digit values of every field except the checksum
    pub fn checksum(&self) -> u8 {
        let (ll,tag,nibble,addr,dat) = self.fields();
        let mut sum = super::hex_digit_sum(&ll) + super::hex_digit_sum(&addr) + super::hex_digit_sum(&dat);
        sum += tag.to_digit(16).expect("unreachable");
        sum += nibble.to_digit(16).expect("unreachable");
        sum as u8
    }
    pub fn parse(line_num: usize,patt: &Regex,before: &[u8],body: &str,after: &[u8],lax: bool,warnings: &mut Vec<String>) -> Result<Self,Error> {
        let caps = match patt.captures(body) {
            Some(c) => c,
            None => return Err(Error::Parse { line: line_num, reason: "line does not fit the record layout".to_string() })
        };
        let length = super::hex_u8(line_num,&caps[1])? as usize;
        let tag = match &caps[2] {
            "6" => Tag::Data,
            "8" => Tag::Term,
            d => return Err(Error::Parse { line: line_num, reason: format!("unsupported record tag {}",d) })
        };
        let found = super::hex_u8(line_num,&caps[3])?;
        let addr_digits = match caps[4].chars().next().unwrap().to_digit(16).expect("unreachable") {
            0 => 16,
            n => n as usize
        };
        let rest = &caps[5];
        if rest.len() < addr_digits {
            return Err(Error::Parse { line: line_num, reason: "line too short for the address field".to_string() });
        }
        let address = super::hex_u64(line_num,&rest[..addr_digits])?;
        let data = super::hex_bytes(line_num,&rest[addr_digits..])?;
        let ans = Self {
            tag,
            address,
            addr_digits,
            data,
            before: before.to_vec(),
            after: after.to_vec()
        };
        if length != ans.count() as usize {
            return Err(Error::Parse { line: line_num, reason: format!("length {} disagrees with line layout",length) });
        }
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
        let (ll,tag,nibble,addr,dat) = self.fields();
        let body = format!("%{}{}{:02X}{}{}{}",ll,tag,self.checksum(),nibble,addr,dat);
        [self.before.clone(),body.into_bytes(),self.after.clone()].concat()
    }
    pub fn validate(&self) -> Vec<String> {
        let mut ans = Vec::new();
        if self.addr_digits < 1 || self.addr_digits > 16 {
            ans.push(format!("address field of {} digits",self.addr_digits));
        }
        if self.addr_digits < 16 && self.address >> (4 * self.addr_digits) != 0 {
            ans.push(format!("address {:X} does not fit {} digits",self.address,self.addr_digits));
        }
        if self.data.len() > MAX_DATA_LEN {
            ans.push(format!("data length {} exceeds {}",self.data.len(),MAX_DATA_LEN));
        }
        ans
    }
}

/// Ordered records plus the sparse memory they project onto.
#[derive(Clone)]
pub struct XTekFile {
    records: Vec<Record>,
    memory: SparseImage,
    start: Option<u64>,
    maxdatalen: usize,
    stale: bool
}

pub fn file_extensions() -> Vec<String> {
    super::file_extensions(RecordFileType::XTek)
}

impl XTekFile {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            memory: SparseImage::new(),
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

impl RecordFile for XTekFile {
    fn what_am_i(&self) -> RecordFileType {
        RecordFileType::XTek
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
        let mut memory = SparseImage::new();
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
        self.memory = mem.clone();
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
        self.start = addr;
        self.stale = true;
        Ok(())
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
        u64::MAX
    }
}

#[test]
fn parse_and_round_trip() {
    let dat = b"%0C62B41000AA\n%0781010\n";
    let mut f = XTekFile::from_bytes(dat).expect("parse failed");
    assert_eq!(f.memory().read(0x1000,0x1001,None).expect("hole"),vec![0xaa]);
    assert_eq!(f.start_address(),Some(0));
    assert_eq!(f.to_bytes().expect("serialize failed"),dat.to_vec());
}

#[test]
fn serialize_known_record() {
    let rec = Record::new(Tag::Data,0x8000,vec![0x12,0x34]);
    assert_eq!(rec.serialize(),b"%0E62A480001234\n".to_vec());
    let term = Record::new(Tag::Term,0x8000,Vec::new());
    assert_eq!(term.serialize(),b"%0A81E48000\n".to_vec());
}

#[test]
fn zero_padded_address_round_trips() {
    let mut warnings = Vec::new();
    let patt = line_patt();
    // eight digit address with leading zeros
    let body = "%10624800001000AA";
    let rec = Record::parse(1,&patt,b"",body,b"\n",false,&mut warnings).expect("parse failed");
    assert_eq!(rec.address,0x1000);
    assert_eq!(rec.addr_digits,8);
    assert_eq!(rec.serialize(),[body.as_bytes(),b"\n"].concat());
}

#[test]
fn length_mismatch_rejected() {
    let dat = b"%0D62B41000AA\n%0781010\n";
    assert!(XTekFile::from_bytes(dat).is_err());
}

#[test]
fn wide_addresses_accepted() {
    let mut f = XTekFile::new();
    f.memory_mut().write(0x123456789a,&[1]).expect("write failed");
    f.update_records().expect("update failed");
    let wire = f.to_bytes().expect("serialize failed");
    let f2 = XTekFile::from_bytes(&wire).expect("parse failed");
    assert_eq!(f2.memory(),f.memory());
}
