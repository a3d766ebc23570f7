//! # Support for MOS Technology record files
//!
//! Every record is one line `;CCAAAADD...KKKK`: a 2 digit data byte count, a
//! 16 bit address, the data, and a 16 bit checksum equal to the sum of the
//! count byte, both address bytes, and the data bytes.  The file ends with a
//! zero count record whose address field carries the number of data records;
//! its checksum derives the same way.

use regex::Regex;
use crate::mem::SparseImage;
use crate::{STDRESULT,DYNERR};
use super::{Error,RecordFile,RecordFileType,RecordTag};

/// hard cap imposed by the 2 digit count field
pub const MAX_DATA_LEN: usize = 255;
const DEFAULT_DATA_LEN: usize = 24;
const ADDRESS_CEILING: u64 = 0xffff;

pub fn line_patt() -> Regex {
    Regex::new(r"^;([0-9A-Fa-f]{2})([0-9A-Fa-f]{4})([0-9A-Fa-f]*)([0-9A-Fa-f]{4})$").expect("unreachable")
}

#[derive(PartialEq,Eq,Clone,Copy,Debug)]
pub enum Tag {
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
    /// the EOF record's address field is the count of data records
    pub fn is_count(&self) -> bool {
        *self == Tag::Eof
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
    /// 16 bit sum of the count byte, address bytes, and data bytes
    pub fn checksum(&self) -> u16 {
        let mut sum: u32 = self.data.len() as u32;
        sum += (self.address >> 8) as u32 & 0xff;
        sum += self.address as u32 & 0xff;
        for b in &self.data {
            sum += *b as u32;
        }
        sum as u16
    }
    pub fn parse(line_num: usize,patt: &Regex,before: &[u8],body: &str,after: &[u8],lax: bool,warnings: &mut Vec<String>) -> Result<Self,Error> {
        let caps = match patt.captures(body) {
            Some(c) => c,
            None => return Err(Error::Parse { line: line_num, reason: "line does not fit the record layout".to_string() })
        };
        let count = super::hex_u8(line_num,&caps[1])? as usize;
        let address = super::hex_u64(line_num,&caps[2])?;
        let data = super::hex_bytes(line_num,&caps[3])?;
        if data.len() != count {
            return Err(Error::Parse { line: line_num, reason: format!("count {} disagrees with line length",count) });
        }
        let found = super::hex_u64(line_num,&caps[4])? as u16;
        let ans = Self {
            tag: match count {
                0 => Tag::Eof,
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
        let body = format!(";{:02X}{:04X}{}{:04X}",
            self.count(),
            self.address & 0xffff,
            hex::encode_upper(&self.data),
            self.checksum());
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
pub struct MosFile {
    records: Vec<Record>,
    memory: SparseImage,
    maxdatalen: usize,
    stale: bool
}

pub fn file_extensions() -> Vec<String> {
    super::file_extensions(RecordFileType::Mos)
}

impl MosFile {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            memory: SparseImage::new_bounded(None,Some(ADDRESS_CEILING + 1)),
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
        let mut data_count: u64 = 0;
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
            let mut rec = Record::parse(line_num,&patt,before,body,after,lax,&mut warnings)?;
            if !pending.is_empty() {
                let mut full = pending.clone();
                full.append(&mut rec.before);
                rec.before = full;
                pending.clear();
            }
            if rec.tag.is_data() {
                data_count += 1;
            }
            let eof = rec.tag.is_file_termination();
            if eof && rec.address != data_count {
                let err = Error::Validation { field: "count", reason: format!("line {}: EOF record says {}, file has {} data records",line_num,rec.address,data_count) };
                if !lax {
                    return Err(Box::new(err));
                }
                warnings.push(err.to_string());
            }
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
                    log::warn!("{} bytes after the EOF record are preserved but ignored",rest.len());
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

impl RecordFile for MosFile {
    fn what_am_i(&self) -> RecordFileType {
        RecordFileType::Mos
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
        for rec in &self.records {
            if rec.tag.is_data() {
                memory.write(rec.address,&rec.data)?;
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
        let mut data_count: u64 = 0;
        let blocks: Vec<(u64,Vec<u8>)> = self.memory.blocks().map(|(s,d)| (s,d.to_vec())).collect();
        for (block_start,dat) in blocks {
            let mut curs = 0usize;
            while curs < dat.len() {
                let stop = usize::min(dat.len(),curs + self.maxdatalen);
                records.push(Record::new(Tag::Data,block_start + curs as u64,dat[curs..stop].to_vec()));
                data_count += 1;
                curs = stop;
            }
        }
        records.push(Record::new(Tag::Eof,data_count & 0xffff,Vec::new()));
        self.records = records;
        self.stale = false;
        Ok(())
    }
    fn validate_records(&self) -> Vec<String> {
        let mut ans: Vec<String> = Vec::new();
        let mut eof_count = 0;
        let mut data_count: u64 = 0;
        for (i,rec) in self.records.iter().enumerate() {
            for msg in rec.validate() {
                ans.push(format!("record {}: {}",i+1,msg));
            }
            if rec.tag.is_data() {
                data_count += 1;
            }
            if rec.tag.is_file_termination() {
                eof_count += 1;
                if i + 1 != self.records.len() {
                    ans.push(format!("record {}: EOF is not the last record",i+1));
                } else if rec.address != data_count {
                    ans.push(format!("record {}: EOF says {} data records, file has {}",i+1,rec.address,data_count));
                }
            }
        }
        if eof_count != 1 {
            ans.push(format!("expected exactly one EOF record, found {}",eof_count));
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
    let dat = b";0300100102030019\n;0000010001\n";
    let mut f = MosFile::from_bytes(dat).expect("parse failed");
    assert_eq!(f.memory().read(0x10,0x13,None).expect("hole"),vec![1,2,3]);
    assert_eq!(f.to_bytes().expect("serialize failed"),dat.to_vec());
}

#[test]
fn sixteen_bit_checksum() {
    let rec = Record::new(Tag::Data,0xfff0,vec![0xff,0xff,0xff]);
    // 3 + 0xff + 0xf0 + 3*0xff
    assert_eq!(rec.checksum(),0x04ef);
}

#[test]
fn record_count_mismatch_rejected() {
    let dat = b";0300100102030019\n;0000020002\n";
    assert!(MosFile::from_bytes(dat).is_err());
    let mut f = MosFile::new();
    let warnings = f.parse_lax(dat).expect("lax parse failed");
    assert_eq!(warnings.len(),1);
}

#[test]
fn empty_image_is_eof_only() {
    let mut f = MosFile::new();
    assert_eq!(f.to_bytes().expect("serialize failed"),b";0000000000\n".to_vec());
}
