//! # Support for raw binary files
//!
//! The whole file is the byte payload: parsing yields one data record at
//! address zero, serializing emits the bytes from the first populated address
//! to the end.  The wire carries no addresses, so an image offset does not
//! survive a save and reload; interior holes are filled with zeros and logged.

use log::warn;
use crate::mem::SparseImage;
use crate::{STDRESULT,DYNERR};
use super::{Error,RecordFile,RecordFileType,RecordTag};

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

/// The single record of a raw file.  The address orients `apply_records`
/// but never reaches the wire.
#[derive(Clone,Debug)]
pub struct Record {
    pub tag: Tag,
    pub address: u64,
    pub data: Vec<u8>
}

impl Record {
    pub fn new(address: u64,data: Vec<u8>) -> Self {
        Self {
            tag: Tag::Data,
            address,
            data
        }
    }
    pub fn serialize(&self) -> Vec<u8> {
        self.data.clone()
    }
}

/// At most one record plus the sparse memory it projects onto.
#[derive(Clone)]
pub struct BinaryFile {
    records: Vec<Record>,
    memory: SparseImage,
    stale: bool
}

pub fn file_extensions() -> Vec<String> {
    super::file_extensions(RecordFileType::Binary)
}

impl BinaryFile {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            memory: SparseImage::new(),
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
}

impl RecordFile for BinaryFile {
    fn what_am_i(&self) -> RecordFileType {
        RecordFileType::Binary
    }
    fn file_extensions(&self) -> Vec<String> {
        file_extensions()
    }
    fn parse(&mut self,dat: &[u8]) -> STDRESULT {
        self.records = match dat.len() {
            0 => Vec::new(),
            _ => vec![Record::new(0,dat.to_vec())]
        };
        self.apply_records()
    }
    fn parse_lax(&mut self,dat: &[u8]) -> Result<Vec<String>,DYNERR> {
        self.parse(dat)?;
        Ok(Vec::new())
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
        for rec in &self.records {
            memory.write(rec.address,&rec.data)?;
        }
        self.memory = memory;
        self.stale = false;
        Ok(())
    }
    fn update_records(&mut self) -> STDRESULT {
        self.records = match (self.memory.first(),self.memory.end()) {
            (Some(s),Some(e)) => {
                if !self.memory.contiguous() {
                    warn!("filling {} unpopulated bytes with zeros",self.memory.holes().iter().map(|(a,b)| b-a).sum::<u64>());
                }
                vec![Record::new(s,self.memory.read(s,e,Some(0))?)]
            },
            _ => Vec::new()
        };
        self.stale = false;
        Ok(())
    }
    fn validate_records(&self) -> Vec<String> {
        match self.records.len() {
            0 | 1 => Vec::new(),
            n => vec![format!("expected at most one record, found {}",n)]
        }
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
        usize::MAX
    }
    fn set_max_data_len(&mut self,len: usize) -> STDRESULT {
        match len {
            0 => Err(Box::new(Error::Validation { field: "maxdatalen", reason: "must be at least 1".to_string() })),
            _ => Ok(())
        }
    }
    fn address_ceiling(&self) -> u64 {
        u64::MAX
    }
}

#[test]
fn whole_file_is_one_record() {
    let mut f = BinaryFile::from_bytes(b"hello").expect("parse failed");
    assert_eq!(f.records().len(),1);
    assert_eq!(f.memory().read(0,5,None).expect("hole"),b"hello".to_vec());
    assert_eq!(f.to_bytes().expect("serialize failed"),b"hello".to_vec());
}

#[test]
fn interior_holes_fill_with_zeros() {
    let mut f = BinaryFile::new();
    f.memory_mut().write(0x10,&[1]).expect("write failed");
    f.memory_mut().write(0x12,&[2]).expect("write failed");
    assert_eq!(f.to_bytes().expect("serialize failed"),vec![1,0,2]);
}

#[test]
fn offset_survives_the_record_round_trip() {
    let mut f = BinaryFile::new();
    f.memory_mut().write(0x100,&[7,8]).expect("write failed");
    f.update_records().expect("update failed");
    let before = f.memory().clone();
    f.apply_records().expect("apply failed");
    assert_eq!(f.memory(),&before);
}

#[test]
fn empty_file_parses_empty() {
    let f = BinaryFile::from_bytes(b"").expect("parse failed");
    assert!(f.memory().is_empty());
}
