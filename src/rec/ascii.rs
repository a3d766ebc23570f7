//! # Support for ASCII-hex record files
//!
//! The stream is free form rather than line oriented: hex byte pairs separated
//! by whitespace, `$AXXXX,` markers that reset the running address, optional
//! `$SXXXX,` markers carrying a 16 bit sum of the data bytes since the last
//! marker, and an ETX character that terminates the file.  A leading STX is
//! tolerated and preserved.
//!
//! A data record here is a maximal run of byte pairs separated by single
//! spaces; any other separator closes the run.  Together with the `before`
//! bytes this keeps the round trip byte exact without a record per byte.

use crate::mem::SparseImage;
use crate::{STDRESULT,DYNERR};
use super::{Error,RecordFile,RecordFileType,RecordTag};

pub const MAX_DATA_LEN: usize = 255;
const DEFAULT_DATA_LEN: usize = 16;
const ADDRESS_CEILING: u64 = 0xffffffff;
const STX: u8 = 0x02;
const ETX: u8 = 0x03;

#[derive(PartialEq,Eq,Clone,Copy,Debug)]
pub enum Tag {
    Address,
    Data,
    Checksum,
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
    pub fn is_checksum(&self) -> bool {
        *self == Tag::Checksum
    }
}

/// One scanned token run.  Address and checksum markers keep their value in
/// `address`; the checksum is over the data bytes since the previous marker.
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
            after: Vec::new()
        }
    }
    pub fn serialize(&self) -> Vec<u8> {
        let body = match self.tag {
            Tag::Address => format!("$A{:04X},",self.address),
            Tag::Checksum => format!("$S{:04X},",self.address),
            Tag::Eof => "\x03".to_string(),
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
        if self.tag.is_checksum() && self.address > 0xffff {
            ans.push(format!("checksum {:X} does not fit 16 bits",self.address));
        }
        ans
    }
}

/// Ordered records plus the sparse memory they project onto.
#[derive(Clone)]
pub struct AsciiHexFile {
    records: Vec<Record>,
    memory: SparseImage,
    maxdatalen: usize,
    stale: bool
}

pub fn file_extensions() -> Vec<String> {
    super::file_extensions(RecordFileType::AsciiHex)
}

impl AsciiHexFile {
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
        let mut warnings: Vec<String> = Vec::new();
        let mut records: Vec<Record> = Vec::new();
        let mut pending: Vec<u8> = Vec::new();
        let mut line_num = 1;
        let mut running_sum: u32 = 0;
        let mut got_etx = false;
        let mut i = 0;
        while i < dat.len() {
            let c = dat[i];
            if c == ETX {
                records.push(Record {
                    tag: Tag::Eof,
                    address: 0,
                    data: Vec::new(),
                    before: std::mem::take(&mut pending),
                    after: dat[i+1..].to_vec()
                });
                got_etx = true;
                if i + 1 < dat.len() {
                    log::warn!("{} bytes after the terminator are preserved but ignored",dat.len()-i-1);
                }
                break;
            }
            if c.is_ascii_whitespace() || c == STX {
                if c == b'\n' {
                    line_num += 1;
                }
                pending.push(c);
                i += 1;
                continue;
            }
            if c == b'$' {
                let kind = match dat.get(i+1) {
                    Some(b'A') => Tag::Address,
                    Some(b'S') => Tag::Checksum,
                    _ => return Err(Box::new(Error::Parse { line: line_num, reason: "unknown marker".to_string() }))
                };
                let mut j = i + 2;
                let mut digits = String::new();
                while j < dat.len() && (dat[j] as char).is_ascii_hexdigit() {
                    digits.push(dat[j] as char);
                    j += 1;
                }
                if digits.is_empty() || digits.len() > 8 || dat.get(j) != Some(&b',') {
                    return Err(Box::new(Error::Parse { line: line_num, reason: "malformed marker".to_string() }));
                }
                let val = super::hex_u64(line_num,&digits)?;
                if kind.is_checksum() && val != running_sum as u64 {
                    let err = Error::Checksum { line: line_num, expected: running_sum, found: val as u32 };
                    if !lax {
                        return Err(Box::new(err));
                    }
                    warnings.push(err.to_string());
                }
                running_sum = 0;
                records.push(Record {
                    tag: kind,
                    address: val,
                    data: Vec::new(),
                    before: std::mem::take(&mut pending),
                    after: Vec::new()
                });
                i = j + 1;
                continue;
            }
            if (c as char).is_ascii_hexdigit() {
                let before = std::mem::take(&mut pending);
                let mut bytes: Vec<u8> = Vec::new();
                loop {
                    match dat.get(i+1) {
                        Some(d) if (*d as char).is_ascii_hexdigit() => {
                            let pair = std::str::from_utf8(&dat[i..i+2]).expect("unreachable");
                            bytes.push(super::hex_u8(line_num,pair)?);
                            i += 2;
                        },
                        _ => return Err(Box::new(Error::Parse { line: line_num, reason: "stray hex digit".to_string() }))
                    }
                    // a single space joins the run, anything else closes it
                    match (dat.get(i),dat.get(i+1)) {
                        (Some(b' '),Some(d)) if (*d as char).is_ascii_hexdigit() => i += 1,
                        _ => break
                    }
                }
                for b in &bytes {
                    running_sum = (running_sum + *b as u32) & 0xffff;
                }
                records.push(Record {
                    tag: Tag::Data,
                    address: 0,
                    data: bytes,
                    before,
                    after: Vec::new()
                });
                continue;
            }
            return Err(Box::new(Error::Parse { line: line_num, reason: format!("unexpected character 0x{:02X}",c) }));
        }
        if !got_etx {
            let err = Error::Parse { line: line_num, reason: "missing ETX terminator".to_string() };
            if !lax {
                return Err(Box::new(err));
            }
            warnings.push(err.to_string());
            if let Some(last) = records.last_mut() {
                last.after.append(&mut pending);
            }
        }
        self.records = records;
        self.apply_records()?;
        Ok(warnings)
    }
}

impl RecordFile for AsciiHexFile {
    fn what_am_i(&self) -> RecordFileType {
        RecordFileType::AsciiHex
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
                Tag::Checksum | Tag::Eof => {}
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
            let mut addr_rec = Record::new(Tag::Address,block_start,Vec::new());
            if !records.is_empty() {
                addr_rec.before = b"\n".to_vec();
            }
            records.push(addr_rec);
            let mut curs = 0usize;
            while curs < dat.len() {
                let stop = usize::min(dat.len(),curs + self.maxdatalen);
                let mut rec = Record::new(Tag::Data,0,dat[curs..stop].to_vec());
                rec.before = b"\n".to_vec();
                records.push(rec);
                curs = stop;
            }
        }
        let mut eof = Record::new(Tag::Eof,0,Vec::new());
        if !records.is_empty() {
            eof.before = b"\n".to_vec();
        }
        records.push(eof);
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
            ans.push(format!("expected exactly one ETX record, found {}",eof_count));
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
    let dat = b"$A1000,\nAA BB\n\x03";
    let mut f = AsciiHexFile::from_bytes(dat).expect("parse failed");
    assert_eq!(f.memory().read(0x1000,0x1002,None).expect("hole"),vec![0xaa,0xbb]);
    assert_eq!(f.to_bytes().expect("serialize failed"),dat.to_vec());
}

#[test]
fn data_before_any_marker_lands_at_zero() {
    let dat = b"01 02 03\n\x03";
    let f = AsciiHexFile::from_bytes(dat).expect("parse failed");
    assert_eq!(f.memory().read(0,3,None).expect("hole"),vec![1,2,3]);
}

#[test]
fn checksum_marker_verified() {
    // 0xAA + 0xBB = 0x165
    let good = b"$A1000,AA BB $S0165,\x03";
    let f = AsciiHexFile::from_bytes(good).expect("parse failed");
    assert_eq!(f.records().iter().filter(|r| r.tag.is_checksum()).count(),1);
    let bad = b"$A1000,AA BB $S0166,\x03";
    assert!(AsciiHexFile::from_bytes(bad).is_err());
    let mut lax = AsciiHexFile::new();
    let warnings = lax.parse_lax(bad).expect("lax parse failed");
    assert_eq!(warnings.len(),1);
}

#[test]
fn odd_separators_split_records_but_round_trip() {
    let dat = b"\x0201 02  03\n04\n\x03tail";
    let mut f = AsciiHexFile::from_bytes(dat).expect("parse failed");
    assert_eq!(f.memory().read(0,4,None).expect("hole"),vec![1,2,3,4]);
    let data_recs = f.records().iter().filter(|r| r.tag.is_data()).count();
    assert_eq!(data_recs,3);
    assert_eq!(f.to_bytes().expect("serialize failed"),dat.to_vec());
}

#[test]
fn empty_image_is_terminator_only() {
    let mut f = AsciiHexFile::new();
    assert_eq!(f.to_bytes().expect("serialize failed"),b"\x03".to_vec());
}
