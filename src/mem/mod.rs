//! # Sparse Memory Module
//!
//! A `SparseImage` stores possibly non-contiguous bytes keyed by absolute address.
//! It is the in-memory representation shared by every record file type: parsing
//! projects records onto a `SparseImage`, serializing walks the image's blocks
//! to regenerate records.
//!
//! ## Blocks
//!
//! Storage is a sorted vector of non-overlapping, non-touching blocks `(start,data)`.
//! Every mutation maintains this by splitting and coalescing as needed, so the
//! block list observed through `blocks` is always canonical.  Range operations
//! locate affected blocks by binary search on the block start.
//!
//! ## Bounds
//!
//! An image may carry half-open bounds.  Writes outside the bounds are refused.
//! Record file types use bounds to enforce their address ceiling, e.g. an Intel
//! HEX file hands out memory bounded to the 32 bit space.
//!
//! ## Failure Semantics
//!
//! Operations either succeed or leave the image unchanged.  Anything that can
//! fail validates its arguments against the current state before mutating.

use crate::STDRESULT;
use crate::DYNERR;

/// Enumerates sparse memory errors.  The `Display` trait will print the equivalent long message.
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("address out of bounds")]
    Bounds,
    #[error("range crossed unpopulated addresses")]
    Hole,
    #[error("pattern not found")]
    NotFound,
    #[error("range start exceeds end")]
    BadRange,
    #[error("address arithmetic overflowed")]
    Overflow
}

/// A maximal contiguous run of populated bytes at an absolute address.
#[derive(Clone,PartialEq,Debug)]
pub struct Block {
    start: u64,
    data: Vec<u8>
}

impl Block {
    fn end(&self) -> u64 {
        self.start + self.data.len() as u64
    }
}

/// Address-indexed byte container with holes.
/// Equality compares the address-to-byte mapping; bounds are not compared.
#[derive(Clone,Debug)]
pub struct SparseImage {
    blocks: Vec<Block>,
    bounds_start: Option<u64>,
    bounds_end: Option<u64>
}

impl PartialEq for SparseImage {
    fn eq(&self,other: &Self) -> bool {
        self.blocks == other.blocks
    }
}

impl SparseImage {
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            bounds_start: None,
            bounds_end: None
        }
    }
    /// Create an empty image with half-open bounds, `None` meaning unbounded on that side.
    pub fn new_bounded(bounds_start: Option<u64>,bounds_end: Option<u64>) -> Self {
        Self {
            blocks: Vec::new(),
            bounds_start,
            bounds_end
        }
    }
    /// Create an image holding `dat` as one block at `offset`.
    pub fn from_buffer(offset: u64,dat: &[u8]) -> Self {
        let mut ans = Self::new();
        if dat.len() > 0 {
            ans.blocks.push(Block { start: offset, data: dat.to_vec() });
        }
        ans
    }
    pub fn bounds(&self) -> (Option<u64>,Option<u64>) {
        (self.bounds_start,self.bounds_end)
    }
    pub fn set_bounds(&mut self,bounds_start: Option<u64>,bounds_end: Option<u64>) {
        self.bounds_start = bounds_start;
        self.bounds_end = bounds_end;
    }
    /// First populated address, or None if the image is empty.
    pub fn first(&self) -> Option<u64> {
        self.blocks.first().map(|b| b.start)
    }
    /// One past the last populated address, or None if the image is empty.
    pub fn end(&self) -> Option<u64> {
        self.blocks.last().map(|b| b.end())
    }
    /// Distance from the first populated address to the end, 0 if empty.
    pub fn span(&self) -> u64 {
        match (self.first(),self.end()) {
            (Some(s),Some(e)) => e - s,
            _ => 0
        }
    }
    /// True iff there are no holes: zero blocks, or a single block which,
    /// when bounds are set, covers the bounded range exactly.
    pub fn contiguous(&self) -> bool {
        match self.blocks.len() {
            0 => true,
            1 => {
                let b = &self.blocks[0];
                match (self.bounds_start,self.bounds_end) {
                    (Some(s),Some(e)) => b.start==s && b.end()==e,
                    (Some(s),None) => b.start==s,
                    (None,Some(e)) => b.end()==e,
                    (None,None) => true
                }
            },
            _ => false
        }
    }
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
    /// Count of populated bytes (holes excluded).
    pub fn byte_count(&self) -> usize {
        self.blocks.iter().map(|b| b.data.len()).sum()
    }
    /// Visit every block as `(start,bytes)` in ascending address order.
    pub fn blocks(&self) -> impl Iterator<Item = (u64,&[u8])> + '_ {
        self.blocks.iter().map(|b| (b.start,b.data.as_slice()))
    }
    /// Index of the block starting at the address, or the insertion point.
    fn search(&self,addr: u64) -> Result<usize,usize> {
        self.blocks.binary_search_by(|b| b.start.cmp(&addr))
    }
    /// Index of the first block that ends after `addr`, i.e. the first block
    /// that could intersect a range starting at `addr`.
    fn first_intersecting(&self,addr: u64) -> usize {
        match self.search(addr) {
            Ok(i) => i,
            Err(i) => {
                if i > 0 && self.blocks[i-1].end() > addr {
                    i - 1
                } else {
                    i
                }
            }
        }
    }
    fn check_range(start: u64,end: u64) -> STDRESULT {
        if start > end {
            return Err(Box::new(Error::BadRange));
        }
        Ok(())
    }
    fn check_bounds(&self,start: u64,end: u64) -> STDRESULT {
        if let Some(s) = self.bounds_start {
            if start < s {
                return Err(Box::new(Error::Bounds));
            }
        }
        if let Some(e) = self.bounds_end {
            if end > e {
                return Err(Box::new(Error::Bounds));
            }
        }
        Ok(())
    }
    /// Remove all bytes in `[start,end)`, no checks, blocks that straddle are split.
    fn delete_unchecked(&mut self,start: u64,end: u64) {
        if start >= end || self.blocks.is_empty() {
            return;
        }
        let i0 = self.first_intersecting(start);
        let mut i1 = i0;
        let mut keep: Vec<Block> = Vec::new();
        while i1 < self.blocks.len() && self.blocks[i1].start < end {
            let b = &self.blocks[i1];
            if b.start < start {
                keep.push(Block { start: b.start, data: b.data[..(start-b.start) as usize].to_vec() });
            }
            if b.end() > end {
                keep.push(Block { start: end, data: b.data[(end-b.start) as usize..].to_vec() });
            }
            i1 += 1;
        }
        self.blocks.splice(i0..i1,keep);
    }
    /// Concatenate the block at `idx` with either neighbor it touches.
    fn coalesce(&mut self,idx: usize) {
        if idx + 1 < self.blocks.len() && self.blocks[idx].end() == self.blocks[idx+1].start {
            let mut next = self.blocks.remove(idx+1);
            self.blocks[idx].data.append(&mut next.data);
        }
        if idx > 0 && self.blocks[idx-1].end() == self.blocks[idx].start {
            let mut curr = self.blocks.remove(idx);
            self.blocks[idx-1].data.append(&mut curr.data);
        }
    }
    fn write_unchecked(&mut self,offset: u64,dat: &[u8]) {
        if dat.len() == 0 {
            return;
        }
        self.delete_unchecked(offset,offset + dat.len() as u64);
        let idx = match self.search(offset) {
            Ok(i) => i,
            Err(i) => i
        };
        self.blocks.insert(idx,Block { start: offset, data: dat.to_vec() });
        self.coalesce(idx);
    }
    /// Overwrite `[offset,offset+dat.len())`, replacing anything already there.
    /// Adjacent blocks coalesce.  Fails if the range escapes the bounds.
    pub fn write(&mut self,offset: u64,dat: &[u8]) -> STDRESULT {
        let end = match offset.checked_add(dat.len() as u64) {
            Some(e) => e,
            None => return Err(Box::new(Error::Overflow))
        };
        self.check_bounds(offset,end)?;
        self.write_unchecked(offset,dat);
        Ok(())
    }
    /// Return `end-start` bytes.  Unpopulated addresses yield the `fill` byte;
    /// if `fill` is None any hole in the range is an error.
    pub fn read(&self,start: u64,end: u64,fill: Option<u8>) -> Result<Vec<u8>,DYNERR> {
        Self::check_range(start,end)?;
        let mut ans: Vec<u8> = Vec::new();
        let mut curs = start;
        let mut idx = self.first_intersecting(start);
        while curs < end {
            if idx >= self.blocks.len() || self.blocks[idx].start >= end {
                match fill {
                    Some(v) => ans.resize(ans.len() + (end-curs) as usize,v),
                    None => return Err(Box::new(Error::Hole))
                };
                break;
            }
            let b = &self.blocks[idx];
            if b.start > curs {
                match fill {
                    Some(v) => ans.resize(ans.len() + (b.start-curs) as usize,v),
                    None => return Err(Box::new(Error::Hole))
                };
                curs = b.start;
            }
            let stop = u64::min(b.end(),end);
            ans.extend_from_slice(&b.data[(curs-b.start) as usize..(stop-b.start) as usize]);
            curs = stop;
            idx += 1;
        }
        Ok(ans)
    }
    /// New image holding only the blocks intersecting `[start,end)`, clipped
    /// to the range.  This image is unchanged; bounds are not carried over.
    pub fn extract(&self,start: u64,end: u64) -> Result<SparseImage,DYNERR> {
        Self::check_range(start,end)?;
        let mut ans = SparseImage::new();
        let mut idx = self.first_intersecting(start);
        while idx < self.blocks.len() && self.blocks[idx].start < end {
            let b = &self.blocks[idx];
            let s = u64::max(b.start,start);
            let e = u64::min(b.end(),end);
            if s < e {
                ans.blocks.push(Block { start: s, data: b.data[(s-b.start) as usize..(e-b.start) as usize].to_vec() });
            }
            idx += 1;
        }
        Ok(ans)
    }
    /// Remove all bytes in `[start,end)`, leaving a hole.
    pub fn delete(&mut self,start: u64,end: u64) -> STDRESULT {
        Self::check_range(start,end)?;
        self.delete_unchecked(start,end);
        Ok(())
    }
    /// Synonym of `delete`.
    pub fn clear(&mut self,start: u64,end: u64) -> STDRESULT {
        self.delete(start,end)
    }
    /// Remove all bytes in `[start,end)` and shift everything at or above `end`
    /// down so the gap closes.
    pub fn remove(&mut self,start: u64,end: u64) -> STDRESULT {
        Self::check_range(start,end)?;
        self.delete_unchecked(start,end);
        let idx = match self.search(end) {
            Ok(i) => i,
            Err(i) => i
        };
        for i in idx..self.blocks.len() {
            self.blocks[i].start -= end - start;
        }
        if idx > 0 && idx < self.blocks.len() && self.blocks[idx-1].end() == self.blocks[idx].start {
            self.coalesce(idx);
        }
        Ok(())
    }
    /// Delete everything outside `[start,end)` and set the bounds to the range.
    pub fn crop(&mut self,start: u64,end: u64) -> STDRESULT {
        Self::check_range(start,end)?;
        if let Some(s) = self.first() {
            if s < start {
                self.delete_unchecked(s,start);
            }
        }
        if let Some(e) = self.end() {
            if e > end {
                self.delete_unchecked(end,e);
            }
        }
        self.bounds_start = Some(start);
        self.bounds_end = Some(end);
        Ok(())
    }
    /// Translate every block by `amount`.  Fails if the shifted range would
    /// fall below zero, overflow, or collide with the bounds.
    pub fn shift(&mut self,amount: i64) -> STDRESULT {
        if self.blocks.is_empty() || amount == 0 {
            return Ok(());
        }
        let first = self.first().unwrap();
        let end = self.end().unwrap();
        let (new_first,new_end) = if amount < 0 {
            let mag = amount.unsigned_abs();
            if first < mag {
                return Err(Box::new(Error::Overflow));
            }
            (first - mag,end - mag)
        } else {
            match end.checked_add(amount as u64) {
                Some(e) => (first + amount as u64,e),
                None => return Err(Box::new(Error::Overflow))
            }
        };
        self.check_bounds(new_first,new_end)?;
        for b in self.blocks.iter_mut() {
            if amount < 0 {
                b.start -= amount.unsigned_abs();
            } else {
                b.start += amount as u64;
            }
        }
        Ok(())
    }
    /// Populate all of `[start,end)` with the pattern, overwriting existing data.
    /// The byte at address `a` is `pattern[(a-start) % pattern.len()]`, i.e. the
    /// pattern is aligned to the start of the fill range.
    pub fn fill(&mut self,start: u64,end: u64,pattern: &[u8]) -> STDRESULT {
        Self::check_range(start,end)?;
        if pattern.len() == 0 {
            return Err(Box::new(Error::BadRange));
        }
        self.check_bounds(start,end)?;
        let mut dat: Vec<u8> = Vec::new();
        for i in 0..(end-start) as usize {
            dat.push(pattern[i % pattern.len()]);
        }
        self.write_unchecked(start,&dat);
        Ok(())
    }
    /// Like `fill`, but existing data is preserved; only the holes are filled.
    /// The pattern is aligned to `start` no matter where the holes are.
    pub fn flood(&mut self,start: u64,end: u64,pattern: &[u8]) -> STDRESULT {
        Self::check_range(start,end)?;
        if pattern.len() == 0 {
            return Err(Box::new(Error::BadRange));
        }
        self.check_bounds(start,end)?;
        let mut gaps: Vec<(u64,u64)> = Vec::new();
        let mut curs = start;
        let mut idx = self.first_intersecting(start);
        while curs < end {
            if idx >= self.blocks.len() || self.blocks[idx].start >= end {
                gaps.push((curs,end));
                break;
            }
            let b_start = self.blocks[idx].start;
            let b_end = self.blocks[idx].end();
            if b_start > curs {
                gaps.push((curs,b_start));
            }
            curs = u64::max(curs,b_end);
            idx += 1;
        }
        for (gs,ge) in gaps {
            let mut dat: Vec<u8> = Vec::new();
            for a in gs..ge {
                dat.push(pattern[((a-start) % pattern.len() as u64) as usize]);
            }
            self.write_unchecked(gs,&dat);
        }
        Ok(())
    }
    /// Scan the populated runs inside the range for the pattern and return the
    /// absolute address of the first match.  Matches never span holes.
    pub fn find(&self,pattern: &[u8],start: Option<u64>,end: Option<u64>) -> Result<u64,DYNERR> {
        if pattern.len() == 0 {
            return Err(Box::new(Error::BadRange));
        }
        let start = start.unwrap_or(self.first().unwrap_or(0));
        let end = end.unwrap_or(self.end().unwrap_or(0));
        Self::check_range(start,end)?;
        let mut idx = self.first_intersecting(start);
        while idx < self.blocks.len() && self.blocks[idx].start < end {
            let b = &self.blocks[idx];
            let s = u64::max(b.start,start);
            let e = u64::min(b.end(),end);
            let run = &b.data[(s-b.start) as usize..(e-b.start) as usize];
            if run.len() >= pattern.len() {
                if let Some(pos) = run.windows(pattern.len()).position(|w| w == pattern) {
                    return Ok(s + pos as u64);
                }
            }
            idx += 1;
        }
        Err(Box::new(Error::NotFound))
    }
    /// Write every block of `other` into this image.  Last writer wins where
    /// addresses overlap.  Fails without mutating if any block escapes the bounds.
    pub fn merge(&mut self,other: &SparseImage) -> STDRESULT {
        for b in &other.blocks {
            self.check_bounds(b.start,b.end())?;
        }
        log::trace!("merging {} blocks",other.blocks.len());
        for b in &other.blocks {
            self.write_unchecked(b.start,&b.data);
        }
        Ok(())
    }
    /// Insert bytes at `offset`, shifting everything at or above `offset` up
    /// by the length of the insertion.
    pub fn insert(&mut self,offset: u64,dat: &[u8]) -> STDRESULT {
        if dat.len() == 0 {
            return Ok(());
        }
        let amount = dat.len() as u64;
        if let Some(e) = self.end() {
            if e >= offset && e.checked_add(amount).is_none() {
                return Err(Box::new(Error::Overflow));
            }
        }
        let new_end = match self.end() {
            Some(e) if e > offset => e + amount,
            _ => offset + amount
        };
        self.check_bounds(offset,new_end)?;
        // split any block straddling the insertion point, then translate the upper part
        let mut upper: Vec<Block> = Vec::new();
        let mut idx = self.blocks.len();
        for i in 0..self.blocks.len() {
            let b_start = self.blocks[i].start;
            let b_end = self.blocks[i].end();
            if b_end <= offset {
                continue;
            }
            if b_start >= offset {
                idx = usize::min(idx,i);
                upper.push(Block { start: b_start + amount, data: self.blocks[i].data.clone() });
            } else {
                let cut = (offset - b_start) as usize;
                idx = usize::min(idx,i+1);
                upper.push(Block { start: offset + amount, data: self.blocks[i].data[cut..].to_vec() });
                self.blocks[i].data.truncate(cut);
            }
        }
        self.blocks.truncate(idx);
        self.blocks.append(&mut upper);
        self.write_unchecked(offset,dat);
        Ok(())
    }
    /// Reflect the populated span: for an image spanning `[s,e)` the byte at
    /// address `a` moves to `s + (e-1-a)`.
    pub fn reverse(&mut self) {
        let (s,e) = match (self.first(),self.end()) {
            (Some(s),Some(e)) => (s,e),
            _ => return
        };
        let mut flipped: Vec<Block> = Vec::new();
        for b in self.blocks.iter().rev() {
            let mut data = b.data.clone();
            data.reverse();
            flipped.push(Block { start: s + (e - b.end()), data });
        }
        self.blocks = flipped;
    }
    /// Unpopulated ranges strictly between the first and last populated address.
    pub fn holes(&self) -> Vec<(u64,u64)> {
        let mut ans: Vec<(u64,u64)> = Vec::new();
        for i in 1..self.blocks.len() {
            ans.push((self.blocks[i-1].end(),self.blocks[i].start));
        }
        ans
    }
    /// Pad every block with the fill byte so its start and end land on
    /// multiples of `base`.  Existing data is preserved.
    pub fn align(&mut self,base: u64,fill: u8) -> STDRESULT {
        if base == 0 {
            return Err(Box::new(Error::BadRange));
        }
        let mut ranges: Vec<(u64,u64)> = Vec::new();
        for b in &self.blocks {
            let s = (b.start / base) * base;
            let e = match b.end() % base {
                0 => b.end(),
                r => match b.end().checked_add(base - r) {
                    Some(e) => e,
                    None => return Err(Box::new(Error::Overflow))
                }
            };
            self.check_bounds(s,e)?;
            ranges.push((s,e));
        }
        for (s,e) in ranges {
            self.flood(s,e,&[fill])?;
        }
        Ok(())
    }
}

#[test]
fn write_and_coalesce() {
    let mut img = SparseImage::new();
    img.write(0x10,&[1,2,3]).expect("write failed");
    img.write(0x20,&[7,8]).expect("write failed");
    assert_eq!(img.blocks().count(),2);
    // bridge the gap, everything should coalesce to one block
    img.write(0x13,&[0;13]).expect("write failed");
    let blocks: Vec<(u64,Vec<u8>)> = img.blocks().map(|(s,d)| (s,d.to_vec())).collect();
    assert_eq!(blocks.len(),1);
    assert_eq!(blocks[0].0,0x10);
    assert_eq!(blocks[0].1.len(),0x12);
}

#[test]
fn overwrite_splits_at_most_twice() {
    let mut img = SparseImage::from_buffer(0,&[0xaa;16]);
    img.delete(4,8).expect("delete failed");
    let blocks: Vec<(u64,Vec<u8>)> = img.blocks().map(|(s,d)| (s,d.to_vec())).collect();
    assert_eq!(blocks.len(),2);
    assert_eq!(blocks[0],(0,vec![0xaa;4]));
    assert_eq!(blocks[1],(8,vec![0xaa;8]));
    img.write(2,&[0xbb;8]).expect("write failed");
    assert_eq!(img.read(0,16,None).expect("hole"),[
        0xaa,0xaa,0xbb,0xbb,0xbb,0xbb,0xbb,0xbb,0xbb,0xbb,0xaa,0xaa,0xaa,0xaa,0xaa,0xaa
    ].to_vec());
}

#[test]
fn read_with_and_without_fill() {
    let mut img = SparseImage::new();
    img.write(4,&[1,2]).expect("write failed");
    assert_eq!(img.read(2,8,Some(0)).expect("read failed"),vec![0,0,1,2,0,0]);
    assert!(img.read(2,8,None).is_err());
}

#[test]
fn fill_pattern_anchored_to_start() {
    let mut img = SparseImage::new();
    img.fill(7,11,&[1,2,3]).expect("fill failed");
    assert_eq!(img.read(7,11,None).expect("read failed"),vec![1,2,3,1]);
    // idempotent
    img.fill(7,11,&[1,2,3]).expect("fill failed");
    assert_eq!(img.read(7,11,None).expect("read failed"),vec![1,2,3,1]);
}

#[test]
fn flood_preserves_data() {
    let mut img = SparseImage::new();
    img.write(4,&[9,9]).expect("write failed");
    img.flood(0,8,&[0x5a]).expect("flood failed");
    assert_eq!(img.read(0,8,None).expect("read failed"),vec![0x5a,0x5a,0x5a,0x5a,9,9,0x5a,0x5a]);
}

#[test]
fn find_does_not_span_holes() {
    let mut img = SparseImage::new();
    img.write(0,&[1,2]).expect("write failed");
    img.write(4,&[3,4]).expect("write failed");
    assert!(img.find(&[2,3],None,None).is_err());
    assert_eq!(img.find(&[3,4],None,None).expect("find failed"),4);
}

#[test]
fn shift_round_trip() {
    let mut img = SparseImage::from_buffer(0x100,&[1,2,3]);
    let orig = img.clone();
    img.shift(0x20).expect("shift failed");
    assert_eq!(img.first(),Some(0x120));
    img.shift(-0x20).expect("shift failed");
    assert_eq!(img,orig);
    assert!(img.shift(-0x200).is_err());
    assert_eq!(img,orig);
}

#[test]
fn bounded_writes() {
    let mut img = SparseImage::new_bounded(Some(0x8000),Some(0x10000));
    assert!(img.write(0xfffe,&[b'A',b'B',b'C',b'D']).is_err());
    assert!(img.is_empty());
    img.write(0x8000,&[1]).expect("write failed");
    assert!(img.write(0x7fff,&[1]).is_err());
}

#[test]
fn crop_then_fill() {
    let mut img = SparseImage::from_buffer(0x1000,b"hello");
    img.crop(0x1002,0x1004).expect("crop failed");
    img.fill(0x1002,0x1004,&[0xff]).expect("fill failed");
    assert_eq!(img.first(),Some(0x1002));
    assert_eq!(img.read(0x1002,0x1004,None).expect("read failed"),vec![0xff,0xff]);
    assert_eq!(img.byte_count(),2);
    assert!(img.write(0x1000,&[0]).is_err());
}

#[test]
fn insert_opens_gap() {
    let mut img = SparseImage::from_buffer(0,&[1,2,3,4]);
    img.insert(2,&[9,9]).expect("insert failed");
    assert_eq!(img.read(0,6,None).expect("read failed"),vec![1,2,9,9,3,4]);
}

#[test]
fn remove_closes_gap() {
    let mut img = SparseImage::from_buffer(0,&[1,2,3,4,5,6]);
    img.remove(2,4).expect("remove failed");
    assert_eq!(img.blocks().count(),1);
    assert_eq!(img.read(0,4,None).expect("read failed"),vec![1,2,5,6]);
}

#[test]
fn reverse_involution() {
    let mut img = SparseImage::new();
    img.write(0x10,&[1,2,3]).expect("write failed");
    img.write(0x20,&[4,5]).expect("write failed");
    let orig = img.clone();
    img.reverse();
    // byte at 0x10 maps to 0x10 + (0x22-1-0x10)
    assert_eq!(img.read(0x21,0x22,None).expect("read failed"),vec![1]);
    assert_eq!(img.first(),Some(0x10));
    assert_eq!(img.end(),Some(0x22));
    img.reverse();
    assert_eq!(img,orig);
}

#[test]
fn holes_partition_the_span() {
    let mut img = SparseImage::new();
    img.write(0,&[1]).expect("write failed");
    img.write(4,&[1,1]).expect("write failed");
    img.write(9,&[1]).expect("write failed");
    assert_eq!(img.holes(),vec![(1,4),(6,9)]);
    let populated: u64 = img.byte_count() as u64;
    let holes: u64 = img.holes().iter().map(|(s,e)| e-s).sum();
    assert_eq!(populated + holes,img.span());
}

#[test]
fn merge_last_writer_wins() {
    let mut a = SparseImage::from_buffer(0,&[1,1,1,1]);
    let b = SparseImage::from_buffer(2,&[2,2,2,2]);
    a.merge(&b).expect("merge failed");
    assert_eq!(a.read(0,6,None).expect("read failed"),vec![1,1,2,2,2,2]);
    let again = a.clone();
    a.merge(&b).expect("merge failed");
    assert_eq!(a,again);
}

#[test]
fn align_pads_blocks() {
    let mut img = SparseImage::new();
    img.write(0x11,&[1,2]).expect("write failed");
    img.align(0x10,0xff).expect("align failed");
    assert_eq!(img.first(),Some(0x10));
    assert_eq!(img.end(),Some(0x20));
    assert_eq!(img.read(0x10,0x13,None).expect("read failed"),vec![0xff,1,2]);
}
