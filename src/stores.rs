//! Readers for the external sequence and overlap stores, and the writer
//! for the output tig store.
//!
//! All three are little-endian binary with no padding between records.
//! The overlap store is memory-mapped and served as a per-read streaming
//! iterator; it is only ever touched single-threaded, at load time.

use crate::error::{AsmError, Result};
use crate::overlap::EVALUE_MAX;
use crate::tig::TigVector;
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const SEQ_MAGIC: &[u8; 8] = b"SEQLENv1";
const OVL_MAGIC: &[u8; 8] = b"OVLSTRv1";

/// On-disk size of one overlap record.
pub const OVL_RECORD_SIZE: usize = 20;

/// A raw overlap as yielded by the store, before caching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOverlap {
    pub a_iid: u32,
    pub b_iid: u32,
    pub a_hang: i32,
    pub b_hang: i32,
    pub evalue: u16,
    pub flipped: bool,
}

#[inline]
fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(buf[at..at + 4].try_into().unwrap())
}

#[inline]
fn read_u64(buf: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(buf[at..at + 8].try_into().unwrap())
}

/// Read-length table backing [`crate::read_info::ReadInfo`].
pub struct SeqStore {
    lengths: Vec<u32>,
}

impl SeqStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            AsmError::Resource(format!("cannot open seq store '{}': {}", path.display(), e))
        })?;

        if bytes.len() < 12 || &bytes[0..8] != SEQ_MAGIC {
            return Err(AsmError::data(path, "not a seq store (bad magic)"));
        }

        let num_reads = read_u32(&bytes, 8) as usize;

        if bytes.len() != 12 + 4 * num_reads {
            return Err(AsmError::data(path, "seq store truncated"));
        }

        let mut lengths = Vec::with_capacity(num_reads);
        for i in 0..num_reads {
            lengths.push(read_u32(&bytes, 12 + 4 * i));
        }

        Ok(Self { lengths })
    }

    #[inline]
    pub fn num_reads(&self) -> u32 {
        self.lengths.len() as u32
    }

    /// Length of a read; 0 for deleted reads. Ids are 1-based.
    #[inline]
    pub fn read_length(&self, id: u32) -> u32 {
        self.lengths[id as usize - 1]
    }
}

/// Write a seq store; used by tests and store-conversion tooling.
pub fn write_seq_store<P: AsRef<Path>>(path: P, lengths: &[u32]) -> Result<()> {
    let mut w = BufWriter::new(File::create(path.as_ref())?);
    w.write_all(SEQ_MAGIC)?;
    w.write_all(&(lengths.len() as u32).to_le_bytes())?;
    for &len in lengths {
        w.write_all(&len.to_le_bytes())?;
    }
    w.flush()?;
    Ok(())
}

/// Memory-mapped overlap store.
///
/// Records are grouped by `a_iid` in ascending order; the per-read count
/// table at the head of the file gives each read's group size.
pub struct OvlStore {
    path: PathBuf,
    map: Mmap,
    counts: Vec<u32>,
    offsets: Vec<u64>,
    num_overlaps: u64,
    records_at: usize,
}

impl OvlStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| {
            AsmError::Resource(format!("cannot open overlap store '{}': {}", path.display(), e))
        })?;

        // Safety: the store is read-only for the duration of the run.
        let map = unsafe { Mmap::map(&file)? };

        if map.len() < 20 || &map[0..8] != OVL_MAGIC {
            return Err(AsmError::data(&path, "not an overlap store (bad magic)"));
        }

        let num_reads = read_u32(&map, 8) as usize;
        let num_overlaps = read_u64(&map, 12);
        let records_at = 20 + 4 * num_reads;

        if map.len() < records_at {
            return Err(AsmError::data(&path, "overlap store truncated (count table)"));
        }

        let mut counts = Vec::with_capacity(num_reads + 1);
        counts.push(0); // read id 0
        let mut offsets = Vec::with_capacity(num_reads + 2);
        offsets.push(0);
        offsets.push(0);

        let mut total = 0u64;
        for i in 0..num_reads {
            let c = read_u32(&map, 20 + 4 * i);
            counts.push(c);
            total += c as u64;
            offsets.push(total);
        }

        if total != num_overlaps {
            return Err(AsmError::data(&path, "overlap store count table disagrees with header"));
        }

        if map.len() != records_at + OVL_RECORD_SIZE * num_overlaps as usize {
            return Err(AsmError::data(&path, "overlap store truncated (records)"));
        }

        Ok(Self {
            path,
            map,
            counts,
            offsets,
            num_overlaps,
            records_at,
        })
    }

    #[inline]
    pub fn num_reads(&self) -> u32 {
        self.counts.len() as u32 - 1
    }

    #[inline]
    pub fn num_overlaps_in_range(&self) -> u64 {
        self.num_overlaps
    }

    /// Copy of the per-read overlap counts, indexed by read id.
    pub fn num_overlaps_per_read(&self) -> Vec<u32> {
        self.counts.clone()
    }

    #[inline]
    pub fn num_overlaps(&self, id: u32) -> u32 {
        if (id as usize) < self.counts.len() {
            self.counts[id as usize]
        } else {
            0
        }
    }

    fn decode(&self, index: u64) -> StoreOverlap {
        let at = self.records_at + OVL_RECORD_SIZE * index as usize;
        let buf = &self.map[at..at + OVL_RECORD_SIZE];

        StoreOverlap {
            a_iid: read_u32(buf, 0),
            b_iid: read_u32(buf, 4),
            a_hang: read_u32(buf, 8) as i32,
            b_hang: read_u32(buf, 12) as i32,
            evalue: u16::from_le_bytes(buf[16..18].try_into().unwrap()),
            flipped: buf[18] != 0,
        }
    }

    /// Load all overlaps for one read into `buf`. Returns the count.
    pub fn load_overlaps_for_read(&self, id: u32, buf: &mut Vec<StoreOverlap>) -> Result<u32> {
        buf.clear();

        if id == 0 || id as usize >= self.counts.len() {
            return Ok(0);
        }

        let bgn = self.offsets[id as usize];
        let end = bgn + self.counts[id as usize] as u64;

        for i in bgn..end {
            let ovl = self.decode(i);

            if ovl.a_iid != id {
                return Err(AsmError::data(
                    &self.path,
                    format!("overlap record {} claims read {} but is stored under read {}", i, ovl.a_iid, id),
                ));
            }
            if ovl.evalue > EVALUE_MAX {
                return Err(AsmError::data(
                    &self.path,
                    format!("overlap {}..{} has out-of-range evalue {}", ovl.a_iid, ovl.b_iid, ovl.evalue),
                ));
            }

            buf.push(ovl);
        }

        Ok(buf.len() as u32)
    }
}

/// Write an overlap store; records must be grouped by `a_iid`.
/// Used by tests and store-conversion tooling.
pub fn write_ovl_store<P: AsRef<Path>>(path: P, num_reads: u32, overlaps: &[StoreOverlap]) -> Result<()> {
    let mut counts = vec![0u32; num_reads as usize];
    for ovl in overlaps {
        counts[ovl.a_iid as usize - 1] += 1;
    }

    let mut w = BufWriter::new(File::create(path.as_ref())?);
    w.write_all(OVL_MAGIC)?;
    w.write_all(&num_reads.to_le_bytes())?;
    w.write_all(&(overlaps.len() as u64).to_le_bytes())?;
    for &c in &counts {
        w.write_all(&c.to_le_bytes())?;
    }
    for ovl in overlaps {
        w.write_all(&ovl.a_iid.to_le_bytes())?;
        w.write_all(&ovl.b_iid.to_le_bytes())?;
        w.write_all(&ovl.a_hang.to_le_bytes())?;
        w.write_all(&ovl.b_hang.to_le_bytes())?;
        w.write_all(&ovl.evalue.to_le_bytes())?;
        w.write_all(&[ovl.flipped as u8, 0])?;
    }
    w.flush()?;
    Ok(())
}

/// Write the final tig layouts for downstream consensus.
///
/// Record layout per tig:
///   tigId u32, flags u32, length u32, numReads u32,
///   then numReads x { id u32, bgn i32, end i32, parent u32, aHang i32, bHang i32 }.
/// Flag bits: 0 unassembled, 1 bubble, 2 repeat, 3 circular.
pub fn write_tig_store<P: AsRef<Path>>(path: P, tigs: &TigVector) -> Result<u32> {
    let mut w = BufWriter::new(File::create(path.as_ref())?);
    let mut written = 0u32;

    for tig in tigs.iter() {
        let mut flags = 0u32;
        if tig.is_unassembled {
            flags |= 1 << 0;
        }
        if tig.is_bubble {
            flags |= 1 << 1;
        }
        if tig.is_repeat {
            flags |= 1 << 2;
        }
        if tig.is_circular {
            flags |= 1 << 3;
        }

        w.write_all(&tig.id().to_le_bytes())?;
        w.write_all(&flags.to_le_bytes())?;
        w.write_all(&tig.length().to_le_bytes())?;
        w.write_all(&(tig.path.len() as u32).to_le_bytes())?;

        for rd in &tig.path {
            w.write_all(&rd.id.to_le_bytes())?;
            w.write_all(&rd.bgn.to_le_bytes())?;
            w.write_all(&rd.end.to_le_bytes())?;
            w.write_all(&rd.parent.to_le_bytes())?;
            w.write_all(&rd.a_hang.to_le_bytes())?;
            w.write_all(&rd.b_hang.to_le_bytes())?;
        }

        written += 1;
    }

    w.flush()?;
    Ok(written)
}
