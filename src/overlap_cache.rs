//! In-memory overlap cache: load, filter, and symmetrize the overlap
//! store under a memory budget.
//!
//! Overlaps are stored in a bump arena of fixed-size blocks; each read
//! owns a contiguous slice, sorted by (partner id, flip). After
//! construction the cache is read-only and every overlap has its twin
//! present with reconciled error rates.

use crate::error::{AsmError, Result};
use crate::overlap::{canonical_order, overlap_score, score_to_length, Overlap};
use crate::read_info::ReadInfo;
use crate::stores::{OvlStore, StoreOverlap};
use log::{debug, info};
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Overlaps per arena block; 64 MB of records at 24 bytes each.
const ARENA_BLOCK_LEN: u32 = 1 << 22;

/// In-memory cost of one cached overlap.
const OVERLAP_BYTES: u64 = std::mem::size_of::<Overlap>() as u64;

/// Low bits of a load score salt equal-scoring overlaps apart, so the
/// per-read cut keeps exactly the requested count.
const SALT_BITS: u32 = 20;
const SALT_MASK: u64 = (1 << SALT_BITS) - 1;

#[inline]
fn salted_score(base: u64, ii: usize) -> u64 {
    (base << SALT_BITS) | (ii as u64 & SALT_MASK)
}

/// Tuning knobs for the load.
#[derive(Debug, Clone)]
pub struct CacheParams {
    /// Reject overlaps above this error rate.
    pub max_erate: f64,
    /// Reject overlaps shorter than this.
    pub min_overlap: u32,
    /// Reject overlaps shorter than this fraction of the shorter read.
    pub min_olap_percent: f64,
    /// Total memory budget in bytes; u64::MAX means unlimited.
    pub mem_limit: u64,
    /// Estimated genome size, for the per-read retention floor.
    pub genome_size: u64,
}

/// Counters surfaced after the load.
#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    pub read_from_store: u64,
    pub duplicates_dropped: u64,
    pub loaded: u64,
    pub sym_mismatched_erates: u64,
    pub sym_weak_dropped: u64,
    pub sym_twins_added: u64,
}

/// Position of a read's slice within the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
struct ArenaPos {
    block: u32,
    pos: u32,
}

/// Allocation cursor over arena coordinates. Carries no storage, so the
/// symmetrization relayout can replay the old layout while computing the
/// new one.
#[derive(Debug, Clone, Copy, Default)]
struct ArenaCursor {
    block: u32,
    pos: u32,
}

impl ArenaCursor {
    /// Reserve `n` slots, moving to the next block when the current one
    /// cannot hold them contiguously.
    fn grab(&mut self, n: u32) -> ArenaPos {
        assert!(n <= ARENA_BLOCK_LEN, "overlap slice larger than an arena block");
        if self.pos + n > ARENA_BLOCK_LEN {
            self.block += 1;
            self.pos = 0;
        }
        let at = ArenaPos { block: self.block, pos: self.pos };
        self.pos += n;
        at
    }

    fn position(&self) -> ArenaPos {
        ArenaPos { block: self.block, pos: self.pos }
    }

    /// Move forward to `other` if it is ahead of us.
    fn advance_to(&mut self, other: &ArenaCursor) {
        if other.position() > self.position() {
            self.block = other.block;
            self.pos = other.pos;
        }
    }
}

/// Bump arena of overlap blocks, allocated on demand.
struct OverlapArena {
    blocks: Vec<Vec<Overlap>>,
}

impl OverlapArena {
    fn new() -> Self {
        Self { blocks: Vec::new() }
    }

    fn ensure(&mut self, block: u32) {
        while self.blocks.len() <= block as usize {
            self.blocks.push(vec![Overlap::default(); ARENA_BLOCK_LEN as usize]);
        }
    }

    #[inline]
    fn slice(&self, at: ArenaPos, len: u32) -> &[Overlap] {
        &self.blocks[at.block as usize][at.pos as usize..(at.pos + len) as usize]
    }

    #[inline]
    fn slice_mut(&mut self, at: ArenaPos, len: u32) -> &mut [Overlap] {
        &mut self.blocks[at.block as usize][at.pos as usize..(at.pos + len) as usize]
    }

    #[inline]
    fn get(&self, at: ArenaPos, i: u32) -> Overlap {
        self.blocks[at.block as usize][(at.pos + i) as usize]
    }

    #[inline]
    fn set(&mut self, at: ArenaPos, i: u32, ovl: Overlap) {
        self.blocks[at.block as usize][(at.pos + i) as usize] = ovl;
    }
}

pub struct OverlapCache {
    arena: OverlapArena,
    slices: Vec<ArenaPos>,
    lens: Vec<u32>,
    max_per_read: u32,
    min_per_read: u32,
    stats: CacheStats,
}

impl OverlapCache {
    /// Load, filter, and symmetrize the overlap store.
    ///
    /// `prefix` names the plain-text symmetrization diagnostics
    /// (`<prefix>.non-symmetric-*`); pass None to skip them.
    pub fn load<P: AsRef<Path>>(
        store_path: P,
        prefix: Option<&Path>,
        ri: &ReadInfo,
        params: &CacheParams,
    ) -> Result<Self> {
        let store = OvlStore::open(store_path)?;

        if store.num_overlaps_in_range() == 0 {
            return Err(AsmError::Resource("overlap store is empty".to_string()));
        }

        let mem_avail = Self::budget_memory(ri, params)?;
        let (min_per, max_per) = Self::compute_overlap_limit(&store, ri, params, mem_avail)?;

        let mut cache = Self {
            arena: OverlapArena::new(),
            slices: vec![ArenaPos::default(); ri.num_reads() as usize + 1],
            lens: vec![0u32; ri.num_reads() as usize + 1],
            max_per_read: max_per,
            min_per_read: min_per,
            stats: CacheStats::default(),
        };

        let min_scores = cache.load_overlaps(&store, ri, params)?;
        drop(store);

        cache.symmetrize(prefix, ri, &min_scores)?;

        info!(
            "OverlapCache: loaded {} of {} overlaps ({} duplicates); symmetrization reconciled {} error rates, dropped {} weak, added {} twins",
            cache.stats.loaded,
            cache.stats.read_from_store,
            cache.stats.duplicates_dropped,
            cache.stats.sym_mismatched_erates,
            cache.stats.sym_weak_dropped,
            cache.stats.sym_twins_added
        );

        Ok(cache)
    }

    /// All cached overlaps for a read, sorted by (partner, flip).
    #[inline]
    pub fn overlaps_for(&self, id: u32) -> &[Overlap] {
        if self.lens[id as usize] == 0 {
            return &[];
        }
        self.arena.slice(self.slices[id as usize], self.lens[id as usize])
    }

    /// The cached overlap between two specific reads, if any.
    pub fn find(&self, a_iid: u32, b_iid: u32) -> Option<&Overlap> {
        let ovls = self.overlaps_for(a_iid);
        let i = ovls.partition_point(|o| o.b_iid < b_iid);
        ovls[i..].iter().take_while(|o| o.b_iid == b_iid).next()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn max_per_read(&self) -> u32 {
        self.max_per_read
    }

    pub fn min_per_read(&self) -> u32 {
        self.min_per_read
    }

    //
    //  Budgeting
    //

    /// Reserve fixed overhead from the memory limit; the remainder is the
    /// overlap arena's budget.
    fn budget_memory(ri: &ReadInfo, params: &CacheParams) -> Result<u64> {
        if params.mem_limit == u64::MAX {
            return Ok(u64::MAX);
        }

        let n = ri.num_reads() as u64 + 1;

        let mem_reads = n * 4; //  read lengths
        let mem_best = n * 16 * 2; //  best edges, both ends
        let mem_tigs = n * 96; //  worst case one tig per read, plus maps
        let mem_layout = n * 32; //  placed-read records
        let mem_profiles = n * 40; //  error profile points
        let mem_scratch = params.mem_limit / 4; //  placement and profile scratch
        let mem_cache = n * (8 + 4 + 4); //  slice table, lengths, capacities

        let reserved = mem_reads + mem_best + mem_tigs + mem_layout + mem_profiles + mem_scratch + mem_cache;

        if reserved >= params.mem_limit {
            return Err(AsmError::Resource(format!(
                "memory limit {} MB too small: {} MB reserved before loading overlaps; increase -M",
                params.mem_limit >> 20,
                reserved >> 20
            )));
        }

        let avail = params.mem_limit - reserved;

        info!(
            "OverlapCache: {} MB reserved for data structures, {} MB for overlaps, of {} MB allowed",
            reserved >> 20,
            avail >> 20,
            params.mem_limit >> 20
        );

        Ok(avail)
    }

    /// Decide the per-read retention window.
    ///
    /// The floor is twice the estimated coverage. The ceiling starts at
    /// the uniform share of the budget and is then pushed up while reads
    /// below the ceiling leave space unused.
    fn compute_overlap_limit(
        store: &OvlStore,
        ri: &ReadInfo,
        params: &CacheParams,
        mem_avail: u64,
    ) -> Result<(u32, u32)> {
        let num_per = store.num_overlaps_per_read();

        let coverage = ri.num_bases() / params.genome_size.max(1);
        let min_per = (2 * coverage).min(u32::MAX as u64) as u32;

        if mem_avail == u64::MAX {
            return Ok((min_per, u32::MAX));
        }

        let mut max_per = (mem_avail / (ri.num_reads() as u64 * OVERLAP_BYTES).max(1))
            .min(u32::MAX as u64) as u32;

        debug!(
            "OverlapCache: retain at least {} overlaps/read ({}x coverage); initial guess {} overlaps/read",
            min_per, coverage, max_per
        );

        loop {
            let mut olap_load = 0u64;
            let mut num_above = 0u64;

            for id in 1..=ri.num_reads() {
                let np = num_per[id as usize] as u64;
                if np > max_per as u64 {
                    num_above += 1;
                    olap_load += max_per as u64;
                } else {
                    olap_load += np;
                }
            }

            let olap_mem = olap_load * OVERLAP_BYTES;

            if mem_avail < olap_mem {
                max_per -= 1;
                continue;
            }

            debug!(
                "OverlapCache: at {} overlaps/read: {} reads capped, {} overlaps loaded, {} MB free",
                max_per,
                num_above,
                olap_load,
                (mem_avail - olap_mem) >> 20
            );

            if num_above == 0 {
                break;
            }

            let free_slots = (mem_avail - olap_mem) / OVERLAP_BYTES;
            let increase = free_slots / num_above;

            if increase == 0 {
                break;
            }

            max_per += increase.min(u32::MAX as u64) as u32;
        }

        if max_per < min_per {
            return Err(AsmError::Resource(format!(
                "not enough memory to retain {} overlaps/read (budget allows {}); increase -M",
                min_per, max_per
            )));
        }

        Ok((min_per, max_per))
    }

    //
    //  Loading
    //

    /// Worse-than comparison for duplicate removal: lower error wins,
    /// then unflipped, then longer.
    fn worse_than(ri: &ReadInfo, a: &StoreOverlap, b: &StoreOverlap) -> bool {
        let key = |o: &StoreOverlap| {
            (
                u16::MAX - o.evalue,
                ri.overlap_length(o.a_iid, o.b_iid, o.a_hang, o.b_hang),
                !o.flipped,
            )
        };
        key(a) < key(b)
    }

    /// Load each read's overlaps, drop duplicates and junk, keep the top
    /// `max_per` by score. Returns the per-read minimum accepted score.
    fn load_overlaps(&mut self, store: &OvlStore, ri: &ReadInfo, params: &CacheParams) -> Result<Vec<u64>> {
        let max_evalue = crate::overlap::encode_evalue(params.max_erate);

        let mut min_scores = vec![0u64; ri.num_reads() as usize + 1];
        let mut cursor = ArenaCursor::default();
        let mut buf: Vec<StoreOverlap> = Vec::new();
        let mut scores: Vec<u64> = Vec::new();
        let mut ordered: Vec<u64> = Vec::new();

        for id in 1..=ri.num_reads() {
            let total = store.load_overlaps_for_read(id, &mut buf)? as u64;
            self.stats.read_from_store += total;

            if buf.is_empty() {
                continue;
            }

            //  Canonical order, then drop duplicate partners keeping the
            //  better record of each pair.

            buf.sort_unstable_by(|a, b| a.b_iid.cmp(&b.b_iid).then(a.flipped.cmp(&b.flipped)));

            let mut deduped: Vec<StoreOverlap> = Vec::with_capacity(buf.len());
            for ovl in buf.drain(..) {
                match deduped.last_mut() {
                    Some(last) if last.b_iid == ovl.b_iid => {
                        self.stats.duplicates_dropped += 1;
                        if Self::worse_than(ri, last, &ovl) {
                            *last = ovl;
                        }
                    }
                    _ => deduped.push(ovl),
                }
            }

            //  Score survivors; zero means filtered.

            scores.clear();
            for (ii, ovl) in deduped.iter().enumerate() {
                if !ri.is_valid(ovl.b_iid) {
                    return Err(AsmError::Resource(format!(
                        "overlap {} -> {} references a read out of range",
                        ovl.a_iid, ovl.b_iid
                    )));
                }

                let mut sco = 0u64;

                if !ri.is_deleted(ovl.a_iid) && !ri.is_deleted(ovl.b_iid) && ovl.evalue <= max_evalue {
                    let olen = ri.overlap_length(ovl.a_iid, ovl.b_iid, ovl.a_hang, ovl.b_hang);
                    let floor = (params.min_olap_percent
                        * ri.length(ovl.a_iid).min(ri.length(ovl.b_iid)) as f64)
                        as u32;

                    if olen >= params.min_overlap && olen >= floor {
                        sco = salted_score(overlap_score(olen, ovl.evalue), ii);
                    }
                }

                scores.push(sco);
            }

            let mut keep = scores.iter().filter(|&&s| s > 0).count() as u32;

            //  Too many: find the score threshold that keeps max_per.

            if keep > self.max_per_read {
                ordered.clear();
                ordered.extend(scores.iter().copied());
                ordered.sort_unstable();

                let cut = ordered[ordered.len() - self.max_per_read as usize];
                min_scores[id as usize] = cut;

                keep = 0;
                for sco in scores.iter_mut() {
                    if *sco < cut {
                        *sco = 0;
                    } else {
                        keep += 1;
                    }
                }

                assert!(keep <= self.max_per_read, "overlap cap overshoot for read {}", id);
            }

            if keep == 0 {
                continue;
            }

            //  Copy survivors into the arena.

            let at = cursor.grab(keep);
            self.arena.ensure(at.block);
            self.slices[id as usize] = at;
            self.lens[id as usize] = keep;

            let slice = self.arena.slice_mut(at, keep);
            let mut oo = 0;
            for (ovl, &sco) in deduped.iter().zip(scores.iter()) {
                if sco == 0 {
                    continue;
                }
                slice[oo] = Overlap {
                    a_iid: ovl.a_iid,
                    b_iid: ovl.b_iid,
                    a_hang: ovl.a_hang,
                    b_hang: ovl.b_hang,
                    evalue: ovl.evalue,
                    flipped: ovl.flipped,
                    filtered: false,
                    symmetric: false,
                };
                oo += 1;
            }
            assert!(oo as u32 == keep, "short copy of overlaps for read {}", id);

            self.stats.loaded += keep as u64;
        }

        Ok(min_scores)
    }

    //
    //  Symmetrization
    //

    /// Binary search a read's slice for the twin of (b_iid, flipped).
    fn search(&self, read: u32, b_iid: u32, flipped: bool) -> Option<u32> {
        let ovls = self.overlaps_for(read);
        let i = ovls.partition_point(|o| (o.b_iid, o.flipped) < (b_iid, flipped));
        if i < ovls.len() && ovls[i].b_iid == b_iid && ovls[i].flipped == flipped {
            Some(i as u32)
        } else {
            None
        }
    }

    /// Restore the twin invariant: reconcile error rates where both
    /// directions exist, drop weak one-sided overlaps, and insert strong
    /// twins on the side that filtered them away.
    fn symmetrize(&mut self, prefix: Option<&Path>, ri: &ReadInfo, min_scores: &[u64]) -> Result<()> {
        let num_reads = ri.num_reads();
        let chunk = crate::parallel::block_size(num_reads as usize);

        info!("OverlapCache: symmetrizing overlaps; finding missing twins");

        //  Outcome of the twin search for one overlap. Both directions of
        //  a found pair compute the same answer independently, so this
        //  pass is read-only and parallel.

        #[derive(Clone, Copy)]
        enum Twin {
            Found { evalue: u16, mismatched: bool },
            Weak,
            Missing,
        }

        let cache = &*self;
        let outcomes: Vec<Vec<Twin>> = (0..(num_reads as usize + 1))
            .into_par_iter()
            .with_min_len(chunk)
            .map(|ra| {
                let ovls = cache.overlaps_for(ra as u32);
                let mut out = Vec::with_capacity(ovls.len());

                for ovl in ovls {
                    let twin = cache
                        .search(ovl.b_iid, ovl.a_iid, ovl.flipped)
                        .map(|i| cache.overlaps_for(ovl.b_iid)[i as usize]);

                    out.push(match twin {
                        Some(t) => Twin::Found {
                            evalue: ovl.evalue.min(t.evalue),
                            mismatched: ovl.evalue != t.evalue,
                        },
                        None => {
                            let olen = ri.overlap_length(ovl.a_iid, ovl.b_iid, ovl.a_hang, ovl.b_hang);
                            //  Max salt: ties with the other read's cut
                            //  survive and get twinned instead.
                            let sco = (overlap_score(olen, ovl.evalue) << SALT_BITS) | SALT_MASK;
                            if sco < min_scores[ovl.b_iid as usize] {
                                Twin::Weak
                            } else {
                                Twin::Missing
                            }
                        }
                    });
                }
                out
            })
            .collect();

        //  Apply outcomes and write the diagnostics.

        let mut log_nse = self.open_side_log(prefix, "non-symmetric-error-rates")?;
        let mut log_ntw = self.open_side_log(prefix, "non-symmetric-overlaps")?;

        if let Some(w) = log_nse.as_mut() {
            writeln!(w, "     aID      bID  a error b error")?;
            writeln!(w, "-------- --------  ------- -------")?;
        }

        let mut miss_per_read = vec![0u32; num_reads as usize + 1];
        let mut filt_per_read = vec![0u32; num_reads as usize + 1];

        for ra in 1..=num_reads {
            let at = self.slices[ra as usize];
            for oo in 0..self.lens[ra as usize] {
                let mut ovl = self.arena.get(at, oo);
                match outcomes[ra as usize][oo as usize] {
                    Twin::Found { evalue, mismatched } => {
                        //  Each mismatched pair reports once, from the
                        //  lower-id side.
                        if mismatched && ra < ovl.b_iid {
                            self.stats.sym_mismatched_erates += 1;
                            if let Some(w) = log_nse.as_mut() {
                                writeln!(
                                    w,
                                    "{:8} {:8}  {:7.3} {:7.3}",
                                    ra,
                                    ovl.b_iid,
                                    ovl.erate() * 100.0,
                                    crate::overlap::decode_evalue(evalue) * 100.0
                                )?;
                            }
                        }
                        ovl.evalue = evalue;
                        ovl.symmetric = true;
                    }
                    Twin::Weak => {
                        let olen = ri.overlap_length(ovl.a_iid, ovl.b_iid, ovl.a_hang, ovl.b_hang);
                        if let Some(w) = log_ntw.as_mut() {
                            writeln!(
                                w,
                                "NO TWIN for {:6} -> {:6} - length {} < min {} - WEAK",
                                ra,
                                ovl.b_iid,
                                olen,
                                score_to_length(min_scores[ovl.b_iid as usize] >> SALT_BITS)
                            )?;
                        }
                        ovl.filtered = true;
                        filt_per_read[ra as usize] += 1;
                        self.stats.sym_weak_dropped += 1;
                    }
                    Twin::Missing => {
                        if let Some(w) = log_ntw.as_mut() {
                            writeln!(w, "NO TWIN for {:6} -> {:6} - KEEP", ra, ovl.b_iid)?;
                        }
                        miss_per_read[ovl.b_iid as usize] += 1;
                        self.stats.sym_twins_added += 1;
                    }
                }
                self.arena.set(at, oo, ovl);
            }
        }

        drop(outcomes);
        drop(log_nse);

        //  Relayout the arena so each read has room for its insertions.
        //  New slices are placed at-or-after the end of the read's old
        //  slice, so copying reads last-to-first never clobbers data that
        //  is still waiting to move.

        info!("OverlapCache: shifting overlaps");

        let mut new_slices = vec![ArenaPos::default(); num_reads as usize + 1];
        let mut new_lens = vec![0u32; num_reads as usize + 1];

        {
            let mut old_cur = ArenaCursor::default();
            let mut new_cur = ArenaCursor::default();

            for rr in 1..=num_reads as usize {
                let n_new = self.lens[rr] + miss_per_read[rr] - filt_per_read[rr];
                old_cur.grab(self.lens[rr]);
                new_cur.advance_to(&old_cur);
                new_slices[rr] = new_cur.grab(n_new);
                new_lens[rr] = n_new;
                self.arena.ensure(new_slices[rr].block);
            }
        }

        let mut log_ntd = self.open_side_log(prefix, "non-symmetric-weak-dropped")?;

        for rr in (1..=num_reads as usize).rev() {
            let n_old = self.lens[rr];
            if n_old == 0 && new_lens[rr] == 0 {
                continue;
            }

            let old_at = self.slices[rr];
            let new_at = new_slices[rr];

            if n_old > 0 {
                let first = self.arena.get(old_at, 0);
                let last = self.arena.get(old_at, n_old - 1);
                assert!(
                    first.a_iid == rr as u32 && last.a_iid == rr as u32,
                    "arena relayout clobbered overlaps for read {}",
                    rr
                );
            }

            let mut nn = 0u32;
            for oo in 0..n_old {
                let ovl = self.arena.get(old_at, oo);
                if ovl.filtered {
                    if let Some(w) = log_ntd.as_mut() {
                        writeln!(w, "DROP overlap a {} b {}", ovl.a_iid, ovl.b_iid)?;
                    }
                    continue;
                }
                self.arena.set(new_at, nn, ovl);
                nn += 1;
            }

            assert!(nn == n_old - filt_per_read[rr], "lost overlaps relocating read {}", rr);

            self.slices[rr] = new_at;
            self.lens[rr] = nn; //  insertions land after nn, up to new_lens[rr]
        }

        drop(log_ntd);

        //  Insert the missing twins. Serial: each insertion appends to
        //  another read's slice.

        info!("OverlapCache: adding missing twins");

        let mut log_nta = self.open_side_log(prefix, "non-symmetric-added")?;

        for ra in 1..=num_reads as usize {
            let mut oo = 0u32;
            while oo < self.lens[ra] {
                let mut ovl = self.arena.get(self.slices[ra], oo);
                oo += 1;

                if ovl.symmetric {
                    continue;
                }

                let rb = ovl.b_iid as usize;
                let nn = self.lens[rb];
                assert!(nn < new_lens[rb], "twin insertion overflows reserved space for read {}", rb);

                ovl.symmetric = true;
                self.arena.set(self.slices[ra], oo - 1, ovl);

                let twin = ovl.twin();
                self.arena.set(self.slices[rb], nn, twin);
                self.lens[rb] = nn + 1;

                if let Some(w) = log_nta.as_mut() {
                    writeln!(w, "add missing twin from read {} -> read {} at pos {} of {}", ra, rb, nn, new_lens[rb])?;
                }

                assert!(miss_per_read[rb] > 0);
                miss_per_read[rb] -= 1;
            }
        }

        drop(log_nta);

        for rr in 1..=num_reads as usize {
            assert!(miss_per_read[rr] == 0, "unfilled twin reservation for read {}", rr);
            assert!(self.lens[rr] == new_lens[rr], "slice length mismatch for read {}", rr);
        }

        //  Restore canonical per-read order. Slices within one block are
        //  disjoint, so blocks sort in parallel.

        info!("OverlapCache: sorting overlaps");

        let mut ranges: Vec<Vec<(u32, u32)>> = vec![Vec::new(); self.arena.blocks.len()];
        for rr in 1..=num_reads as usize {
            if self.lens[rr] > 1 {
                ranges[self.slices[rr].block as usize].push((self.slices[rr].pos, self.lens[rr]));
            }
        }

        self.arena
            .blocks
            .par_iter_mut()
            .zip(ranges.par_iter())
            .for_each(|(block, ranges)| {
                for &(pos, len) in ranges {
                    block[pos as usize..(pos + len) as usize].sort_unstable_by(canonical_order);
                }
            });

        //  Verify: every overlap now has its twin.

        info!("OverlapCache: checking overlap symmetry");

        let cache = &*self;
        (1..(num_reads + 1))
            .into_par_iter()
            .with_min_len(chunk)
            .for_each(|ra| {
                for ovl in cache.overlaps_for(ra) {
                    assert!(
                        cache.search(ovl.b_iid, ra, ovl.flipped).is_some(),
                        "missing twin after symmetrization: {} -> {}",
                        ra,
                        ovl.b_iid
                    );
                }
            });

        Ok(())
    }

    fn open_side_log(&self, prefix: Option<&Path>, name: &str) -> Result<Option<BufWriter<File>>> {
        match prefix {
            Some(p) => {
                let mut path = p.as_os_str().to_owned();
                path.push(".");
                path.push(name);
                Ok(Some(BufWriter::new(File::create(path)?)))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::write_ovl_store;
    use tempfile::tempdir;

    fn params() -> CacheParams {
        CacheParams {
            max_erate: 0.1,
            min_overlap: 100,
            min_olap_percent: 0.0,
            mem_limit: u64::MAX,
            genome_size: 2000,
        }
    }

    fn ovl(a: u32, b: u32, ah: i32, bh: i32, ev: u16, fl: bool) -> StoreOverlap {
        StoreOverlap { a_iid: a, b_iid: b, a_hang: ah, b_hang: bh, evalue: ev, flipped: fl }
    }

    fn build(ri: &ReadInfo, ovls: &[StoreOverlap], params: &CacheParams) -> OverlapCache {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.ovlStore");
        write_ovl_store(&path, ri.num_reads(), ovls).unwrap();
        OverlapCache::load(&path, None, ri, params).unwrap()
    }

    #[test]
    fn test_load_and_symmetry() {
        let ri = ReadInfo::from_lengths(vec![0, 1000, 1000, 1000]);
        //  1-2 has both directions; 2-3 is one-sided and must gain a twin.
        let ovls = vec![
            ovl(1, 2, 500, 500, 10, false),
            ovl(2, 1, -500, -500, 20, false),
            ovl(2, 3, 500, 500, 0, false),
        ];

        let cache = build(&ri, &ovls, &params());

        //  Mismatched evalues reconcile to the minimum on both sides.
        assert_eq!(cache.overlaps_for(1)[0].evalue, 10);
        assert_eq!(cache.find(2, 1).unwrap().evalue, 10);

        //  The missing twin was added with negated hangs.
        let twin = cache.find(3, 2).expect("twin must exist");
        assert_eq!(twin.a_hang, -500);
        assert_eq!(twin.b_hang, -500);
        assert_eq!(cache.stats().sym_twins_added, 1);

        //  Every overlap has its twin (verified internally by load, but
        //  check from the public surface too).
        for id in 1..=3 {
            for o in cache.overlaps_for(id) {
                assert!(cache.find(o.b_iid, id).is_some());
            }
        }
    }

    #[test]
    fn test_evalue_boundary() {
        let ri = ReadInfo::from_lengths(vec![0, 1000, 1000, 1000]);
        let max_ev = crate::overlap::encode_evalue(0.1);

        //  At the limit: retained.  One notch above: dropped.
        let mut ovls = vec![
            ovl(1, 2, 500, 500, max_ev, false),
            ovl(2, 1, -500, -500, max_ev, false),
            ovl(1, 3, 500, 500, max_ev + 1, false),
            ovl(3, 1, -500, -500, max_ev + 1, false),
        ];
        ovls.sort_by_key(|o| o.a_iid);

        let cache = build(&ri, &ovls, &params());

        assert!(cache.find(1, 2).is_some());
        assert!(cache.find(1, 3).is_none());
        assert!(cache.overlaps_for(3).is_empty());
    }

    #[test]
    fn test_duplicate_removal() {
        let ri = ReadInfo::from_lengths(vec![0, 1000, 1000]);
        //  Same pair twice; the lower-error record survives.
        let ovls = vec![
            ovl(1, 2, 500, 500, 30, false),
            ovl(1, 2, 400, 400, 10, false),
            ovl(2, 1, -400, -400, 10, false),
        ];

        let cache = build(&ri, &ovls, &params());

        assert_eq!(cache.overlaps_for(1).len(), 1);
        assert_eq!(cache.overlaps_for(1)[0].evalue, 10);
        assert_eq!(cache.overlaps_for(1)[0].a_hang, 400);
        assert_eq!(cache.stats().duplicates_dropped, 1);
    }

    #[test]
    fn test_short_overlap_dropped() {
        let ri = ReadInfo::from_lengths(vec![0, 1000, 1000]);
        //  50 bp overlap is under the 100 bp floor; both sides drop it,
        //  so symmetrization has nothing to repair.
        let ovls = vec![
            ovl(1, 2, 950, 950, 0, false),
            ovl(2, 1, -950, -950, 0, false),
        ];

        let cache = build(&ri, &ovls, &params());
        assert!(cache.overlaps_for(1).is_empty());
        assert!(cache.overlaps_for(2).is_empty());
    }

    #[test]
    fn test_memory_budget_infeasible() {
        let ri = ReadInfo::from_lengths(vec![0, 1000, 1000]);
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.ovlStore");
        write_ovl_store(&path, 2, &[ovl(1, 2, 500, 500, 0, false)]).unwrap();

        let mut p = params();
        p.mem_limit = 1 << 10; //  1 KB: reserved overhead alone exceeds this

        match OverlapCache::load(&path, None, &ri, &p) {
            Err(AsmError::Resource(_)) => {}
            other => panic!("expected resource error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_overlap_limit_grows_into_free_space() {
        let ri = ReadInfo::from_lengths(vec![0, 1000, 1000, 1000, 1000, 1000]);

        //  Read 1 has 10 overlaps, the others one each.
        let mut ovls = Vec::new();
        for b in 2..=5u32 {
            for _ in 0..3 {
                ovls.push(ovl(1, b, 500, 500, 0, false));
            }
        }
        ovls.truncate(10);
        for b in 2..=5u32 {
            ovls.push(ovl(b, 1, -500, -500, 0, false));
        }
        ovls.sort_by_key(|o| o.a_iid);

        let dir = tempdir().unwrap();
        let path = dir.path().join("t.ovlStore");
        write_ovl_store(&path, 5, &ovls).unwrap();
        let store = OvlStore::open(&path).unwrap();

        let mut p = params();
        p.genome_size = u64::MAX; //  min_per = 0

        //  Budget for 10 overlaps at a uniform split: the cap starts at
        //  2/read and grows into the slack left by the sparse reads.
        let avail = 10 * OVERLAP_BYTES;
        let (min_per, max_per) = OverlapCache::compute_overlap_limit(&store, &ri, &p, avail).unwrap();

        assert_eq!(min_per, 0);
        assert!(max_per > 2, "cap should grow past the uniform share, got {}", max_per);
    }

    #[test]
    fn test_overlap_limit_infeasible() {
        let ri = ReadInfo::from_lengths(vec![0, 1000, 1000, 1000, 1000, 1000]);

        let ovls: Vec<_> = (2..=5u32).map(|b| ovl(1, b, 500, 500, 0, false)).collect();
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.ovlStore");
        write_ovl_store(&path, 5, &ovls).unwrap();
        let store = OvlStore::open(&path).unwrap();

        let p = params(); //  genome 2 kb, 5 kb of reads: min_per = 4

        match OverlapCache::compute_overlap_limit(&store, &ri, &p, OVERLAP_BYTES) {
            Err(AsmError::Resource(_)) => {}
            other => panic!("expected resource error, got {:?}", other),
        }
    }
}
