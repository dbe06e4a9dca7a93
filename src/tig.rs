//! Tigs: ordered read layouts with tig-coordinate positions.
//!
//! A `Unitig` is a sorted vector of placed reads. The `TigVector` owns
//! every tig and keeps the read-to-tig and read-to-index maps consistent
//! across mutations; all membership changes go through it.

use crate::overlap_cache::OverlapCache;
use crate::read_info::ReadInfo;
use rayon::prelude::*;

/// Width of one error-profile window.
pub const PROFILE_WINDOW: i32 = 1000;

/// Iteration cap for position optimization.
const OPTIMIZE_MAX_ITERS: u32 = 50;

/// A read placed in a tig. `end < bgn` iff the read is reverse-oriented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlacedRead {
    pub id: u32,
    pub bgn: i32,
    pub end: i32,
    /// The read this one was hung off of; 0 for seeds.
    pub parent: u32,
    pub a_hang: i32,
    pub b_hang: i32,
    /// Containment nesting depth; 0 for dovetail placements.
    pub depth: u32,
}

impl PlacedRead {
    pub fn new(id: u32, bgn: i32, end: i32) -> Self {
        Self { id, bgn, end, ..Default::default() }
    }

    #[inline]
    pub fn min(&self) -> i32 {
        self.bgn.min(self.end)
    }

    #[inline]
    pub fn max(&self) -> i32 {
        self.bgn.max(self.end)
    }

    #[inline]
    pub fn is_forward(&self) -> bool {
        self.bgn <= self.end
    }

    #[inline]
    pub fn len(&self) -> i32 {
        self.max() - self.min()
    }

    /// Set the position from an oriented span.
    #[inline]
    pub fn set_position(&mut self, min: i32, max: i32, forward: bool) {
        if forward {
            self.bgn = min;
            self.end = max;
        } else {
            self.bgn = max;
            self.end = min;
        }
    }

    /// Project an overlap's partner onto tig coordinates: the span the
    /// partner read would occupy, implied by the hangs of the overlap
    /// whose A-read is this placed read.
    pub fn mapped_span(&self, a_hang: i32, b_hang: i32) -> (i32, i32) {
        if self.is_forward() {
            (self.min() + a_hang, self.max() + b_hang)
        } else {
            (self.min() - b_hang, self.max() - a_hang)
        }
    }

    /// Low tig coordinate of [`Self::mapped_span`].
    pub fn hang_to_min_coord(&self, a_hang: i32, b_hang: i32) -> i32 {
        let (lo, hi) = self.mapped_span(a_hang, b_hang);
        lo.min(hi)
    }

    /// High tig coordinate of [`Self::mapped_span`].
    pub fn hang_to_max_coord(&self, a_hang: i32, b_hang: i32) -> i32 {
        let (lo, hi) = self.mapped_span(a_hang, b_hang);
        lo.max(hi)
    }
}

/// One error-profile window: mean and stddev of the error rates of
/// overlaps spanning it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfilePoint {
    pub mean: f64,
    pub stddev: f64,
    pub n: u32,
}

#[derive(Debug, Default)]
pub struct Unitig {
    id: u32,
    pub path: Vec<PlacedRead>,
    profile: Vec<ProfilePoint>,
    pub is_bubble: bool,
    pub is_repeat: bool,
    pub is_unassembled: bool,
    pub is_circular: bool,
}

impl Unitig {
    fn new(id: u32) -> Self {
        Self { id, ..Default::default() }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Tig length: the maximum read coordinate.
    pub fn length(&self) -> u32 {
        self.path.iter().map(|r| r.max()).max().unwrap_or(0).max(0) as u32
    }

    /// The read layout is sorted by low coordinate; first is the one
    /// starting the tig.
    pub fn first_read(&self) -> &PlacedRead {
        &self.path[0]
    }

    pub fn last_read(&self) -> &PlacedRead {
        &self.path[self.path.len() - 1]
    }

    pub fn read(&self, id: u32) -> Option<&PlacedRead> {
        self.path.iter().find(|r| r.id == id)
    }

    /// Predicted position for a read hung off `parent` with the given
    /// overlap hangs (A = parent, B = the new read).
    pub fn place_read_with_edge(
        parent: &PlacedRead,
        a_hang: i32,
        b_hang: i32,
        flipped: bool,
    ) -> (i32, i32) {
        let (lo, hi) = parent.mapped_span(a_hang, b_hang);
        let (min, max) = (lo.min(hi), lo.max(hi));
        let forward = parent.is_forward() != flipped;
        if forward {
            (min, max)
        } else {
            (max, min)
        }
    }

    /// Reads starting per window; a coarse arrival-rate profile used for
    /// coverage diagnostics.
    pub fn compute_arrival_rate(&self) -> Vec<f64> {
        let len = self.length() as i32;
        if len == 0 {
            return Vec::new();
        }

        let n_win = ((len + PROFILE_WINDOW - 1) / PROFILE_WINDOW) as usize;
        let mut starts = vec![0u32; n_win];

        for rd in &self.path {
            let w = (rd.min() / PROFILE_WINDOW) as usize;
            if w < n_win {
                starts[w] += 1;
            }
        }

        starts.iter().map(|&s| s as f64 / PROFILE_WINDOW as f64).collect()
    }

    /// Mean and stddev of overlap error rates per window, sampled from
    /// overlaps between reads co-placed in this tig.
    pub fn compute_error_profile(&mut self, cache: &OverlapCache, read_tig: &[u32]) {
        let len = self.length() as i32;
        if len == 0 {
            self.profile.clear();
            return;
        }

        let n_win = ((len + PROFILE_WINDOW - 1) / PROFILE_WINDOW) as usize;
        let mut sum = vec![0f64; n_win];
        let mut sum_sq = vec![0f64; n_win];
        let mut n = vec![0u32; n_win];

        let index: rustc_hash::FxHashMap<u32, usize> =
            self.path.iter().enumerate().map(|(i, r)| (r.id, i)).collect();

        for rd in &self.path {
            for ovl in cache.overlaps_for(rd.id) {
                if read_tig[ovl.b_iid as usize] != self.id {
                    continue;
                }
                let Some(other) = index.get(&ovl.b_iid).map(|&i| &self.path[i]) else { continue };

                //  The tig region the overlap spans: where the two
                //  placements intersect.
                let lo = rd.min().max(other.min());
                let hi = rd.max().min(other.max());
                if lo >= hi {
                    continue;
                }

                let erate = ovl.erate();
                let w_lo = (lo / PROFILE_WINDOW).max(0) as usize;
                let w_hi = (((hi - 1) / PROFILE_WINDOW) as usize).min(n_win - 1);

                for w in w_lo..=w_hi {
                    sum[w] += erate;
                    sum_sq[w] += erate * erate;
                    n[w] += 1;
                }
            }
        }

        self.profile = (0..n_win)
            .map(|w| {
                if n[w] == 0 {
                    ProfilePoint::default()
                } else {
                    let mean = sum[w] / n[w] as f64;
                    let var = (sum_sq[w] / n[w] as f64 - mean * mean).max(0.0);
                    ProfilePoint { mean, stddev: var.sqrt(), n: n[w] }
                }
            })
            .collect();
    }

    /// Fraction of profile windows touched by [lo, hi] that tolerate an
    /// overlap of the given error rate: mean + deviation * stddev >= erate.
    /// Permissive (1.0) when no profile data covers the region.
    pub fn overlap_consistent_with_tig(&self, deviation: f64, lo: i32, hi: i32, erate: f64) -> f64 {
        if self.profile.is_empty() || lo >= hi {
            return 1.0;
        }

        let w_lo = ((lo.max(0) / PROFILE_WINDOW) as usize).min(self.profile.len() - 1);
        let w_hi = (((hi - 1).max(0) / PROFILE_WINDOW) as usize).min(self.profile.len() - 1);

        let mut windows = 0u32;
        let mut good = 0u32;

        for w in w_lo..=w_hi.max(w_lo) {
            let p = &self.profile[w];
            if p.n == 0 {
                continue;
            }
            windows += 1;
            if p.mean + deviation * p.stddev >= erate {
                good += 1;
            }
        }

        if windows == 0 {
            1.0
        } else {
            good as f64 / windows as f64
        }
    }
}

/// Owner of all tigs plus the read membership maps.
pub struct TigVector {
    tigs: Vec<Option<Box<Unitig>>>,
    read_tig: Vec<u32>,
    read_idx: Vec<u32>,
}

impl TigVector {
    pub fn new(num_reads: u32) -> Self {
        Self {
            tigs: vec![None], //  tig id 0 is reserved, like read id 0
            read_tig: vec![0; num_reads as usize + 1],
            read_idx: vec![0; num_reads as usize + 1],
        }
    }

    /// Number of tig slots (including deleted ones).
    pub fn size(&self) -> u32 {
        self.tigs.len() as u32
    }

    pub fn iter(&self) -> impl Iterator<Item = &Unitig> {
        self.tigs.iter().filter_map(|t| t.as_deref())
    }

    pub fn tig_ids(&self) -> Vec<u32> {
        self.tigs
            .iter()
            .filter_map(|t| t.as_deref().map(|t| t.id))
            .collect()
    }

    #[inline]
    pub fn tig(&self, id: u32) -> Option<&Unitig> {
        self.tigs.get(id as usize).and_then(|t| t.as_deref())
    }

    /// Mutable tig access for position updates. Membership changes must
    /// go through the TigVector methods so the maps stay consistent.
    #[inline]
    pub fn tig_mut(&mut self, id: u32) -> Option<&mut Unitig> {
        self.tigs.get_mut(id as usize).and_then(|t| t.as_deref_mut())
    }

    /// The tig holding a read; 0 when unplaced.
    #[inline]
    pub fn tig_of_read(&self, read: u32) -> u32 {
        self.read_tig[read as usize]
    }

    /// The read's index in its tig's path.
    #[inline]
    pub fn index_in_tig(&self, read: u32) -> u32 {
        self.read_idx[read as usize]
    }

    pub fn placed_read(&self, read: u32) -> Option<&PlacedRead> {
        let tid = self.tig_of_read(read);
        if tid == 0 {
            return None;
        }
        let tig = self.tig(tid)?;
        Some(&tig.path[self.read_idx[read as usize] as usize])
    }

    pub fn create_tig(&mut self) -> u32 {
        let id = self.tigs.len() as u32;
        self.tigs.push(Some(Box::new(Unitig::new(id))));
        id
    }

    /// Append a read to a tig. The read must not already be placed.
    pub fn add_read(&mut self, tid: u32, rd: PlacedRead) {
        assert!(
            self.read_tig[rd.id as usize] == 0,
            "read {} is already in tig {}",
            rd.id,
            self.read_tig[rd.id as usize]
        );

        let tig = self.tigs[tid as usize].as_deref_mut().expect("adding read to deleted tig");
        self.read_tig[rd.id as usize] = tid;
        self.read_idx[rd.id as usize] = tig.path.len() as u32;
        tig.path.push(rd);
    }

    /// Remove a read from whichever tig holds it.
    pub fn remove_read(&mut self, read: u32) -> Option<PlacedRead> {
        let tid = self.read_tig[read as usize];
        if tid == 0 {
            return None;
        }

        let idx = self.read_idx[read as usize] as usize;
        let tig = self.tigs[tid as usize].as_deref_mut()?;
        let rd = tig.path.remove(idx);

        for i in idx..tig.path.len() {
            self.read_idx[tig.path[i].id as usize] = i as u32;
        }

        self.read_tig[read as usize] = 0;
        self.read_idx[read as usize] = 0;
        Some(rd)
    }

    /// Delete a tig, unplacing all of its reads.
    pub fn delete_tig(&mut self, tid: u32) {
        if let Some(tig) = self.tigs[tid as usize].take() {
            for rd in &tig.path {
                self.read_tig[rd.id as usize] = 0;
                self.read_idx[rd.id as usize] = 0;
            }
        }
    }

    /// Sort a tig's path by low coordinate and refresh the index map.
    pub fn sort_tig(&mut self, tid: u32) {
        let Some(tig) = self.tigs[tid as usize].as_deref_mut() else { return };

        tig.path.sort_by(|a, b| a.min().cmp(&b.min()).then(b.max().cmp(&a.max())));

        for (i, rd) in tig.path.iter().enumerate() {
            self.read_idx[rd.id as usize] = i as u32;
        }
    }

    /// Shift a tig's coordinates so the lowest is zero.
    pub fn normalize_tig(&mut self, tid: u32) {
        let Some(tig) = self.tigs[tid as usize].as_deref_mut() else { return };
        let shift = tig.path.iter().map(|r| r.min()).min().unwrap_or(0);
        if shift != 0 {
            for rd in tig.path.iter_mut() {
                rd.bgn -= shift;
                rd.end -= shift;
            }
        }
    }

    pub fn sort_all(&mut self) {
        for tid in 1..self.tigs.len() as u32 {
            self.sort_tig(tid);
            self.normalize_tig(tid);
        }
    }

    /// Check that the membership maps agree with the tig paths; a failed
    /// check is a programming error.
    pub fn check_membership(&self) {
        for tig in self.iter() {
            for (i, rd) in tig.path.iter().enumerate() {
                assert!(
                    self.read_tig[rd.id as usize] == tig.id,
                    "read {} map says tig {}, path says {}",
                    rd.id,
                    self.read_tig[rd.id as usize],
                    tig.id
                );
                assert!(
                    self.read_idx[rd.id as usize] == i as u32,
                    "read {} map says index {}, path says {}",
                    rd.id,
                    self.read_idx[rd.id as usize],
                    i
                );
            }
        }
    }

    pub fn read_tig_map(&self) -> &[u32] {
        &self.read_tig
    }

    /// Recompute error profiles for every tig.
    pub fn compute_error_profiles(&mut self, cache: &OverlapCache) {
        let read_tig = std::mem::take(&mut self.read_tig);

        self.tigs.par_iter_mut().for_each(|slot| {
            if let Some(tig) = slot.as_deref_mut() {
                tig.compute_error_profile(cache, &read_tig);
            }
        });

        self.read_tig = read_tig;
    }

    /// Refine read positions with all overlaps among co-placed reads.
    ///
    /// The greedy layout positions each read from a single hang. Here
    /// every overlap contributes an equation "B sits at A's position plus
    /// the hangs", weighted by overlap length and 1/(1+erate), relaxed
    /// Gauss-Seidel style until coordinates move less than a base.
    pub fn optimize_positions(&mut self, ri: &ReadInfo, cache: &OverlapCache) {
        let read_tig = std::mem::take(&mut self.read_tig);

        self.tigs.par_iter_mut().for_each(|slot| {
            if let Some(tig) = slot.as_deref_mut() {
                if tig.path.len() > 1 {
                    optimize_tig_positions(tig, ri, cache, &read_tig);
                }
            }
        });

        self.read_tig = read_tig;
        self.sort_all();
    }
}

fn optimize_tig_positions(tig: &mut Unitig, ri: &ReadInfo, cache: &OverlapCache, read_tig: &[u32]) {
    use rustc_hash::FxHashMap;

    let index: FxHashMap<u32, usize> = tig.path.iter().enumerate().map(|(i, r)| (r.id, i)).collect();

    //  Precollect the equations: (a_index, b_index, mapped hangs, weight).
    //  Each overlap predicts B's span from A's current span.

    struct Eq {
        a: usize,
        b: usize,
        a_hang: i32,
        b_hang: i32,
        weight: f64,
    }

    let mut eqs: Vec<Eq> = Vec::new();

    for (ai, rd) in tig.path.iter().enumerate() {
        for ovl in cache.overlaps_for(rd.id) {
            if read_tig[ovl.b_iid as usize] != tig.id {
                continue;
            }
            let Some(&bi) = index.get(&ovl.b_iid) else { continue };

            let olen = ri.overlap_length(ovl.a_iid, ovl.b_iid, ovl.a_hang, ovl.b_hang);
            eqs.push(Eq {
                a: ai,
                b: bi,
                a_hang: ovl.a_hang,
                b_hang: ovl.b_hang,
                weight: olen as f64 / (1.0 + ovl.erate()),
            });
        }
    }

    if eqs.is_empty() {
        return;
    }

    //  Group equations by target read for the sweep.

    let mut by_target: Vec<Vec<usize>> = vec![Vec::new(); tig.path.len()];
    for (i, eq) in eqs.iter().enumerate() {
        by_target[eq.b].push(i);
    }

    let mut mins: Vec<f64> = tig.path.iter().map(|r| r.min() as f64).collect();
    let mut maxs: Vec<f64> = tig.path.iter().map(|r| r.max() as f64).collect();

    for _ in 0..OPTIMIZE_MAX_ITERS {
        let mut biggest = 0f64;

        for b in 0..tig.path.len() {
            if by_target[b].is_empty() {
                continue;
            }

            let mut w_sum = 0f64;
            let mut min_sum = 0f64;
            let mut max_sum = 0f64;

            for &ei in &by_target[b] {
                let eq = &eqs[ei];
                let fwd = tig.path[eq.a].is_forward();

                //  Predicted span of B from A's current endpoints.
                let (p_lo, p_hi) = if fwd {
                    (mins[eq.a] + eq.a_hang as f64, maxs[eq.a] + eq.b_hang as f64)
                } else {
                    (mins[eq.a] - eq.b_hang as f64, maxs[eq.a] - eq.a_hang as f64)
                };

                min_sum += eq.weight * p_lo.min(p_hi);
                max_sum += eq.weight * p_lo.max(p_hi);
                w_sum += eq.weight;
            }

            let new_min = min_sum / w_sum;
            let new_max = max_sum / w_sum;

            biggest = biggest.max((new_min - mins[b]).abs()).max((new_max - maxs[b]).abs());

            mins[b] = new_min;
            maxs[b] = new_max;
        }

        if biggest < 1.0 {
            break;
        }
    }

    //  Write back, clamping degenerate spans to at least one base and
    //  shifting so the minimum lands at zero.

    let shift = mins.iter().cloned().fold(f64::INFINITY, f64::min);

    for (i, rd) in tig.path.iter_mut().enumerate() {
        let lo = (mins[i] - shift).round() as i32;
        let mut hi = (maxs[i] - shift).round() as i32;
        if hi <= lo {
            hi = lo + 1;
        }
        let forward = rd.is_forward();
        rd.set_position(lo, hi, forward);
        assert!(rd.min() < rd.max(), "read {} collapsed during position optimization", rd.id);
    }
}
