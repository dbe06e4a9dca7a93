//! Repeat detection and tig splitting.
//!
//! Reads from outside a tig that place only partially into it outline
//! repeat regions: intervals covered by many such placements, bounded by
//! junctions where the alignments consistently stop. Tigs split at
//! well-supported junctions; pieces dominated by repeat-interior reads
//! are flagged, and unanchored repeat-interior reads are ejected and
//! re-placed individually.

use crate::best_graph::BestOverlapGraph;
use crate::intervals::IntervalList;
use crate::overlap_cache::OverlapCache;
use crate::place_read::{place_read_using_overlaps, PlaceMode};
use crate::read_info::ReadInfo;
use crate::tig::{PlacedRead, TigVector, Unitig};
use log::{debug, info};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

/// Coverage a region needs from outside placements before it counts.
const SPURIOUS_COVERAGE_THRESHOLD: u32 = 6;

/// Independent junction votes needed to break at a read end.
const ISECT_NEEDED_TO_BREAK: u32 = 15;

/// Standing votes granted to the endpoints of each repeat region.
const REGION_END_WEIGHT: u32 = 15;

/// Regions closer than this merge.
const REGION_MERGE_SLOP: i32 = 100;

/// Tigs smaller than this are not examined.
const MIN_REPEAT_TIG_READS: usize = 15;
const MIN_REPEAT_TIG_LENGTH: u32 = 300;

#[derive(Debug, Clone)]
pub struct RepeatParams {
    pub deviation: f64,
    /// Fallback error gate when a tig has no internal overlaps to
    /// measure.
    pub erate_limit: f64,
    pub min_overlap: u32,
    /// A junction only breaks when the alternate (invader) overlap is
    /// within this many bases of the best edge at the junction read end,
    pub confused_absolute: u32,
    /// and within this percent of its length.
    pub confused_percent: f64,
    /// Disband repeat pieces into singletons instead of keeping them.
    pub shatter_repeats: bool,
}

impl Default for RepeatParams {
    fn default() -> Self {
        Self {
            deviation: 3.0,
            erate_limit: 0.075,
            min_overlap: 500,
            confused_absolute: 2500,
            confused_percent: 15.0,
            shatter_repeats: false,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct RepeatStats {
    pub tigs_split: u32,
    pub new_tigs: u32,
    pub repeat_tigs: u32,
    pub ejected_reads: u32,
    pub shattered_reads: u32,
}

/// One place a tig will be broken. `rpt_left` tells which side of the
/// point the repeat lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Breakpoint {
    point: i32,
    rpt_left: bool,
}

/// A partial placement's junction hint: where the alignment stopped, and
/// how long its aligned span was.
#[derive(Debug, Clone, Copy)]
struct JunctionEvidence {
    point: i32,
    rpt_left: bool,
    aligned: u32,
}

/// Everything decided about one tig during the parallel scan.
struct SplitPlan {
    tid: u32,
    breakpoints: Vec<Breakpoint>,
    rpt_reads: FxHashSet<u32>,
    eject: Vec<u32>,
}

pub fn mark_repeat_reads(
    ri: &ReadInfo,
    cache: &OverlapCache,
    og: &BestOverlapGraph,
    tigs: &mut TigVector,
    params: &RepeatParams,
) -> RepeatStats {
    //  Scan every tig in parallel against the frozen TigVector.

    let frozen: &TigVector = tigs;
    let plans: Vec<SplitPlan> = frozen
        .tig_ids()
        .par_iter()
        .filter_map(|&tid| scan_tig(ri, cache, og, frozen, tid, params))
        .collect();

    //  Apply the splits serially.

    let mut stats = RepeatStats::default();

    for plan in plans {
        apply_split(ri, cache, tigs, &plan, params, &mut stats);
    }

    tigs.sort_all();

    info!(
        "markRepeats: split {} tigs into {} pieces ({} repeat), ejected {} reads",
        stats.tigs_split, stats.new_tigs, stats.repeat_tigs, stats.ejected_reads
    );

    stats
}

fn scan_tig(
    ri: &ReadInfo,
    cache: &OverlapCache,
    og: &BestOverlapGraph,
    tigs: &TigVector,
    tid: u32,
    params: &RepeatParams,
) -> Option<SplitPlan> {
    let tig = tigs.tig(tid)?;

    if tig.path.len() < MIN_REPEAT_TIG_READS || tig.length() < MIN_REPEAT_TIG_LENGTH {
        return None;
    }
    if tig.is_unassembled {
        return None;
    }

    let tig_len = tig.length() as i32;

    //  Error baseline from the tig's own overlaps; placements noisier
    //  than mean + deviation * sigma are discounted.

    let erate_gate = tig_error_gate(cache, tigs, tig, params);

    //  Outside reads touching this tig. Bubble reads are excluded: their
    //  alternate placements are expected, not repeat evidence.

    let mut invaders: FxHashSet<u32> = FxHashSet::default();
    for rd in &tig.path {
        for ovl in cache.overlaps_for(rd.id) {
            if tigs.tig_of_read(ovl.b_iid) != tid
                && !ri.is_deleted(ovl.b_iid)
                && !og.is_bubble(ovl.b_iid)
            {
                invaders.insert(ovl.b_iid);
            }
        }
    }

    if invaders.is_empty() {
        return None;
    }

    //  Place each invader; gather covered intervals and junction votes.

    let mut aligned = IntervalList::new();
    let mut evidence: Vec<JunctionEvidence> = Vec::new();

    for &inv in &invaders {
        for p in place_read_using_overlaps(ri, cache, tigs, inv, Some(tid), PlaceMode::All) {
            if p.erate() > erate_gate {
                continue;
            }

            let (v_lo, v_hi) = (
                p.verified_bgn.min(p.verified_end),
                p.verified_bgn.max(p.verified_end),
            );

            if v_lo < v_hi {
                aligned.add_span(v_lo.max(0), v_hi.min(tig_len));
            }

            if p.f_coverage > 0.99 {
                continue; //  fully placed, no junction implied
            }
            if p.min() < -tig_len || p.max() > 2 * tig_len {
                continue; //  nonsense projection
            }

            //  The unaligned tail tells which side of the aligned span
            //  diverges from the tig.
            let span = (v_hi - v_lo).max(0) as u32;
            if p.min() < v_lo && v_lo > 0 {
                evidence.push(JunctionEvidence { point: v_lo, rpt_left: false, aligned: span });
            }
            if v_hi < p.max() && v_hi < tig_len {
                evidence.push(JunctionEvidence { point: v_hi, rpt_left: true, aligned: span });
            }
        }
    }

    //  Collapse coverage into repeat regions.

    let regions = find_repeat_regions(tig, &mut aligned, params.min_overlap);

    if regions.is_empty() {
        return None;
    }

    //  Reads living inside a region (without half an overlap of anchor
    //  on either side) are repeat reads; reads buried half an overlap
    //  away from both boundaries cannot reach unique sequence at all
    //  and get ejected for individual re-placement.

    let anchor = params.min_overlap as i32 / 2;
    let mut rpt_reads: FxHashSet<u32> = FxHashSet::default();
    let mut eject: Vec<u32> = Vec::new();

    for &(r_lo, r_hi) in &regions {
        for rd in &tig.path {
            let (lo, hi) = (rd.min(), rd.max());

            if lo + anchor < r_lo || r_hi + anchor < hi {
                continue; //  anchored outside the region
            }

            rpt_reads.insert(rd.id);

            if r_lo + anchor <= lo && hi + anchor <= r_hi {
                eject.push(rd.id);
            }
        }
    }

    //  Junction voting: evidence snaps to the nearest read endpoint;
    //  region boundaries carry standing weight. Junctions where the
    //  tig's own best edge clearly beats the alternates do not break.

    let breakpoints = vote_junctions(og, tig, &regions, &evidence, params);

    debug!(
        "markRepeats: tig {} has {} regions, {} evidence, {} junctions",
        tid,
        regions.len(),
        evidence.len(),
        breakpoints.len()
    );

    if breakpoints.is_empty() && eject.is_empty() {
        return None;
    }

    Some(SplitPlan { tid, breakpoints, rpt_reads, eject })
}

/// Mean plus deviation-sigma of the error rates of overlaps between
/// reads co-placed in the tig.
fn tig_error_gate(cache: &OverlapCache, tigs: &TigVector, tig: &Unitig, params: &RepeatParams) -> f64 {
    let mut sum = 0f64;
    let mut sum_sq = 0f64;
    let mut n = 0u64;

    for rd in &tig.path {
        for ovl in cache.overlaps_for(rd.id) {
            if tigs.tig_of_read(ovl.b_iid) != tig.id() {
                continue;
            }
            let e = ovl.erate();
            sum += e;
            sum_sq += e * e;
            n += 1;
        }
    }

    if n == 0 {
        return params.erate_limit;
    }

    let mean = sum / n as f64;
    let var = (sum_sq / n as f64 - mean * mean).max(0.0);

    mean + params.deviation * var.sqrt()
}

/// Depth-filter the aligned intervals, snap boundaries to read
/// endpoints, drop regions spanned by a single anchored read, and merge
/// near-adjacent survivors.
fn find_repeat_regions(tig: &Unitig, aligned: &mut IntervalList, min_overlap: u32) -> Vec<(i32, i32)> {
    let anchor = min_overlap as i32 / 2;
    let tig_len = tig.length() as i32;

    let mut deep = IntervalList::new();
    for (lo, hi, depth) in aligned.depth_regions() {
        if depth > SPURIOUS_COVERAGE_THRESHOLD {
            deep.add_span(lo, hi);
        }
    }
    deep.merge();

    let mut regions: Vec<(i32, i32)> = Vec::new();

    for (mut lo, mut hi) in deep.iter().collect::<Vec<_>>() {
        //  Snap the begin to a read start: expand to an unanchored read
        //  just before the region, else contract to the first read start
        //  inside it.
        for rd in &tig.path {
            let r_lo = rd.min();
            if r_lo + anchor < lo {
                continue; //  anchored before the region
            }
            if r_lo <= lo {
                lo = r_lo; //  expand
                break;
            }
            lo = r_lo; //  contract to the first start inside
            break;
        }

        //  Snap the end likewise, walking read ends from the right.
        let mut expand: Option<i32> = None;
        let mut contract: Option<i32> = None;
        for rd in tig.path.iter().rev() {
            let r_hi = rd.max();
            if hi + anchor < r_hi {
                continue;
            }
            if hi <= r_hi {
                expand = Some(expand.map_or(r_hi, |e: i32| e.max(r_hi)));
            } else {
                contract = Some(contract.map_or(r_hi, |c: i32| c.max(r_hi)));
            }
        }
        if let Some(e) = expand {
            hi = e;
        } else if let Some(c) = contract {
            hi = c;
        }

        if hi <= lo {
            continue; //  contracted away
        }

        //  A single read spanning the region with solid anchors on both
        //  sides resolves it; no repeat.
        let need_lo = (lo - anchor).max(0);
        let need_hi = (hi + anchor).min(tig_len);
        let spanned = tig
            .path
            .iter()
            .any(|rd| rd.min() <= need_lo && need_hi <= rd.max());
        if spanned {
            continue;
        }

        match regions.last_mut() {
            Some(last) if lo <= last.1 + REGION_MERGE_SLOP => last.1 = last.1.max(hi),
            _ => regions.push((lo, hi)),
        }
    }

    regions
}

/// Accumulate votes per (snapped point, direction); keep those at or
/// above the break threshold whose alternate overlaps are competitive
/// with the tig's own best edge, sorted by position.
fn vote_junctions(
    og: &BestOverlapGraph,
    tig: &Unitig,
    regions: &[(i32, i32)],
    evidence: &[JunctionEvidence],
    params: &RepeatParams,
) -> Vec<Breakpoint> {
    //  Candidate snap targets: every read endpoint.
    let mut endpoints: Vec<i32> = tig.path.iter().flat_map(|r| [r.min(), r.max()]).collect();
    endpoints.sort_unstable();
    endpoints.dedup();

    let snap = |p: i32| -> i32 {
        let i = endpoints.partition_point(|&e| e < p);
        let after = endpoints.get(i).copied();
        let before = if i > 0 { Some(endpoints[i - 1]) } else { None };
        match (before, after) {
            (Some(b), Some(a)) => {
                if p - b <= a - p {
                    b
                } else {
                    a
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => p,
        }
    };

    let mut votes: FxHashMap<(i32, bool), u32> = FxHashMap::default();
    let mut best_alt: FxHashMap<(i32, bool), u32> = FxHashMap::default();

    for &(lo, hi) in regions {
        *votes.entry((snap(lo), false)).or_insert(0) += REGION_END_WEIGHT;
        *votes.entry((snap(hi), true)).or_insert(0) += REGION_END_WEIGHT;
    }

    for ev in evidence {
        //  Only evidence inside some region counts; stray junctions are
        //  noise from regions already filtered away.
        if !regions.iter().any(|&(lo, hi)| lo <= ev.point && ev.point <= hi) {
            continue;
        }
        let key = (snap(ev.point), ev.rpt_left);
        *votes.entry(key).or_insert(0) += 1;
        let alt = best_alt.entry(key).or_insert(0);
        *alt = (*alt).max(ev.aligned);
    }

    let mut breaks: Vec<Breakpoint> = votes
        .into_iter()
        .filter(|&((point, rpt_left), n)| {
            n >= ISECT_NEEDED_TO_BREAK
                && junction_is_confused(og, tig, point, best_alt.get(&(point, rpt_left)).copied(), params)
        })
        .map(|((point, rpt_left), _)| Breakpoint { point, rpt_left })
        .collect();

    breaks.sort_unstable_by_key(|b| (b.point, b.rpt_left));
    breaks
}

/// True when the best edge leaving the tig read at `point` is not
/// clearly better than the strongest alternate overlap, so the layout
/// through the junction is ambiguous.
fn junction_is_confused(
    og: &BestOverlapGraph,
    tig: &Unitig,
    point: i32,
    best_alt: Option<u32>,
    params: &RepeatParams,
) -> bool {
    //  Find the read whose end sits at the junction and the end of it
    //  that faces outward.
    let at_end = tig
        .path
        .iter()
        .find(|r| r.max() == point)
        .map(|r| (r.id, r.is_forward()))
        .or_else(|| tig.path.iter().find(|r| r.min() == point).map(|r| (r.id, !r.is_forward())));

    let Some((rid, end3p)) = at_end else {
        return true; //  no owning read end; treat as ambiguous
    };

    let best = og.best_edge(rid, end3p);
    if !best.is_some() {
        return true; //  nothing continues the layout; trivially confused
    }

    let Some(alt) = best_alt else {
        //  Only region-end weight backs this junction; compare against
        //  nothing and err toward breaking.
        return true;
    };

    let ad = best.length.saturating_sub(alt) as f64;
    let pd = 100.0 * ad / best.length.max(1) as f64;

    ad < params.confused_absolute as f64 && pd < params.confused_percent
}

/// Assign each read of the sorted path to an output piece, walking the
/// breakpoints. Returns one piece id per read.
fn assign_pieces(path: &[PlacedRead], breakpoints: &[Breakpoint]) -> Vec<u32> {
    let mut piece = vec![0u32; path.len()];
    let mut bp = 0usize;
    let mut curr = 1u32;
    let mut next = 2u32;

    for (fi, rd) in path.iter().enumerate() {
        let (bgn, end) = (rd.min(), rd.max());

        if bp >= breakpoints.len() {
            piece[fi] = curr;
        } else if !breakpoints[bp].rpt_left {
            //  Repeat to the right: reads starting at or past the point
            //  open a new piece.
            if breakpoints[bp].point <= bgn {
                bp += 1;
                curr += 1;
                next += 1;
            }

            //  A read reaching past a following repeat-left junction
            //  belongs to the piece after it.
            if bp < breakpoints.len() && breakpoints[bp].point < end && breakpoints[bp].rpt_left {
                piece[fi] = next;
            } else {
                piece[fi] = curr;
            }
        } else {
            //  Repeat to the left: reads ending before the point stay.
            if end < breakpoints[bp].point {
                piece[fi] = curr;
            } else {
                piece[fi] = next;
            }

            if breakpoints[bp].point < bgn {
                bp += 1;
                curr += 1;
                next += 1;
            }
        }
    }

    piece
}

fn apply_split(
    ri: &ReadInfo,
    cache: &OverlapCache,
    tigs: &mut TigVector,
    plan: &SplitPlan,
    params: &RepeatParams,
    stats: &mut RepeatStats,
) {
    let Some(tig) = tigs.tig(plan.tid) else { return };

    let path: Vec<PlacedRead> = tig.path.clone();
    let eject: FxHashSet<u32> = plan.eject.iter().copied().collect();

    if plan.breakpoints.is_empty() {
        //  No split, only ejections.
        for &rid in &plan.eject {
            tigs.remove_read(rid);
        }
        replace_ejected(ri, cache, tigs, &plan.eject, stats);
        return;
    }

    let piece = assign_pieces(&path, &plan.breakpoints);

    tigs.delete_tig(plan.tid);
    stats.tigs_split += 1;

    let mut piece_tig: FxHashMap<u32, u32> = FxHashMap::default();
    let mut piece_offset: FxHashMap<u32, i32> = FxHashMap::default();

    for (fi, rd) in path.iter().enumerate() {
        if eject.contains(&rd.id) {
            continue;
        }

        let pid = piece[fi];
        let tid = *piece_tig.entry(pid).or_insert_with(|| {
            stats.new_tigs += 1;
            tigs.create_tig()
        });
        let offset = *piece_offset.entry(pid).or_insert(-rd.min());

        let mut moved = *rd;
        moved.bgn += offset;
        moved.end += offset;
        tigs.add_read(tid, moved);
    }

    //  Flag pieces where repeat reads dominate; shatter them if asked.

    let mut shatter: Vec<u32> = Vec::new();

    for (&_pid, &tid) in &piece_tig {
        let tig = tigs.tig_mut(tid).expect("freshly created piece");
        let n_rpt = tig.path.iter().filter(|r| plan.rpt_reads.contains(&r.id)).count();
        let n_uniq = tig.path.len() - n_rpt;

        if n_rpt > n_uniq {
            tig.is_repeat = true;
            stats.repeat_tigs += 1;
            if params.shatter_repeats {
                shatter.push(tid);
            }
        }
    }

    for tid in shatter {
        if let Some(t) = tigs.tig(tid) {
            stats.shattered_reads += t.path.len() as u32;
        }
        tigs.delete_tig(tid);
    }

    replace_ejected(ri, cache, tigs, &plan.eject, stats);
}

/// Re-place ejected reads at their individual best location.
fn replace_ejected(
    ri: &ReadInfo,
    cache: &OverlapCache,
    tigs: &mut TigVector,
    eject: &[u32],
    stats: &mut RepeatStats,
) {
    for &rid in eject {
        if tigs.tig_of_read(rid) != 0 {
            continue; //  landed in a piece already; only split-free plans remove first
        }

        stats.ejected_reads += 1;

        let best = place_read_using_overlaps(ri, cache, tigs, rid, None, PlaceMode::NoExtend)
            .into_iter()
            .min_by(|a, b| a.erate().partial_cmp(&b.erate()).unwrap());

        if let Some(p) = best {
            if tigs.tig(p.tig).is_some() {
                tigs.add_read(p.tig, PlacedRead::new(rid, p.bgn, p.end));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rd(id: u32, bgn: i32, end: i32) -> PlacedRead {
        PlacedRead::new(id, bgn, end)
    }

    #[test]
    fn test_assign_pieces_two_junctions() {
        //  Reads tile 0..5000; repeat occupies 2000..3000.
        let path: Vec<PlacedRead> = (0..25).map(|i| rd(i + 1, i as i32 * 200, i as i32 * 200 + 1000)).collect();

        let bps = vec![
            Breakpoint { point: 2000, rpt_left: false },
            Breakpoint { point: 3000, rpt_left: true },
        ];

        let piece = assign_pieces(&path, &bps);

        //  Three pieces appear, in coordinate order.
        let first = piece[0];
        let last = *piece.last().unwrap();
        assert_ne!(first, last);
        assert!(piece.windows(2).all(|w| w[0] <= w[1]), "piece ids never decrease");

        let distinct: FxHashSet<u32> = piece.iter().copied().collect();
        assert_eq!(distinct.len(), 3);

        //  A read wholly inside the repeat sits in the middle piece.
        let mid_read = path.iter().position(|r| r.min() >= 2000 && r.max() <= 3000).unwrap();
        assert!(piece[mid_read] > first && piece[mid_read] < last);
    }

    #[test]
    fn test_assign_pieces_no_breaks() {
        let path: Vec<PlacedRead> = (0..5).map(|i| rd(i + 1, i as i32 * 500, i as i32 * 500 + 1000)).collect();
        let piece = assign_pieces(&path, &[]);
        assert!(piece.iter().all(|&p| p == 1));
    }

    #[test]
    fn test_regions_require_depth() {
        let tig = crate::tig::Unitig::default();
        //  Shallow coverage: nothing survives the spurious filter.
        let mut aligned = IntervalList::new();
        for _ in 0..3 {
            aligned.add_span(100, 900);
        }

        let regions = find_repeat_regions(&tig, &mut aligned, 500);
        assert!(regions.is_empty());
    }

    #[test]
    fn test_vote_junctions_threshold() {
        use crate::best_graph::{BestGraphParams, BestOverlapGraph};
        use crate::overlap_cache::{CacheParams, OverlapCache};
        use crate::stores::{write_ovl_store, StoreOverlap};
        use tempfile::tempdir;

        //  A graph where the tig reads have no best edges: every
        //  junction counts as confused, so only the vote threshold
        //  matters here.
        let ri = crate::read_info::ReadInfo::from_lengths(vec![0, 1000, 1100, 1100, 1000, 1000]);
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.ovlStore");
        write_ovl_store(
            &path,
            5,
            &[
                StoreOverlap { a_iid: 4, b_iid: 5, a_hang: 500, b_hang: 500, evalue: 0, flipped: false },
                StoreOverlap { a_iid: 5, b_iid: 4, a_hang: -500, b_hang: -500, evalue: 0, flipped: false },
            ],
        )
        .unwrap();
        let cache = OverlapCache::load(
            &path,
            None,
            &ri,
            &CacheParams {
                max_erate: 0.5,
                min_overlap: 40,
                min_olap_percent: 0.0,
                mem_limit: u64::MAX,
                genome_size: 10_000,
            },
        )
        .unwrap();
        let og = BestOverlapGraph::build(&ri, &cache, &BestGraphParams::default());
        let params = RepeatParams::default();

        let mut tig = crate::tig::Unitig::default();
        tig.path.push(rd(1, 0, 1000));
        tig.path.push(rd(2, 980, 2000));
        tig.path.push(rd(3, 2990, 4000));

        let regions = vec![(1000, 3000)];

        //  14 pieces of evidence at a point far from the region ends:
        //  under threshold, no junction there. The region ends
        //  themselves carry weight 15 and pass.
        let evidence: Vec<JunctionEvidence> =
            (0..14).map(|_| JunctionEvidence { point: 2000, rpt_left: false, aligned: 900 }).collect();

        let breaks = vote_junctions(&og, &tig, &regions, &evidence, &params);

        let points: Vec<i32> = breaks.iter().map(|b| b.point).collect();
        assert!(points.contains(&1000));
        assert!(!points.contains(&2000));

        //  One more voice and the interior junction passes too.
        let evidence: Vec<JunctionEvidence> =
            (0..15).map(|_| JunctionEvidence { point: 2000, rpt_left: false, aligned: 900 }).collect();
        let breaks = vote_junctions(&og, &tig, &regions, &evidence, &params);
        assert!(breaks.iter().any(|b| b.point == 2000 && !b.rpt_left));
    }
}
