//! Orphan and bubble handling: find small tigs whose reads all place
//! into a larger tig, then merge, shatter, or flag them.
//!
//! Runs twice from the driver: an orphan pass requiring full-coverage
//! placements, then a bubble pass that accepts partial placements and
//! only flags. Candidates are tigs whose span is (nearly) fully covered
//! by overlaps into a single larger tig; validation places the terminal
//! reads, brackets a target region, and then requires every read to land
//! inside it.

use crate::best_graph::BestOverlapGraph;
use crate::intervals::{contained_in, IntervalList};
use crate::overlap_cache::OverlapCache;
use crate::parallel;
use crate::place_read::{place_read_using_overlaps, PlaceMode, Placement};
use crate::read_info::ReadInfo;
use crate::tig::{PlacedRead, TigVector, Unitig};
use log::{debug, info};
use rustc_hash::{FxHashMap, FxHashSet};

/// Candidate orphans with more interior coverage gaps than this are not
/// worth validating.
const MAX_COVERAGE_INTERVALS: usize = 10;

/// Terminal placements at or past this count trigger the repeat-cycle
/// check before a tig may be flagged as a bubble.
const CYCLE_PLACEMENT_THRESHOLD: usize = 5;

#[derive(Debug, Default, Clone)]
pub struct OrphanStats {
    pub merged: u32,
    pub merged_reads: u32,
    pub shattered: u32,
    pub shattered_reads: u32,
    pub flagged_bubbles: u32,
    pub bubble_reads: u32,
    pub ignored: u32,
}

/// A validated region of a target tig that a candidate orphan could
/// occupy, with the read placements that landed inside it.
struct CandidateTarget {
    tig: u32,
    bgn: i32,
    end: i32,
    placed: Vec<Placement>,
}

pub fn merge_orphans(
    ri: &ReadInfo,
    cache: &OverlapCache,
    og: &BestOverlapGraph,
    tigs: &mut TigVector,
    deviation: f64,
    similarity: f64,
    is_bubble: bool,
) -> OrphanStats {
    let mut stats = OrphanStats::default();

    let potential = find_potential_orphans(cache, og, tigs, is_bubble);

    info!(
        "mergeOrphans: {} potential {} candidates",
        potential.len(),
        if is_bubble { "bubbles" } else { "orphans" }
    );

    if potential.is_empty() {
        return stats;
    }

    let placed = find_orphan_read_placements(ri, cache, tigs, &potential, deviation, similarity, is_bubble);

    //  Decide each candidate. Mutations are serialized here; only the
    //  placement search above runs parallel.

    let mut candidate_ids: Vec<u32> = potential.keys().copied().collect();
    candidate_ids.sort_unstable();

    for tid in candidate_ids {
        let Some(orphan) = tigs.tig(tid) else { continue };

        let orphan_len = orphan.length() as i32;
        let orphan_size = orphan.path.len();
        let orphan_reads: Vec<u32> = orphan.path.iter().map(|r| r.id).collect();

        let f_rd = *find_first_read(orphan, og);
        let l_rd = *find_last_read(orphan, og);

        //  Both terminal reads must place somewhere.

        if placed[f_rd.id as usize].is_empty() || placed[l_rd.id as usize].is_empty() {
            debug!("tig {}: anchor reads failed to place", tid);
            stats.ignored += 1;
            continue;
        }

        //  Bracket target regions from the terminal-read placements.

        let mut targets = find_candidate_targets(tigs, &placed, orphan_len, &f_rd, &l_rd);

        if targets.is_empty() {
            stats.ignored += 1;
            continue;
        }

        assign_reads_to_targets(&orphan_reads, &placed, &mut targets);

        //  Classify the candidate against each validated target.

        let mut n_orphan = 0u32;
        let mut n_bubble = 0u32;
        let mut orphan_target = 0usize;

        for (i, tgt) in targets.iter().enumerate() {
            let placed_reads: FxHashSet<u32> = tgt.placed.iter().map(|p| p.read).collect();
            let terminal = placed_reads.contains(&f_rd.id) as u32 + placed_reads.contains(&l_rd.id) as u32;

            debug!(
                "tig {} -> tig {} at {}-{}: {}/{} reads placed, {} terminal",
                tid,
                tgt.tig,
                tgt.bgn,
                tgt.end,
                placed_reads.len(),
                orphan_size,
                terminal
            );

            if placed_reads.len() == orphan_size && !is_bubble {
                n_orphan += 1;
                orphan_target = i;
            } else if placed_reads.len() == orphan_size || terminal == 2 {
                n_bubble += 1;
            }
        }

        //  Many placements of a terminal read plus best edges closing
        //  back into one tig means a collapsed repeat, not a bubble.

        let repeat_cycle = (placed[f_rd.id as usize].len() >= CYCLE_PLACEMENT_THRESHOLD
            || placed[l_rd.id as usize].len() >= CYCLE_PLACEMENT_THRESHOLD)
            && is_cycle(og, tigs, orphan_len, &f_rd, &l_rd);

        match (n_orphan, n_bubble) {
            (0, 0) => {
                debug!("tig {}: no good placements", tid);
                stats.ignored += 1;
            }

            (0, _) if repeat_cycle => {
                debug!("tig {}: repeat bubble, left intact", tid);
                stats.ignored += 1;
            }

            (0, _) => {
                let tig = tigs.tig_mut(tid).expect("candidate tig vanished");
                tig.is_bubble = true;

                for &rid in &orphan_reads {
                    og.set_bubble(rid);
                    og.set_backbone(rid, false);
                }

                stats.flagged_bubbles += 1;
                stats.bubble_reads += orphan_reads.len() as u32;
            }

            (1, _) => {
                //  Unique home: move every read to its placed position.

                let tgt = &targets[orphan_target];
                let target_tig = tgt.tig;
                let moves: Vec<PlacedRead> = tgt
                    .placed
                    .iter()
                    .map(|p| PlacedRead::new(p.read, p.bgn, p.end))
                    .collect();

                tigs.delete_tig(tid);
                for rd in moves {
                    tigs.add_read(target_tig, rd);
                }
                tigs.sort_tig(target_tig);

                for &rid in &orphan_reads {
                    og.set_orphan(rid);
                    og.set_backbone(rid, false);
                }

                stats.merged += 1;
                stats.merged_reads += orphan_size as u32;
            }

            _ => {
                //  Multiple homes: indistinguishable, so shatter and let
                //  each read take its lowest-error placement.

                tigs.delete_tig(tid);

                for &rid in &orphan_reads {
                    let best = placed[rid as usize]
                        .iter()
                        .filter(|p| p.tig != tid)
                        .min_by(|a, b| a.erate().partial_cmp(&b.erate()).unwrap());

                    if let Some(p) = best {
                        if tigs.tig(p.tig).is_some() {
                            tigs.add_read(p.tig, PlacedRead::new(rid, p.bgn, p.end));
                            og.set_orphan(rid);
                            og.set_backbone(rid, false);
                        }
                    }
                }

                stats.shattered += 1;
                stats.shattered_reads += orphan_size as u32;
            }
        }
    }

    tigs.sort_all();

    info!(
        "mergeOrphans: merged {} ({} reads), shattered {} ({} reads), flagged {} bubbles ({} reads), ignored {}",
        stats.merged, stats.merged_reads, stats.shattered, stats.shattered_reads, stats.flagged_bubbles,
        stats.bubble_reads, stats.ignored
    );

    stats
}

/// The read opening the tig: lowest coordinate, preferring backbone
/// reads when several start at zero.
pub fn find_first_read<'a>(tig: &'a Unitig, og: &BestOverlapGraph) -> &'a PlacedRead {
    let mut read = tig.first_read();

    for rd in tig.path.iter().skip(1) {
        if og.is_backbone(read.id) && read.min() == 0 {
            break;
        }
        if rd.min() == 0 {
            read = rd;
        }
    }

    read
}

/// The read closing the tig, same preference.
pub fn find_last_read<'a>(tig: &'a Unitig, og: &BestOverlapGraph) -> &'a PlacedRead {
    let len = tig.length() as i32;
    let mut read = tig.last_read();

    for rd in tig.path.iter().rev().skip(1) {
        if og.is_backbone(read.id) && read.max() == len {
            break;
        }
        if rd.max() == len {
            read = rd;
        }
    }

    read
}

/// Tigs whose span is covered by overlaps into larger tigs, mapped to
/// the list of those target tigs.
fn find_potential_orphans(
    cache: &OverlapCache,
    og: &BestOverlapGraph,
    tigs: &TigVector,
    is_bubble: bool,
) -> FxHashMap<u32, Vec<u32>> {
    let mut potential: FxHashMap<u32, Vec<u32>> = FxHashMap::default();

    for tig in tigs.iter() {
        if tig.path.len() <= 1 {
            continue;
        }

        let tid = tig.id();
        let tig_len = tig.length() as i32;
        let f_id = find_first_read(tig, og).id;
        let l_id = find_last_read(tig, og).id;

        let mut coverage = IntervalList::new();
        let mut olaps_to: FxHashMap<u32, u32> = FxHashMap::default();

        for rd in &tig.path {
            //  Contained reads ride along with their container, except
            //  the terminal reads, which anchor the coverage test.
            if rd.id != f_id && rd.id != l_id && og.is_contained(rd.id) {
                continue;
            }

            let rd_len = rd.len().max(1);
            let mut read_olaps_to: FxHashSet<u32> = FxHashSet::default();

            for ovl in cache.overlaps_for(rd.id) {
                let otid = tigs.tig_of_read(ovl.b_iid);
                let Some(other) = tigs.tig(otid) else { continue };

                if otid == tid || other.path.len() == 1 || (other.length() as i32) < tig_len {
                    continue;
                }

                read_olaps_to.insert(otid);

                let mut lo = rd.hang_to_min_coord(ovl.a_hang, ovl.b_hang);
                let mut hi = rd.hang_to_max_coord(ovl.a_hang, ovl.b_hang);

                //  Bubbles only need their ends close to covered; snap
                //  terminal spans out to the tig boundary.
                if is_bubble && rd.id == f_id && (lo as f64 / rd_len as f64) < 0.5 {
                    lo = 0;
                }
                if is_bubble && rd.id == l_id && ((tig_len - hi) as f64 / rd_len as f64) < 0.5 {
                    hi = tig_len;
                }

                coverage.add_span(lo, hi);
            }

            for otid in read_olaps_to {
                *olaps_to.entry(otid).or_insert(0) += 1;
            }
        }

        coverage.merge();

        if coverage.is_empty() || olaps_to.is_empty() {
            continue;
        }

        if !is_bubble && coverage.len() > MAX_COVERAGE_INTERVALS {
            continue;
        }

        let bgn_uncovered = coverage.lo(0);
        let end_uncovered = tig_len - coverage.hi(coverage.len() - 1);

        if bgn_uncovered > 0 || end_uncovered > 0 {
            continue;
        }

        let mut target_list: Vec<u32> = olaps_to.into_keys().collect();
        target_list.sort_unstable();
        potential.insert(tid, target_list);
    }

    potential
}

/// Filtered placements for every read of every candidate tig, indexed by
/// read id. Parallel over reads; the TigVector is frozen.
fn find_orphan_read_placements(
    ri: &ReadInfo,
    cache: &OverlapCache,
    tigs: &TigVector,
    potential: &FxHashMap<u32, Vec<u32>>,
    deviation: f64,
    similarity: f64,
    is_bubble: bool,
) -> Vec<Vec<Placement>> {
    let coverage_floor = if is_bubble { 0.01 } else { 0.99 };
    let mode = if is_bubble { PlaceMode::All } else { PlaceMode::NoExtend };

    parallel::par_map_reads(ri.num_reads(), |id| {
        let my_tig = tigs.tig_of_read(id);

        let Some(my_targets) = potential.get(&my_tig) else {
            return Vec::new();
        };

        place_read_using_overlaps(ri, cache, tigs, id, None, mode)
            .into_iter()
            .filter(|p| {
                if p.tig == my_tig {
                    return false;
                }

                let Some(target) = tigs.tig(p.tig) else { return false };
                if target.path.len() == 1 {
                    return false;
                }

                if my_targets.binary_search(&p.tig).is_err() {
                    return false;
                }

                //  An orphan must not settle inside another candidate.
                if !is_bubble && potential.contains_key(&p.tig) {
                    return false;
                }

                if p.f_coverage < coverage_floor {
                    return false;
                }

                let erate = p.erate();
                if erate > similarity
                    && target.overlap_consistent_with_tig(deviation, p.min(), p.max(), erate) < 0.5
                {
                    return false;
                }

                true
            })
            .collect()
    })
}

/// From the terminal-read placements, find regions of target tigs where
/// the whole candidate fits with consistent orientation, order, and a
/// length in [0.33, 3.0] times its own.
fn find_candidate_targets(
    tigs: &TigVector,
    placed: &[Vec<Placement>],
    orphan_len: i32,
    f_rd: &PlacedRead,
    l_rd: &PlacedRead,
) -> Vec<CandidateTarget> {
    let mut intervals: FxHashMap<u32, IntervalList> = FxHashMap::default();

    //  Each terminal placement is extended to the span the whole
    //  candidate would need, directed by its orientation.

    for p in &placed[f_rd.id as usize] {
        let il = intervals.entry(p.tig).or_default();
        if p.is_forward() == f_rd.is_forward() {
            il.add_span(p.min(), p.min() + orphan_len);
        } else {
            il.add_span(p.max() - orphan_len, p.max());
        }
    }

    for p in &placed[l_rd.id as usize] {
        let il = intervals.entry(p.tig).or_default();
        if p.is_forward() == l_rd.is_forward() {
            il.add_span(p.max() - orphan_len, p.max());
        } else {
            il.add_span(p.min(), p.min() + orphan_len);
        }
    }

    let mut targets: Vec<CandidateTarget> = Vec::new();

    let mut tig_ids: Vec<u32> = intervals.keys().copied().collect();
    tig_ids.sort_unstable();

    for tid in tig_ids {
        let Some(target) = tigs.tig(tid) else { continue };
        let target_len = target.length() as i32;
        let mut il = intervals.remove(&tid).unwrap();
        il.merge();

        for (lo, hi) in il.iter().collect::<Vec<_>>() {
            let int_bgn = (lo - orphan_len / 2).max(0);
            let int_end = (hi + orphan_len / 2).min(target_len);

            for fp in &placed[f_rd.id as usize] {
                if fp.tig != tid || fp.min() < int_bgn || int_end < fp.max() {
                    continue;
                }

                let f_forward = fp.is_forward() == f_rd.is_forward();

                for lp in &placed[l_rd.id as usize] {
                    if lp.tig != tid || lp.min() < int_bgn || int_end < lp.max() {
                        continue;
                    }

                    let l_forward = lp.is_forward() == l_rd.is_forward();

                    if f_forward != l_forward {
                        continue; //  mis-oriented
                    }

                    let p_bgn = if f_forward { fp.min() } else { lp.min() };
                    let p_end = if f_forward { lp.max() } else { fp.max() };
                    let length = p_end - p_bgn;

                    if length < 0 {
                        continue; //  mis-ordered
                    }
                    if (length as f64) < 0.33 * orphan_len as f64 {
                        continue; //  too small
                    }
                    if (length as f64) > 3.00 * orphan_len as f64 {
                        continue; //  too large
                    }

                    targets.push(CandidateTarget { tig: tid, bgn: p_bgn, end: p_end, placed: Vec::new() });
                }
            }
        }
    }

    targets
}

/// Attach each read placement to the targets whose region contains it,
/// then keep one placement per read per target (lowest error).
fn assign_reads_to_targets(orphan_reads: &[u32], placed: &[Vec<Placement>], targets: &mut [CandidateTarget]) {
    for &rid in orphan_reads {
        for p in &placed[rid as usize] {
            for tgt in targets.iter_mut() {
                if tgt.tig == p.tig && contained_in(p.min(), p.max(), tgt.bgn, tgt.end) {
                    tgt.placed.push(p.clone());
                }
            }
        }
    }

    for tgt in targets.iter_mut() {
        tgt.placed.sort_by(|a, b| {
            a.read
                .cmp(&b.read)
                .then(a.erate().partial_cmp(&b.erate()).unwrap())
        });
        tgt.placed.dedup_by_key(|p| p.read);
    }
}

/// True when the candidate's terminal best edges close back into one tig
/// with inconsistent orientation, or spanning less than half the
/// candidate's length: a collapsed repeat masquerading as a bubble.
fn is_cycle(
    og: &BestOverlapGraph,
    tigs: &TigVector,
    orphan_len: i32,
    f_rd: &PlacedRead,
    l_rd: &PlacedRead,
) -> bool {
    let prev = og.best_edge(f_rd.id, !f_rd.is_forward());
    let next = og.best_edge(l_rd.id, l_rd.is_forward());

    if !prev.is_some() || !next.is_some() {
        return false;
    }

    let prev_tig = tigs.tig_of_read(prev.read);
    let next_tig = tigs.tig_of_read(next.read);

    if prev_tig == 0 || prev_tig != next_tig {
        return false;
    }

    let Some(rd_prev) = tigs.placed_read(prev.read) else { return false };
    let Some(rd_next) = tigs.placed_read(next.read) else { return false };

    //  Hitting a 3' end means the far read runs forward into us.
    let p_fwd = prev.end3p;
    let n_fwd = !next.end3p;

    let start = if p_fwd == rd_prev.is_forward() { rd_prev.min() } else { rd_next.min() };
    let end = if p_fwd == rd_prev.is_forward() { rd_next.max() } else { rd_prev.max() };
    let dist = end - start;

    let bad_orientation = (p_fwd == rd_prev.is_forward()) != (n_fwd == rd_next.is_forward());

    bad_orientation || (dist as f64) < 0.5 * orphan_len as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::best_graph::BestGraphParams;
    use crate::overlap_cache::CacheParams;
    use crate::stores::{write_ovl_store, StoreOverlap};
    use tempfile::tempdir;

    fn ovl(a: u32, b: u32, ah: i32, bh: i32) -> StoreOverlap {
        StoreOverlap { a_iid: a, b_iid: b, a_hang: ah, b_hang: bh, evalue: 0, flipped: false }
    }

    fn setup(lengths: Vec<u32>, mut ovls: Vec<StoreOverlap>) -> (ReadInfo, OverlapCache, BestOverlapGraph) {
        let ri = ReadInfo::from_lengths(lengths);
        let mut twins: Vec<StoreOverlap> = ovls
            .iter()
            .map(|o| ovl(o.b_iid, o.a_iid, -o.a_hang, -o.b_hang))
            .collect();
        ovls.append(&mut twins);
        ovls.sort_by_key(|o| o.a_iid);

        let dir = tempdir().unwrap();
        let path = dir.path().join("t.ovlStore");
        write_ovl_store(&path, ri.num_reads(), &ovls).unwrap();
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
        (ri, cache, og)
    }

    /// Tig A holds reads 1-5 over 3 kb; tig B holds reads 6-7 over
    /// 1.2 kb, every read of B placing cleanly inside A at 600-1800.
    fn orphan_fixture() -> (ReadInfo, OverlapCache, BestOverlapGraph, TigVector, u32, u32) {
        let (ri, cache, og) = setup(
            vec![0, 1000, 1000, 1000, 1000, 1000, 800, 800],
            vec![
                //  A's chain.
                ovl(1, 2, 500, 500),
                ovl(2, 3, 500, 500),
                ovl(3, 4, 500, 500),
                ovl(4, 5, 500, 500),
                //  B's chain.
                ovl(6, 7, 400, 400),
                //  B's reads into A: r6 at 600-1400, r7 at 1000-1800.
                ovl(6, 2, -100, 100),
                ovl(6, 3, 400, 600),
                ovl(7, 3, 0, 200),
                ovl(7, 4, 500, 700),
            ],
        );

        let mut tigs = TigVector::new(ri.num_reads());

        let a = tigs.create_tig();
        for (id, at) in [(1u32, 0i32), (2, 500), (3, 1000), (4, 1500), (5, 2000)] {
            tigs.add_read(a, PlacedRead::new(id, at, at + 1000));
        }
        tigs.sort_tig(a);

        let b = tigs.create_tig();
        tigs.add_read(b, PlacedRead::new(6, 0, 800));
        tigs.add_read(b, PlacedRead::new(7, 400, 1200));
        tigs.sort_tig(b);

        (ri, cache, og, tigs, a, b)
    }

    #[test]
    fn test_orphan_merges_uniquely() {
        let (ri, cache, og, mut tigs, a, b) = orphan_fixture();

        let stats = merge_orphans(&ri, &cache, &og, &mut tigs, 6.0, 0.1, false);

        assert_eq!(stats.merged, 1);
        assert_eq!(stats.merged_reads, 2);

        //  B is gone; its reads live in A at their placed positions.
        assert!(tigs.tig(b).is_none());
        assert_eq!(tigs.tig(a).unwrap().path.len(), 7);
        assert_eq!(tigs.tig_of_read(6), a);
        assert_eq!(tigs.tig_of_read(7), a);

        let r6 = tigs.placed_read(6).unwrap();
        assert_eq!((r6.min(), r6.max()), (600, 1400));

        assert!(og.is_orphan(6));
        assert!(!og.is_backbone(6));

        tigs.check_membership();
    }

    #[test]
    fn test_merge_is_idempotent() {
        let (ri, cache, og, mut tigs, a, _b) = orphan_fixture();

        merge_orphans(&ri, &cache, &og, &mut tigs, 6.0, 0.1, false);
        let first: Vec<(u32, i32, i32)> = tigs.tig(a).unwrap().path.iter().map(|r| (r.id, r.bgn, r.end)).collect();

        let stats = merge_orphans(&ri, &cache, &og, &mut tigs, 6.0, 0.1, false);
        let second: Vec<(u32, i32, i32)> = tigs.tig(a).unwrap().path.iter().map(|r| (r.id, r.bgn, r.end)).collect();

        assert_eq!(stats.merged, 0);
        assert_eq!(first, second);
    }

    #[test]
    fn test_unconnected_tig_left_alone() {
        let (ri, cache, og) = setup(
            vec![0, 1000, 1000, 1000, 1000],
            vec![ovl(1, 2, 500, 500), ovl(3, 4, 500, 500)],
        );

        let mut tigs = TigVector::new(ri.num_reads());
        let a = tigs.create_tig();
        tigs.add_read(a, PlacedRead::new(1, 0, 1000));
        tigs.add_read(a, PlacedRead::new(2, 500, 1500));
        let b = tigs.create_tig();
        tigs.add_read(b, PlacedRead::new(3, 0, 1000));
        tigs.add_read(b, PlacedRead::new(4, 500, 1500));

        let stats = merge_orphans(&ri, &cache, &og, &mut tigs, 6.0, 0.1, false);

        assert_eq!(stats.merged + stats.shattered + stats.flagged_bubbles, 0);
        assert!(tigs.tig(a).is_some());
        assert!(tigs.tig(b).is_some());
    }
}
