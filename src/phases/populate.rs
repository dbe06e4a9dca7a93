//! Greedy tig construction: seed from the chunk graph, extend along
//! best edges off both ends.

use crate::best_graph::BestOverlapGraph;
use crate::chunk_graph::ChunkGraph;
use crate::read_info::ReadInfo;
use crate::tig::{PlacedRead, TigVector, Unitig};
use log::info;

/// Build initial tigs from every chunk-graph seed.
pub fn populate_unitigs(ri: &ReadInfo, og: &BestOverlapGraph, cg: &mut ChunkGraph, tigs: &mut TigVector) {
    let mut n_tigs = 0u32;

    loop {
        let seed = cg.next_read_by_chunk_length();
        if seed == 0 {
            break;
        }
        if populate_from_seed(ri, og, tigs, seed) {
            n_tigs += 1;
        }
    }

    info!("populate: built {} greedy tigs", n_tigs);
}

/// Seed one tig and extend it. Returns false when the seed was already
/// consumed by an earlier tig.
fn populate_from_seed(ri: &ReadInfo, og: &BestOverlapGraph, tigs: &mut TigVector, seed: u32) -> bool {
    if tigs.tig_of_read(seed) != 0 {
        return false;
    }

    let tid = tigs.create_tig();
    tigs.add_read(tid, PlacedRead::new(seed, 0, ri.length(seed) as i32));

    extend(og, tigs, tid, seed, true);
    extend(og, tigs, tid, seed, false);

    tigs.sort_tig(tid);
    tigs.normalize_tig(tid);
    true
}

/// Walk best edges off one end of the seed, placing each read from its
/// parent's position and the edge hangs.
fn extend(og: &BestOverlapGraph, tigs: &mut TigVector, tid: u32, seed: u32, end3p: bool) {
    let mut read = seed;
    let mut end = end3p;

    loop {
        let edge = *og.best_edge(read, end);

        if !edge.is_some() {
            break;
        }
        if tigs.tig_of_read(edge.read) != 0 {
            break; //  already placed, here or elsewhere
        }
        if og.is_contained(edge.read) || og.is_spur(edge.read) || og.is_chimeric(edge.read) || og.is_bubble(edge.read) {
            break;
        }

        let parent = *tigs.placed_read(read).expect("extension parent must be placed");
        let (bgn, end_pos) = Unitig::place_read_with_edge(&parent, edge.a_hang, edge.b_hang, edge.flipped);

        tigs.add_read(
            tid,
            PlacedRead {
                id: edge.read,
                bgn,
                end: end_pos,
                parent: read,
                a_hang: edge.a_hang,
                b_hang: edge.b_hang,
                depth: 0,
            },
        );

        read = edge.read;
        end = !edge.end3p; //  entered one end, leave from the other
    }
}

/// Dissolve single-read tigs back into the unplaced pool; leftover reads
/// become singletons in one batch at cleanup instead of seeding many
/// trivial tigs here.
pub fn break_singleton_tigs(tigs: &mut TigVector) -> u32 {
    let mut n = 0;

    for tid in tigs.tig_ids() {
        let is_singleton = tigs.tig(tid).map(|t| t.path.len() == 1).unwrap_or(false);
        if is_singleton {
            tigs.delete_tig(tid);
            n += 1;
        }
    }

    if n > 0 {
        info!("populate: dissolved {} singleton tigs", n);
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::best_graph::{BestGraphParams, BestOverlapGraph};
    use crate::overlap_cache::{CacheParams, OverlapCache};
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
                genome_size: 1000,
            },
        )
        .unwrap();
        let og = BestOverlapGraph::build(&ri, &cache, &BestGraphParams::default());
        (ri, cache, og)
    }

    #[test]
    fn test_three_read_chain() {
        let (ri, _cache, og) = setup(
            vec![0, 1000, 1000, 1000],
            vec![ovl(1, 2, 500, 500), ovl(2, 3, 500, 500)],
        );

        let mut tigs = TigVector::new(ri.num_reads());
        let mut cg = ChunkGraph::build(&ri, &og);
        populate_unitigs(&ri, &og, &mut cg, &mut tigs);

        //  One tig, three reads, at 0-1000 / 500-1500 / 1000-2000.
        let built: Vec<&Unitig> = tigs.iter().collect();
        assert_eq!(built.len(), 1);

        let tig = built[0];
        assert_eq!(tig.path.len(), 3);
        assert_eq!(tig.length(), 2000);
        assert!(!tig.is_bubble && !tig.is_repeat);

        let pos: Vec<(u32, i32, i32)> = tig.path.iter().map(|r| (r.id, r.bgn, r.end)).collect();
        assert_eq!(pos, vec![(1, 0, 1000), (2, 500, 1500), (3, 1000, 2000)]);

        //  Extension reads carry their parent and the edge hangs.
        assert_eq!(tig.path[0].parent, 0);
        assert_eq!(tig.path[1].parent, 1);
        assert_eq!(tig.path[2].parent, 2);

        tigs.check_membership();
    }

    #[test]
    fn test_contained_read_not_extended_into() {
        //  3 is contained in 2; extension must stop at it.
        let (ri, _cache, og) = setup(
            vec![0, 1000, 1000, 400],
            vec![ovl(1, 2, 500, 500), ovl(3, 2, -200, 400)],
        );

        let mut tigs = TigVector::new(ri.num_reads());
        let mut cg = ChunkGraph::build(&ri, &og);
        populate_unitigs(&ri, &og, &mut cg, &mut tigs);

        assert_eq!(tigs.tig_of_read(3), 0);
        let built: Vec<&Unitig> = tigs.iter().collect();
        assert_eq!(built.len(), 1);
        assert_eq!(built[0].path.len(), 2);
    }

    #[test]
    fn test_break_singletons() {
        let mut tigs = TigVector::new(5);
        let t1 = tigs.create_tig();
        tigs.add_read(t1, PlacedRead::new(1, 0, 1000));
        let t2 = tigs.create_tig();
        tigs.add_read(t2, PlacedRead::new(2, 0, 1000));
        tigs.add_read(t2, PlacedRead::new(3, 500, 1500));

        assert_eq!(break_singleton_tigs(&mut tigs), 1);
        assert_eq!(tigs.tig_of_read(1), 0);
        assert_eq!(tigs.tig_of_read(2), t2);
    }
}
