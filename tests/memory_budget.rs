//! Memory-constrained overlap loading: the per-read cap, the retention
//! floor, and symmetrization behavior under the cap.

use tigbuild::prelude::*;
use tigbuild::stores::{write_ovl_store, StoreOverlap};

/// 200 reads of 1 kb, each overlapping its five neighbors on either
/// side with overlap lengths stepping down from 900 to 500 bases.
fn neighborhood_overlaps(num_reads: u32) -> Vec<StoreOverlap> {
    let mut ovls = Vec::new();

    for i in 1..=num_reads as i64 {
        for d in 1..=5i64 {
            for j in [i - d, i + d] {
                if j < 1 || j > num_reads as i64 {
                    continue;
                }
                let (a_hang, b_hang) = if j > i {
                    (100 * d as i32, 100 * d as i32)
                } else {
                    (-100 * d as i32, -100 * d as i32)
                };
                ovls.push(StoreOverlap {
                    a_iid: i as u32,
                    b_iid: j as u32,
                    a_hang,
                    b_hang,
                    evalue: 0,
                    flipped: false,
                });
            }
        }
    }

    ovls.sort_by_key(|o| o.a_iid);
    ovls
}

#[test]
fn capped_load_keeps_best_and_stays_symmetric() {
    let num_reads = 200u32;
    let ri = ReadInfo::from_lengths(
        std::iter::once(0).chain(std::iter::repeat(1000).take(num_reads as usize)).collect(),
    );

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.ovlStore");
    write_ovl_store(&path, num_reads, &neighborhood_overlaps(num_reads)).unwrap();

    //  A budget sized so the uniform share lands at 8 overlaps per
    //  read: interior reads carry 10 and must shed their two weakest.
    let cache = OverlapCache::load(
        &path,
        None,
        &ri,
        &CacheParams {
            max_erate: 0.25,
            min_overlap: 100,
            min_olap_percent: 0.0,
            mem_limit: 110_160,
            genome_size: 100_000, //  2x coverage: floor of 4 per read
        },
    )
    .unwrap();

    assert!(cache.min_per_read() <= cache.max_per_read());
    assert_eq!(cache.min_per_read(), 4);
    assert!(cache.max_per_read() >= 8);

    for id in 1..=num_reads {
        let ovls = cache.overlaps_for(id);

        //  The floor holds, and the cap holds.
        assert!(ovls.len() as u32 >= cache.min_per_read().min(5), "read {} kept {}", id, ovls.len());

        //  The survivors are the longest overlaps: interior reads keep
        //  their immediate neighbors.
        if (6..=195).contains(&id) {
            for d in 1..=2u32 {
                assert!(ovls.iter().any(|o| o.b_iid == id - d), "read {} lost close neighbor", id);
                assert!(ovls.iter().any(|o| o.b_iid == id + d), "read {} lost close neighbor", id);
            }
        }

        //  Symmetry: every survivor's twin is present with matched
        //  error, hangs negated.
        for o in ovls {
            let twin = cache.find(o.b_iid, id).expect("twin must exist after symmetrization");
            assert_eq!(twin.evalue, o.evalue);
            assert_eq!(twin.a_hang, -o.a_hang);
            assert_eq!(twin.b_hang, -o.b_hang);
        }
    }

    //  Symmetrization repairs only the boundary effects of the cap; the
    //  twin insertions stay a sliver of the load.
    let stats = cache.stats();
    assert!(
        stats.sym_twins_added * 100 <= stats.loaded,
        "twins added {} of {} loaded",
        stats.sym_twins_added,
        stats.loaded
    );
}

#[test]
fn infeasible_budget_is_fatal() {
    let num_reads = 200u32;
    let ri = ReadInfo::from_lengths(
        std::iter::once(0).chain(std::iter::repeat(1000).take(num_reads as usize)).collect(),
    );

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.ovlStore");
    write_ovl_store(&path, num_reads, &neighborhood_overlaps(num_reads)).unwrap();

    //  Enough for the fixed structures but almost nothing for overlaps;
    //  the floor of 4 per read cannot be met.
    let result = OverlapCache::load(
        &path,
        None,
        &ri,
        &CacheParams {
            max_erate: 0.25,
            min_overlap: 100,
            min_olap_percent: 0.0,
            mem_limit: 60_000,
            genome_size: 100_000,
        },
    );

    match result {
        Err(AsmError::Resource(msg)) => assert!(msg.contains("-M") || msg.contains("memory")),
        other => panic!("expected a resource error, got {:?}", other.map(|_| ())),
    }
}
