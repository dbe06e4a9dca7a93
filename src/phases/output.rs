//! Final output: assign parent reads and hangs, write the tig store.

use crate::error::Result;
use crate::overlap::Overlap;
use crate::overlap_cache::OverlapCache;
use crate::stores::write_tig_store;
use crate::tig::TigVector;
use log::info;
use std::path::Path;

/// How far back in the layout to look for a parent read.
const PARENT_SEARCH_WINDOW: usize = 50;

/// Give every placed read a parent and the overlap hangs that tie it to
/// the parent, choosing the earlier read whose overlap best matches the
/// placement. Seeds and reads with no usable overlap keep parent 0.
pub fn set_parent_and_hang(cache: &OverlapCache, tigs: &mut TigVector) {
    let mut n_set = 0u64;
    let mut n_missing = 0u64;

    for tid in tigs.tig_ids() {
        let Some(tig) = tigs.tig_mut(tid) else { continue };

        for i in 0..tig.path.len() {
            if i == 0 {
                let rd = &mut tig.path[0];
                rd.parent = 0;
                rd.a_hang = 0;
                rd.b_hang = 0;
                continue;
            }

            let rd = tig.path[i];
            let lookback = i.saturating_sub(PARENT_SEARCH_WINDOW);

            //  Pick the earlier read whose overlap, projected from its
            //  placement, predicts our position most closely. Containers
            //  beat dovetails at equal miss.

            let mut best: Option<(u32, &Overlap, i64)> = None;

            for prev in tig.path[lookback..i].iter() {
                let Some(ovl) = cache.find(prev.id, rd.id) else { continue };

                let (p_lo, p_hi) = prev.mapped_span(ovl.a_hang, ovl.b_hang);
                let miss = (p_lo.min(p_hi) as i64 - rd.min() as i64).abs()
                    + (p_lo.max(p_hi) as i64 - rd.max() as i64).abs()
                    - if ovl.a_is_container() { 1 } else { 0 };

                if best.map(|(_, _, m)| miss < m).unwrap_or(true) {
                    best = Some((prev.id, ovl, miss));
                }
            }

            match best {
                Some((parent, ovl, _)) => {
                    let depth = {
                        let contained = ovl.a_is_container();
                        let p_idx = tig.path[lookback..i].iter().position(|r| r.id == parent).unwrap() + lookback;
                        if contained {
                            tig.path[p_idx].depth + 1
                        } else {
                            0
                        }
                    };
                    let (a_hang, b_hang) = (ovl.a_hang, ovl.b_hang);
                    let rd = &mut tig.path[i];
                    rd.parent = parent;
                    rd.a_hang = a_hang;
                    rd.b_hang = b_hang;
                    rd.depth = depth;
                    n_set += 1;
                }
                None => {
                    let rd = &mut tig.path[i];
                    rd.parent = 0;
                    rd.a_hang = 0;
                    rd.b_hang = 0;
                    n_missing += 1;
                }
            }
        }
    }

    info!("setParentAndHang: {} reads assigned, {} without a usable overlap", n_set, n_missing);
}

/// Write all tigs for downstream consensus.
pub fn write_tigs<P: AsRef<Path>>(tigs: &TigVector, path: P) -> Result<u32> {
    let n = write_tig_store(&path, tigs)?;
    info!("output: wrote {} tigs to {}", n, path.as_ref().display());
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlap_cache::{CacheParams, OverlapCache};
    use crate::read_info::ReadInfo;
    use crate::stores::{write_ovl_store, StoreOverlap};
    use crate::tig::PlacedRead;
    use tempfile::tempdir;

    fn ovl(a: u32, b: u32, ah: i32, bh: i32) -> StoreOverlap {
        StoreOverlap { a_iid: a, b_iid: b, a_hang: ah, b_hang: bh, evalue: 0, flipped: false }
    }

    #[test]
    fn test_parent_and_hang_chain() {
        let ri = ReadInfo::from_lengths(vec![0, 1000, 1000, 400]);
        let mut ovls = vec![
            ovl(1, 2, 500, 500),
            ovl(2, 3, 200, -400), //  3 contained in 2
        ];
        let mut twins: Vec<StoreOverlap> = ovls
            .iter()
            .map(|o| ovl(o.b_iid, o.a_iid, -o.a_hang, -o.b_hang))
            .collect();
        ovls.append(&mut twins);
        ovls.sort_by_key(|o| o.a_iid);

        let dir = tempdir().unwrap();
        let path = dir.path().join("t.ovlStore");
        write_ovl_store(&path, 3, &ovls).unwrap();
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

        let mut tigs = TigVector::new(3);
        let t = tigs.create_tig();
        tigs.add_read(t, PlacedRead::new(1, 0, 1000));
        tigs.add_read(t, PlacedRead::new(2, 500, 1500));
        tigs.add_read(t, PlacedRead::new(3, 700, 1100));
        tigs.sort_tig(t);

        set_parent_and_hang(&cache, &mut tigs);

        let tig = tigs.tig(t).unwrap();
        assert_eq!(tig.path[0].parent, 0);

        assert_eq!(tig.path[1].id, 2);
        assert_eq!(tig.path[1].parent, 1);
        assert_eq!((tig.path[1].a_hang, tig.path[1].b_hang), (500, 500));
        assert_eq!(tig.path[1].depth, 0);

        //  The contained read hangs off its container with depth 1.
        assert_eq!(tig.path[2].id, 3);
        assert_eq!(tig.path[2].parent, 2);
        assert_eq!((tig.path[2].a_hang, tig.path[2].b_hang), (200, -400));
        assert_eq!(tig.path[2].depth, 1);
    }

    #[test]
    fn test_tig_store_roundtrip_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("asm.ctg.tigStore");

        let mut tigs = TigVector::new(3);
        let t = tigs.create_tig();
        tigs.add_read(t, PlacedRead::new(1, 0, 1000));
        tigs.add_read(t, PlacedRead::new(2, 500, 1500));
        tigs.tig_mut(t).unwrap().is_circular = true;

        assert_eq!(write_tigs(&tigs, &path).unwrap(), 1);

        let bytes = std::fs::read(&path).unwrap();
        //  Header: id, flags, length, numReads; then two 24-byte reads.
        assert_eq!(bytes.len(), 16 + 2 * 24);
        assert_eq!(u32::from_le_bytes(bytes[0..4].try_into().unwrap()), t);
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 1 << 3);
        assert_eq!(u32::from_le_bytes(bytes[8..12].try_into().unwrap()), 1500);
        assert_eq!(u32::from_le_bytes(bytes[12..16].try_into().unwrap()), 2);
        assert_eq!(u32::from_le_bytes(bytes[16..20].try_into().unwrap()), 1);
    }
}
