//! Place contained and other leftover reads into the tigs built from
//! dovetail extension, by overlap consensus.

use crate::best_graph::BestOverlapGraph;
use crate::overlap_cache::OverlapCache;
use crate::parallel;
use crate::place_read::{place_read_using_overlaps, PlaceMode, Placement};
use crate::read_info::ReadInfo;
use crate::tig::{PlacedRead, TigVector};
use log::info;

/// Place every unplaced read at its best full-coverage location.
///
/// The search runs parallel over reads against a frozen TigVector; the
/// placements are applied serially afterwards. Returns the number of
/// reads placed.
pub fn place_unplaced_using_all_overlaps(
    ri: &ReadInfo,
    cache: &OverlapCache,
    og: &BestOverlapGraph,
    tigs: &mut TigVector,
    deviation: f64,
    erate_limit: f64,
) -> u32 {
    let frozen: &TigVector = tigs;
    let candidates: Vec<Option<Placement>> = parallel::par_map_reads(ri.num_reads(), |id| {
        if ri.is_deleted(id) || frozen.tig_of_read(id) != 0 {
            return None;
        }

        let placements = place_read_using_overlaps(ri, cache, frozen, id, None, PlaceMode::FullMatch);

        //  Keep placements the destination tig tolerates, then take the
        //  best by coverage and error.
        placements
            .into_iter()
            .filter(|p| {
                let erate = p.erate();
                if erate > erate_limit {
                    return false;
                }
                match frozen.tig(p.tig) {
                    Some(t) => t.overlap_consistent_with_tig(deviation, p.min(), p.max(), erate) >= 0.5,
                    None => false,
                }
            })
            .max_by(|a, b| {
                a.f_coverage
                    .partial_cmp(&b.f_coverage)
                    .unwrap()
                    .then(b.erate().partial_cmp(&a.erate()).unwrap())
            })
    });

    let mut n_placed = 0u32;
    let mut n_unplaced = 0u32;

    for id in 1..=ri.num_reads() {
        if ri.is_deleted(id) || tigs.tig_of_read(id) != 0 {
            continue;
        }

        match &candidates[id as usize] {
            Some(p) => {
                let depth = if og.is_contained(id) { 1 } else { 0 };
                tigs.add_read(
                    p.tig,
                    PlacedRead {
                        id,
                        bgn: p.bgn,
                        end: p.end,
                        parent: 0,
                        a_hang: 0,
                        b_hang: 0,
                        depth,
                    },
                );
                n_placed += 1;
            }
            None => n_unplaced += 1,
        }
    }

    tigs.sort_all();

    info!("placeContains: placed {} reads, {} left unplaced", n_placed, n_unplaced);
    n_placed
}
