//! Layout cleanup: split tigs at coverage gaps, promote leftover reads
//! to singleton tigs.

use crate::read_info::ReadInfo;
use crate::tig::{PlacedRead, TigVector};
use log::info;

/// Split every tig wherever consecutive reads fail to overlap by at
/// least `min_overlap` bases. Idempotent: a second pass finds no gaps.
pub fn split_discontinuous(tigs: &mut TigVector, min_overlap: u32) -> u32 {
    let min_overlap = min_overlap as i32;
    let mut n_split = 0u32;

    for tid in tigs.tig_ids() {
        let Some(tig) = tigs.tig(tid) else { continue };
        if tig.path.len() < 2 {
            continue;
        }

        //  Find gap positions in the sorted layout.

        let path: Vec<PlacedRead> = tig.path.clone();
        let mut pieces: Vec<usize> = vec![0]; //  start index of each piece
        let mut reach = path[0].max();

        for (i, rd) in path.iter().enumerate().skip(1) {
            if rd.min() + min_overlap > reach {
                pieces.push(i);
            }
            reach = reach.max(rd.max());
        }

        if pieces.len() == 1 {
            continue;
        }

        n_split += 1;

        tigs.delete_tig(tid);
        pieces.push(path.len());

        for w in pieces.windows(2) {
            let (bgn, end) = (w[0], w[1]);
            let new_tid = tigs.create_tig();
            let offset = path[bgn..end].iter().map(|r| r.min()).min().unwrap();

            for rd in &path[bgn..end] {
                let mut moved = *rd;
                moved.bgn -= offset;
                moved.end -= offset;
                tigs.add_read(new_tid, moved);
            }
            tigs.sort_tig(new_tid);
        }
    }

    if n_split > 0 {
        info!("splitDiscontinuous: split {} discontinuous tigs", n_split);
    }

    n_split
}

/// Any read still unplaced becomes a singleton tig spanning its length.
pub fn promote_to_singleton(ri: &ReadInfo, tigs: &mut TigVector) -> u32 {
    let mut n = 0u32;

    for id in 1..=ri.num_reads() {
        if ri.is_deleted(id) || tigs.tig_of_read(id) != 0 {
            continue;
        }

        let tid = tigs.create_tig();
        tigs.add_read(tid, PlacedRead::new(id, 0, ri.length(id) as i32));
        n += 1;
    }

    if n > 0 {
        info!("promoteToSingleton: promoted {} reads", n);
    }

    n
}
