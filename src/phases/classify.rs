//! Final tig classification: unassembled leftovers and circular tigs.

use crate::best_graph::BestOverlapGraph;
use crate::intervals::IntervalList;
use crate::read_info::ReadInfo;
use crate::tig::TigVector;
use log::info;

#[derive(Debug, Clone)]
pub struct UnassembledParams {
    /// Tigs with fewer reads than this are unassembled.
    pub few_reads: u32,
    /// Tigs shorter than this are unassembled.
    pub too_short: u32,
    /// A single read spanning more than this fraction makes the tig
    /// unassembled; it is effectively one read.
    pub span_fraction: f64,
    /// Unassembled when more than this fraction of the tig is below
    /// `lowcov_depth` read coverage.
    pub lowcov_fraction: f64,
    pub lowcov_depth: u32,
}

impl Default for UnassembledParams {
    fn default() -> Self {
        Self {
            few_reads: 2,
            too_short: 0,
            span_fraction: 1.0,
            lowcov_fraction: 0.5,
            lowcov_depth: 3,
        }
    }
}

/// Mark tigs that do not represent assembled sequence.
pub fn classify_unassembled(tigs: &mut TigVector, params: &UnassembledParams) -> u32 {
    let mut n = 0u32;

    for tid in tigs.tig_ids() {
        let Some(tig) = tigs.tig(tid) else { continue };
        let tig_len = tig.length();

        let mut unassembled = false;

        if (tig.path.len() as u32) < params.few_reads {
            unassembled = true;
        }

        if tig_len < params.too_short {
            unassembled = true;
        }

        if !unassembled && params.span_fraction < 1.0 {
            let longest = tig.path.iter().map(|r| r.len()).max().unwrap_or(0);
            if longest as f64 > params.span_fraction * tig_len as f64 {
                unassembled = true;
            }
        }

        if !unassembled && tig_len > 0 {
            let mut cov = IntervalList::new();
            for rd in &tig.path {
                cov.add_span(rd.min(), rd.max());
            }

            let mut deep_bases = 0i64;
            for (lo, hi, depth) in cov.depth_regions() {
                if depth >= params.lowcov_depth {
                    deep_bases += (hi - lo) as i64;
                }
            }

            let low_fraction = 1.0 - deep_bases as f64 / tig_len as f64;
            if low_fraction > params.lowcov_fraction {
                unassembled = true;
            }
        }

        if unassembled {
            tigs.tig_mut(tid).unwrap().is_unassembled = true;
            n += 1;
        }
    }

    info!("classify: {} tigs marked unassembled", n);
    n
}

/// A tig is circular when the best edge off its last read points back to
/// its first read, with orientation matching the layout and an implied
/// overlap no longer than the terminal reads themselves.
pub fn find_circular_contigs(ri: &ReadInfo, og: &BestOverlapGraph, tigs: &mut TigVector) -> u32 {
    let mut n = 0u32;

    for tid in tigs.tig_ids() {
        let Some(tig) = tigs.tig(tid) else { continue };
        if tig.path.len() < 2 || tig.is_bubble || tig.is_repeat {
            continue;
        }

        let first = tig.first_read();
        let last = tig.last_read();

        //  The edge off the tig's trailing end.
        let edge = og.best_edge(last.id, last.is_forward());

        if !edge.is_some() || edge.read != first.id {
            continue;
        }

        //  It must land on the end of the first read facing the tig
        //  start: the 5' end when the first read runs forward.
        if edge.end3p == first.is_forward() {
            continue;
        }

        //  And the implied overlap must fit inside the terminal reads.
        let max_olap = ri.length(first.id).min(ri.length(last.id));
        if edge.length > max_olap {
            continue;
        }

        tigs.tig_mut(tid).unwrap().is_circular = true;
        n += 1;
    }

    if n > 0 {
        info!("findCircular: {} circular tigs", n);
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tig::PlacedRead;

    #[test]
    fn test_few_reads_unassembled() {
        let mut tigs = TigVector::new(10);
        let t1 = tigs.create_tig();
        tigs.add_read(t1, PlacedRead::new(1, 0, 1000));

        let t2 = tigs.create_tig();
        tigs.add_read(t2, PlacedRead::new(2, 0, 1000));
        tigs.add_read(t2, PlacedRead::new(3, 500, 1500));

        let params = UnassembledParams { lowcov_fraction: 1.1, ..Default::default() };
        classify_unassembled(&mut tigs, &params);

        assert!(tigs.tig(t1).unwrap().is_unassembled);
        assert!(!tigs.tig(t2).unwrap().is_unassembled);
    }

    #[test]
    fn test_low_coverage_unassembled() {
        let mut tigs = TigVector::new(10);
        //  Two reads, overlap only 100 of 1900 bases: nearly all of the
        //  tig sits at depth 1.
        let t = tigs.create_tig();
        tigs.add_read(t, PlacedRead::new(1, 0, 1000));
        tigs.add_read(t, PlacedRead::new(2, 900, 1900));

        let params = UnassembledParams {
            lowcov_depth: 2,
            lowcov_fraction: 0.5,
            ..Default::default()
        };
        classify_unassembled(&mut tigs, &params);

        assert!(tigs.tig(t).unwrap().is_unassembled);
    }
}
