//! Best overlap graph: one best dovetail edge per read end, one best
//! container per contained read.
//!
//! The error-rate cutoff is derived from the data: the median of the
//! best-edge error rates, or a configurable percentile when the median is
//! zero (common for high-identity reads), clamped by the user's graph and
//! maximum rates. A forced rate overrides the computed value entirely.

use crate::overlap::{decode_evalue, encode_evalue, overlap_score, Overlap};
use crate::overlap_cache::OverlapCache;
use crate::parallel;
use crate::read_info::ReadInfo;
use log::info;
use std::io::Write;
use std::sync::atomic::{AtomicU8, Ordering};

/// How coverage gaps inside a read are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CovGapType {
    None,
    /// Interior gap with covered flanks: the read looks chimeric.
    Chimer,
    /// Any interior interval with no overlap coverage.
    #[default]
    Uncovered,
    /// Gap at a read end only.
    Deadend,
}

impl CovGapType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(CovGapType::None),
            "chimer" => Some(CovGapType::Chimer),
            "uncovered" => Some(CovGapType::Uncovered),
            "deadend" => Some(CovGapType::Deadend),
            _ => None,
        }
    }
}

/// Handling of reads whose two best edges differ too much in length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LopsidedMode {
    Off,
    /// Keep the edges, but never seed a tig from the read.
    #[default]
    NoSeed,
    /// Suppress the edges entirely.
    NoBest,
}

#[derive(Debug, Clone)]
pub struct BestGraphParams {
    pub erate_graph: f64,
    pub erate_max: f64,
    /// Overrides the computed error limit when < 1.0.
    pub erate_forced: f64,
    /// Fallback percentile when the median best-edge error is zero.
    pub percentile: f64,
    /// Relax the limit when fewer than this fraction of reads keep two
    /// best edges.
    pub min_reads_best: f64,
    pub filter_high_error: bool,
    pub filter_lopsided: bool,
    pub lopsided_mode: LopsidedMode,
    /// Percent length difference between the two best edges.
    pub lopsided_diff: f64,
    pub filter_spur: bool,
    pub spur_depth: u32,
    pub covgap_type: CovGapType,
    pub covgap_olap: u32,
}

impl Default for BestGraphParams {
    fn default() -> Self {
        Self {
            erate_graph: 0.075,
            erate_max: 0.100,
            erate_forced: 1.0,
            percentile: 0.9,
            min_reads_best: 0.8,
            filter_high_error: true,
            filter_lopsided: true,
            lopsided_mode: LopsidedMode::NoSeed,
            lopsided_diff: 25.0,
            filter_spur: true,
            spur_depth: 3,
            covgap_type: CovGapType::Uncovered,
            covgap_olap: 500,
        }
    }
}

/// The chosen dovetail overlap at one end of a read. `read == 0` means
/// no edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BestEdge {
    pub read: u32,
    /// Which end of the target read the edge lands on.
    pub end3p: bool,
    pub evalue: u16,
    pub length: u32,
    pub a_hang: i32,
    pub b_hang: i32,
    pub flipped: bool,
}

impl BestEdge {
    #[inline]
    pub fn is_some(&self) -> bool {
        self.read != 0
    }

    #[inline]
    pub fn erate(&self) -> f64 {
        decode_evalue(self.evalue)
    }
}

/// The chosen container for a contained read, with the overlap hangs as
/// seen from the contained read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BestContainer {
    pub container: u32,
    pub a_hang: i32,
    pub b_hang: i32,
    pub flipped: bool,
    pub evalue: u16,
}

impl BestContainer {
    #[inline]
    pub fn is_some(&self) -> bool {
        self.container != 0
    }
}

const FLAG_CONTAINED: u8 = 1 << 0;
const FLAG_SPUR: u8 = 1 << 1;
const FLAG_CHIMERIC: u8 = 1 << 2;
const FLAG_NOSEED: u8 = 1 << 3;
const FLAG_ORPHAN: u8 = 1 << 4;
const FLAG_BUBBLE: u8 = 1 << 5;
const FLAG_BACKBONE: u8 = 1 << 6;

pub struct BestOverlapGraph {
    best5: Vec<BestEdge>,
    best3: Vec<BestEdge>,
    containers: Vec<BestContainer>,
    flags: Vec<AtomicU8>,
    error_limit: f64,
}

impl BestOverlapGraph {
    pub fn build(ri: &ReadInfo, cache: &OverlapCache, params: &BestGraphParams) -> Self {
        let n = ri.num_reads() as usize + 1;

        let mut graph = Self {
            best5: vec![BestEdge::default(); n],
            best3: vec![BestEdge::default(); n],
            containers: vec![BestContainer::default(); n],
            flags: (0..n).map(|_| AtomicU8::new(0)).collect(),
            error_limit: params.erate_graph,
        };

        //  Containment first: best edges must not point at contained reads.

        graph.find_containers(ri, cache, params);

        //  Coverage gaps next, so chimeric reads drop out of edge finding.

        if params.covgap_type != CovGapType::None {
            graph.find_coverage_gaps(ri, cache, params);
        }

        //  Initial edges at the user's graph error rate, then derive the
        //  final limit from their error distribution and rebuild.

        graph.find_edges(ri, cache, params.erate_graph.min(params.erate_max));
        graph.error_limit = graph.choose_error_limit(ri, params);

        if params.filter_high_error {
            graph.find_edges(ri, cache, graph.error_limit);
        }

        if params.filter_lopsided && params.lopsided_mode != LopsidedMode::Off {
            graph.find_lopsided(ri, params);
        }

        if params.filter_spur {
            graph.find_spurs(ri, params.spur_depth);
        }

        let n_edges = (1..=ri.num_reads())
            .filter(|&id| graph.best_edge(id, false).is_some() || graph.best_edge(id, true).is_some())
            .count();
        let n_contained = (1..=ri.num_reads()).filter(|&id| graph.is_contained(id)).count();
        let n_spur = (1..=ri.num_reads()).filter(|&id| graph.is_spur(id)).count();

        info!(
            "BestOverlapGraph: error limit {:.4}; {} reads with best edges, {} contained, {} spurs",
            graph.error_limit, n_edges, n_contained, n_spur
        );

        graph
    }

    //
    //  Queries
    //

    #[inline]
    pub fn best_edge(&self, id: u32, end3p: bool) -> &BestEdge {
        if end3p {
            &self.best3[id as usize]
        } else {
            &self.best5[id as usize]
        }
    }

    #[inline]
    pub fn best_container(&self, id: u32) -> Option<&BestContainer> {
        let c = &self.containers[id as usize];
        c.is_some().then_some(c)
    }

    /// The error-rate limit derived at construction; downstream passes
    /// use it as their placement error cap.
    #[inline]
    pub fn report_error_limit(&self) -> f64 {
        self.error_limit
    }

    #[inline]
    fn flag(&self, id: u32, mask: u8) -> bool {
        self.flags[id as usize].load(Ordering::Relaxed) & mask != 0
    }

    #[inline]
    fn set_flag(&self, id: u32, mask: u8, on: bool) {
        if on {
            self.flags[id as usize].fetch_or(mask, Ordering::Relaxed);
        } else {
            self.flags[id as usize].fetch_and(!mask, Ordering::Relaxed);
        }
    }

    pub fn is_contained(&self, id: u32) -> bool {
        self.flag(id, FLAG_CONTAINED)
    }

    pub fn is_spur(&self, id: u32) -> bool {
        self.flag(id, FLAG_SPUR)
    }

    pub fn is_chimeric(&self, id: u32) -> bool {
        self.flag(id, FLAG_CHIMERIC)
    }

    pub fn is_orphan(&self, id: u32) -> bool {
        self.flag(id, FLAG_ORPHAN)
    }

    pub fn is_bubble(&self, id: u32) -> bool {
        self.flag(id, FLAG_BUBBLE)
    }

    pub fn is_backbone(&self, id: u32) -> bool {
        self.flag(id, FLAG_BACKBONE)
    }

    pub fn set_orphan(&self, id: u32) {
        self.set_flag(id, FLAG_ORPHAN, true);
    }

    pub fn set_bubble(&self, id: u32) {
        self.set_flag(id, FLAG_BUBBLE, true);
    }

    pub fn set_backbone(&self, id: u32, on: bool) {
        self.set_flag(id, FLAG_BACKBONE, on);
    }

    /// True when the read may seed a new tig.
    pub fn is_seedable(&self, id: u32) -> bool {
        let f = self.flags[id as usize].load(Ordering::Relaxed);
        f & (FLAG_CONTAINED | FLAG_SPUR | FLAG_CHIMERIC | FLAG_NOSEED | FLAG_ORPHAN | FLAG_BUBBLE) == 0
    }

    //
    //  Construction passes
    //

    fn find_containers(&mut self, ri: &ReadInfo, cache: &OverlapCache, params: &BestGraphParams) {
        let max_evalue = encode_evalue(params.erate_graph.min(params.erate_max));

        let containers = parallel::par_map_reads(ri.num_reads(), |id| {
            if ri.is_deleted(id) {
                return BestContainer::default();
            }

            let mut best = BestContainer::default();
            let mut best_key = (0u16, 0u32, false);

            for ovl in cache.overlaps_for(id) {
                if !ovl.a_is_contained() || ovl.evalue > max_evalue || ri.is_deleted(ovl.b_iid) {
                    continue;
                }

                //  A mutual containment (identical spans) keeps only the
                //  higher id contained, so one copy survives.
                if ovl.a_is_container() && id < ovl.b_iid {
                    continue;
                }

                let olen = ri.overlap_length(ovl.a_iid, ovl.b_iid, ovl.a_hang, ovl.b_hang);
                let key = (u16::MAX - ovl.evalue, olen, !ovl.flipped);

                if !best.is_some() || key > best_key {
                    best = BestContainer {
                        container: ovl.b_iid,
                        a_hang: ovl.a_hang,
                        b_hang: ovl.b_hang,
                        flipped: ovl.flipped,
                        evalue: ovl.evalue,
                    };
                    best_key = key;
                }
            }

            best
        });

        for id in 1..=ri.num_reads() {
            if containers[id as usize].is_some() {
                self.set_flag(id, FLAG_CONTAINED, true);
            }
        }
        self.containers = containers;
    }

    /// Scan each read for interior intervals with no overlap coverage.
    fn find_coverage_gaps(&mut self, ri: &ReadInfo, cache: &OverlapCache, params: &BestGraphParams) {
        let covgap = params.covgap_type;
        let olap = params.covgap_olap as i32;

        let gapped: Vec<bool> = parallel::par_map_reads(ri.num_reads(), |id| {
            if ri.is_deleted(id) || self.is_contained(id) {
                return false;
            }

            let len = ri.length(id) as i32;

            //  Spans of this read covered by overlaps, merged with the
            //  required overlap-to-overlap stitch.
            let mut spans: Vec<(i32, i32)> = cache
                .overlaps_for(id)
                .iter()
                .map(|ovl| {
                    let bgn = ovl.a_hang.max(0);
                    let end = len + ovl.b_hang.min(0);
                    (bgn, end)
                })
                .filter(|&(b, e)| b < e)
                .collect();

            if spans.is_empty() {
                return false;
            }

            spans.sort_unstable();

            let mut cov_bgn = spans[0].0;
            let mut cov_end = spans[0].1;
            let mut interior_gap = false;
            let mut terminal_gap = cov_bgn > 0;

            for &(b, e) in &spans[1..] {
                if b + olap <= cov_end {
                    cov_end = cov_end.max(e);
                } else {
                    interior_gap = true;
                    cov_end = cov_end.max(e);
                    cov_bgn = cov_bgn.min(b);
                }
            }

            terminal_gap |= cov_end < len;

            match covgap {
                CovGapType::None => false,
                CovGapType::Uncovered => interior_gap,
                CovGapType::Chimer => interior_gap && !terminal_gap,
                CovGapType::Deadend => terminal_gap && !interior_gap,
            }
        });

        let mut n = 0;
        for id in 1..=ri.num_reads() {
            if gapped[id as usize] {
                self.set_flag(id, FLAG_CHIMERIC, true);
                n += 1;
            }
        }

        if n > 0 {
            info!("BestOverlapGraph: {} reads with coverage gaps ({:?})", n, covgap);
        }
    }

    /// True when the overlap may be a best edge.
    fn edge_usable(&self, ri: &ReadInfo, ovl: &Overlap, max_evalue: u16) -> bool {
        ovl.is_dovetail()
            && ovl.evalue <= max_evalue
            && !ri.is_deleted(ovl.b_iid)
            && !self.is_contained(ovl.b_iid)
            && !self.is_chimeric(ovl.b_iid)
    }

    fn find_edges(&mut self, ri: &ReadInfo, cache: &OverlapCache, max_erate: f64) {
        let max_evalue = encode_evalue(max_erate);

        let edges: Vec<(BestEdge, BestEdge)> = parallel::par_map_reads(ri.num_reads(), |id| {
            if ri.is_deleted(id) || self.is_contained(id) || self.is_chimeric(id) {
                return (BestEdge::default(), BestEdge::default());
            }

            let mut best5 = BestEdge::default();
            let mut best3 = BestEdge::default();
            let mut score5 = 0u64;
            let mut score3 = 0u64;

            for ovl in cache.overlaps_for(id) {
                if !self.edge_usable(ri, ovl, max_evalue) {
                    continue;
                }

                let olen = ri.overlap_length(ovl.a_iid, ovl.b_iid, ovl.a_hang, ovl.b_hang);
                let score = overlap_score(olen, ovl.evalue);

                let edge = BestEdge {
                    read: ovl.b_iid,
                    end3p: ovl.b_end_is_3prime(),
                    evalue: ovl.evalue,
                    length: olen,
                    a_hang: ovl.a_hang,
                    b_hang: ovl.b_hang,
                    flipped: ovl.flipped,
                };

                if ovl.a_end_is_5prime() && score > score5 {
                    best5 = edge;
                    score5 = score;
                } else if ovl.a_end_is_3prime() && score > score3 {
                    best3 = edge;
                    score3 = score;
                }
            }

            (best5, best3)
        });

        for id in 1..=ri.num_reads() as usize {
            self.best5[id] = edges[id].0;
            self.best3[id] = edges[id].1;
        }
    }

    /// Pick the final error limit from the best-edge error distribution.
    fn choose_error_limit(&self, ri: &ReadInfo, params: &BestGraphParams) -> f64 {
        if params.erate_forced < 1.0 {
            info!("BestOverlapGraph: forced error limit {:.4}", params.erate_forced);
            return params.erate_forced;
        }

        let mut erates: Vec<u16> = Vec::new();
        let mut two_edges = 0u64;
        let mut candidates = 0u64;

        for id in 1..=ri.num_reads() {
            if ri.is_deleted(id) || self.is_contained(id) {
                continue;
            }
            candidates += 1;

            let b5 = &self.best5[id as usize];
            let b3 = &self.best3[id as usize];

            if b5.is_some() {
                erates.push(b5.evalue);
            }
            if b3.is_some() {
                erates.push(b3.evalue);
            }
            if b5.is_some() && b3.is_some() {
                two_edges += 1;
            }
        }

        if erates.is_empty() {
            return params.erate_graph;
        }

        erates.sort_unstable();

        let median = erates[erates.len() / 2];
        let chosen = if median > 0 {
            median
        } else {
            let at = ((erates.len() as f64 * params.percentile) as usize).min(erates.len() - 1);
            erates[at]
        };

        let mut limit = decode_evalue(chosen)
            .min(params.erate_graph)
            .min(params.erate_max);

        //  If the cutoff strands too many reads without a full edge pair,
        //  fall back to the user's graph rate.
        if candidates > 0 && (two_edges as f64 / candidates as f64) < params.min_reads_best {
            info!(
                "BestOverlapGraph: only {:.2}% of reads have two best edges; relaxing limit to {:.4}",
                100.0 * two_edges as f64 / candidates as f64,
                params.erate_graph
            );
            limit = params.erate_graph;
        }

        limit
    }

    fn find_lopsided(&mut self, ri: &ReadInfo, params: &BestGraphParams) {
        let mut n = 0;

        for id in 1..=ri.num_reads() {
            let b5 = self.best5[id as usize];
            let b3 = self.best3[id as usize];

            if !b5.is_some() || !b3.is_some() {
                continue;
            }

            let lo = b5.length.min(b3.length) as f64;
            let hi = b5.length.max(b3.length) as f64;

            if (hi - lo) / hi * 100.0 <= params.lopsided_diff {
                continue;
            }

            n += 1;

            match params.lopsided_mode {
                LopsidedMode::Off => {}
                LopsidedMode::NoSeed => self.set_flag(id, FLAG_NOSEED, true),
                LopsidedMode::NoBest => {
                    self.set_flag(id, FLAG_NOSEED, true);
                    self.best5[id as usize] = BestEdge::default();
                    self.best3[id as usize] = BestEdge::default();
                }
            }
        }

        if n > 0 {
            info!("BestOverlapGraph: {} lopsided reads ({:?})", n, params.lopsided_mode);
        }
    }

    /// Spur reads are unsupported dead-end branches. One end is dead (no
    /// best edge to a live read, nothing pointing in) and the live end
    /// hangs off the side of a through-path: its target's reciprocal best
    /// edge points elsewhere. Terminal reads of a real path are anchored
    /// by a mutual best edge and stay. Peeling repeats up to `spur_depth`
    /// hops so short dead-end chains dissolve from the tip inward.
    fn find_spurs(&mut self, ri: &ReadInfo, spur_depth: u32) {
        let n = ri.num_reads() as usize + 1;
        let mut n_spurs = 0;

        for _ in 0..spur_depth.max(1) {
            let mut incoming5 = vec![0u32; n];
            let mut incoming3 = vec![0u32; n];

            for id in 1..=ri.num_reads() {
                if self.is_spur(id) {
                    continue;
                }
                for edge in [&self.best5[id as usize], &self.best3[id as usize]] {
                    if edge.is_some() && !self.is_spur(edge.read) {
                        if edge.end3p {
                            incoming3[edge.read as usize] += 1;
                        } else {
                            incoming5[edge.read as usize] += 1;
                        }
                    }
                }
            }

            let mut changed = false;

            for id in 1..=ri.num_reads() {
                if ri.is_deleted(id) || self.is_contained(id) || self.is_spur(id) {
                    continue;
                }

                //  Edges into already-peeled spurs no longer count.
                let live = |e: &BestEdge| e.is_some() && !self.is_spur(e.read);

                let b5 = self.best5[id as usize];
                let b3 = self.best3[id as usize];

                let dead5 = !live(&b5) && incoming5[id as usize] == 0;
                let dead3 = !live(&b3) && incoming3[id as usize] == 0;

                //  A fully isolated read is a singleton, not a spur.
                let edge = match (dead5, dead3) {
                    (true, false) => b3,
                    (false, true) => b5,
                    _ => continue,
                };

                if !live(&edge) {
                    continue;
                }

                //  Anchored if the target's best edge at the landing end
                //  points back at us.
                if self.best_edge(edge.read, edge.end3p).read != id {
                    self.set_flag(id, FLAG_SPUR, true);
                    changed = true;
                    n_spurs += 1;
                }
            }

            if !changed {
                break;
            }
        }

        if n_spurs > 0 {
            info!("BestOverlapGraph: {} spur reads", n_spurs);
        }
    }

    /// Dump the edges, for the `-stop edges` checkpoint.
    pub fn write_edges<W: Write>(&self, ri: &ReadInfo, w: &mut W) -> std::io::Result<()> {
        writeln!(w, "#readId  5'read 5'end 5'erate   3'read 3'end 3'erate  container flags")?;

        for id in 1..=ri.num_reads() {
            let b5 = &self.best5[id as usize];
            let b3 = &self.best3[id as usize];
            let c = self.containers[id as usize];

            writeln!(
                w,
                "{:8} {:7} {:5} {:.5}  {:7} {:5} {:.5}  {:9} {}{}{}",
                id,
                b5.read,
                if b5.end3p { "3'" } else { "5'" },
                b5.erate(),
                b3.read,
                if b3.end3p { "3'" } else { "5'" },
                b3.erate(),
                c.container,
                if self.is_contained(id) { "C" } else { "-" },
                if self.is_spur(id) { "S" } else { "-" },
                if self.is_chimeric(id) { "X" } else { "-" },
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlap_cache::{CacheParams, OverlapCache};
    use crate::stores::{write_ovl_store, StoreOverlap};
    use tempfile::tempdir;

    fn ovl(a: u32, b: u32, ah: i32, bh: i32, ev: u16, fl: bool) -> StoreOverlap {
        StoreOverlap { a_iid: a, b_iid: b, a_hang: ah, b_hang: bh, evalue: ev, flipped: fl }
    }

    fn cache_for(ri: &ReadInfo, mut ovls: Vec<StoreOverlap>) -> OverlapCache {
        //  Twins for everything, so symmetrization is a no-op.
        let mut twins: Vec<StoreOverlap> = ovls
            .iter()
            .map(|o| {
                let t = Overlap {
                    a_iid: o.a_iid,
                    b_iid: o.b_iid,
                    a_hang: o.a_hang,
                    b_hang: o.b_hang,
                    evalue: o.evalue,
                    flipped: o.flipped,
                    ..Default::default()
                }
                .twin();
                ovl(t.a_iid, t.b_iid, t.a_hang, t.b_hang, t.evalue, t.flipped)
            })
            .collect();
        ovls.append(&mut twins);
        ovls.sort_by_key(|o| o.a_iid);

        let dir = tempdir().unwrap();
        let path = dir.path().join("t.ovlStore");
        write_ovl_store(&path, ri.num_reads(), &ovls).unwrap();
        OverlapCache::load(
            &path,
            None,
            ri,
            &CacheParams {
                max_erate: 0.5,
                min_overlap: 40,
                min_olap_percent: 0.0,
                mem_limit: u64::MAX,
                genome_size: 1000,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_best_edges_linear_chain() {
        let ri = ReadInfo::from_lengths(vec![0, 1000, 1000, 1000]);
        let cache = cache_for(&ri, vec![ovl(1, 2, 500, 500, 0, false), ovl(2, 3, 500, 500, 0, false)]);

        let og = BestOverlapGraph::build(&ri, &cache, &BestGraphParams::default());

        //  1's 3' edge goes to 2's 5' end; 2 extends both ways.
        let e = og.best_edge(1, true);
        assert_eq!(e.read, 2);
        assert!(!e.end3p);

        let e = og.best_edge(2, true);
        assert_eq!(e.read, 3);
        let e = og.best_edge(2, false);
        assert_eq!(e.read, 1);

        assert!(!og.best_edge(1, false).is_some());
    }

    #[test]
    fn test_best_edge_prefers_longer() {
        let ri = ReadInfo::from_lengths(vec![0, 1000, 1000, 1000]);
        //  Two candidates off 1's 3' end; the 600 bp overlap beats 400 bp.
        let cache = cache_for(&ri, vec![ovl(1, 2, 600, 600, 0, false), ovl(1, 3, 400, 400, 0, false)]);

        let og = BestOverlapGraph::build(&ri, &cache, &BestGraphParams::default());
        assert_eq!(og.best_edge(1, true).read, 3);
    }

    #[test]
    fn test_container_and_no_edges_to_contained() {
        let ri = ReadInfo::from_lengths(vec![0, 1000, 1000, 400]);
        let cache = cache_for(
            &ri,
            vec![
                ovl(1, 2, 500, 500, 0, false),
                //  3 contained in 2.
                ovl(3, 2, -200, 400, 0, false),
                //  A dovetail from 1 to 3, which must not become a best
                //  edge because 3 is contained.
                ovl(1, 3, 900, 300, 0, false),
            ],
        );

        let og = BestOverlapGraph::build(&ri, &cache, &BestGraphParams::default());

        assert!(og.is_contained(3));
        let c = og.best_container(3).unwrap();
        assert_eq!(c.container, 2);

        assert_eq!(og.best_edge(1, true).read, 2);
        assert!(og.best_container(1).is_none());
    }

    #[test]
    fn test_spur_detection() {
        let ri = ReadInfo::from_lengths(vec![0, 1000, 1000, 1000, 1000]);
        //  1-2-3 chain, plus 4 dangling off 2 with nothing on its 3' end
        //  and nothing pointing into it.
        let cache = cache_for(
            &ri,
            vec![
                ovl(1, 2, 500, 500, 0, false),
                ovl(2, 3, 500, 500, 0, false),
                ovl(4, 2, 800, 800, 100, false),
            ],
        );

        let og = BestOverlapGraph::build(&ri, &cache, &BestGraphParams::default());

        assert!(og.is_spur(4));
        assert!(!og.is_spur(2));
        assert!(!og.is_seedable(4));
    }

    #[test]
    fn test_forced_erate_overrides() {
        let ri = ReadInfo::from_lengths(vec![0, 1000, 1000]);
        let cache = cache_for(&ri, vec![ovl(1, 2, 500, 500, 50, false)]);

        let mut params = BestGraphParams::default();
        params.erate_forced = 0.033;

        let og = BestOverlapGraph::build(&ri, &cache, &params);
        assert!((og.report_error_limit() - 0.033).abs() < 1e-9);
    }

    #[test]
    fn test_bubble_never_backbone_flags() {
        let ri = ReadInfo::from_lengths(vec![0, 1000, 1000]);
        let cache = cache_for(&ri, vec![ovl(1, 2, 500, 500, 0, false)]);
        let og = BestOverlapGraph::build(&ri, &cache, &BestGraphParams::default());

        og.set_backbone(1, true);
        assert!(og.is_backbone(1));

        //  Flagging a read as bubble always clears backbone at the call
        //  site; the flags themselves are independent bits.
        og.set_bubble(1);
        og.set_backbone(1, false);
        assert!(og.is_bubble(1));
        assert!(!og.is_backbone(1));
    }
}
