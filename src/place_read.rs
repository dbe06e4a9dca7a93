//! Place a read into a tig by consensus of its overlaps to reads
//! already in that tig.
//!
//! Every overlap from the read to a placed partner implies a span in the
//! partner's tig. Implied spans that agree (same tig, positions within
//! half a read length) form a cluster; each cluster becomes one candidate
//! placement with a length-weighted position, an error rate, and the
//! fraction of the read supported by evidence.

use crate::overlap_cache::OverlapCache;
use crate::read_info::ReadInfo;
use crate::tig::TigVector;

/// What placements are acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceMode {
    /// Every cluster.
    All,
    /// Drop clusters that hang outside the tig.
    NoExtend,
    /// Require nearly the whole read covered by evidence.
    FullMatch,
}

/// Coverage floor for [`PlaceMode::FullMatch`].
pub const FULL_MATCH_COVERAGE: f64 = 0.99;

/// One candidate placement of a read in a tig.
#[derive(Debug, Clone, Default)]
pub struct Placement {
    pub read: u32,
    pub tig: u32,
    /// Oriented position: end < bgn iff reverse.
    pub bgn: i32,
    pub end: i32,
    /// Position clipped to the evidence intervals.
    pub verified_bgn: i32,
    pub verified_end: i32,
    /// Sum of evalue-weighted overlap lengths.
    pub errors: f64,
    /// Sum of supporting overlap lengths.
    pub aligned: u64,
    /// Fraction of the read covered by supporting overlaps.
    pub f_coverage: f64,
    pub n_forward: u32,
    pub n_reverse: u32,
}

impl Placement {
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
        self.n_forward >= self.n_reverse
    }

    /// Mean error rate of the supporting overlaps.
    #[inline]
    pub fn erate(&self) -> f64 {
        if self.aligned == 0 {
            1.0
        } else {
            self.errors / self.aligned as f64
        }
    }
}

/// Evidence from one overlap: the span the read would occupy in the
/// partner's tig.
struct Evidence {
    tig: u32,
    lo: i32,
    hi: i32,
    /// Overlapped region of the tig (partner span clipped to ours).
    ev_lo: i32,
    ev_hi: i32,
    /// Covered span on the read itself.
    rd_lo: i32,
    rd_hi: i32,
    olen: u32,
    erate: f64,
    forward: bool,
}

/// Enumerate candidate placements for `read`, optionally restricted to
/// one target tig. Placements come back sorted by tig, then position.
pub fn place_read_using_overlaps(
    ri: &ReadInfo,
    cache: &OverlapCache,
    tigs: &TigVector,
    read: u32,
    target: Option<u32>,
    mode: PlaceMode,
) -> Vec<Placement> {
    let read_len = ri.length(read) as i32;
    if read_len == 0 {
        return Vec::new();
    }

    //  Gather evidence spans from every overlap into a placed read.

    let mut evidence: Vec<Evidence> = Vec::new();

    for ovl in cache.overlaps_for(read) {
        let tid = tigs.tig_of_read(ovl.b_iid);
        if tid == 0 {
            continue;
        }
        if let Some(t) = target {
            if tid != t {
                continue;
            }
        }

        let Some(partner) = tigs.placed_read(ovl.b_iid) else { continue };

        //  Project ourselves into the tig through the partner: the twin
        //  overlap has the partner as its A-read.
        let twin = ovl.twin();
        let (s_lo, s_hi) = partner.mapped_span(twin.a_hang, twin.b_hang);
        let (lo, hi) = (s_lo.min(s_hi), s_lo.max(s_hi));

        if lo >= hi {
            continue;
        }

        let forward = partner.is_forward() != ovl.flipped;

        //  Evidence on the tig: our span clipped to the partner's.
        let ev_lo = lo.max(partner.min());
        let ev_hi = hi.min(partner.max());

        //  Covered span on the read, from the A-side hangs.
        let rd_lo = ovl.a_hang.max(0);
        let rd_hi = read_len + ovl.b_hang.min(0);

        evidence.push(Evidence {
            tig: tid,
            lo,
            hi,
            ev_lo,
            ev_hi,
            rd_lo,
            rd_hi,
            olen: ri.overlap_length(ovl.a_iid, ovl.b_iid, ovl.a_hang, ovl.b_hang),
            erate: ovl.erate(),
            forward,
        });
    }

    if evidence.is_empty() {
        return Vec::new();
    }

    evidence.sort_by(|a, b| a.tig.cmp(&b.tig).then(a.lo.cmp(&b.lo)));

    //  Cluster: same tig, implied positions within half a read length.

    let window = (read_len / 2).max(1);
    let mut placements: Vec<Placement> = Vec::new();
    let mut cluster: Vec<&Evidence> = Vec::new();

    let flush = |cluster: &mut Vec<&Evidence>, placements: &mut Vec<Placement>| {
        if let Some(p) = summarize_cluster(read, read_len, cluster) {
            placements.push(p);
        }
        cluster.clear();
    };

    for ev in &evidence {
        if let Some(last) = cluster.last() {
            if ev.tig != last.tig || ev.lo - last.lo > window {
                flush(&mut cluster, &mut placements);
            }
        }
        cluster.push(ev);
    }
    flush(&mut cluster, &mut placements);

    //  Mode filtering.

    placements.retain(|p| match mode {
        PlaceMode::All => true,
        PlaceMode::NoExtend => {
            let tig_len = tigs.tig(p.tig).map(|t| t.length() as i32).unwrap_or(0);
            p.min() >= 0 && p.max() <= tig_len
        }
        PlaceMode::FullMatch => p.f_coverage >= FULL_MATCH_COVERAGE,
    });

    placements
}

fn summarize_cluster(read: u32, read_len: i32, cluster: &[&Evidence]) -> Option<Placement> {
    if cluster.is_empty() {
        return None;
    }

    let mut w_sum = 0f64;
    let mut lo_sum = 0f64;
    let mut hi_sum = 0f64;
    let mut errors = 0f64;
    let mut aligned = 0u64;
    let mut n_forward = 0u32;
    let mut n_reverse = 0u32;
    let mut ev_lo = i32::MAX;
    let mut ev_hi = i32::MIN;

    //  Coverage on the read: merged union of the per-overlap spans.
    let mut rd_spans: Vec<(i32, i32)> = Vec::with_capacity(cluster.len());

    for ev in cluster {
        let w = ev.olen as f64;
        lo_sum += w * ev.lo as f64;
        hi_sum += w * ev.hi as f64;
        w_sum += w;

        errors += ev.erate * ev.olen as f64;
        aligned += ev.olen as u64;

        if ev.forward {
            n_forward += 1;
        } else {
            n_reverse += 1;
        }

        if ev.ev_lo < ev.ev_hi {
            ev_lo = ev_lo.min(ev.ev_lo);
            ev_hi = ev_hi.max(ev.ev_hi);
        }

        if ev.rd_lo < ev.rd_hi {
            rd_spans.push((ev.rd_lo, ev.rd_hi));
        }
    }

    let lo = (lo_sum / w_sum).round() as i32;
    let hi = (hi_sum / w_sum).round() as i32;

    if lo >= hi {
        return None;
    }

    rd_spans.sort_unstable();
    let mut covered = 0i64;
    if let Some(&first) = rd_spans.first() {
        let mut cur = first;
        for &(b, e) in &rd_spans[1..] {
            if b <= cur.1 {
                cur.1 = cur.1.max(e);
            } else {
                covered += (cur.1 - cur.0) as i64;
                cur = (b, e);
            }
        }
        covered += (cur.1 - cur.0) as i64;
    }

    let forward = n_forward >= n_reverse;

    Some(Placement {
        read,
        tig: cluster[0].tig,
        bgn: if forward { lo } else { hi },
        end: if forward { hi } else { lo },
        verified_bgn: if ev_lo <= ev_hi { lo.max(ev_lo) } else { lo },
        verified_end: if ev_lo <= ev_hi { hi.min(ev_hi) } else { hi },
        errors,
        aligned,
        f_coverage: (covered as f64 / read_len as f64).min(1.0),
        n_forward,
        n_reverse,
    })
}
