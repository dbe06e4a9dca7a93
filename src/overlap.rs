//! Core overlap record for in-memory caching.
//!
//! An overlap relates read A to read B through two signed hangs and a flip
//! flag. The hang signs encode the overlap type: both negative means B
//! extends A's 5' end, both positive means B extends A's 3' end, mixed
//! signs mean containment.

/// Number of bits in an encoded error value.
pub const EVALUE_BITS: u32 = 12;

/// Largest encodable error value.
pub const EVALUE_MAX: u16 = (1 << EVALUE_BITS) - 1;

/// Decode a 12-bit evalue into an error fraction in [0, 1].
#[inline]
pub fn decode_evalue(evalue: u16) -> f64 {
    evalue as f64 / EVALUE_MAX as f64
}

/// Encode an error fraction into a 12-bit evalue.
#[inline]
pub fn encode_evalue(erate: f64) -> u16 {
    let e = (erate * EVALUE_MAX as f64).round();
    if e <= 0.0 {
        0
    } else if e >= EVALUE_MAX as f64 {
        EVALUE_MAX
    } else {
        e as u16
    }
}

/// Score an overlap for filtering: longer wins, then lower error.
#[inline]
pub fn overlap_score(length: u32, evalue: u16) -> u64 {
    ((length as u64) << EVALUE_BITS) | ((!evalue & EVALUE_MAX) as u64)
}

/// Recover the overlap length from a score.
#[inline]
pub fn score_to_length(score: u64) -> u32 {
    (score >> EVALUE_BITS) as u32
}

/// An overlap between two reads, as stored in the cache.
///
/// `filtered` and `symmetric` are scratch state used during
/// symmetrization; after the cache is built every surviving record has
/// `symmetric == true` and `filtered == false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Overlap {
    pub a_iid: u32,
    pub b_iid: u32,
    pub a_hang: i32,
    pub b_hang: i32,
    pub evalue: u16,
    pub flipped: bool,
    pub filtered: bool,
    pub symmetric: bool,
}

impl Overlap {
    #[inline]
    pub fn erate(&self) -> f64 {
        decode_evalue(self.evalue)
    }

    /// True for a proper dovetail overlap (one end of each read hangs out).
    #[inline]
    pub fn is_dovetail(&self) -> bool {
        (self.a_hang < 0 && self.b_hang < 0) || (self.a_hang > 0 && self.b_hang > 0)
    }

    //  -------->
    //       -------
    #[inline]
    pub fn a_end_is_3prime(&self) -> bool {
        self.a_hang > 0 && self.b_hang > 0
    }

    //       -------->
    //  -------
    #[inline]
    pub fn a_end_is_5prime(&self) -> bool {
        self.a_hang < 0 && self.b_hang < 0
    }

    //  -------->
    //    ----
    #[inline]
    pub fn a_is_container(&self) -> bool {
        self.a_hang >= 0 && self.b_hang <= 0
    }

    //    --->
    //  ---------
    #[inline]
    pub fn a_is_contained(&self) -> bool {
        self.a_hang <= 0 && self.b_hang >= 0
    }

    /// Which end of B faces the overlap. Only defined for dovetails.
    #[inline]
    pub fn b_end_is_3prime(&self) -> bool {
        debug_assert!(self.is_dovetail());
        (self.a_end_is_5prime() && !self.flipped) || (self.a_end_is_3prime() && self.flipped)
    }

    #[inline]
    pub fn b_end_is_5prime(&self) -> bool {
        debug_assert!(self.is_dovetail());
        !self.b_end_is_3prime()
    }

    /// The same overlap seen from B's side.
    ///
    /// Hangs negate when unflipped and swap when flipped; the evalue and
    /// flip flag carry over unchanged.
    pub fn twin(&self) -> Overlap {
        Overlap {
            a_iid: self.b_iid,
            b_iid: self.a_iid,
            a_hang: if self.flipped { self.b_hang } else { -self.a_hang },
            b_hang: if self.flipped { self.a_hang } else { -self.b_hang },
            evalue: self.evalue,
            flipped: self.flipped,
            filtered: self.filtered,
            symmetric: self.symmetric,
        }
    }
}

/// Canonical per-read ordering: by partner id, then flip state.
#[inline]
pub fn canonical_order(a: &Overlap, b: &Overlap) -> std::cmp::Ordering {
    a.b_iid.cmp(&b.b_iid).then(a.flipped.cmp(&b.flipped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evalue_codec() {
        assert_eq!(encode_evalue(0.0), 0);
        assert_eq!(encode_evalue(1.0), EVALUE_MAX);
        assert_eq!(encode_evalue(2.0), EVALUE_MAX);

        let e = encode_evalue(0.15);
        assert!((decode_evalue(e) - 0.15).abs() < 0.001);
    }

    #[test]
    fn test_score_ordering() {
        // Longer beats lower error.
        assert!(overlap_score(2000, 100) > overlap_score(1000, 0));
        // Same length, lower error wins.
        assert!(overlap_score(1000, 10) > overlap_score(1000, 20));
        assert_eq!(score_to_length(overlap_score(1234, 77)), 1234);
    }

    #[test]
    fn test_taxonomy() {
        let dove5 = Overlap {
            a_iid: 1,
            b_iid: 2,
            a_hang: -500,
            b_hang: -500,
            ..Default::default()
        };
        assert!(dove5.is_dovetail());
        assert!(dove5.a_end_is_5prime());
        assert!(!dove5.a_end_is_3prime());
        assert!(dove5.b_end_is_3prime());

        let cont = Overlap {
            a_iid: 1,
            b_iid: 2,
            a_hang: 200,
            b_hang: -300,
            ..Default::default()
        };
        assert!(!cont.is_dovetail());
        assert!(cont.a_is_container());
        assert!(!cont.a_is_contained());
    }

    #[test]
    fn test_twin_roundtrip() {
        let ovl = Overlap {
            a_iid: 3,
            b_iid: 9,
            a_hang: 250,
            b_hang: 400,
            evalue: 17,
            flipped: false,
            ..Default::default()
        };
        let twin = ovl.twin();
        assert_eq!(twin.a_iid, 9);
        assert_eq!(twin.b_iid, 3);
        assert_eq!(twin.a_hang, -250);
        assert_eq!(twin.b_hang, -400);
        assert_eq!(twin.twin(), ovl);

        let flipped = Overlap {
            a_iid: 3,
            b_iid: 9,
            a_hang: 250,
            b_hang: 400,
            evalue: 17,
            flipped: true,
            ..Default::default()
        };
        let twin = flipped.twin();
        assert_eq!(twin.a_hang, 400);
        assert_eq!(twin.b_hang, 250);
        assert_eq!(twin.twin(), flipped);
    }
}
