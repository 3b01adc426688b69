//! The fixed-width tuples the passes spill through silt, and the key orders they sort by.
//! Positions, ranks, and LCP values are u64 in memory regardless of the on-disk width.

use silt::{KeyOrder, Record};

use crate::classify::SuffixType;

//////////////////////////////////////////// pair orders ///////////////////////////////////////////

/// Ascending by first component, ties ascending by second.
#[derive(Default)]
pub struct ByFirst;

impl KeyOrder<(u64, u64)> for ByFirst {
    fn lt(lhs: &(u64, u64), rhs: &(u64, u64)) -> bool {
        lhs < rhs
    }
}

/// Descending by first component.  Used to pair a sorted-by-position stream with a reverse
/// scan of the text.
#[derive(Default)]
pub struct ByFirstDesc;

impl KeyOrder<(u64, u64)> for ByFirstDesc {
    fn lt(lhs: &(u64, u64), rhs: &(u64, u64)) -> bool {
        lhs.0 > rhs.0
    }
}

///////////////////////////////////////////// RankFpCh /////////////////////////////////////////////

/// One fingerprint sample: the rank it belongs to, the prefix fingerprint just before the
/// sampled position, and the character at the position (SENTINEL_CH past the end).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RankFpCh {
    pub rank: u64,
    pub fp: u64,
    pub ch: u16,
}

impl Record for RankFpCh {
    const BYTES: usize = 18;

    fn store(&self, buf: &mut [u8]) {
        buf[..8].copy_from_slice(&self.rank.to_le_bytes());
        buf[8..16].copy_from_slice(&self.fp.to_le_bytes());
        buf[16..18].copy_from_slice(&self.ch.to_le_bytes());
    }

    fn load(buf: &[u8]) -> Self {
        Self {
            rank: u64::from_le_bytes(buf[..8].try_into().unwrap()),
            fp: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            ch: u16::from_le_bytes(buf[16..18].try_into().unwrap()),
        }
    }
}

#[derive(Default)]
pub struct RankFpChByRank;

impl KeyOrder<RankFpCh> for RankFpChByRank {
    fn lt(lhs: &RankFpCh, rhs: &RankFpCh) -> bool {
        lhs.rank < rhs.rank
    }
}

////////////////////////////////////////////// PreInfo /////////////////////////////////////////////

/// What a suffix's left neighbor in the text looks like: the preceding character, its type,
/// and the length of the suffix's own leading character run.  Keyed by the suffix's SA rank
/// while sorting, stripped to [Edge] for the pass streams.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PreInfo {
    pub rank: u64,
    pub pre_ch: u8,
    pub pre_ty: u8,
    pub rep: u64,
}

impl PreInfo {
    pub fn new(rank: u64, pre_ch: u8, pre_ty: SuffixType, rep: u64) -> Self {
        Self {
            rank,
            pre_ch,
            pre_ty: pre_ty as u8,
            rep,
        }
    }

    pub fn edge(&self) -> Edge {
        Edge {
            pre_ch: self.pre_ch,
            pre_ty: self.pre_ty,
            rep: self.rep,
        }
    }
}

impl Record for PreInfo {
    const BYTES: usize = 18;

    fn store(&self, buf: &mut [u8]) {
        buf[..8].copy_from_slice(&self.rank.to_le_bytes());
        buf[8] = self.pre_ch;
        buf[9] = self.pre_ty;
        buf[10..18].copy_from_slice(&self.rep.to_le_bytes());
    }

    fn load(buf: &[u8]) -> Self {
        Self {
            rank: u64::from_le_bytes(buf[..8].try_into().unwrap()),
            pre_ch: buf[8],
            pre_ty: buf[9],
            rep: u64::from_le_bytes(buf[10..18].try_into().unwrap()),
        }
    }
}

#[derive(Default)]
pub struct PreInfoByRank;

impl KeyOrder<PreInfo> for PreInfoByRank {
    fn lt(lhs: &PreInfo, rhs: &PreInfo) -> bool {
        lhs.rank < rhs.rank
    }
}

/////////////////////////////////////////////// Edge ///////////////////////////////////////////////

/// [PreInfo] with the rank stripped: the per-suffix record the induced scans stream in rank
/// order (and reverse rank order).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Edge {
    pub pre_ch: u8,
    pub pre_ty: u8,
    pub rep: u64,
}

impl Edge {
    pub fn pre_is(&self, ty: SuffixType) -> bool {
        self.pre_ty == ty as u8
    }
}

impl Record for Edge {
    const BYTES: usize = 10;

    fn store(&self, buf: &mut [u8]) {
        buf[0] = self.pre_ch;
        buf[1] = self.pre_ty;
        buf[2..10].copy_from_slice(&self.rep.to_le_bytes());
    }

    fn load(buf: &[u8]) -> Self {
        Self {
            pre_ch: buf[0],
            pre_ty: buf[1],
            rep: u64::from_le_bytes(buf[2..10].try_into().unwrap()),
        }
    }
}

////////////////////////////////////////////// Placed //////////////////////////////////////////////

/// One induced placement: the bucket character it lands in, the rank of the inducing visit
/// (monotonic, so ties cannot happen), and the induced LCP value it carries.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Placed {
    pub ch: u8,
    pub rank: u64,
    pub val: u64,
}

impl Record for Placed {
    const BYTES: usize = 17;

    fn store(&self, buf: &mut [u8]) {
        buf[0] = self.ch;
        buf[1..9].copy_from_slice(&self.rank.to_le_bytes());
        buf[9..17].copy_from_slice(&self.val.to_le_bytes());
    }

    fn load(buf: &[u8]) -> Self {
        Self {
            ch: buf[0],
            rank: u64::from_le_bytes(buf[1..9].try_into().unwrap()),
            val: u64::from_le_bytes(buf[9..17].try_into().unwrap()),
        }
    }
}

/// Min-heap order for the rightward pass: smallest (bucket, rank) first.
#[derive(Default)]
pub struct PlacedAscending;

impl KeyOrder<Placed> for PlacedAscending {
    fn lt(lhs: &Placed, rhs: &Placed) -> bool {
        (lhs.ch, lhs.rank) < (rhs.ch, rhs.rank)
    }
}

/// Max-heap order for the leftward pass: largest (bucket, rank) first.
#[derive(Default)]
pub struct PlacedDescending;

impl KeyOrder<Placed> for PlacedDescending {
    fn lt(lhs: &Placed, rhs: &Placed) -> bool {
        (lhs.ch, lhs.rank) > (rhs.ch, rhs.rank)
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_round_trip() {
        let mut buf = [0u8; 18];
        let rec = RankFpCh {
            rank: 1 << 40,
            fp: 0x0123_4567_89ab_cdef,
            ch: u16::MAX,
        };
        rec.store(&mut buf);
        assert_eq!(rec, RankFpCh::load(&buf));

        let rec = PreInfo::new(7, b'n', SuffixType::S, 3);
        rec.store(&mut buf);
        assert_eq!(rec, PreInfo::load(&buf));

        let mut buf = [0u8; 17];
        let rec = Placed {
            ch: b'a',
            rank: 9,
            val: 2,
        };
        rec.store(&mut buf);
        assert_eq!(rec, Placed::load(&buf));
    }

    #[test]
    fn placed_orders_mirror_each_other() {
        let lo = Placed { ch: b'a', rank: 1, val: 0 };
        let hi = Placed { ch: b'b', rank: 0, val: 0 };
        assert!(PlacedAscending::lt(&lo, &hi));
        assert!(PlacedDescending::lt(&hi, &lo));
    }
}
