//! Suffix-type classification.
//!
//! One reverse pass over the text decides, for every position, whether its suffix is L-type
//! (greater than the suffix to its right) or S-type (smaller), upgrades an S whose left
//! neighbor is L to LMS, and counts the per-character bucket populations.  A position's type
//! is only settled once the character to its left has been seen, so the scan emits the item
//! for position i while reading position i−1; the leftmost position gets a synthetic
//! sentinel predecessor.

use std::path::Path;

use silt::{RecordReverseReader, StreamOptions};

use crate::Error;

/// The character reported for an index at or past the end of the text.  It compares equal
/// only to itself, so a real byte never matches it.
pub const SENTINEL_CH: u16 = u16::MAX;

//////////////////////////////////////////// SuffixType ////////////////////////////////////////////

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum SuffixType {
    L = 0,
    S = 1,
    Lms = 2,
    Sentinel = 3,
}

impl SuffixType {
    /// LMS suffixes are S-type suffixes with an upgrade.
    pub fn is_s(&self) -> bool {
        matches!(self, SuffixType::S | SuffixType::Lms)
    }
}

//////////////////////////////////////////// Classified ////////////////////////////////////////////

/// One position's classification, emitted in descending position order.
#[derive(Clone, Copy, Debug)]
pub struct Classified {
    pub pos: u64,
    pub ch: u8,
    pub ty: SuffixType,
    /// Character to the left of `pos` (0 when `pre_ty` is the sentinel).
    pub pre_ch: u8,
    /// Type of the suffix starting one position to the left; never Lms (the upgrade for
    /// that position has not happened yet when it is a predecessor).
    pub pre_ty: SuffixType,
    /// Length of the run of `ch` starting at `pos`, clamped by the scan's limit.
    pub rep: u64,
}

///////////////////////////////////////////// TypeScan /////////////////////////////////////////////

/// The reverse classification scan.  Yields positions n−1 down to 0.
pub struct TypeScan {
    reader: RecordReverseReader<u8>,
    last_ch: u8,
    last_ty: SuffixType,
    rep: u64,
    rep_clamp: u64,
    pos: u64,
    emitted_leftmost: bool,
}

impl TypeScan {
    /// `rep_clamp` bounds the reported run lengths (K in K-order mode, u64::MAX otherwise).
    pub fn new<P: AsRef<Path>>(
        text: P,
        rep_clamp: u64,
        opts: StreamOptions,
    ) -> Result<Self, Error> {
        let mut reader: RecordReverseReader<u8> = RecordReverseReader::open(text, opts)?;
        let n = reader.remaining();
        let last_ch = reader.expect("text must not be empty")?;
        Ok(Self {
            reader,
            last_ch,
            // The rightmost suffix is L-type by convention.
            last_ty: SuffixType::L,
            rep: 1,
            rep_clamp,
            pos: n - 1,
            emitted_leftmost: false,
        })
    }

    pub fn next(&mut self) -> Result<Option<Classified>, Error> {
        if self.emitted_leftmost {
            return Ok(None);
        }
        let item = match self.reader.read()? {
            Some(cur_ch) => {
                let cur_ty = if cur_ch < self.last_ch
                    || (cur_ch == self.last_ch && self.last_ty == SuffixType::S)
                {
                    SuffixType::S
                } else {
                    SuffixType::L
                };
                let ty = if cur_ty == SuffixType::L && self.last_ty == SuffixType::S {
                    SuffixType::Lms
                } else {
                    self.last_ty
                };
                let item = Classified {
                    pos: self.pos,
                    ch: self.last_ch,
                    ty,
                    pre_ch: cur_ch,
                    pre_ty: cur_ty,
                    rep: std::cmp::min(self.rep, self.rep_clamp),
                };
                self.rep = if cur_ch == self.last_ch { self.rep + 1 } else { 1 };
                self.last_ch = cur_ch;
                self.last_ty = cur_ty;
                self.pos -= 1;
                item
            }
            None => {
                // The leftmost suffix; its predecessor is the sentinel and it is never LMS.
                self.emitted_leftmost = true;
                Classified {
                    pos: self.pos,
                    ch: self.last_ch,
                    ty: self.last_ty,
                    pre_ch: 0,
                    pre_ty: SuffixType::Sentinel,
                    rep: std::cmp::min(self.rep, self.rep_clamp),
                }
            }
        };
        Ok(Some(item))
    }
}

//////////////////////////////////////////// BucketInfo ////////////////////////////////////////////

/// Per-character suffix populations.  The S counts include the LMS suffixes.
pub struct BucketInfo {
    pub l: [u64; 256],
    pub s: [u64; 256],
    pub lms: [u64; 256],
}

impl Default for BucketInfo {
    fn default() -> Self {
        Self {
            l: [0; 256],
            s: [0; 256],
            lms: [0; 256],
        }
    }
}

impl BucketInfo {
    pub fn note(&mut self, item: &Classified) {
        let ch = item.ch as usize;
        match item.ty {
            SuffixType::L => self.l[ch] += 1,
            SuffixType::S => self.s[ch] += 1,
            SuffixType::Lms => {
                self.s[ch] += 1;
                self.lms[ch] += 1;
            }
            SuffixType::Sentinel => {}
        }
    }

    pub fn l_total(&self) -> u64 {
        self.l.iter().sum()
    }

    pub fn s_total(&self) -> u64 {
        self.s.iter().sum()
    }

    pub fn lms_total(&self) -> u64 {
        self.lms.iter().sum()
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_all(text: &[u8]) -> Vec<Classified> {
        static NAME: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let seq = NAME.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "vouch_classify_{}_{}",
            std::process::id(),
            seq
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should create");
        let path = dir.join("t");
        std::fs::write(&path, text).expect("text should write");
        let mut scan =
            TypeScan::new(&path, u64::MAX, StreamOptions::small()).expect("scan should open");
        let mut items = Vec::new();
        while let Some(item) = scan.next().expect("scan should succeed") {
            items.push(item);
        }
        items.reverse();
        items
    }

    #[test]
    fn banana_types() {
        let items = classify_all(b"banana");
        let types: Vec<SuffixType> = items.iter().map(|i| i.ty).collect();
        assert_eq!(
            vec![
                SuffixType::L,
                SuffixType::Lms,
                SuffixType::L,
                SuffixType::Lms,
                SuffixType::L,
                SuffixType::L,
            ],
            types
        );
        assert_eq!(SuffixType::Sentinel, items[0].pre_ty);
        assert_eq!(b'n', items[1].pre_ch);
    }

    #[test]
    fn all_equal_text_is_all_l() {
        let items = classify_all(b"aaaaaa");
        assert!(items.iter().all(|i| i.ty == SuffixType::L));
        // Run lengths grow toward the left end.
        let reps: Vec<u64> = items.iter().map(|i| i.rep).collect();
        assert_eq!(vec![6, 5, 4, 3, 2, 1], reps);
    }

    #[test]
    fn leading_s_run_has_no_lms() {
        // "aab": both a-suffixes are S-type but position 0 has no left neighbor.
        let items = classify_all(b"aab");
        let types: Vec<SuffixType> = items.iter().map(|i| i.ty).collect();
        assert_eq!(vec![SuffixType::S, SuffixType::S, SuffixType::L], types);
    }

    #[test]
    fn bucket_counts_add_up() {
        let items = classify_all(b"mississippi");
        let mut buckets = BucketInfo::default();
        for item in items.iter() {
            buckets.note(item);
        }
        assert_eq!(11, buckets.l_total() + buckets.s_total());
        assert_eq!(3, buckets.lms_total());
        assert_eq!(4, buckets.l[b's' as usize]);
        assert_eq!(3, buckets.s[b'i' as usize]);
        assert_eq!(1, buckets.l[b'i' as usize]);
    }

    #[test]
    fn rep_counts_clamp() {
        let items = classify_all(b"aaaab");
        assert_eq!(4, items[0].rep);
        let dir = std::env::temp_dir().join(format!("vouch_classify_clamp_{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("temp dir should create");
        let path = dir.join("t");
        std::fs::write(&path, b"aaaab").expect("text should write");
        let mut scan = TypeScan::new(&path, 2, StreamOptions::small()).expect("scan should open");
        let mut reps = Vec::new();
        while let Some(item) = scan.next().expect("scan should succeed") {
            reps.push(item.rep);
        }
        reps.reverse();
        assert_eq!(vec![2, 2, 2, 1, 1], reps);
    }
}
