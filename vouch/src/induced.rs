//! The induced verifier.
//!
//! With SA_LMS/LCP_LMS verified, the full (SA, LCP) pair is checked against the
//! induced-sorting derivation: a rightward scan induces every L-type suffix from the LMS
//! seeds, a leftward scan then induces every S-type suffix from the L-type ones.  Neither
//! scan rematerializes suffix positions; instead each bucket character keeps two rolling
//! hashes — one over the LCP values the candidate claims at the slots the scan visits, one
//! over the LCP values the induction rules derive — and the pass accepts iff every pair of
//! hashes agrees at the end.
//!
//! The range-minimum oracle is a per-character running minimum.  A visit with link value ℓ
//! lowers the minima of the characters still ahead of the scan; placing an induced suffix
//! into bucket c reads minLCP[c] and resets it.  The leftward scan resolves each link one
//! visit late (a suffix's LCP slot pairs it with its *right* neighbor, which the leftward
//! scan saw first), so placements there reset the oracle to the link being resolved rather
//! than to infinity.

use silt::{ExtHeap, RecordReader, RecordReverseReader, ScratchVec, Sorter};

use crate::classify::{BucketInfo, SuffixType, TypeScan};
use crate::lms::LmsArrays;
use crate::tuples::{ByFirstDesc, Edge, Placed, PlacedAscending, PlacedDescending, PreInfo, PreInfoByRank};
use crate::{Error, IndexWidth, Packed, Pass, PassCtx, Reject};

/////////////////////////////////////////////// Rmq ////////////////////////////////////////////////

/// Per-character running minimum of link values; O(|Σ|) space, O(|Σ|·n) total update time.
struct Rmq {
    min: [u64; 256],
}

impl Default for Rmq {
    fn default() -> Self {
        Self {
            min: [u64::MAX; 256],
        }
    }
}

impl Rmq {
    fn get(&self, ch: u8) -> u64 {
        self.min[ch as usize]
    }

    fn set(&mut self, ch: u8, v: u64) {
        self.min[ch as usize] = v;
    }

    /// Read-and-reset, for rightward placements.
    fn take(&mut self, ch: u8) -> u64 {
        let v = self.min[ch as usize];
        self.min[ch as usize] = u64::MAX;
        v
    }

    /// A rightward visit in bucket `ch` only affects placements into buckets at or beyond
    /// `ch`.
    fn update_right(&mut self, ch: u8, v: u64) {
        for slot in self.min[ch as usize..].iter_mut() {
            if *slot > v {
                *slot = v;
            }
        }
    }

    /// Leftward mirror image.
    fn update_left(&mut self, ch: u8, v: u64) {
        for slot in self.min[..=ch as usize].iter_mut() {
            if *slot > v {
                *slot = v;
            }
        }
    }
}

///////////////////////////////////////////// BucketWalk ///////////////////////////////////////////

/// Walks one per-character distribution in scan order, skipping empty buckets, remembering
/// the character of the most recently consumed slot.
struct BucketWalk {
    entries: Vec<(u8, u64)>,
    idx: usize,
    left: u64,
    last: Option<u8>,
}

impl BucketWalk {
    fn rightward(dist: &[u64; 256]) -> Self {
        Self::new(dist.iter().enumerate().map(|(c, n)| (c as u8, *n)).collect())
    }

    fn leftward(dist: &[u64; 256]) -> Self {
        Self::new(
            dist.iter()
                .enumerate()
                .rev()
                .map(|(c, n)| (c as u8, *n))
                .collect(),
        )
    }

    fn new(all: Vec<(u8, u64)>) -> Self {
        let entries: Vec<(u8, u64)> = all.into_iter().filter(|(_, n)| *n > 0).collect();
        let left = entries.first().map(|e| e.1).unwrap_or(0);
        Self {
            entries,
            idx: 0,
            left,
            last: None,
        }
    }

    fn try_cur(&self) -> Option<u8> {
        if self.idx < self.entries.len() {
            Some(self.entries[self.idx].0)
        } else {
            None
        }
    }

    fn has(&self, ch: u8) -> bool {
        self.try_cur() == Some(ch)
    }

    fn last(&self) -> Option<u8> {
        self.last
    }

    fn advance(&mut self) {
        self.last = self.try_cur();
        self.left -= 1;
        if self.left == 0 {
            self.idx += 1;
            if self.idx < self.entries.len() {
                self.left = self.entries[self.idx].1;
            }
        }
    }
}

////////////////////////////////////////// InducedInputs ///////////////////////////////////////////

pub(crate) struct InducedInputs {
    /// Per LMS suffix, in SA order: the preceding character and the leading run length.
    pub seeds: ScratchVec<Edge>,
    /// Per L-type suffix, in SA order.
    pub edges_l: ScratchVec<Edge>,
    /// Per S-type suffix (LMS included), in SA order.
    pub edges_s: ScratchVec<Edge>,
    /// The candidate LCP values at the L-type slots, in SA order.
    pub lcp_l_scan: ScratchVec<u64>,
    pub buckets: BucketInfo,
    pub rightmost_ch: u8,
}

/// One more (SA[i], i) descending sort paired with the reverse classification scan, this
/// time keeping predecessor information for every suffix, split by type.
pub(crate) fn retrieve<W: IndexWidth>(ctx: &PassCtx) -> Result<Pass<InducedInputs>, Error> {
    let mut by_pos: Sorter<(u64, u64), ByFirstDesc> =
        Sorter::new(&ctx.scratch, ctx.sorter_opts())?;
    let mut sa_reader: RecordReader<Packed<W>> = RecordReader::open(&ctx.sa, ctx.stream)?;
    for rank in 0..ctx.n {
        let sa = sa_reader.expect("suffix array")?.0;
        if sa >= ctx.n {
            return Ok(Pass::Reject(
                Reject::new("suffix array entry out of range").at_index(rank),
            ));
        }
        by_pos.push((sa, rank))?;
    }
    let mut by_pos = by_pos.seal()?;

    let mut lms_sorter: Sorter<PreInfo, PreInfoByRank> =
        Sorter::new(&ctx.scratch, ctx.sorter_opts())?;
    let mut l_sorter: Sorter<PreInfo, PreInfoByRank> =
        Sorter::new(&ctx.scratch, ctx.sorter_opts())?;
    let mut s_sorter: Sorter<PreInfo, PreInfoByRank> =
        Sorter::new(&ctx.scratch, ctx.sorter_opts())?;
    let mut buckets = BucketInfo::default();
    let mut rightmost_ch = 0u8;
    let mut scan = TypeScan::new(&ctx.text, ctx.kcap(), ctx.stream)?;
    while let Some(item) = scan.next()? {
        let (pos, rank) = by_pos.expect("suffix array pairs")?;
        if pos != item.pos {
            return Ok(Pass::Reject(Reject::new("suffix array is not a permutation")));
        }
        buckets.note(&item);
        if item.pos == ctx.n - 1 {
            rightmost_ch = item.ch;
        }
        let info = PreInfo::new(rank, item.pre_ch, item.pre_ty, item.rep);
        match item.ty {
            SuffixType::L => l_sorter.push(info)?,
            SuffixType::S => s_sorter.push(info)?,
            SuffixType::Lms => {
                s_sorter.push(info)?;
                lms_sorter.push(info)?;
            }
            SuffixType::Sentinel => {}
        }
    }

    let mut lms_stream = lms_sorter.seal()?;
    let mut seeds = ScratchVec::<Edge>::writer(&ctx.scratch, "seeds", ctx.stream)?;
    while let Some(info) = lms_stream.next()? {
        seeds.write(&info.edge())?;
    }

    // Drain the L stream and pluck the candidate LCP values at its ranks in one pass.
    let mut l_stream = l_sorter.seal()?;
    let mut edges_l = ScratchVec::<Edge>::writer(&ctx.scratch, "edges_l", ctx.stream)?;
    let mut lcp_l_scan = ScratchVec::<u64>::writer(&ctx.scratch, "lcp_l_scan", ctx.stream)?;
    let mut lcp_reader: RecordReader<Packed<W>> = RecordReader::open(&ctx.lcp, ctx.stream)?;
    let mut at_rank = 0u64;
    while let Some(info) = l_stream.next()? {
        while at_rank < info.rank {
            let _ = lcp_reader.expect("LCP array")?;
            at_rank += 1;
        }
        let lcp = lcp_reader.expect("LCP array")?.0;
        at_rank += 1;
        edges_l.write(&info.edge())?;
        lcp_l_scan.write(&lcp)?;
    }

    let mut s_stream = s_sorter.seal()?;
    let mut edges_s = ScratchVec::<Edge>::writer(&ctx.scratch, "edges_s", ctx.stream)?;
    while let Some(info) = s_stream.next()? {
        edges_s.write(&info.edge())?;
    }

    Ok(Pass::Done(InducedInputs {
        seeds: seeds.finish()?,
        edges_l: edges_l.finish()?,
        edges_s: edges_s.finish()?,
        lcp_l_scan: lcp_l_scan.finish()?,
        buckets,
        rightmost_ch,
    }))
}

////////////////////////////////////////// rightward pass //////////////////////////////////////////

/// Induce the L-type suffixes left to right.  Every L slot pairs the candidate's claimed
/// LCP (from `lcp_l_scan`) against the rule-derived value carried by the heap; LMS visits
/// contribute their (already verified) values to both hashes and keep the oracle honest.
/// Returns the per-L-slot induced values for the leftward pass.
pub(crate) fn check_l<W: IndexWidth>(
    ctx: &PassCtx,
    arrays: &LmsArrays,
    inputs: &InducedInputs,
) -> Result<Pass<ScratchVec<u64>>, Error> {
    let params = ctx.rint.params();
    let kcap = ctx.kcap();
    let mut fp_scanned = [0u64; 256];
    let mut fp_induced = [0u64; 256];
    let mut rmq = Rmq::default();
    let mut placed = [false; 256];
    let mut walk_l = BucketWalk::rightward(&inputs.buckets.l);
    let mut walk_lms = BucketWalk::rightward(&inputs.buckets.lms);
    let mut heap: ExtHeap<Placed, PlacedAscending> =
        ExtHeap::new(&ctx.scratch, ctx.heap_budget, ctx.stream)?;
    let mut seeds = inputs.seeds.reader(ctx.stream)?;
    let mut lcp_lms = arrays.lcp_lms.reader(ctx.stream)?;
    let mut edges_l = inputs.edges_l.reader(ctx.stream)?;
    let mut lcp_l_scan = inputs.lcp_l_scan.reader(ctx.stream)?;
    let mut out = ScratchVec::<u64>::writer(&ctx.scratch, "sorted_lcp_l", ctx.stream)?;

    // The rightmost suffix is induced from the virtual sentinel, which shares nothing.
    let mut rank = 1u64;
    heap.push(Placed {
        ch: inputs.rightmost_ch,
        rank,
        val: 0,
    })?;
    placed[inputs.rightmost_ch as usize] = true;
    rank += 1;

    let mut last_rep_l = 0u64;
    let mut cur = match walk_l.try_cur() {
        Some(ch) => ch,
        None => {
            return Err(silt::logic_error("no L-type suffixes; the rightmost suffix is L").into())
        }
    };
    if let Some(ch) = walk_lms.try_cur() {
        cur = std::cmp::min(cur, ch);
    }
    loop {
        while walk_l.has(cur) {
            let top = match heap.pop()? {
                Some(top) if top.ch == cur => top,
                _ => {
                    return Ok(Pass::Reject(
                        Reject::new("induced order diverges from the candidate").in_bucket(cur),
                    ))
                }
            };
            let scanned = lcp_l_scan.expect("candidate LCP at L slots")?;
            fp_scanned[cur as usize] = params.mix(fp_scanned[cur as usize], scanned);
            fp_induced[cur as usize] = params.mix(fp_induced[cur as usize], top.val);
            rmq.update_right(cur, top.val);
            out.write(&top.val)?;
            let edge = edges_l.expect("L-suffix edges")?;
            if edge.pre_is(SuffixType::L) {
                let window = rmq.take(edge.pre_ch);
                let val = if placed[edge.pre_ch as usize] {
                    std::cmp::min(window.saturating_add(1), kcap)
                } else {
                    0
                };
                heap.push(Placed {
                    ch: edge.pre_ch,
                    rank,
                    val,
                })?;
                placed[edge.pre_ch as usize] = true;
            }
            last_rep_l = edge.rep;
            rank += 1;
            walk_l.advance();
        }
        while walk_lms.has(cur) {
            let seed = seeds.expect("LMS seeds")?;
            let interval_min = lcp_lms.expect("LCP_LMS")?;
            let visit = if walk_lms.last() == Some(cur) {
                // A previous LMS in this bucket: the inter-LMS minimum is the link.
                interval_min
            } else if walk_l.last() == Some(cur) {
                // First LMS after this bucket's L region: both suffixes lead with a run of
                // the bucket character, and the shorter run decides.
                std::cmp::min(last_rep_l, seed.rep)
            } else {
                0
            };
            fp_scanned[cur as usize] = params.mix(fp_scanned[cur as usize], visit);
            fp_induced[cur as usize] = params.mix(fp_induced[cur as usize], visit);
            rmq.update_right(cur, visit);
            // The predecessor of an LMS suffix is L-type by definition.
            let window = rmq.take(seed.pre_ch);
            let val = if placed[seed.pre_ch as usize] {
                std::cmp::min(window.saturating_add(1), kcap)
            } else {
                0
            };
            heap.push(Placed {
                ch: seed.pre_ch,
                rank,
                val,
            })?;
            placed[seed.pre_ch as usize] = true;
            rank += 1;
            walk_lms.advance();
        }
        cur = match (walk_l.try_cur(), walk_lms.try_cur()) {
            (Some(l), Some(m)) => std::cmp::min(l, m),
            (Some(l), None) => l,
            (None, Some(m)) => m,
            (None, None) => break,
        };
    }
    if !heap.is_empty() {
        return Ok(Pass::Reject(Reject::new(
            "induced placements left over after the rightward scan",
        )));
    }
    for ch in 0..256usize {
        if fp_scanned[ch] != fp_induced[ch] {
            return Ok(Pass::Reject(
                Reject::new("candidate LCP disagrees with the rightward induction")
                    .in_bucket(ch as u8),
            ));
        }
    }
    Ok(Pass::Done(out.finish()?))
}

/////////////////////////////////////////// leftward pass //////////////////////////////////////////

struct Pending {
    ch: u8,
    edge: Edge,
}

/// How a resolved link treats the pending suffix's predecessor.
enum Induce {
    /// Normal case: place the predecessor (when S-type) and reset its oracle window to the
    /// resolved link.
    Place,
    /// Run case: the predecessor is the very suffix being visited, consumed inline; only
    /// the oracle bookkeeping happens.
    RunLocal,
}

struct LeftState<W: IndexWidth> {
    params: crate::fingerprint::FpParams,
    kcap: u64,
    fp_scanned: [u64; 256],
    fp_induced: [u64; 256],
    rmq: Rmq,
    placed: [bool; 256],
    heap: ExtHeap<Placed, PlacedDescending>,
    cand_rev: RecordReverseReader<Packed<W>>,
}

impl<W: IndexWidth> LeftState<W> {
    /// Resolve the LCP slot belonging to `pending`: mix the candidate's value and the
    /// rule-derived value into the bucket's hashes, then do the placement and oracle work.
    fn resolve(&mut self, pending: Pending, link: u64, rank: u64, induce: Induce) -> Result<(), Error> {
        let scanned = self.cand_rev.expect("candidate LCP")?.0;
        let ch = pending.ch as usize;
        self.fp_scanned[ch] = self.params.mix(self.fp_scanned[ch], scanned);
        self.fp_induced[ch] = self.params.mix(self.fp_induced[ch], link);
        match induce {
            Induce::Place => {
                if pending.edge.pre_is(SuffixType::S) {
                    let window = self.rmq.get(pending.edge.pre_ch);
                    let val = if self.placed[pending.edge.pre_ch as usize] {
                        std::cmp::min(window.saturating_add(1), self.kcap)
                    } else {
                        0
                    };
                    self.heap.push(Placed {
                        ch: pending.edge.pre_ch,
                        rank,
                        val,
                    })?;
                    self.placed[pending.edge.pre_ch as usize] = true;
                    self.rmq.set(pending.edge.pre_ch, link);
                }
            }
            Induce::RunLocal => {
                self.rmq.set(pending.ch, link);
            }
        }
        self.rmq.update_left(pending.ch, link);
        Ok(())
    }
}

/// Induce the S-type suffixes right to left.  Every suffix is visited, so every LCP slot of
/// the candidate is resolved exactly once, in lockstep with a reverse read of the candidate
/// LCP; the induced side comes from the heap (in-bucket S links), the run and boundary
/// repetition rules, and the rightward pass's per-L-slot values.
pub(crate) fn check_s<W: IndexWidth>(
    ctx: &PassCtx,
    inputs: &InducedInputs,
    sorted_lcp_l: &ScratchVec<u64>,
) -> Result<Pass<()>, Error> {
    let mut state: LeftState<W> = LeftState {
        params: ctx.rint.params(),
        kcap: ctx.kcap(),
        fp_scanned: [0u64; 256],
        fp_induced: [0u64; 256],
        rmq: Rmq::default(),
        placed: [false; 256],
        heap: ExtHeap::new(&ctx.scratch, ctx.heap_budget, ctx.stream)?,
        cand_rev: RecordReverseReader::open(&ctx.lcp, ctx.stream)?,
    };
    let mut walk_s = BucketWalk::leftward(&inputs.buckets.s);
    let mut walk_l = BucketWalk::leftward(&inputs.buckets.l);
    let mut edges_s = inputs.edges_s.rev_reader(ctx.stream)?;
    let mut edges_l = PeekRev::new(inputs.edges_l.rev_reader(ctx.stream)?)?;
    let mut lcp_l_rev = sorted_lcp_l.rev_reader(ctx.stream)?;

    let mut rank = ctx.n;
    let mut pending: Option<Pending> = None;
    // The largest suffix starts the largest non-empty bucket, and it is L-type.
    let mut cur = match walk_l.try_cur() {
        Some(ch) => ch,
        None => {
            return Err(silt::logic_error("no L-type suffixes; the rightmost suffix is L").into())
        }
    };
    loop {
        // S region, heap-resident entries.
        while walk_s.has(cur) && state.heap.peek().map(|t| t.ch) == Some(cur) {
            let top = match state.heap.pop()? {
                Some(top) => top,
                None => return Err(silt::logic_error("heap emptied under a matching peek").into()),
            };
            let edge = edges_s.expect("S-suffix edges")?;
            if let Some(p) = pending.take() {
                state.resolve(p, top.val, rank, Induce::Place)?;
            }
            pending = Some(Pending { ch: cur, edge });
            rank -= 1;
            walk_s.advance();
        }
        // S region, suffixes induced directly by the suffix scanned just before them
        // (leading runs of the bucket character).
        while walk_s.has(cur) {
            let edge = edges_s.expect("S-suffix edges")?;
            if let Some(p) = pending.take() {
                let link = std::cmp::min(edge.rep, p.edge.rep);
                state.resolve(p, link, rank, Induce::RunLocal)?;
            }
            pending = Some(Pending { ch: cur, edge });
            rank -= 1;
            walk_s.advance();
        }
        // The leftmost S of the bucket borders the L region (or the next bucket).
        if let Some(p) = pending.take() {
            let link = if walk_l.has(cur) {
                match edges_l.peek() {
                    Some(l_edge) => std::cmp::min(p.edge.rep, l_edge.rep),
                    None => 0,
                }
            } else {
                0
            };
            state.resolve(p, link, rank, Induce::Place)?;
        }
        // L region: links come from the rightward pass's induced values.
        while walk_l.has(cur) {
            let induced = lcp_l_rev.expect("rightward pass output")?;
            let edge = match edges_l.next()? {
                Some(edge) => edge,
                None => return Err(silt::empty_stream("L-suffix edges").into()),
            };
            let scanned = state.cand_rev.expect("candidate LCP")?.0;
            state.fp_scanned[cur as usize] = state.params.mix(state.fp_scanned[cur as usize], scanned);
            state.fp_induced[cur as usize] = state.params.mix(state.fp_induced[cur as usize], induced);
            if edge.pre_is(SuffixType::S) {
                let window = state.rmq.get(edge.pre_ch);
                let val = if state.placed[edge.pre_ch as usize] {
                    std::cmp::min(window.saturating_add(1), state.kcap)
                } else {
                    0
                };
                state.heap.push(Placed {
                    ch: edge.pre_ch,
                    rank,
                    val,
                })?;
                state.placed[edge.pre_ch as usize] = true;
                state.rmq.set(edge.pre_ch, induced);
            }
            state.rmq.update_left(cur, induced);
            rank -= 1;
            walk_l.advance();
        }
        cur = match (walk_s.try_cur(), walk_l.try_cur()) {
            (Some(s), Some(l)) => std::cmp::max(s, l),
            (Some(s), None) => s,
            (None, Some(l)) => l,
            (None, None) => break,
        };
    }
    if !state.heap.is_empty() {
        return Ok(Pass::Reject(Reject::new(
            "induced placements left over after the leftward scan",
        )));
    }
    if state.cand_rev.remaining() != 0 {
        return Err(silt::logic_error("candidate LCP slots left unresolved").into());
    }
    for ch in 0..256usize {
        if state.fp_scanned[ch] != state.fp_induced[ch] {
            return Ok(Pass::Reject(
                Reject::new("candidate LCP disagrees with the leftward induction")
                    .in_bucket(ch as u8),
            ));
        }
    }
    Ok(Pass::Done(()))
}

////////////////////////////////////////////// PeekRev /////////////////////////////////////////////

/// A one-record lookahead over a reverse reader; the boundary rule peeks at the rightmost
/// L-type edge of a bucket before the L region is scanned.
struct PeekRev<T: silt::Record> {
    inner: RecordReverseReader<T>,
    head: Option<T>,
}

impl<T: silt::Record> PeekRev<T> {
    fn new(mut inner: RecordReverseReader<T>) -> Result<Self, Error> {
        let head = inner.read()?;
        Ok(Self { inner, head })
    }

    fn peek(&self) -> Option<&T> {
        self.head.as_ref()
    }

    fn next(&mut self) -> Result<Option<T>, Error> {
        let head = self.head;
        self.head = self.inner.read()?;
        Ok(head)
    }
}
