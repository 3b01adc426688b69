//! The LMS verifier.
//!
//! From the candidate arrays it materializes SA_LMS (the LMS positions in suffix-array
//! order) and LCP_LMS (the running minimum of candidate LCP values between consecutive LMS
//! entries), then checks every adjacent LMS pair with a range fingerprint over their claimed
//! common prefix and a character test just past it.  Acceptance here seeds the induced
//! verifier; any single failure rejects the candidate outright.

use silt::{RecordReader, ScratchVec, Sorter};

use crate::classify::{SuffixType, TypeScan, SENTINEL_CH};
use crate::fingerprint::FpStream;
use crate::tuples::{ByFirst, ByFirstDesc, RankFpCh, RankFpChByRank};
use crate::{Error, IndexWidth, Packed, Pass, PassCtx, Reject};

///////////////////////////////////////////// LmsArrays ////////////////////////////////////////////

pub(crate) struct LmsArrays {
    /// LMS text positions, in suffix-array order.
    pub sa_lms: ScratchVec<u64>,
    /// lms_n + 1 entries; the extra trailing zero pairs the final LMS with an empty
    /// interval.
    pub lcp_lms: ScratchVec<u64>,
    pub lms_n: u64,
}

///////////////////////////////////////////// retrieval ////////////////////////////////////////////

/// Sort (SA[i], i) descending, replay it against the reverse classification of the text,
/// and keep the LMS entries; then fold the candidate LCP into per-interval minima.  The
/// descending sort doubles as the permutation check: each text position must pair with
/// exactly one suffix-array entry.
pub(crate) fn retrieve<W: IndexWidth>(ctx: &PassCtx) -> Result<Pass<LmsArrays>, Error> {
    // (SA[i], i) by position, descending, to walk alongside the reverse text scan.
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

    // Reverse scan; emit (rank, pos) for each LMS suffix.
    let mut by_rank: Sorter<(u64, u64), ByFirst> = Sorter::new(&ctx.scratch, ctx.sorter_opts())?;
    let mut scan = TypeScan::new(&ctx.text, ctx.kcap(), ctx.stream)?;
    while let Some(item) = scan.next()? {
        let (pos, rank) = by_pos.expect("suffix array pairs")?;
        if pos != item.pos {
            return Ok(Pass::Reject(Reject::new("suffix array is not a permutation")));
        }
        if item.ty == SuffixType::Lms {
            by_rank.push((rank, pos))?;
        }
    }
    let mut by_rank = by_rank.seal()?;
    let lms_n = by_rank.len();

    // Fold candidate LCP values into the inter-LMS minima.
    let mut lcp_reader: RecordReader<Packed<W>> = RecordReader::open(&ctx.lcp, ctx.stream)?;
    let mut sa_lms = ScratchVec::<u64>::writer(&ctx.scratch, "sa_lms", ctx.stream)?;
    let mut lcp_lms = ScratchVec::<u64>::writer(&ctx.scratch, "lcp_lms", ctx.stream)?;
    let mut min_lcp = u64::MAX;
    for rank in 0..ctx.n {
        let lcp = lcp_reader.expect("LCP array")?.0;
        if rank == 0 && lcp != 0 {
            return Ok(Pass::Reject(Reject::new("LCP[0] must be zero").at_index(0)));
        }
        min_lcp = std::cmp::min(min_lcp, lcp);
        if by_rank.peek().map(|t| t.0) == Some(rank) {
            let (_, pos) = by_rank.expect("LMS ranks")?;
            lcp_lms.write(&min_lcp)?;
            sa_lms.write(&pos)?;
            min_lcp = u64::MAX;
        }
    }
    lcp_lms.write(&0)?;
    Ok(Pass::Done(LmsArrays {
        sa_lms: sa_lms.finish()?,
        lcp_lms: lcp_lms.finish()?,
        lms_n,
    }))
}

//////////////////////////////////////// fingerprint fetches ///////////////////////////////////////

/// Stream the text once, harvesting the prefix fingerprint just before each requested
/// position, keyed back by rank.  Positions must be < n and are unique.
fn fetch_fp(
    ctx: &PassCtx,
    mut wanted: silt::SortedStream<(u64, u64), ByFirst>,
) -> Result<silt::SortedStream<(u64, u64), ByFirst>, Error> {
    let mut out: Sorter<(u64, u64), ByFirst> = Sorter::new(&ctx.scratch, ctx.sorter_opts())?;
    let mut text = FpStream::open(&ctx.text, ctx.rint.params(), ctx.stream)?;
    while let Some(sample) = text.next()? {
        while wanted.peek().map(|t| t.0) == Some(sample.pos) {
            let (_, rank) = wanted.expect("positions")?;
            out.push((rank, sample.fp_before))?;
        }
    }
    if wanted.peek().is_some() {
        return Err(silt::logic_error("fingerprint position past the text").into());
    }
    Ok(out.seal()?)
}

/// Like [fetch_fp], but positions may equal n; alongside the fingerprint the character at
/// the position is captured (the sentinel past the end).
fn fetch_fp_ch(
    ctx: &PassCtx,
    mut wanted: silt::SortedStream<(u64, u64), ByFirst>,
) -> Result<silt::SortedStream<RankFpCh, RankFpChByRank>, Error> {
    let mut out: Sorter<RankFpCh, RankFpChByRank> = Sorter::new(&ctx.scratch, ctx.sorter_opts())?;
    let mut text = FpStream::open(&ctx.text, ctx.rint.params(), ctx.stream)?;
    while let Some(sample) = text.next()? {
        while wanted.peek().map(|t| t.0) == Some(sample.pos) {
            let (_, rank) = wanted.expect("positions")?;
            out.push(RankFpCh {
                rank,
                fp: sample.fp_before,
                ch: sample.byte as u16,
            })?;
        }
    }
    while let Some((pos, rank)) = wanted.next()? {
        if pos != ctx.n {
            return Err(silt::logic_error("fingerprint position past the text").into());
        }
        out.push(RankFpCh {
            rank,
            fp: text.fp(),
            ch: SENTINEL_CH,
        })?;
    }
    Ok(out.seal()?)
}

///////////////////////////////////////////// the check ////////////////////////////////////////////

/// Verify LCP_LMS against the text: for consecutive LMS entries p, q with claimed common
/// prefix ℓ, the windows T[p..p+ℓ) and T[q..q+ℓ) must fingerprint equal and the characters
/// at p+ℓ and q+ℓ must differ (waived at ℓ = K in K-order mode, where the prefix is
/// truncated rather than maximal).
pub(crate) fn check<W: IndexWidth>(ctx: &PassCtx, arrays: &LmsArrays) -> Result<Pass<()>, Error> {
    if arrays.lms_n < 2 {
        return Ok(Pass::Done(()));
    }

    // fp just before each LMS position.
    let mut at_pos: Sorter<(u64, u64), ByFirst> = Sorter::new(&ctx.scratch, ctx.sorter_opts())?;
    let mut sa_lms = arrays.sa_lms.reader(ctx.stream)?;
    for rank in 0..arrays.lms_n {
        let pos = sa_lms.expect("SA_LMS")?;
        at_pos.push((pos, rank))?;
    }
    let b1 = fetch_fp(ctx, at_pos.seal()?)?;

    // fp and character at position + LCP_LMS[rank].
    let mut at_end: Sorter<(u64, u64), ByFirst> = Sorter::new(&ctx.scratch, ctx.sorter_opts())?;
    let mut sa_lms = arrays.sa_lms.reader(ctx.stream)?;
    let mut lcp_lms = arrays.lcp_lms.reader(ctx.stream)?;
    for rank in 0..arrays.lms_n {
        let pos = sa_lms.expect("SA_LMS")?;
        let lcp = lcp_lms.expect("LCP_LMS")?;
        if pos + lcp > ctx.n {
            return Ok(Pass::Reject(
                Reject::new("LCP extends past the end of the text").at_index(rank),
            ));
        }
        at_end.push((pos + lcp, rank))?;
    }
    let mut c_cur = fetch_fp_ch(ctx, at_end.seal()?)?;

    // fp and character at position + LCP_LMS[rank + 1].
    let mut at_next: Sorter<(u64, u64), ByFirst> = Sorter::new(&ctx.scratch, ctx.sorter_opts())?;
    let mut sa_lms = arrays.sa_lms.reader(ctx.stream)?;
    let mut lcp_lms = arrays.lcp_lms.reader(ctx.stream)?;
    let _ = lcp_lms.expect("LCP_LMS")?;
    for rank in 0..arrays.lms_n {
        let pos = sa_lms.expect("SA_LMS")?;
        let lcp = lcp_lms.expect("LCP_LMS")?;
        if pos + lcp > ctx.n {
            return Ok(Pass::Reject(
                Reject::new("LCP extends past the end of the text").at_index(rank + 1),
            ));
        }
        at_next.push((pos + lcp, rank))?;
    }
    let mut c_next = fetch_fp_ch(ctx, at_next.seal()?)?;

    // Merge on rank and compare adjacent pairs.
    let mut b1 = b1;
    let mut lcp_lms = arrays.lcp_lms.reader(ctx.stream)?;
    let _ = lcp_lms.expect("LCP_LMS")?;
    let mut prev_b1 = b1.expect("LMS fingerprints")?;
    let mut prev_next = c_next.expect("LMS end fingerprints")?;
    let _ = c_cur.expect("LMS end fingerprints")?;
    for rank in 1..arrays.lms_n {
        let lcp = lcp_lms.expect("LCP_LMS")?;
        let cur_b1 = b1.expect("LMS fingerprints")?;
        let cur = c_cur.expect("LMS end fingerprints")?;
        let left = ctx.rint.interval(prev_next.fp, prev_b1.1, lcp);
        let right = ctx.rint.interval(cur.fp, cur_b1.1, lcp);
        let chars_differ = prev_next.ch != cur.ch;
        let waived = ctx.k == Some(lcp);
        if left != right || !(chars_differ || waived) {
            return Ok(Pass::Reject(
                Reject::new("LMS fingerprint comparison failed").at_index(rank),
            ));
        }
        prev_b1 = cur_b1;
        prev_next = c_next.expect("LMS end fingerprints")?;
    }
    Ok(Pass::Done(()))
}
