//! The direct method: every adjacent pair of suffix-array entries is checked on its own.
//! For rank i with claimed prefix length ℓ = LCP[i], the windows of length ℓ at SA[i−1] and
//! SA[i] must fingerprint equal and the characters just past them must differ.  Three
//! sorter pipelines materialize the fingerprints at SA[i], SA[i]+LCP[i], and
//! SA[i−1]+LCP[i] in one text scan each; a final merge on rank runs the comparisons.

use silt::{RecordReader, SortedStream, Sorter};

use crate::classify::SENTINEL_CH;
use crate::fingerprint::FpStream;
use crate::tuples::{ByFirst, RankFpCh, RankFpChByRank};
use crate::{Error, IndexWidth, Packed, PassCtx, Reject, Verdict};

/// Fingerprints just before each suffix start, keyed by rank.  The ascending position
/// stream doubles as the permutation check: strictly increasing positions below n are
/// exactly 0..n.
fn fetch_starts(
    ctx: &PassCtx,
    mut wanted: SortedStream<(u64, u64), ByFirst>,
) -> Result<Result<SortedStream<(u64, u64), ByFirst>, Reject>, Error> {
    let mut out: Sorter<(u64, u64), ByFirst> = Sorter::new(&ctx.scratch, ctx.sorter_opts())?;
    let mut text = FpStream::open(&ctx.text, ctx.rint.params(), ctx.stream)?;
    while let Some(sample) = text.next()? {
        let mut matched = false;
        while wanted.peek().map(|t| t.0) == Some(sample.pos) {
            if matched {
                return Ok(Err(Reject::new("suffix array is not a permutation")));
            }
            matched = true;
            let (_, rank) = wanted.expect("suffix starts")?;
            out.push((rank, sample.fp_before))?;
        }
        if !matched {
            return Ok(Err(Reject::new("suffix array is not a permutation")));
        }
    }
    Ok(Ok(out.seal()?))
}

/// Fingerprint and character at each requested prefix end; positions may equal n, where
/// the character is the sentinel.
fn fetch_ends(
    ctx: &PassCtx,
    mut wanted: SortedStream<(u64, u64), ByFirst>,
) -> Result<SortedStream<RankFpCh, RankFpChByRank>, Error> {
    let mut out: Sorter<RankFpCh, RankFpChByRank> = Sorter::new(&ctx.scratch, ctx.sorter_opts())?;
    let mut text = FpStream::open(&ctx.text, ctx.rint.params(), ctx.stream)?;
    while let Some(sample) = text.next()? {
        while wanted.peek().map(|t| t.0) == Some(sample.pos) {
            let (_, rank) = wanted.expect("prefix ends")?;
            out.push(RankFpCh {
                rank,
                fp: sample.fp_before,
                ch: sample.byte as u16,
            })?;
        }
    }
    while let Some((pos, rank)) = wanted.next()? {
        if pos != ctx.n {
            return Err(silt::logic_error("prefix end past the text").into());
        }
        out.push(RankFpCh {
            rank,
            fp: text.fp(),
            ch: SENTINEL_CH,
        })?;
    }
    Ok(out.seal()?)
}

pub(crate) fn check<W: IndexWidth>(ctx: &PassCtx) -> Result<Verdict, Error> {
    // Pipeline 1: (SA[i], i), checked below for being a permutation.
    let mut starts: Sorter<(u64, u64), ByFirst> = Sorter::new(&ctx.scratch, ctx.sorter_opts())?;
    let mut sa_reader: RecordReader<Packed<W>> = RecordReader::open(&ctx.sa, ctx.stream)?;
    for rank in 0..ctx.n {
        let sa = sa_reader.expect("suffix array")?.0;
        if sa >= ctx.n {
            return Ok(Verdict::Reject(
                Reject::new("suffix array entry out of range").at_index(rank),
            ));
        }
        starts.push((sa, rank))?;
    }
    let mut b1 = match fetch_starts(ctx, starts.seal()?)? {
        Ok(stream) => stream,
        Err(reject) => return Ok(Verdict::Reject(reject)),
    };

    // Pipelines 2 and 3: prefix ends for the current and the preceding suffix of each rank.
    let mut cur_ends: Sorter<(u64, u64), ByFirst> = Sorter::new(&ctx.scratch, ctx.sorter_opts())?;
    let mut next_ends: Sorter<(u64, u64), ByFirst> = Sorter::new(&ctx.scratch, ctx.sorter_opts())?;
    let mut sa_reader: RecordReader<Packed<W>> = RecordReader::open(&ctx.sa, ctx.stream)?;
    let mut lcp_reader: RecordReader<Packed<W>> = RecordReader::open(&ctx.lcp, ctx.stream)?;
    let mut prev_sa = 0u64;
    for rank in 0..ctx.n {
        let sa = sa_reader.expect("suffix array")?.0;
        let lcp = lcp_reader.expect("LCP array")?.0;
        if rank == 0 {
            if lcp != 0 {
                return Ok(Verdict::Reject(Reject::new("LCP[0] must be zero").at_index(0)));
            }
        } else {
            if sa + lcp > ctx.n || prev_sa + lcp > ctx.n {
                return Ok(Verdict::Reject(
                    Reject::new("LCP extends past the end of the text").at_index(rank),
                ));
            }
            cur_ends.push((sa + lcp, rank))?;
            next_ends.push((prev_sa + lcp, rank))?;
        }
        prev_sa = sa;
    }
    let mut c_cur = fetch_ends(ctx, cur_ends.seal()?)?;
    let mut c_prev = fetch_ends(ctx, next_ends.seal()?)?;

    // Merge on rank and compare.
    let mut lcp_reader: RecordReader<Packed<W>> = RecordReader::open(&ctx.lcp, ctx.stream)?;
    let _ = lcp_reader.expect("LCP array")?;
    let mut b_prev = b1.expect("start fingerprints")?;
    for rank in 1..ctx.n {
        let lcp = lcp_reader.expect("LCP array")?.0;
        let b_cur = b1.expect("start fingerprints")?;
        let cur = c_cur.expect("prefix-end fingerprints")?;
        let prev = c_prev.expect("prefix-end fingerprints")?;
        let left = ctx.rint.interval(prev.fp, b_prev.1, lcp);
        let right = ctx.rint.interval(cur.fp, b_cur.1, lcp);
        let chars_differ = prev.ch != cur.ch;
        let waived = ctx.k == Some(lcp);
        if left != right || !(chars_differ || waived) {
            return Ok(Verdict::Reject(
                Reject::new("adjacent suffixes contradict the claimed LCP").at_index(rank),
            ));
        }
        b_prev = b_cur;
    }
    Ok(Verdict::Accept)
}
