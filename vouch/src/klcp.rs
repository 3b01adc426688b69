//! K-order LCP construction.
//!
//! Given a trusted suffix array, the LCP value of each adjacent pair, clamped at K, is found
//! by fingerprint probing: strides K, K/2, …, 1 are tried in order, and a pair's lower bound
//! advances by a stride whenever the two windows of that length fingerprint equal.  Every
//! round is one sorter pass over the probe positions plus one scan of the text, so the whole
//! construction costs O(log K) sorts.  Probes past the end of the text carry the reserved
//! NO_FINGERPRINT sentinel and never match anything.

use silt::{RecordReader, RecordWriter, ScratchVec, SortedStream, Sorter};

use crate::fingerprint::FpStream;
use crate::tuples::ByFirst;
use crate::{Error, IndexWidth, Packed, PassCtx};

///////////////////////////////////////////// PairState ////////////////////////////////////////////

/// The rolling state of one adjacent pair: the two suffix starts, the prefix fingerprints
/// just before them, the confirmed common-prefix length, and whether the pair is settled.
#[derive(Clone, Copy, Debug, Default)]
struct PairState {
    id: u64,
    p1: u64,
    p2: u64,
    fp1: u64,
    fp2: u64,
    lo: u64,
    done: u8,
}

impl silt::Record for PairState {
    const BYTES: usize = 49;

    fn store(&self, buf: &mut [u8]) {
        buf[..8].copy_from_slice(&self.id.to_le_bytes());
        buf[8..16].copy_from_slice(&self.p1.to_le_bytes());
        buf[16..24].copy_from_slice(&self.p2.to_le_bytes());
        buf[24..32].copy_from_slice(&self.fp1.to_le_bytes());
        buf[32..40].copy_from_slice(&self.fp2.to_le_bytes());
        buf[40..48].copy_from_slice(&self.lo.to_le_bytes());
        buf[48] = self.done;
    }

    fn load(buf: &[u8]) -> Self {
        Self {
            id: u64::from_le_bytes(buf[..8].try_into().unwrap()),
            p1: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            p2: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
            fp1: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
            fp2: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
            lo: u64::from_le_bytes(buf[40..48].try_into().unwrap()),
            done: buf[48],
        }
    }
}

//////////////////////////////////////////// probe fetch ///////////////////////////////////////////

/// Stream the text once, answering each (position, tag) probe with the prefix fingerprint
/// just before the position.  Position n answers with the full-text fingerprint; positions
/// beyond n answer with the sentinel.
fn fetch_probes(
    ctx: &PassCtx,
    mut wanted: SortedStream<(u64, u64), ByFirst>,
) -> Result<SortedStream<(u64, u64), ByFirst>, Error> {
    let params = ctx.rint.params();
    let mut out: Sorter<(u64, u64), ByFirst> = Sorter::new(&ctx.scratch, ctx.sorter_opts())?;
    let mut text = FpStream::open(&ctx.text, params, ctx.stream)?;
    while let Some(sample) = text.next()? {
        while wanted.peek().map(|t| t.0) == Some(sample.pos) {
            let (_, tag) = wanted.expect("probes")?;
            out.push((tag, sample.fp_before))?;
        }
    }
    while let Some((pos, tag)) = wanted.next()? {
        let answer = if pos == ctx.n {
            text.fp()
        } else {
            params.no_fingerprint()
        };
        out.push((tag, answer))?;
    }
    Ok(out.seal()?)
}

//////////////////////////////////////////// construct /////////////////////////////////////////////

pub(crate) fn construct<W: IndexWidth>(ctx: &PassCtx, k: u64, out: &std::path::Path) -> Result<(), Error> {
    // Seed the pair states from the suffix array and collect the start-probe positions.
    let mut probes: Sorter<(u64, u64), ByFirst> = Sorter::new(&ctx.scratch, ctx.sorter_opts())?;
    let mut seed = ScratchVec::<PairState>::writer(&ctx.scratch, "klcp_pairs", ctx.stream)?;
    let mut sa_reader: RecordReader<Packed<W>> = RecordReader::open(&ctx.sa, ctx.stream)?;
    let mut prev_sa = sa_reader.expect("suffix array")?.0;
    for id in 1..ctx.n {
        let sa = sa_reader.expect("suffix array")?.0;
        seed.write(&PairState {
            id,
            p1: prev_sa,
            p2: sa,
            fp1: 0,
            fp2: 0,
            lo: 0,
            done: 0,
        })?;
        probes.push((prev_sa, id * 2))?;
        probes.push((sa, id * 2 + 1))?;
        prev_sa = sa;
    }
    let mut pairs = seed.finish()?;

    // Fill in the fingerprints before each suffix start.
    let mut answers = fetch_probes(ctx, probes.seal()?)?;
    let mut filled = ScratchVec::<PairState>::writer(&ctx.scratch, "klcp_pairs", ctx.stream)?;
    let mut reader = pairs.reader(ctx.stream)?;
    while let Some(mut pair) = reader.read()? {
        let (_, fp1) = answers.expect("start fingerprints")?;
        let (_, fp2) = answers.expect("start fingerprints")?;
        pair.fp1 = fp1;
        pair.fp2 = fp2;
        filled.write(&pair)?;
    }
    pairs = filled.finish()?;

    // Halving rounds.
    let mut stride = k;
    while stride >= 1 {
        pairs = round::<W>(ctx, k, stride, pairs)?;
        if stride == 1 {
            break;
        }
        stride /= 2;
    }

    // Emit LCP[0] = 0 and the per-pair results in rank order.
    let mut writer: RecordWriter<Packed<W>> = RecordWriter::create(out, ctx.stream)?;
    writer.write(&Packed::new(0))?;
    let mut reader = pairs.reader(ctx.stream)?;
    while let Some(pair) = reader.read()? {
        writer.write(&Packed::new(pair.lo))?;
    }
    writer.finish()?;
    Ok(())
}

/// One probing round: ask for the window fingerprints that would extend each active pair by
/// `stride`, and advance the pairs whose windows agree.
fn round<W: IndexWidth>(
    ctx: &PassCtx,
    k: u64,
    stride: u64,
    pairs: ScratchVec<PairState>,
) -> Result<ScratchVec<PairState>, Error> {
    let mut probes: Sorter<(u64, u64), ByFirst> = Sorter::new(&ctx.scratch, ctx.sorter_opts())?;
    let mut reader = pairs.reader(ctx.stream)?;
    while let Some(pair) = reader.read()? {
        if pair.done == 0 && pair.lo + stride <= k {
            probes.push((pair.p1 + pair.lo + stride, pair.id * 2))?;
            probes.push((pair.p2 + pair.lo + stride, pair.id * 2 + 1))?;
        }
    }
    let mut answers = fetch_probes(ctx, probes.seal()?)?;

    let sentinel = ctx.rint.params().no_fingerprint();
    let mut next = ScratchVec::<PairState>::writer(&ctx.scratch, "klcp_pairs", ctx.stream)?;
    let mut reader = pairs.reader(ctx.stream)?;
    while let Some(mut pair) = reader.read()? {
        if pair.done == 0 && pair.lo + stride <= k {
            let (_, hi1) = answers.expect("window fingerprints")?;
            let (_, hi2) = answers.expect("window fingerprints")?;
            if hi1 != sentinel && hi2 != sentinel {
                let len = pair.lo + stride;
                let w1 = ctx.rint.interval(hi1, pair.fp1, len);
                let w2 = ctx.rint.interval(hi2, pair.fp2, len);
                if w1 == w2 {
                    pair.lo = len;
                    if pair.lo == k {
                        pair.done = 1;
                    }
                }
            }
        }
        next.write(&pair)?;
    }
    next.finish()
        .map_err(Error::from)
}
