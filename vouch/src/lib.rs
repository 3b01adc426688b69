//! Vouch decides whether candidate suffix and LCP arrays are a valid, mutually consistent
//! pair for a byte text, with one-sided error O(n/P) from Karp–Rabin fingerprint collisions.
//! The working set may exceed RAM: every pass runs over silt's disk-backed sorters, heaps,
//! and streams.  Two strategies are provided — a direct method over adjacent suffix-array
//! entries and an induced-order method that verifies the LMS suffixes first and induces the
//! rest — plus a builder that constructs a K-order LCP array from a trusted suffix array.

use std::path::{Path, PathBuf};

use biometrics::{Collector, Counter};

use indicio::{clue, INFO};

use silt::{ScratchDir, StreamOptions};

use utilz::stopwatch::Stopwatch;

use zerror::{iotoz, Z};
use zerror_core::ErrorCore;

pub mod classify;
pub mod direct;
pub mod fingerprint;
pub mod induced;
pub mod klcp;
pub mod lms;
pub mod tuples;

use fingerprint::{FpParams, RInterval, FP_EM128};

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static VALIDATE_RUNS: Counter = Counter::new("vouch.validate");
static VALIDATE_ACCEPT: Counter = Counter::new("vouch.validate.accept");
static VALIDATE_REJECT: Counter = Counter::new("vouch.validate.reject");
static CONSTRUCT_RUNS: Counter = Counter::new("vouch.construct");

pub fn register_biometrics(collector: &Collector) {
    collector.register_counter(&VALIDATE_RUNS);
    collector.register_counter(&VALIDATE_ACCEPT);
    collector.register_counter(&VALIDATE_REJECT);
    collector.register_counter(&CONSTRUCT_RUNS);
    silt::register_biometrics(collector);
}

///////////////////////////////////////////// indicio //////////////////////////////////////////////

pub static COLLECTOR: indicio::Collector = indicio::Collector::new();

/////////////////////////////////////////////// Error //////////////////////////////////////////////

#[derive(Clone, Debug)]
pub enum Error {
    Success {
        core: ErrorCore,
    },
    MalformedInput {
        core: ErrorCore,
        context: String,
    },
    BadFingerprintParams {
        core: ErrorCore,
        p: u64,
        r: u64,
    },
    ScratchFull {
        core: ErrorCore,
        cap: u64,
        requested: u64,
    },
    MemoryBudget {
        core: ErrorCore,
        minimum: usize,
        budget: usize,
    },
    SystemError {
        core: ErrorCore,
        what: String,
    },
    Corruption {
        core: ErrorCore,
        context: String,
    },
    LogicError {
        core: ErrorCore,
        context: String,
    },
    EmptyStream {
        core: ErrorCore,
        context: String,
    },
}

impl Error {
    fn core(&self) -> &ErrorCore {
        match self {
            Error::Success { core, .. } => core,
            Error::MalformedInput { core, .. } => core,
            Error::BadFingerprintParams { core, .. } => core,
            Error::ScratchFull { core, .. } => core,
            Error::MemoryBudget { core, .. } => core,
            Error::SystemError { core, .. } => core,
            Error::Corruption { core, .. } => core,
            Error::LogicError { core, .. } => core,
            Error::EmptyStream { core, .. } => core,
        }
    }

    fn core_mut(&mut self) -> &mut ErrorCore {
        match self {
            Error::Success { core, .. } => core,
            Error::MalformedInput { core, .. } => core,
            Error::BadFingerprintParams { core, .. } => core,
            Error::ScratchFull { core, .. } => core,
            Error::MemoryBudget { core, .. } => core,
            Error::SystemError { core, .. } => core,
            Error::Corruption { core, .. } => core,
            Error::LogicError { core, .. } => core,
            Error::EmptyStream { core, .. } => core,
        }
    }

    /// The process exit code for this error under the CLI contract: 2 for malformed input,
    /// 3 for scratch exhaustion, 4 for everything else fatal.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Success { .. } => 0,
            Error::MalformedInput { .. } => 2,
            Error::BadFingerprintParams { .. } => 2,
            Error::ScratchFull { .. } => 3,
            Error::MemoryBudget { .. } => 3,
            Error::SystemError { .. } => 4,
            Error::Corruption { .. } => 4,
            Error::LogicError { .. } => 4,
            Error::EmptyStream { .. } => 4,
        }
    }
}

impl Default for Error {
    fn default() -> Self {
        Error::Success {
            core: ErrorCore::default(),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Error::Success { core: _ } => fmt.debug_struct("Success").finish(),
            Error::MalformedInput { core: _, context } => fmt
                .debug_struct("MalformedInput")
                .field("context", context)
                .finish(),
            Error::BadFingerprintParams { core: _, p, r } => fmt
                .debug_struct("BadFingerprintParams")
                .field("p", p)
                .field("r", r)
                .finish(),
            Error::ScratchFull { core: _, cap, requested } => fmt
                .debug_struct("ScratchFull")
                .field("cap", cap)
                .field("requested", requested)
                .finish(),
            Error::MemoryBudget { core: _, minimum, budget } => fmt
                .debug_struct("MemoryBudget")
                .field("minimum", minimum)
                .field("budget", budget)
                .finish(),
            Error::SystemError { core: _, what } => fmt
                .debug_struct("SystemError")
                .field("what", what)
                .finish(),
            Error::Corruption { core: _, context } => fmt
                .debug_struct("Corruption")
                .field("context", context)
                .finish(),
            Error::LogicError { core: _, context } => fmt
                .debug_struct("LogicError")
                .field("context", context)
                .finish(),
            Error::EmptyStream { core: _, context } => fmt
                .debug_struct("EmptyStream")
                .field("context", context)
                .finish(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(what: std::io::Error) -> Error {
        Error::SystemError {
            core: ErrorCore::default(),
            what: format!("{:?}", what),
        }
    }
}

impl From<silt::Error> for Error {
    fn from(what: silt::Error) -> Error {
        match what {
            silt::Error::Success { core } => Error::Success { core },
            silt::Error::ScratchFull { core, cap, requested } => {
                Error::ScratchFull { core, cap, requested }
            }
            silt::Error::MemoryBudget { core, minimum, budget } => {
                Error::MemoryBudget { core, minimum, budget }
            }
            silt::Error::SystemError { core, what } => Error::SystemError { core, what },
            silt::Error::Corruption { core, context } => Error::Corruption { core, context },
            silt::Error::LogicError { core, context } => Error::LogicError { core, context },
            silt::Error::EmptyStream { core, context } => Error::EmptyStream { core, context },
        }
    }
}

impl Z for Error {
    type Error = Self;

    fn long_form(&self) -> String {
        format!("{}", self) + "\n" + &self.core().long_form()
    }

    fn with_info<X: std::fmt::Debug>(mut self, name: &str, value: X) -> Self::Error {
        self.core_mut().set_info(name, value);
        self
    }

    fn with_lazy_info<F: FnOnce() -> String>(mut self, name: &str, value: F) -> Self::Error {
        self.core_mut().set_lazy_info(name, value);
        self
    }
}

iotoz! {Error}

fn malformed(context: String) -> Error {
    Error::MalformedInput {
        core: ErrorCore::default(),
        context,
    }
}

////////////////////////////////////////////// Verdict /////////////////////////////////////////////

/// Why a candidate was rejected.  A reject is a normal outcome, not an error.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reject {
    pub what: String,
    pub index: Option<u64>,
    pub bucket: Option<u8>,
}

impl Reject {
    pub fn new(what: &str) -> Self {
        Self {
            what: what.to_string(),
            index: None,
            bucket: None,
        }
    }

    pub fn at_index(mut self, index: u64) -> Self {
        self.index = Some(index);
        self
    }

    pub fn in_bucket(mut self, bucket: u8) -> Self {
        self.bucket = Some(bucket);
        self
    }
}

impl std::fmt::Display for Reject {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(fmt, "{}", self.what)?;
        if let Some(index) = self.index {
            write!(fmt, " at index {}", index)?;
        }
        if let Some(bucket) = self.bucket {
            write!(fmt, " in bucket {:#04x}", bucket)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Verdict {
    Accept,
    Reject(Reject),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept)
    }
}

/// Internal pass result: the pass either produced its value or rejected the candidate.
pub(crate) enum Pass<T> {
    Done(T),
    Reject(Reject),
}

//////////////////////////////////////////// IndexWidth ////////////////////////////////////////////

/// One on-disk integer width for SA/LCP entries.  The width is picked once at pipeline
/// entry; inside a pass it is a type parameter.
pub trait IndexWidth: Copy + Send + 'static {
    const BYTES: usize;
    const MAX: u64;

    fn load(buf: &[u8]) -> u64;
    fn store(v: u64, buf: &mut [u8]);
}

/// 32-bit little-endian entries.
#[derive(Clone, Copy, Debug, Default)]
pub struct W32;

impl IndexWidth for W32 {
    const BYTES: usize = 4;
    const MAX: u64 = u32::MAX as u64;

    fn load(buf: &[u8]) -> u64 {
        u32::from_le_bytes(buf[..4].try_into().unwrap()) as u64
    }

    fn store(v: u64, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&(v as u32).to_le_bytes());
    }
}

/// 40-bit entries: a low u32 and a high byte, little-endian overall.
#[derive(Clone, Copy, Debug, Default)]
pub struct W40;

impl IndexWidth for W40 {
    const BYTES: usize = 5;
    const MAX: u64 = (1u64 << 40) - 1;

    fn load(buf: &[u8]) -> u64 {
        let low = u32::from_le_bytes(buf[..4].try_into().unwrap()) as u64;
        let high = buf[4] as u64;
        low | (high << 32)
    }

    fn store(v: u64, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&((v & 0xffff_ffff) as u32).to_le_bytes());
        buf[4] = (v >> 32) as u8;
    }
}

/// A width-encoded integer as a silt record.
#[derive(Clone, Copy, Debug)]
pub struct Packed<W: IndexWidth>(pub u64, std::marker::PhantomData<W>);

impl<W: IndexWidth> Packed<W> {
    pub fn new(v: u64) -> Self {
        Self(v, std::marker::PhantomData)
    }
}

impl<W: IndexWidth> silt::Record for Packed<W> {
    const BYTES: usize = W::BYTES;

    fn store(&self, buf: &mut [u8]) {
        W::store(self.0, buf);
    }

    fn load(buf: &[u8]) -> Self {
        Self(W::load(buf), std::marker::PhantomData)
    }
}

/// The runtime tag for [IndexWidth].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SaWidth {
    #[default]
    W32,
    W40,
}

impl SaWidth {
    pub fn bytes(&self) -> usize {
        match self {
            SaWidth::W32 => W32::BYTES,
            SaWidth::W40 => W40::BYTES,
        }
    }

    pub fn max(&self) -> u64 {
        match self {
            SaWidth::W32 => W32::MAX,
            SaWidth::W40 => W40::MAX,
        }
    }
}

impl std::str::FromStr for SaWidth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "32" => Ok(SaWidth::W32),
            "40" => Ok(SaWidth::W40),
            _ => Err(format!("unknown width {:?}; expected 32 or 40", s)),
        }
    }
}

impl std::fmt::Display for SaWidth {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            SaWidth::W32 => write!(fmt, "32"),
            SaWidth::W40 => write!(fmt, "40"),
        }
    }
}

////////////////////////////////////////////// Method //////////////////////////////////////////////

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Method {
    Direct,
    #[default]
    Induced,
}

impl std::str::FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "direct" => Ok(Method::Direct),
            "induced" => Ok(Method::Induced),
            _ => Err(format!("unknown method {:?}; expected direct or induced", s)),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Method::Direct => write!(fmt, "direct"),
            Method::Induced => write!(fmt, "induced"),
        }
    }
}

/////////////////////////////////////////// VouchOptions ///////////////////////////////////////////

#[derive(Clone, Debug)]
pub struct VouchOptions {
    /// Total RAM budget, partitioned up-front across the sorters and heaps of each pass.
    pub mem: usize,
    /// Where scratch state lives.  Every scratch file is deleted on every exit path.
    pub scratch_dir: PathBuf,
    /// Hard cap on scratch bytes; exceeding it is fatal.
    pub scratch_cap: u64,
    /// On-disk integer width of SA and LCP entries.
    pub sa_width: SaWidth,
    /// Verify (or construct) LCP values clamped at this constant instead of exact values.
    pub k_order: Option<u64>,
    /// The fingerprint modulus/base pair.
    pub params: FpParams,
    /// Ring geometry for every stream the passes open.
    pub stream: StreamOptions,
}

impl Default for VouchOptions {
    fn default() -> Self {
        let mem = std::env::var("MEM_LIMIT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(256 << 20);
        let scratch_dir = std::env::var("SCRATCH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir());
        Self {
            mem,
            scratch_dir,
            scratch_cap: u64::MAX,
            sa_width: SaWidth::default(),
            k_order: None,
            params: FP_EM128,
            stream: StreamOptions::default(),
        }
    }
}

////////////////////////////////////////////// PassCtx /////////////////////////////////////////////

/// Everything one verification pass needs.  Each pass still owns its sorters and heaps; the
/// context only shares the read-only inputs, the power table, and the partitioned budgets.
pub(crate) struct PassCtx {
    pub text: PathBuf,
    pub sa: PathBuf,
    pub lcp: PathBuf,
    pub n: u64,
    pub scratch: ScratchDir,
    pub rint: RInterval,
    pub stream: StreamOptions,
    pub sorter_budget: usize,
    pub heap_budget: usize,
    pub k: Option<u64>,
}

impl PassCtx {
    pub fn sorter_opts(&self) -> silt::SorterOptions {
        silt::SorterOptions {
            arena_bytes: self.sorter_budget,
            stream: self.stream,
        }
    }

    /// The clamp applied to induced LCP values: K in K-order mode, unbounded otherwise.
    pub fn kcap(&self) -> u64 {
        self.k.unwrap_or(u64::MAX)
    }
}

////////////////////////////////////////////// RunStats ////////////////////////////////////////////

/// The numbers behind the one-line stderr summary.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunStats {
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub peak_scratch: u64,
    pub elapsed_secs: f64,
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            fmt,
            "read {} B, wrote {} B, peak scratch {} B, elapsed {:.3} s",
            self.bytes_read, self.bytes_written, self.peak_scratch, self.elapsed_secs
        )
    }
}

////////////////////////////////////////////// Report //////////////////////////////////////////////

#[derive(Clone, Debug)]
pub struct Report {
    pub verdict: Verdict,
    pub stats: RunStats,
}

///////////////////////////////////////////// preflight ////////////////////////////////////////////

fn file_len(path: &Path) -> Result<u64, Error> {
    Ok(std::fs::metadata(path)
        .map_err(|e| Error::from(e).with_info("path", path.display().to_string()))?
        .len())
}

/// The checks that run before any pass starts: array sizes must agree with |T| at the
/// configured width, and the text must be non-empty and addressable at that width.
fn preflight(opts: &VouchOptions, text: &Path, sa: &Path, lcp: &Path) -> Result<u64, Error> {
    let n = file_len(text)?;
    if n == 0 {
        return Err(malformed("text is empty".to_string()));
    }
    if n > opts.sa_width.max() {
        return Err(malformed(format!(
            "text length {} exceeds the {}-byte entry width",
            n,
            opts.sa_width.bytes()
        )));
    }
    let width = opts.sa_width.bytes() as u64;
    let sa_len = file_len(sa)?;
    if sa_len != n * width {
        return Err(malformed(format!(
            "suffix array is {} bytes; expected {} ({} entries of {} bytes)",
            sa_len,
            n * width,
            n,
            width
        )));
    }
    let lcp_len = file_len(lcp)?;
    if lcp_len != n * width {
        return Err(malformed(format!(
            "LCP array is {} bytes; expected {} ({} entries of {} bytes)",
            lcp_len,
            n * width,
            n,
            width
        )));
    }
    if let Some(k) = opts.k_order {
        if k == 0 || !k.is_power_of_two() {
            return Err(malformed(format!("K must be a positive power of two, not {}", k)));
        }
    }
    Ok(n)
}

fn build_ctx(opts: &VouchOptions, text: &Path, sa: &Path, lcp: &Path, n: u64) -> Result<PassCtx, Error> {
    let scratch = ScratchDir::new(&opts.scratch_dir, opts.scratch_cap)?;
    let rint = RInterval::new(opts.params, n)?;
    let quarter = opts.mem / 4;
    Ok(PassCtx {
        text: text.to_path_buf(),
        sa: sa.to_path_buf(),
        lcp: lcp.to_path_buf(),
        n,
        scratch,
        rint,
        stream: opts.stream,
        sorter_budget: quarter,
        heap_budget: quarter,
        k: opts.k_order,
    })
}

////////////////////////////////////////////// validate ////////////////////////////////////////////

/// Verify that (SA, LCP) is a valid pair for the text.  A [Verdict::Reject] is a normal
/// outcome; errors are reserved for malformed input and runtime faults.
pub fn validate(
    opts: &VouchOptions,
    method: Method,
    text: &Path,
    sa: &Path,
    lcp: &Path,
) -> Result<Report, Error> {
    VALIDATE_RUNS.click();
    let stopwatch = Stopwatch::default();
    let read0 = silt::stream::total_bytes_read();
    let written0 = silt::stream::total_bytes_written();
    let n = preflight(opts, text, sa, lcp)?;
    clue!(COLLECTOR, INFO, {
        validate: {
            method: format!("{}", method),
            n: n,
        },
    });
    let ctx = build_ctx(opts, text, sa, lcp, n)?;
    let verdict = match (method, opts.sa_width) {
        (Method::Direct, SaWidth::W32) => direct::check::<W32>(&ctx)?,
        (Method::Direct, SaWidth::W40) => direct::check::<W40>(&ctx)?,
        (Method::Induced, SaWidth::W32) => induced_check::<W32>(&ctx)?,
        (Method::Induced, SaWidth::W40) => induced_check::<W40>(&ctx)?,
    };
    match &verdict {
        Verdict::Accept => {
            VALIDATE_ACCEPT.click();
            clue!(COLLECTOR, INFO, {
                accept: true,
            });
        }
        Verdict::Reject(reject) => {
            VALIDATE_REJECT.click();
            clue!(COLLECTOR, INFO, {
                reject: format!("{}", reject),
            });
        }
    }
    let stats = RunStats {
        bytes_read: silt::stream::total_bytes_read() - read0,
        bytes_written: silt::stream::total_bytes_written() - written0,
        peak_scratch: ctx.scratch.peak(),
        elapsed_secs: stopwatch.since(),
    };
    Ok(Report { verdict, stats })
}

fn induced_check<W: IndexWidth>(ctx: &PassCtx) -> Result<Verdict, Error> {
    let arrays = match lms::retrieve::<W>(ctx)? {
        Pass::Done(arrays) => arrays,
        Pass::Reject(r) => return Ok(Verdict::Reject(r)),
    };
    if let Pass::Reject(r) = lms::check::<W>(ctx, &arrays)? {
        return Ok(Verdict::Reject(r));
    }
    let inputs = match induced::retrieve::<W>(ctx)? {
        Pass::Done(inputs) => inputs,
        Pass::Reject(r) => return Ok(Verdict::Reject(r)),
    };
    let sorted_lcp_l = match induced::check_l::<W>(ctx, &arrays, &inputs)? {
        Pass::Done(vec) => vec,
        Pass::Reject(r) => return Ok(Verdict::Reject(r)),
    };
    match induced::check_s::<W>(ctx, &inputs, &sorted_lcp_l)? {
        Pass::Done(()) => Ok(Verdict::Accept),
        Pass::Reject(r) => Ok(Verdict::Reject(r)),
    }
}

///////////////////////////////////////////// construct ////////////////////////////////////////////

/// Build the K-order LCP array for a trusted suffix array, writing it at the configured
/// width.  `k` falls back to 256 when the options carry no K.
pub fn construct_klcp(
    opts: &VouchOptions,
    text: &Path,
    sa: &Path,
    out: &Path,
) -> Result<RunStats, Error> {
    CONSTRUCT_RUNS.click();
    let stopwatch = Stopwatch::default();
    let read0 = silt::stream::total_bytes_read();
    let written0 = silt::stream::total_bytes_written();
    let n = file_len(text)?;
    if n == 0 {
        return Err(malformed("text is empty".to_string()));
    }
    if n > opts.sa_width.max() {
        return Err(malformed(format!(
            "text length {} exceeds the {}-byte entry width",
            n,
            opts.sa_width.bytes()
        )));
    }
    let width = opts.sa_width.bytes() as u64;
    if file_len(sa)? != n * width {
        return Err(malformed("suffix array size disagrees with the text".to_string()));
    }
    let k = opts.k_order.unwrap_or(256);
    if k == 0 || !k.is_power_of_two() {
        return Err(malformed(format!("K must be a positive power of two, not {}", k)));
    }
    let ctx = build_ctx(opts, text, sa, sa, n)?;
    match opts.sa_width {
        SaWidth::W32 => klcp::construct::<W32>(&ctx, k, out)?,
        SaWidth::W40 => klcp::construct::<W40>(&ctx, k, out)?,
    }
    Ok(RunStats {
        bytes_read: silt::stream::total_bytes_read() - read0,
        bytes_written: silt::stream::total_bytes_written() - written0,
        peak_scratch: ctx.scratch.peak(),
        elapsed_secs: stopwatch.since(),
    })
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use silt::Record;

    use super::*;

    #[test]
    fn forty_bit_packing() {
        let mut buf = [0u8; 5];
        for v in [0u64, 1, 0xffff_ffff, 0x1_0000_0000, W40::MAX] {
            W40::store(v, &mut buf);
            assert_eq!(v, W40::load(&buf));
        }
        // Little-endian five-byte layout: low word first, high byte last.
        W40::store(0xab_1234_5678, &mut buf);
        assert_eq!([0x78, 0x56, 0x34, 0x12, 0xab], buf);
    }

    #[test]
    fn packed_records_use_the_width() {
        assert_eq!(4, <Packed<W32> as Record>::BYTES);
        assert_eq!(5, <Packed<W40> as Record>::BYTES);
        let mut buf = [0u8; 5];
        Packed::<W40>::new(77).store(&mut buf);
        assert_eq!(77, Packed::<W40>::load(&buf).0);
    }

    #[test]
    fn widths_parse_and_print() {
        assert_eq!(Ok(SaWidth::W32), "32".parse());
        assert_eq!(Ok(SaWidth::W40), "40".parse());
        assert!("48".parse::<SaWidth>().is_err());
        assert_eq!("40", format!("{}", SaWidth::W40));
        assert_eq!(Ok(Method::Direct), "direct".parse());
        assert!("both".parse::<Method>().is_err());
    }

    #[test]
    fn exit_codes_follow_the_contract() {
        let err = malformed("test".to_string());
        assert_eq!(2, err.exit_code());
        let err = Error::ScratchFull {
            core: ErrorCore::default(),
            cap: 0,
            requested: 1,
        };
        assert_eq!(3, err.exit_code());
        let err = Error::SystemError {
            core: ErrorCore::default(),
            what: "test".to_string(),
        };
        assert_eq!(4, err.exit_code());
    }
}
