//! Shared plumbing for the end-to-end tests: a naive in-RAM reference for suffix and LCP
//! arrays, and helpers that lay the three input files out on disk at a chosen width.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use silt::StreamOptions;

use vouch::{Method, Report, SaWidth, VouchOptions};

static SEQ: AtomicU64 = AtomicU64::new(0);

pub struct Fixture {
    pub dir: PathBuf,
    pub text: PathBuf,
    pub sa: PathBuf,
    pub lcp: PathBuf,
    pub opts: VouchOptions,
}

/// Small buffers and a small (but valid) RAM budget so the tests exercise the external
/// machinery without allocating gigabytes.
pub fn options(dir: &std::path::Path, width: SaWidth) -> VouchOptions {
    VouchOptions {
        mem: 8 << 20,
        scratch_dir: dir.to_path_buf(),
        scratch_cap: u64::MAX,
        sa_width: width,
        k_order: None,
        params: vouch::fingerprint::FP_EM128,
        stream: StreamOptions {
            buffers: 2,
            buffer_size: 4096,
        },
    }
}

pub fn encode(values: &[u64], width: SaWidth) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * width.bytes());
    for v in values.iter() {
        match width {
            SaWidth::W32 => out.extend_from_slice(&(*v as u32).to_le_bytes()),
            SaWidth::W40 => {
                out.extend_from_slice(&((*v & 0xffff_ffff) as u32).to_le_bytes());
                out.push((*v >> 32) as u8);
            }
        }
    }
    out
}

pub fn fixture(name: &str, text: &[u8], sa: &[u64], lcp: &[u64], width: SaWidth) -> Fixture {
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "vouch_it_{}_{}_{}",
        std::process::id(),
        name,
        seq
    ));
    std::fs::create_dir_all(&dir).expect("test dir should create");
    let text_path = dir.join("t");
    let sa_path = dir.join("sa");
    let lcp_path = dir.join("lcp");
    std::fs::write(&text_path, text).expect("text should write");
    std::fs::write(&sa_path, encode(sa, width)).expect("sa should write");
    std::fs::write(&lcp_path, encode(lcp, width)).expect("lcp should write");
    let opts = options(&dir, width);
    Fixture {
        dir,
        text: text_path,
        sa: sa_path,
        lcp: lcp_path,
        opts,
    }
}

pub fn run(fixture: &Fixture, method: Method) -> Report {
    vouch::validate(&fixture.opts, method, &fixture.text, &fixture.sa, &fixture.lcp)
        .expect("validate should not fault")
}

pub fn expect_accept(fixture: &Fixture, method: Method) {
    let report = run(fixture, method);
    assert!(
        report.verdict.is_accept(),
        "{:?} unexpectedly rejected: {:?}",
        method,
        report.verdict
    );
}

pub fn expect_reject(fixture: &Fixture, method: Method) {
    let report = run(fixture, method);
    assert!(
        !report.verdict.is_accept(),
        "{:?} unexpectedly accepted",
        method
    );
}

/// The in-RAM reference: sort the suffixes outright, then count common prefixes.
pub fn naive_sa_lcp(text: &[u8]) -> (Vec<u64>, Vec<u64>) {
    let n = text.len();
    let mut sa: Vec<usize> = (0..n).collect();
    sa.sort_by(|a, b| text[*a..].cmp(&text[*b..]));
    let mut lcp = vec![0u64; n];
    for i in 1..n {
        lcp[i] = common_prefix(&text[sa[i - 1]..], &text[sa[i]..]);
    }
    (sa.iter().map(|x| *x as u64).collect(), lcp)
}

pub fn common_prefix(a: &[u8], b: &[u8]) -> u64 {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count() as u64
}
