//! The K-order LCP builder against the naive reference, and round-tripping its output back
//! through the verifier in K-order mode.

mod common;

use common::{fixture, naive_sa_lcp};

use vouch::{construct_klcp, Method, SaWidth};

fn build(text: &[u8], k: u64, width: SaWidth) -> (Vec<u64>, common::Fixture) {
    let (sa, lcp) = naive_sa_lcp(text);
    let clamped: Vec<u64> = lcp.iter().map(|l| std::cmp::min(*l, k)).collect();
    let mut f = fixture("klcp", text, &sa, &clamped, width);
    f.opts.k_order = Some(k);
    let out = f.dir.join("klcp_out");
    construct_klcp(&f.opts, &f.text, &f.sa, &out).expect("construction should succeed");
    let bytes = std::fs::read(&out).expect("output should read");
    assert_eq!(bytes.len(), text.len() * width.bytes());
    let mut built = Vec::with_capacity(text.len());
    for chunk in bytes.chunks(width.bytes()) {
        let mut v = 0u64;
        for (i, b) in chunk.iter().enumerate() {
            v |= (*b as u64) << (8 * i);
        }
        built.push(v);
    }
    (built, f)
}

#[test]
fn mississippi_klcp_matches_the_reference() {
    let text = b"mississippi";
    let k = 4u64;
    let (built, f) = build(text, k, SaWidth::W32);
    let (_, lcp) = naive_sa_lcp(text);
    let clamped: Vec<u64> = lcp.iter().map(|l| std::cmp::min(*l, k)).collect();
    assert_eq!(clamped, built);
    // The builder's own output verifies in K-order mode.
    let report = vouch::validate(&f.opts, Method::Induced, &f.text, &f.sa, &f.lcp)
        .expect("validate should not fault");
    assert!(report.verdict.is_accept());
}

#[test]
fn long_runs_clamp_at_k() {
    let text = b"aaaaaaaaaaaaaaaa";
    let k = 8u64;
    let (built, _f) = build(text, k, SaWidth::W32);
    let expect: Vec<u64> = (0..text.len() as u64).map(|i| std::cmp::min(i, k)).collect();
    assert_eq!(expect, built);
}

#[test]
fn forty_bit_output_width() {
    let text = b"abracadabra";
    let k = 16u64;
    let (built, _f) = build(text, k, SaWidth::W40);
    let (_, lcp) = naive_sa_lcp(text);
    let clamped: Vec<u64> = lcp.iter().map(|l| std::cmp::min(*l, k)).collect();
    assert_eq!(clamped, built);
}

#[test]
fn direct_method_agrees_on_k_order_arrays() {
    let text = b"mississippi";
    let (_, f) = build(text, 4, SaWidth::W32);
    let report = vouch::validate(&f.opts, Method::Direct, &f.text, &f.sa, &f.lcp)
        .expect("validate should not fault");
    assert!(report.verdict.is_accept());
}
