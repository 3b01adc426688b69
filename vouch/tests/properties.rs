//! Property tests against the naive in-RAM reference: true arrays always verify, and a
//! single perturbation of either array is caught.

extern crate proptest;

mod common;

use common::{expect_accept, expect_reject, fixture, naive_sa_lcp};

use proptest::prelude::ProptestConfig;

use vouch::{Method, SaWidth};

proptest::prop_compose! {
    // A small alphabet produces the runs and repeated substrings that stress the induced
    // rules; a sprinkle of wider bytes keeps the buckets honest.
    pub fn arb_text()(bytes in proptest::collection::vec(0u8..5u8, 1..96), spread in 0u8..4u8) -> Vec<u8> {
        bytes.iter().map(|b| b'a' + ((b + spread) % 5)).collect()
    }
}

proptest::proptest! {
    #![proptest_config(ProptestConfig { cases: 48, .. ProptestConfig::default() })]

    #[test]
    fn true_arrays_verify(text in arb_text()) {
        let (sa, lcp) = naive_sa_lcp(&text);
        let f = fixture("prop_ok", &text, &sa, &lcp, SaWidth::W32);
        expect_accept(&f, Method::Direct);
        expect_accept(&f, Method::Induced);
    }

    #[test]
    fn corrupted_lcp_rejects(text in arb_text(), at in 0usize..96, delta in 1u64..4u64) {
        let (sa, lcp) = naive_sa_lcp(&text);
        if lcp.len() < 2 {
            return Ok(());
        }
        let at = 1 + at % (lcp.len() - 1);
        let mut bad = lcp.clone();
        // Stay within the addressable range so the corruption is a lie, not a malformed
        // file.
        bad[at] = (lcp[at] + delta) % (text.len() as u64 + 1);
        if bad[at] == lcp[at] {
            return Ok(());
        }
        let f = fixture("prop_lcp", &text, &sa, &bad, SaWidth::W32);
        expect_reject(&f, Method::Direct);
        expect_reject(&f, Method::Induced);
    }

    #[test]
    fn swapped_sa_rejects(text in arb_text(), at in 0usize..96) {
        let (sa, lcp) = naive_sa_lcp(&text);
        if sa.len() < 2 {
            return Ok(());
        }
        let at = 1 + at % (sa.len() - 1);
        let mut bad = sa.clone();
        bad.swap(at - 1, at);
        // A swap of a suffix with one of its own extensions can leave every pairwise LCP
        // claim true; such alternate orders are accepted by design.  Only demand a reject
        // when some claimed LCP became a lie.
        let still_consistent = (1..sa.len()).all(|i| {
            lcp[i]
                == common::common_prefix(
                    &text[bad[i - 1] as usize..],
                    &text[bad[i] as usize..],
                )
        });
        if still_consistent {
            return Ok(());
        }
        let f = fixture("prop_sa", &text, &bad, &lcp, SaWidth::W32);
        expect_reject(&f, Method::Direct);
        expect_reject(&f, Method::Induced);
    }

    #[test]
    fn widths_agree(text in arb_text()) {
        let (sa, lcp) = naive_sa_lcp(&text);
        let f32 = fixture("prop_w32", &text, &sa, &lcp, SaWidth::W32);
        let f40 = fixture("prop_w40", &text, &sa, &lcp, SaWidth::W40);
        let a = common::run(&f32, Method::Induced);
        let b = common::run(&f40, Method::Induced);
        proptest::prop_assert_eq!(a.verdict, b.verdict);
    }
}
