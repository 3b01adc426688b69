//! End-to-end verification scenarios, each run through both methods unless the case is
//! specific to one of them.

mod common;

use common::{expect_accept, expect_reject, fixture, naive_sa_lcp, run};

use guacamole::Guacamole;

use vouch::{Error, Method, SaWidth, Verdict};

const BOTH: [Method; 2] = [Method::Direct, Method::Induced];

#[test]
fn banana_accepts() {
    let f = fixture(
        "banana",
        b"banana",
        &[5, 3, 1, 0, 4, 2],
        &[0, 1, 3, 0, 0, 2],
        SaWidth::W32,
    );
    for method in BOTH {
        expect_accept(&f, method);
    }
}

#[test]
fn banana_corrupted_lcp_rejects() {
    let f = fixture(
        "banana_bad_lcp",
        b"banana",
        &[5, 3, 1, 0, 4, 2],
        &[0, 1, 3, 0, 0, 3],
        SaWidth::W32,
    );
    for method in BOTH {
        expect_reject(&f, method);
    }
}

#[test]
fn banana_swapped_sa_rejects() {
    let f = fixture(
        "banana_bad_sa",
        b"banana",
        &[5, 3, 0, 1, 4, 2],
        &[0, 1, 3, 0, 0, 2],
        SaWidth::W32,
    );
    for method in BOTH {
        expect_reject(&f, method);
    }
}

#[test]
fn all_equal_text_accepts() {
    let f = fixture(
        "aaaaaa",
        b"aaaaaa",
        &[5, 4, 3, 2, 1, 0],
        &[0, 1, 2, 3, 4, 5],
        SaWidth::W32,
    );
    for method in BOTH {
        expect_accept(&f, method);
    }
}

#[test]
fn abcabcabc_largest_sentinel_arrays_pass_the_direct_method() {
    // This SA orders a prefix-suffix after its extensions, which the pairwise fingerprint
    // tests cannot distinguish from the usual convention.
    let f = fixture(
        "abc_direct",
        b"abcabcabc",
        &[0, 3, 6, 1, 4, 7, 2, 5, 8],
        &[0, 6, 3, 0, 5, 2, 0, 4, 1],
        SaWidth::W32,
    );
    expect_accept(&f, Method::Direct);
}

#[test]
fn abcabcabc_conventional_arrays_accept() {
    let f = fixture(
        "abc_induced",
        b"abcabcabc",
        &[6, 3, 0, 7, 4, 1, 8, 5, 2],
        &[0, 3, 6, 0, 2, 5, 0, 1, 4],
        SaWidth::W32,
    );
    for method in BOTH {
        expect_accept(&f, method);
    }
}

#[test]
fn mississippi_accepts_and_corruption_rejects() {
    let sa = [10, 7, 4, 1, 0, 9, 8, 6, 3, 5, 2];
    let lcp = [0, 1, 1, 4, 0, 0, 1, 0, 2, 1, 3];
    let f = fixture("mississippi", b"mississippi", &sa, &lcp, SaWidth::W32);
    for method in BOTH {
        expect_accept(&f, method);
    }
    let mut bad = lcp;
    bad[3] = 5;
    let f = fixture("mississippi_bad", b"mississippi", &sa, &bad, SaWidth::W32);
    for method in BOTH {
        expect_reject(&f, method);
    }
}

#[test]
fn leading_s_run_exercises_the_direct_induction() {
    // "aab": the smaller a-suffix is induced by the suffix scanned immediately before it.
    let (sa, lcp) = naive_sa_lcp(b"aab");
    let f = fixture("aab", b"aab", &sa, &lcp, SaWidth::W32);
    for method in BOTH {
        expect_accept(&f, method);
    }
    let (sa, lcp) = naive_sa_lcp(b"aabaabaab");
    let f = fixture("aab3", b"aabaabaab", &sa, &lcp, SaWidth::W32);
    for method in BOTH {
        expect_accept(&f, method);
    }
}

#[test]
fn single_byte_text_accepts() {
    let f = fixture("one", b"x", &[0], &[0], SaWidth::W32);
    for method in BOTH {
        expect_accept(&f, method);
    }
}

#[test]
fn forty_bit_width_round_trips() {
    let (sa, lcp) = naive_sa_lcp(b"mississippi");
    let f = fixture("w40", b"mississippi", &sa, &lcp, SaWidth::W40);
    for method in BOTH {
        expect_accept(&f, method);
    }
}

#[test]
fn nonzero_first_lcp_rejects() {
    let f = fixture("lcp0", b"banana", &[5, 3, 1, 0, 4, 2], &[1, 1, 3, 0, 0, 2], SaWidth::W32);
    for method in BOTH {
        expect_reject(&f, method);
    }
}

#[test]
fn duplicate_sa_entries_reject() {
    let f = fixture(
        "dup_sa",
        b"banana",
        &[5, 5, 1, 0, 4, 2],
        &[0, 1, 3, 0, 0, 2],
        SaWidth::W32,
    );
    for method in BOTH {
        expect_reject(&f, method);
    }
}

#[test]
fn out_of_range_sa_entry_rejects() {
    let f = fixture(
        "oob_sa",
        b"banana",
        &[5, 3, 1, 0, 4, 6],
        &[0, 1, 3, 0, 0, 2],
        SaWidth::W32,
    );
    for method in BOTH {
        expect_reject(&f, method);
    }
}

#[test]
fn lcp_past_text_end_rejects() {
    let f = fixture(
        "lcp_oob",
        b"banana",
        &[5, 3, 1, 0, 4, 2],
        &[0, 1, 6, 0, 0, 2],
        SaWidth::W32,
    );
    for method in BOTH {
        expect_reject(&f, method);
    }
}

#[test]
fn k_order_arrays_verify_with_the_clamp() {
    let text = b"aaaaaaaaaa";
    let (sa, lcp) = naive_sa_lcp(text);
    let k = 4u64;
    let clamped: Vec<u64> = lcp.iter().map(|l| std::cmp::min(*l, k)).collect();
    let mut f = fixture("korder", text, &sa, &clamped, SaWidth::W32);
    f.opts.k_order = Some(k);
    for method in BOTH {
        expect_accept(&f, method);
    }
    // Without the clamp configured, the truncated values are plain lies.
    let f = fixture("korder_off", text, &sa, &clamped, SaWidth::W32);
    for method in BOTH {
        expect_reject(&f, method);
    }
}

#[test]
fn truncated_sa_is_malformed() {
    let f = fixture("trunc", b"banana", &[5, 3, 1, 0, 4], &[0, 1, 3, 0, 0, 2], SaWidth::W32);
    let err = vouch::validate(&f.opts, Method::Induced, &f.text, &f.sa, &f.lcp).unwrap_err();
    assert!(matches!(err, Error::MalformedInput { .. }));
    assert_eq!(2, err.exit_code());
}

#[test]
fn scratch_cap_is_fatal() {
    let (sa, lcp) = naive_sa_lcp(b"mississippi");
    let mut f = fixture("cap", b"mississippi", &sa, &lcp, SaWidth::W32);
    f.opts.scratch_cap = 16;
    let err = vouch::validate(&f.opts, Method::Induced, &f.text, &f.sa, &f.lcp).unwrap_err();
    assert!(matches!(err, Error::ScratchFull { .. }));
    assert_eq!(3, err.exit_code());
}

#[test]
fn scratch_files_are_swept() {
    let (sa, lcp) = naive_sa_lcp(b"mississippi");
    let f = fixture("sweep", b"mississippi", &sa, &lcp, SaWidth::W32);
    for method in BOTH {
        let report = run(&f, method);
        assert_eq!(Verdict::Accept, report.verdict);
        assert!(report.stats.peak_scratch > 0);
    }
    let leftovers: Vec<_> = std::fs::read_dir(&f.dir)
        .expect("dir should list")
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with("silt."))
        .collect();
    assert!(leftovers.is_empty(), "scratch left behind: {:?}", leftovers);
}

#[test]
fn large_random_text_spills_and_verifies() {
    let mut guac = Guacamole::new(0x7ab5);
    let mut text = vec![0u8; 100_000];
    guac.generate(&mut text);
    for byte in text.iter_mut() {
        *byte = b'a' + (*byte % 26);
    }
    let (sa, lcp) = naive_sa_lcp(&text);
    let mut f = fixture("large", &text, &sa, &lcp, SaWidth::W32);
    // Shrink the budget so the sorters genuinely spill to scratch.
    f.opts.mem = 4 << 20;
    for method in BOTH {
        let report = run(&f, method);
        assert!(report.verdict.is_accept(), "{:?}: {:?}", method, report.verdict);
        assert!(report.stats.bytes_written > 0);
    }
}

#[test]
fn idempotent_runs_read_the_same_bytes() {
    let (sa, lcp) = naive_sa_lcp(b"mississippi");
    let f = fixture("idem", b"mississippi", &sa, &lcp, SaWidth::W32);
    let a = run(&f, Method::Induced);
    let b = run(&f, Method::Induced);
    assert_eq!(a.verdict, b.verdict);
    assert_eq!(a.stats.bytes_read, b.stats.bytes_read);
}
