use std::path::{Path, PathBuf};

use arrrg::CommandLine;
use arrrg_derive::CommandLine;

use zerror::Z;

use vouch::{validate, Method, SaWidth, Verdict, VouchOptions, COLLECTOR};

#[derive(CommandLine, Debug, Eq, PartialEq)]
struct VouchCommandLine {
    #[arrrg(required, "Input text file.", "FILE")]
    text: String,
    #[arrrg(required, "Candidate suffix array file.", "FILE")]
    sa: String,
    #[arrrg(required, "Candidate LCP array file.", "FILE")]
    lcp: String,
    #[arrrg(optional, "Verification method: direct or induced.", "METHOD")]
    method: Method,
    #[arrrg(optional, "On-disk width of SA/LCP entries: 32 or 40.", "BITS")]
    sa_width: SaWidth,
    #[arrrg(optional, "RAM budget in bytes.", "BYTES")]
    mem: usize,
    #[arrrg(optional, "Directory for scratch state.", "PATH")]
    scratch_dir: String,
    #[arrrg(optional, "Cap on scratch bytes.", "BYTES")]
    scratch_cap: u64,
    #[arrrg(optional, "Treat the LCP array as K-order, clamped at this power of two.", "K")]
    k_order: Option<u64>,
    #[arrrg(flag, "Emit clues to stderr.")]
    verbose: bool,
}

impl Default for VouchCommandLine {
    fn default() -> Self {
        let opts = VouchOptions::default();
        Self {
            text: String::new(),
            sa: String::new(),
            lcp: String::new(),
            method: Method::default(),
            sa_width: SaWidth::default(),
            mem: opts.mem,
            scratch_dir: opts.scratch_dir.display().to_string(),
            scratch_cap: opts.scratch_cap,
            k_order: None,
            verbose: false,
        }
    }
}

fn main() {
    let (cmdline, free) = VouchCommandLine::from_command_line(
        "Usage: vouch --text FILE --sa FILE --lcp FILE [OPTIONS]",
    );
    if !free.is_empty() {
        eprintln!("unexpected positional arguments: {:?}", free);
        std::process::exit(2);
    }
    if cmdline.verbose {
        COLLECTOR.register(indicio::stdio::StdioEmitter);
        COLLECTOR.set_verbosity(indicio::INFO);
    }
    let opts = VouchOptions {
        mem: cmdline.mem,
        scratch_dir: PathBuf::from(&cmdline.scratch_dir),
        scratch_cap: cmdline.scratch_cap,
        sa_width: cmdline.sa_width,
        k_order: cmdline.k_order,
        ..VouchOptions::default()
    };
    let report = validate(
        &opts,
        cmdline.method,
        Path::new(&cmdline.text),
        Path::new(&cmdline.sa),
        Path::new(&cmdline.lcp),
    );
    let code = match report {
        Ok(report) => {
            eprintln!("{}", report.stats);
            match report.verdict {
                Verdict::Accept => 0,
                Verdict::Reject(reject) => {
                    eprintln!("rejected: {}", reject);
                    1
                }
            }
        }
        Err(err) => {
            eprintln!("{}", err.long_form());
            err.exit_code()
        }
    };
    std::process::exit(code);
}
