use std::path::{Path, PathBuf};

use arrrg::CommandLine;
use arrrg_derive::CommandLine;

use zerror::Z;

use vouch::{construct_klcp, SaWidth, VouchOptions, COLLECTOR};

#[derive(CommandLine, Debug, Eq, PartialEq)]
struct KlcpCommandLine {
    #[arrrg(required, "Input text file.", "FILE")]
    text: String,
    #[arrrg(required, "Trusted suffix array file.", "FILE")]
    sa: String,
    #[arrrg(required, "Output K-order LCP file.", "FILE")]
    output: String,
    #[arrrg(optional, "Clamp LCP values at this power of two.", "K")]
    k: u64,
    #[arrrg(optional, "On-disk width of SA/LCP entries: 32 or 40.", "BITS")]
    sa_width: SaWidth,
    #[arrrg(optional, "RAM budget in bytes.", "BYTES")]
    mem: usize,
    #[arrrg(optional, "Directory for scratch state.", "PATH")]
    scratch_dir: String,
    #[arrrg(flag, "Emit clues to stderr.")]
    verbose: bool,
}

impl Default for KlcpCommandLine {
    fn default() -> Self {
        let opts = VouchOptions::default();
        Self {
            text: String::new(),
            sa: String::new(),
            output: String::new(),
            k: 256,
            sa_width: SaWidth::default(),
            mem: opts.mem,
            scratch_dir: opts.scratch_dir.display().to_string(),
            verbose: false,
        }
    }
}

fn main() {
    let (cmdline, free) = KlcpCommandLine::from_command_line(
        "Usage: vouch-klcp --text FILE --sa FILE --output FILE [OPTIONS]",
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
        sa_width: cmdline.sa_width,
        k_order: Some(cmdline.k),
        ..VouchOptions::default()
    };
    let code = match construct_klcp(
        &opts,
        Path::new(&cmdline.text),
        Path::new(&cmdline.sa),
        Path::new(&cmdline.output),
    ) {
        Ok(stats) => {
            eprintln!("{}", stats);
            0
        }
        Err(err) => {
            eprintln!("{}", err.long_form());
            err.exit_code()
        }
    };
    std::process::exit(code);
}
