use clap::Parser;
use kncl_tree_completion::io::{format_pair_block, read_newick_file, write_blocks};
use kncl_tree_completion::kncl::{KnclParams, complete_all_pairs};
use std::path::PathBuf;
use std::time::Instant;

/// Complete every pair of trees in a Newick file with the k-NCL algorithm
/// and report branch score distances before and after completion.
#[derive(Parser, Debug)]
#[command(name = "kncl", version, about = "k-nearest-common-leaves tree completion")]
struct Args {
    /// Path to a Newick file with one tree per line (.gz accepted)
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Number of nearest common leaves; default (|CL| + 2) / 2 per pair
    k: Option<usize>,

    /// Output path for the result blocks ("-" for stdout, .gz to compress)
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Shortest terminal branch kept when grafting onto a leaf edge
    #[arg(long = "min-terminal", default_value_t = 1e-3)]
    min_terminal: f64,

    /// Worker threads for pair processing (0 = all cores)
    #[arg(long = "threads", default_value_t = 0)]
    threads: usize,

    /// Quiet mode: suppresses progress messages
    #[arg(short = 'q', long = "quiet", default_value_t = false)]
    quiet: bool,
}

fn main() {
    let args = Args::parse();

    if args.threads > 0 {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build_global()
        {
            eprintln!("Failed to configure {} threads: {e}", args.threads);
        }
    }

    // Results written to stdout push progress over to stderr
    let log = Log {
        show: !args.quiet,
        to_stderr: args.output.as_os_str() == "-",
    };

    let t0 = Instant::now();
    let trees = match read_newick_file(&args.input) {
        Ok(trees) => trees,
        Err(e) => {
            eprintln!("Failed to read {:?}: {e}", args.input);
            std::process::exit(2);
        }
    };
    if trees.len() < 2 {
        eprintln!("Need at least 2 trees in {:?}, found {}.", args.input, trees.len());
        std::process::exit(2);
    }
    let read_s = t0.elapsed().as_secs_f64();
    log.line(format!("Read {} trees in {read_s:.3}s", trees.len()));

    let mut builder = KnclParams::builder().min_terminal_length(args.min_terminal);
    if let Some(k) = args.k {
        builder = builder.k(k);
    }
    let params = builder.build();
    if let Err(e) = params.validate() {
        eprintln!("{e}");
        std::process::exit(2);
    }

    let t1 = Instant::now();
    let n = trees.len();
    log.line(format!("Completing {} tree pairs", n * (n - 1) / 2));
    let results = complete_all_pairs(&trees, &params);
    let comp_s = t1.elapsed().as_secs_f64();
    log.line(format!("Completing tree pairs {comp_s:.3}s"));

    let mut failed = 0usize;
    let mut blocks = Vec::with_capacity(results.len());
    for (i, j, outcome) in &results {
        let (i, j) = (i + 1, j + 1);
        match outcome {
            Ok(pair) => {
                let report = &pair.completion.report;
                log.line(format!(
                    "Tree pair {i} and {j}: k={} |CL|={} grafted {} subtrees",
                    report.k,
                    report.common_leaves,
                    report.grafts.len()
                ));
                for warning in &report.warnings {
                    eprintln!("Tree pair {i} and {j}: {warning}");
                }
                if !report.backbone_preserved {
                    eprintln!("Tree pair {i} and {j}: common-leaf topology changed during completion");
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("Tree pair {i} and {j}: tree completion failed: {e}");
            }
        }
        blocks.push(format_pair_block(i, j, outcome));
    }
    if failed > 0 {
        log.line(format!("{failed} of {} pairs failed", results.len()));
    }

    let t2 = Instant::now();
    if let Err(e) = write_blocks(&args.output, &blocks) {
        eprintln!("Failed to write output {:?}: {e}", args.output);
        std::process::exit(4);
    }
    let write_s = t2.elapsed().as_secs_f64();
    log.write_done(write_s);
}

struct Log {
    show: bool,
    to_stderr: bool,
}

impl Log {
    fn line(&self, msg: String) {
        if !self.show {
            return;
        }
        if self.to_stderr {
            eprintln!("{}", msg);
        } else {
            println!("{}", msg);
        }
    }

    fn write_done(&self, secs: f64) {
        if self.to_stderr {
            self.line(format!("Writing to stdout {secs:.3}s"));
        } else {
            self.line(format!("Writing to output {secs:.3}s"));
        }
    }
}
