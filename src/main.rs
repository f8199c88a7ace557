use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

use contig_curator::processing::{run_batch, CurateOptions, SampleJob};
use contig_curator::sample_id_from_path;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Contig curator - sorts assembled contigs by length, renames them and flags circular ones"
)]
struct Args {
    /// Assembled contigs (FASTA, optionally gzipped). Repeat for a batch.
    #[arg(short, long, required = true, num_args = 1..)]
    input: Vec<PathBuf>,

    /// Sample id (single input only). Derived from the file name otherwise.
    #[arg(short, long)]
    sample: Option<String>,

    /// Batch label attached to every sample of this run
    #[arg(short, long)]
    batch: Option<String>,

    /// Output root; each sample goes to `<output>/<sample>-Sorted/`.
    /// Defaults to the directory of each input.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Length of the prefix probed for circular overlap
    #[arg(short = 'k', long, default_value_t = 20, value_parser = clap::value_parser!(u32).range(1..))]
    anchor_length: u32,

    /// Minimum contig length for the min-length file. The file keeps its
    /// `_min250bp.fasta` name whatever the threshold.
    #[arg(short = 'l', long, default_value_t = 250)]
    min_length: usize,

    /// Gzip the FASTA outputs
    #[arg(short = 'z', long, default_value_t = false)]
    compress: bool,

    /// Number of samples processed in parallel
    #[arg(short, long, default_value_t = 4)]
    threads: usize,

    /// Verbose output (progress bar and elapsed time)
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

impl Args {
    /// Turn the command line into one job per input.
    fn jobs(&self) -> Result<Vec<SampleJob>> {
        if self.sample.is_some() && self.input.len() > 1 {
            anyhow::bail!("--sample can only be used with a single input");
        }

        self.input
            .iter()
            .map(|input| -> Result<SampleJob> {
                let sample = match &self.sample {
                    Some(s) => s.clone(),
                    None => sample_id_from_path(input).ok_or_else(|| {
                        anyhow::anyhow!("Cannot derive a sample id from {}", input.display())
                    })?,
                };
                let out_root = match &self.output {
                    Some(o) => o.as_path(),
                    None => input
                        .parent()
                        .filter(|p| !p.as_os_str().is_empty())
                        .unwrap_or_else(|| Path::new(".")),
                };
                let job = SampleJob::new(input, sample, out_root);
                Ok(match &self.batch {
                    Some(b) => job.with_batch(b),
                    None => job,
                })
            })
            .collect()
    }

    fn options(&self) -> CurateOptions {
        CurateOptions {
            anchor_length: self.anchor_length as usize,
            min_length: self.min_length,
            compress: self.compress,
        }
    }
}

/// CLI entry point: parse args, configure threading, curate every sample and
/// print one tab-separated line per finished sample:
/// [batch,] sample, total, min_length, circular.
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let jobs = args.jobs()?;
    let total_jobs = jobs.len();

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()
        .context("Failed to build thread pool")?;

    let pb = if args.verbose {
        let pb = ProgressBar::new(total_jobs as u64);
        pb.set_style(ProgressStyle::with_template(
            "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} samples",
        )?);
        pb
    } else {
        ProgressBar::hidden()
    };

    let start = std::time::Instant::now();
    let outcomes = run_batch(jobs, &args.options(), |_| pb.inc(1));
    pb.finish_and_clear();
    let elapsed = start.elapsed();

    let mut failed = 0;
    for outcome in &outcomes {
        let batch_col = match &outcome.job.batch_id {
            Some(b) => format!("{}\t", b),
            None => String::new(),
        };
        match &outcome.result {
            Ok(s) => println!(
                "{}{}\t{}\t{}\t{}",
                batch_col, outcome.job.sample_id, s.total, s.min_length, s.circular
            ),
            Err(e) => {
                failed += 1;
                eprintln!("{}{}\tFAILED\t{}", batch_col, outcome.job.sample_id, e);
            }
        }
    }

    if args.verbose {
        println!("Elapsed: {:.3}s", elapsed.as_secs_f64());
    }

    if failed > 0 {
        anyhow::bail!("{} of {} samples failed", failed, total_jobs);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing_and_validation() {
        let args = Args::try_parse_from(["prog", "-i", "asm/S1-6.fa"]).unwrap();
        assert_eq!(args.anchor_length, 20);
        assert_eq!(args.min_length, 250);
        assert_eq!(args.threads, 4);
        assert_eq!(args.output, None);
        assert_eq!(args.options(), CurateOptions::default());

        // A zero-length anchor is rejected by the parser
        assert!(Args::try_parse_from(["prog", "-i", "a.fa", "-k", "0"]).is_err());
        // Input is mandatory
        assert!(Args::try_parse_from(["prog"]).is_err());
    }

    #[test]
    fn test_jobs_from_args() {
        let args = Args::try_parse_from(["prog", "-i", "asm/S1-6.fa", "-i", "S2.fasta", "-b", "run1"])
            .unwrap();
        let jobs = args.jobs().unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].sample_id, "S1");
        assert_eq!(jobs[0].out_prefix, Path::new("asm/S1-Sorted/S1"));
        assert_eq!(jobs[1].sample_id, "S2");
        assert_eq!(jobs[1].out_prefix, Path::new("./S2-Sorted/S2"));
        assert_eq!(jobs[1].batch_id.as_deref(), Some("run1"));

        let args = Args::try_parse_from(["prog", "-i", "a.fa", "-s", "gut-1", "-o", "out"]).unwrap();
        let jobs = args.jobs().unwrap();
        assert_eq!(jobs[0].sample_id, "gut-1");
        assert_eq!(jobs[0].out_prefix, Path::new("out/gut-1-Sorted/gut-1"));

        let args = Args::try_parse_from(["prog", "-i", "a.fa", "-i", "b.fa", "-s", "x"]).unwrap();
        assert!(args.jobs().is_err());
    }
}
