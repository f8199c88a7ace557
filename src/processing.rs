use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::circular::{classify, CircularRecord, StatisticsRow, DEFAULT_ANCHOR_LENGTH, STATISTICS_HEADER};
use crate::error::{CurateError, Result};
use crate::io::{create_contig_writer, read_records, ContigWriter, OutputPaths};
use crate::ranking::{rank_records, RankedRecord};

/// Contigs shorter than this are left out of the minimum-length file.
pub const DEFAULT_MIN_LENGTH: usize = 250;

/// Tunables for one curation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurateOptions {
    pub anchor_length: usize,
    pub min_length: usize,
    /// Gzip the FASTA artifacts.
    pub compress: bool,
}

impl Default for CurateOptions {
    fn default() -> Self {
        Self {
            anchor_length: DEFAULT_ANCHOR_LENGTH,
            min_length: DEFAULT_MIN_LENGTH,
            compress: false,
        }
    }
}

/// Counts and artifact locations of a finished sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurationSummary {
    pub total: usize,
    pub min_length: usize,
    pub circular: usize,
    pub paths: OutputPaths,
}

/// Open `path`, let `body` fill it, then finish the writer. The file is
/// closed whether or not `body` succeeds.
fn write_artifact<F>(path: &Path, body: F) -> Result<()>
where
    F: FnOnce(&mut ContigWriter) -> std::io::Result<()>,
{
    let mut w = create_contig_writer(path)?;
    body(&mut w)
        .and_then(|()| w.finish())
        .map_err(|e| CurateError::write(e, path))
}

/// Write the four artifacts of one sample. Returns how many records went
/// into the minimum-length file.
pub fn write_outputs(
    ranked: &[RankedRecord],
    rows: &[StatisticsRow],
    circular: &[CircularRecord],
    paths: &OutputPaths,
    min_length: usize,
) -> Result<usize> {
    write_artifact(&paths.all_contigs, |w| {
        for r in ranked {
            w.write_fasta(&r.canonical_id, r.sequence())?;
        }
        Ok(())
    })?;

    let mut kept = 0;
    write_artifact(&paths.min_length, |w| {
        for r in ranked.iter().filter(|r| r.length() >= min_length) {
            w.write_fasta(&r.canonical_id, r.sequence())?;
            kept += 1;
        }
        Ok(())
    })?;

    write_artifact(&paths.circular, |w| {
        for c in circular {
            w.write_fasta(&c.header(), &c.trimmed_sequence)?;
        }
        Ok(())
    })?;

    write_artifact(&paths.statistics, |w| {
        w.write_line(STATISTICS_HEADER)?;
        for row in rows {
            w.write_line(&row.to_tsv())?;
        }
        Ok(())
    })?;

    Ok(kept)
}

fn remove_outputs(paths: &OutputPaths) {
    for p in paths.files() {
        match fs::remove_file(p) {
            Ok(()) => warn!("Removed partial output {}", p.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove partial output {}: {}", p.display(), e),
        }
    }
}

/// Curate one assembly: rank its contigs, detect circular ones and write
/// the artifacts under `out_prefix`.
///
/// The parent directory of `out_prefix` is created when missing and existing
/// artifacts are overwritten. If writing fails, the artifacts of this sample
/// are removed before the error is returned.
pub fn curate_sample(
    input: &Path,
    sample_id: &str,
    out_prefix: &Path,
    options: &CurateOptions,
) -> Result<CurationSummary> {
    info!("Curating {} as sample {}", input.display(), sample_id);

    let records = read_records(input, sample_id)?;
    let ranked = rank_records(records);

    let mut rows = Vec::with_capacity(ranked.len());
    let mut circular = Vec::new();
    for r in &ranked {
        let (row, circ) = classify(r, options.anchor_length);
        if let Some(c) = circ {
            debug!(
                "{} is circular: {} bp overlap, {} bp kept",
                c.canonical_id,
                c.overlap_length,
                c.trimmed_sequence.len()
            );
            circular.push(c);
        }
        rows.push(row);
    }

    if let Some(dir) = out_prefix.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| CurateError::write(e, dir))?;
    }

    let paths = OutputPaths::from_prefix(out_prefix, options.compress);
    let min_length = match write_outputs(&ranked, &rows, &circular, &paths, options.min_length) {
        Ok(n) => n,
        Err(e) => {
            remove_outputs(&paths);
            return Err(e);
        }
    };

    info!(
        "Sample {}: {} contigs, {} >= {} bp, {} circular",
        sample_id,
        ranked.len(),
        min_length,
        options.min_length,
        circular.len()
    );

    Ok(CurationSummary {
        total: ranked.len(),
        min_length,
        circular: circular.len(),
        paths,
    })
}

/// Everything a stage needs to know about one sample, built once by the
/// caller and passed along instead of being re-parsed from paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleJob {
    pub sample_id: String,
    pub batch_id: Option<String>,
    pub input: PathBuf,
    pub out_prefix: PathBuf,
}

impl SampleJob {
    /// Place the sample's artifacts under `<out_root>/<sample>-Sorted/<sample>`.
    pub fn new(input: impl Into<PathBuf>, sample_id: impl Into<String>, out_root: &Path) -> Self {
        let sample_id = sample_id.into();
        let out_prefix = out_root
            .join(format!("{}-Sorted", sample_id))
            .join(&sample_id);
        Self {
            sample_id,
            batch_id: None,
            input: input.into(),
            out_prefix,
        }
    }

    pub fn with_batch(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }

    /// `batch/sample`, or just the sample id outside a batch.
    pub fn label(&self) -> String {
        match &self.batch_id {
            Some(b) => format!("{}/{}", b, self.sample_id),
            None => self.sample_id.clone(),
        }
    }
}

/// The result of one sample in a batch.
#[derive(Debug)]
pub struct SampleOutcome {
    pub job: SampleJob,
    pub result: Result<CurationSummary>,
}

impl SampleOutcome {
    /// Minimum-length file to hand to the search stage, if the sample
    /// completed.
    pub fn query_path(&self) -> Option<&Path> {
        self.result.as_ref().ok().map(|s| s.paths.min_length.as_path())
    }
}

/// Curate every job in parallel. A failing sample never stops the others;
/// outcomes come back in job order and `on_done` is called as each sample
/// finishes.
///
/// An output prefix belongs to the first job that names it. Later jobs with
/// the same prefix fail with `OutputWrite` and are not run.
pub fn run_batch<F>(jobs: Vec<SampleJob>, options: &CurateOptions, on_done: F) -> Vec<SampleOutcome>
where
    F: Fn(&SampleOutcome) + Sync,
{
    let mut claimed: HashMap<PathBuf, String> = HashMap::new();
    let planned: Vec<(SampleJob, Option<CurateError>)> = jobs
        .into_iter()
        .map(|job| {
            let conflict = match claimed.get(&job.out_prefix) {
                Some(owner) => Some(CurateError::write(
                    std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        format!("output prefix already used by sample {}", owner),
                    ),
                    &job.out_prefix,
                )),
                None => {
                    claimed.insert(job.out_prefix.clone(), job.label());
                    None
                }
            };
            (job, conflict)
        })
        .collect();

    planned
        .into_par_iter()
        .map(|(job, conflict)| {
            let result = match conflict {
                Some(e) => Err(e),
                None => curate_sample(&job.input, &job.sample_id, &job.out_prefix, options),
            };
            match &result {
                Ok(s) => info!("{}: done, {} contigs", job.label(), s.total),
                Err(e) => warn!("{} failed: {}", job.label(), e),
            }
            let outcome = SampleOutcome { job, result };
            on_done(&outcome);
            outcome
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SequenceRecord;

    #[test]
    fn test_write_artifact_fasta_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.fasta");
        let ranked = rank_records(vec![SequenceRecord::new("s1_x", b"ACGT".to_vec())]);

        write_artifact(&path, |w| {
            for r in &ranked {
                w.write_fasta(&r.canonical_id, r.sequence())?;
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), ">s1_1_lt_4\nACGT\n");
    }

    #[test]
    fn test_write_outputs_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let ranked = rank_records(vec![
            SequenceRecord::new("s1_a", vec![b'A'; 249]),
            SequenceRecord::new("s1_b", vec![b'C'; 250]),
        ]);
        let rows: Vec<StatisticsRow> = ranked
            .iter()
            .map(|r| classify(r, DEFAULT_ANCHOR_LENGTH).0)
            .collect();
        let paths = OutputPaths::from_prefix(&dir.path().join("s1"), false);

        let kept = write_outputs(&ranked, &rows, &[], &paths, DEFAULT_MIN_LENGTH).unwrap();
        assert_eq!(kept, 1);

        let min = fs::read_to_string(&paths.min_length).unwrap();
        assert!(min.starts_with(">s1_1_lt_250\n"));
        assert!(!min.contains("s1_2_lt_249"));

        let stats = fs::read_to_string(&paths.statistics).unwrap();
        let lines: Vec<&str> = stats.lines().collect();
        assert_eq!(lines[0], STATISTICS_HEADER);
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("s1_1_lt_250\t"));
        assert!(lines[2].starts_with("s1_2_lt_249\t"));
    }

    #[test]
    fn test_curate_sample_missing_input_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("out").join("s1");
        let err = curate_sample(
            &dir.path().join("missing.fa"),
            "s1",
            &prefix,
            &CurateOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CurateError::InputNotFound { .. }));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_curate_sample_unwritable_output_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.fa");
        fs::write(&input, ">c1\nACGT\n").unwrap();

        // The circular artifact path is a directory, so it cannot be created
        let prefix = dir.path().join("s1");
        let paths = OutputPaths::from_prefix(&prefix, false);
        fs::create_dir(&paths.circular).unwrap();

        let err = curate_sample(&input, "s1", &prefix, &CurateOptions::default()).unwrap_err();
        assert!(matches!(err, CurateError::OutputWrite { .. }));
        assert!(!paths.all_contigs.exists());
        assert!(!paths.min_length.exists());
        assert!(!paths.statistics.exists());
    }

    #[test]
    fn test_sample_job_layout() {
        let job = SampleJob::new("a/S12-6.fa", "S12", Path::new("results"));
        assert_eq!(job.out_prefix, Path::new("results/S12-Sorted/S12"));
        assert_eq!(job.label(), "S12");

        let job = job.with_batch("run1");
        assert_eq!(job.batch_id.as_deref(), Some("run1"));
        assert_eq!(job.label(), "run1/S12");
    }

    #[test]
    fn test_run_batch_keeps_going_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.fa");
        fs::write(&good, ">c1\nACGTACGT\n>c2\nAC\n").unwrap();
        let empty = dir.path().join("empty.fa");
        fs::write(&empty, "").unwrap();

        let jobs = vec![
            SampleJob::new(&empty, "bad", dir.path()),
            SampleJob::new(&good, "good", dir.path()),
        ];
        let outcomes = run_batch(jobs, &CurateOptions::default(), |_| {});

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].job.sample_id, "bad");
        assert!(matches!(
            outcomes[0].result,
            Err(CurateError::MalformedInput { .. })
        ));
        assert!(outcomes[0].query_path().is_none());

        let summary = outcomes[1].result.as_ref().unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.min_length, 0);
        assert_eq!(
            outcomes[1].query_path().unwrap(),
            dir.path().join("good-Sorted/good_min250bp.fasta")
        );
    }

    #[test]
    fn test_run_batch_rejects_shared_output_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let stage6 = dir.path().join("S1-6.fa");
        fs::write(&stage6, ">c1\nAAAAA\n").unwrap();
        let stage7 = dir.path().join("S1-7.fa");
        fs::write(&stage7, ">c1\nCCCCC\n>c2\nGG\n").unwrap();

        // Both file names reduce to sample S1 and the same prefix
        let jobs = vec![
            SampleJob::new(&stage6, "S1", dir.path()),
            SampleJob::new(&stage7, "S1", dir.path()),
        ];
        assert_eq!(jobs[0].out_prefix, jobs[1].out_prefix);

        let outcomes = run_batch(jobs, &CurateOptions::default(), |_| {});
        let summary = outcomes[0].result.as_ref().unwrap();
        assert_eq!(summary.total, 1);
        assert!(matches!(
            outcomes[1].result,
            Err(CurateError::OutputWrite { .. })
        ));

        // The first sample's artifacts hold its own data only
        let all = fs::read_to_string(&summary.paths.all_contigs).unwrap();
        assert_eq!(all, ">S1_1_lt_5\nAAAAA\n");
    }
}
