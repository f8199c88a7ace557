use flate2::write::GzEncoder;
use flate2::Compression;
use needletail::errors::ParseErrorKind;
use needletail::parse_fastx_reader;
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{CurateError, Result};
use crate::{mask_sample_id, ID_DELIMITER};

pub const ALL_CONTIGS_SUFFIX: &str = "_all_contigs_sort.fasta";
pub const MIN_LENGTH_SUFFIX: &str = "_min250bp.fasta";
pub const CIRCULAR_SUFFIX: &str = "_CIRCULAR.fasta";
pub const STATISTICS_SUFFIX: &str = "_STAT.txt";

/// One parsed contig.
///
/// `id` is the masked sample id, the id delimiter, then the header text with
/// whitespace turned into underscores. The sequence is fixed once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRecord {
    id: String,
    sequence: Vec<u8>,
}

impl SequenceRecord {
    pub fn new(id: impl Into<String>, sequence: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            sequence,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sequence(&self) -> &[u8] {
        &self.sequence
    }

    pub fn length(&self) -> usize {
        self.sequence.len()
    }
}

/// Turn a raw header line (without the marker) into its id form: trimmed,
/// with every whitespace character replaced by an underscore.
pub fn normalize_header(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Concatenate the lines of a raw sequence body, trimming whitespace from the
/// edges of each line. Whitespace inside a line is kept.
pub fn join_sequence_lines(raw: &[u8]) -> Vec<u8> {
    raw.split(|&b| b == b'\n')
        .flat_map(|line| line.trim_ascii().iter().copied())
        .collect()
}

/// Read every record of a FASTA (or FASTQ, optionally gzipped) file in file
/// order, prefixing each id with the masked `sample_id`.
///
/// Fails with `InputNotFound` when the file cannot be opened or read and
/// with `MalformedInput` when it holds no records.
pub fn read_records(path: &Path, sample_id: &str) -> Result<Vec<SequenceRecord>> {
    let file = File::open(path).map_err(|source| CurateError::InputNotFound {
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = match parse_fastx_reader(file) {
        Ok(r) => r,
        Err(e) if e.kind == ParseErrorKind::EmptyFile => {
            return Err(CurateError::malformed(path, "file contains no records"));
        }
        Err(e) => return Err(CurateError::malformed(path, e.to_string())),
    };

    let masked = mask_sample_id(sample_id);
    let mut records = Vec::new();

    while let Some(record) = reader.next() {
        let r = record.map_err(|e| CurateError::malformed(path, e.to_string()))?;

        let id = format!("{}{}{}", masked, ID_DELIMITER, normalize_header(r.id()));
        let sequence = join_sequence_lines(r.raw_seq());
        records.push(SequenceRecord::new(id, sequence));
    }

    if records.is_empty() {
        return Err(CurateError::malformed(path, "file contains no records"));
    }

    Ok(records)
}

/// Writer for FASTA artifacts and the statistics table.
///
/// Gzip output has to be finished explicitly to get its trailer written, so
/// callers end every writer with [`ContigWriter::finish`].
pub enum ContigWriter {
    Plain(BufWriter<File>),
    Gz(GzEncoder<BufWriter<File>>),
}

impl ContigWriter {
    fn inner(&mut self) -> &mut dyn Write {
        match self {
            Self::Plain(w) => w,
            Self::Gz(w) => w,
        }
    }

    /// Write a single-line `>header\nsequence\n` entry.
    pub fn write_fasta(&mut self, head: &str, seq: &[u8]) -> std::io::Result<()> {
        let w = self.inner();
        w.write_all(b">")?;
        w.write_all(head.as_bytes())?;
        w.write_all(b"\n")?;
        w.write_all(seq)?;
        w.write_all(b"\n")
    }

    pub fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        let w = self.inner();
        w.write_all(line.as_bytes())?;
        w.write_all(b"\n")
    }

    /// Flush buffered data (and the gzip trailer) and close the writer.
    pub fn finish(self) -> std::io::Result<()> {
        match self {
            Self::Plain(mut w) => w.flush(),
            Self::Gz(w) => w.finish()?.flush(),
        }
    }
}

/// Create a writer for `path`, truncating any existing file. A `.gz`
/// extension selects gzip output.
pub fn create_contig_writer(path: &Path) -> Result<ContigWriter> {
    let file = File::create(path).map_err(|e| CurateError::write(e, path))?;
    let writer = BufWriter::new(file);
    if path.extension().is_some_and(|e| e == "gz") {
        Ok(ContigWriter::Gz(GzEncoder::new(writer, Compression::default())))
    } else {
        Ok(ContigWriter::Plain(writer))
    }
}

/// The four artifacts written for one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub all_contigs: PathBuf,
    pub min_length: PathBuf,
    pub circular: PathBuf,
    pub statistics: PathBuf,
}

impl OutputPaths {
    /// Append the fixed suffixes to `out_prefix`. With `compress`, the FASTA
    /// artifacts get an extra `.gz`; the statistics table stays plain text.
    pub fn from_prefix(out_prefix: &Path, compress: bool) -> Self {
        let gz = if compress { ".gz" } else { "" };
        let with_suffix = |suffix: &str, ext: &str| {
            let mut name = OsString::from(out_prefix.as_os_str());
            name.push(suffix);
            name.push(ext);
            PathBuf::from(name)
        };

        Self {
            all_contigs: with_suffix(ALL_CONTIGS_SUFFIX, gz),
            min_length: with_suffix(MIN_LENGTH_SUFFIX, gz),
            circular: with_suffix(CIRCULAR_SUFFIX, gz),
            statistics: with_suffix(STATISTICS_SUFFIX, ""),
        }
    }

    pub fn files(&self) -> [&Path; 4] {
        [
            &self.all_contigs,
            &self.min_length,
            &self.circular,
            &self.statistics,
        ]
    }
}
