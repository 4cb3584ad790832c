//! Sample sources: turning shard files into `(score, [user_id, item_ids...])`
//! records.
//!
//! Tokenization and decompression are treated as an external collaborator
//! ("interface only: produce a stream of samples"); this module supplies the
//! two concrete sources (plain text, gzip) that make the crate runnable
//! end to end, grounded in `original_source/src/file_parser.h`'s line format
//! and its `gz_ReadLineImpl`/`uz_ReadLineImpl` pair.

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::{MfError, Result};

/// One training or test record: `x[0]` is the user id, `x[1..]` are item
/// ids sharing `score`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub score: f32,
    pub x: Vec<i64>,
}

/// Parse one `user_id \t score \t item_id item_id ...` line. Malformed
/// lines (fewer than two fields, non-numeric score/index) are reported as
/// `MfError::MalformedSample` for the caller to count and skip — never
/// fatal.
fn parse_line(line: &str, line_no: u64) -> Result<Sample> {
    let mut fields = line.split_whitespace();

    let user = fields
        .next()
        .ok_or_else(|| MfError::MalformedSample {
            line: line_no,
            reason: "missing user id".into(),
        })?
        .parse::<i64>()
        .map_err(|_| MfError::MalformedSample {
            line: line_no,
            reason: "user id is not an integer".into(),
        })?;

    let score = fields
        .next()
        .ok_or_else(|| MfError::MalformedSample {
            line: line_no,
            reason: "missing score".into(),
        })?
        .parse::<f32>()
        .map_err(|_| MfError::MalformedSample {
            line: line_no,
            reason: "score is not numeric".into(),
        })?;

    let mut x = vec![user];
    for tok in fields {
        match tok.parse::<i64>() {
            Ok(item) => x.push(item),
            Err(_) => {
                return Err(MfError::MalformedSample {
                    line: line_no,
                    reason: format!("item id {tok:?} is not an integer"),
                })
            }
        }
    }

    Ok(Sample { score, x })
}

/// Pull interface over a shard: produces samples until exhausted. A
/// malformed line yields `Some(Err(..))` and the source continues reading
/// on the next call; end of shard yields `None`.
pub trait SampleSource: Iterator<Item = Result<Sample>> {}
impl<T: Iterator<Item = Result<Sample>>> SampleSource for T {}

/// Plain-text shard reader, one sample per line.
pub struct PlainTextSource {
    reader: BufReader<File>,
    line_no: u64,
    buf: String,
}

impl PlainTextSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            line_no: 0,
            buf: String::new(),
        })
    }
}

impl Iterator for PlainTextSource {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_line(&mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                self.line_no += 1;
                Some(parse_line(self.buf.trim_end(), self.line_no))
            }
            Err(e) => Some(Err(e.into())),
        }
    }
}

/// Gzip-compressed shard reader, same line format.
pub struct GzipTextSource {
    reader: BufReader<MultiGzDecoder<File>>,
    line_no: u64,
    buf: String,
}

impl GzipTextSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(MultiGzDecoder::new(file)),
            line_no: 0,
            buf: String::new(),
        })
    }
}

impl Iterator for GzipTextSource {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_line(&mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                self.line_no += 1;
                Some(parse_line(self.buf.trim_end(), self.line_no))
            }
            Err(e) => Some(Err(e.into())),
        }
    }
}

/// Open `path` as a gzip or plain-text source based on its extension.
pub fn open_shard(path: impl AsRef<Path>) -> Result<Box<dyn Iterator<Item = Result<Sample>>>> {
    let path = path.as_ref();
    if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        Ok(Box::new(GzipTextSource::open(path)?))
    } else {
        Ok(Box::new(PlainTextSource::open(path)?))
    }
}

/// Split a flat list of shard paths into `num_threads` contiguous,
/// as-even-as-possible partitions, restoring
/// `original_source/src/mf_solver.h::split_trainfiles`'s behavior.
/// Returns fewer partitions than requested if there are fewer shards than
/// threads.
pub fn partition_shards(shards: &[PathBuf], num_threads: usize) -> Vec<Vec<PathBuf>> {
    if shards.is_empty() || num_threads == 0 {
        return Vec::new();
    }
    let num_threads = num_threads.min(shards.len());
    let base = shards.len() / num_threads;
    let extra = shards.len() % num_threads;

    let mut partitions = Vec::with_capacity(num_threads);
    let mut idx = 0;
    for t in 0..num_threads {
        let take = base + usize::from(t < extra);
        partitions.push(shards[idx..idx + take].to_vec());
        idx += take;
    }
    partitions
}
