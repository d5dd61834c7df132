//! Streaming CSV reader that yields fixed-size row batches.
//!
//! Rows are read as raw bytes and validated one at a time, so a malformed
//! line (wrong column count, invalid UTF-8) is counted and skipped without
//! ending the read. Only IO failures on the underlying file are returned as
//! errors.

use anyhow::{anyhow, bail, Context, Result};
use csv::{ByteRecord, ReaderBuilder, StringRecord};
use flate2::read::GzDecoder;
use log::debug;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

/// Options controlling batching and the portion of the file that is read
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Maximum number of data rows per batch
    pub batch_size: usize,
    /// Data rows to fast-forward past before the first batch
    pub skip_rows: u64,
    /// Stop after this many data rows (counted after `skip_rows`)
    pub max_rows: Option<u64>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            skip_rows: 0,
            max_rows: None,
        }
    }
}

/// One decoded data row, addressable by column index or header name
#[derive(Debug, Clone)]
pub struct RawRow {
    headers: Arc<StringRecord>,
    record: StringRecord,
    row_number: u64,
}

impl RawRow {
    /// Value at a column position resolved from the header row
    pub fn get(&self, index: usize) -> Option<&str> {
        self.record.get(index)
    }

    /// Value of the first column with this exact header name
    pub fn by_name(&self, column: &str) -> Option<&str> {
        self.headers
            .iter()
            .position(|h| h == column)
            .and_then(|i| self.record.get(i))
    }

    /// 1-based position of this row among the file's data rows
    pub fn row_number(&self) -> u64 {
        self.row_number
    }

    /// (header, value) pairs in file order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().zip(self.record.iter())
    }
}

/// A contiguous slice of the input, in file order
#[derive(Debug)]
pub struct Batch {
    /// 0-based batch index within this read
    pub index: usize,
    /// Data-row offset of the first row in this batch (rows before it in the file)
    pub start_offset: u64,
    /// Rows consumed from the file for this batch, including malformed ones
    pub rows_consumed: u64,
    /// Rows skipped for wrong column count or invalid UTF-8
    pub malformed: u64,
    pub rows: Vec<RawRow>,
}

impl Batch {
    /// Data-row offset just after this batch; the value to resume from once it is committed
    pub fn end_offset(&self) -> u64 {
        self.start_offset + self.rows_consumed
    }
}

enum RawRead {
    Record(ByteRecord),
    Unparseable,
    Eof,
}

/// Lazy, finite sequence of row batches over a delimited file
pub struct BatchReader {
    reader: csv::Reader<Box<dyn Read + Send>>,
    headers: Arc<StringRecord>,
    options: ReaderOptions,
    offset: u64,
    rows_after_skip: u64,
    malformed_total: u64,
    next_index: usize,
    skipped: bool,
    finished: bool,
}

impl BatchReader {
    /// Open a CSV file; paths ending in `.gz` are decompressed on the fly
    pub fn open<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open input file: {}", path.display()))?;

        let source: Box<dyn Read + Send> = if path.extension().map_or(false, |ext| ext == "gz") {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };

        Self::from_reader(source, options)
            .with_context(|| format!("Failed to read CSV header from: {}", path.display()))
    }

    pub fn from_reader(source: Box<dyn Read + Send>, options: ReaderOptions) -> Result<Self> {
        if options.batch_size == 0 {
            bail!("Batch size must be at least 1");
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(source);

        let headers = reader
            .headers()
            .context("Unable to read CSV headers")?
            .clone();
        if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
            return Err(anyhow!("Input has no header row"));
        }

        Ok(Self {
            reader,
            headers: Arc::new(headers),
            options,
            offset: 0,
            rows_after_skip: 0,
            malformed_total: 0,
            next_index: 0,
            skipped: false,
            finished: false,
        })
    }

    pub fn headers(&self) -> &StringRecord {
        &self.headers
    }

    /// Data rows consumed so far, including skipped and malformed rows
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn malformed_rows(&self) -> u64 {
        self.malformed_total
    }

    /// Bytes consumed from the (decompressed) input stream
    pub fn bytes_read(&self) -> u64 {
        self.reader.position().byte()
    }

    fn read_record(&mut self) -> Result<RawRead> {
        let mut record = ByteRecord::new();
        match self.reader.read_byte_record(&mut record) {
            Ok(true) => Ok(RawRead::Record(record)),
            Ok(false) => Ok(RawRead::Eof),
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                Err(anyhow::Error::new(e).context("Failed to read from input"))
            }
            Err(e) => {
                debug!("Unparseable record after row {}: {}", self.offset, e);
                Ok(RawRead::Unparseable)
            }
        }
    }

    fn skip_leading_rows(&mut self) -> Result<()> {
        self.skipped = true;
        while self.offset < self.options.skip_rows {
            if let RawRead::Eof = self.read_record()? {
                break;
            }
            self.offset += 1;
        }
        Ok(())
    }

    fn limit_reached(&self) -> bool {
        self.options
            .max_rows
            .map_or(false, |max| self.rows_after_skip >= max)
    }

    fn next_batch(&mut self) -> Result<Option<Batch>> {
        if !self.skipped {
            self.skip_leading_rows()?;
        }

        let start_offset = self.offset;
        let mut rows = Vec::with_capacity(self.options.batch_size);
        let mut consumed = 0u64;
        let mut malformed = 0u64;

        while (consumed as usize) < self.options.batch_size {
            if self.limit_reached() {
                self.finished = true;
                break;
            }

            let read = self.read_record()?;
            if let RawRead::Eof = read {
                self.finished = true;
                break;
            }

            self.offset += 1;
            self.rows_after_skip += 1;
            consumed += 1;

            let record = match read {
                RawRead::Record(record) => record,
                _ => {
                    malformed += 1;
                    continue;
                }
            };

            if record.len() != self.headers.len() {
                debug!(
                    "Skipping row {}: expected {} columns, found {}",
                    self.offset,
                    self.headers.len(),
                    record.len()
                );
                malformed += 1;
                continue;
            }

            match StringRecord::from_byte_record(record) {
                Ok(record) => rows.push(RawRow {
                    headers: Arc::clone(&self.headers),
                    record,
                    row_number: self.offset,
                }),
                Err(e) => {
                    debug!("Skipping row {}: invalid UTF-8 ({})", self.offset, e.utf8_error());
                    malformed += 1;
                }
            }
        }

        self.malformed_total += malformed;

        if consumed == 0 {
            self.finished = true;
            return Ok(None);
        }

        let batch = Batch {
            index: self.next_index,
            start_offset,
            rows_consumed: consumed,
            malformed,
            rows,
        };
        self.next_index += 1;
        Ok(Some(batch))
    }
}

impl Iterator for BatchReader {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_batch() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => None,
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    fn reader_over(content: &[u8], options: ReaderOptions) -> BatchReader {
        BatchReader::from_reader(Box::new(Cursor::new(content.to_vec())), options).unwrap()
    }

    fn options(batch_size: usize) -> ReaderOptions {
        ReaderOptions {
            batch_size,
            ..ReaderOptions::default()
        }
    }

    fn row_ids(batches: &[Batch]) -> Vec<String> {
        batches
            .iter()
            .flat_map(|b| b.rows.iter().map(|r| r.by_name("id").unwrap().to_string()))
            .collect()
    }

    #[test]
    fn test_batches_preserve_file_order() {
        let csv = b"id,title\n1,a\n2,b\n3,c\n4,d\n5,e\n";
        let batches: Vec<Batch> = reader_over(csv, options(2)).map(|b| b.unwrap()).collect();

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].rows.len(), 2);
        assert_eq!(batches[2].rows.len(), 1);
        assert_eq!(batches[2].index, 2);
        assert_eq!(batches[1].start_offset, 2);
        assert_eq!(batches[2].end_offset(), 5);
        assert_eq!(row_ids(&batches), vec!["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn test_wrong_column_count_is_skipped_and_counted() {
        let csv = b"id,title\n1,a\n2,b,extra\n3\n4,d\n";
        let mut reader = reader_over(csv, options(10));
        let batch = reader.next().unwrap().unwrap();

        assert_eq!(batch.rows_consumed, 4);
        assert_eq!(batch.malformed, 2);
        assert_eq!(row_ids(&[batch]), vec!["1", "4"]);
        assert_eq!(reader.malformed_rows(), 2);
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_invalid_utf8_is_skipped_and_counted() {
        let mut csv = b"id,title\n1,ok\n2,".to_vec();
        csv.extend_from_slice(&[0xff, 0xfe]);
        csv.extend_from_slice(b"\n3,fine\n");

        let batches: Vec<Batch> = reader_over(&csv, options(10)).map(|b| b.unwrap()).collect();
        assert_eq!(row_ids(&batches), vec!["1", "3"]);
        assert_eq!(batches[0].malformed, 1);
    }

    #[test]
    fn test_skip_rows_fast_forwards() {
        let csv = b"id,title\n1,a\n2,b\n3,c\n4,d\n";
        let mut reader = reader_over(
            csv,
            ReaderOptions {
                batch_size: 10,
                skip_rows: 2,
                max_rows: None,
            },
        );
        let batch = reader.next().unwrap().unwrap();

        assert_eq!(batch.start_offset, 2);
        assert_eq!(row_ids(&[batch]), vec!["3", "4"]);
        assert_eq!(reader.offset(), 4);
    }

    #[test]
    fn test_skip_past_end_yields_nothing() {
        let csv = b"id,title\n1,a\n";
        let mut reader = reader_over(
            csv,
            ReaderOptions {
                batch_size: 10,
                skip_rows: 5,
                max_rows: None,
            },
        );
        assert!(reader.next().is_none());
        assert_eq!(reader.offset(), 1);
    }

    #[test]
    fn test_max_rows_cutoff() {
        let csv = b"id,title\n1,a\n2,b\n3,c\n4,d\n";
        let reader = reader_over(
            csv,
            ReaderOptions {
                batch_size: 2,
                skip_rows: 1,
                max_rows: Some(2),
            },
        );
        let batches: Vec<Batch> = reader.map(|b| b.unwrap()).collect();
        assert_eq!(row_ids(&batches), vec!["2", "3"]);
    }

    #[test]
    fn test_row_accessors() {
        let csv = b"pmid,title\n100,Some paper\n";
        let mut reader = reader_over(csv, options(1));
        let batch = reader.next().unwrap().unwrap();
        let row = &batch.rows[0];

        assert_eq!(row.get(0), Some("100"));
        assert_eq!(row.by_name("title"), Some("Some paper"));
        assert_eq!(row.by_name("missing"), None);
        assert_eq!(row.row_number(), 1);
        let pairs: Vec<(&str, &str)> = row.iter().collect();
        assert_eq!(pairs, vec![("pmid", "100"), ("title", "Some paper")]);
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let result = BatchReader::from_reader(Box::new(Cursor::new(b"id\n1\n".to_vec())), options(0));
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_input_has_no_header() {
        let result = BatchReader::from_reader(Box::new(Cursor::new(Vec::new())), options(10));
        assert!(result.is_err());
    }

    #[test]
    fn test_open_gzipped_file() {
        let file = tempfile::Builder::new().suffix(".csv.gz").tempfile().unwrap();
        let mut encoder = GzEncoder::new(file.reopen().unwrap(), Compression::default());
        encoder.write_all(b"id,title\n1,a\n2,b\n").unwrap();
        encoder.finish().unwrap();

        let batches: Vec<Batch> = BatchReader::open(file.path(), options(10))
            .unwrap()
            .map(|b| b.unwrap())
            .collect();
        assert_eq!(row_ids(&batches), vec!["1", "2"]);
    }

    #[test]
    fn test_open_missing_file_fails() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().with_extension("does-not-exist");
        assert!(BatchReader::open(&path, options(10)).is_err());
    }
}
