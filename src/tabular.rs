use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use csv::{ByteRecord, QuoteStyle, ReaderBuilder, WriterBuilder};
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;

use crate::error::KiraError;

/// Field separator of a known table kind. SRA RunInfo is comma separated,
/// ENA read_run and all merge outputs are tab separated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Tab,
}

impl Delimiter {
    fn byte(self) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Tab => b'\t',
        }
    }

    /// Tab tables carry quotes as plain data, both ways.
    fn quoted(self) -> bool {
        self == Delimiter::Comma
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

fn table_error(path: &Path, err: impl ToString) -> KiraError {
    KiraError::Table {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

/// Header-indexed reader over a delimited file, `.gz` aware. Invalid UTF-8 is
/// replaced rather than rejected.
pub struct Table {
    path: String,
    headers: Vec<String>,
    index: HashMap<String, usize>,
    reader: csv::Reader<Box<dyn Read>>,
    record: ByteRecord,
}

impl Table {
    pub fn open(path: &Path, delimiter: Delimiter) -> Result<Self, KiraError> {
        let file = File::open(path).map_err(|err| table_error(path, err))?;
        let input: Box<dyn Read> = if is_gzip(path) {
            Box::new(MultiGzDecoder::new(BufReader::new(file)))
        } else {
            Box::new(file)
        };
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter.byte())
            .quoting(delimiter.quoted())
            .flexible(true)
            .from_reader(input);
        let headers: Vec<String> = reader
            .byte_headers()
            .map_err(|err| table_error(path, err))?
            .iter()
            .map(|field| String::from_utf8_lossy(field).trim().to_string())
            .collect();
        let headers = if headers.iter().all(|header| header.is_empty()) {
            Vec::new()
        } else {
            headers
        };
        let index = headers
            .iter()
            .enumerate()
            .map(|(position, name)| (name.clone(), position))
            .collect();
        Ok(Self {
            path: path.display().to_string(),
            headers,
            index,
            reader,
            record: ByteRecord::new(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Empty when the file has no header line.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn require_columns(&self, required: &[&str]) -> Result<(), KiraError> {
        if self.headers.is_empty() {
            return Err(KiraError::EmptyTable(self.path.clone()));
        }
        let mut missing: Vec<String> = required
            .iter()
            .filter(|column| !self.index.contains_key(**column))
            .map(|column| column.to_string())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        missing.sort();
        Err(KiraError::MissingColumns {
            path: self.path.clone(),
            missing,
        })
    }

    pub fn next_row(&mut self) -> Result<Option<Vec<String>>, KiraError> {
        let has_row = self
            .reader
            .read_byte_record(&mut self.record)
            .map_err(|err| KiraError::Table {
                path: self.path.clone(),
                message: err.to_string(),
            })?;
        if !has_row {
            return Ok(None);
        }
        Ok(Some(
            self.record
                .iter()
                .map(|field| String::from_utf8_lossy(field).into_owned())
                .collect(),
        ))
    }

    /// Raw value of `column`, empty when the column or the cell is absent.
    pub fn value<'r>(&self, row: &'r [String], column: &str) -> &'r str {
        self.index
            .get(column)
            .and_then(|&position| row.get(position))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Trimmed value of `column`.
    pub fn field<'r>(&self, row: &'r [String], column: &str) -> &'r str {
        self.value(row, column).trim()
    }
}

pub enum TableOutput {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl TableOutput {
    pub fn create(path: &Path) -> Result<Self, KiraError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| table_error(path, err))?;
        }
        let file = BufWriter::new(File::create(path).map_err(|err| table_error(path, err))?);
        if is_gzip(path) {
            Ok(TableOutput::Gzip(GzEncoder::new(file, Compression::default())))
        } else {
            Ok(TableOutput::Plain(file))
        }
    }

    fn finish(self) -> io::Result<()> {
        match self {
            TableOutput::Plain(mut file) => file.flush(),
            TableOutput::Gzip(encoder) => encoder.finish()?.flush(),
        }
    }
}

impl Write for TableOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            TableOutput::Plain(file) => file.write(buf),
            TableOutput::Gzip(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            TableOutput::Plain(file) => file.flush(),
            TableOutput::Gzip(encoder) => encoder.flush(),
        }
    }
}

pub struct TableWriter {
    path: String,
    writer: csv::Writer<TableOutput>,
}

impl TableWriter {
    pub fn create(path: &Path, delimiter: Delimiter) -> Result<Self, KiraError> {
        let output = TableOutput::create(path)?;
        let writer = WriterBuilder::new()
            .delimiter(delimiter.byte())
            .quote_style(if delimiter.quoted() {
                QuoteStyle::Necessary
            } else {
                QuoteStyle::Never
            })
            .flexible(false)
            .from_writer(output);
        Ok(Self {
            path: path.display().to_string(),
            writer,
        })
    }

    pub fn write_row<I, T>(&mut self, row: I) -> Result<(), KiraError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.writer.write_record(row).map_err(|err| KiraError::Table {
            path: self.path.clone(),
            message: err.to_string(),
        })
    }

    /// Flushes and, for `.gz` outputs, writes the gzip trailer.
    pub fn finish(self) -> Result<(), KiraError> {
        let path = self.path;
        let output = self.writer.into_inner().map_err(|err| KiraError::Table {
            path: path.clone(),
            message: err.error().to_string(),
        })?;
        output.finish().map_err(|err| KiraError::Table {
            path,
            message: err.to_string(),
        })
    }
}

/// Lenient integer parse for count columns: blank or garbage is 0 and
/// decimal or exponent forms are truncated.
pub fn parse_count(value: &str) -> u64 {
    let value = value.trim();
    if value.is_empty() {
        return 0;
    }
    if let Ok(count) = value.parse::<u64>() {
        return count;
    }
    match value.parse::<f64>() {
        Ok(count) if count.is_finite() && count > 0.0 => count as u64,
        _ => 0,
    }
}
