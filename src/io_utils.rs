//! I/O helpers shared by the local stores and the container extractor.
//!
//! - **Text decoding**: container parts are decoded leniently through
//!   `encoding_rs`, honouring a byte-order mark and replacing malformed
//!   sequences instead of failing.
//! - **CSV**: ledger tabs are stored as CSV through `open_csv_reader` /
//!   `open_csv_writer`, with flexible row lengths so ragged ledgers load.

use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};
use sha2::{Digest, Sha256};

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

/// Decodes markup bytes without ever failing. A BOM selects the encoding;
/// otherwise UTF-8 is assumed and malformed sequences are replaced.
pub fn decode_lossy(bytes: &[u8]) -> String {
    let (text, _, _) = UTF_8.decode(bytes);
    text.into_owned()
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Vec<String> {
    record
        .iter()
        .map(|field| {
            let (text, _, _) = encoding.decode(field);
            text.into_owned()
        })
        .collect()
}

pub fn open_csv_reader<R>(reader: R) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn read_csv_rows(path: &Path, encoding: &'static Encoding) -> Result<Vec<Vec<String>>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).with_context(|| format!("Opening ledger file {path:?}"))?;
    let mut reader = open_csv_reader(BufReader::new(file));
    let mut rows = Vec::new();
    for (idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {} in {path:?}", idx + 1))?;
        rows.push(decode_record(&record, encoding));
    }
    Ok(rows)
}

/// CSV writer over `writer`. Output is transcoded into `encoding` unless it
/// is UTF-8, so files read back with the same encoding round-trip.
pub fn open_csv_writer<W>(writer: W, encoding: &'static Encoding) -> csv::Writer<TranscodingWriter<W>>
where
    W: Write,
{
    let mut builder = csv::WriterBuilder::new();
    builder
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true)
        .flexible(true);
    builder.from_writer(TranscodingWriter::new(writer, encoding))
}

fn write_rows_to<W: Write>(writer: W, rows: &[Vec<String>], encoding: &'static Encoding) -> Result<()> {
    let mut csv_writer = open_csv_writer(writer, encoding);
    for (idx, row) in rows.iter().enumerate() {
        csv_writer
            .write_record(row.iter())
            .with_context(|| format!("Writing ledger row {}", idx + 1))?;
    }
    csv_writer.flush().context("Flushing ledger writer")?;
    Ok(())
}

/// Writes rows to a sibling temp file and renames it over `path`, so readers
/// observe either the old or the new content.
pub fn replace_csv_rows(path: &Path, rows: &[Vec<String>], encoding: &'static Encoding) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| anyhow!("Ledger path {path:?} has no parent directory"))?;
    fs::create_dir_all(dir).with_context(|| format!("Creating ledger directory {dir:?}"))?;
    let mut staged = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Staging replacement for {path:?}"))?;
    write_rows_to(BufWriter::new(staged.as_file_mut()), rows, encoding)?;
    staged
        .persist(path)
        .map_err(|err| anyhow!("Replacing {path:?}: {}", err.error))?;
    Ok(())
}

/// Re-encodes the UTF-8 produced by the CSV writer. A multi-byte sequence
/// split across writes is held back until its remaining bytes arrive.
pub struct TranscodingWriter<W: Write> {
    inner: W,
    encoding: &'static Encoding,
    pending: Vec<u8>,
}

impl<W: Write> TranscodingWriter<W> {
    fn new(inner: W, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            encoding,
            pending: Vec::new(),
        }
    }

    fn encode_complete(&mut self, at_end: bool) -> io::Result<()> {
        let complete = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(err) if err.error_len().is_some() => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "Invalid UTF-8 in ledger output",
                ));
            }
            Err(_) if at_end => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "Truncated UTF-8 at end of ledger output",
                ));
            }
            Err(err) => err.valid_up_to(),
        };
        if complete == 0 {
            return Ok(());
        }
        let tail = self.pending.split_off(complete);
        let text = String::from_utf8(std::mem::replace(&mut self.pending, tail))
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        let (encoded, _, had_errors) = self.encoding.encode(&text);
        if had_errors {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Ledger text cannot be represented in {}", self.encoding.name()),
            ));
        }
        self.inner.write_all(&encoded)
    }
}

impl<W: Write> Write for TranscodingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.encoding == UTF_8 {
            return self.inner.write(buf);
        }
        self.pending.extend_from_slice(buf);
        self.encode_complete(false)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encode_complete(true)?;
        self.inner.flush()
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
