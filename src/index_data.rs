//! Reader and writer for Maven index data files (`nexus-maven-repository-index*.gz`).
//!
//! A data file is a gzip stream holding:
//!
//! - one version byte (only version 1 exists)
//! - the index timestamp as a big-endian i64 of epoch millis, `-1` when unset
//! - documents until end of stream; each is a big-endian i32 field count
//!   followed by `(flags: u8, name: u16-length string, value: i32-length string)`
//!
//! Strings use Java's modified UTF-8. Artifact documents carry `u`
//! (`group|artifact|version|classifier-or-NA[|extension]`) and `i`
//! (`packaging-or-NA|lastModified|size|...`); incremental chunks announce
//! removals with a `del` field holding the removed `u` value. Descriptor and
//! group-list documents are skipped.

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::collections::HashMap;
use std::io::{self, BufReader, Read, Write};

use crate::index::{ArtifactRecord, IndexDocument};

pub const INDEX_DATA_VERSION: u8 = 1;

pub const FIELD_UINFO: &str = "u";
pub const FIELD_INFO: &str = "i";
pub const FIELD_MODIFIED: &str = "m";
pub const FIELD_DELETED: &str = "del";

const NOT_AVAILABLE: &str = "NA";
const FIELD_SEPARATOR: char = '|';

const FLAG_INDEXED: u8 = 0x01;
const FLAG_STORED: u8 = 0x04;

pub type RawDocument = HashMap<String, String>;

pub struct IndexDataReader<R: Read> {
    input: BufReader<GzDecoder<R>>,
    timestamp: Option<DateTime<Utc>>,
    finished: bool,
}

impl<R: Read> IndexDataReader<R> {
    pub fn new(source: R) -> io::Result<Self> {
        let mut input = BufReader::new(GzDecoder::new(source));
        let version = read_u8(&mut input)?;
        if version != INDEX_DATA_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported index data version {version}"),
            ));
        }
        let millis = read_i64(&mut input)?;
        let timestamp = if millis == -1 {
            None
        } else {
            DateTime::from_timestamp_millis(millis)
        };
        Ok(Self {
            input,
            timestamp,
            finished: false,
        })
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// Next raw document, or `None` at a clean end of stream. End of stream
    /// is only clean between documents; the gzip trailer is verified on the way.
    pub fn read_document(&mut self) -> io::Result<Option<RawDocument>> {
        let mut count = [0u8; 4];
        loop {
            match self.input.read(&mut count[..1]) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        self.input.read_exact(&mut count[1..])?;
        let count = i32::from_be_bytes(count);
        if count < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("negative field count {count}"),
            ));
        }

        let mut doc = RawDocument::with_capacity(count as usize);
        for _ in 0..count {
            let _flags = read_u8(&mut self.input)?;
            let name_len = read_u16(&mut self.input)? as usize;
            let name = read_java_utf(&mut self.input, name_len)?;
            let value_len = read_i32(&mut self.input)?;
            if value_len < 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("negative value length for field {name}"),
                ));
            }
            let value = read_java_utf(&mut self.input, value_len as usize)?;
            doc.insert(name, value);
        }
        Ok(Some(doc))
    }
}

impl<R: Read> Iterator for IndexDataReader<R> {
    type Item = io::Result<IndexDocument>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            match self.read_document() {
                Ok(Some(raw)) => {
                    if let Some(doc) = to_index_document(&raw) {
                        return Some(Ok(doc));
                    }
                }
                Ok(None) => {
                    self.finished = true;
                    return None;
                }
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

/// Maps a raw document to an artifact or a deletion; anything else is `None`.
pub fn to_index_document(raw: &RawDocument) -> Option<IndexDocument> {
    if let Some(uinfo) = raw.get(FIELD_UINFO) {
        let record = parse_artifact(uinfo, raw.get(FIELD_INFO), raw.get(FIELD_MODIFIED))?;
        return Some(IndexDocument::Artifact {
            uinfo: uinfo.clone(),
            record,
        });
    }
    raw.get(FIELD_DELETED).map(|uinfo| IndexDocument::Deleted {
        uinfo: uinfo.clone(),
    })
}

fn parse_artifact(
    uinfo: &str,
    info: Option<&String>,
    modified: Option<&String>,
) -> Option<ArtifactRecord> {
    let mut parts = uinfo.split(FIELD_SEPARATOR);
    let group_id = parts.next().filter(|s| !s.is_empty())?.to_string();
    let artifact_id = parts.next().filter(|s| !s.is_empty())?.to_string();
    let version = parts.next().filter(|s| !s.is_empty())?.to_string();
    let classifier = available(parts.next());
    let extension = available(parts.next());

    let mut info_parts = info.map(|i| i.split(FIELD_SEPARATOR));
    let packaging = available(info_parts.as_mut().and_then(|p| p.next()));
    let last_modified = info_parts
        .as_mut()
        .and_then(|p| p.next())
        .and_then(|v| v.parse::<i64>().ok())
        .or_else(|| modified.and_then(|m| m.parse::<i64>().ok()))
        .unwrap_or(0);

    Some(ArtifactRecord {
        group_id,
        artifact_id,
        version,
        packaging,
        classifier,
        extension,
        last_modified,
    })
}

fn available(value: Option<&str>) -> Option<String> {
    value
        .filter(|v| !v.is_empty() && *v != NOT_AVAILABLE)
        .map(str::to_string)
}

/// `u` value for a record, as the index producer writes it.
pub fn uinfo_for(record: &ArtifactRecord) -> String {
    let mut uinfo = format!(
        "{}|{}|{}|{}",
        record.group_id,
        record.artifact_id,
        record.version,
        record.classifier.as_deref().unwrap_or(NOT_AVAILABLE)
    );
    if let Some(ext) = &record.extension {
        uinfo.push(FIELD_SEPARATOR);
        uinfo.push_str(ext);
    }
    uinfo
}

pub struct IndexDataWriter<W: Write> {
    out: GzEncoder<W>,
}

impl<W: Write> IndexDataWriter<W> {
    pub fn new(sink: W, timestamp: Option<DateTime<Utc>>) -> io::Result<Self> {
        let mut out = GzEncoder::new(sink, Compression::default());
        out.write_all(&[INDEX_DATA_VERSION])?;
        let millis = timestamp.map(|t| t.timestamp_millis()).unwrap_or(-1);
        out.write_all(&millis.to_be_bytes())?;
        Ok(Self { out })
    }

    pub fn write_document(&mut self, fields: &[(&str, &str)]) -> io::Result<()> {
        self.out.write_all(&(fields.len() as i32).to_be_bytes())?;
        for (name, value) in fields {
            self.out.write_all(&[FLAG_INDEXED | FLAG_STORED])?;
            let name = encode_java_utf(name);
            let name_len = u16::try_from(name.len()).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidInput, "field name too long")
            })?;
            self.out.write_all(&name_len.to_be_bytes())?;
            self.out.write_all(&name)?;
            let value = encode_java_utf(value);
            let value_len = i32::try_from(value.len()).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidInput, "field value too long")
            })?;
            self.out.write_all(&value_len.to_be_bytes())?;
            self.out.write_all(&value)?;
        }
        Ok(())
    }

    pub fn write_artifact(&mut self, uinfo: &str, record: &ArtifactRecord) -> io::Result<()> {
        let info = format!(
            "{}|{}|-1|0|0|0",
            record.packaging.as_deref().unwrap_or(NOT_AVAILABLE),
            record.last_modified
        );
        let modified = record.last_modified.to_string();
        self.write_document(&[
            (FIELD_UINFO, uinfo),
            (FIELD_MODIFIED, &modified),
            (FIELD_INFO, &info),
        ])
    }

    pub fn write_deletion(&mut self, uinfo: &str) -> io::Result<()> {
        let modified = Utc::now().timestamp_millis().to_string();
        self.write_document(&[(FIELD_DELETED, uinfo), (FIELD_MODIFIED, &modified)])
    }

    pub fn finish(self) -> io::Result<W> {
        self.out.finish()
    }
}

fn read_u8(input: &mut impl Read) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    input.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u16(input: &mut impl Read) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    input.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

fn read_i32(input: &mut impl Read) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

fn read_i64(input: &mut impl Read) -> io::Result<i64> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(i64::from_be_bytes(buf))
}

fn read_java_utf(input: &mut impl Read, len: usize) -> io::Result<String> {
    let mut bytes = vec![0u8; len];
    input.read_exact(&mut bytes)?;
    decode_java_utf(&bytes)
}

/// Decodes Java's modified UTF-8: UTF-16 code units packed as 1-3 byte
/// sequences, NUL written as `C0 80`, supplementary characters as surrogate pairs.
pub fn decode_java_utf(bytes: &[u8]) -> io::Result<String> {
    if bytes.is_ascii() {
        return Ok(bytes.iter().map(|b| *b as char).collect());
    }

    let malformed = || io::Error::new(io::ErrorKind::InvalidData, "malformed modified UTF-8");
    let continuation = |b: Option<&u8>| match b {
        Some(b) if b & 0xC0 == 0x80 => Ok(u16::from(b & 0x3F)),
        _ => Err(malformed()),
    };

    let mut units = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while idx < bytes.len() {
        let b = bytes[idx];
        if b & 0x80 == 0 {
            units.push(u16::from(b));
            idx += 1;
        } else if b & 0xE0 == 0xC0 {
            let low = continuation(bytes.get(idx + 1))?;
            units.push((u16::from(b & 0x1F) << 6) | low);
            idx += 2;
        } else if b & 0xF0 == 0xE0 {
            let mid = continuation(bytes.get(idx + 1))?;
            let low = continuation(bytes.get(idx + 2))?;
            units.push((u16::from(b & 0x0F) << 12) | (mid << 6) | low);
            idx += 3;
        } else {
            return Err(malformed());
        }
    }
    Ok(String::from_utf16_lossy(&units))
}

pub fn encode_java_utf(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}
