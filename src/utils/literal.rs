//! Feature list and weights files
//!
//! A feature is written as a Rust byte-string literal, `b"ab\x00"`, so
//! arbitrary bytes survive a round trip through a line-oriented text file.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use crate::{
    error::{IoResultExt, LangIdError, Result},
    Feature,
};

/// Render bytes as a `b"..."` literal
pub fn to_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 3);
    out.push_str("b\"");
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{b:02x}")),
        }
    }
    out.push('"');
    out
}

/// Parse a literal produced by [`to_literal`]
pub fn parse_literal(text: &str) -> Result<Feature> {
    let body = text
        .trim()
        .strip_prefix("b\"")
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| LangIdError::corrupt(format!("not a byte literal: {text}")))?;
    let raw = body.as_bytes();
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let b = raw[i];
        if b != b'\\' {
            out.push(b);
            i += 1;
            continue;
        }
        let esc = *raw
            .get(i + 1)
            .ok_or_else(|| LangIdError::corrupt(format!("dangling escape in {text}")))?;
        match esc {
            b'\\' => out.push(b'\\'),
            b'"' => out.push(b'"'),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'0' => out.push(0),
            b'x' => {
                let hex = raw
                    .get(i + 2..i + 4)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| LangIdError::corrupt(format!("bad \\x escape in {text}")))?;
                out.push(hex);
                i += 2;
            }
            other => {
                return Err(LangIdError::corrupt(format!(
                    "unknown escape \\{} in {text}",
                    other as char
                )))
            }
        }
        i += 2;
    }
    Ok(out.into_boxed_slice())
}

/// Write one feature literal per line
pub fn write_features(path: &Path, features: &[Feature]) -> Result<()> {
    let file = File::create(path).at(path)?;
    let mut writer = BufWriter::new(file);
    for feature in features {
        writeln!(writer, "{}", to_literal(feature)).at(path)?;
    }
    writer.flush().at(path)
}

pub fn read_features(path: &Path) -> Result<Vec<Feature>> {
    let file = File::open(path).at(path)?;
    let mut features = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.at(path)?;
        if line.trim().is_empty() {
            continue;
        }
        features.push(parse_literal(&line)?);
    }
    Ok(features)
}

/// Weights CSV: column 0 the feature literal, then the weight vector
pub fn write_weights(path: &Path, weights: &[(Feature, Vec<f64>)]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    for (feature, vector) in weights {
        let mut record = Vec::with_capacity(vector.len() + 1);
        record.push(to_literal(feature));
        record.extend(vector.iter().map(|w| w.to_string()));
        writer.write_record(&record)?;
    }
    writer.flush().at(path)
}

pub fn read_weights(path: &Path) -> Result<Vec<(Feature, Vec<f64>)>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut weights = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut fields = record.iter();
        let feature = match fields.next() {
            Some(f) => parse_literal(f)?,
            None => continue,
        };
        let vector = fields
            .map(|f| {
                f.parse::<f64>()
                    .map_err(|e| LangIdError::corrupt(format!("bad weight {f:?}: {e}")))
            })
            .collect::<Result<Vec<f64>>>()?;
        weights.push((feature, vector));
    }
    Ok(weights)
}
