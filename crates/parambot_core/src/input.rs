use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Which cells of a row a transform applies to. Out-of-bounds indices are
/// ignored so a short row never fails a whole load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Columns {
    All,
    Indices(Vec<usize>),
}

impl Columns {
    fn selects(&self, index: usize) -> bool {
        match self {
            Self::All => true,
            Self::Indices(indices) => indices.contains(&index),
        }
    }
}

/// Cell-level cleanup applied while loading. Each transform receives the
/// previous transform's output.
#[derive(Debug, Clone)]
pub enum CellTransform {
    UnescapeHtml(Columns),
    TrimWhitespace(Columns),
}

impl CellTransform {
    fn apply(&self, row: &mut [String]) {
        match self {
            Self::UnescapeHtml(columns) => {
                for (index, cell) in row.iter_mut().enumerate() {
                    if columns.selects(index) {
                        *cell = unescape_html(cell);
                    }
                }
            }
            Self::TrimWhitespace(columns) => {
                for (index, cell) in row.iter_mut().enumerate() {
                    if columns.selects(index) {
                        *cell = cell.trim().to_string();
                    }
                }
            }
        }
    }
}

/// External input data for one run, loaded once and read-only afterwards.
/// The first column is the page-title key by convention.
#[derive(Debug, Clone, Default)]
pub struct InputTable {
    rows: Vec<Vec<String>>,
}

impl InputTable {
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn page_titles(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.first().cloned())
            .collect()
    }

    /// First row whose first column equals the page title; first match wins.
    pub fn match_title(&self, title: &str) -> Option<&[String]> {
        self.rows
            .iter()
            .find(|row| row.first().is_some_and(|cell| cell == title))
            .map(Vec::as_slice)
    }
}

pub fn load_csv(
    path: &Path,
    skip_header: bool,
    transforms: &[CellTransform],
) -> Result<InputTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open input file {}", path.display()))?;

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record
            .with_context(|| format!("failed to read row {} of {}", index + 1, path.display()))?;
        if skip_header && index == 0 {
            continue;
        }
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        for transform in transforms {
            transform.apply(&mut row);
        }
        rows.push(row);
    }

    Ok(InputTable { rows })
}

/// Durable provenance copy of the input file taken before any page is
/// touched, named after the run timestamp.
#[derive(Debug, Clone)]
pub struct InputSnapshot {
    pub copy_path: PathBuf,
    pub sha256: String,
}

pub fn snapshot_input(input_path: &Path, copy_dir: &Path, timestamp: &str) -> Result<InputSnapshot> {
    let content = fs::read(input_path)
        .with_context(|| format!("failed to read input file {}", input_path.display()))?;
    fs::create_dir_all(copy_dir)
        .with_context(|| format!("failed to create {}", copy_dir.display()))?;

    let extension = input_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("csv");
    let copy_path = copy_dir.join(format!("{timestamp}.{extension}"));
    fs::write(&copy_path, &content)
        .with_context(|| format!("failed to write {}", copy_path.display()))?;

    let digest = Sha256::digest(&content);
    let mut sha256 = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        sha256.push_str(&format!("{byte:02x}"));
    }

    Ok(InputSnapshot { copy_path, sha256 })
}

/// Named entities plus decimal/hex numeric references. Anything that does
/// not parse stays as written.
pub fn unescape_html(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(position) = rest.find('&') {
        out.push_str(&rest[..position]);
        rest = &rest[position..];
        match entity_at(rest) {
            Some((decoded, consumed)) => {
                out.push(decoded);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn entity_at(text: &str) -> Option<(char, usize)> {
    let end = text.find(';')?;
    if end < 2 || end > 10 {
        return None;
    }
    let body = &text[1..end];
    let decoded = match body {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        _ => {
            let code = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else if let Some(decimal) = body.strip_prefix('#') {
                decimal.parse::<u32>().ok()?
            } else {
                return None;
            };
            char::from_u32(code)?
        }
    };
    Some((decoded, end + 1))
}
