mod features;

pub use features::{FilterParams, ServeMatch, SideStats, derive_serve_matches};

use crate::{Error, Result};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};

pub const TOUR_PATTERN: &str = "atp_matches_????.csv";
pub const CHALLENGER_PATTERN: &str = "atp_matches_qual_chall_????.csv";
const DATA_SOURCE_URL: &str = "https://github.com/JeffSackmann/tennis_atp";

/// One row of a Jeff Sackmann style match file. Columns that aren't named
/// here are ignored, and empty count fields deserialize as `None`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MatchRecord {
    #[serde(default)]
    pub tourney_id: String,
    #[serde(default)]
    pub tourney_name: String,
    #[serde(default)]
    pub tourney_level: String,
    pub tourney_date: String,
    pub winner_name: String,
    pub loser_name: String,
    pub w_svpt: Option<u32>,
    #[serde(rename = "w_1stWon")]
    pub w_first_won: Option<u32>,
    #[serde(rename = "w_2ndWon")]
    pub w_second_won: Option<u32>,
    pub l_svpt: Option<u32>,
    #[serde(rename = "l_1stWon")]
    pub l_first_won: Option<u32>,
    #[serde(rename = "l_2ndWon")]
    pub l_second_won: Option<u32>,
}

/// Shell-style file name matching supporting `?` and `*`.
pub fn matches_pattern(pattern: &str, name: &str) -> bool {
    fn go(pat: &[char], name: &[char]) -> bool {
        match pat.split_first() {
            None => name.is_empty(),
            Some(('*', rest)) => (0..=name.len()).any(|skip| go(rest, &name[skip..])),
            Some(('?', rest)) => !name.is_empty() && go(rest, &name[1..]),
            Some((c, rest)) => name.first() == Some(c) && go(rest, &name[1..]),
        }
    }
    let pat: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    go(&pat, &name)
}

/// Lists the files in `dir` whose names match `pattern`, in sorted order.
pub fn find_match_files(dir: impl AsRef<Path>, pattern: &str) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        // A missing directory is reported the same way as an empty one
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
        Err(err) => return Err(err.into()),
    };
    let mut files = vec![];
    for entry in entries {
        let path = entry?.path();
        let is_match = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| matches_pattern(pattern, name));
        if is_match && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub fn read_match_file(path: impl AsRef<Path>) -> Result<Vec<MatchRecord>> {
    let records = csv::Reader::from_path(path.as_ref())?
        .deserialize()
        .collect::<std::result::Result<Vec<MatchRecord>, _>>()?;
    tracing::debug!("Read {} matches from {:?}", records.len(), path.as_ref());
    Ok(records)
}

/// Reads and concatenates every match file in `dir`. The challenger tier is
/// appended after the tour-level files when requested. Overlapping files are
/// not deduplicated.
pub fn load_matches(dir: impl AsRef<Path>, include_challengers: bool) -> Result<Vec<MatchRecord>> {
    let dir = dir.as_ref();
    let mut files = find_match_files(dir, TOUR_PATTERN)?;
    if files.is_empty() {
        tracing::error!(
            "No files matching {} were found in {:?}. Please clone {} into that directory \
             (or pass its location with --tennis_atp_dir).",
            TOUR_PATTERN,
            dir,
            DATA_SOURCE_URL
        );
        return Err(Error::DataNotFound {
            dir: dir.to_path_buf(),
            pattern: TOUR_PATTERN.to_string(),
        });
    }
    if include_challengers {
        let challenger_files = find_match_files(dir, CHALLENGER_PATTERN)?;
        tracing::info!("Including {} challenger files", challenger_files.len());
        files.extend(challenger_files);
    }
    tracing::info!("Found {} match files at {:?}", files.len(), dir);

    let mut records = vec![];
    for file in &files {
        records.extend(read_match_file(file)?);
    }
    Ok(records)
}

pub fn write_to_json<T: Serialize + ?Sized>(value: &T, path: impl AsRef<Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path.as_ref(), json)?;
    Ok(())
}

pub fn write_to_csv<T: Serialize>(values: &[T], path: impl AsRef<Path>) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    for val in values {
        writer.serialize(val)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes `values` as JSON or CSV depending on the file extension.
pub fn write_slice_to_file<T: Serialize>(values: &[T], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => write_to_json(values, path)?,
        Some("csv") => write_to_csv(values, path)?,
        _ => {
            return Err(Error::Config(format!(
                "invalid or missing filename extension: {:?}",
                path
            )));
        }
    }
    tracing::info!("Successfully wrote to {:?}", path);
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}
