use super::MatchRecord;
use crate::{Error, Result};
use chrono::{Datelike, NaiveDate};

/// Serve statistics of one participant in one match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SideStats {
    pub first_won: u32,
    pub second_won: u32,
    /// Always `first_won + second_won`.
    pub svpt_won: u32,
    pub svpt: u32,
}

impl SideStats {
    fn from_counts(first_won: Option<u32>, second_won: Option<u32>, svpt: Option<u32>) -> Option<Self> {
        let (first_won, second_won, svpt) = (first_won?, second_won?, svpt?);
        Some(Self {
            first_won,
            second_won,
            svpt_won: first_won + second_won,
            svpt,
        })
    }

    fn is_consistent(&self) -> bool {
        self.svpt_won <= self.svpt
    }
}

/// A match that survived filtering, with every count needed by the model.
#[derive(Clone, Debug, PartialEq)]
pub struct ServeMatch {
    pub date: NaiveDate,
    pub tourney_name: String,
    pub tourney_level: String,
    pub winner_name: String,
    pub loser_name: String,
    pub winner: SideStats,
    pub loser: SideStats,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FilterParams {
    /// Inclusive lower bound on the match year.
    pub start_year: i32,
    /// Tournament level code to drop entirely, e.g. "D" for Davis Cup.
    pub exclude_tourney_level: Option<String>,
}

impl FilterParams {
    pub fn from_year(start_year: i32) -> Self {
        Self {
            start_year,
            exclude_tourney_level: None,
        }
    }
}

fn parse_tourney_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y%m%d")
        .map_err(|err| Error::Parse(format!("tourney_date {:?}: {}", raw, err)))
}

/// Turns raw records into the filtered, chronologically sorted match list.
/// Incomplete records are dropped rather than imputed.
pub fn derive_serve_matches(records: &[MatchRecord], params: &FilterParams) -> Result<Vec<ServeMatch>> {
    let (mut incomplete, mut inconsistent) = (0usize, 0usize);
    let mut matches = Vec::with_capacity(records.len());

    for record in records {
        let winner = SideStats::from_counts(record.w_first_won, record.w_second_won, record.w_svpt);
        let loser = SideStats::from_counts(record.l_first_won, record.l_second_won, record.l_svpt);
        let (Some(winner), Some(loser)) = (winner, loser) else {
            incomplete += 1;
            continue;
        };

        let date = parse_tourney_date(&record.tourney_date)?;
        if date.year() < params.start_year {
            continue;
        }
        if params.exclude_tourney_level.as_deref() == Some(record.tourney_level.as_str()) {
            continue;
        }
        if !winner.is_consistent() || !loser.is_consistent() {
            inconsistent += 1;
            continue;
        }

        matches.push(ServeMatch {
            date,
            tourney_name: record.tourney_name.clone(),
            tourney_level: record.tourney_level.clone(),
            winner_name: record.winner_name.clone(),
            loser_name: record.loser_name.clone(),
            winner,
            loser,
        });
    }

    // Stable, so matches on the same date keep their file order
    matches.sort_by_key(|m| m.date);

    tracing::debug!("Dropped {} records with missing serve counts", incomplete);
    if inconsistent > 0 {
        tracing::warn!(
            "Dropped {} records reporting more serve points won than served",
            inconsistent
        );
    }
    tracing::info!(
        "Kept {} of {} matches from {} onwards",
        matches.len(),
        records.len(),
        params.start_year
    );
    Ok(matches)
}
