use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::orchestrator::AnalysisReport;
use crate::types::{Prediction, TeamRating};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    pub predictions: usize,
    pub ratings: usize,
}

/// Writes a finished analysis as a workbook with `Predictions`, `Ratings` and `Summary` sheets.
pub fn export_predictions_xlsx(path: &Path, report: &AnalysisReport) -> Result<ExportSummary> {
    let mut prediction_rows = vec![header(&[
        "fixture_id",
        "kickoff",
        "round",
        "home_team",
        "away_team",
        "home_elo",
        "away_elo",
        "p_home",
        "p_draw",
        "p_away",
        "predicted",
        "confidence",
        "actual",
        "correct",
    ])];
    prediction_rows.extend(report.predictions.iter().map(prediction_row));

    let mut rating_rows = vec![header(&[
        "rank",
        "team_id",
        "team",
        "elo",
        "played",
        "points",
        "goals_for",
        "goals_against",
    ])];
    rating_rows.extend(
        report
            .model
            .team_ratings
            .iter()
            .enumerate()
            .map(|(idx, rating)| rating_row(idx + 1, rating)),
    );

    let model = &report.model;
    let v = &report.validation;
    let summary_rows = vec![
        header(&["field", "value"]),
        pair("league_id", model.league_id),
        pair("season_year", model.season_year),
        pair("predictor", &model.predictor),
        pair("created_at", model.created_at.to_rfc3339()),
        pair("total_matches", v.total_matches),
        pair("finished_matches", v.finished_matches),
        pair("correct_predictions", v.correct_predictions),
        pair("accuracy", format!("{:.4}", v.accuracy)),
        pair("brier", format!("{:.4}", v.brier)),
        pair("log_loss", format!("{:.4}", v.log_loss)),
        pair("context_matches", model.context_matches),
        pair("skipped_records", model.skipped.len()),
        pair("league_goals_base", format!("{:.3}", model.league.goals_total_base)),
        pair("league_home_adv", format!("{:.3}", model.league.home_adv_goals)),
        pair("league_dc_rho", format!("{:.3}", model.league.dc_rho)),
        pair("input_digest", &model.input_digest),
    ];

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Predictions")?;
        write_rows(sheet, &prediction_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Ratings")?;
        write_rows(sheet, &rating_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Summary")?;
        write_rows(sheet, &summary_rows)?;
    }

    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    Ok(ExportSummary {
        predictions: prediction_rows.len().saturating_sub(1),
        ratings: rating_rows.len().saturating_sub(1),
    })
}

fn prediction_row(p: &Prediction) -> Vec<String> {
    vec![
        p.fixture_id.to_string(),
        p.kickoff.to_rfc3339(),
        p.round.clone().unwrap_or_default(),
        p.home_team.clone(),
        p.away_team.clone(),
        format!("{:.1}", p.home_elo),
        format!("{:.1}", p.away_elo),
        format!("{:.4}", p.probs.home),
        format!("{:.4}", p.probs.draw),
        format!("{:.4}", p.probs.away),
        p.predicted.code().to_string(),
        format!("{:.4}", p.confidence),
        opt_to_string(p.actual_result.map(|o| o.code())),
        match p.is_correct {
            Some(true) => "yes".to_string(),
            Some(false) => "no".to_string(),
            None => String::new(),
        },
    ]
}

fn rating_row(rank: usize, r: &TeamRating) -> Vec<String> {
    vec![
        rank.to_string(),
        r.team_id.to_string(),
        r.name.clone(),
        format!("{:.1}", r.elo),
        r.played.to_string(),
        r.points.to_string(),
        r.goals_for.to_string(),
        r.goals_against.to_string(),
    ]
}

fn header(cols: &[&str]) -> Vec<String> {
    cols.iter().map(|c| c.to_string()).collect()
}

fn pair(field: &str, value: impl ToString) -> Vec<String> {
    vec![field.to_string(), value.to_string()]
}

fn opt_to_string<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}
