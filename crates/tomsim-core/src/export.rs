//! CSV export of a finished experiment.
//!
//! The file holds one section per statistic, separated by blank lines:
//!
//! 1. Final tick.
//! 2. Population history (`ToM0, ToM1, ToM2`), sampled or boundary rows.
//! 3. Dominance frequency per order, as a fraction of `2 + tick`.
//! 4. Ages per order, one column each.
//! 5. Negotiation lengths per ordered pair, then the sample count.
//! 6. Negotiation ending codes per ordered pair.
//! 7. Score gains per ordered pair, each cell `seat0-seat1`.
//!
//! Shorter columns are padded with empty cells.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::config::{ExportConfig, HistoryMode};
use crate::stats::Statistics;

/// Header naming the nine ordered pairs.
const PAIR_HEADER: &str = "0-0,0-1,0-2,1-0,1-1,1-2,2-0,2-1,2-2";

/// Errors writing the export.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The file could not be created or written.
    #[error("failed to write export {path}: {source}")]
    Io {
        /// Target file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

/// Write the export for `stats` after `tick` ticks to the configured path.
///
/// # Errors
///
/// Returns [`ExportError::Io`] if the file cannot be created or written.
pub fn export(stats: &Statistics, tick: u64, config: &ExportConfig) -> Result<PathBuf, ExportError> {
    let path = config.path();
    let io_error = |source| ExportError::Io {
        path: path.clone(),
        source,
    };

    let file = File::create(&path).map_err(io_error)?;
    let mut writer = BufWriter::new(file);
    write_report(&mut writer, stats, tick, config).map_err(io_error)?;
    writer.flush().map_err(io_error)?;

    tracing::info!(path = %path.display(), tick, "results exported");
    Ok(path)
}

/// Render the export into any writer.
pub fn write_report<W: Write>(
    out: &mut W,
    stats: &Statistics,
    tick: u64,
    config: &ExportConfig,
) -> std::io::Result<()> {
    writeln!(out, "{tick}")?;

    writeln!(out)?;
    writeln!(out, "ToM0, ToM1, ToM2")?;
    write_history(out, stats, config)?;

    writeln!(out)?;
    writeln!(out, "Dominance frequency")?;
    let [d0, d1, d2] = stats.dominance();
    writeln!(
        out,
        "{},{},{}",
        fraction(d0, tick),
        fraction(d1, tick),
        fraction(d2, tick)
    )?;

    writeln!(out)?;
    writeln!(out, "Ages")?;
    write_columns(out, stats.ages(), |age| age.to_string())?;

    writeln!(out)?;
    writeln!(out, "Negotiation lengths")?;
    writeln!(out, "{PAIR_HEADER}")?;
    write_columns(out, stats.lengths(), |rounds| rounds.to_string())?;
    writeln!(out)?;
    writeln!(out, "{}", stats.negotiation_count())?;

    writeln!(out)?;
    writeln!(
        out,
        "Negotiation endings (-1: too long, 0: 0 withdrew, 1: 1 withdrew, 2: 0 accepted, 3: 1 accepted)"
    )?;
    writeln!(out, "{PAIR_HEADER}")?;
    write_columns(out, stats.endings(), |code| code.to_string())?;

    writeln!(out)?;
    writeln!(out, "Pi gains (left is seat 0, right is seat 1)")?;
    writeln!(out, "{PAIR_HEADER}")?;
    write_columns(out, stats.gains(), |[first, second]| {
        format!("{:.1}-{:.1}", f64::from(*first), f64::from(*second))
    })?;
    Ok(())
}

fn write_history<W: Write>(out: &mut W, stats: &Statistics, config: &ExportConfig) -> std::io::Result<()> {
    let history = stats.history();
    let rows: Vec<_> = match config.history {
        HistoryMode::Sampled => history.iter().step_by(config.sample_every.max(1)).collect(),
        HistoryMode::Boundary => stats.recent_history(2).iter().collect(),
    };
    for row in rows {
        writeln!(out, "{},{},{}", row.tom0, row.tom1, row.tom2)?;
    }
    Ok(())
}

/// Write parallel columns row by row, leaving cells empty once a column
/// runs out.
fn write_columns<W, T, F>(out: &mut W, columns: &[Vec<T>], cell: F) -> std::io::Result<()>
where
    W: Write,
    F: Fn(&T) -> String,
{
    let depth = columns.iter().map(Vec::len).max().unwrap_or(0);
    for row in 0..depth {
        let line: Vec<String> = columns
            .iter()
            .map(|column| column.get(row).map(&cell).unwrap_or_default())
            .collect();
        writeln!(out, "{}", line.join(","))?;
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn fraction(count: u64, tick: u64) -> f64 {
    count as f64 / tick.saturating_add(2) as f64
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tomsim_agents::NegotiationReport;
    use tomsim_types::{
        AgentId, NegotiationEnding, NegotiationId, PopulationCounts, Seat, ToMOrder,
    };

    use super::*;

    fn render(stats: &Statistics, tick: u64, config: &ExportConfig) -> String {
        let mut out = Vec::new();
        write_report(&mut out, stats, tick, config).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn sample_stats() -> Statistics {
        let mut stats = Statistics::new();
        for tom0 in 0..12 {
            stats.record_counts(PopulationCounts { tom0, tom1: 5, tom2: 1 });
        }
        stats.record_age(ToMOrder::Zero, 2500);
        stats.record_age(ToMOrder::Zero, 5000);
        stats.record_age(ToMOrder::Two, 7500);
        stats.record_negotiation(&NegotiationReport {
            id: NegotiationId(0),
            seats: [AgentId(1), AgentId(2)],
            orders: [ToMOrder::Zero, ToMOrder::One],
            rounds: 2,
            ending: NegotiationEnding::Accepted { by: Seat::Second },
            gains: Some([4, 2]),
        });
        stats
    }

    #[test]
    fn report_has_every_section_in_order() {
        let text = render(&sample_stats(), 10, &ExportConfig::default());
        let sections = [
            "ToM0, ToM1, ToM2",
            "Dominance frequency",
            "Ages",
            "Negotiation lengths",
            "Negotiation endings",
            "Pi gains",
        ];
        let mut cursor = 0;
        for section in sections {
            let found = text.get(cursor..).and_then(|rest| rest.find(section));
            assert!(found.is_some(), "missing section {section}");
            cursor = cursor.saturating_add(found.unwrap());
        }
        assert!(text.starts_with("10\n"));
    }

    #[test]
    fn sampled_history_keeps_every_fifth_row() {
        let text = render(&sample_stats(), 10, &ExportConfig::default());
        assert!(text.contains("\n0,5,1\n5,5,1\n10,5,1\n"));
        assert!(!text.contains("\n1,5,1\n"));
    }

    #[test]
    fn boundary_history_keeps_last_two_rows() {
        let config = ExportConfig {
            history: HistoryMode::Boundary,
            ..ExportConfig::default()
        };
        let text = render(&sample_stats(), 10, &config);
        assert!(text.contains("ToM0, ToM1, ToM2\n10,5,1\n11,5,1\n\n"));
    }

    #[test]
    fn tables_pad_short_columns() {
        let text = render(&sample_stats(), 10, &ExportConfig::default());
        assert!(text.contains("Ages\n2500,,7500\n5000,,\n"));
        assert!(text.contains(&format!("{PAIR_HEADER}\n,2,,,,,,,\n\n1\n")));
        assert!(text.contains(",3,,,,,,,\n"));
        assert!(text.contains(",4.0-2.0,,,,,,,\n"));
    }

    #[test]
    fn dominance_is_divided_by_tick_plus_two() {
        let mut stats = Statistics::new();
        stats.record_counts(PopulationCounts { tom0: 3, tom1: 1, tom2: 1 });
        stats.record_counts(PopulationCounts { tom0: 1, tom1: 3, tom2: 1 });
        let text = render(&stats, 2, &ExportConfig::default());
        assert!(text.contains("Dominance frequency\n0.25,0.25,0\n"));
    }

    #[test]
    fn export_writes_named_file() {
        let dir = std::env::temp_dir().join(format!("tomsim-export-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let config = ExportConfig {
            directory: dir.clone(),
            file_stem: String::from("unit"),
            ..ExportConfig::default()
        };
        let path = export(&sample_stats(), 10, &config).unwrap();
        assert!(path.ends_with("unit_0.csv"));
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("10\n"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn export_to_missing_directory_fails_cleanly() {
        let config = ExportConfig {
            directory: PathBuf::from("/nonexistent/tomsim/dir"),
            ..ExportConfig::default()
        };
        assert!(matches!(
            export(&Statistics::new(), 0, &config),
            Err(ExportError::Io { .. })
        ));
    }
}
