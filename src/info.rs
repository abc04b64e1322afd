//! Table rendering of fit results
//!
//! Implements `Display` for the [`Ranking`] of a model family and for the
//! [`FitResult`] of a single reaction system.

use std::fmt::{self, Display};

use colored::Colorize;
use tabled::{builder::Builder, settings::Style};

use crate::orchestrator::{RankedSystem, Ranking};
use crate::result::{FitResult, ParameterResult};

/// Trait for converting result components to table records
trait TableRecord {
    /// Column headers of the table
    fn columns() -> Vec<String>;

    /// Values of this record, one per column
    fn to_record(&self) -> Vec<String>;
}

fn format_option(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.4}", v))
        .unwrap_or_else(|| "-".to_string())
}

fn success_marker(success: bool) -> String {
    if success {
        "yes".green().to_string()
    } else {
        "no".red().to_string()
    }
}

fn to_table<T: TableRecord>(records: &[T]) -> String {
    let mut builder = Builder::default();
    builder.push_record(T::columns());

    for record in records {
        builder.push_record(record.to_record());
    }

    let mut table = builder.build();
    table.with(Style::rounded());
    table.to_string()
}

impl TableRecord for RankedSystem {
    fn columns() -> Vec<String> {
        ["System", "Success", "AIC", "ΔAIC", "BIC", "RMSD"]
            .map(String::from)
            .to_vec()
    }

    fn to_record(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            success_marker(self.success),
            format_option(self.aic),
            format_option(self.delta_aic),
            format_option(self.bic),
            format_option(self.rmsd),
        ]
    }
}

impl TableRecord for ParameterResult {
    fn columns() -> Vec<String> {
        ["Parameter", "Value", "Std. error", "Varied", "At bound"]
            .map(String::from)
            .to_vec()
    }

    fn to_record(&self) -> Vec<String> {
        let at_bound = if self.at_bound {
            "yes".yellow().to_string()
        } else {
            "no".to_string()
        };

        vec![
            self.name.to_string(),
            format!("{:.6}", self.value),
            format_option(self.stderr),
            self.vary.to_string(),
            at_bound,
        ]
    }
}

impl Display for Ranking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", to_table(&self.entries))
    }
}

impl Display for FitResult {
    /// Summary line, parameter table and the correlations between varied parameters
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} (success: {}, AIC: {}, BIC: {}, RMSD: {})",
            self.system.bold(),
            success_marker(self.success),
            format_option(self.aic),
            format_option(self.bic),
            format_option(self.rmsd),
        )?;

        let parameters: Vec<ParameterResult> = self.parameters.values().cloned().collect();
        write!(f, "{}", to_table(&parameters))?;

        let varied = self.varied();
        if varied.len() > 1 && self.parameters.values().any(|p| !p.correlations.is_empty()) {
            let mut builder = Builder::default();
            let mut header = vec![String::new()];
            header.extend(varied.iter().map(|p| p.to_string()));
            builder.push_record(header);

            for row in varied.iter() {
                let mut record = vec![row.to_string()];
                for column in varied.iter() {
                    let value = if row == column {
                        Some(1.0)
                    } else {
                        self.parameters[row].correlations.get(column).copied()
                    };
                    record.push(format_option(value));
                }
                builder.push_record(record);
            }

            let mut table = builder.build();
            table.with(Style::rounded());
            write!(f, "\nCorrelations\n{}", table)?;
        }

        if self.degenerate {
            write!(
                f,
                "\n{}",
                "Correlations outside [-1, 1], the fit is degenerate".bold().red()
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranking_table_lists_every_system() {
        let ranking = Ranking {
            entries: vec![
                RankedSystem {
                    name: "first".to_string(),
                    success: true,
                    aic: Some(-10.0),
                    delta_aic: Some(0.0),
                    bic: Some(-9.0),
                    rmsd: Some(0.01),
                    nvarys: Some(2),
                },
                RankedSystem {
                    name: "second".to_string(),
                    success: false,
                    aic: None,
                    delta_aic: None,
                    bic: None,
                    rmsd: None,
                    nvarys: Some(3),
                },
            ],
        };

        let rendered = ranking.to_string();
        assert!(rendered.contains("first"));
        assert!(rendered.contains("second"));
        assert!(rendered.contains("-10.0000"));
        assert!(rendered.contains("ΔAIC"));
    }
}
