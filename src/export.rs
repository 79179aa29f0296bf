//! CSV export of extracted executive records.
//!
//! Flattens each executive with its company and filing context into one
//! row; up to three education entries expand into their own columns.

use std::io::Write;
use std::path::Path;

use crate::repository::diesel_extraction::ExecutiveRow;

const HEADER: &[&str] = &[
    "company_name",
    "cik",
    "accession",
    "filing_date",
    "name",
    "age",
    "current_role",
    "past_roles",
    "compensation_salary",
    "compensation_bonus",
    "compensation_stock",
    "compensation_options",
    "compensation_other",
    "compensation_total",
    "compensation_year",
    "start_date",
    "board_member",
    "committee_memberships",
    "other_board_memberships",
    "notable_achievements",
    "education1_degree",
    "education1_field",
    "education1_institution",
    "education1_year",
    "education2_degree",
    "education2_field",
    "education2_institution",
    "education2_year",
    "education3_degree",
    "education3_field",
    "education3_institution",
    "education3_year",
];

/// Write executive rows as CSV. Returns the number of data rows written.
pub fn write_csv(rows: &[ExecutiveRow], path: &Path) -> std::io::Result<usize> {
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "{}", HEADER.join(","))?;

    for row in rows {
        writeln!(file, "{}", format_row(row))?;
    }
    file.flush()?;
    Ok(rows.len())
}

fn format_row(row: &ExecutiveRow) -> String {
    let exec = &row.executive;
    let mut fields: Vec<String> = vec![
        escape(row.company_name.as_deref().unwrap_or_default()),
        escape(&row.cik),
        escape(&row.accession),
        escape(&row.filing_date),
        escape(&exec.name),
        opt_int(exec.age),
        escape(&exec.current_role),
        escape(&exec.past_roles.join("; ")),
        opt_money(exec.compensation_salary),
        opt_money(exec.compensation_bonus),
        opt_money(exec.compensation_stock),
        opt_money(exec.compensation_options),
        opt_money(exec.compensation_other),
        opt_money(exec.compensation_total),
        opt_int(exec.compensation_year),
        escape(exec.start_date.as_deref().unwrap_or_default()),
        if exec.board_member { "true" } else { "false" }.to_string(),
        escape(&exec.committee_memberships.join("; ")),
        escape(&exec.other_board_memberships.join("; ")),
        escape(exec.notable_achievements.as_deref().unwrap_or_default()),
    ];

    for i in 0..3 {
        match exec.education.get(i) {
            Some(edu) => {
                fields.push(escape(&edu.degree));
                fields.push(escape(edu.field.as_deref().unwrap_or_default()));
                fields.push(escape(&edu.institution));
                fields.push(opt_int(edu.year));
            }
            None => fields.extend(std::iter::repeat(String::new()).take(4)),
        }
    }

    fields.join(",")
}

/// Quote a field per RFC 4180 when it contains a delimiter, quote, or
/// newline; embedded quotes double.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn opt_money(value: Option<f64>) -> String {
    value.map(|v| format!("{v}")).unwrap_or_default()
}

fn opt_int(value: Option<i32>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Education, Executive};

    fn sample_row() -> ExecutiveRow {
        ExecutiveRow {
            executive: Executive {
                name: "Smith, Jane".to_string(),
                current_role: "Chief Executive Officer".to_string(),
                age: Some(55),
                compensation_salary: Some(1_000_000.0),
                compensation_bonus: None,
                compensation_stock: Some(5_000_000.0),
                compensation_options: None,
                compensation_other: None,
                compensation_total: Some(6_000_000.0),
                compensation_year: Some(2023),
                start_date: Some("2015".to_string()),
                past_roles: vec!["COO".to_string(), "SVP \"Ops\"".to_string()],
                education: vec![Education {
                    degree: "MBA".to_string(),
                    field: Some("Business Administration".to_string()),
                    institution: "Harvard Business School".to_string(),
                    year: Some(1990),
                }],
                board_member: true,
                committee_memberships: vec![],
                other_board_memberships: vec![],
                notable_achievements: None,
            },
            accession: "0001-24-000001".to_string(),
            cik: "0000320193".to_string(),
            company_name: Some("Apple Inc.".to_string()),
            filing_date: "2024-04-15".to_string(),
        }
    }

    #[test]
    fn escape_quotes_delimiters_and_quotes() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a,b"), "\"a,b\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn row_flattens_education_and_escapes_names() {
        let line = format_row(&sample_row());
        assert!(line.starts_with("Apple Inc.,0000320193,0001-24-000001,2024-04-15,\"Smith, Jane\""));
        assert!(line.contains("Harvard Business School"));
        assert!(line.contains("1990"));
        // Field count matches the header even with missing education slots
        let field_count = count_csv_fields(&line);
        assert_eq!(field_count, HEADER.len());
    }

    #[test]
    fn writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("executives.csv");

        let written = write_csv(&[sample_row()], &path).unwrap();
        assert_eq!(written, 1);

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert!(lines.next().unwrap().starts_with("company_name,cik,"));
        assert!(lines.next().unwrap().contains("Chief Executive Officer"));
        assert!(lines.next().is_none());
    }

    /// Count fields respecting quoted commas.
    fn count_csv_fields(line: &str) -> usize {
        let mut count = 1;
        let mut in_quotes = false;
        for c in line.chars() {
            match c {
                '"' => in_quotes = !in_quotes,
                ',' if !in_quotes => count += 1,
                _ => {}
            }
        }
        count
    }
}
