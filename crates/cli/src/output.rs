// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tabular output helpers

/// Format elapsed time relative to now ("5s", "2m", "1h", "3d").
pub fn format_time_ago(iso: &str) -> String {
    // Persisted timestamps are RFC 3339 with a Z suffix.
    let Ok(then) = chrono::DateTime::parse_from_rfc3339(iso) else {
        return "-".to_string();
    };
    let elapsed_secs = (chrono::Utc::now().timestamp() - then.timestamp()).max(0);
    format_elapsed(elapsed_secs as u64)
}

pub fn format_elapsed(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3_600 {
        format!("{}m", secs / 60)
    } else if secs < 86_400 {
        format!("{}h", secs / 3_600)
    } else {
        format!("{}d", secs / 86_400)
    }
}

/// Print rows as fixed-width columns sized to the content.
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() && cell.len() > widths[i] {
                widths[i] = cell.len();
            }
        }
    }

    let header_line: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h.to_uppercase(), width = widths[i]))
        .collect();
    println!("{}", header_line.join("  "));

    for row in rows {
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:width$}", cell, width = widths.get(i).copied().unwrap_or(0)))
            .collect();
        println!("{}", line.join("  "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        seconds = { 45, "45s" },
        minutes = { 150, "2m" },
        hours = { 7_200, "2h" },
        days = { 200_000, "2d" },
    )]
    fn elapsed_formatting(secs: u64, expected: &str) {
        assert_eq!(format_elapsed(secs), expected);
    }

    #[test]
    fn bad_timestamp_renders_dash() {
        assert_eq!(format_time_ago("not-a-time"), "-");
    }
}
