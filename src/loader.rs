use log::{debug, warn};
use std::fs;
use std::path::Path;

use crate::error::DashboardError;

/// Uncleaned CSV content: a header row and string cells.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Reads a CSV file into a `RawTable`.
///
/// # Arguments
/// * `filepath` - Path to the CSV file to load
///
/// # Errors
/// * `DataLoad` if the file cannot be read or is empty
///
/// # Examples
/// ```no_run
/// use playstore_dashboard::loader::from_csv;
///
/// match from_csv("playstore-analysis.csv") {
///     Ok(raw) => println!("Read {} rows", raw.rows.len()),
///     Err(e) => eprintln!("Error loading CSV: {}", e),
/// }
/// ```
pub fn from_csv(filepath: impl AsRef<Path>) -> Result<RawTable, DashboardError> {
    let path = filepath.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|e| DashboardError::data_load(format!("{}: {}", path.display(), e)))?;
    debug!("Read {} bytes from {}", text.len(), path.display());
    parse_csv(&text)
}

/// Parses CSV text. Rows whose field count differs from the header are
/// skipped.
pub fn parse_csv(text: &str) -> Result<RawTable, DashboardError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = text
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty());

    let header_line = lines
        .next()
        .ok_or_else(|| DashboardError::data_load("CSV file is empty"))?;
    let headers: Vec<String> = parse_csv_row(header_line)
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();
    let cols = headers.len();

    let mut rows = Vec::new();
    for (n, line) in lines.enumerate() {
        let fields = parse_csv_row(line);
        if fields.len() != cols {
            // +2: one for the header, one for 1-based numbering
            warn!(
                "Skipping CSV line {}: expected {} fields, found {}",
                n + 2,
                cols,
                fields.len()
            );
            continue;
        }
        rows.push(fields);
    }

    Ok(RawTable { headers, rows })
}

// Parse a CSV row into a vector of strings
fn parse_csv_row(line: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current_field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    // Doubled quote inside a quoted field
                    current_field.push('"');
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => {
                result.push(std::mem::take(&mut current_field));
            }
            _ => current_field.push(c),
        }
    }

    result.push(current_field);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn splits_quoted_fields() {
        let row = parse_csv_row(r#"Photo Editor,ART_AND_DESIGN,4.1,"10,000+","say ""hi""""#);
        assert_eq!(
            row,
            vec!["Photo Editor", "ART_AND_DESIGN", "4.1", "10,000+", r#"say "hi""#]
        );
    }

    #[test]
    fn keeps_trailing_empty_field() {
        assert_eq!(parse_csv_row("a,b,"), vec!["a", "b", ""]);
    }

    #[test]
    fn skips_ragged_rows() {
        let raw = parse_csv("A,B\n1,2\n3\n4,5\r\n").unwrap();
        assert_eq!(raw.headers, vec!["A", "B"]);
        assert_eq!(raw.rows, vec![vec!["1", "2"], vec!["4", "5"]]);
    }

    #[test]
    fn empty_input_is_a_load_error() {
        assert!(matches!(parse_csv("\n\n"), Err(DashboardError::DataLoad(_))));
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = from_csv(dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, DashboardError::DataLoad(_)));
    }

    #[test]
    fn reads_from_disk_with_bom() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "\u{feff}App,Category\nX,GAME\n").unwrap();
        let raw = from_csv(file.path()).unwrap();
        assert_eq!(raw.headers, vec!["App", "Category"]);
        assert_eq!(raw.rows.len(), 1);
    }
}
