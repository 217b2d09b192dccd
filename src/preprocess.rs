use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use std::collections::HashSet;

use crate::dataset::{CATEGORICAL_COLUMNS, Column, ColumnKind, Dataset, NUMERIC_COLUMNS};
use crate::error::DashboardError;
use crate::loader::RawTable;

lazy_static! {
    static ref SIZE_REGEX: Regex = Regex::new(r"^([0-9]+(?:\.[0-9]+)?)\s*([kKmM])$").unwrap();
    static ref COUNT_REGEX: Regex = Regex::new(r"^([0-9]+(?:\.[0-9]+)?)\s*([kKmMbB]?)$").unwrap();
    static ref MAJOR_VERSION_REGEX: Regex = Regex::new(r"^\s*([0-9]+)").unwrap();
}

/// Cleans a raw table into a typed `Dataset`.
///
/// Header names have spaces replaced by underscores, exact duplicate rows
/// are dropped, numeric columns are coerced and rows with an unparseable
/// numeric field are skipped.
///
/// # Errors
/// * `DataLoad` if a required column is missing or no rows survive cleaning
pub fn run(raw: RawTable) -> Result<Dataset, DashboardError> {
    let headers: Vec<String> = raw
        .headers
        .iter()
        .map(|h| normalize_header(h))
        .collect();

    for required in CATEGORICAL_COLUMNS.iter().chain(NUMERIC_COLUMNS.iter()) {
        if !headers.iter().any(|h| h == required) {
            return Err(DashboardError::data_load(format!(
                "missing required column \"{}\"",
                required
            )));
        }
    }

    let kinds: Vec<ColumnKind> = headers
        .iter()
        .map(|h| {
            if NUMERIC_COLUMNS.contains(&h.as_str()) {
                ColumnKind::Numeric
            } else {
                ColumnKind::Categorical
            }
        })
        .collect();

    let mut cells: Vec<Vec<Cleaned>> = vec![Vec::new(); headers.len()];
    let mut seen: HashSet<&Vec<String>> = HashSet::new();
    let mut duplicates = 0;
    let mut malformed = 0;

    'rows: for (n, row) in raw.rows.iter().enumerate() {
        if !seen.insert(row) {
            duplicates += 1;
            continue;
        }

        let mut cleaned = Vec::with_capacity(row.len());
        for ((field, header), kind) in row.iter().zip(&headers).zip(&kinds) {
            match clean_field(header, *kind, field) {
                Ok(value) => cleaned.push(value),
                Err(reason) => {
                    warn!("Dropping data row {}: {} ({})", n + 1, reason, header);
                    malformed += 1;
                    continue 'rows;
                }
            }
        }

        for (column, value) in cells.iter_mut().zip(cleaned) {
            column.push(value);
        }
    }

    if cells[0].is_empty() {
        return Err(DashboardError::data_load("no usable rows after cleaning"));
    }

    info!(
        "Cleaned dataset: {} rows kept, {} duplicates and {} malformed rows dropped",
        cells[0].len(),
        duplicates,
        malformed
    );

    let columns = headers
        .into_iter()
        .zip(kinds)
        .zip(cells)
        .map(|((name, kind), values)| (name, into_column(kind, values)))
        .collect();

    let dataset = Dataset::new(columns)?;
    for name in CATEGORICAL_COLUMNS {
        dataset.require(name, ColumnKind::Categorical)?;
    }
    for name in NUMERIC_COLUMNS {
        dataset.require(name, ColumnKind::Numeric)?;
    }
    Ok(dataset)
}

#[derive(Clone, Debug, PartialEq)]
enum Cleaned {
    Text(Option<String>),
    Number(Option<f64>),
}

fn into_column(kind: ColumnKind, values: Vec<Cleaned>) -> Column {
    match kind {
        ColumnKind::Categorical => Column::Categorical(
            values
                .into_iter()
                .map(|v| match v {
                    Cleaned::Text(t) => t,
                    Cleaned::Number(n) => n.map(|n| n.to_string()),
                })
                .collect(),
        ),
        ColumnKind::Numeric => Column::Numeric(
            values
                .into_iter()
                .map(|v| match v {
                    Cleaned::Number(n) => n,
                    Cleaned::Text(_) => None,
                })
                .collect(),
        ),
    }
}

pub fn normalize_header(header: &str) -> String {
    header.trim().replace(' ', "_")
}

fn is_missing(field: &str) -> bool {
    let f = field.trim();
    f.is_empty() || f.eq_ignore_ascii_case("nan") || f.eq_ignore_ascii_case("null")
}

fn clean_field(header: &str, kind: ColumnKind, field: &str) -> Result<Cleaned, String> {
    if kind == ColumnKind::Categorical {
        let value = (!is_missing(field)).then(|| field.trim().to_string());
        return Ok(Cleaned::Text(value));
    }

    if is_missing(field) {
        return Ok(Cleaned::Number(None));
    }

    let parsed = match header {
        "Rating" => parse_rating(field),
        "Reviews" => parse_count(field),
        "Size" => parse_size(field),
        "Installs" => parse_installs(field),
        "Price" => parse_price(field),
        _ => parse_finite(field).map(Some),
    };
    parsed
        .map(Cleaned::Number)
        .ok_or_else(|| format!("cannot parse \"{}\"", field))
}

/// Plain decimal number. `inf`, `Infinity` and `NaN` are rejected.
fn parse_finite(field: &str) -> Option<f64> {
    field
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Ratings must lie in 0..=5.
pub fn parse_rating(field: &str) -> Option<Option<f64>> {
    let value: f64 = field.trim().parse().ok()?;
    if value.is_nan() {
        return Some(None);
    }
    (0.0..=5.0).contains(&value).then_some(Some(value))
}

/// Counts such as `159`, `3.0M` or `12k`.
pub fn parse_count(field: &str) -> Option<Option<f64>> {
    let caps = COUNT_REGEX.captures(field.trim())?;
    let base: f64 = caps[1].parse().ok()?;
    let factor = match &caps[2] {
        "k" | "K" => 1e3,
        "m" | "M" => 1e6,
        "b" | "B" => 1e9,
        _ => 1.0,
    };
    Some(Some(base * factor))
}

/// Sizes in megabytes: `19M` is 19, `201k` is 0.201. Sizes that vary with
/// the device are missing values.
pub fn parse_size(field: &str) -> Option<Option<f64>> {
    let f = field.trim();
    if f.eq_ignore_ascii_case("varies with device") {
        return Some(None);
    }
    if let Some(value) = parse_finite(f) {
        return Some(Some(value));
    }
    let caps = SIZE_REGEX.captures(f)?;
    let base: f64 = caps[1].parse().ok()?;
    let megabytes = match &caps[2] {
        "k" | "K" => base / 1000.0,
        _ => base,
    };
    Some(Some(megabytes))
}

/// Install counts such as `10,000+`.
pub fn parse_installs(field: &str) -> Option<Option<f64>> {
    let digits: String = field
        .trim()
        .trim_end_matches('+')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    parse_finite(&digits).map(Some)
}

/// Prices such as `$4.99` or `0`.
pub fn parse_price(field: &str) -> Option<Option<f64>> {
    let f = field.trim();
    let f = f.strip_prefix('$').unwrap_or(f);
    let value = parse_finite(f)?;
    (value >= 0.0).then_some(Some(value))
}

/// Leading major version of an Android requirement such as `4.0.3 and up`.
pub fn android_major_version(text: &str) -> Option<u32> {
    MAJOR_VERSION_REGEX
        .captures(text)
        .and_then(|caps| caps[1].parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_csv;

    const HEADER: &str = "App,Category,Rating,Reviews,Size,Installs,Type,Price,Content Rating,Genres,Last Updated,Current Ver,Android Ver";

    fn csv(rows: &[&str]) -> String {
        let mut text = String::from(HEADER);
        for row in rows {
            text.push('\n');
            text.push_str(row);
        }
        text
    }

    #[test]
    fn coerces_playstore_formats() {
        assert_eq!(parse_installs("10,000+"), Some(Some(10000.0)));
        assert_eq!(parse_installs("Free"), None);
        assert_eq!(parse_size("19M"), Some(Some(19.0)));
        assert_eq!(parse_size("201k"), Some(Some(0.201)));
        assert_eq!(parse_size("Varies with device"), Some(None));
        assert_eq!(parse_price("$4.99"), Some(Some(4.99)));
        assert_eq!(parse_price("0"), Some(Some(0.0)));
        assert_eq!(parse_price("Everyone"), None);
        assert_eq!(parse_count("3.0M"), Some(Some(3_000_000.0)));
        assert_eq!(parse_rating("NaN"), Some(None));
        assert_eq!(parse_rating("19"), None);
    }

    #[test]
    fn reads_major_android_version() {
        assert_eq!(android_major_version("4.0.3 and up"), Some(4));
        assert_eq!(android_major_version("8.0 and up"), Some(8));
        assert_eq!(android_major_version("Varies with device"), None);
    }

    #[test]
    fn cleans_rows_and_renames_headers() {
        let text = csv(&[
            r#"Photo Editor,ART_AND_DESIGN,4.1,159,19M,"10,000+",Free,0,Everyone,Art & Design,"January 7, 2018",1.0.0,4.0.3 and up"#,
            r#"Photo Editor,ART_AND_DESIGN,4.1,159,19M,"10,000+",Free,0,Everyone,Art & Design,"January 7, 2018",1.0.0,4.0.3 and up"#,
            r#"Chess,GAME,NaN,12,Varies with device,"1,000,000+",Paid,$2.99,Teen,Board,"May 1, 2018",2.1,Varies with device"#,
        ]);
        let data = run(parse_csv(&text).unwrap()).unwrap();

        assert_eq!(data.row_count(), 2);
        assert!(data.column_names().iter().any(|c| c == "Content_Rating"));
        assert!(data.column_names().iter().any(|c| c == "Android_Ver"));

        let chess = data.row(1).unwrap();
        assert_eq!(chess.text("Category"), Some("GAME"));
        assert_eq!(chess.number("Rating"), None);
        assert_eq!(chess.number("Size"), None);
        assert_eq!(chess.number("Installs"), Some(1_000_000.0));
        assert_eq!(chess.number("Price"), Some(2.99));
    }

    #[test]
    fn infinite_numbers_are_not_numbers() {
        assert_eq!(parse_price("$inf"), None);
        assert_eq!(parse_installs("inf+"), None);
        assert_eq!(parse_size("Infinity"), None);
        assert_eq!(parse_rating("inf"), None);
    }

    #[test]
    fn drops_rows_with_infinite_fields() {
        let text = csv(&[
            r#"Photo Editor,ART_AND_DESIGN,4.1,159,19M,"10,000+",Free,0,Everyone,Art & Design,"January 7, 2018",1.0.0,4.0.3 and up"#,
            r#"Forever,GAME,4.0,10,2M,"inf+",Free,0,Everyone,Board,"May 1, 2018",1,4.0 and up"#,
            r#"Priceless,GAME,4.0,10,2M,"1,000+",Paid,$inf,Everyone,Board,"May 1, 2018",1,4.0 and up"#,
        ]);
        let data = run(parse_csv(&text).unwrap()).unwrap();
        assert_eq!(data.row_count(), 1);
        assert!(data.all().numbers("Installs").unwrap().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn drops_shifted_rows() {
        let text = csv(&[
            r#"Photo Editor,ART_AND_DESIGN,4.1,159,19M,"10,000+",Free,0,Everyone,Art & Design,"January 7, 2018",1.0.0,4.0.3 and up"#,
            r#"Life Made WI-Fi,1.9,19,3.0M,1000+,Free,0,Everyone,,"February 11, 2018",1.0.19,4.0 and up,"#,
        ]);
        let data = run(parse_csv(&text).unwrap()).unwrap();
        assert_eq!(data.row_count(), 1);
    }

    #[test]
    fn missing_column_is_a_load_error() {
        let raw = parse_csv("App,Category\nX,GAME\n").unwrap();
        let err = run(raw).unwrap_err();
        assert!(err.to_string().contains("Rating"));
    }

    #[test]
    fn all_rows_malformed_is_a_load_error() {
        let text = csv(&[
            r#"Bad,GAME,seven,1,1M,"1+",Free,0,Everyone,Board,"May 1, 2018",1,4.0 and up"#,
        ]);
        let err = run(parse_csv(&text).unwrap()).unwrap_err();
        assert!(matches!(err, DashboardError::DataLoad(_)));
    }
}
