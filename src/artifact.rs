//! Rendered outputs of views.
//!
//! Artifacts are plain data. The presentation layer decides how to draw them
//! (see `graph`), which keeps every render function testable without a
//! drawing backend.

use serde::Serialize;

/// Output of a view for one input snapshot.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    Chart(Chart),
    Table(Table),
    /// The view's render function failed for the current snapshot.
    Error { message: String },
    /// Placeholder for views that produce nothing.
    Empty,
}

impl Artifact {
    pub fn is_error(&self) -> bool {
        matches!(self, Artifact::Error { .. })
    }

    pub fn as_chart(&self) -> Option<&Chart> {
        match self {
            Artifact::Chart(chart) => Some(chart),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Artifact::Table(table) => Some(table),
            _ => None,
        }
    }
}

/// Rows of display strings under named columns.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Chart {
    pub title: String,
    pub x_title: String,
    pub y_title: String,
    pub marks: Marks,
}

/// RGB colour of a chart's marks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

pub const PURPLE: Rgb = Rgb(128, 0, 128);
pub const INDIGO: Rgb = Rgb(0x5E, 0x42, 0xBD);
pub const STEEL_BLUE: Rgb = Rgb(31, 119, 180);

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Marks {
    /// Pie slices, already ordered for drawing.
    Slices { slices: Vec<Slice> },
    /// Labelled bars, vertical or horizontal.
    Bars {
        bars: Vec<Bar>,
        horizontal: bool,
        color: Rgb,
    },
    /// Contiguous numeric bins.
    Histogram { bins: Vec<Bin>, color: Rgb },
    Points {
        points: Vec<(f64, f64)>,
        x_categories: Option<Vec<String>>,
        y_categories: Option<Vec<String>>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Slice {
    pub label: String,
    pub value: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Bar {
    pub label: String,
    pub value: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Bin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

/// Splits `values` into `bins` equal-width bins over their range.
///
/// The last bin is closed on the right so the maximum is counted. A single
/// distinct value gives one bin of width 1 centred on it.
pub fn histogram(values: &[f64], bins: usize) -> Vec<Bin> {
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if min == max {
        return vec![Bin {
            start: min - 0.5,
            end: max + 0.5,
            count: values.len(),
        }];
    }

    let width = (max - min) / bins as f64;
    let mut out: Vec<Bin> = (0..bins)
        .map(|i| Bin {
            start: min + width * i as f64,
            end: min + width * (i + 1) as f64,
            count: 0,
        })
        .collect();
    for v in values {
        let i = (((v - min) / width) as usize).min(bins - 1);
        out[i].count += 1;
    }
    out
}

/// Counts occurrences of each label, in first-seen order.
pub fn count_by<'a, I>(labels: I) -> Vec<Bar>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut bars: Vec<Bar> = Vec::new();
    for label in labels {
        match bars.iter_mut().find(|b| b.label == label) {
            Some(bar) => bar.value += 1.0,
            None => bars.push(Bar {
                label: label.to_string(),
                value: 1.0,
            }),
        }
    }
    bars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_counts_every_value() {
        let bins = histogram(&[1.0, 2.0, 2.5, 5.0], 4);
        assert_eq!(bins.len(), 4);
        assert_eq!(bins[0].start, 1.0);
        assert_eq!(bins[3].end, 5.0);
        assert_eq!(bins.iter().map(|b| b.count).collect::<Vec<_>>(), vec![1, 2, 0, 1]);
    }

    #[test]
    fn histogram_of_one_distinct_value() {
        let bins = histogram(&[4.0, 4.0], 10);
        assert_eq!(bins.len(), 1);
        assert_eq!(bins[0].count, 2);
        assert!(histogram(&[], 10).is_empty());
    }

    #[test]
    fn count_by_keeps_first_seen_order() {
        let bars = count_by(["TOOLS", "GAME", "TOOLS"]);
        assert_eq!(bars[0].label, "TOOLS");
        assert_eq!(bars[0].value, 2.0);
        assert_eq!(bars[1].label, "GAME");
    }

    #[test]
    fn errors_serialize_with_kind_tag() {
        let json = serde_json::to_value(Artifact::Error {
            message: "no rows".to_string(),
        })
        .unwrap();
        assert_eq!(json["kind"], "error");
        assert_eq!(json["message"], "no rows");
    }
}
