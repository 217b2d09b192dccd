//! The Play Store dashboard: its inputs, its views and their render
//! functions.

use log::info;
use std::sync::Arc;

use crate::artifact::{
    self, Artifact, Bar, Chart, INDIGO, Marks, PURPLE, STEEL_BLUE, Slice, Table,
};
use crate::dataset::{ColumnKind, Dataset, Datum, VIEW_COLUMNS};
use crate::engine::ReactiveEngine;
use crate::error::{DashboardError, RenderError};
use crate::input::{Domain, InputSurface, InputValue, Snapshot};
use crate::preprocess::android_major_version;
use crate::registry::ViewRegistry;

pub const VERSION_SLIDER: &str = "version-slider";
pub const CATEGORY_DROPDOWN: &str = "xaxis-column";
pub const X_VARIABLE: &str = "xaxis-var";
pub const Y_VARIABLE: &str = "yaxis-var";

pub const DATA_TABLE: &str = "data-table";
pub const TOP_CATEGORIES: &str = "top-categories";
pub const VERSION_GRAPHIC: &str = "version-graphic";
pub const RATING_GRAPHIC: &str = "indicator-graphic";
pub const INSTALLS_GRAPHIC: &str = "installs-graphic";
pub const SCATTER_GRAPHIC: &str = "scatterplot_variable";

const DEFAULT_CATEGORY: &str = "ART_AND_DESIGN";
const TABLE_ROWS: usize = 10;
const TOP_CATEGORY_COUNT: usize = 15;
const RATING_BINS: usize = 20;

/// Startup configuration shared by all sessions.
pub struct Dashboard {
    pub dataset: Arc<Dataset>,
    pub registry: Arc<ViewRegistry>,
    /// Declarations with default values; cloned into every session.
    pub inputs: InputSurface,
}

impl Dashboard {
    /// Declares the inputs and registers the views for `dataset`.
    pub fn build(dataset: Arc<Dataset>) -> Result<Self, DashboardError> {
        let inputs = declare_inputs(&dataset)?;
        let mut registry = ViewRegistry::new();
        register_views(&mut registry, &inputs)?;
        info!(
            "Dashboard ready: {} inputs, {} views over {} rows",
            inputs.specs().len(),
            registry.len(),
            dataset.row_count()
        );
        Ok(Dashboard {
            dataset,
            registry: Arc::new(registry),
            inputs,
        })
    }

    /// A fresh, uninitialized engine with default input values.
    pub fn session(&self) -> ReactiveEngine {
        ReactiveEngine::from_parts(
            self.dataset.clone(),
            self.registry.clone(),
            self.inputs.clone(),
        )
    }
}

pub fn declare_inputs(dataset: &Dataset) -> Result<InputSurface, DashboardError> {
    let mut inputs = InputSurface::new();

    inputs.declare(
        VERSION_SLIDER,
        Domain::Range {
            min: 1.0,
            max: 8.0,
            step: 1.0,
        },
        InputValue::Number(1.0),
    )?;

    let categories = dataset.unique("Category")?;
    let default = if categories.iter().any(|c| c == DEFAULT_CATEGORY) {
        DEFAULT_CATEGORY.to_string()
    } else {
        categories
            .first()
            .cloned()
            .ok_or_else(|| DashboardError::data_load("dataset has no categories"))?
    };
    inputs.declare(
        CATEGORY_DROPDOWN,
        Domain::enumerated(categories),
        InputValue::Text(default),
    )?;

    for axis in [X_VARIABLE, Y_VARIABLE] {
        inputs.declare(axis, Domain::enumerated(VIEW_COLUMNS), "Category".into())?;
    }

    Ok(inputs)
}

pub fn register_views(
    registry: &mut ViewRegistry,
    inputs: &InputSurface,
) -> Result<(), DashboardError> {
    registry.register(DATA_TABLE, &[], inputs, data_table)?;
    registry.register(TOP_CATEGORIES, &[], inputs, top_categories)?;
    registry.register(VERSION_GRAPHIC, &[VERSION_SLIDER], inputs, apps_per_version)?;
    // The category dropdown drives both of these.
    registry.register(RATING_GRAPHIC, &[CATEGORY_DROPDOWN], inputs, rating_histogram)?;
    registry.register(INSTALLS_GRAPHIC, &[CATEGORY_DROPDOWN], inputs, installs_histogram)?;
    registry.register(SCATTER_GRAPHIC, &[X_VARIABLE, Y_VARIABLE], inputs, correlation)?;
    Ok(())
}

/// First rows of the dataset, every column.
pub fn data_table(dataset: &Dataset, _: &Snapshot) -> Result<Artifact, RenderError> {
    let columns = dataset.column_names().to_vec();
    let mut rows = Vec::new();
    for row in dataset.rows().take(TABLE_ROWS) {
        let cells = columns
            .iter()
            .map(|c| row.get(c).map(|d| d.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(cells);
    }
    Ok(Artifact::Table(Table { columns, rows }))
}

/// Sums `value` grouped by `group`, largest first. Ties keep first-seen order.
pub fn sum_by(
    dataset: &Dataset,
    group: &str,
    value: &str,
) -> Result<Vec<(String, f64)>, DashboardError> {
    let mut sums: Vec<(String, f64)> = Vec::new();
    for row in dataset.rows() {
        let (Datum::Text(key), Datum::Number(v)) = (row.get(group)?, row.get(value)?) else {
            continue;
        };
        match sums.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 += v,
            None => sums.push((key.to_string(), v)),
        }
    }
    sums.sort_by(|a, b| b.1.total_cmp(&a.1));
    Ok(sums)
}

/// Share of installs held by the biggest categories.
pub fn top_categories(dataset: &Dataset, _: &Snapshot) -> Result<Artifact, RenderError> {
    let slices = sum_by(dataset, "Category", "Installs")?
        .into_iter()
        .take(TOP_CATEGORY_COUNT)
        .map(|(label, value)| Slice { label, value })
        .collect::<Vec<_>>();
    if slices.is_empty() {
        return Err(RenderError::new("no installs to aggregate"));
    }
    Ok(Artifact::Chart(Chart {
        title: format!("Top {} categories by installs", TOP_CATEGORY_COUNT),
        x_title: String::new(),
        y_title: String::new(),
        marks: Marks::Slices { slices },
    }))
}

/// Apps per category among those whose minimum Android major version
/// equals the slider.
pub fn apps_per_version(dataset: &Dataset, snapshot: &Snapshot) -> Result<Artifact, RenderError> {
    let version = snapshot.number(VERSION_SLIDER)? as u32;
    let rows = dataset.filter(|row| {
        row.text("Android_Ver").and_then(android_major_version) == Some(version)
    });
    if rows.is_empty() {
        return Err(RenderError::new(format!(
            "no apps for android version {}",
            version
        )));
    }
    let bars = artifact::count_by(rows.texts("Category")?);
    Ok(Artifact::Chart(Chart {
        title: format!("Apps requiring Android {}", version),
        x_title: format!("No. of apps for android version {}", version),
        y_title: "Categories".to_string(),
        marks: Marks::Bars {
            bars,
            horizontal: true,
            color: STEEL_BLUE,
        },
    }))
}

pub fn rating_histogram(dataset: &Dataset, snapshot: &Snapshot) -> Result<Artifact, RenderError> {
    let category = snapshot.text(CATEGORY_DROPDOWN)?;
    let ratings = dataset
        .filter(|row| row.text("Category") == Some(category))
        .numbers("Rating")?;
    if ratings.is_empty() {
        return Err(RenderError::new(format!("no ratings for {}", category)));
    }
    Ok(Artifact::Chart(Chart {
        title: format!("Ratings in {}", category),
        x_title: format!("Rating Trends for {}", category),
        y_title: "Count of Ratings".to_string(),
        marks: Marks::Histogram {
            bins: artifact::histogram(&ratings, RATING_BINS),
            color: PURPLE,
        },
    }))
}

/// Number of apps at each install level of the selected category.
pub fn installs_histogram(
    dataset: &Dataset,
    snapshot: &Snapshot,
) -> Result<Artifact, RenderError> {
    let category = snapshot.text(CATEGORY_DROPDOWN)?;
    let mut installs = dataset
        .filter(|row| row.text("Category") == Some(category))
        .numbers("Installs")?;
    if installs.is_empty() {
        return Err(RenderError::new(format!("no installs for {}", category)));
    }
    installs.sort_by(f64::total_cmp);

    let mut bars: Vec<Bar> = Vec::new();
    for level in installs {
        let label = format_count(level);
        match bars.last_mut() {
            Some(bar) if bar.label == label => bar.value += 1.0,
            _ => bars.push(Bar { label, value: 1.0 }),
        }
    }
    Ok(Artifact::Chart(Chart {
        title: format!("Installs in {}", category),
        x_title: format!("Installations for {}", category),
        y_title: "Number of Apps".to_string(),
        marks: Marks::Bars {
            bars,
            horizontal: false,
            color: INDIGO,
        },
    }))
}

/// Scatter of two selectable columns. Categorical columns are placed by
/// category index.
pub fn correlation(dataset: &Dataset, snapshot: &Snapshot) -> Result<Artifact, RenderError> {
    let x_name = snapshot.text(X_VARIABLE)?;
    let y_name = snapshot.text(Y_VARIABLE)?;
    let x_axis = Axis::new(dataset, x_name)?;
    let y_axis = Axis::new(dataset, y_name)?;

    let points: Vec<(f64, f64)> = dataset
        .rows()
        .filter_map(|row| {
            let x = x_axis.position(row.get(x_name).ok()?)?;
            let y = y_axis.position(row.get(y_name).ok()?)?;
            Some((x, y))
        })
        .collect();
    if points.is_empty() {
        return Err(RenderError::new(format!(
            "no rows with both {} and {}",
            x_name, y_name
        )));
    }

    Ok(Artifact::Chart(Chart {
        title: format!("{} vs {}", y_name, x_name),
        x_title: x_name.to_string(),
        y_title: y_name.to_string(),
        marks: Marks::Points {
            points,
            x_categories: x_axis.categories,
            y_categories: y_axis.categories,
        },
    }))
}

/// Maps values of one column onto a numeric axis.
struct Axis {
    categories: Option<Vec<String>>,
}

impl Axis {
    fn new(dataset: &Dataset, column: &str) -> Result<Self, RenderError> {
        let categories = match dataset.column(column)?.kind() {
            ColumnKind::Categorical => Some(dataset.unique(column)?),
            ColumnKind::Numeric => None,
        };
        Ok(Axis { categories })
    }

    fn position(&self, datum: Datum<'_>) -> Option<f64> {
        match (&self.categories, datum) {
            (Some(categories), Datum::Text(s)) => {
                categories.iter().position(|c| c == s).map(|i| i as f64)
            }
            (None, Datum::Number(n)) => Some(n),
            _ => None,
        }
    }
}

/// `10000.0` becomes `10,000+`, matching the install buckets of the store.
pub fn format_count(value: f64) -> String {
    let digits = format!("{}", value.round() as u64);
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out.push('+');
    out
}
