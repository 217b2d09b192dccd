//! Server-side drawing of chart artifacts with plotters' SVG backend.

use log::warn;
use plotters::coord::Shift;
use plotters::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::f64::consts::PI;
use std::ops::Range;

use crate::artifact::{Artifact, Bar, Bin, Chart, Marks, Rgb, Slice};

/// Configuration options for graph generation
#[derive(Clone, Debug)]
pub struct GraphOptions {
    /// Width of the graph in pixels
    pub width: u32,

    /// Height of the graph in pixels
    pub height: u32,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 450,
        }
    }
}

/// What the page receives for one view.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Presented {
    Svg { svg: String },
    Table { columns: Vec<String>, rows: Vec<Vec<String>> },
    Error { message: String },
    Empty,
}

/// Converts an artifact into its page form. A chart that cannot be drawn
/// is presented as an error for that view only.
pub fn present(view: &str, artifact: &Artifact, options: &GraphOptions) -> Presented {
    match artifact {
        Artifact::Chart(chart) => match render_svg(chart, options) {
            Ok(svg) => Presented::Svg { svg },
            Err(e) => {
                warn!("Failed to draw view \"{}\": {}", view, e);
                Presented::Error {
                    message: format!("failed to draw chart: {}", e),
                }
            }
        },
        Artifact::Table(table) => Presented::Table {
            columns: table.columns.clone(),
            rows: table.rows.clone(),
        },
        Artifact::Error { message } => Presented::Error {
            message: message.clone(),
        },
        Artifact::Empty => Presented::Empty,
    }
}

pub fn present_all(
    outputs: &BTreeMap<String, Artifact>,
    options: &GraphOptions,
) -> BTreeMap<String, Presented> {
    outputs
        .iter()
        .map(|(name, artifact)| (name.clone(), present(name, artifact, options)))
        .collect()
}

/// Draws a chart to an SVG document.
///
/// # Returns
/// * The SVG text, or the drawing backend's error
pub fn render_svg(chart: &Chart, options: &GraphOptions) -> Result<String, Box<dyn Error>> {
    if !finite_marks(&chart.marks) {
        return Err("chart has a non-finite value".into());
    }

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (options.width, options.height))
            .into_drawing_area();
        root.fill(&WHITE)?;

        match &chart.marks {
            Marks::Slices { slices } => draw_pie(&root, &chart.title, slices)?,
            Marks::Bars {
                bars,
                horizontal: true,
                color,
            } => draw_horizontal_bars(&root, chart, bars, *color)?,
            Marks::Bars {
                bars,
                horizontal: false,
                color,
            } => draw_vertical_bars(&root, chart, bars, *color)?,
            Marks::Histogram { bins, color } => draw_histogram(&root, chart, bins, *color)?,
            Marks::Points {
                points,
                x_categories,
                y_categories,
            } => draw_points(
                &root,
                chart,
                points,
                x_categories.as_deref(),
                y_categories.as_deref(),
            )?,
        }

        root.present()?;
    }
    Ok(svg)
}

type Area<'a> = DrawingArea<SVGBackend<'a>, Shift>;

fn rgb(color: Rgb) -> RGBColor {
    RGBColor(color.0, color.1, color.2)
}

/// Label for an integer tick on a categorical axis; blank between ticks.
fn category_label(labels: &[String], position: f64) -> String {
    let rounded = position.round();
    if (position - rounded).abs() > 1e-6 || rounded < 0.0 {
        return String::new();
    }
    labels.get(rounded as usize).cloned().unwrap_or_default()
}

fn finite_marks(marks: &Marks) -> bool {
    match marks {
        Marks::Slices { slices } => slices.iter().all(|s| s.value.is_finite()),
        Marks::Bars { bars, .. } => bars.iter().all(|b| b.value.is_finite()),
        Marks::Histogram { bins, .. } => bins
            .iter()
            .all(|b| b.start.is_finite() && b.end.is_finite()),
        Marks::Points { points, .. } => points
            .iter()
            .all(|(x, y)| x.is_finite() && y.is_finite()),
    }
}

/// plotters never finishes laying out a mesh over an infinite range.
fn axis(range: Range<f64>) -> Result<Range<f64>, Box<dyn Error>> {
    if range.start.is_finite() && range.end.is_finite() && range.start < range.end {
        Ok(range)
    } else {
        Err(format!("cannot draw an axis over {:?}", range).into())
    }
}

fn padded(min: f64, max: f64) -> Range<f64> {
    if min == max {
        (min - 1.0)..(max + 1.0)
    } else {
        let pad = (max - min) * 0.05;
        (min - pad)..(max + pad)
    }
}

/// Pie slices with percentage labels, starting at twelve o'clock.
fn draw_pie(root: &Area<'_>, title: &str, slices: &[Slice]) -> Result<(), Box<dyn Error>> {
    let area = root.titled(title, ("sans-serif", 20).into_font())?;
    let (width, height) = area.dim_in_pixel();
    let center = (width as f64 / 2.0, height as f64 / 2.0);
    let radius = width.min(height) as f64 * 0.35;
    let total: f64 = slices.iter().map(|s| s.value).sum();
    if !(total > 0.0 && total.is_finite()) {
        return Err("pie chart has no positive finite total".into());
    }

    let at = |angle: f64, r: f64| {
        (
            (center.0 + r * angle.cos()).round() as i32,
            (center.1 + r * angle.sin()).round() as i32,
        )
    };

    let mut start = -PI / 2.0;
    for (i, slice) in slices.iter().enumerate() {
        let sweep = slice.value / total * 2.0 * PI;
        let steps = ((sweep / (PI / 90.0)).ceil() as usize).max(1);
        let mut points = vec![at(0.0, 0.0)];
        for step in 0..=steps {
            points.push(at(start + sweep * step as f64 / steps as f64, radius));
        }
        area.draw(&Polygon::new(points, Palette99::pick(i).filled()))?;

        let share = slice.value / total * 100.0;
        if share >= 1.0 {
            let (x, y) = at(start + sweep / 2.0, radius * 1.18);
            area.draw(&Text::new(
                format!("{} {:.1}%", slice.label, share),
                (x - 40, y - 6),
                ("sans-serif", 12).into_font(),
            ))?;
        }
        start += sweep;
    }
    Ok(())
}

fn draw_vertical_bars(
    root: &Area<'_>,
    chart: &Chart,
    bars: &[Bar],
    color: Rgb,
) -> Result<(), Box<dyn Error>> {
    let labels: Vec<String> = bars.iter().map(|b| b.label.clone()).collect();
    let max = bars.iter().map(|b| b.value).fold(0.0, f64::max).max(1.0);

    let mut plot = ChartBuilder::on(root)
        .caption(&chart.title, ("sans-serif", 20).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5..(bars.len() as f64 - 0.5), axis(0.0..max * 1.1)?)?;

    let x_fmt = |x: &f64| category_label(&labels, *x);
    plot.configure_mesh()
        .disable_x_mesh()
        .x_labels(bars.len().clamp(1, 20))
        .x_label_formatter(&x_fmt)
        .x_desc(&chart.x_title)
        .y_desc(&chart.y_title)
        .draw()?;

    let fill = rgb(color).mix(0.75).filled();
    plot.draw_series(bars.iter().enumerate().map(|(i, bar)| {
        let x = i as f64;
        Rectangle::new([(x - 0.4, 0.0), (x + 0.4, bar.value)], fill)
    }))?;
    Ok(())
}

fn draw_horizontal_bars(
    root: &Area<'_>,
    chart: &Chart,
    bars: &[Bar],
    color: Rgb,
) -> Result<(), Box<dyn Error>> {
    let labels: Vec<String> = bars.iter().map(|b| b.label.clone()).collect();
    let max = bars.iter().map(|b| b.value).fold(0.0, f64::max).max(1.0);

    let mut plot = ChartBuilder::on(root)
        .caption(&chart.title, ("sans-serif", 20).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(160)
        .build_cartesian_2d(axis(0.0..max * 1.1)?, -0.5..(bars.len() as f64 - 0.5))?;

    let y_fmt = |y: &f64| category_label(&labels, *y);
    plot.configure_mesh()
        .disable_y_mesh()
        .y_labels(bars.len().clamp(1, 40))
        .y_label_formatter(&y_fmt)
        .x_desc(&chart.x_title)
        .y_desc(&chart.y_title)
        .draw()?;

    let fill = rgb(color).mix(0.75).filled();
    plot.draw_series(bars.iter().enumerate().map(|(i, bar)| {
        let y = i as f64;
        Rectangle::new([(0.0, y - 0.4), (bar.value, y + 0.4)], fill)
    }))?;
    Ok(())
}

fn draw_histogram(
    root: &Area<'_>,
    chart: &Chart,
    bins: &[Bin],
    color: Rgb,
) -> Result<(), Box<dyn Error>> {
    let (first, last) = match (bins.first(), bins.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err("histogram has no bins".into()),
    };
    let max = bins.iter().map(|b| b.count).max().unwrap_or(0).max(1) as f64;

    let mut plot = ChartBuilder::on(root)
        .caption(&chart.title, ("sans-serif", 20).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(axis(first.start..last.end)?, 0.0..max * 1.1)?;

    plot.configure_mesh()
        .x_desc(&chart.x_title)
        .y_desc(&chart.y_title)
        .draw()?;

    let fill = rgb(color).mix(0.75).filled();
    // Leave a small gap between adjacent bins.
    let gap = (last.end - first.start) / bins.len() as f64 * 0.025;
    plot.draw_series(bins.iter().map(|bin| {
        Rectangle::new(
            [(bin.start + gap, 0.0), (bin.end - gap, bin.count as f64)],
            fill,
        )
    }))?;
    Ok(())
}

fn draw_points(
    root: &Area<'_>,
    chart: &Chart,
    points: &[(f64, f64)],
    x_categories: Option<&[String]>,
    y_categories: Option<&[String]>,
) -> Result<(), Box<dyn Error>> {
    let (x_min, x_max) = points
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p.0), hi.max(p.0))
        });
    let (y_min, y_max) = points
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p.1), hi.max(p.1))
        });
    if !x_min.is_finite() || !y_min.is_finite() {
        return Err("scatter plot has no points".into());
    }

    let mut plot = ChartBuilder::on(root)
        .caption(&chart.title, ("sans-serif", 20).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(if y_categories.is_some() { 160 } else { 60 })
        .build_cartesian_2d(axis(padded(x_min, x_max))?, axis(padded(y_min, y_max))?)?;

    let x_fmt = |x: &f64| match x_categories {
        Some(labels) => category_label(labels, *x),
        None => format!("{}", x),
    };
    let y_fmt = |y: &f64| match y_categories {
        Some(labels) => category_label(labels, *y),
        None => format!("{}", y),
    };
    let mut mesh = plot.configure_mesh();
    mesh.x_label_formatter(&x_fmt)
        .y_label_formatter(&y_fmt)
        .x_desc(&chart.x_title)
        .y_desc(&chart.y_title);
    if let Some(labels) = x_categories {
        mesh.x_labels(labels.len().clamp(1, 40));
    }
    if let Some(labels) = y_categories {
        mesh.y_labels(labels.len().clamp(1, 40));
    }
    mesh.draw()?;

    let fill = rgb(crate::artifact::STEEL_BLUE).filled();
    plot.draw_series(points.iter().map(|&(x, y)| Circle::new((x, y), 3, fill)))?;
    Ok(())
}
