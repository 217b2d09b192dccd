/*!
# Play Store Analytics Dashboard

An interactive, browser-based dashboard over the Google Play Store apps
dataset, built in Rust.

## Overview

A CSV export of Play Store listings is loaded and cleaned once at startup.
A small set of input controls (an Android version slider, a category
dropdown and two column selectors) drive six views: a preview table, a pie
of installs per category, a bar chart of apps per Android version, rating
and installs histograms for the selected category, and a correlation
scatter plot between any two columns.

## Architecture

### Data Layer
- **loader**: Quote-aware CSV reading into a raw table of strings
- **preprocess**: Header normalisation, numeric coercion (`19M`, `10,000+`,
  `$4.99`), duplicate and malformed row removal
- **dataset**: Immutable, column-typed table with row filtering and
  projection

### Reactive Core
- **input**: Declared inputs, their domains and consistent snapshots
- **registry**: Views and the reverse index from each input to the views
  that read it
- **engine**: Per-session state; recomputes exactly the views affected by
  an input change and isolates render failures per view
- **artifact**: Backend-independent chart and table outputs

### Presentation Layer (feature `web`)
- **graph**: Draws chart artifacts to SVG with plotters
- **app**: axum routes, cookie sessions and JSON endpoints
- **config**: clap command line and environment configuration

## Modules

- **dashboard**: The concrete inputs and views of the Play Store dashboard
- **error**: `DashboardError` and per-view `RenderError`
*/

pub mod artifact;
pub mod dashboard;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod input;
pub mod loader;
pub mod preprocess;
pub mod registry;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod config;
#[cfg(feature = "web")]
pub mod graph;

pub use artifact::{Artifact, Chart, Marks, Table};
pub use dashboard::Dashboard;
pub use dataset::{Column, Dataset};
pub use engine::{Outputs, ReactiveEngine};
pub use error::{DashboardError, RenderError};
pub use input::{Domain, InputSurface, InputValue, Snapshot};
pub use registry::ViewRegistry;

#[cfg(feature = "web")]
pub use config::ServerConfig;
