//! CPU temperature chart
//!
//! One PNG per session: CPU temperature on the left axis with the warn and
//! fail thresholds drawn across, CPU usage on a 0-100 % right axis.

use anyhow::{anyhow, Result};
use plotters::prelude::*;
use std::path::{Path, PathBuf};

use crate::config::ReportConfig;
use crate::hardware::SensorReading;

pub const CHART_FILE_NAME: &str = "idm-test-cpu-temp.png";

const SIZE: (u32, u32) = (1500, 750);
const BACKGROUND: RGBColor = RGBColor(0x1a, 0x1a, 0x2e);
const PLOT_AREA: RGBColor = RGBColor(0x16, 0x21, 0x3e);
const TEMP_LINE: RGBColor = RGBColor(0xe9, 0x45, 0x60);
const USAGE_LINE: RGBColor = RGBColor(0x4a, 0x7a, 0xc0);
const WARN_LINE: RGBColor = RGBColor(0xf5, 0xa6, 0x23);
const FAIL_LINE: RGBColor = RGBColor(0xff, 0x00, 0x00);
const AXIS_TEXT: RGBColor = RGBColor(0xcc, 0xcc, 0xcc);
const GRID: RGBColor = RGBColor(0x44, 0x44, 0x44);

/// Temperature axis when no sensor produced a value.
const DEFAULT_TEMP_RANGE: (f64, f64) = (20.0, 100.0);

/// Draw the chart into `dir`. `readings` must not be empty.
pub fn write_chart(dir: &Path, readings: &[SensorReading], thresholds: &ReportConfig) -> Result<PathBuf> {
    let first = readings
        .first()
        .ok_or_else(|| anyhow!("No readings to chart"))?
        .timestamp;
    let path = dir.join(CHART_FILE_NAME);

    // Seconds since the first reading
    let offset = |r: &SensorReading| (r.timestamp - first).num_seconds().max(0) as f64;
    let span = readings.iter().map(offset).fold(1.0, f64::max);

    let temps: Vec<(f64, f64)> = readings
        .iter()
        .filter_map(|r| r.cpu_temp.map(|t| (offset(r), t)))
        .collect();
    let (temp_lo, temp_hi) = temperature_range(&temps, thresholds);

    let root = BitMapBackend::new(&path, SIZE).into_drawing_area();
    root.fill(&BACKGROUND).map_err(draw_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("IDM Test - CPU temperature", ("sans-serif", 32).into_font().color(&WHITE))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .right_y_label_area_size(60)
        .build_cartesian_2d(0.0..span, temp_lo..temp_hi)
        .map_err(draw_error)?
        .set_secondary_coord(0.0..span, 0.0..100.0);

    chart
        .plotting_area()
        .fill(&PLOT_AREA)
        .map_err(draw_error)?;

    let time_label = |secs: &f64| {
        (first + chrono::Duration::seconds(*secs as i64))
            .format("%H:%M:%S")
            .to_string()
    };

    chart
        .configure_mesh()
        .light_line_style(GRID.mix(0.3))
        .bold_line_style(GRID)
        .axis_style(GRID)
        .x_desc("Time")
        .y_desc("Temperature (°C)")
        .x_label_formatter(&time_label)
        .label_style(("sans-serif", 16).into_font().color(&AXIS_TEXT))
        .axis_desc_style(("sans-serif", 18).into_font().color(&TEMP_LINE))
        .draw()
        .map_err(draw_error)?;

    chart
        .configure_secondary_axes()
        .axis_style(GRID)
        .y_desc("CPU usage (%)")
        .label_style(("sans-serif", 16).into_font().color(&AXIS_TEXT))
        .axis_desc_style(("sans-serif", 18).into_font().color(&USAGE_LINE))
        .draw()
        .map_err(draw_error)?;

    if !temps.is_empty() {
        chart
            .draw_series(LineSeries::new(temps, TEMP_LINE.stroke_width(3)))
            .map_err(draw_error)?
            .label("CPU temperature (°C)")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], TEMP_LINE.stroke_width(3)));

        for (value, color, label) in [
            (thresholds.warn_temp_c, WARN_LINE, "Warning"),
            (thresholds.fail_temp_c, FAIL_LINE, "Critical"),
        ] {
            chart
                .draw_series(LineSeries::new(
                    [(0.0, value), (span, value)],
                    color.mix(0.6).stroke_width(2),
                ))
                .map_err(draw_error)?
                .label(format!("{label} ({value:.0}°C)"))
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        }
    }

    chart
        .draw_secondary_series(LineSeries::new(
            readings.iter().map(|r| (offset(r), r.cpu_percent.clamp(0.0, 100.0))),
            USAGE_LINE.mix(0.8).stroke_width(2),
        ))
        .map_err(draw_error)?
        .label("CPU usage (%)")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], USAGE_LINE.stroke_width(2)));

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(BACKGROUND.mix(0.9))
        .border_style(GRID)
        .label_font(("sans-serif", 16).into_font().color(&AXIS_TEXT))
        .draw()
        .map_err(draw_error)?;

    root.present().map_err(draw_error)?;
    drop(chart);
    drop(root);
    Ok(path)
}

/// Y range covering the data and both thresholds, with some headroom.
fn temperature_range(temps: &[(f64, f64)], thresholds: &ReportConfig) -> (f64, f64) {
    if temps.is_empty() {
        return DEFAULT_TEMP_RANGE;
    }
    let lo = temps.iter().map(|&(_, t)| t).fold(f64::INFINITY, f64::min);
    let hi = temps
        .iter()
        .map(|&(_, t)| t)
        .fold(thresholds.fail_temp_c, f64::max);
    ((lo - 10.0).max(0.0).floor(), (hi + 5.0).ceil())
}

fn draw_error(err: impl std::fmt::Display) -> anyhow::Error {
    anyhow!("Failed to draw chart: {err}")
}
