// src/plot.rs

use crate::error::{Result, VqError};
use crate::results::{self, Dataset};
use log::info;
use plotters::coord::Shift;
use plotters::prelude::*;

/// Renders one rate-distortion chart per metric: bitrate on the x axis,
/// metric value on the y axis, one series per result table.
pub fn rd_plot(datasets: &[Dataset], metric: &str, fmt: &str) -> Result<()> {
    let filename = format!("{}_plot.{}", metric, fmt);
    info!("Generating {} plot: {}", metric, filename);

    match fmt {
        "svg" => {
            let root = SVGBackend::new(&filename, (1280, 720)).into_drawing_area();
            draw_rd_chart(root, datasets, metric)?;
        }
        "png" => {
            let root = BitMapBackend::new(&filename, (1280, 720)).into_drawing_area();
            draw_rd_chart(root, datasets, metric)?;
        }
        other => {
            return Err(VqError::Plot(format!(
                "Unsupported plot format '{}' (use png or svg)",
                other
            )));
        }
    }

    info!("Successfully generated {} plot: {}", metric, filename);
    Ok(())
}

fn draw_rd_chart<DB>(
    root: DrawingArea<DB, Shift>,
    datasets: &[Dataset],
    metric: &str,
) -> Result<()>
where
    DB: DrawingBackend,
{
    root.fill(&WHITE)
        .map_err(|e| VqError::Plot(format!("Failed to fill plot background: {:?}", e)))?;

    let all_points: Vec<(f64, f64)> = datasets
        .iter()
        .flat_map(|d| results::rd_series(&d.records, metric))
        .collect();
    if all_points.is_empty() {
        return Err(VqError::Plot(format!("No {} data points to plot", metric)));
    }

    let x_min = all_points.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let x_max = all_points.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
    let y_min = all_points.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let y_max = all_points.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
    let x_pad = ((x_max - x_min) * 0.05).max(1.0);
    let y_pad = ((y_max - y_min) * 0.05).max(0.5);

    let title = results::metric_display_name(metric);
    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Codec Comparison: {} vs Bitrate", title),
            ("sans-serif", 24).into_font(),
        )
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(
            (x_min - x_pad)..(x_max + x_pad),
            (y_min - y_pad)..(y_max + y_pad),
        )
        .map_err(|e| VqError::Plot(format!("Failed to build chart: {:?}", e)))?;

    chart
        .configure_mesh()
        .x_desc("Bitrate (kbps)")
        .y_desc(title)
        .y_label_formatter(&|y: &f64| format!("{:.1}", y))
        .axis_desc_style(("sans-serif", 16))
        .label_style(("sans-serif", 14))
        .draw()
        .map_err(|e| VqError::Plot(format!("Failed to draw mesh: {:?}", e)))?;

    for (idx, dataset) in datasets.iter().enumerate() {
        let series = results::rd_series(&dataset.records, metric);
        let color = Palette99::pick(idx).to_rgba();
        chart
            .draw_series(
                LineSeries::new(series.iter().copied(), color.stroke_width(2)).point_size(3),
            )
            .map_err(|e| VqError::Plot(format!("Failed to draw series: {:?}", e)))?
            .label(dataset.label.clone())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.filled()));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerMiddle)
        .margin(10)
        .label_font(("sans-serif", 12))
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(|e| VqError::Plot(format!("Failed to draw legend: {:?}", e)))?;

    root.present()
        .map_err(|e| VqError::Plot(format!("Failed to save plot: {:?}", e)))?;
    Ok(())
}

/// Reject plot formats before any rendering work happens.
pub fn validate_format(fmt: &str) -> Result<()> {
    match fmt {
        "png" | "svg" => Ok(()),
        other => Err(VqError::Plot(format!(
            "Unsupported plot format '{}' (use png or svg)",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_validation() {
        assert!(validate_format("png").is_ok());
        assert!(validate_format("svg").is_ok());
        assert!(validate_format("webp").is_err());
    }
}
