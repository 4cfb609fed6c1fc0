use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::ops::Range;

use super::colormap::magma;
use super::plot::{BarSpec, HeatGrid, PlotSpec, ValueUnit, Visual, YAxis, PITCH_CLASSES};
use crate::error::RenderError;

pub const GRID: (usize, usize) = (3, 3);
pub const BACKGROUND: RGBColor = RGBColor(0x2E, 0x2E, 0x2E);
const FOREGROUND: RGBColor = RGBColor(0xE6, 0xE6, 0xE6);
const AXIS: RGBColor = RGBColor(0x8C, 0x8C, 0x8C);
const MUTED: RGBColor = RGBColor(0x5A, 0x5A, 0x5A);
const ENVELOPE: RGBColor = RGBColor(0x4F, 0x9D, 0xE0);
const FONT: &str = "sans-serif";

type Area<'b> = DrawingArea<BitMapBackend<'b>, Shift>;
type Chart<'a, 'b> = ChartContext<'a, BitMapBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

#[derive(Debug, Clone, Copy)]
pub struct RenderStyle {
    pub width: u32,
    pub height: u32,
    pub text: bool,
}

/// A rendered figure as packed RGB8 rows.
#[derive(Debug, Clone)]
pub struct Figure {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Whether plotters can rasterize text on this machine.
pub fn fonts_available() -> bool {
    (FONT, 12.0).into_font().box_size("Hz").is_ok()
}

fn backend<E: std::fmt::Display>(e: E) -> RenderError {
    RenderError::Backend(e.to_string())
}

/// Lay the plots out row-major on a 3x3 grid under a title band.
pub fn render_figure(title: &str, plots: &[PlotSpec], style: &RenderStyle) -> Result<Figure, RenderError> {
    let expected = GRID.0 * GRID.1;
    if plots.len() != expected {
        return Err(RenderError::PlotCount {
            expected,
            got: plots.len(),
        });
    }
    if style.width == 0 || style.height == 0 {
        return Err(RenderError::Backend(format!(
            "figure size {}x{} is empty",
            style.width, style.height
        )));
    }

    let text = style.text && fonts_available();
    if style.text && !text {
        log::warn!("No usable system font found, rendering without text");
    }
    let style = RenderStyle { text, ..*style };

    let mut pixels = vec![0u8; style.width as usize * style.height as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut pixels, (style.width, style.height)).into_drawing_area();
        root.fill(&BACKGROUND).map_err(backend)?;

        let band = if text { (style.height / 20).max(24) } else { 0 };
        let (title_area, grid) = root.split_vertically(band);
        if text {
            let size = (band as f64 * 0.6).max(12.0);
            let title_style = TextStyle::from((FONT, size).into_font())
                .color(&FOREGROUND)
                .pos(Pos::new(HPos::Center, VPos::Center));
            title_area
                .draw(&Text::new(title, ((style.width / 2) as i32, (band / 2) as i32), title_style))
                .map_err(backend)?;
        }

        for (cell, plot) in grid.split_evenly(GRID).iter().zip(plots) {
            draw_plot(cell, plot, &style)?;
        }
        root.present().map_err(backend)?;
    }

    Ok(Figure {
        width: style.width,
        height: style.height,
        pixels,
    })
}

fn draw_plot(area: &Area<'_>, plot: &PlotSpec, style: &RenderStyle) -> Result<(), RenderError> {
    match &plot.visual {
        Visual::Envelope {
            columns,
            duration,
            peak,
        } => {
            let mut chart = chart_for(area, plot, style, 0.0..*duration, -*peak..*peak)?;
            draw_axes(&mut chart, plot, style, YAxis::Linear, true)?;
            chart
                .draw_series(
                    columns
                        .iter()
                        .map(|&(t, lo, hi)| PathElement::new(vec![(t, lo), (t, hi)], ENVELOPE)),
                )
                .map_err(backend)?;
        }
        Visual::Lines {
            series,
            color,
            shaded,
            x_max,
            y_range,
        } => {
            let mut chart = chart_for(area, plot, style, 0.0..*x_max, y_range.0..y_range.1)?;
            draw_axes(&mut chart, plot, style, YAxis::Linear, true)?;
            let (y0, y1) = *y_range;
            chart
                .draw_series(
                    shaded
                        .iter()
                        .map(|&(s, e)| Rectangle::new([(s, y0), (e, y1)], RED.mix(0.35).filled())),
                )
                .map_err(backend)?;
            for line in series {
                chart
                    .draw_series(LineSeries::new(line.iter().copied(), color.stroke_width(2)))
                    .map_err(backend)?;
            }
        }
        Visual::Heatmap(grid) => draw_heatmap(area, plot, style, grid)?,
        Visual::Bars(bars) => draw_bars(area, plot, style, bars)?,
        Visual::Readout {
            headline,
            detail,
            level,
        } => {
            let chart = chart_for(area, plot, style, 0.0..1.0, 0.0..1.0)?;
            let level = level.clamp(0.0, 1.0) as f64;
            chart
                .plotting_area()
                .draw(&Rectangle::new([(0.15, 0.30), (0.85, 0.38)], MUTED.filled()))
                .map_err(backend)?;
            chart
                .plotting_area()
                .draw(&Rectangle::new([(0.15, 0.30), (0.15 + 0.7 * level, 0.38)], GREEN.filled()))
                .map_err(backend)?;
            if style.text {
                let (w, h) = area.dim_in_pixel();
                let big = (h.min(w) as f64 / 9.0).max(14.0);
                chart
                    .plotting_area()
                    .draw(&Text::new(headline.as_str(), (0.5, 0.62), centred(big)))
                    .map_err(backend)?;
                chart
                    .plotting_area()
                    .draw(&Text::new(detail.as_str(), (0.5, 0.47), centred(big * 0.45)))
                    .map_err(backend)?;
            }
        }
        Visual::Placeholder { reason } => {
            let chart = chart_for(area, plot, style, 0.0..1.0, 0.0..1.0)?;
            let canvas = chart.plotting_area();
            canvas
                .draw(&Rectangle::new([(0.02, 0.02), (0.98, 0.98)], MUTED.stroke_width(2)))
                .map_err(backend)?;
            canvas
                .draw(&PathElement::new(vec![(0.02, 0.02), (0.98, 0.98)], MUTED))
                .map_err(backend)?;
            canvas
                .draw(&PathElement::new(vec![(0.02, 0.98), (0.98, 0.02)], MUTED))
                .map_err(backend)?;
            if style.text {
                let (_, h) = area.dim_in_pixel();
                canvas
                    .draw(&Text::new(reason.as_str(), (0.5, 0.5), centred((h as f64 / 16.0).max(12.0))))
                    .map_err(backend)?;
            }
        }
    }
    Ok(())
}

fn centred(size: f64) -> TextStyle<'static> {
    TextStyle::from((FONT, size).into_font())
        .color(&FOREGROUND)
        .pos(Pos::new(HPos::Center, VPos::Center))
}

/// Non-degenerate, finite axis range.
fn span(range: Range<f64>) -> Range<f64> {
    let (lo, hi) = (range.start, range.end);
    if !lo.is_finite() || !hi.is_finite() {
        return 0.0..1.0;
    }
    if hi - lo < 1e-9 {
        return lo - 0.5..lo + 0.5;
    }
    lo..hi
}

fn chart_for<'a, 'b>(
    area: &'a Area<'b>,
    plot: &PlotSpec,
    style: &RenderStyle,
    x: Range<f64>,
    y: Range<f64>,
) -> Result<Chart<'a, 'b>, RenderError> {
    chart_on(area, Some(plot.title.as_str()), style, x, y)
}

fn caption_size(h: u32) -> f64 {
    (h as f64 / 16.0).clamp(12.0, 30.0)
}

fn label_size(plot_h: u32) -> f64 {
    (plot_h as f64 / 14.0).clamp(10.0, 18.0)
}

/// Margins and label areas depend on the height only, so charts split side by
/// side from one cell share their plotting rows.
fn chart_on<'a, 'b>(
    area: &'a Area<'b>,
    caption: Option<&str>,
    style: &RenderStyle,
    x: Range<f64>,
    y: Range<f64>,
) -> Result<Chart<'a, 'b>, RenderError> {
    let (w, h) = area.dim_in_pixel();
    let mut builder = ChartBuilder::on(area);
    builder.margin((h / 40).max(4));
    if style.text {
        if let Some(caption) = caption {
            builder.caption(caption, (FONT, caption_size(h)).into_font().color(&FOREGROUND));
        }
        builder
            .x_label_area_size((h / 9).max(20))
            .y_label_area_size((w / 10).max(30));
    }
    builder.build_cartesian_2d(span(x), span(y)).map_err(backend)
}

fn log2_hz_label(v: &f64) -> String {
    let hz = v.exp2();
    if hz >= 1000.0 {
        format!("{:.1}k", hz / 1000.0)
    } else {
        format!("{hz:.0}")
    }
}

/// Names only the row centres; ticks between rows stay blank.
fn pitch_label(v: &f64) -> String {
    let i = v.round();
    if (v - i).abs() < 0.25 && (0.0..12.0).contains(&i) {
        PITCH_CLASSES[i as usize].to_string()
    } else {
        String::new()
    }
}

fn db_label(v: &f64) -> String {
    format!("{v:+.0} dB")
}

fn plain_label(v: &f64) -> String {
    format!("{v:.1}")
}

fn draw_axes(
    chart: &mut Chart<'_, '_>,
    plot: &PlotSpec,
    style: &RenderStyle,
    y_axis: YAxis,
    x_ticks: bool,
) -> Result<(), RenderError> {
    if !style.text {
        let (x, y) = (chart.x_range(), chart.y_range());
        return chart
            .plotting_area()
            .draw(&Rectangle::new([(x.start, y.start), (x.end, y.end)], AXIS))
            .map_err(backend);
    }

    let (_, h) = chart.plotting_area().dim_in_pixel();
    let size = label_size(h);
    let mut mesh = chart.configure_mesh();
    mesh.disable_mesh()
        .axis_style(AXIS)
        .label_style((FONT, size).into_font().color(&FOREGROUND))
        .axis_desc_style((FONT, size).into_font().color(&FOREGROUND))
        .x_desc(plot.x_label)
        .y_desc(plot.y_label);
    if !x_ticks {
        mesh.x_labels(0);
    }
    match y_axis {
        YAxis::Log2Hz => {
            mesh.y_label_formatter(&log2_hz_label);
        }
        YAxis::PitchClass => {
            mesh.y_labels(12).y_label_formatter(&pitch_label);
        }
        YAxis::Linear => {}
    }
    mesh.draw().map_err(backend)
}

const COLORBAR_STEPS: usize = 64;

fn draw_heatmap(area: &Area<'_>, plot: &PlotSpec, style: &RenderStyle, grid: &HeatGrid) -> Result<(), RenderError> {
    let titled;
    let body = if style.text {
        let (_, h) = area.dim_in_pixel();
        titled = area
            .titled(&plot.title, (FONT, caption_size(h)).into_font().color(&FOREGROUND))
            .map_err(backend)?;
        &titled
    } else {
        area
    };
    let (w, _) = body.dim_in_pixel();
    let (heat_area, bar_area) = body.split_horizontally(w * 5 / 6);

    let mut chart = chart_on(&heat_area, None, style, 0.0..grid.x_max, grid.y_min..grid.y_max)?;

    let rows = grid.cells.len().max(1);
    let cols = grid.cells.first().map_or(1, |row| row.len().max(1));
    let dx = grid.x_max / cols as f64;
    let dy = (grid.y_max - grid.y_min) / rows as f64;
    let (lo, hi) = grid.value_range;
    let scale = if hi > lo { hi - lo } else { 1.0 };

    chart
        .draw_series(grid.cells.iter().enumerate().flat_map(|(r, row)| {
            let y = grid.y_min + r as f64 * dy;
            row.iter().enumerate().map(move |(c, &v)| {
                let x = c as f64 * dx;
                Rectangle::new([(x, y), (x + dx, y + dy)], magma((v - lo) / scale).filled())
            })
        }))
        .map_err(backend)?;
    draw_axes(&mut chart, plot, style, grid.y_axis, true)?;
    draw_colorbar(&bar_area, style, grid)
}

/// Vertical magma strip spanning the grid's value range, ticked on the right.
fn draw_colorbar(area: &Area<'_>, style: &RenderStyle, grid: &HeatGrid) -> Result<(), RenderError> {
    let (w, h) = area.dim_in_pixel();
    let (lo, hi) = (grid.value_range.0 as f64, grid.value_range.1 as f64);
    let values = span(lo..hi);

    let mut builder = ChartBuilder::on(area);
    builder.margin((h / 40).max(4));
    if style.text {
        builder
            .x_label_area_size((h / 9).max(20))
            .right_y_label_area_size(w * 3 / 5);
    }
    let mut chart = builder
        .build_cartesian_2d(0.0..1.0, values.clone())
        .map_err(backend)?;

    let step = (values.end - values.start) / COLORBAR_STEPS as f64;
    chart
        .draw_series((0..COLORBAR_STEPS).map(|i| {
            let y = values.start + i as f64 * step;
            let t = (i as f32 + 0.5) / COLORBAR_STEPS as f32;
            Rectangle::new([(0.0, y), (1.0, y + step)], magma(t).filled())
        }))
        .map_err(backend)?;

    if !style.text {
        return chart
            .plotting_area()
            .draw(&Rectangle::new([(0.0, values.start), (1.0, values.end)], AXIS))
            .map_err(backend);
    }

    let (_, plot_h) = chart.plotting_area().dim_in_pixel();
    let formatter: fn(&f64) -> String = match grid.unit {
        ValueUnit::Decibels => db_label,
        ValueUnit::Plain => plain_label,
    };
    chart
        .configure_mesh()
        .disable_mesh()
        .axis_style(AXIS)
        .label_style((FONT, label_size(plot_h) * 0.85).into_font().color(&FOREGROUND))
        .x_labels(0)
        .y_labels(5)
        .y_label_formatter(&formatter)
        .draw()
        .map_err(backend)
}

fn draw_bars(area: &Area<'_>, plot: &PlotSpec, style: &RenderStyle, bars: &[BarSpec]) -> Result<(), RenderError> {
    let lowest = bars
        .iter()
        .filter_map(|b| b.value)
        .fold(0.0f64, f64::min);
    let floor = if lowest < 0.0 { lowest * 1.15 } else { -1.0 };
    // Room above the loudest bar for its three label lines.
    let top = if style.text { -floor * 0.35 } else { 0.0 };
    let n = bars.len().max(1) as f64;

    let mut chart = chart_for(area, plot, style, 0.0..n, floor..top)?;
    draw_axes(&mut chart, plot, style, YAxis::Linear, false)?;
    chart
        .draw_series(bars.iter().enumerate().filter_map(|(i, bar)| {
            let value = bar.value?;
            let x = i as f64;
            Some(Rectangle::new([(x + 0.15, floor), (x + 0.85, value)], bar.color.filled()))
        }))
        .map_err(backend)?;

    if style.text {
        let (_, plot_h) = chart.plotting_area().dim_in_pixel();
        let size = (plot_h as f64 / 16.0).clamp(9.0, 16.0);
        let line = size * 1.25 / plot_h.max(1) as f64 * (top - floor);
        for (i, bar) in bars.iter().enumerate() {
            let x = i as f64 + 0.5;
            let (base, reading) = match bar.value {
                Some(db) => (db, format!("{db:.1} dB")),
                None => (floor, "n/a".to_string()),
            };
            let lines = [reading, bar.detail.clone(), bar.label.clone()];
            for (k, text) in lines.into_iter().enumerate() {
                let y = base + line * (k as f64 + 0.7);
                chart
                    .plotting_area()
                    .draw(&Text::new(text, (x, y), centred(size)))
                    .map_err(backend)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{compute_all, test_signals::sine, FeatureKind, FeatureOutcome};
    use crate::config::AnalysisConfig;
    use crate::error::ComputeError;
    use crate::render::plot::build_plots;

    const PLAIN: RenderStyle = RenderStyle {
        width: 600,
        height: 420,
        text: false,
    };

    const PLAIN_900: RenderStyle = RenderStyle {
        width: 900,
        height: 600,
        text: false,
    };

    fn pixel(figure: &Figure, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= figure.width || y >= figure.height {
            return None;
        }
        let i = (y as usize * figure.width as usize + x as usize) * 3;
        figure.pixels.get(i..i + 3).map(|px| [px[0], px[1], px[2]])
    }

    fn sine_plots() -> Vec<PlotSpec> {
        let sample = sine(440.0, 1.0, 22050, 0.5);
        build_plots(&compute_all(&sample, &AnalysisConfig::default(), &[]))
    }

    #[test]
    fn figure_has_requested_size() {
        let figure = render_figure("tone", &sine_plots(), &PLAIN).unwrap();
        assert_eq!((figure.width, figure.height), (600, 420));
        assert_eq!(figure.pixels.len(), 600 * 420 * 3);
        assert_eq!(pixel(&figure, 0, 0), Some([0x2E, 0x2E, 0x2E]));
        assert_eq!(pixel(&figure, 600, 0), None);
    }

    #[test]
    fn plots_leave_marks_on_the_background() {
        let figure = render_figure("tone", &sine_plots(), &PLAIN).unwrap();
        let painted = figure
            .pixels
            .chunks_exact(3)
            .filter(|px| px != &[0x2E, 0x2E, 0x2E])
            .count();
        assert!(painted > 600 * 420 / 4, "only {painted} pixels drawn");
    }

    #[test]
    fn rendering_is_repeatable() {
        let plots = sine_plots();
        let a = render_figure("tone", &plots, &PLAIN).unwrap();
        let b = render_figure("tone", &plots, &PLAIN).unwrap();
        assert_eq!(a.pixels, b.pixels);
    }

    #[test]
    fn placeholders_render() {
        let outcomes: Vec<FeatureOutcome> = FeatureKind::ALL
            .iter()
            .map(|&kind| (kind, Err(ComputeError::Silent)))
            .collect();
        assert!(render_figure("silence", &build_plots(&outcomes), &PLAIN).is_ok());
    }

    #[test]
    fn wrong_plot_count_is_rejected() {
        let mut plots = sine_plots();
        plots.pop();
        match render_figure("tone", &plots, &PLAIN) {
            Err(RenderError::PlotCount { expected: 9, got: 8 }) => {}
            other => panic!("unexpected: {:?}", other.map(|f| f.width)),
        }
    }

    #[test]
    fn axis_labels() {
        assert_eq!(log2_hz_label(&10.0), "1.0k");
        assert_eq!(log2_hz_label(&7.0), "128");
        assert_eq!(log2_hz_label(&440f64.log2()), "440");
        assert_eq!(pitch_label(&0.0), "C");
        assert_eq!(pitch_label(&9.0), "A");
        assert_eq!(pitch_label(&8.5), "");
        assert_eq!(pitch_label(&-0.5), "");
        assert_eq!(pitch_label(&12.0), "");
        assert_eq!(db_label(&-40.0), "-40 dB");
        assert_eq!(db_label(&0.0), "+0 dB");
        assert_eq!(plain_label(&0.26), "0.3");
    }

    #[test]
    fn heatmaps_get_a_colorbar() {
        let figure = render_figure("tone", &sine_plots(), &PLAIN).unwrap();
        // Spectrogram is the middle cell of the top row: x 200..400, y 0..140.
        // The strip fills the last sixth of the cell, brightest at the top.
        let top = pixel(&figure, 383, 10).unwrap();
        let bottom = pixel(&figure, 383, 130).unwrap();
        assert!(top[0] > 200 && top[1] > 150, "top of strip {top:?}");
        assert!(bottom.iter().map(|&c| c as u32).sum::<u32>() < 120, "bottom of strip {bottom:?}");
    }

    #[test]
    fn renders_with_text_when_fonts_exist() {
        if !fonts_available() {
            eprintln!("no usable font, skipping text rendering");
            return;
        }
        let style = RenderStyle {
            width: 900,
            height: 600,
            text: true,
        };
        let plots = sine_plots();
        let figure = render_figure("tone.wav", &plots, &style).unwrap();
        assert_eq!((figure.width, figure.height), (900, 600));
        assert_ne!(figure.pixels, render_figure("tone.wav", &plots, &PLAIN_900).unwrap().pixels);

        let outcomes: Vec<FeatureOutcome> = FeatureKind::ALL
            .iter()
            .map(|&kind| (kind, Err(ComputeError::Silent)))
            .collect();
        assert!(render_figure("silence", &build_plots(&outcomes), &style).is_ok());

        // Every chroma row centre is named after its pitch class.
        let chroma = plots.iter().find(|p| p.kind == FeatureKind::Chroma).unwrap();
        let Visual::Heatmap(grid) = &chroma.visual else {
            panic!("chroma should be a heatmap");
        };
        let dy = (grid.y_max - grid.y_min) / grid.cells.len() as f64;
        for (r, name) in PITCH_CLASSES.iter().enumerate() {
            let centre = grid.y_min + (r as f64 + 0.5) * dy;
            assert_eq!(pitch_label(&centre), *name);
        }

        // Spectrogram row centres read as frequencies inside the analysed band.
        let spectrogram = plots.iter().find(|p| p.kind == FeatureKind::Spectrogram).unwrap();
        let Visual::Heatmap(grid) = &spectrogram.visual else {
            panic!("spectrogram should be a heatmap");
        };
        let dy = (grid.y_max - grid.y_min) / grid.cells.len() as f64;
        for r in 0..grid.cells.len() {
            let centre = grid.y_min + (r as f64 + 0.5) * dy;
            let label = log2_hz_label(&centre);
            let hz: f64 = match label.strip_suffix('k') {
                Some(k) => k.parse::<f64>().unwrap() * 1000.0,
                None => label.parse().unwrap(),
            };
            assert!(hz > 0.0 && hz <= 11025.0 + 50.0, "row {r}: {label}");
        }
    }
}
