//! Static maps rendered with plotters.
//!
//! A [`Map`] collects layers over a lon/lat extent (equirectangular) and is
//! drawn on a plotters chart with a caption, axes and a series-label legend.
//! [`Map::save`] writes one PNG; [`save_panel`] tiles several maps into one
//! image. Legend entries are also written to a `<name>.legend.csv` sidecar
//! so the colour keys survive on machines without a label font.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use geo::{BooleanOps, BoundingRect, Contains, Intersects, LineString, MultiLineString, MultiPolygon, Rect};
use log::{debug, info, warn};
use plotters::coord::Shift;
use plotters::element::Polygon as AreaElement;
use plotters::prelude::{
    BitMapBackend, ChartBuilder, Circle, DrawingArea, IntoDrawingArea, PathElement, Rectangle,
    SeriesLabelPosition, BLACK, WHITE,
};
use plotters::style::{register_font, Color as _, FontStyle, RGBAColor};
use plotters_backend::{
    BackendColor, BackendCoord, BackendStyle, BackendTextStyle, DrawingBackend, DrawingErrorKind,
};
use serde::Serialize;

use crate::color::{hex, Color, ColorRamp, OCEAN_WHITE, OUTLINE_DARK};
use crate::config::RenderConfig;
use crate::raster::{GridSpec, Raster};
use crate::vector::{LineLayer, PolygonLayer};

const FONT_FAMILY: &str = "sans-serif";
const CAPTION_SIZE: u32 = 18;
const MARGIN: u32 = 10;
const CAPTION_BAND: u32 = 30;
const X_LABEL_AREA: u32 = 30;
const Y_LABEL_AREA: u32 = 45;
/// Smallest plotting area edge, so tiny grids still leave room for labels.
const MIN_PLOT: u32 = 240;

/// Tried in order when no font is configured.
const SYSTEM_FONTS: [&str; 7] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

static FONT_READY: OnceLock<bool> = OnceLock::new();

/// Register the label font once per process: the configured file, else the
/// first system font found. Returns whether labels can be drawn.
pub fn init_font(configured: Option<&Path>) -> bool {
    *FONT_READY.get_or_init(|| {
        let candidates = configured
            .map(Path::to_path_buf)
            .into_iter()
            .chain(SYSTEM_FONTS.iter().map(PathBuf::from));
        for path in candidates {
            let Ok(bytes) = std::fs::read(&path) else {
                continue;
            };
            let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
            if register_font(FONT_FAMILY, FontStyle::Normal, bytes).is_ok() {
                info!("map labels use {}", path.display());
                return true;
            }
            warn!("{} is not a usable font", path.display());
        }
        warn!("no label font found, maps are drawn without text (see the .legend.csv files)");
        false
    })
}

// ---------------------------------------------------------------------------
// Map description
// ---------------------------------------------------------------------------

/// How a legend entry is marked next to its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Swatch,
    Line,
    Dot,
}

impl Mark {
    fn element(self, (x, y): (i32, i32), color: RGBAColor) -> Rectangle<(i32, i32)> {
        let corners = match self {
            Mark::Swatch => [(x, y - 5), (x + 12, y + 5)],
            Mark::Line => [(x, y - 1), (x + 16, y + 1)],
            Mark::Dot => [(x + 3, y - 3), (x + 9, y + 3)],
        };
        Rectangle::new(corners, color.filled())
    }
}

/// One legend block: a title and its (label, colour) entries.
#[derive(Debug, Clone)]
pub struct Legend {
    pub title: String,
    pub mark: Mark,
    pub entries: Vec<(String, Color)>,
}

#[derive(Serialize)]
struct LegendRow<'a> {
    legend: &'a str,
    label: &'a str,
    color: String,
}

enum Layer<'a> {
    Raster(&'a Raster, ColorRamp),
    Fill(&'a PolygonLayer, Color),
    Outline(&'a PolygonLayer, Color),
    Lines(&'a LineLayer, Color, u32),
    Points(Vec<(f64, f64, Color)>, u32),
}

/// A map under construction. Layers are drawn in the order they are added.
pub struct Map<'a> {
    title: String,
    extent: GridSpec,
    pixels_per_cell: u32,
    font: Option<PathBuf>,
    layers: Vec<Layer<'a>>,
    legends: Vec<Legend>,
}

impl<'a> Map<'a> {
    pub fn new(title: impl Into<String>, extent: GridSpec, render: &RenderConfig) -> Self {
        Self {
            title: title.into(),
            extent,
            pixels_per_cell: render.pixels_per_cell.max(1),
            font: render.font.clone(),
            layers: Vec::new(),
            legends: Vec::new(),
        }
    }

    /// Image size in pixels: the plotting area plus caption, axis labels and
    /// margins.
    pub fn size(&self) -> (u32, u32) {
        let plot_w = (self.extent.cols as u32 * self.pixels_per_cell).max(MIN_PLOT);
        let plot_h = (self.extent.rows as u32 * self.pixels_per_cell).max(MIN_PLOT / 2);
        (
            plot_w + Y_LABEL_AREA + 2 * MARGIN,
            plot_h + X_LABEL_AREA + CAPTION_BAND + 2 * MARGIN,
        )
    }

    /// Paint every populated cell with the ramp colour of its value.
    pub fn raster(&mut self, raster: &'a Raster, ramp: &ColorRamp) -> &mut Self {
        self.layers.push(Layer::Raster(raster, ramp.clone()));
        self
    }

    /// Fill polygon exteriors.
    pub fn fill_polygons(&mut self, layer: &'a PolygonLayer, color: Color) -> &mut Self {
        self.layers.push(Layer::Fill(layer, color));
        self
    }

    /// Stroke polygon rings, holes included.
    pub fn polygon_outlines(&mut self, layer: &'a PolygonLayer, color: Color) -> &mut Self {
        self.layers.push(Layer::Outline(layer, color));
        self
    }

    pub fn lines(&mut self, layer: &'a LineLayer, color: Color, width: u32) -> &mut Self {
        self.layers.push(Layer::Lines(layer, color, width));
        self
    }

    /// Outlined circle markers at (lon, lat).
    pub fn points<I>(&mut self, points: I, radius: u32) -> &mut Self
    where
        I: IntoIterator<Item = (f64, f64, Color)>,
    {
        self.layers.push(Layer::Points(points.into_iter().collect(), radius));
        self
    }

    pub fn legend(&mut self, title: &str, mark: Mark, entries: Vec<(String, Color)>) -> &mut Self {
        self.legends.push(Legend {
            title: title.to_string(),
            mark,
            entries,
        });
        self
    }

    /// Write the PNG and its legend sidecar. Returns the image path.
    pub fn save(&self, path: &Path) -> Result<PathBuf> {
        init_font(self.font.as_deref());
        let size = self.size();
        {
            let root = LabelSafe::new(BitMapBackend::new(path, size)).into_drawing_area();
            root.fill(&WHITE)?;
            self.draw_on(&root)?;
            root.present()
                .with_context(|| format!("writing map {}", path.display()))?;
        }
        if !self.legends.is_empty() {
            write_legend_csv(&self.legends, &legend_path(path))?;
        }
        debug!("wrote {}x{} map {}", size.0, size.1, path.display());
        Ok(path.to_path_buf())
    }

    fn window(&self) -> Rect<f64> {
        Rect::new(
            (self.extent.west, self.extent.south()),
            (self.extent.east(), self.extent.north),
        )
    }

    fn draw_on<DB>(&self, area: &DrawingArea<DB, Shift>) -> Result<()>
    where
        DB: DrawingBackend,
        DB::ErrorType: 'static,
    {
        let e = &self.extent;
        let mut chart = ChartBuilder::on(area)
            .caption(&self.title, (FONT_FAMILY, CAPTION_SIZE))
            .margin(MARGIN)
            .x_label_area_size(X_LABEL_AREA)
            .y_label_area_size(Y_LABEL_AREA)
            .build_cartesian_2d(e.west..e.east(), e.south()..e.north)?;
        chart.plotting_area().fill(&rgba(OCEAN_WHITE))?;
        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc("longitude")
            .y_desc("latitude")
            .draw()?;

        let window = self.window();
        let clip = MultiPolygon(vec![window.to_polygon()]);

        for layer in &self.layers {
            match layer {
                Layer::Raster(raster, ramp) => {
                    let spec = raster.spec();
                    chart.draw_series(raster.iter_valid().filter_map(|(row, col, v)| {
                        let (lon, lat) = spec.cell_center(row, col);
                        e.contains(lon, lat).then(|| {
                            let x0 = spec.west + col as f64 * spec.cell_width;
                            let y0 = spec.north - row as f64 * spec.cell_height;
                            Rectangle::new(
                                [(x0, y0), (x0 + spec.cell_width, y0 - spec.cell_height)],
                                rgba(ramp.color_at(v)).filled(),
                            )
                        })
                    }))?;
                }
                Layer::Fill(polygons, color) => {
                    let style = rgba(*color).filled();
                    for feature in polygons.features() {
                        let Some(visible) = clip_polygons(&feature.geometry, &window, &clip) else {
                            continue;
                        };
                        chart.draw_series(visible.0.iter().map(|p| {
                            AreaElement::new(ring_points(p.exterior()), style)
                        }))?;
                    }
                }
                Layer::Outline(polygons, color) => {
                    let style = plotters::style::Color::stroke_width(&rgba(*color), 1);
                    for feature in polygons.features() {
                        let rings: Vec<LineString<f64>> = feature
                            .geometry
                            .0
                            .iter()
                            .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
                            .cloned()
                            .collect();
                        let visible = clip_lines(MultiLineString(rings), &window, &clip);
                        chart.draw_series(
                            visible.0.iter().map(|l| PathElement::new(ring_points(l), style)),
                        )?;
                    }
                }
                Layer::Lines(lines, color, width) => {
                    let style = plotters::style::Color::stroke_width(&rgba(*color), *width);
                    for feature in &lines.features {
                        let visible = clip_lines(feature.geometry.clone(), &window, &clip);
                        chart.draw_series(
                            visible.0.iter().map(|l| PathElement::new(ring_points(l), style)),
                        )?;
                    }
                }
                Layer::Points(points, radius) => {
                    let r = *radius as i32;
                    chart.draw_series(
                        points
                            .iter()
                            .filter(|(lon, lat, _)| e.contains(*lon, *lat))
                            .flat_map(|&(lon, lat, color)| {
                                [
                                    Circle::new((lon, lat), r, rgba(color).filled()),
                                    Circle::new((lon, lat), r, plotters::style::Color::stroke_width(&rgba(OUTLINE_DARK), 1)),
                                ]
                            }),
                    )?;
                }
            }
        }

        if !self.legends.is_empty() {
            for legend in &self.legends {
                let mark = legend.mark;
                for (i, (label, color)) in legend.entries.iter().enumerate() {
                    let color = rgba(*color);
                    let text = if i == 0 {
                        format!("{}: {label}", legend.title)
                    } else {
                        label.clone()
                    };
                    chart
                        .draw_series(std::iter::empty::<Rectangle<(f64, f64)>>())?
                        .label(text)
                        .legend(move |pos| mark.element(pos, color));
                }
            }
            chart
                .configure_series_labels()
                .position(SeriesLabelPosition::LowerLeft)
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK.mix(0.4))
                .draw()?;
        }
        Ok(())
    }
}

/// Tile maps into a grid with `columns` columns and save as one PNG.
/// Legends of all tiles are written to a shared sidecar.
pub fn save_panel(maps: &[Map<'_>], columns: usize, path: &Path) -> Result<PathBuf> {
    let columns = columns.max(1);
    let rows = maps.len().div_ceil(columns).max(1);
    let tile_w = maps.iter().map(|m| m.size().0).max().unwrap_or(MIN_PLOT);
    let tile_h = maps.iter().map(|m| m.size().1).max().unwrap_or(MIN_PLOT);
    init_font(maps.iter().find_map(|m| m.font.as_deref()));

    {
        let size = (columns as u32 * tile_w, rows as u32 * tile_h);
        let root = LabelSafe::new(BitMapBackend::new(path, size)).into_drawing_area();
        root.fill(&WHITE)?;
        for (map, area) in maps.iter().zip(root.split_evenly((rows, columns))) {
            map.draw_on(&area)?;
        }
        root.present()
            .with_context(|| format!("writing panel {}", path.display()))?;
    }

    let legends: Vec<Legend> = maps.iter().flat_map(|m| m.legends.iter().cloned()).collect();
    if !legends.is_empty() {
        write_legend_csv(&legends, &legend_path(path))?;
    }
    Ok(path.to_path_buf())
}

/// `maps/np.png` → `maps/np.legend.csv`
pub fn legend_path(image_path: &Path) -> PathBuf {
    let stem = image_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("map");
    image_path.with_file_name(format!("{stem}.legend.csv"))
}

fn write_legend_csv(legends: &[Legend], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating legend {}", path.display()))?;
    for legend in legends {
        for (label, color) in &legend.entries {
            writer.serialize(LegendRow {
                legend: &legend.title,
                label,
                color: hex(*color),
            })?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn rgba(c: Color) -> RGBAColor {
    RGBAColor(c.0[0], c.0[1], c.0[2], c.0[3] as f64 / 255.0)
}

fn ring_points(line: &LineString<f64>) -> Vec<(f64, f64)> {
    line.coords().map(|c| (c.x, c.y)).collect()
}

/// Part of `geometry` inside the map window; `None` when nothing is visible.
fn clip_polygons(
    geometry: &MultiPolygon<f64>,
    window: &Rect<f64>,
    clip: &MultiPolygon<f64>,
) -> Option<MultiPolygon<f64>> {
    let bbox = geometry.bounding_rect()?;
    if window.contains(&bbox) {
        return Some(geometry.clone());
    }
    if !window.intersects(&bbox) {
        return None;
    }
    let visible = geometry.intersection(clip);
    (!visible.0.is_empty()).then_some(visible)
}

fn clip_lines(lines: MultiLineString<f64>, window: &Rect<f64>, clip: &MultiPolygon<f64>) -> MultiLineString<f64> {
    match lines.bounding_rect() {
        Some(bbox) if window.contains(&bbox) => lines,
        Some(bbox) if window.intersects(&bbox) => clip.clip(&lines, false),
        _ => MultiLineString(Vec::new()),
    }
}

// ---------------------------------------------------------------------------
// Backend wrapper: labels are optional
// ---------------------------------------------------------------------------

/// Forwards everything to the wrapped backend, but a missing font only drops
/// the text instead of failing the whole map.
struct LabelSafe<DB> {
    inner: DB,
}

impl<DB> LabelSafe<DB> {
    fn new(inner: DB) -> Self {
        Self { inner }
    }
}

impl<DB: DrawingBackend> DrawingBackend for LabelSafe<DB> {
    type ErrorType = DB::ErrorType;

    fn get_size(&self) -> (u32, u32) {
        self.inner.get_size()
    }

    fn ensure_prepared(&mut self) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.ensure_prepared()
    }

    fn present(&mut self) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.present()
    }

    fn draw_pixel(
        &mut self,
        point: BackendCoord,
        color: BackendColor,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.draw_pixel(point, color)
    }

    fn draw_line<S: BackendStyle>(
        &mut self,
        from: BackendCoord,
        to: BackendCoord,
        style: &S,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.draw_line(from, to, style)
    }

    fn draw_rect<S: BackendStyle>(
        &mut self,
        upper_left: BackendCoord,
        bottom_right: BackendCoord,
        style: &S,
        fill: bool,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.draw_rect(upper_left, bottom_right, style, fill)
    }

    fn draw_path<S: BackendStyle, I: IntoIterator<Item = BackendCoord>>(
        &mut self,
        path: I,
        style: &S,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.draw_path(path, style)
    }

    fn draw_circle<S: BackendStyle>(
        &mut self,
        center: BackendCoord,
        radius: u32,
        style: &S,
        fill: bool,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.draw_circle(center, radius, style, fill)
    }

    fn fill_polygon<S: BackendStyle, I: IntoIterator<Item = BackendCoord>>(
        &mut self,
        vert: I,
        style: &S,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.fill_polygon(vert, style)
    }

    fn blit_bitmap(
        &mut self,
        pos: BackendCoord,
        (iw, ih): (u32, u32),
        src: &[u8],
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.inner.blit_bitmap(pos, (iw, ih), src)
    }

    fn draw_text<TStyle: BackendTextStyle>(
        &mut self,
        text: &str,
        style: &TStyle,
        pos: BackendCoord,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        match self.inner.draw_text(text, style, pos) {
            Err(DrawingErrorKind::FontError(e)) => {
                debug!("label '{text}' not drawn: {e}");
                Ok(())
            }
            other => other,
        }
    }

    fn estimate_text_size<TStyle: BackendTextStyle>(
        &self,
        text: &str,
        style: &TStyle,
    ) -> Result<(u32, u32), DrawingErrorKind<Self::ErrorType>> {
        match self.inner.estimate_text_size(text, style) {
            Err(DrawingErrorKind::FontError(_)) => Ok(approx_text_size(text, style.size())),
            other => other,
        }
    }
}

/// Rough box of `text` at `size` px, for layout when no font is loaded.
fn approx_text_size(text: &str, size: f64) -> (u32, u32) {
    let chars = text.chars().count() as f64;
    ((chars * size * 0.6).ceil() as u32, size.ceil() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::HIGHLIGHT_RED;
    use crate::vector::tests::square;

    fn extent() -> GridSpec {
        GridSpec::new(0.0, 0.0, 10.0, 5.0, 1.0).unwrap()
    }

    fn has_color(img: &image::RgbaImage, c: Color) -> bool {
        img.pixels().any(|p| p.0[..3] == c.0[..3])
    }

    #[test]
    fn small_extents_keep_a_minimum_plot_size() {
        let map = Map::new("t", extent(), &RenderConfig::default());
        let (w, h) = map.size();
        assert_eq!(w, MIN_PLOT + Y_LABEL_AREA + 2 * MARGIN);
        assert_eq!(h, MIN_PLOT / 2 + X_LABEL_AREA + CAPTION_BAND + 2 * MARGIN);

        let global = GridSpec::global(1.0).unwrap();
        let map = Map::new("t", global, &RenderConfig::default());
        assert_eq!(map.size().0, 360 * 4 + Y_LABEL_AREA + 2 * MARGIN);
    }

    #[test]
    fn raster_cells_become_ramp_colours() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratio.png");
        let mut r = Raster::empty(extent());
        r.set(0, 0, Some(1.0));
        let ramp = ColorRamp::named("viridis", 0.0, 1.0).unwrap();

        let mut map = Map::new("N:P ratio", extent(), &RenderConfig::default());
        map.raster(&r, &ramp)
            .legend("ratio", Mark::Swatch, ramp.legend_entries(3));
        map.save(&path).unwrap();

        let img = image::open(&path).unwrap().to_rgba8();
        assert_eq!((img.width(), img.height()), map.size());
        assert!(has_color(&img, ramp.color_at(1.0)));
        let legend = std::fs::read_to_string(legend_path(&path)).unwrap();
        assert!(legend.starts_with("legend,label,color"));
        assert_eq!(legend.lines().count(), 4);
    }

    #[test]
    fn polygons_outside_the_extent_are_clipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eez.png");
        // reaches far west of the map, over the axis labels if left unclipped
        let layer = PolygonLayer::from_features(vec![square("A", -50.0, -20.0, 3.0, 20.0)]);

        let mut map = Map::new("EEZ", extent(), &RenderConfig::default());
        map.fill_polygons(&layer, HIGHLIGHT_RED);
        map.save(&path).unwrap();

        let img = image::open(&path).unwrap().to_rgba8();
        assert!(has_color(&img, HIGHLIGHT_RED));
        for y in 0..img.height() {
            for x in 0..MARGIN {
                assert_ne!(img.get_pixel(x, y).0[..3], HIGHLIGHT_RED.0[..3], "({x}, {y})");
            }
        }
    }

    #[test]
    fn panel_tiles_maps_in_a_grid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("panel.png");
        let config = RenderConfig::default();
        let maps: Vec<Map> = ["winter", "spring", "summer", "autumn"]
            .into_iter()
            .map(|s| Map::new(s, extent(), &config))
            .collect();
        save_panel(&maps, 2, &path).unwrap();
        let (w, h) = maps[0].size();
        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (2 * w, 2 * h));
    }

    #[test]
    fn text_estimate_without_font() {
        assert_eq!(approx_text_size("abcde", 10.0), (30, 10));
        assert_eq!(approx_text_size("", 12.0), (0, 12));
    }
}
