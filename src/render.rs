use crate::config::{AppConfig, LegendConfig};
use crate::projection::{lines_path, polygons_path};
use crate::scale::{cividis, ticks, ColorScale, JoinIndex};
use crate::topology::{different_geometries, Topology};
use crate::types::{RegionShape, Rgb, StatRecord};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::fmt::Write;
use std::fs;
use std::path::Path;

// Layout of the legend block, relative to its own origin.
const LEGEND_MARGIN_TOP: f64 = 18.0;
const LEGEND_TICK_SIZE: f64 = 6.0;
const LEGEND_RAMP_HEIGHT: f64 = 10.0;
const LEGEND_STOPS: usize = 16;

#[derive(Debug, Clone)]
pub struct LegendTick {
    pub x: f64,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct Legend {
    pub title: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub stops: Vec<(f64, Rgb)>,
    pub ticks: Vec<LegendTick>,
}

/// Everything drawn on the canvas, plus the join/scale it was drawn with.
#[derive(Debug, Clone)]
pub struct Scene {
    pub width: f64,
    pub height: f64,
    pub regions: Vec<RegionShape>,
    pub boundaries: Option<String>,
    pub boundary_color: String,
    pub legend: Option<Legend>,
    pub index: JoinIndex,
    pub scale: ColorScale,
}

impl Scene {
    fn empty(config: &AppConfig, index: JoinIndex, scale: ColorScale) -> Self {
        Self {
            width: config.render.width,
            height: config.render.height,
            regions: Vec::new(),
            boundaries: None,
            boundary_color: config.render.boundary_color.clone(),
            legend: None,
            index,
            scale,
        }
    }
}

/// Joins statistics onto the topology and lays out the choropleth.
///
/// Without a topology the scene is an empty canvas.
pub fn build_scene(
    config: &AppConfig,
    topology: Option<&Topology>,
    statistics: &[StatRecord],
) -> Result<Scene> {
    let index = JoinIndex::build(statistics);
    let scale = ColorScale::from_index(&index);

    let Some(topology) = topology else {
        tracing::warn!("no topology, skipping rendering");
        return Ok(Scene::empty(config, index, scale));
    };

    let projection = config.render.projection;
    let features = topology
        .feature(&config.input.regions_object)
        .with_context(|| format!("Failed to decode '{}'", config.input.regions_object))?;

    let regions: Vec<RegionShape> = features
        .par_iter()
        .filter_map(|feature| {
            let geometry = projection.project_polygons(&feature.multi_polygon()?);
            let record = feature.id.and_then(|id| index.get(id)).cloned();
            let fill = record
                .as_ref()
                .and_then(|r| scale.color(r.value))
                .map(|c| c.to_string())
                .unwrap_or_else(|| config.render.no_data_color.clone());
            let path = polygons_path(&geometry);
            Some(RegionShape {
                id: feature.id,
                record,
                fill,
                geometry,
                path,
            })
        })
        .collect();

    let unmatched = regions.iter().filter(|r| r.record.is_none()).count();
    if unmatched > 0 {
        tracing::warn!(unmatched, "regions without statistics use the no-data color");
    }

    let mesh = topology
        .mesh(&config.input.boundaries_object, Some(different_geometries))
        .with_context(|| format!("Failed to mesh '{}'", config.input.boundaries_object))?;
    let boundaries = lines_path(&projection.project_lines(&mesh));

    let legend = build_legend(&config.render.legend, &scale);

    tracing::info!(regions = regions.len(), borders = mesh.0.len(), "scene built");

    Ok(Scene {
        regions,
        boundaries: Some(boundaries),
        legend: Some(legend),
        ..Scene::empty(config, index, scale)
    })
}

fn build_legend(config: &LegendConfig, scale: &ColorScale) -> Legend {
    let stops = (0..LEGEND_STOPS)
        .map(|i| {
            let t = i as f64 / (LEGEND_STOPS - 1) as f64;
            (t, cividis(t))
        })
        .collect();

    let ticks = match scale.domain() {
        Some((lo, hi)) => ticks(lo, hi, config.ticks)
            .into_iter()
            .filter_map(|v| {
                let t = scale.position(v)?;
                Some(LegendTick {
                    x: t * config.width,
                    label: format!("{}{}", v, config.tick_suffix),
                })
            })
            .collect(),
        None => Vec::new(),
    };

    Legend {
        title: config.title.clone(),
        x: config.x,
        y: config.y,
        width: config.width,
        stops,
        ticks,
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

impl Scene {
    pub fn to_svg(&self) -> String {
        let mut svg = String::new();
        let _ = writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" style="display: block; max-width: 100%;">"#,
            w = self.width,
            h = self.height
        );

        if !self.regions.is_empty() {
            svg.push_str("<g>\n");
            for region in &self.regions {
                let _ = write!(svg, r#"<path class="county" fill="{}""#, escape(&region.fill));
                if let Some(record) = &region.record {
                    let _ = write!(
                        svg,
                        r#" data-fips="{}" data-education="{}""#,
                        record.region_id, record.value
                    );
                }
                let _ = writeln!(svg, r#" d="{}"/>"#, region.path);
            }
            svg.push_str("</g>\n");
        }

        if let Some(legend) = &self.legend {
            write_legend(&mut svg, legend);
        }

        if let Some(d) = &self.boundaries {
            let _ = writeln!(
                svg,
                r#"<path fill="none" stroke="{}" stroke-linejoin="round" d="{}"/>"#,
                escape(&self.boundary_color),
                d
            );
        }

        svg.push_str("</svg>\n");
        svg
    }

    pub fn write_svg(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create output directory")?;
        }
        fs::write(path, self.to_svg()).with_context(|| format!("Failed to write SVG: {:?}", path))?;
        tracing::info!(?path, "wrote SVG");
        Ok(())
    }
}

fn write_legend(svg: &mut String, legend: &Legend) {
    let axis_y = LEGEND_MARGIN_TOP + LEGEND_RAMP_HEIGHT;

    let _ = writeln!(svg, r#"<g id="legend" transform="translate({},{})">"#, legend.x, legend.y);
    svg.push_str("<defs><linearGradient id=\"legend-ramp\">");
    for (offset, color) in &legend.stops {
        let _ = write!(svg, r#"<stop offset="{:.3}" stop-color="{}"/>"#, offset, color);
    }
    svg.push_str("</linearGradient></defs>\n");
    let _ = writeln!(
        svg,
        r#"<rect x="0" y="{}" width="{}" height="{}" fill="url(#legend-ramp)"/>"#,
        LEGEND_MARGIN_TOP, legend.width, LEGEND_RAMP_HEIGHT
    );

    let _ = writeln!(
        svg,
        r#"<g transform="translate(0,{})" font-size="10" font-family="sans-serif" text-anchor="middle">"#,
        axis_y
    );
    for tick in &legend.ticks {
        let _ = writeln!(
            svg,
            r#"<g class="tick" transform="translate({:.3},0)"><line stroke="currentColor" y2="{}"/><text fill="currentColor" y="{}" dy="0.71em">{}</text></g>"#,
            tick.x,
            -LEGEND_RAMP_HEIGHT,
            LEGEND_TICK_SIZE + 3.0,
            escape(&tick.label)
        );
    }
    svg.push_str("</g>\n");

    let _ = writeln!(
        svg,
        r#"<text class="title" x="0" y="{}" font-size="10" font-family="sans-serif" font-weight="bold">{}</text>"#,
        LEGEND_MARGIN_TOP - 6.0,
        escape(&legend.title)
    );
    svg.push_str("</g>\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATES_AND_COUNTIES: &str = r#"{
        "type": "Topology",
        "arcs": [
            [[1,0],[1,1]],
            [[1,1],[0,1],[0,0],[1,0]],
            [[1,0],[2,0],[2,1],[1,1]]
        ],
        "objects": {
            "counties": {"type": "GeometryCollection", "geometries": [
                {"type": "Polygon", "id": 1001, "arcs": [[0, 1]]},
                {"type": "Polygon", "id": 1003, "arcs": [[2, -1]]}
            ]},
            "states": {"type": "GeometryCollection", "geometries": [
                {"type": "MultiPolygon", "id": "01", "arcs": [[[0, 1]]]},
                {"type": "MultiPolygon", "id": "02", "arcs": [[[2, -1]]]}
            ]}
        }
    }"#;

    fn record(id: i64, name: &str, value: f64) -> StatRecord {
        StatRecord {
            region_id: id,
            display_name: name.to_string(),
            subregion_name: "AL".to_string(),
            value,
        }
    }

    #[test]
    fn regions_carry_joined_attributes_and_colors() {
        let topo = Topology::from_json(STATES_AND_COUNTIES).unwrap();
        let stats = [record(1001, "Autauga", 20.0), record(1003, "Baldwin", 40.0)];
        let scene = build_scene(&AppConfig::default(), Some(&topo), &stats).unwrap();

        assert_eq!(scene.regions.len(), 2);
        assert_eq!(scene.regions[0].fill, cividis(0.0).to_string());
        assert_eq!(scene.regions[1].fill, cividis(1.0).to_string());

        let svg = scene.to_svg();
        assert!(svg.contains(r#"data-fips="1001" data-education="20""#));
        assert!(svg.contains(r#"data-fips="1003" data-education="40""#));
        assert!(svg.contains(r#"id="legend" transform="translate(610,20)""#));
        assert!(svg.contains(r#"width="975" height="610" viewBox="0 0 975 610""#));
        assert!(svg.contains(r#"fill="none" stroke="white" stroke-linejoin="round" d="M1,0L1,1""#));
    }

    #[test]
    fn unmatched_region_uses_no_data_color() {
        let topo = Topology::from_json(STATES_AND_COUNTIES).unwrap();
        let scene = build_scene(&AppConfig::default(), Some(&topo), &[record(1001, "Autauga", 20.0)])
            .unwrap();
        let unmatched = &scene.regions[1];
        assert_eq!(unmatched.id, Some(1003));
        assert!(unmatched.record.is_none());
        assert_eq!(unmatched.fill, "#ccc");
        assert_eq!(scene.to_svg().matches("data-fips").count(), 1);
    }

    #[test]
    fn empty_statistics_render_every_region_as_no_data() {
        let topo = Topology::from_json(STATES_AND_COUNTIES).unwrap();
        let scene = build_scene(&AppConfig::default(), Some(&topo), &[]).unwrap();
        assert_eq!(scene.scale.domain(), None);
        assert!(scene.regions.iter().all(|r| r.fill == "#ccc"));
        assert!(scene.legend.as_ref().unwrap().ticks.is_empty());
    }

    #[test]
    fn duplicate_ids_color_by_the_surviving_record() {
        let topo = Topology::from_json(STATES_AND_COUNTIES).unwrap();
        let stats = [
            record(1001, "Autauga", 99.0),
            record(1003, "Baldwin", 10.0),
            record(1001, "Autauga", 50.0),
        ];
        let scene = build_scene(&AppConfig::default(), Some(&topo), &stats).unwrap();
        assert_eq!(scene.scale.domain(), Some((10.0, 50.0)));
        assert_eq!(scene.regions[0].fill, cividis(1.0).to_string());
        assert!(scene.to_svg().contains(r#"data-fips="1001" data-education="50""#));
    }

    #[test]
    fn missing_topology_draws_no_paths() {
        let scene = build_scene(&AppConfig::default(), None, &[record(1001, "Autauga", 20.0)]).unwrap();
        let svg = scene.to_svg();
        assert!(!svg.contains("<path"));
        assert!(!svg.contains("legend"));
        assert!(svg.starts_with("<svg"));
    }

    #[test]
    fn legend_ticks_are_formatted_as_percentages() {
        let scale = ColorScale::from_records(&[record(1, "a", 2.6), record(2, "b", 75.1)]);
        let legend = build_legend(&LegendConfig::default(), &scale);
        let labels: Vec<&str> = legend.ticks.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["10%", "20%", "30%", "40%", "50%", "60%", "70%"]);
        assert!(legend.ticks.iter().all(|t| t.x >= 0.0 && t.x <= 260.0));
        assert_eq!(legend.stops.first().map(|s| s.1), Some(cividis(0.0)));
    }

    #[test]
    fn text_is_escaped() {
        assert_eq!(escape(r#"bachelor's <b> & "c""#), "bachelor&#39;s &lt;b&gt; &amp; &quot;c&quot;");
    }
}
