//! Planar projections from topology coordinates to canvas coordinates.
//!
//! The default county topology ships pre-projected to the 975x610 canvas, so
//! `Identity` is the default. `Albers` handles raw longitude/latitude input.

use geo::{Coord, MapCoords, MultiLineString, MultiPolygon};
use serde::Deserialize;
use std::f64::consts::PI;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct AlbersParams {
    pub parallels: [f64; 2],
    pub rotate: f64,
    pub center: [f64; 2],
    pub scale: f64,
    pub translate: [f64; 2],
}

impl Default for AlbersParams {
    fn default() -> Self {
        Self {
            parallels: [29.5, 45.5],
            rotate: 96.0,
            center: [-0.6, 38.7],
            scale: 1070.0,
            translate: [480.0, 250.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "ProjectionSetting")]
pub enum Projection {
    Identity,
    Albers(AlbersParams),
}

// Accepts `projection = "albers"` as well as `[render.projection.albers]` tables.
#[derive(Deserialize)]
#[serde(untagged)]
enum ProjectionSetting {
    Named(String),
    Albers { albers: AlbersParams },
}

impl TryFrom<ProjectionSetting> for Projection {
    type Error = String;

    fn try_from(setting: ProjectionSetting) -> Result<Self, Self::Error> {
        match setting {
            ProjectionSetting::Named(name) => match name.to_ascii_lowercase().as_str() {
                "identity" | "none" => Ok(Projection::Identity),
                "albers" => Ok(Projection::Albers(AlbersParams::default())),
                other => Err(format!("unknown projection '{}'", other)),
            },
            ProjectionSetting::Albers { albers } => Ok(Projection::Albers(albers)),
        }
    }
}

impl Projection {
    pub fn project(&self, c: Coord<f64>) -> Coord<f64> {
        match self {
            Projection::Identity => c,
            Projection::Albers(params) => ConicEqualArea::new(params).project(c),
        }
    }

    pub fn project_polygons(&self, mp: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        match self {
            Projection::Identity => mp.clone(),
            Projection::Albers(params) => {
                let conic = ConicEqualArea::new(params);
                mp.map_coords(|c| conic.project(c))
            }
        }
    }

    pub fn project_lines(&self, ml: &MultiLineString<f64>) -> MultiLineString<f64> {
        match self {
            Projection::Identity => ml.clone(),
            Projection::Albers(params) => {
                let conic = ConicEqualArea::new(params);
                ml.map_coords(|c| conic.project(c))
            }
        }
    }
}

/// Albers conic equal-area with a pre-rotation in longitude.
struct ConicEqualArea {
    n: f64,
    c: f64,
    r0: f64,
    rotate: f64,
    k: f64,
    dx: f64,
    dy: f64,
}

impl ConicEqualArea {
    fn new(params: &AlbersParams) -> Self {
        let phi0 = params.parallels[0].to_radians();
        let phi1 = params.parallels[1].to_radians();
        let sy0 = phi0.sin();
        let n = (sy0 + phi1.sin()) / 2.0;
        let c = 1.0 + sy0 * (2.0 * n - sy0);
        let r0 = c.sqrt() / n;

        let mut conic = Self {
            n,
            c,
            r0,
            rotate: params.rotate.to_radians(),
            k: params.scale,
            dx: 0.0,
            dy: 0.0,
        };
        // The center is expressed in the rotated frame.
        let (cx, cy) = conic.raw(params.center[0].to_radians(), params.center[1].to_radians());
        conic.dx = params.translate[0] - cx * conic.k;
        conic.dy = params.translate[1] + cy * conic.k;
        conic
    }

    fn raw(&self, lambda: f64, phi: f64) -> (f64, f64) {
        let r = (self.c - 2.0 * self.n * phi.sin()).max(0.0).sqrt() / self.n;
        let x = lambda * self.n;
        (r * x.sin(), self.r0 - r * x.cos())
    }

    fn project(&self, c: Coord<f64>) -> Coord<f64> {
        let mut lambda = c.x.to_radians() + self.rotate;
        if lambda > PI {
            lambda -= 2.0 * PI;
        } else if lambda < -PI {
            lambda += 2.0 * PI;
        }
        let (x, y) = self.raw(lambda, c.y.to_radians());
        Coord {
            x: self.dx + x * self.k,
            y: self.dy - y * self.k,
        }
    }
}

fn fmt_num(v: f64) -> String {
    let rounded = (v * 1000.0).round() / 1000.0;
    if rounded == 0.0 {
        "0".to_string()
    } else {
        format!("{}", rounded)
    }
}

/// SVG path data for closed polygon rings.
pub fn polygons_path(mp: &MultiPolygon<f64>) -> String {
    let mut d = String::new();
    for polygon in mp {
        for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
            let coords: Vec<&Coord<f64>> = ring.coords().collect();
            // The closing coordinate is implied by `Z`.
            let open = match coords.split_last() {
                Some((last, rest)) if rest.first() == Some(last) => rest,
                _ => &coords[..],
            };
            write_run(&mut d, open.iter().copied());
            if !open.is_empty() {
                d.push('Z');
            }
        }
    }
    d
}

/// SVG path data for open polylines.
pub fn lines_path(ml: &MultiLineString<f64>) -> String {
    let mut d = String::new();
    for line in ml {
        write_run(&mut d, line.coords());
    }
    d
}

fn write_run<'a>(d: &mut String, coords: impl Iterator<Item = &'a Coord<f64>>) {
    for (i, c) in coords.enumerate() {
        let cmd = if i == 0 { 'M' } else { 'L' };
        let _ = write!(d, "{}{},{}", cmd, fmt_num(c.x), fmt_num(c.y));
    }
}
