//! TopoJSON decoding.
//!
//! Everything here borrows the topology immutably: features and meshes are
//! built into fresh `geo` values and the parsed document is never reshaped.

use crate::types::RegionId;
use anyhow::{anyhow, Context, Result};
use geo::{Coord, LineString, MultiLineString, MultiPolygon, Point, Polygon};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Transform {
    pub scale: [f64; 2],
    pub translate: [f64; 2],
}

#[derive(Debug, Clone, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub transform: Option<Transform>,
    #[serde(default)]
    pub arcs: Vec<Vec<Vec<f64>>>,
    #[serde(default)]
    pub objects: HashMap<String, Geometry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawGeometry")]
pub struct Geometry {
    pub id: Option<Value>,
    pub properties: Option<Map<String, Value>>,
    pub shape: Shape,
}

#[derive(Debug, Clone)]
pub enum Shape {
    Null,
    Point(Vec<f64>),
    MultiPoint(Vec<Vec<f64>>),
    LineString(Vec<i64>),
    MultiLineString(Vec<Vec<i64>>),
    Polygon(Vec<Vec<i64>>),
    MultiPolygon(Vec<Vec<Vec<i64>>>),
    Collection(Vec<Geometry>),
}

#[derive(Deserialize)]
struct RawGeometry {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
    #[serde(default)]
    arcs: Option<Value>,
    #[serde(default)]
    coordinates: Option<Value>,
    #[serde(default)]
    geometries: Vec<Geometry>,
}

impl TryFrom<RawGeometry> for Geometry {
    type Error = String;

    fn try_from(raw: RawGeometry) -> Result<Self, Self::Error> {
        fn field<T: serde::de::DeserializeOwned>(v: Option<Value>, name: &str) -> Result<T, String> {
            let v = v.ok_or_else(|| format!("geometry is missing '{}'", name))?;
            serde_json::from_value(v).map_err(|e| format!("bad '{}': {}", name, e))
        }

        let shape = match raw.kind.as_deref() {
            None => Shape::Null,
            Some("Point") => Shape::Point(field(raw.coordinates, "coordinates")?),
            Some("MultiPoint") => Shape::MultiPoint(field(raw.coordinates, "coordinates")?),
            Some("LineString") => Shape::LineString(field(raw.arcs, "arcs")?),
            Some("MultiLineString") => Shape::MultiLineString(field(raw.arcs, "arcs")?),
            Some("Polygon") => Shape::Polygon(field(raw.arcs, "arcs")?),
            Some("MultiPolygon") => Shape::MultiPolygon(field(raw.arcs, "arcs")?),
            Some("GeometryCollection") => Shape::Collection(raw.geometries),
            Some(other) => return Err(format!("unknown geometry type '{}'", other)),
        };

        Ok(Geometry {
            id: raw.id,
            properties: raw.properties,
            shape,
        })
    }
}

impl Geometry {
    pub fn region_id(&self) -> Option<RegionId> {
        self.id.as_ref().and_then(parse_region_id)
    }
}

/// Ids arrive either as JSON numbers or as zero-padded strings ("01001").
pub fn parse_region_id(v: &Value) -> Option<RegionId> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct Feature {
    pub id: Option<RegionId>,
    pub properties: Option<Map<String, Value>>,
    pub geometry: Option<geo::Geometry<f64>>,
}

impl Feature {
    pub fn multi_polygon(&self) -> Option<MultiPolygon<f64>> {
        match &self.geometry {
            Some(geo::Geometry::Polygon(p)) => Some(MultiPolygon::new(vec![p.clone()])),
            Some(geo::Geometry::MultiPolygon(mp)) => Some(mp.clone()),
            _ => None,
        }
    }
}

/// Mesh filter that keeps arcs shared by two different geometries.
pub fn different_geometries(a: &Geometry, b: &Geometry) -> bool {
    !std::ptr::eq(a, b)
}

type PointKey = (u64, u64);

fn key(c: &Coord<f64>) -> PointKey {
    (c.x.to_bits(), c.y.to_bits())
}

fn arc_index(i: i64) -> (usize, bool) {
    if i < 0 {
        ((!i) as usize, true)
    } else {
        (i as usize, false)
    }
}

impl Topology {
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse TopoJSON")
    }

    pub fn object(&self, name: &str) -> Result<&Geometry> {
        self.objects
            .get(name)
            .ok_or_else(|| anyhow!("Topology has no object named '{}'", name))
    }

    fn transform_point(&self, p: &[f64]) -> Coord<f64> {
        let (x, y) = (p.first().copied().unwrap_or(0.0), p.get(1).copied().unwrap_or(0.0));
        match &self.transform {
            Some(t) => Coord {
                x: x * t.scale[0] + t.translate[0],
                y: y * t.scale[1] + t.translate[1],
            },
            None => Coord { x, y },
        }
    }

    /// Absolute coordinates of every arc, delta-decoded when quantized.
    pub fn decode_arcs(&self) -> Vec<Vec<Coord<f64>>> {
        self.arcs
            .iter()
            .map(|arc| match &self.transform {
                Some(t) => {
                    let (mut x, mut y) = (0.0, 0.0);
                    arc.iter()
                        .map(|p| {
                            x += p.first().copied().unwrap_or(0.0);
                            y += p.get(1).copied().unwrap_or(0.0);
                            Coord {
                                x: x * t.scale[0] + t.translate[0],
                                y: y * t.scale[1] + t.translate[1],
                            }
                        })
                        .collect()
                }
                None => arc.iter().map(|p| self.transform_point(p)).collect(),
            })
            .collect()
    }

    /// Converts the named object into features, one per member geometry.
    pub fn feature(&self, name: &str) -> Result<Vec<Feature>> {
        let object = self.object(name)?;
        let arcs = self.decode_arcs();
        let members: Vec<&Geometry> = match &object.shape {
            Shape::Collection(geometries) => geometries.iter().collect(),
            _ => vec![object],
        };
        members
            .into_iter()
            .map(|g| {
                Ok(Feature {
                    id: g.region_id(),
                    properties: g.properties.clone(),
                    geometry: self.geometry(g, &arcs)?,
                })
            })
            .collect()
    }

    fn geometry(&self, g: &Geometry, arcs: &[Vec<Coord<f64>>]) -> Result<Option<geo::Geometry<f64>>> {
        let line = |refs: &[i64]| -> Result<LineString<f64>> { Ok(LineString::new(join_arcs(arcs, refs)?)) };
        let polygon = |rings: &[Vec<i64>]| -> Result<Polygon<f64>> {
            let mut rings = rings
                .iter()
                .map(|r| line(r.as_slice()))
                .collect::<Result<Vec<_>>>()?
                .into_iter();
            let exterior = rings.next().unwrap_or_else(|| LineString::new(vec![]));
            Ok(Polygon::new(exterior, rings.collect()))
        };

        let geometry = match &g.shape {
            Shape::Null => return Ok(None),
            Shape::Point(p) => geo::Geometry::Point(Point::from(self.transform_point(p))),
            Shape::MultiPoint(ps) => geo::Geometry::MultiPoint(
                ps.iter().map(|p| Point::from(self.transform_point(p))).collect(),
            ),
            Shape::LineString(refs) => geo::Geometry::LineString(line(refs.as_slice())?),
            Shape::MultiLineString(lines) => geo::Geometry::MultiLineString(MultiLineString::new(
                lines.iter().map(|l| line(l.as_slice())).collect::<Result<_>>()?,
            )),
            Shape::Polygon(rings) => geo::Geometry::Polygon(polygon(rings.as_slice())?),
            Shape::MultiPolygon(polys) => geo::Geometry::MultiPolygon(MultiPolygon::new(
                polys.iter().map(|p| polygon(p.as_slice())).collect::<Result<_>>()?,
            )),
            Shape::Collection(children) => {
                let mut out = Vec::new();
                for child in children {
                    if let Some(c) = self.geometry(child, arcs)? {
                        out.push(c);
                    }
                }
                geo::Geometry::GeometryCollection(geo::GeometryCollection(out))
            }
        };
        Ok(Some(geometry))
    }

    /// Lines made of the arcs referenced by the named object.
    ///
    /// With a filter, an arc is kept only when `filter(first, last)` holds for
    /// the first and last geometry referencing it. Each arc appears once.
    pub fn mesh<F>(&self, name: &str, filter: Option<F>) -> Result<MultiLineString<f64>>
    where
        F: Fn(&Geometry, &Geometry) -> bool,
    {
        let object = self.object(name)?;
        let mut owners: Vec<&Geometry> = Vec::new();
        let mut geoms_by_arc: BTreeMap<usize, Vec<(i64, usize)>> = BTreeMap::new();
        collect_arc_owners(object, &mut owners, &mut geoms_by_arc);

        let selected: Vec<i64> = geoms_by_arc
            .values()
            .filter(|uses| match (&filter, uses.first(), uses.last()) {
                (Some(f), Some(first), Some(last)) => f(owners[first.1], owners[last.1]),
                _ => true,
            })
            .filter_map(|uses| uses.first().map(|u| u.0))
            .collect();

        let arcs = self.decode_arcs();
        stitch(&arcs, &selected)
    }
}

fn collect_arc_owners<'a>(
    g: &'a Geometry,
    owners: &mut Vec<&'a Geometry>,
    geoms_by_arc: &mut BTreeMap<usize, Vec<(i64, usize)>>,
) {
    let refs: Vec<i64> = match &g.shape {
        Shape::Collection(children) => {
            for child in children {
                collect_arc_owners(child, owners, geoms_by_arc);
            }
            return;
        }
        Shape::LineString(a) => a.clone(),
        Shape::MultiLineString(a) | Shape::Polygon(a) => a.iter().flatten().copied().collect(),
        Shape::MultiPolygon(a) => a.iter().flatten().flatten().copied().collect(),
        Shape::Null | Shape::Point(_) | Shape::MultiPoint(_) => return,
    };
    let owner = owners.len();
    owners.push(g);
    for i in refs {
        geoms_by_arc.entry(arc_index(i).0).or_default().push((i, owner));
    }
}

fn oriented<'a>(arcs: &'a [Vec<Coord<f64>>], i: i64) -> Result<Box<dyn Iterator<Item = Coord<f64>> + 'a>> {
    let (k, reversed) = arc_index(i);
    let arc = arcs
        .get(k)
        .ok_or_else(|| anyhow!("Arc index {} out of range ({} arcs)", i, arcs.len()))?;
    Ok(if reversed {
        Box::new(arc.iter().rev().copied())
    } else {
        Box::new(arc.iter().copied())
    })
}

/// Concatenates arcs, dropping the shared point at each junction.
fn join_arcs(arcs: &[Vec<Coord<f64>>], refs: &[i64]) -> Result<Vec<Coord<f64>>> {
    let mut points: Vec<Coord<f64>> = Vec::new();
    for &i in refs {
        points.pop();
        points.extend(oriented(arcs, i)?);
    }
    Ok(points)
}

struct Fragment {
    arcs: VecDeque<i64>,
    start: PointKey,
    end: PointKey,
}

/// Chains arcs that meet end-to-start into as few lines as possible.
fn stitch(arcs: &[Vec<Coord<f64>>], selected: &[i64]) -> Result<MultiLineString<f64>> {
    let mut fragments: Vec<Option<Fragment>> = Vec::new();
    let mut by_start: HashMap<PointKey, usize> = HashMap::new();
    let mut by_end: HashMap<PointKey, usize> = HashMap::new();

    for &i in selected {
        let points: Vec<Coord<f64>> = oriented(arcs, i)?.collect();
        let (Some(first), Some(last)) = (points.first(), points.last()) else {
            continue;
        };
        let (s, e) = (key(first), key(last));

        if let Some(fi) = by_end.remove(&s) {
            if let Some(f) = fragments[fi].as_mut() {
                f.arcs.push_back(i);
                f.end = e;
            }
            match by_start.get(&e).copied() {
                Some(gi) if gi != fi => {
                    by_start.remove(&e);
                    if let Some(g) = fragments[gi].take() {
                        by_end.insert(g.end, fi);
                        if let Some(f) = fragments[fi].as_mut() {
                            f.arcs.extend(g.arcs);
                            f.end = g.end;
                        }
                    }
                }
                _ => {
                    by_end.insert(e, fi);
                }
            }
        } else if let Some(fi) = by_start.remove(&e) {
            // `s` is not an end of any fragment here, so nothing can be joined in front.
            if let Some(f) = fragments[fi].as_mut() {
                f.arcs.push_front(i);
                f.start = s;
            }
            by_start.insert(s, fi);
        } else {
            let fi = fragments.len();
            fragments.push(Some(Fragment {
                arcs: VecDeque::from([i]),
                start: s,
                end: e,
            }));
            by_start.insert(s, fi);
            by_end.insert(e, fi);
        }
    }

    let lines = fragments
        .into_iter()
        .flatten()
        .map(|f| {
            let refs: Vec<i64> = f.arcs.into_iter().collect();
            join_arcs(arcs, &refs).map(LineString::new)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(MultiLineString::new(lines))
}
