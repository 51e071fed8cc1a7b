use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

pub type RegionId = i64;

/// One statistic row, keyed by FIPS code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatRecord {
    #[serde(rename = "fips")]
    pub region_id: RegionId,
    #[serde(rename = "area_name")]
    pub display_name: String,
    #[serde(rename = "state")]
    pub subregion_name: String,
    #[serde(rename = "bachelorsOrHigher")]
    pub value: f64,
}

/// 8-bit sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rgb({}, {}, {})", self.0, self.1, self.2)
    }
}

#[derive(Debug, Clone)]
pub struct RegionShape {
    pub id: Option<RegionId>,
    pub record: Option<StatRecord>,
    pub fill: String,
    pub geometry: MultiPolygon<f64>, // projected
    pub path: String,
}
