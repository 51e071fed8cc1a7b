//! Join index and the sequential color scale built from the statistics.

use crate::types::{RegionId, Rgb, StatRecord};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct JoinIndex {
    records: HashMap<RegionId, StatRecord>,
}

impl JoinIndex {
    /// Later records replace earlier ones with the same id.
    pub fn build(records: &[StatRecord]) -> Self {
        let records = records
            .iter()
            .map(|r| (r.region_id, r.clone()))
            .collect();
        Self { records }
    }

    pub fn get(&self, id: RegionId) -> Option<&StatRecord> {
        self.records.get(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &StatRecord> {
        self.records.values()
    }
}

/// Continuous value -> color mapping over `[min, max]` of the statistics.
///
/// A scale built from no records has no domain and maps nothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorScale {
    domain: Option<(f64, f64)>,
}

impl ColorScale {
    pub fn from_records(records: &[StatRecord]) -> Self {
        Self::from_values(records.iter().map(|r| r.value))
    }

    /// Domain over the joined records only, so replaced duplicates don't count.
    pub fn from_index(index: &JoinIndex) -> Self {
        Self::from_values(index.records().map(|r| r.value))
    }

    fn from_values(values: impl Iterator<Item = f64>) -> Self {
        let domain = values.fold(None, |acc, v| {
            if !v.is_finite() {
                return acc;
            }
            match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((f64::min(lo, v), f64::max(hi, v))),
            }
        });
        Self { domain }
    }

    pub fn domain(&self) -> Option<(f64, f64)> {
        self.domain
    }

    /// Normalized ramp position; 0.5 for every value when min == max.
    pub fn position(&self, value: f64) -> Option<f64> {
        let (lo, hi) = self.domain?;
        if !value.is_finite() {
            return None;
        }
        if hi == lo {
            return Some(0.5);
        }
        Some((value - lo) / (hi - lo))
    }

    pub fn color(&self, value: f64) -> Option<Rgb> {
        self.position(value).map(cividis)
    }
}

/// Polynomial fit of the cividis colormap. `t` is clamped to `[0, 1]`.
pub fn cividis(t: f64) -> Rgb {
    let t = t.clamp(0.0, 1.0);
    let channel = |v: f64| v.round().clamp(0.0, 255.0) as u8;
    let r = -4.54 - t * (35.34 - t * (2381.73 - t * (6402.7 - t * (7024.72 - t * 2710.57))));
    let g = 32.49 + t * (170.73 + t * (52.82 - t * (131.46 - t * (176.58 - t * 67.37))));
    let b = 81.24 + t * (442.36 - t * (2482.43 - t * (6167.24 - t * (6614.94 - t * 2475.67))));
    Rgb(channel(r), channel(g), channel(b))
}

fn tick_increment(start: f64, stop: f64, count: usize) -> f64 {
    let step = (stop - start) / count.max(1) as f64;
    let power = step.log10().floor();
    let error = step / 10f64.powf(power);
    let factor = if error >= 50f64.sqrt() {
        10.0
    } else if error >= 10f64.sqrt() {
        5.0
    } else if error >= 2f64.sqrt() {
        2.0
    } else {
        1.0
    };
    factor * 10f64.powf(power)
}

/// Roughly `count` round values (1, 2 or 5 times a power of ten) in `[start, stop]`.
pub fn ticks(start: f64, stop: f64, count: usize) -> Vec<f64> {
    if !(start.is_finite() && stop.is_finite()) || count == 0 {
        return Vec::new();
    }
    if start == stop {
        return vec![start];
    }
    let (lo, hi) = if start < stop { (start, stop) } else { (stop, start) };
    let inc = tick_increment(lo, hi, count);
    if !inc.is_finite() || inc <= 0.0 {
        return Vec::new();
    }
    let first = (lo / inc).ceil() as i64;
    let last = (hi / inc).floor() as i64;
    // Multiply integers back out so values like 0.30000000000000004 don't appear.
    let mut out: Vec<f64> = (first..=last)
        .map(|i| {
            if inc >= 1.0 {
                i as f64 * inc
            } else {
                i as f64 / (1.0 / inc).round()
            }
        })
        .collect();
    if start > stop {
        out.reverse();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: RegionId, value: f64) -> StatRecord {
        StatRecord {
            region_id: id,
            display_name: format!("Area {}", id),
            subregion_name: "ST".to_string(),
            value,
        }
    }

    #[test]
    fn join_is_last_write_wins() {
        let index = JoinIndex::build(&[record(1, 10.0), record(2, 20.0), record(1, 30.0)]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(1).map(|r| r.value), Some(30.0));
        assert!(index.get(3).is_none());
    }

    #[test]
    fn domain_spans_min_and_max() {
        let scale = ColorScale::from_records(&[record(1, 40.0), record(2, 2.6), record(3, 75.1)]);
        assert_eq!(scale.domain(), Some((2.6, 75.1)));
        assert_eq!(scale.position(2.6), Some(0.0));
        assert_eq!(scale.position(75.1), Some(1.0));
    }

    #[test]
    fn replaced_duplicates_do_not_stretch_the_domain() {
        let index = JoinIndex::build(&[record(1, 99.0), record(2, 10.0), record(1, 50.0)]);
        let scale = ColorScale::from_index(&index);
        assert_eq!(scale.domain(), Some((10.0, 50.0)));
        assert_eq!(scale.position(50.0), Some(1.0));
    }

    #[test]
    fn empty_records_give_a_scale_that_maps_nothing() {
        let scale = ColorScale::from_records(&[]);
        assert_eq!(scale.domain(), None);
        assert_eq!(scale.color(10.0), None);
    }

    #[test]
    fn single_value_domain_maps_to_ramp_middle() {
        let scale = ColorScale::from_records(&[record(1, 20.0)]);
        assert_eq!(scale.position(20.0), Some(0.5));
        assert_eq!(scale.color(20.0), Some(cividis(0.5)));
    }

    #[test]
    fn cividis_endpoints_and_clamping() {
        assert_eq!(cividis(0.0), Rgb(0, 32, 81));
        assert_eq!(cividis(1.0), Rgb(253, 234, 69));
        assert_eq!(cividis(-3.0), cividis(0.0));
        assert_eq!(cividis(7.0), cividis(1.0));
    }

    #[test]
    fn larger_values_sit_further_along_the_ramp() {
        let records: Vec<StatRecord> = [5.0, 12.5, 30.0, 47.25, 60.0]
            .iter()
            .enumerate()
            .map(|(i, v)| record(i as RegionId, *v))
            .collect();
        let scale = ColorScale::from_records(&records);
        let positions: Vec<f64> = records.iter().filter_map(|r| scale.position(r.value)).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        // Cividis brightens monotonically; the green channel tracks that.
        let greens: Vec<u8> = records
            .iter()
            .filter_map(|r| scale.color(r.value))
            .map(|c| c.1)
            .collect();
        assert!(greens.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn ticks_pick_round_steps() {
        assert_eq!(
            ticks(2.6, 75.1, 8),
            vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0]
        );
        assert_eq!(ticks(0.0, 1.0, 5), vec![0.0, 0.2, 0.4, 0.6, 0.8, 1.0]);
        assert_eq!(ticks(3.0, 3.0, 8), vec![3.0]);
        assert!(ticks(f64::NAN, 1.0, 8).is_empty());
    }
}
