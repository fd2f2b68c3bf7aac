use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::decode::{EngineeringValue, RawValue};
use crate::prelude::*;
use crate::timecode;

/// Value returned by a discrete list conversion for a raw value outside the list.
pub const ILLEGAL_CONVERSION: &str = "illegal_conversion";
/// Value returned by a discrete range conversion for a raw value in none of its ranges.
pub const NO_CONVERSION: &str = "No Conversion";

/// Kind of engineering value a conversion produces.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReturnedKind {
    None,
    Number,
    Enum,
    String,
    Image,
    Spectrum,
    Raw,
}

/// One entry of a discrete conversion's enumeration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EnumEntry {
    pub value: i64,
    pub string: String,
}

/// Polynomial evaluated at the raw value. Coefficients are lowest order first.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Polynomial {
    pub name: String,
    pub order: usize,
    pub coefficients: Vec<f64>,
}

impl Polynomial {
    /// Highest supported polynomial order; higher orders evaluate to 0.
    pub const MAX_ORDER: usize = 7;
}

/// Index to string list, where `values[0]` is for raw value `low_index`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DiscreteList {
    pub name: String,
    pub values: Vec<String>,
    #[serde(default)]
    pub low_index: i64,
}

#[derive(Deserialize)]
struct DiscreteMapDef {
    name: String,
    indices: Vec<i64>,
    values: Vec<String>,
}

impl From<DiscreteMapDef> for DiscreteMap {
    fn from(def: DiscreteMapDef) -> Self {
        DiscreteMap::new(def.name, def.indices, def.values)
    }
}

/// Sparse index to string map.
///
/// Raw 0 is special: truncated packets get zero filled, so a 0 with no mapping of its
/// own converts to the number 0 rather than failing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(from = "DiscreteMapDef")]
pub struct DiscreteMap {
    pub name: String,
    indices: Vec<i64>,
    values: Vec<String>,
    #[serde(skip)]
    map: HashMap<i64, String>,
}

impl DiscreteMap {
    /// Pair `indices` with `values`. Extra entries in the longer of the two are ignored,
    /// and for duplicate indices the first value wins.
    #[must_use]
    pub fn new(name: impl Into<String>, indices: Vec<i64>, values: Vec<String>) -> Self {
        let name = name.into();
        let mut map = HashMap::with_capacity(indices.len());
        for (idx, val) in indices.iter().zip(values.iter()) {
            if let Some(existing) = map.get(idx) {
                warn!(conversion = %name, index = idx, %existing, duplicate = %val, "duplicate discrete index");
                continue;
            }
            map.insert(*idx, val.clone());
        }
        Self {
            name,
            indices,
            values,
            map,
        }
    }

    #[must_use]
    pub fn get(&self, index: i64) -> Option<&str> {
        self.map.get(&index).map(String::as_str)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DiscreteRange {
    pub low: i64,
    pub high: i64,
    pub value: String,
}

/// Inclusive ranges checked in order; the first containing the raw value wins.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DiscreteRangeList {
    pub name: String,
    pub ranges: Vec<DiscreteRange>,
}

/// Raw to engineering value conversion.
///
/// # Example
/// ```
/// use ccsds_telemetry::decode::{EngineeringValue, RawValue};
/// use ccsds_telemetry::dictionary::{Conversion, Polynomial};
///
/// let conv = Conversion::Polynomial(Polynomial {
///     name: "volts".into(),
///     order: 2,
///     coefficients: vec![1.0, 2.0, 3.0],
/// });
///
/// assert_eq!(conv.apply(&RawValue::F64(4.0)).unwrap(), EngineeringValue::Number(57.0));
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Conversion {
    #[default]
    Identity,
    Polynomial(Polynomial),
    DiscreteList(DiscreteList),
    DiscreteMap(DiscreteMap),
    DiscreteRange(DiscreteRangeList),
    /// Time40 seconds to an ITOS time string
    Time40,
    /// Time42 to an ITOS time string
    Time42,
    /// Time44 to an ITOS time string
    Time44,
    Time42ToSeconds,
    Time42ToSubseconds,
    SubsecondsToFraction,
    /// Passes the raw value through, tagged as image data.
    Image {
        #[serde(default)]
        camera: Option<String>,
    },
    /// Passes the raw value through, tagged as spectrum data.
    Spectrum,
}

impl Conversion {
    /// Conversions every dictionary can refer to by name.
    #[must_use]
    pub fn builtins() -> Vec<Conversion> {
        vec![
            Conversion::Identity,
            Conversion::Time40,
            Conversion::Time42,
            Conversion::Time44,
            Conversion::Time42ToSeconds,
            Conversion::Time42ToSubseconds,
            Conversion::SubsecondsToFraction,
            Conversion::Image { camera: None },
            Conversion::Spectrum,
        ]
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Conversion::Identity => "Identity",
            Conversion::Polynomial(p) => &p.name,
            Conversion::DiscreteList(l) => &l.name,
            Conversion::DiscreteMap(m) => &m.name,
            Conversion::DiscreteRange(r) => &r.name,
            Conversion::Time40 => "Time40 Conversion",
            Conversion::Time42 => "Time42 Conversion",
            Conversion::Time44 => "Time44 Conversion",
            Conversion::Time42ToSeconds => "Time42ToSeconds",
            Conversion::Time42ToSubseconds => "Time42ToSubseconds",
            Conversion::SubsecondsToFraction => "SubsecondsToFraction",
            Conversion::Image { .. } => "Image Conversion",
            Conversion::Spectrum => "Spectrum Conversion",
        }
    }

    #[must_use]
    pub fn returned_kind(&self) -> ReturnedKind {
        match self {
            Conversion::Identity => ReturnedKind::Raw,
            Conversion::Polynomial(_)
            | Conversion::Time42ToSeconds
            | Conversion::Time42ToSubseconds
            | Conversion::SubsecondsToFraction => ReturnedKind::Number,
            Conversion::DiscreteList(_)
            | Conversion::DiscreteMap(_)
            | Conversion::DiscreteRange(_) => ReturnedKind::Enum,
            Conversion::Time40 | Conversion::Time42 | Conversion::Time44 => ReturnedKind::String,
            Conversion::Image { .. } => ReturnedKind::Image,
            Conversion::Spectrum => ReturnedKind::Spectrum,
        }
    }

    /// Value/string pairs for the discrete conversions that have a fixed set of values.
    #[must_use]
    pub fn enumeration(&self) -> Option<Vec<EnumEntry>> {
        match self {
            Conversion::DiscreteList(l) => Some(
                l.values
                    .iter()
                    .enumerate()
                    .map(|(i, s)| EnumEntry {
                        value: l.low_index.saturating_add(i as i64),
                        string: s.clone(),
                    })
                    .collect(),
            ),
            Conversion::DiscreteMap(m) => Some(
                m.indices
                    .iter()
                    .zip(m.values.iter())
                    .map(|(i, s)| EnumEntry {
                        value: *i,
                        string: s.clone(),
                    })
                    .collect(),
            ),
            _ => None,
        }
    }

    fn failed(&self, reason: impl Into<String>) -> Error {
        Error::ConversionFailed {
            name: self.name().to_string(),
            reason: reason.into(),
        }
    }

    fn number(&self, raw: &RawValue) -> Result<f64> {
        raw.as_f64()
            .ok_or_else(|| self.failed(format!("{raw:?} is not numeric")))
    }

    fn integer(&self, raw: &RawValue) -> Result<i64> {
        raw.as_i64()
            .ok_or_else(|| self.failed(format!("{raw:?} is not numeric")))
    }

    /// Convert `raw` to its engineering value.
    ///
    /// # Errors
    /// [Error::ConversionFailed] if `raw` is not a type the conversion accepts, e.g., a
    /// string for a polynomial, or if a discrete map has no value for it.
    pub fn apply(&self, raw: &RawValue) -> Result<EngineeringValue> {
        let value = match self {
            Conversion::Identity => EngineeringValue::Raw(raw.clone()),
            Conversion::Polynomial(poly) => {
                let x = self.number(raw)?;
                if poly.order > Polynomial::MAX_ORDER {
                    return Ok(EngineeringValue::Number(0.0));
                }
                let Some(coefs) = poly.coefficients.get(..=poly.order) else {
                    return Err(self.failed(format!(
                        "order {} needs {} coefficients, have {}",
                        poly.order,
                        poly.order + 1,
                        poly.coefficients.len()
                    )));
                };
                EngineeringValue::Number(coefs.iter().rev().fold(0.0, |acc, c| acc * x + c))
            }
            Conversion::DiscreteList(list) => {
                let value = self
                    .integer(raw)?
                    .checked_sub(list.low_index)
                    .and_then(|idx| usize::try_from(idx).ok())
                    .and_then(|idx| list.values.get(idx))
                    .map_or(ILLEGAL_CONVERSION, String::as_str);
                EngineeringValue::Enum(value.to_string())
            }
            Conversion::DiscreteMap(map) => {
                let idx = self.integer(raw)?;
                match (map.get(idx), idx) {
                    (Some(val), _) => EngineeringValue::Enum(val.to_string()),
                    (None, 0) => EngineeringValue::Number(0.0),
                    (None, _) => return Err(self.failed(format!("no value for {idx}"))),
                }
            }
            Conversion::DiscreteRange(list) => {
                let x = self.integer(raw)?;
                let value = list
                    .ranges
                    .iter()
                    .find(|r| r.low <= x && x <= r.high)
                    .map_or(NO_CONVERSION, |r| r.value.as_str());
                EngineeringValue::Enum(value.to_string())
            }
            Conversion::Time40 => match raw {
                RawValue::U32(t) => EngineeringValue::String(timecode::time40_to_itos(*t)?),
                _ => return Err(self.failed("illegal time type")),
            },
            Conversion::Time42 => match raw {
                RawValue::U64(t) => EngineeringValue::String(timecode::time42_to_itos(*t)?),
                _ => return Err(self.failed("illegal time type")),
            },
            Conversion::Time44 => match raw {
                RawValue::U64(t) => EngineeringValue::String(timecode::time44_to_itos(*t)?),
                _ => return Err(self.failed("illegal time type")),
            },
            Conversion::Time42ToSeconds => {
                let t = self.integer(raw)? as u64;
                EngineeringValue::Number(f64::from(timecode::time42_to_seconds(t)))
            }
            Conversion::Time42ToSubseconds => {
                let t = self.integer(raw)? as u64;
                EngineeringValue::Number(f64::from(timecode::time42_to_subseconds(t)))
            }
            Conversion::SubsecondsToFraction => {
                EngineeringValue::Number(timecode::subseconds_to_fraction(self.number(raw)?))
            }
            Conversion::Image { .. } => EngineeringValue::Image(raw.clone()),
            Conversion::Spectrum => EngineeringValue::Spectrum(raw.clone()),
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn poly(order: usize, coefficients: &[f64]) -> Conversion {
        Conversion::Polynomial(Polynomial {
            name: "poly".into(),
            order,
            coefficients: coefficients.to_vec(),
        })
    }

    #[test_case(0, &[5.0], 3.0, 5.0; "constant")]
    #[test_case(1, &[1.0, 2.0], 3.0, 7.0; "linear")]
    #[test_case(2, &[1.0, 2.0, 3.0], 4.0, 57.0; "quadratic")]
    #[test_case(3, &[1.0, 1.0, 1.0, 1.0], 2.0, 15.0; "cubic")]
    #[test_case(7, &[1.0; 8], 1.0, 8.0; "seventh order")]
    #[test_case(8, &[1.0; 9], 1.0, 0.0; "order too high")]
    #[test_case(1, &[1.0, 2.0, 99.0], 3.0, 7.0; "extra coefficients ignored")]
    fn polynomial(order: usize, coefficients: &[f64], x: f64, expected: f64) {
        let got = poly(order, coefficients).apply(&RawValue::F64(x)).unwrap();
        assert_eq!(got, EngineeringValue::Number(expected));
    }

    #[test]
    fn polynomial_errors() {
        assert!(matches!(
            poly(3, &[1.0]).apply(&RawValue::U8(1)),
            Err(Error::ConversionFailed { .. })
        ));
        assert!(poly(1, &[1.0, 1.0])
            .apply(&RawValue::String("x".into()))
            .is_err());
        assert_eq!(
            poly(1, &[0.5, 2.0]).apply(&RawValue::I16(-2)).unwrap(),
            EngineeringValue::Number(-3.5)
        );
    }

    fn mode_list() -> Conversion {
        Conversion::DiscreteList(DiscreteList {
            name: "mode".into(),
            values: vec!["OFF".into(), "ON".into()],
            low_index: 1,
        })
    }

    #[test_case(RawValue::U8(1), "OFF"; "low index")]
    #[test_case(RawValue::U16(2), "ON"; "high index")]
    #[test_case(RawValue::U8(0), ILLEGAL_CONVERSION; "below list")]
    #[test_case(RawValue::I32(3), ILLEGAL_CONVERSION; "above list")]
    #[test_case(RawValue::I64(i64::MIN), ILLEGAL_CONVERSION; "index underflows")]
    #[test_case(RawValue::U64(1 << 63), ILLEGAL_CONVERSION; "u64 wraps negative")]
    #[test_case(RawValue::U64(u64::MAX), ILLEGAL_CONVERSION; "u64 max")]
    fn discrete_list(raw: RawValue, expected: &str) {
        assert_eq!(mode_list().apply(&raw).unwrap(), EngineeringValue::Enum(expected.into()));
    }

    #[test]
    fn discrete_list_enumeration() {
        let conv = mode_list();
        assert_eq!(
            conv.enumeration().unwrap(),
            vec![
                EnumEntry { value: 1, string: "OFF".into() },
                EnumEntry { value: 2, string: "ON".into() },
            ]
        );
    }

    #[test]
    fn discrete_map_zero_fallback() {
        let conv = Conversion::DiscreteMap(DiscreteMap::new(
            "state",
            vec![1, 5, 5],
            vec!["A".into(), "B".into(), "C".into()],
        ));

        assert_eq!(conv.apply(&RawValue::U8(5)).unwrap(), EngineeringValue::Enum("B".into()));
        assert_eq!(conv.apply(&RawValue::U8(0)).unwrap(), EngineeringValue::Number(0.0));
        assert!(matches!(
            conv.apply(&RawValue::U8(7)),
            Err(Error::ConversionFailed { .. })
        ));
        assert_eq!(conv.enumeration().unwrap().len(), 3);
    }

    #[test]
    fn discrete_map_with_zero_entry() {
        let conv = Conversion::DiscreteMap(DiscreteMap::new(
            "state",
            vec![0, 1],
            vec!["IDLE".into(), "BUSY".into()],
        ));
        assert_eq!(conv.apply(&RawValue::U8(0)).unwrap(), EngineeringValue::Enum("IDLE".into()));
    }

    #[test]
    fn discrete_range() {
        let conv = Conversion::DiscreteRange(DiscreteRangeList {
            name: "temp".into(),
            ranges: vec![
                DiscreteRange { low: 0, high: 10, value: "COLD".into() },
                DiscreteRange { low: 10, high: 20, value: "WARM".into() },
            ],
        });

        let get = |raw: i64| conv.apply(&RawValue::I64(raw)).unwrap();
        assert_eq!(get(10), EngineeringValue::Enum("COLD".into()));
        assert_eq!(get(11), EngineeringValue::Enum("WARM".into()));
        assert_eq!(get(21), EngineeringValue::Enum(NO_CONVERSION.into()));
        assert!(conv.enumeration().is_none());
    }

    #[test]
    fn times() {
        assert_eq!(
            Conversion::Time42.apply(&RawValue::U64(0x8000)).unwrap(),
            EngineeringValue::String("00-001-12:00:00.500".into())
        );
        assert_eq!(
            Conversion::Time40.apply(&RawValue::U32(60)).unwrap(),
            EngineeringValue::String("00-001-12:01:00.000".into())
        );
        assert!(Conversion::Time42.apply(&RawValue::U32(1)).is_err());
        assert!(Conversion::Time40.apply(&RawValue::U64(1)).is_err());
    }

    #[test]
    fn time42_parts() {
        let raw = RawValue::U64(0x0001_0002_8000);
        assert_eq!(
            Conversion::Time42ToSeconds.apply(&raw).unwrap(),
            EngineeringValue::Number(65538.0)
        );
        assert_eq!(
            Conversion::Time42ToSubseconds.apply(&raw).unwrap(),
            EngineeringValue::Number(32768.0)
        );
        assert_eq!(
            Conversion::SubsecondsToFraction.apply(&RawValue::U16(16384)).unwrap(),
            EngineeringValue::Number(0.25)
        );
    }

    #[test]
    fn pass_through() {
        let raw = RawValue::Bytes(vec![1, 2, 3]);
        assert_eq!(Conversion::Identity.apply(&raw).unwrap(), EngineeringValue::Raw(raw.clone()));
        assert_eq!(
            Conversion::Image { camera: None }.apply(&raw).unwrap(),
            EngineeringValue::Image(raw.clone())
        );
        assert_eq!(Conversion::Spectrum.apply(&raw).unwrap().kind(), ReturnedKind::Spectrum);
    }

    #[test]
    fn deserialize() {
        let dat = r#"[
            {"type": "polynomial", "name": "p", "order": 1, "coefficients": [0.0, 2.0]},
            {"type": "discrete_map", "name": "m", "indices": [3], "values": ["THREE"]},
            {"type": "time42"}
        ]"#;
        let convs: Vec<Conversion> = serde_json::from_str(dat).unwrap();

        assert_eq!(convs[0].name(), "p");
        assert_eq!(convs[0].returned_kind(), ReturnedKind::Number);
        assert_eq!(convs[1].apply(&RawValue::U8(3)).unwrap(), EngineeringValue::Enum("THREE".into()));
        assert_eq!(convs[2], Conversion::Time42);
    }
}
