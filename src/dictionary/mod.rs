//! Telemetry dictionary: packet and point definitions and their conversions.
//!
//! A [TelemetryDictionary] is built once from its packet definitions and the named
//! conversions they refer to, then only read. Reloading is done by building a new
//! dictionary and swapping it into a [SharedDictionary]; readers holding the old
//! snapshot are unaffected.
mod conversion;

pub use conversion::*;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use typed_builder::TypedBuilder;

use crate::spacepacket::Apid;

/// How a point's raw value is laid out in a packet.
///
/// Digits give the byte order, most significant first, so `U21` is a little-endian
/// `u16`. A `b` suffix marks a bit field within the container.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    F1234,
    F12345678,
    F87654321,
    I1,
    I12,
    I1234,
    I12345678,
    /// Null terminated or fixed width ASCII of `byte_size` bytes.
    S1,
    #[serde(rename = "TIME40")]
    Time40,
    #[serde(rename = "TIME42")]
    Time42,
    #[serde(rename = "TIME44")]
    Time44,
    U1,
    U12,
    U1234,
    U12345678,
    U21,
    U4321,
    U1b,
    U12b,
    U1234b,
    U4321b,
    I12b,
    I1234b,
    /// Reads nothing; the conversion is applied to a constant.
    Pseudo,
    /// The conversion is applied to the whole packet.
    FullPacketConversion,
}

impl FieldType {
    /// Bytes read from the packet. `byte_size` is only used for strings.
    #[must_use]
    pub fn width(&self, byte_size: usize) -> usize {
        match self {
            FieldType::I1 | FieldType::U1 | FieldType::U1b => 1,
            FieldType::I12 | FieldType::U12 | FieldType::U21 | FieldType::U12b | FieldType::I12b => 2,
            FieldType::F1234
            | FieldType::I1234
            | FieldType::Time40
            | FieldType::U1234
            | FieldType::U4321
            | FieldType::U1234b
            | FieldType::U4321b
            | FieldType::I1234b => 4,
            FieldType::Time42 => 6,
            FieldType::F12345678
            | FieldType::F87654321
            | FieldType::I12345678
            | FieldType::Time44
            | FieldType::U12345678 => 8,
            FieldType::S1 => byte_size,
            FieldType::Pseudo | FieldType::FullPacketConversion => 0,
        }
    }

    #[must_use]
    pub fn is_bit_field(&self) -> bool {
        matches!(
            self,
            FieldType::U1b
                | FieldType::U12b
                | FieldType::U1234b
                | FieldType::U4321b
                | FieldType::I12b
                | FieldType::I1234b
        )
    }
}

/// A single telemetry point.
#[derive(Serialize, Deserialize, TypedBuilder, Debug, Clone, PartialEq)]
pub struct PointInfo {
    /// Dotted id, e.g., `PACKET.POINT`.
    #[builder(setter(into))]
    pub id: String,
    #[builder(setter(into))]
    pub name: String,
    #[serde(default)]
    #[builder(default, setter(into))]
    pub documentation: String,
    /// APID of the packet this point belongs to. Set when the dictionary is built.
    #[serde(default)]
    #[builder(default)]
    pub apid: Apid,
    pub field_type: FieldType,
    #[serde(default)]
    #[builder(default)]
    pub byte_offset: usize,
    #[serde(default)]
    #[builder(default)]
    pub byte_size: usize,
    /// First bit of a bit field, counted from the container MSB.
    #[serde(default)]
    #[builder(default)]
    pub bit_start: u16,
    /// Last bit of a bit field, inclusive.
    #[serde(default)]
    #[builder(default)]
    pub bit_stop: u16,
    #[serde(default)]
    #[builder(default, setter(into))]
    pub units: String,
    /// Name of the conversion to link when the dictionary is built.
    #[serde(default, rename = "conversion")]
    #[builder(default, setter(into))]
    pub conversion_name: String,
    #[serde(skip)]
    #[builder(default)]
    conversion: Arc<Conversion>,
}

impl PointInfo {
    #[must_use]
    pub fn conversion(&self) -> &Conversion {
        &self.conversion
    }

    #[must_use]
    pub fn with_conversion(mut self, conversion: Conversion) -> Self {
        self.conversion_name = conversion.name().to_string();
        self.conversion = Arc::new(conversion);
        self
    }

    /// The packet this point belongs to.
    #[must_use]
    pub fn packet<'d>(&self, dict: &'d TelemetryDictionary) -> Option<&'d PacketInfo> {
        dict.get_packet(self.apid)
    }
}

/// A telemetry packet definition.
#[derive(Serialize, Deserialize, TypedBuilder, Debug, Clone, PartialEq)]
pub struct PacketInfo {
    pub apid: Apid,
    #[builder(setter(into))]
    pub id: String,
    #[builder(setter(into))]
    pub name: String,
    #[serde(default)]
    #[builder(default, setter(into))]
    pub documentation: String,
    #[serde(default)]
    #[builder(default)]
    pub is_table: bool,
    #[serde(default)]
    #[builder(default)]
    pub points: Vec<PointInfo>,
}

impl PacketInfo {
    /// Point by its name, ignoring case.
    #[must_use]
    pub fn get_point(&self, name: &str) -> Option<&PointInfo> {
        self.points.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Point by its dotted id, ignoring case.
    #[must_use]
    pub fn get_point_by_id(&self, id: &str) -> Option<&PointInfo> {
        self.points.iter().find(|p| p.id.eq_ignore_ascii_case(id))
    }

    /// Packet length implied by the points, i.e., the end of the last field.
    #[must_use]
    pub fn packet_length(&self) -> usize {
        self.points
            .iter()
            .map(|p| p.byte_offset + p.byte_size)
            .max()
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct DictionaryDef {
    packets: Vec<PacketInfo>,
    #[serde(default)]
    conversions: Vec<Conversion>,
}

impl From<DictionaryDef> for TelemetryDictionary {
    fn from(def: DictionaryDef) -> Self {
        TelemetryDictionary::new(def.packets, def.conversions)
    }
}

/// Lookup table of packet and point definitions.
///
/// # Example
/// ```
/// use ccsds_telemetry::dictionary::{FieldType, PacketInfo, PointInfo, TelemetryDictionary};
///
/// let packet = PacketInfo::builder()
///     .apid(100)
///     .id("HK")
///     .name("Housekeeping")
///     .points(vec![PointInfo::builder()
///         .id("HK.TEMP")
///         .name("TEMP")
///         .field_type(FieldType::U12)
///         .byte_offset(12)
///         .byte_size(2)
///         .build()])
///     .build();
/// let dict = TelemetryDictionary::new(vec![packet], vec![]);
///
/// assert!(dict.is_valid_apid(100));
/// assert_eq!(dict.get_point("hk.temp").unwrap().apid, 100);
/// ```
#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(from = "DictionaryDef")]
pub struct TelemetryDictionary {
    packets: Vec<PacketInfo>,
    #[serde(skip)]
    conversions: HashMap<String, Arc<Conversion>>,
    #[serde(skip)]
    by_apid: HashMap<Apid, usize>,
    #[serde(skip)]
    by_name: HashMap<String, usize>,
    #[serde(skip)]
    by_id: HashMap<String, usize>,
    #[serde(skip)]
    points: HashMap<String, (usize, usize)>,
    #[serde(skip)]
    unresolved: Vec<String>,
}

impl TelemetryDictionary {
    /// Build from packet definitions and the conversions their points refer to.
    ///
    /// Each point is linked to its packet's APID and to its conversion by name. Time
    /// fields always use the matching time conversion; a point with no conversion, or
    /// one that is not found, uses the identity conversion. Points whose conversion was
    /// not found are listed by [unresolved_conversions](Self::unresolved_conversions).
    /// Signed integer fields
    /// with a bit range narrower than the container become bit fields.
    #[must_use]
    pub fn new(mut packets: Vec<PacketInfo>, conversions: Vec<Conversion>) -> Self {
        let conversions: HashMap<String, Arc<Conversion>> = Conversion::builtins()
            .into_iter()
            .chain(conversions)
            .map(|c| (c.name().to_string(), Arc::new(c)))
            .collect();
        let identity = Arc::new(Conversion::Identity);
        let mut unresolved = Vec::new();

        for packet in &mut packets {
            let apid = packet.apid;
            for point in &mut packet.points {
                point.apid = apid;
                fix_signed_bit_field(point);
                point.conversion = match link_conversion(point, &conversions) {
                    Some(conv) => conv,
                    None => {
                        unresolved.push(point.id.clone());
                        identity.clone()
                    }
                };
            }
        }

        let mut dict = TelemetryDictionary {
            packets,
            conversions,
            unresolved,
            ..Default::default()
        };
        for (idx, packet) in dict.packets.iter().enumerate() {
            dict.by_apid.entry(packet.apid).or_insert(idx);
            dict.by_name.entry(packet.name.to_lowercase()).or_insert(idx);
            dict.by_id.entry(packet.id.to_lowercase()).or_insert(idx);
            for (pidx, point) in packet.points.iter().enumerate() {
                dict.points.entry(point.id.to_lowercase()).or_insert((idx, pidx));
            }
        }
        debug!(
            packets = dict.packets.len(),
            points = dict.points.len(),
            conversions = dict.conversions.len(),
            unresolved = dict.unresolved.len(),
            "built telemetry dictionary"
        );
        dict
    }

    #[must_use]
    pub fn packets(&self) -> &[PacketInfo] {
        &self.packets
    }

    /// First packet defined for `apid`.
    #[must_use]
    pub fn get_packet(&self, apid: Apid) -> Option<&PacketInfo> {
        self.by_apid.get(&apid).map(|idx| &self.packets[*idx])
    }

    /// All packets defined for `apid`, in definition order.
    pub fn get_packets(&self, apid: Apid) -> impl Iterator<Item = &PacketInfo> {
        self.packets.iter().filter(move |p| p.apid == apid)
    }

    /// Packet by name, ignoring case.
    #[must_use]
    pub fn get_packet_by_name(&self, name: &str) -> Option<&PacketInfo> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|idx| &self.packets[*idx])
    }

    /// Packet by id, ignoring case.
    #[must_use]
    pub fn get_packet_by_id(&self, id: &str) -> Option<&PacketInfo> {
        self.by_id.get(&id.to_lowercase()).map(|idx| &self.packets[*idx])
    }

    /// Point by dotted id, ignoring case.
    #[must_use]
    pub fn get_point(&self, id: &str) -> Option<&PointInfo> {
        self.points
            .get(&id.to_lowercase())
            .map(|(idx, pidx)| &self.packets[*idx].points[*pidx])
    }

    /// Point by dotted id, ignoring case, within the packet for `apid`.
    #[must_use]
    pub fn get_point_in_packet(&self, apid: Apid, id: &str) -> Option<&PointInfo> {
        self.get_packet(apid)?.get_point_by_id(id)
    }

    #[must_use]
    pub fn is_valid_apid(&self, apid: Apid) -> bool {
        self.by_apid.contains_key(&apid)
    }

    /// See [PacketInfo::packet_length].
    #[must_use]
    pub fn packet_length(&self, apid: Apid) -> Option<usize> {
        self.get_packet(apid).map(PacketInfo::packet_length)
    }

    #[must_use]
    pub fn conversion(&self, name: &str) -> Option<&Conversion> {
        self.conversions.get(name).map(AsRef::as_ref)
    }

    /// Ids of points that name a conversion the dictionary does not have. These
    /// decode to their raw value.
    #[must_use]
    pub fn unresolved_conversions(&self) -> &[String] {
        &self.unresolved
    }
}

fn fix_signed_bit_field(point: &mut PointInfo) {
    let bits = (point.bit_start, point.bit_stop);
    let narrower = |full: (u16, u16)| bits != (0, 0) && bits != full;
    match point.field_type {
        FieldType::I12 if narrower((0, 15)) => point.field_type = FieldType::I12b,
        FieldType::I1234 if narrower((0, 31)) => point.field_type = FieldType::I1234b,
        _ => {}
    }
}

/// `None` if the point names a conversion that is not in `conversions`.
fn link_conversion(
    point: &PointInfo,
    conversions: &HashMap<String, Arc<Conversion>>,
) -> Option<Arc<Conversion>> {
    let forced = match point.field_type {
        FieldType::Time40 => Some(Conversion::Time40),
        FieldType::Time42 => Some(Conversion::Time42),
        FieldType::Time44 => Some(Conversion::Time44),
        _ => None,
    };
    let name = match forced {
        Some(ref conv) => conv.name(),
        None => point.conversion_name.as_str(),
    };
    if name.is_empty() {
        return conversions.get(Conversion::Identity.name()).cloned();
    }
    let conv = conversions.get(name).cloned();
    if conv.is_none() {
        warn!(point = %point.id, conversion = name, "unknown conversion, using identity");
    }
    conv
}

/// A [TelemetryDictionary] that can be replaced while in use.
///
/// Readers take a [snapshot](Self::snapshot) and keep using it for as long as they
/// like; [replace](Self::replace) only affects later snapshots.
#[derive(Debug, Clone, Default)]
pub struct SharedDictionary(Arc<RwLock<Arc<TelemetryDictionary>>>);

impl SharedDictionary {
    #[must_use]
    pub fn new(dict: TelemetryDictionary) -> Self {
        Self(Arc::new(RwLock::new(Arc::new(dict))))
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<TelemetryDictionary> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Swap in `dict`, returning the previous dictionary.
    pub fn replace(&self, dict: TelemetryDictionary) -> Arc<TelemetryDictionary> {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(dict))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DICT: &str = r#"{
        "packets": [
            {
                "apid": 100,
                "id": "HK",
                "name": "Housekeeping",
                "points": [
                    {"id": "HK.TIME", "name": "TIME", "field_type": "TIME42",
                     "byte_offset": 6, "byte_size": 6, "conversion": "volts"},
                    {"id": "HK.MODE", "name": "MODE", "field_type": "U1",
                     "byte_offset": 12, "byte_size": 1, "conversion": "mode"},
                    {"id": "HK.VOLTS", "name": "VOLTS", "field_type": "U12",
                     "byte_offset": 13, "byte_size": 2, "conversion": "volts"},
                    {"id": "HK.FLAGS", "name": "FLAGS", "field_type": "I12",
                     "byte_offset": 15, "byte_size": 2, "bit_start": 4, "bit_stop": 7},
                    {"id": "HK.WORD", "name": "WORD", "field_type": "I1234",
                     "byte_offset": 17, "byte_size": 4, "bit_start": 0, "bit_stop": 31,
                     "conversion": "missing"}
                ]
            },
            {"apid": 200, "id": "SCI", "name": "Science", "is_table": true},
            {"apid": 100, "id": "HK2", "name": "Other"}
        ],
        "conversions": [
            {"type": "polynomial", "name": "volts", "order": 1, "coefficients": [0.0, 0.5]},
            {"type": "discrete_list", "name": "mode", "values": ["SAFE", "NOMINAL"], "low_index": 0}
        ]
    }"#;

    fn dict() -> TelemetryDictionary {
        serde_json::from_str(DICT).unwrap()
    }

    #[test]
    fn lookups() {
        let dict = dict();

        assert_eq!(dict.packets().len(), 3);
        assert_eq!(dict.get_packet(100).unwrap().id, "HK");
        assert_eq!(dict.get_packets(100).count(), 2);
        assert!(dict.is_valid_apid(200));
        assert!(!dict.is_valid_apid(300));
        assert!(dict.get_packet(300).is_none());
        assert_eq!(dict.get_packet_by_name("SCIENCE").unwrap().apid, 200);
        assert_eq!(dict.get_packet_by_id("hk2").unwrap().name, "Other");
        assert!(dict.get_packet(200).unwrap().is_table);

        let point = dict.get_point("hk.mode").unwrap();
        assert_eq!(point.apid, 100);
        assert_eq!(point.packet(&dict).unwrap().id, "HK");
        assert!(dict.get_point("HK.NOPE").is_none());
        assert_eq!(dict.get_point_in_packet(100, "Hk.Volts").unwrap().name, "VOLTS");
        assert!(dict.get_point_in_packet(200, "HK.VOLTS").is_none());
        assert_eq!(dict.get_packet(100).unwrap().get_point("FLAGS").unwrap().id, "HK.FLAGS");
        assert_eq!(dict.get_packet(100).unwrap().get_point("flags").unwrap().id, "HK.FLAGS");
        assert!(dict.get_packet(100).unwrap().get_point("FLAG").is_none());

        assert_eq!(dict.packet_length(100), Some(21));
        assert_eq!(dict.packet_length(200), Some(0));
        assert_eq!(dict.packet_length(300), None);
    }

    #[test]
    fn conversions_are_linked() {
        let dict = dict();

        let conv = |id: &str| dict.get_point(id).unwrap().conversion().clone();
        assert_eq!(conv("HK.MODE").name(), "mode");
        assert_eq!(conv("HK.VOLTS").returned_kind(), ReturnedKind::Number);
        // time fields ignore the configured conversion
        assert_eq!(conv("HK.TIME"), Conversion::Time42);
        assert_eq!(conv("HK.FLAGS"), Conversion::Identity);
        assert_eq!(conv("HK.WORD"), Conversion::Identity);
        assert_eq!(dict.unresolved_conversions(), ["HK.WORD"]);
        assert!(dict.conversion("Time44 Conversion").is_some());
        assert!(dict.conversion("volts").is_some());
    }

    #[test]
    fn signed_bit_fields_are_fixed() {
        let dict = dict();

        assert_eq!(dict.get_point("HK.FLAGS").unwrap().field_type, FieldType::I12b);
        assert_eq!(dict.get_point("HK.WORD").unwrap().field_type, FieldType::I1234);
        assert!(FieldType::I12b.is_bit_field());
        assert!(!FieldType::I12.is_bit_field());
    }

    #[test]
    fn shared_dictionary_replace() {
        let shared = SharedDictionary::new(dict());
        let before = shared.snapshot();

        let old = shared.replace(TelemetryDictionary::new(vec![], vec![]));

        assert!(Arc::ptr_eq(&before, &old));
        assert!(before.is_valid_apid(100));
        assert!(!shared.snapshot().is_valid_apid(100));
    }
}
