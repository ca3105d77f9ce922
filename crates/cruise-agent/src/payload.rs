//! Vendor JSON payload shape (§6.1) and the path-derived identifiers that
//! override whatever the payload itself claims (§4.2 "Path parsing").
//!
//! Dynamic shapes in the vendor payload (a `ports` entry may be a bare name
//! string or a `{name, latitude, ...}` object) are normalized at the
//! boundary into a single tagged form, per design note §9 "Dynamic
//! objects" — the upsert engine only ever sees [`PortInfo`].

use std::collections::HashMap;

use serde::Deserialize;

/// The three provider identifiers extracted from
/// `/YYYY/MM/LINE/SHIP/CODE.json`. These are authoritative and override any
/// values found inside the JSON body (§4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathIds {
    pub cruise_line_id: String,
    pub ship_id: String,
    pub code_to_cruise_id: String,
}

/// Parses `/YYYY/MM/LINE/SHIP/CODE.json`, returning `None` if the path does
/// not have the expected five segments or the file does not end in
/// `.json`.
pub fn parse_path_ids(path: &str) -> Option<PathIds> {
    let trimmed = path.trim_start_matches('/');
    let segments: Vec<&str> = trimmed.split('/').collect();
    let [_year, _month, line, ship, file] = segments[..] else {
        return None;
    };
    let code = file.strip_suffix(".json")?;
    Some(PathIds {
        cruise_line_id: line.to_string(),
        ship_id: ship.to_string(),
        code_to_cruise_id: code.to_string(),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LineContent {
    pub logo: Option<String>,
    pub description: Option<String>,
    pub code: Option<String>,
    pub shortname: Option<String>,
    pub niceurl: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ShipImage {
    pub imageurl: Option<String>,
    pub imageurlhd: Option<String>,
    pub imageurl2k: Option<String>,
    pub caption: Option<String>,
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CabinLocation {
    pub cabinid: Option<String>,
    pub x1: Option<f64>,
    pub y1: Option<f64>,
    pub x2: Option<f64>,
    pub y2: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ShipDeck {
    pub deckname: Option<String>,
    pub planimage: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub cabinlocations: HashMap<String, CabinLocation>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ShipContent {
    pub tonnage: Option<f64>,
    pub occupancy: Option<i64>,
    pub launched: Option<String>,
    pub length: Option<f64>,
    pub code: Option<String>,
    pub shipclass: Option<String>,
    #[serde(default)]
    pub shipdecks: HashMap<String, ShipDeck>,
    pub defaultshipimage: Option<String>,
    pub defaultshipimagehd: Option<String>,
    pub defaultshipimage2k: Option<String>,
    #[serde(default)]
    pub shipimages: Vec<ShipImage>,
}

/// The normalized form of a `ports` map entry: either a bare name string or
/// a rich object. The upsert engine only ever consumes this, never the raw
/// `serde_json::Value`.
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub description: Option<String>,
    pub short_description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawPortEntry {
    Name(String),
    Rich {
        name: Option<String>,
        latitude: Option<PortNumber>,
        longitude: Option<PortNumber>,
        country: Option<String>,
        countrycode: Option<String>,
        description: Option<String>,
        shortdescription: Option<String>,
    },
}

/// Vendor latitude/longitude fields arrive as either a JSON number or a
/// numeric string; both are accepted and normalized to `f64`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum PortNumber {
    Number(f64),
    Text(String),
}

impl PortNumber {
    fn parsed(&self) -> Option<f64> {
        match self {
            PortNumber::Number(n) => Some(*n),
            PortNumber::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl From<RawPortEntry> for PortInfo {
    fn from(raw: RawPortEntry) -> Self {
        match raw {
            RawPortEntry::Name(name) => PortInfo {
                name,
                latitude: None,
                longitude: None,
                country: None,
                country_code: None,
                description: None,
                short_description: None,
            },
            RawPortEntry::Rich {
                name,
                latitude,
                longitude,
                country,
                countrycode,
                description,
                shortdescription,
            } => PortInfo {
                name: name.unwrap_or_default(),
                latitude: latitude.and_then(|n| n.parsed()),
                longitude: longitude.and_then(|n| n.parsed()),
                country,
                country_code: countrycode,
                description,
                short_description: shortdescription,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItineraryEntry {
    pub day: Option<serde_json::Value>,
    pub portid: Option<String>,
    pub name: Option<String>,
    pub arrivetime: Option<String>,
    pub departtime: Option<String>,
    pub orderid: Option<i64>,
    #[serde(default)]
    pub latitude: Option<PortNumber>,
    #[serde(default)]
    pub longitude: Option<PortNumber>,
    pub description: Option<String>,
    pub shortdescription: Option<String>,
    pub itinerarydescription: Option<String>,
}

impl ItineraryEntry {
    pub fn latitude(&self) -> Option<f64> {
        self.latitude.as_ref().and_then(|n| n.parsed())
    }
    pub fn longitude(&self) -> Option<f64> {
        self.longitude.as_ref().and_then(|n| n.parsed())
    }

    /// The payload's day number, if it parses as an integer; used in
    /// preference to the 1-based itinerary index (§4.3 step 4).
    pub fn day_number(&self) -> Option<i32> {
        match &self.day {
            Some(serde_json::Value::Number(n)) => n.as_i64().map(|v| v as i32),
            Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CabinImageEntry {
    pub url: Option<String>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Cabin {
    pub id: Option<String>,
    pub name: Option<String>,
    pub codtype: Option<String>,
    pub description: Option<String>,
    pub imageurl: Option<String>,
    pub imageurl2k: Option<String>,
    pub imageurlhd: Option<String>,
    pub colourcode: Option<String>,
    #[serde(default)]
    pub allcabindecks: Vec<String>,
    #[serde(default)]
    pub allcabinimages: Vec<CabinImageEntry>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CachedPrice {
    pub price: Option<f64>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AltSailing {
    pub id: Option<String>,
    pub saildate: Option<String>,
    pub nights: Option<i64>,
    pub cheapestprice: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VendorPayload {
    pub name: Option<String>,
    pub saildate: String,
    pub nights: i64,
    pub seadays: Option<i64>,
    pub voyagecode: Option<String>,
    pub startportid: String,
    pub endportid: String,
    pub marketid: Option<String>,
    #[serde(default)]
    pub nofly: bool,
    #[serde(default)]
    pub departuk: bool,
    pub linecontent: Option<LineContent>,
    pub shipcontent: Option<ShipContent>,
    #[serde(default, rename = "ports")]
    raw_ports: HashMap<String, RawPortEntry>,
    #[serde(default)]
    pub regions: HashMap<String, String>,
    #[serde(default)]
    pub itinerary: Vec<ItineraryEntry>,
    #[serde(default)]
    pub cabins: HashMap<String, Cabin>,
    #[serde(default)]
    pub cachedprices: HashMap<String, CachedPrice>,
    pub cheapestinside: Option<f64>,
    pub cheapestoutside: Option<f64>,
    pub cheapestbalcony: Option<f64>,
    pub cheapestsuite: Option<f64>,
    #[serde(default)]
    pub altsailings: Vec<AltSailing>,

    /// Overwritten post-deserialization from the path (§4.5 step 5); these
    /// three fields start out as whatever the vendor JSON says and are
    /// replaced before the payload reaches the upsert engine.
    #[serde(skip)]
    pub line_id: String,
    #[serde(skip)]
    pub ship_id: String,
    #[serde(skip)]
    pub code_to_cruise_id: String,
}

impl VendorPayload {
    /// Normalizes the raw `ports` map into [`PortInfo`] values.
    pub fn ports(&self) -> HashMap<String, PortInfo> {
        self.raw_ports
            .iter()
            .map(|(id, raw)| (id.clone(), raw.clone().into()))
            .collect()
    }

    /// Applies the path-derived identifiers, overriding any values the
    /// payload itself carried (§4.2, §4.5 step 5).
    pub fn apply_path_ids(&mut self, ids: &PathIds) {
        self.line_id = ids.cruise_line_id.clone();
        self.ship_id = ids.ship_id.clone();
        self.code_to_cruise_id = ids.code_to_cruise_id.clone();
    }

    /// True iff any of the three path-derived identifiers ended up empty
    /// (§4.5 step 5, §8 "Missing-field rejection").
    pub fn has_missing_fields(&self) -> bool {
        self.line_id.trim().is_empty()
            || self.ship_id.trim().is_empty()
            || self.code_to_cruise_id.trim().is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_standard_path() {
        let ids = parse_path_ids("/2026/03/12/456/7890123.json").unwrap();
        assert_eq!(ids.cruise_line_id, "12");
        assert_eq!(ids.ship_id, "456");
        assert_eq!(ids.code_to_cruise_id, "7890123");
    }

    #[test]
    fn rejects_non_json_or_malformed_paths() {
        assert!(parse_path_ids("/2026/03/12/456/7890123.txt").is_none());
        assert!(parse_path_ids("/2026/03/12/456.json").is_none());
    }

    #[test]
    fn normalizes_bare_string_and_rich_port_entries() {
        let json = serde_json::json!({
            "a": "Port A",
            "b": {"name": "Port B", "latitude": "12.5", "longitude": -70.1, "countrycode": "BS"}
        });
        let raw: HashMap<String, RawPortEntry> = serde_json::from_value(json).unwrap();
        let normalized: HashMap<String, PortInfo> =
            raw.into_iter().map(|(k, v)| (k, v.into())).collect();
        assert_eq!(normalized["a"].name, "Port A");
        assert_eq!(normalized["a"].latitude, None);
        assert_eq!(normalized["b"].name, "Port B");
        assert_eq!(normalized["b"].latitude, Some(12.5));
        assert_eq!(normalized["b"].longitude, Some(-70.1));
    }

    #[test]
    fn day_number_prefers_parseable_payload_value() {
        let entry = ItineraryEntry {
            day: Some(serde_json::Value::String("3".into())),
            portid: None,
            name: None,
            arrivetime: None,
            departtime: None,
            orderid: None,
            latitude: None,
            longitude: None,
            description: None,
            shortdescription: None,
            itinerarydescription: None,
        };
        assert_eq!(entry.day_number(), Some(3));
    }
}
