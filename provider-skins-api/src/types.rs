//! Skins API response types
//!
//! Data structures for deserializing the `/api/skins/list` manifest.

use bridge_traits::inventory::split_file_name;
use bridge_traits::{Category, RemoteSkin, SkinDetails, SkinId};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One manifest entry: a fully joined skin record.
///
/// Field names follow the server; the aliases cover older server builds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Numeric game id (1 = acc, 2 = ac)
    #[serde(alias = "game", alias = "type")]
    pub game_id: u32,

    /// Owning league identifier
    #[serde(alias = "league")]
    pub league_id: Scalar,

    #[serde(default)]
    pub league_name: Option<String>,

    #[serde(default, alias = "league_colour")]
    pub league_color: Option<String>,

    /// Base car folder name
    #[serde(alias = "car_name")]
    pub car: String,

    /// Skin package file name, extension included
    #[serde(alias = "skin_name", alias = "file")]
    pub skin: String,

    /// Package checksum used as change token
    #[serde(default, alias = "checksum")]
    pub sum: Option<String>,

    /// Last modification on the server
    #[serde(default, alias = "updated_at", alias = "modified")]
    pub timestamp: Option<Timestamp>,

    /// Package size in bytes
    #[serde(default)]
    pub size: Option<u64>,

    #[serde(default)]
    pub driver: Option<String>,

    #[serde(default)]
    pub team: Option<String>,

    #[serde(default)]
    pub class: Option<String>,

    #[serde(default)]
    pub year: Option<Scalar>,

    #[serde(default)]
    pub number: Option<Scalar>,
}

impl ManifestEntry {
    pub fn category(&self) -> Option<Category> {
        Category::from_manifest_id(self.game_id)
    }

    /// Converts into a remote record; `None` for unknown game ids or an
    /// empty skin name.
    pub fn into_remote(self) -> Option<RemoteSkin> {
        let category = self.category()?;
        let (name, extension) = split_file_name(&self.skin);
        if name.is_empty() {
            return None;
        }

        let id = SkinId::new(category, self.league_id.to_string(), self.car, name);
        let extension = extension.to_ascii_lowercase();

        Some(RemoteSkin {
            id,
            extension,
            modified_at: self.timestamp.and_then(|ts| ts.to_utc()),
            change_token: self.sum.filter(|s| !s.is_empty()),
            size: self.size,
            details: SkinDetails {
                group_name: self.league_name,
                group_color: self.league_color,
                driver: self.driver,
                team: self.team,
                class: self.class,
                year: self.year.map(|v| v.to_string()),
                number: self.number.map(|v| v.to_string()),
            },
        })
    }
}

/// Field that servers emit either as a number or as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Integer(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Text(v) => f.write_str(v),
        }
    }
}

/// Manifest timestamp: Unix seconds, or an RFC 3339 / `YYYY-MM-DD HH:MM:SS`
/// string (the latter taken as UTC).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Unix(f64),
    Text(String),
}

impl Timestamp {
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::Unix(secs) => {
                if !secs.is_finite() {
                    return None;
                }
                let whole = secs.trunc() as i64;
                let nanos = (secs.fract().abs() * 1e9) as u32;
                Utc.timestamp_opt(whole, nanos).single()
            }
            Timestamp::Text(text) => {
                let text = text.trim();
                if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
                    return Some(dt.with_timezone(&Utc));
                }
                if let Ok(secs) = text.parse::<f64>() {
                    return Timestamp::Unix(secs).to_utc();
                }
                ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                    .iter()
                    .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                    .map(|naive| naive.and_utc())
            }
        }
    }
}
