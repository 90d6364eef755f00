use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Validation errors for a single city entry
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CityError {
    #[error("city '{city}' has no area of interest (radius_meters or polygon_geojson required)")]
    MissingAoi { city: String },

    #[error("city '{city}' has both radius_meters and polygon_geojson set")]
    ConflictingAoi { city: String },

    #[error("city '{city}' has invalid coordinates ({latitude}, {longitude})")]
    InvalidCoordinates {
        city: String,
        latitude: f64,
        longitude: f64,
    },

    #[error("city '{city}' has invalid radius {radius}")]
    InvalidRadius { city: String, radius: f64 },

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("poi_id '{poi_id}' appears more than once in one request")]
    DuplicatePoi { poi_id: String },
}

/// Area of interest used to build the vendor geography request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Aoi {
    Radius { meters: f64 },
    Polygon { geometry: Value },
}

impl Aoi {
    fn poi_suffix(&self) -> &'static str {
        match self {
            Aoi::Radius { .. } => "center",
            Aoi::Polygon { .. } => "polygon",
        }
    }
}

/// A monitored location as persisted in `cities.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    #[serde(default)]
    pub city_id: String,
    pub country: String,
    #[serde(default)]
    pub state_province: String,
    pub city: String,
    #[serde(deserialize_with = "lenient::number")]
    pub latitude: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_email: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub radius_meters: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polygon_geojson: Option<Value>,
}

impl City {
    /// The single populated area of interest.
    pub fn aoi(&self) -> Result<Aoi, CityError> {
        match (self.radius_meters, &self.polygon_geojson) {
            (Some(_), Some(_)) => Err(CityError::ConflictingAoi {
                city: self.city.clone(),
            }),
            (Some(meters), None) => {
                if !meters.is_finite() || meters <= 0.0 {
                    return Err(CityError::InvalidRadius {
                        city: self.city.clone(),
                        radius: meters,
                    });
                }
                Ok(Aoi::Radius { meters })
            }
            (None, Some(polygon)) => Ok(Aoi::Polygon {
                geometry: polygon
                    .get("geometry")
                    .cloned()
                    .unwrap_or_else(|| polygon.clone()),
            }),
            (None, None) => Err(CityError::MissingAoi {
                city: self.city.clone(),
            }),
        }
    }

    /// Switch the area of interest; the other representation is cleared.
    pub fn set_aoi(&mut self, aoi: Aoi) {
        match aoi {
            Aoi::Radius { meters } => {
                self.radius_meters = Some(meters);
                self.polygon_geojson = None;
            }
            Aoi::Polygon { geometry } => {
                self.polygon_geojson = Some(geometry);
                self.radius_meters = None;
            }
        }
    }

    /// Full validation run before any vendor request is built.
    pub fn validate(&self) -> Result<(), CityError> {
        if self.city.trim().is_empty() {
            return Err(CityError::MissingField("city"));
        }
        if self.country.trim().is_empty() {
            return Err(CityError::MissingField("country"));
        }
        if !(-90.0..=90.0).contains(&self.latitude) || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(CityError::InvalidCoordinates {
                city: self.city.clone(),
                latitude: self.latitude,
                longitude: self.longitude,
            });
        }
        self.aoi().map(|_| ())
    }

    /// Point-of-interest id sent to the vendor, e.g. `toronto_center`.
    pub fn poi_id(&self) -> Result<String, CityError> {
        let aoi = self.aoi()?;
        Ok(format!("{}_{}", normalize_segment(&self.city), aoi.poi_suffix()))
    }

    /// Point-of-interest id inside a multi-city request, keyed on `city_id`
    /// so that two cities sharing a name stay apart.
    ///
    /// Cities without an id fall back to `{country}_{state}_{city}`.
    pub fn batch_poi_id(&self) -> Result<String, CityError> {
        let aoi = self.aoi()?;
        let key = if self.city_id.trim().is_empty() {
            [&self.country, &self.state_province, &self.city]
                .into_iter()
                .filter(|part| !part.trim().is_empty())
                .map(|part| normalize_segment(part))
                .collect::<Vec<_>>()
                .join("_")
        } else {
            normalize_segment(&self.city_id)
        };
        Ok(format!("{}_{}", key, aoi.poi_suffix()))
    }

    /// The id this city is requested under, depending on whether it shares the job.
    pub fn request_poi_id(&self, multi_city: bool) -> Result<String, CityError> {
        if multi_city {
            self.batch_poi_id()
        } else {
            self.poi_id()
        }
    }

    /// Destination key prefix: `{root}/{country}/{state}/{city}`.
    ///
    /// The state segment is dropped when empty.
    pub fn destination_prefix(&self, root: &str) -> String {
        let root = root.trim_matches('/');
        let country = normalize_segment(&self.country);
        let state = normalize_segment(&self.state_province);
        let city = normalize_segment(&self.city);

        if state.is_empty() {
            format!("{}/{}/{}", root, country, city)
        } else {
            format!("{}/{}/{}/{}", root, country, state, city)
        }
    }

    /// Human label used in logs and outcome maps
    pub fn label(&self) -> String {
        if self.state_province.trim().is_empty() {
            format!("{}, {}", self.city, self.country)
        } else {
            format!("{}, {}, {}", self.city, self.state_province, self.country)
        }
    }
}

/// Editable fields of a city
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CityDraft {
    pub country: String,
    #[serde(default)]
    pub state_province: String,
    pub city: String,
    #[serde(deserialize_with = "lenient::number")]
    pub latitude: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub longitude: f64,
    #[serde(default)]
    pub notification_email: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub radius_meters: Option<f64>,
    #[serde(default)]
    pub polygon_geojson: Option<Value>,
}

impl CityDraft {
    pub fn into_city(self, city_id: String) -> Result<City, CityError> {
        let mut city = City {
            city_id,
            country: String::new(),
            state_province: String::new(),
            city: String::new(),
            latitude: 0.0,
            longitude: 0.0,
            notification_email: None,
            radius_meters: None,
            polygon_geojson: None,
        };
        self.apply_to(&mut city)?;
        Ok(city)
    }

    /// Overwrite the editable fields of `city`, keeping its id.
    pub fn apply_to(self, city: &mut City) -> Result<(), CityError> {
        let mut updated = city.clone();
        updated.country = self.country.trim().to_string();
        updated.state_province = self.state_province.trim().to_string();
        updated.city = self.city.trim().to_string();
        updated.latitude = self.latitude;
        updated.longitude = self.longitude;
        updated.notification_email = self.notification_email.filter(|e| !e.trim().is_empty());

        match (self.radius_meters, self.polygon_geojson) {
            (Some(_), Some(_)) => {
                return Err(CityError::ConflictingAoi { city: updated.city });
            }
            (Some(meters), None) => updated.set_aoi(Aoi::Radius { meters }),
            (None, Some(geometry)) => updated.set_aoi(Aoi::Polygon { geometry }),
            (None, None) => {
                return Err(CityError::MissingAoi { city: updated.city });
            }
        }

        updated.validate()?;
        *city = updated;
        Ok(())
    }
}

/// Lower-case, trimmed, spaces replaced with underscores.
pub fn normalize_segment(value: &str) -> String {
    value.trim().to_lowercase().replace(' ', "_")
}

/// Numbers stored either as JSON numbers or as numeric strings
mod lenient {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        String(String),
    }

    pub fn number<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match NumberOrString::deserialize(deserializer)? {
            NumberOrString::Number(n) => Ok(n),
            NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        }
    }

    pub fn opt_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<NumberOrString>::deserialize(deserializer)? {
            None => Ok(None),
            Some(NumberOrString::Number(n)) => Ok(Some(n)),
            Some(NumberOrString::String(s)) if s.trim().is_empty() => Ok(None),
            Some(NumberOrString::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
