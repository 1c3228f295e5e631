//! Field types shared by trips, destinations and travel details

use serde::Serialize;

use super::ValidationError;

/// Maximum length for display names
const MAX_NAME_LEN: usize = 200;

/// Maximum length for free-text fields (descriptions, urls, countries)
pub(crate) const MAX_TEXT_LEN: usize = 4000;

/// Validated display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Name(String);

impl Name {
    /// # Rules
    /// - Non-empty (after trimming whitespace)
    /// - Max 200 characters
    ///
    /// # Example
    /// ```
    /// use roamline_server::models::Name;
    ///
    /// assert!(Name::new("Lisbon in spring").is_ok());
    /// assert!(Name::new("   ").is_err());
    /// ```
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let trimmed = s.trim();

        if trimmed.is_empty() {
            return Err(ValidationError::Empty { field: "name" });
        }

        if trimmed.chars().count() > MAX_NAME_LEN {
            return Err(ValidationError::TooLong {
                field: "name",
                max: MAX_NAME_LEN,
            });
        }

        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// WGS84 position
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(ValidationError::OutOfRange {
                field: "latitude",
                min: -90.0,
                max: 90.0,
            });
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(ValidationError::OutOfRange {
                field: "longitude",
                min: -180.0,
                max: 180.0,
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Both or neither must be present.
    pub fn optional(
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<Option<Self>, ValidationError> {
        match (latitude, longitude) {
            (Some(lat), Some(lng)) => Self::new(lat, lng).map(Some),
            (None, None) => Ok(None),
            _ => Err(ValidationError::InvalidFormat {
                field: "coordinates",
                reason: "latitude and longitude must be given together",
            }),
        }
    }
}

/// Trim optional free text; blank becomes `None`.
pub(crate) fn optional_text(
    field: &'static str,
    value: Option<String>,
) -> Result<Option<String>, ValidationError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_TEXT_LEN {
        return Err(ValidationError::TooLong {
            field,
            max: MAX_TEXT_LEN,
        });
    }
    Ok(Some(trimmed.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_trimmed() {
        assert_eq!(Name::new("  Porto ").unwrap().as_str(), "Porto");
    }

    #[test]
    fn name_max_length() {
        assert!(Name::new(&"a".repeat(200)).is_ok());
        let err = Name::new(&"a".repeat(201)).unwrap_err();
        assert!(matches!(err, ValidationError::TooLong { max: 200, .. }));
    }

    #[test]
    fn coordinates_range() {
        assert!(Coordinates::new(38.72, -9.14).is_ok());
        assert!(Coordinates::new(91.0, 0.0).is_err());
        assert!(Coordinates::new(0.0, -181.0).is_err());
        assert!(Coordinates::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn coordinates_must_be_paired() {
        assert_eq!(Coordinates::optional(None, None).unwrap(), None);
        let err = Coordinates::optional(Some(1.0), None).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { .. }));
    }

    #[test]
    fn blank_text_is_none() {
        assert_eq!(optional_text("description", Some("  ".into())).unwrap(), None);
        assert_eq!(
            optional_text("description", Some(" hi ".into())).unwrap().as_deref(),
            Some("hi")
        );
    }
}
