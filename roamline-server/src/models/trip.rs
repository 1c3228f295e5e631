//! Trip input types

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::common::optional_text;
use super::{Coordinates, Name, ValidationError};

/// Body of `POST /trips`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTripRequest {
    pub name: String,
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub country: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub cover_image: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

/// Validated trip ready for insertion.
///
/// The owner is not part of the input: the row defaults to the identity
/// published on the request session.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrip {
    pub name: Name,
    pub description: Option<String>,
    pub coordinates: Coordinates,
    pub country: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub cover_image: Option<String>,
    pub is_public: bool,
}

impl TryFrom<CreateTripRequest> for NewTrip {
    type Error = ValidationError;

    fn try_from(req: CreateTripRequest) -> Result<Self, Self::Error> {
        if let (Some(start), Some(end)) = (req.start_date, req.end_date) {
            if end < start {
                return Err(ValidationError::InvalidFormat {
                    field: "end_date",
                    reason: "must not be before start_date",
                });
            }
        }

        Ok(Self {
            name: Name::new(&req.name)?,
            description: optional_text("description", req.description)?,
            coordinates: Coordinates::new(req.latitude, req.longitude)?,
            country: optional_text("country", req.country)?,
            start_date: req.start_date,
            end_date: req.end_date,
            cover_image: optional_text("cover_image", req.cover_image)?,
            is_public: req.is_public,
        })
    }
}

/// Body of `PATCH /trips/{id}`; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTripRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_favorite: Option<bool>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripPatch {
    pub name: Option<Name>,
    pub description: Option<String>,
    pub is_favorite: Option<bool>,
    pub is_public: Option<bool>,
}

impl TripPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.is_favorite.is_none()
            && self.is_public.is_none()
    }
}

impl TryFrom<UpdateTripRequest> for TripPatch {
    type Error = ValidationError;

    fn try_from(req: UpdateTripRequest) -> Result<Self, Self::Error> {
        Ok(Self {
            name: req.name.as_deref().map(Name::new).transpose()?,
            description: optional_text("description", req.description)?,
            is_favorite: req.is_favorite,
            is_public: req.is_public,
        })
    }
}
