//! Destination input types

use serde::Deserialize;

use super::common::optional_text;
use super::{Coordinates, Name, ValidationError};

/// Body of `POST /trips/{trip_id}/destinations`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDestinationRequest {
    pub name: String,
    pub description: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub country: Option<String>,
    pub cover_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewDestination {
    pub name: Name,
    pub description: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub country: Option<String>,
    pub cover_image: Option<String>,
}

impl TryFrom<CreateDestinationRequest> for NewDestination {
    type Error = ValidationError;

    fn try_from(req: CreateDestinationRequest) -> Result<Self, Self::Error> {
        Ok(Self {
            name: Name::new(&req.name)?,
            description: optional_text("description", req.description)?,
            coordinates: Coordinates::optional(req.latitude, req.longitude)?,
            country: optional_text("country", req.country)?,
            cover_image: optional_text("cover_image", req.cover_image)?,
        })
    }
}
