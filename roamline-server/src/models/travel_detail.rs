//! Travel detail input types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::optional_text;
use super::{Coordinates, Name, ValidationError};

/// Kind of itinerary entry, stored as `detail_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailKind {
    Flight,
    Lodging,
    Transport,
    Activity,
    Restaurant,
    Note,
}

impl DetailKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flight => "flight",
            Self::Lodging => "lodging",
            Self::Transport => "transport",
            Self::Activity => "activity",
            Self::Restaurant => "restaurant",
            Self::Note => "note",
        }
    }
}

impl FromStr for DetailKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flight" => Ok(Self::Flight),
            "lodging" => Ok(Self::Lodging),
            "transport" => Ok(Self::Transport),
            "activity" => Ok(Self::Activity),
            "restaurant" => Ok(Self::Restaurant),
            "note" => Ok(Self::Note),
            _ => Err(ValidationError::InvalidVariant {
                field: "detail_type",
                value: s.to_owned(),
            }),
        }
    }
}

impl fmt::Display for DetailKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `POST /trips/{trip_id}/details`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTravelDetailRequest {
    pub destination_id: Option<i32>,
    pub detail_type: String,
    pub name: String,
    pub description: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub arrival_time: Option<DateTime<Utc>>,
    pub departure_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub order: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTravelDetail {
    pub destination_id: Option<i32>,
    pub kind: DetailKind,
    pub name: Name,
    pub description: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub arrival_time: Option<DateTime<Utc>>,
    pub departure_time: Option<DateTime<Utc>>,
    pub order: i32,
}

impl TryFrom<CreateTravelDetailRequest> for NewTravelDetail {
    type Error = ValidationError;

    fn try_from(req: CreateTravelDetailRequest) -> Result<Self, Self::Error> {
        if let (Some(arrival), Some(departure)) = (req.arrival_time, req.departure_time) {
            if departure < arrival {
                return Err(ValidationError::InvalidFormat {
                    field: "departure_time",
                    reason: "must not be before arrival_time",
                });
            }
        }

        Ok(Self {
            destination_id: req.destination_id,
            kind: req.detail_type.parse()?,
            name: Name::new(&req.name)?,
            description: optional_text("description", req.description)?,
            coordinates: Coordinates::optional(req.latitude, req.longitude)?,
            arrival_time: req.arrival_time,
            departure_time: req.departure_time,
            order: req.order,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_kind_case_insensitive() {
        assert_eq!("Flight".parse::<DetailKind>().unwrap(), DetailKind::Flight);
        assert_eq!(" lodging ".parse::<DetailKind>().unwrap(), DetailKind::Lodging);
    }

    #[test]
    fn unknown_kind() {
        let err = "spaceship".parse::<DetailKind>().unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidVariant {
                field: "detail_type",
                value: "spaceship".into()
            }
        );
    }

    #[test]
    fn valid_detail() {
        let req: CreateTravelDetailRequest = serde_json::from_str(
            r#"{"detail_type":"activity","name":"Whale watching","order":2}"#,
        )
        .unwrap();
        let detail = NewTravelDetail::try_from(req).unwrap();
        assert_eq!(detail.kind, DetailKind::Activity);
        assert_eq!(detail.order, 2);
        assert_eq!(detail.destination_id, None);
    }

    #[test]
    fn departure_before_arrival_rejected() {
        let req: CreateTravelDetailRequest = serde_json::from_str(
            r#"{"detail_type":"lodging","name":"Hotel",
                "arrival_time":"2026-05-02T12:00:00Z",
                "departure_time":"2026-05-01T12:00:00Z"}"#,
        )
        .unwrap();
        assert!(NewTravelDetail::try_from(req).is_err());
    }
}
