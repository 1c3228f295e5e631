//! Domain models with validation at construction
//!
//! All user input is validated when creating these types.
//! Invalid input returns ValidationError, not panic.

pub mod common;
pub mod destination;
pub mod identifier;
pub mod pagination;
pub mod travel_detail;
pub mod trip;
pub mod validation;

pub use common::{Coordinates, Name};
pub use destination::{CreateDestinationRequest, NewDestination};
pub use identifier::SqlIdent;
pub use pagination::{Paginated, Pagination, PaginationParams};
pub use travel_detail::{CreateTravelDetailRequest, DetailKind, NewTravelDetail};
pub use trip::{CreateTripRequest, NewTrip, TripPatch, UpdateTripRequest};
pub use validation::ValidationError;
