//! Repository implementations for database access
//!
//! Each repository borrows a connection for its lifetime. Visibility is left
//! to the row-security policies; repositories never filter by owner.

pub mod destinations;
pub mod travel_details;
pub mod trips;

pub use destinations::{Destination, DestinationRepo};
pub use travel_details::{TravelDetail, TravelDetailRepo};
pub use trips::{Trip, TripRepo};
