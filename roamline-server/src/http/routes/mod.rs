//! Route handlers organized by resource

pub mod destinations;
pub mod health;
pub mod rls_debug;
pub mod travel_details;
pub mod trips;
