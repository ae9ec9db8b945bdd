pub mod config;
pub mod facility;
pub mod request;
pub mod schedule;

pub use config::{RawConfig, StoredConfig};
pub use facility::{FacilityId, FacilityLayout};
pub use request::ReservationRequest;
