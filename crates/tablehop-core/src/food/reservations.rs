//! Table reservations

use serde::{Deserialize, Serialize};
use tracing::info;

use super::orders::generate_id;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReservationRequest {
    pub restaurant: String,
    pub date: String,
    pub time: String,
    pub party_size: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub special_requests: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reservation {
    pub reservation_id: String,
    pub restaurant: String,
    pub date: String,
    pub time: String,
    pub party_size: String,
    pub name: String,
    pub phone: String,
    pub special_requests: String,
    pub status: String,
}

/// Book a table. Every reservation is accepted.
pub fn make_reservation(request: ReservationRequest) -> Reservation {
    let reservation = Reservation {
        reservation_id: generate_id("rsv_"),
        restaurant: request.restaurant,
        date: request.date,
        time: request.time,
        party_size: request.party_size,
        name: request.name,
        phone: request
            .phone
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| "Not provided".to_string()),
        special_requests: request
            .special_requests
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "None".to_string()),
        status: "confirmed".to_string(),
    };
    info!(
        "Reservation {} at {} for {}",
        reservation.reservation_id, reservation.restaurant, reservation.party_size
    );
    reservation
}
