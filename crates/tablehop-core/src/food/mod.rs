//! Bay Area food-ordering agent: restaurant catalog, order book, reservations
//! and the LLM tools built on them.

pub mod agent;
pub mod catalog;
pub mod orders;
pub mod reservations;
pub mod tools;

pub use agent::{FoodAgentBuilder, PROCESSING_MESSAGE, SUPPORTED_CONTENT_TYPES};
pub use catalog::{Restaurant, search_restaurants};
pub use orders::{OrderBook, OrderForm, OrderPlacement, OrderRequest};
pub use reservations::{Reservation, ReservationRequest, make_reservation};
pub use tools::register_food_tools;
