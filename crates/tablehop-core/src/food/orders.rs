//! Order forms and order placement
//!
//! An [`OrderBook`] remembers every order id its form builder has issued.
//! Only those ids can be placed.

use chrono::{Duration, Local, NaiveDateTime};
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

pub const RESTAURANT_PLACEHOLDER: &str = "<restaurant name>";
pub const ITEMS_PLACEHOLDER: &str = "<food items>";
pub const ADDRESS_PLACEHOLDER: &str = "<delivery address>";
pub const INVALID_ORDER_STATUS: &str = "Error: Invalid order_id.";

const TRACKING_BASE_URL: &str = "https://fooddelivery.example.com/track";

/// Fields the caller already knows when asking for a form
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderRequest {
    pub restaurant: Option<String>,
    pub items: Option<String>,
    pub delivery_time: Option<String>,
    pub delivery_address: Option<String>,
    pub special_instructions: Option<String>,
}

/// A pre-filled order form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderForm {
    pub order_id: String,
    pub restaurant: String,
    pub items: String,
    pub delivery_time: String,
    pub delivery_address: String,
    pub special_instructions: String,
    pub date: String,
}

/// On-chain `completeTask` receipt attached to a placed order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionReceipt {
    pub complete_task_tx: String,
}

/// Result of `place_order`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderPlacement {
    pub order_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_delivery: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blockchain: Option<CompletionReceipt>,
}

impl OrderPlacement {
    pub fn is_confirmed(&self) -> bool {
        self.status == "confirmed"
    }
}

/// Random `<prefix><7 digits>` identifier
pub(crate) fn generate_id(prefix: &str) -> String {
    let n: u32 = rand::thread_rng().gen_range(1_000_000..=9_999_999);
    format!("{}{}", prefix, n)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Issued order forms for one agent process
#[derive(Debug, Default)]
pub struct OrderBook {
    issued: DashMap<String, OrderForm>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a form, filling gaps with placeholders and defaults, and register its id
    pub fn create_order_form(&self, request: OrderRequest) -> OrderForm {
        self.create_order_form_at(request, Local::now().naive_local())
    }

    fn create_order_form_at(&self, request: OrderRequest, now: NaiveDateTime) -> OrderForm {
        let mut order_id = generate_id("order_");
        while self.issued.contains_key(&order_id) {
            order_id = generate_id("order_");
        }

        let form = OrderForm {
            order_id: order_id.clone(),
            restaurant: non_empty(request.restaurant)
                .unwrap_or_else(|| RESTAURANT_PLACEHOLDER.to_string()),
            items: non_empty(request.items).unwrap_or_else(|| ITEMS_PLACEHOLDER.to_string()),
            delivery_time: non_empty(request.delivery_time)
                .unwrap_or_else(|| (now + Duration::minutes(30)).format("%H:%M").to_string()),
            delivery_address: non_empty(request.delivery_address)
                .unwrap_or_else(|| ADDRESS_PLACEHOLDER.to_string()),
            // only an absent value defaults; an explicit "" is kept
            special_instructions: request
                .special_instructions
                .unwrap_or_else(|| "none".to_string()),
            date: now.format("%Y-%m-%d").to_string(),
        };

        info!("Issued order form {}", order_id);
        self.issued.insert(order_id, form.clone());
        form
    }

    pub fn is_issued(&self, order_id: &str) -> bool {
        self.issued.contains_key(order_id)
    }

    pub fn get(&self, order_id: &str) -> Option<OrderForm> {
        self.issued.get(order_id).map(|f| f.value().clone())
    }

    pub fn len(&self) -> usize {
        self.issued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }

    /// Confirm an issued order. Unknown ids yield an error status, not an `Err`.
    pub fn place_order(&self, order_id: &str) -> OrderPlacement {
        self.place_order_at(order_id, Local::now().naive_local())
    }

    fn place_order_at(&self, order_id: &str, now: NaiveDateTime) -> OrderPlacement {
        if !self.is_issued(order_id) {
            debug!("Rejecting unknown order id {}", order_id);
            return OrderPlacement {
                order_id: order_id.to_string(),
                status: INVALID_ORDER_STATUS.to_string(),
                estimated_delivery: None,
                tracking_url: None,
                blockchain: None,
            };
        }

        let minutes = rand::thread_rng().gen_range(30..=60);
        let eta = now + Duration::minutes(minutes);
        info!("Placed order {} (eta {} min)", order_id, minutes);

        OrderPlacement {
            order_id: order_id.to_string(),
            status: "confirmed".to_string(),
            estimated_delivery: Some(eta.format("%I:%M %p").to_string()),
            tracking_url: Some(format!("{}/{}", TRACKING_BASE_URL, order_id)),
            blockchain: None,
        }
    }
}

/// JSON schema describing an order form, for clients that render it
pub fn order_form_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "restaurant": {
                "type": "string",
                "description": "Restaurant name",
                "title": "Restaurant"
            },
            "items": {
                "type": "string",
                "description": "Food items to order",
                "title": "Items"
            },
            "delivery_time": {
                "type": "string",
                "description": "Requested delivery time",
                "title": "Delivery Time"
            },
            "delivery_address": {
                "type": "string",
                "description": "Delivery address",
                "title": "Delivery Address"
            },
            "special_instructions": {
                "type": "string",
                "description": "Special instructions for the order",
                "title": "Special Instructions"
            },
            "order_id": {
                "type": "string",
                "description": "Order ID",
                "title": "Order ID"
            },
            "date": {
                "type": "string",
                "format": "date",
                "description": "Date of order",
                "title": "Date"
            }
        },
        "required": ["restaurant", "items", "delivery_address", "order_id", "date"]
    })
}

/// Structured form response handed back to the caller
pub fn order_form_response(form_data: Value, instructions: Option<&str>) -> Value {
    json!({
        "type": "form",
        "form": order_form_schema(),
        "form_data": form_data,
        "instructions": instructions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_generate_id_shape() {
        let id = generate_id("order_");
        let digits = id.strip_prefix("order_").unwrap();
        assert_eq!(digits.len(), 7);
        assert!(digits.chars().all(|c| c.is_ascii_digit()));
        assert!(digits.parse::<u32>().unwrap() >= 1_000_000);
    }

    #[test]
    fn test_form_defaults() {
        let book = OrderBook::new();
        let form = book.create_order_form_at(OrderRequest::default(), noon());
        assert_eq!(form.restaurant, RESTAURANT_PLACEHOLDER);
        assert_eq!(form.items, ITEMS_PLACEHOLDER);
        assert_eq!(form.delivery_address, ADDRESS_PLACEHOLDER);
        assert_eq!(form.delivery_time, "12:30");
        assert_eq!(form.special_instructions, "none");
        assert_eq!(form.date, "2025-03-14");
        assert!(book.is_issued(&form.order_id));
    }

    #[test]
    fn test_form_keeps_supplied_fields() {
        let book = OrderBook::new();
        let form = book.create_order_form_at(
            OrderRequest {
                restaurant: Some("Kiraku".into()),
                items: Some("2x karaage".into()),
                delivery_time: Some("19:15".into()),
                delivery_address: Some("2150 Shattuck Ave".into()),
                special_instructions: Some("no scallions".into()),
            },
            noon(),
        );
        assert_eq!(form.restaurant, "Kiraku");
        assert_eq!(form.delivery_time, "19:15");
        assert_eq!(form.special_instructions, "no scallions");
        assert_eq!(book.get(&form.order_id), Some(form));
    }

    #[test]
    fn test_empty_special_instructions_kept() {
        let book = OrderBook::new();
        let form = book.create_order_form_at(
            OrderRequest {
                special_instructions: Some(String::new()),
                ..Default::default()
            },
            noon(),
        );
        assert_eq!(form.special_instructions, "");
    }

    #[test]
    fn test_place_only_issued_orders() {
        let book = OrderBook::new();
        let rejected = book.place_order("order_1234567");
        assert_eq!(rejected.status, INVALID_ORDER_STATUS);
        assert!(rejected.estimated_delivery.is_none());

        let form = book.create_order_form(OrderRequest::default());
        let placed = book.place_order(&form.order_id);
        assert!(placed.is_confirmed());
        assert_eq!(
            placed.tracking_url.as_deref(),
            Some(format!("https://fooddelivery.example.com/track/{}", form.order_id).as_str())
        );
    }

    #[test]
    fn test_order_books_are_independent() {
        let a = OrderBook::new();
        let b = OrderBook::new();
        let form = a.create_order_form(OrderRequest::default());
        assert!(!b.place_order(&form.order_id).is_confirmed());
        assert_eq!(a.len(), 1);
        assert!(b.is_empty());
    }

    #[test]
    fn test_estimated_delivery_window() {
        let book = OrderBook::new();
        let form = book.create_order_form_at(OrderRequest::default(), noon());
        let allowed: Vec<String> = (30..=60)
            .map(|m| (noon() + Duration::minutes(m)).format("%I:%M %p").to_string())
            .collect();
        for _ in 0..20 {
            let placed = book.place_order_at(&form.order_id, noon());
            assert!(allowed.contains(placed.estimated_delivery.as_ref().unwrap()));
        }
    }

    #[test]
    fn test_invalid_placement_serialization() {
        let v = serde_json::to_value(OrderBook::new().place_order("bogus")).unwrap();
        assert_eq!(v, json!({"order_id": "bogus", "status": "Error: Invalid order_id."}));
    }

    #[test]
    fn test_form_response() {
        let v = order_form_response(json!({"order_id": "order_1"}), None);
        assert_eq!(v["type"], "form");
        assert_eq!(v["form"]["properties"]["date"]["format"], "date");
        assert_eq!(v["form"]["required"].as_array().unwrap().len(), 5);
        assert!(v["instructions"].is_null());
    }
}
