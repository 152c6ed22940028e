//! Food-ordering tools exposed to the LLM

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use tablehop_chain::{TaskLedger, TaskUuid};

use super::catalog::search_restaurants;
use super::orders::{CompletionReceipt, OrderBook, OrderRequest, order_form_response};
use super::reservations::{ReservationRequest, make_reservation};
use crate::tools::{ToolContext, ToolHandler, ToolRegistry, json_schema, opt_str, req_str};

fn string_prop(description: &str) -> Value {
    serde_json::json!({
        "type": "string",
        "description": description
    })
}

// ── search_restaurants ──

pub struct SearchRestaurantsTool;

#[async_trait]
impl ToolHandler for SearchRestaurantsTool {
    fn name(&self) -> &str {
        "search_restaurants"
    }

    fn description(&self) -> &str {
        "Search Bay Area restaurants by cuisine, location and price range. \
         Results are sorted by rating, best first."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "cuisine": string_prop("Cuisine type: pizza, chinese, mexican, indian or japanese"),
                "location": string_prop("City or area, e.g. Berkeley or San Francisco"),
                "price_range": string_prop("Price range: $, $$ or $$$")
            }),
            vec![],
        )
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<String> {
        let results = search_restaurants(
            opt_str(&input, "cuisine"),
            opt_str(&input, "location"),
            opt_str(&input, "price_range"),
        );
        debug!("search_restaurants matched {} restaurants", results.len());
        Ok(serde_json::to_string(&results)?)
    }
}

// ── create_order_form ──

pub struct CreateOrderFormTool {
    book: Arc<OrderBook>,
}

impl CreateOrderFormTool {
    pub fn new(book: Arc<OrderBook>) -> Self {
        Self { book }
    }
}

#[async_trait]
impl ToolHandler for CreateOrderFormTool {
    fn name(&self) -> &str {
        "create_order_form"
    }

    fn description(&self) -> &str {
        "Create a food delivery order form. Missing fields are filled with placeholders; \
         delivery time defaults to 30 minutes from now and special instructions to none."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "restaurant": string_prop("Restaurant name"),
                "items": string_prop("Food items to order"),
                "delivery_time": string_prop("Requested delivery time (HH:MM)"),
                "delivery_address": string_prop("Delivery address"),
                "special_instructions": string_prop("Special instructions for the order")
            }),
            vec![],
        )
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<String> {
        let owned = |key: &str| opt_str(&input, key).map(str::to_string);
        let form = self.book.create_order_form(OrderRequest {
            restaurant: owned("restaurant"),
            items: owned("items"),
            delivery_time: owned("delivery_time"),
            delivery_address: owned("delivery_address"),
            special_instructions: input
                .get("special_instructions")
                .and_then(Value::as_str)
                .map(str::to_string),
        });
        Ok(serde_json::to_string(&form)?)
    }
}

// ── return_order_form ──

/// Sends the order form back to the user; ends the agent turn
pub struct ReturnOrderFormTool;

#[async_trait]
impl ToolHandler for ReturnOrderFormTool {
    fn name(&self) -> &str {
        "return_order_form"
    }

    fn description(&self) -> &str {
        "Return an order form to the user so they can review and complete it."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "form_data": {
                    "type": "object",
                    "description": "The order form produced by create_order_form"
                },
                "instructions": string_prop("Instructions for filling in the form")
            }),
            vec!["form_data"],
        )
    }

    fn escalates(&self) -> bool {
        true
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<String> {
        let form_data = match input.get("form_data") {
            Some(Value::String(raw)) => {
                serde_json::from_str(raw).context("form_data is not valid JSON")?
            }
            Some(v) => v.clone(),
            None => anyhow::bail!("Missing 'form_data' parameter"),
        };
        let response = order_form_response(form_data, opt_str(&input, "instructions"));
        Ok(response.to_string())
    }
}

// ── place_order ──

pub struct PlaceOrderTool {
    book: Arc<OrderBook>,
    ledger: Option<Arc<dyn TaskLedger>>,
}

impl PlaceOrderTool {
    pub fn new(book: Arc<OrderBook>, ledger: Option<Arc<dyn TaskLedger>>) -> Self {
        Self { book, ledger }
    }

    /// Mark the session's on-chain task complete. Failures are logged only.
    async fn complete_on_chain(&self, session_id: &str) -> Option<CompletionReceipt> {
        let ledger = self.ledger.as_ref()?;
        let uuid = match TaskUuid::from_session_id(session_id) {
            Ok(uuid) => uuid,
            Err(e) => {
                warn!("Cannot derive task uuid from session {}: {}", session_id, e);
                return None;
            }
        };

        match ledger.complete_task(&uuid).await {
            Ok(receipt) => {
                info!(
                    "completeTask({}) mined in {}",
                    uuid, receipt.transaction_hash
                );
                Some(CompletionReceipt {
                    complete_task_tx: receipt.transaction_hash,
                })
            }
            Err(e) => {
                warn!("completeTask({}) failed: {}", uuid, e);
                None
            }
        }
    }
}

#[async_trait]
impl ToolHandler for PlaceOrderTool {
    fn name(&self) -> &str {
        "place_order"
    }

    fn description(&self) -> &str {
        "Place a food order using an order_id returned by create_order_form."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "order_id": string_prop("The ID of the order to place")
            }),
            vec!["order_id"],
        )
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<String> {
        let order_id = req_str(&input, "order_id")?;
        let mut placement = self.book.place_order(order_id);
        if placement.is_confirmed() {
            placement.blockchain = self.complete_on_chain(&ctx.session_id).await;
        }
        Ok(serde_json::to_string(&placement)?)
    }
}

// ── make_reservation ──

pub struct MakeReservationTool;

#[async_trait]
impl ToolHandler for MakeReservationTool {
    fn name(&self) -> &str {
        "make_reservation"
    }

    fn description(&self) -> &str {
        "Reserve a table at a restaurant."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "restaurant": string_prop("Restaurant name"),
                "date": string_prop("Reservation date"),
                "time": string_prop("Reservation time"),
                "party_size": string_prop("Number of people"),
                "name": string_prop("Customer name"),
                "phone": string_prop("Contact phone number"),
                "special_requests": string_prop("Special requests")
            }),
            vec!["restaurant", "date", "time", "party_size", "name"],
        )
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<String> {
        // Models sometimes send party_size as a number
        let party_size = match input.get("party_size") {
            Some(Value::Number(n)) => n.to_string(),
            _ => req_str(&input, "party_size")?.to_string(),
        };
        let reservation = make_reservation(ReservationRequest {
            restaurant: req_str(&input, "restaurant")?.to_string(),
            date: req_str(&input, "date")?.to_string(),
            time: req_str(&input, "time")?.to_string(),
            party_size,
            name: req_str(&input, "name")?.to_string(),
            phone: opt_str(&input, "phone").map(str::to_string),
            special_requests: opt_str(&input, "special_requests").map(str::to_string),
        });
        Ok(serde_json::to_string(&reservation)?)
    }
}

/// Register every food tool against a shared order book
pub fn register_food_tools(
    registry: &mut ToolRegistry,
    book: Arc<OrderBook>,
    ledger: Option<Arc<dyn TaskLedger>>,
) {
    registry.register(Arc::new(SearchRestaurantsTool));
    registry.register(Arc::new(CreateOrderFormTool::new(book.clone())));
    registry.register(Arc::new(ReturnOrderFormTool));
    registry.register(Arc::new(PlaceOrderTool::new(book, ledger)));
    registry.register(Arc::new(MakeReservationTool));
}
