//! Assembly of the food-ordering [`ToolAgent`]

use std::sync::Arc;

use tablehop_chain::TaskLedger;

use super::orders::OrderBook;
use super::tools::register_food_tools;
use crate::agent::ToolAgent;
use crate::providers::LlmProvider;
use crate::tools::ToolRegistry;

pub const AGENT_NAME: &str = "bay_area_food_ordering_agent_v1";
pub const PROCESSING_MESSAGE: &str = "Processing your food order request...";
pub const SUPPORTED_CONTENT_TYPES: &[&str] = &["text", "text/plain"];

pub const INSTRUCTION: &str = "\
You are a food-ordering assistant for users in the San Francisco Bay Area \
(San Francisco, Berkeley, Oakland, Palo Alto and nearby). You help users find \
restaurants, order delivery and book tables.

When the user asks for restaurant recommendations:
1. Call search_restaurants() with the user's preferences.
2. Recommend highly rated places and give their location, price range and cuisine.
3. Ask whether they want to order delivery or make a reservation.

When the user wants delivery:
1. Call create_order_form() with what you know. Only the restaurant, the items \
and the delivery address are needed.
2. Delivery time defaults to 30 minutes from now and special instructions to \
none; do not ask for them.
3. Call return_order_form() to send the form to the user.
4. When the user sends the completed form back, check that it has every \
required field.
5. If it does, call place_order() right away.
6. Reply with the order id, the order status and the estimated delivery time.

When the user wants a reservation:
1. Collect the restaurant, date, time, party size and name. Phone and special \
requests are optional.
2. Call make_reservation().
3. Reply with the reservation id and its status.

If required information is missing and you must ask the user for it, start \
your reply with MISSING_INFO: followed by what you need.

Stay friendly and professional. If a restaurant or dish is not in the \
catalog, say so politely and suggest similar options.";

/// Builds the food agent around a provider, wiring in the order book and an
/// optional task ledger for `completeTask` anchoring.
pub struct FoodAgentBuilder {
    provider: Arc<dyn LlmProvider>,
    book: Arc<OrderBook>,
    ledger: Option<Arc<dyn TaskLedger>>,
    max_iterations: Option<usize>,
}

impl FoodAgentBuilder {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            book: Arc::new(OrderBook::new()),
            ledger: None,
            max_iterations: None,
        }
    }

    pub fn order_book(mut self, book: Arc<OrderBook>) -> Self {
        self.book = book;
        self
    }

    pub fn ledger(mut self, ledger: Option<Arc<dyn TaskLedger>>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = Some(max);
        self
    }

    pub fn build(self) -> ToolAgent {
        let mut registry = ToolRegistry::new();
        register_food_tools(&mut registry, self.book, self.ledger);

        let agent = ToolAgent::new(AGENT_NAME, self.provider, Arc::new(registry), INSTRUCTION)
            .with_processing_message(PROCESSING_MESSAGE)
            .with_content_types(SUPPORTED_CONTENT_TYPES.iter().map(|s| s.to_string()).collect());
        match self.max_iterations {
            Some(max) => agent.with_max_iterations(max),
            None => agent,
        }
    }
}
