//! Agent card for the Bay Area food-ordering agent

use tablehop_a2a::{AgentCapabilities, AgentCard, AgentSkill};
use tablehop_core::food::SUPPORTED_CONTENT_TYPES;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn skill(id: &str, name: &str, description: &str, tags: &[&str], examples: &[&str]) -> AgentSkill {
    AgentSkill {
        id: id.to_string(),
        name: name.to_string(),
        description: Some(description.to_string()),
        tags: strings(tags),
        examples: strings(examples),
        input_modes: None,
        output_modes: None,
    }
}

pub fn food_agent_card(url: String) -> AgentCard {
    AgentCard {
        name: "Bay Area Food Ordering".to_string(),
        description: Some(
            "This agent helps Bay Area users find restaurants, order food delivery, \
             or make restaurant reservations."
                .to_string(),
        ),
        url,
        provider: None,
        version: "1.0.0".to_string(),
        documentation_url: None,
        capabilities: AgentCapabilities {
            streaming: true,
            ..Default::default()
        },
        authentication: None,
        default_input_modes: strings(SUPPORTED_CONTENT_TYPES),
        default_output_modes: strings(SUPPORTED_CONTENT_TYPES),
        skills: vec![
            skill(
                "restaurant_search",
                "Restaurant Search Tool",
                "Helps users find restaurants in the Bay Area based on cuisine, location, and price range.",
                &["restaurant", "search", "bay area"],
                &[
                    "Find me a Chinese restaurant in the Bay Area",
                    "Any good pizza places in San Francisco?",
                    "Moderately priced Japanese food near Berkeley?",
                ],
            ),
            skill(
                "food_delivery",
                "Food Delivery Tool",
                "Helps users order food delivery from restaurants in the Bay Area.",
                &["delivery", "food", "order"],
                &[
                    "I want to order a pizza for delivery",
                    "Order from Zachary's Chicago Pizza",
                    "Deliver Chinese food to my home",
                ],
            ),
            skill(
                "restaurant_reservation",
                "Restaurant Reservation Tool",
                "Helps users make restaurant reservations in the Bay Area.",
                &["reservation", "dining"],
                &[
                    "I'd like to book a restaurant",
                    "Book a table for 4 at Mister Jiu's tonight",
                    "Reserve Rintaro for two tomorrow at 7pm",
                ],
            ),
        ],
    }
}
