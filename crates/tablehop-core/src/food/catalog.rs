//! Static Bay Area restaurant catalog

use serde::Serialize;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Restaurant {
    pub name: &'static str,
    pub location: &'static str,
    pub cuisine: &'static str,
    pub price_range: &'static str,
    pub rating: f64,
}

const fn r(
    name: &'static str,
    location: &'static str,
    cuisine: &'static str,
    price_range: &'static str,
    rating: f64,
) -> Restaurant {
    Restaurant {
        name,
        location,
        cuisine,
        price_range,
        rating,
    }
}

const PIZZA: &[Restaurant] = &[
    r("Cheese Board Pizza", "Berkeley", "Pizza", "$$", 4.8),
    r("Zachary's Chicago Pizza", "Oakland", "Deep Dish Pizza", "$$", 4.7),
    r("Pizza Hacker", "San Francisco", "Artisan Pizza", "$$", 4.5),
    r("Pizzeria Delfina", "San Francisco", "Italian Pizza", "$$$", 4.6),
    r("A16", "San Francisco", "Neapolitan Pizza", "$$$", 4.4),
];

const CHINESE: &[Restaurant] = &[
    r("China Live", "San Francisco", "Modern Chinese", "$$$", 4.3),
    r("Mister Jiu's", "San Francisco", "Cantonese", "$$$", 4.6),
    r("Yank Sing", "San Francisco", "Dim Sum", "$$$", 4.4),
    r("Great China", "Berkeley", "Northern Chinese", "$$", 4.5),
    r("Chef Zhao Kitchen", "Palo Alto", "Sichuan", "$$", 4.4),
];

const MEXICAN: &[Restaurant] = &[
    r("La Taqueria", "San Francisco", "Tacos", "$$", 4.6),
    r("Nopalito", "San Francisco", "Organic Mexican", "$$", 4.5),
    r("Comal", "Berkeley", "Contemporary Mexican", "$$$", 4.4),
    r("Tacos Sinaloa", "Oakland", "Street Tacos", "$", 4.7),
    r("Tacolicious", "Palo Alto", "Modern Mexican", "$$", 4.3),
];

const INDIAN: &[Restaurant] = &[
    r("Vik's Chaat", "Berkeley", "Indian Street Food", "$", 4.5),
    r("DOSA", "San Francisco", "South Indian", "$$$", 4.3),
    r("Amber India", "Mountain View", "North Indian", "$$$", 4.4),
    r("Curry Up Now", "San Mateo", "Indian Fusion", "$$", 4.2),
    r("Chapati & Chutney", "Sunnyvale", "Authentic Indian", "$$", 4.6),
];

const JAPANESE: &[Restaurant] = &[
    r("Rintaro", "San Francisco", "Izakaya", "$$$", 4.7),
    r("Iyasare", "Berkeley", "Modern Japanese", "$$$", 4.5),
    r("Kiraku", "Berkeley", "Izakaya", "$$", 4.6),
    r("Marufuku Ramen", "San Francisco", "Ramen", "$$", 4.8),
    r("Gintei", "San Mateo", "Sushi", "$$$", 4.4),
];

/// Cuisine categories in catalog order
pub const CATEGORIES: &[(&str, &[Restaurant])] = &[
    ("pizza", PIZZA),
    ("chinese", CHINESE),
    ("mexican", MEXICAN),
    ("indian", INDIAN),
    ("japanese", JAPANESE),
];

fn category(cuisine: &str) -> Option<&'static [Restaurant]> {
    CATEGORIES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(cuisine))
        .map(|(_, list)| *list)
}

/// Filter the catalog, best rated first.
///
/// A cuisine that names a known category narrows the search to it; anything
/// else searches every category. `location` is a case-insensitive substring
/// match and `price_range` must match exactly. Empty filters are ignored.
pub fn search_restaurants(
    cuisine: Option<&str>,
    location: Option<&str>,
    price_range: Option<&str>,
) -> Vec<Restaurant> {
    let pool: Vec<Restaurant> = match cuisine.filter(|c| !c.is_empty()).and_then(category) {
        Some(list) => list.to_vec(),
        None => CATEGORIES
            .iter()
            .flat_map(|(_, list)| list.iter().copied())
            .collect(),
    };

    let location = location
        .filter(|l| !l.is_empty())
        .map(|l| l.to_lowercase());
    let price_range = price_range.filter(|p| !p.is_empty());

    let mut results: Vec<Restaurant> = pool
        .into_iter()
        .filter(|rest| {
            location
                .as_deref()
                .is_none_or(|l| rest.location.to_lowercase().contains(l))
        })
        .filter(|rest| price_range.is_none_or(|p| rest.price_range == p))
        .collect();

    results.sort_by(|a, b| b.rating.partial_cmp(&a.rating).unwrap_or(Ordering::Equal));
    results
}
