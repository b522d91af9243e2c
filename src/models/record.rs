use serde::{Deserialize, Serialize};

/// Fixed-key normalized view of one listing. All values are raw strings as
/// scraped; numeric parsing and currency conversion are downstream concerns.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedRecord {
    pub make: String,
    pub model: String,
    pub version: String,
    pub color: String,
    pub doors: String,
    pub seats: String,
    pub engine_capacity: String,
    pub engine_power: String,
    pub fuel_type: String,
    pub body_type: String,
    pub gearbox: String,
    pub transmission: String,
    pub mileage: String,
    pub registration_month: String,
    pub registration_year: String,
    pub title: String,
    pub price_amount: String,
    pub price_currency: String,
}
