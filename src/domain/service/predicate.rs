// src/domain/service/predicate.rs
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::domain::models::{OrderSide, OrderType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComparisonOperator {
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Equal,
}

impl ComparisonOperator {
    /// Parse an operator token. Anything unrecognised falls back to equality
    /// and logs a warning.
    pub fn parse(token: &str) -> Self {
        match token.trim().to_uppercase().as_str() {
            ">" | "GT" => ComparisonOperator::Greater,
            ">=" | "≥" | "GTE" | "ABOVE" => ComparisonOperator::GreaterOrEqual,
            "<" | "LT" => ComparisonOperator::Less,
            "<=" | "≤" | "LTE" | "BELOW" => ComparisonOperator::LessOrEqual,
            "=" | "==" | "EQ" => ComparisonOperator::Equal,
            other => {
                log::warn!(
                    "Unknown operator '{}' in price condition, defaulting to equality check",
                    other
                );
                ComparisonOperator::Equal
            }
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOperator::Greater => ">",
            ComparisonOperator::GreaterOrEqual => ">=",
            ComparisonOperator::Less => "<",
            ComparisonOperator::LessOrEqual => "<=",
            ComparisonOperator::Equal => "==",
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl<'de> Deserialize<'de> for ComparisonOperator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        Ok(ComparisonOperator::parse(&token))
    }
}

/// `current <op> target`. Equality is an exact decimal comparison; callers
/// who want tolerance express it through the price buffer.
pub fn evaluate(current: Decimal, target: Decimal, operator: ComparisonOperator) -> bool {
    match operator {
        ComparisonOperator::Greater => current > target,
        ComparisonOperator::GreaterOrEqual => current >= target,
        ComparisonOperator::Less => current < target,
        ComparisonOperator::LessOrEqual => current <= target,
        ComparisonOperator::Equal => current == target,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePredicate {
    pub target: Decimal,
    pub operator: ComparisonOperator,
}

impl PricePredicate {
    pub fn new(target: Decimal, operator: ComparisonOperator) -> Self {
        Self { target, operator }
    }

    pub fn is_met(&self, current: Decimal) -> bool {
        evaluate(current, self.target, self.operator)
    }
}

impl fmt::Display for PricePredicate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "price {} {}", self.operator, self.target)
    }
}

/// Limit price after slippage allowance. Buys may pay up to `target * (1 + buffer)`,
/// sells accept down to `target * (1 - buffer)`. Market orders and a
/// non-positive buffer leave the price alone (`None`).
pub fn apply_buffer(
    side: OrderSide,
    order_type: OrderType,
    target: Decimal,
    buffer: Decimal,
) -> Option<Decimal> {
    if order_type != OrderType::Limit || buffer <= Decimal::ZERO {
        return None;
    }
    let buffer = buffer.min(Decimal::ONE);
    let adjusted = match side {
        OrderSide::Buy => target * (Decimal::ONE + buffer),
        OrderSide::Sell => target * (Decimal::ONE - buffer),
    };
    Some(adjusted.normalize())
}
