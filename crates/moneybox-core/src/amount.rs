//! Monetary amounts as stored by the client: JSON numbers or numeric strings.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;

use crate::ValidationError;

/// Lenient ingestion: anything that is not a readable number counts as zero.
pub fn normalize(value: Option<&Value>) -> Decimal {
  value.and_then(parse).unwrap_or(Decimal::ZERO)
}

fn parse(value: &Value) -> Option<Decimal> {
  match value {
    Value::Number(n) => Decimal::from_str(&n.to_string())
      .ok()
      .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok())),
    Value::String(s) => Decimal::from_str(s.trim()).ok(),
    _ => None,
  }
}

/// Strict parsing of user input: must be a number strictly above zero.
pub fn parse_positive(input: &str) -> Result<Decimal, ValidationError> {
  let trimmed = input.trim();
  if trimmed.is_empty() {
    return Err(ValidationError::MissingField("amount"));
  }
  let amount = Decimal::from_str(trimmed)
    .map_err(|_| ValidationError::InvalidAmount(trimmed.to_owned()))?;
  ensure_positive(amount)
}

pub fn ensure_positive(amount: Decimal) -> Result<Decimal, ValidationError> {
  if amount <= Decimal::ZERO {
    return Err(ValidationError::NonPositiveAmount);
  }
  Ok(amount)
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn numbers_and_strings() {
    assert_eq!(normalize(Some(&json!(12))), Decimal::new(12, 0));
    assert_eq!(normalize(Some(&json!(12.5))), Decimal::new(125, 1));
    assert_eq!(normalize(Some(&json!(" 7.25 "))), Decimal::new(725, 2));
  }

  #[test]
  fn unreadable_is_zero() {
    assert_eq!(normalize(None), Decimal::ZERO);
    assert_eq!(normalize(Some(&json!(null))), Decimal::ZERO);
    assert_eq!(normalize(Some(&json!("lots"))), Decimal::ZERO);
    assert_eq!(normalize(Some(&json!({ "v": 1 }))), Decimal::ZERO);
  }

  #[test]
  fn user_input_must_be_positive() {
    assert_eq!(parse_positive("10.00").unwrap(), Decimal::new(1000, 2));
    assert_eq!(parse_positive("0"), Err(ValidationError::NonPositiveAmount));
    assert_eq!(parse_positive("-3"), Err(ValidationError::NonPositiveAmount));
    assert_eq!(parse_positive(""), Err(ValidationError::MissingField("amount")));
    assert!(matches!(
      parse_positive("abc"),
      Err(ValidationError::InvalidAmount(_))
    ));
  }
}
