//! The static product catalog.
//!
//! Maps a (stream, subject) pair to the channel it unlocks and how long one
//! payment extends access. Trials are ordinary products with a short
//! duration.

use std::collections::HashMap;

use chrono::TimeDelta;
use serde::Deserialize;

use crate::{
  Error, Result,
  subscription::{ProductId, ResourceRef},
};

/// One catalog entry as written in configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductConfig {
  pub stream:   String,
  pub subject:  String,
  /// Channel id the product grants access to.
  pub channel:  String,
  /// Price in minor currency units. Informational only.
  #[serde(default)]
  pub price:    i64,
  /// Compact duration: `30d`, `12h`, `10m`, `45s`.
  pub duration: String,
}

/// A resolved catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
  pub id:        ProductId,
  pub resource:  ResourceRef,
  pub price:     i64,
  pub extension: TimeDelta,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
  products: HashMap<ProductId, Product>,
}

impl Catalog {
  pub fn from_config(entries: &[ProductConfig]) -> Result<Self> {
    let mut products = HashMap::with_capacity(entries.len());
    for entry in entries {
      let id = ProductId::new(entry.stream.trim(), entry.subject.trim());
      let channel = entry.channel.trim();
      if channel.is_empty() {
        return Err(Error::MissingChannel {
          stream:  id.stream,
          subject: id.subject,
        });
      }
      let product = Product {
        id:        id.clone(),
        resource:  ResourceRef(channel.to_owned()),
        price:     entry.price,
        extension: parse_duration(&entry.duration)?,
      };
      if products.insert(id.clone(), product).is_some() {
        return Err(Error::DuplicateProduct {
          stream:  id.stream,
          subject: id.subject,
        });
      }
    }
    Ok(Self { products })
  }

  /// Look up a product. Both parts are trimmed; matching is case-sensitive.
  pub fn resolve(&self, stream: &str, subject: &str) -> Option<&Product> {
    self.products.get(&ProductId::new(stream.trim(), subject.trim()))
  }

  pub fn len(&self) -> usize { self.products.len() }

  pub fn is_empty(&self) -> bool { self.products.is_empty() }

  pub fn iter(&self) -> impl Iterator<Item = &Product> {
    self.products.values()
  }
}

/// Parse `<n><unit>` where unit is one of `d`, `h`, `m`, `s`.
pub fn parse_duration(s: &str) -> Result<TimeDelta> {
  let trimmed = s.trim();
  let invalid = || Error::InvalidDuration(s.to_owned());

  let unit = trimmed.chars().last().ok_or_else(invalid)?;
  let amount: i64 = trimmed[..trimmed.len() - unit.len_utf8()]
    .parse()
    .map_err(|_| invalid())?;
  if amount <= 0 {
    return Err(invalid());
  }

  let delta = match unit {
    'd' => TimeDelta::try_days(amount),
    'h' => TimeDelta::try_hours(amount),
    'm' => TimeDelta::try_minutes(amount),
    's' => TimeDelta::try_seconds(amount),
    _ => None,
  };
  delta.ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn entry(subject: &str, channel: &str, duration: &str) -> ProductConfig {
    ProductConfig {
      stream:   "exam".into(),
      subject:  subject.into(),
      channel:  channel.into(),
      price:    100,
      duration: duration.into(),
    }
  }

  #[test]
  fn parses_durations() {
    assert_eq!(parse_duration("30d").unwrap(), TimeDelta::days(30));
    assert_eq!(parse_duration(" 12h ").unwrap(), TimeDelta::hours(12));
    assert_eq!(parse_duration("10m").unwrap(), TimeDelta::minutes(10));
    assert_eq!(parse_duration("45s").unwrap(), TimeDelta::seconds(45));
  }

  #[test]
  fn rejects_bad_durations() {
    for bad in ["", "d", "30", "30w", "-5d", "0m", "tend"] {
      assert!(
        matches!(parse_duration(bad), Err(Error::InvalidDuration(_))),
        "{bad:?} should be rejected"
      );
    }
  }

  #[test]
  fn resolves_by_stream_and_subject() {
    let catalog = Catalog::from_config(&[
      entry("Module 10", "-1002222222222", "30d"),
      entry("Test Subject", "-1004444444444", "10m"),
    ])
    .unwrap();

    let product = catalog.resolve("exam", " Module 10").unwrap();
    assert_eq!(product.resource, ResourceRef("-1002222222222".into()));
    assert_eq!(product.extension, TimeDelta::days(30));

    let trial = catalog.resolve("exam", "Test Subject").unwrap();
    assert_eq!(trial.extension, TimeDelta::minutes(10));

    assert!(catalog.resolve("exam", "module 10").is_none());
    assert!(catalog.resolve("other", "Module 10").is_none());
  }

  #[test]
  fn rejects_duplicates_and_empty_channels() {
    let dup = Catalog::from_config(&[
      entry("Module 10", "-1", "30d"),
      entry("Module 10", "-2", "30d"),
    ]);
    assert!(matches!(dup, Err(Error::DuplicateProduct { .. })));

    let empty = Catalog::from_config(&[entry("Module 10", "  ", "30d")]);
    assert!(matches!(empty, Err(Error::MissingChannel { .. })));
  }
}
