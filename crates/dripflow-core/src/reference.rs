//! Polymorphic references: a type tag plus a numeric id.
//!
//! A stream's origin, an event's content and a subscription's subscriber all
//! live outside this crate. They are addressed by a [`Reference`] and never
//! mutated here.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// A `(kind, id)` pair pointing at an entity owned by the host application,
/// e.g. `("course", 12)` or `("user", 7)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reference {
  pub kind: String,
  pub id:   i64,
}

impl Reference {
  pub fn new(kind: impl Into<String>, id: i64) -> Self {
    Self { kind: kind.into(), id }
  }
}

impl fmt::Display for Reference {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.kind, self.id)
  }
}

/// Parses the [`Display`](fmt::Display) form, `kind:id`. The id is taken
/// after the last colon so kinds may contain `::` (`App::User:7`).
impl FromStr for Reference {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid =
      || Error::Validation(format!("expected a reference like 'user:7', got '{s}'"));
    let (kind, id) = s.rsplit_once(':').ok_or_else(invalid)?;
    if kind.is_empty() {
      return Err(invalid());
    }
    let id = id.parse().map_err(|_| invalid())?;
    Ok(Self::new(kind, id))
  }
}

// ─── Subscriber capability ───────────────────────────────────────────────────

/// Anything that can enrol in a stream.
///
/// Host types (a `User`, a `Team`) implement this to expose the two identity
/// fields the subscription table is keyed on.
pub trait Subscriber {
  fn subscriber_type(&self) -> &str;
  fn subscriber_id(&self) -> i64;

  fn subscriber_ref(&self) -> Reference {
    Reference::new(self.subscriber_type(), self.subscriber_id())
  }
}

impl Subscriber for Reference {
  fn subscriber_type(&self) -> &str { &self.kind }

  fn subscriber_id(&self) -> i64 { self.id }

  fn subscriber_ref(&self) -> Reference { self.clone() }
}

impl<T: Subscriber + ?Sized> Subscriber for &T {
  fn subscriber_type(&self) -> &str { (**self).subscriber_type() }

  fn subscriber_id(&self) -> i64 { (**self).subscriber_id() }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct User {
    id: i64,
  }

  impl Subscriber for User {
    fn subscriber_type(&self) -> &str { "user" }

    fn subscriber_id(&self) -> i64 { self.id }
  }

  #[test]
  fn display_joins_kind_and_id() {
    assert_eq!(Reference::new("course", 12).to_string(), "course:12");
  }

  #[test]
  fn parses_display_form() {
    let parsed: Reference = "course:12".parse().unwrap();
    assert_eq!(parsed, Reference::new("course", 12));

    let namespaced: Reference = "App::User:7".parse().unwrap();
    assert_eq!(namespaced, Reference::new("App::User", 7));
  }

  #[test]
  fn rejects_malformed_references() {
    for raw in ["course", ":12", "course:", "course:twelve"] {
      assert!(raw.parse::<Reference>().is_err(), "{raw} should not parse");
    }
  }

  #[test]
  fn host_type_exposes_reference() {
    let user = User { id: 7 };
    assert_eq!(user.subscriber_ref(), Reference::new("user", 7));
    assert_eq!((&user).subscriber_ref(), Reference::new("user", 7));
  }
}
