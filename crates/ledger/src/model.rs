//! Items, reservations and the inputs that create or change them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{GroupId, ItemId, ReservationId};

/// A stock item with its owned balance and the part of it held by
/// pending reservations.
///
/// Invariant: `0 <= reserved <= balance`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub code: String,
    pub description: String,
    pub balance: i64,
    pub reserved: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Units that can still be newly reserved.
    pub fn available(&self) -> i64 {
        self.balance - self.reserved
    }

    /// Returns true if `quantity` units can be reserved right now.
    pub fn can_reserve(&self, quantity: i64) -> bool {
        self.available() >= quantity
    }
}

/// Lifecycle state of a reservation.
///
/// ```text
/// Pending ──┬──► Confirmed
///           └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    #[default]
    Pending,
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    /// Returns true once no further transition is allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Confirmed | ReservationStatus::Cancelled
        )
    }

    /// Returns the persisted representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ReservationStatus::Pending),
            "CONFIRMED" => Ok(ReservationStatus::Confirmed),
            "CANCELLED" => Ok(ReservationStatus::Cancelled),
            other => Err(format!("unknown reservation status: {other}")),
        }
    }
}

/// A hold of `quantity` units of one item on behalf of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub item_id: ItemId,
    pub group_id: GroupId,
    pub quantity: i64,
    pub status: ReservationStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Returns true if the reservation is still pending but its window has
    /// elapsed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Pending && self.expires_at <= now
    }
}

/// Input of [`StockLedger::reserve`](crate::StockLedger::reserve).
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub item_id: ItemId,
    pub group_id: GroupId,
    pub quantity: i64,
    pub expires_at: DateTime<Utc>,
}

/// Input of [`ItemCatalog::create_item`](crate::ItemCatalog::create_item).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewItem {
    pub code: String,
    pub description: String,
    pub balance: i64,
}

/// Partial update of an item. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemUpdate {
    pub description: Option<String>,
    pub balance: Option<i64>,
}

/// What a cancel call applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelTarget {
    /// Every reservation created for the group.
    Group(GroupId),
    /// One reservation.
    Reservation(ReservationId),
}

impl std::fmt::Display for CancelTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelTarget::Group(id) => write!(f, "group {id}"),
            CancelTarget::Reservation(id) => write!(f, "reservation {id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item(balance: i64, reserved: i64) -> Item {
        let now = Utc::now();
        Item {
            id: ItemId::new(),
            code: "SKU-001".to_string(),
            description: "Widget".to_string(),
            balance,
            reserved,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn available_is_balance_minus_reserved() {
        let item = item(10, 4);
        assert_eq!(item.available(), 6);
        assert!(item.can_reserve(6));
        assert!(!item.can_reserve(7));
    }

    #[test]
    fn terminal_statuses() {
        assert!(!ReservationStatus::Pending.is_terminal());
        assert!(ReservationStatus::Confirmed.is_terminal());
        assert!(ReservationStatus::Cancelled.is_terminal());
    }

    #[test]
    fn status_parses_its_own_representation() {
        for status in [
            ReservationStatus::Pending,
            ReservationStatus::Confirmed,
            ReservationStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<ReservationStatus>(), Ok(status));
        }
        assert!("PENDENTE".parse::<ReservationStatus>().is_err());
    }

    #[test]
    fn status_serializes_upper_case() {
        let json = serde_json::to_string(&ReservationStatus::Cancelled).unwrap();
        assert_eq!(json, "\"CANCELLED\"");
    }

    #[test]
    fn expiry_only_applies_to_pending() {
        let now = Utc::now();
        let mut reservation = Reservation {
            id: ReservationId::new(),
            item_id: ItemId::new(),
            group_id: GroupId::new(),
            quantity: 1,
            status: ReservationStatus::Pending,
            expires_at: now - Duration::seconds(1),
            created_at: now,
            updated_at: now,
        };
        assert!(reservation.is_expired_at(now));

        reservation.status = ReservationStatus::Confirmed;
        assert!(!reservation.is_expired_at(now));

        reservation.status = ReservationStatus::Pending;
        reservation.expires_at = now + Duration::minutes(10);
        assert!(!reservation.is_expired_at(now));
    }
}
