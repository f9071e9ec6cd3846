//! Outbound notification payloads.
//!
//! Engines describe what happened as a [`Notification`]; delivery belongs to
//! whatever [`Notifier`](chagua_core::notify::Notifier) the stores were built
//! with. The real-time transport addresses each user through the channel
//! group `user_{id}`.

use crate::types::{Actor, Contract, Dispute, Listing, Reservation, Review, UserId};
use chagua_core::notify::NotifyError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A renter booked a listing
    BookingCreated,
    /// Offline payment for a reservation was recorded
    PaymentConfirmed,
    /// A review changed the recipient's trust badge
    ReviewRecorded,
    /// A contract party raised a dispute
    DisputeRaised,
    /// A renter drafted a contract
    ContractCreated,
}

impl NotificationKind {
    /// Stable name, used as a metrics label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BookingCreated => "booking_created",
            Self::PaymentConfirmed => "payment_confirmed",
            Self::ReviewRecorded => "review_recorded",
            Self::DisputeRaised => "dispute_raised",
            Self::ContractCreated => "contract_created",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message for one recipient
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// What happened
    pub kind: NotificationKind,
    /// Who caused it
    pub actor: UserId,
    /// Who should be told
    pub recipient: UserId,
    /// Title of the entity involved, e.g. the listing title
    pub subject: String,
    /// One human-readable sentence
    pub summary: String,
    /// Relative link to the entity
    pub link: String,
}

/// A notification addressed to a transport channel group
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Channel group name
    pub group: String,
    /// JSON payload
    pub payload: serde_json::Value,
}

impl Notification {
    /// "booking created": renter → owner
    #[must_use]
    pub fn booking_created(renter: &Actor, listing: &Listing, reservation: &Reservation) -> Self {
        Self {
            kind: NotificationKind::BookingCreated,
            actor: renter.id,
            recipient: listing.owner,
            subject: listing.title.clone(),
            summary: format!(
                "{} booked {} from {} to {}",
                renter.username,
                listing.title,
                reservation.start.date_naive(),
                reservation.end.date_naive()
            ),
            link: listing_link(listing),
        }
    }

    /// "payment confirmed": confirming party → the other side of the reservation
    #[must_use]
    pub fn payment_confirmed(
        confirmed_by: UserId,
        recipient: UserId,
        listing: &Listing,
        reservation: &Reservation,
    ) -> Self {
        Self {
            kind: NotificationKind::PaymentConfirmed,
            actor: confirmed_by,
            recipient,
            subject: listing.title.clone(),
            summary: format!(
                "Payment of {} {} confirmed for {}",
                reservation.total_cost, reservation.currency, listing.title
            ),
            link: listing_link(listing),
        }
    }

    /// "review recorded": reviewer → reviewed user whose trust badge changed
    #[must_use]
    pub fn review_recorded(review: &Review, recipient: UserId, badge: bool) -> Self {
        let outcome = if badge {
            "You earned the trust badge"
        } else {
            "You lost the trust badge"
        };
        Self {
            kind: NotificationKind::ReviewRecorded,
            actor: review.reviewer,
            recipient,
            subject: "Trust badge".to_string(),
            summary: format!(
                "{outcome} after a {}-star review from {}",
                review.rating.stars(),
                review.display_name()
            ),
            link: format!("/profile/{recipient}/"),
        }
    }

    /// "dispute raised": raiser → counterparty
    #[must_use]
    pub fn dispute_raised(
        raiser: &Actor,
        counterparty: UserId,
        listing_title: &str,
        dispute: &Dispute,
    ) -> Self {
        Self {
            kind: NotificationKind::DisputeRaised,
            actor: raiser.id,
            recipient: counterparty,
            subject: listing_title.to_string(),
            summary: format!("{} raised a dispute on {listing_title}", raiser.username),
            link: format!("/dispute/{}/", dispute.id),
        }
    }

    /// "contract created": renter → owner
    #[must_use]
    pub fn contract_created(renter: &Actor, listing_title: &str, contract: &Contract) -> Self {
        Self {
            kind: NotificationKind::ContractCreated,
            actor: renter.id,
            recipient: contract.owner,
            subject: listing_title.to_string(),
            summary: format!("{} created a contract for {listing_title}", renter.username),
            link: format!("/rental/{}/", contract.listing),
        }
    }

    /// Channel group the transport delivers this notification to
    #[must_use]
    pub fn channel_group(&self) -> String {
        format!("user_{}", self.recipient)
    }

    /// Encode for the real-time transport.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Encoding`] if the payload cannot be serialized.
    pub fn to_channel_message(&self) -> Result<ChannelMessage, NotifyError> {
        let payload =
            serde_json::to_value(self).map_err(|e| NotifyError::Encoding(e.to_string()))?;
        Ok(ChannelMessage {
            group: self.channel_group(),
            payload,
        })
    }
}

fn listing_link(listing: &Listing) -> String {
    format!("/rental/{}/", listing.id)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn channel_message_targets_recipient_group() {
        let recipient = UserId::new();
        let notification = Notification {
            kind: NotificationKind::ContractCreated,
            actor: UserId::new(),
            recipient,
            subject: "Canoe".to_string(),
            summary: "bob created a contract for Canoe".to_string(),
            link: "/rental/1/".to_string(),
        };

        let message = notification.to_channel_message().unwrap();
        assert_eq!(message.group, format!("user_{recipient}"));
        assert_eq!(message.payload["kind"], "contract_created");
        assert_eq!(message.payload["subject"], "Canoe");
    }
}
