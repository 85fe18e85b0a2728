// ✅ Renewal Acknowledgment
// Per-row operator consent for unattended renewal, with an in-flight guard

use crate::error::RenewalError;
use crate::expiry::DaysRemaining;
use crate::renewal::Renewal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckState {
    Unacknowledged,
    Acknowledged,
    Renewing,
}

impl AckState {
    pub fn label(&self) -> &'static str {
        match self {
            AckState::Unacknowledged => "manual",
            AckState::Acknowledged => "auto-renew",
            AckState::Renewing => "renewing…",
        }
    }
}

/// Handed out when a row enters `Renewing`; must be given back to `resolve`
#[derive(Debug, PartialEq, Eq)]
pub struct RenewalTicket {
    pub record_id: i64,
}

/// Acknowledgment held by one display slot.
///
/// Confirmation is two-step: `request_confirmation` arms it, `confirm`
/// commits. Only an acknowledged slot turns into a renewal, and only one
/// renewal per slot is in flight at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalAcknowledgment {
    record_id: i64,
    state: AckState,
    confirmation_pending: bool,
}

impl RenewalAcknowledgment {
    pub fn new(record_id: i64) -> Self {
        Self {
            record_id,
            state: AckState::Unacknowledged,
            confirmation_pending: false,
        }
    }

    pub fn record_id(&self) -> i64 {
        self.record_id
    }

    pub fn state(&self) -> AckState {
        self.state
    }

    pub fn is_confirmation_pending(&self) -> bool {
        self.confirmation_pending
    }

    /// Point the slot at `record_id`. A different record starts over unacknowledged.
    pub fn track(&mut self, record_id: i64) {
        if self.record_id != record_id {
            tracing::debug!(from = self.record_id, to = record_id, "slot changed record, acknowledgment reset");
            *self = Self::new(record_id);
        }
    }

    /// First step. Returns false when there is nothing to confirm.
    pub fn request_confirmation(&mut self) -> bool {
        if self.state != AckState::Unacknowledged {
            return false;
        }
        self.confirmation_pending = true;
        true
    }

    pub fn cancel_confirmation(&mut self) {
        self.confirmation_pending = false;
    }

    /// Second step. Only a pending request becomes `Acknowledged`.
    pub fn confirm(&mut self) -> bool {
        if !self.confirmation_pending || self.state != AckState::Unacknowledged {
            return false;
        }
        self.confirmation_pending = false;
        self.state = AckState::Acknowledged;
        tracing::debug!(record_id = self.record_id, "auto-renewal acknowledged");
        true
    }

    /// Withdraw consent before it is used. A renewal in flight is not interrupted.
    pub fn revoke(&mut self) {
        self.confirmation_pending = false;
        if self.state == AckState::Acknowledged {
            self.state = AckState::Unacknowledged;
        }
    }

    /// Expiry check. Acknowledged and due → `Renewing`, once; every later
    /// call returns `None` until the ticket is resolved.
    pub fn evaluate(&mut self, days_remaining: DaysRemaining, lead_days: i64) -> Option<RenewalTicket> {
        if self.state != AckState::Acknowledged || !days_remaining.is_due(lead_days) {
            return None;
        }
        self.state = AckState::Renewing;
        tracing::debug!(record_id = self.record_id, %days_remaining, "renewal triggered");
        Some(RenewalTicket {
            record_id: self.record_id,
        })
    }

    /// Outcome of a triggered renewal. Success needs a fresh acknowledgment
    /// for the next cycle; failure stays acknowledged so the next check retries.
    /// Tickets for a record the slot no longer tracks are ignored.
    pub fn resolve(&mut self, ticket: RenewalTicket, outcome: &Result<Renewal, RenewalError>) {
        if ticket.record_id != self.record_id || self.state != AckState::Renewing {
            return;
        }
        self.state = match outcome {
            Ok(_) => AckState::Unacknowledged,
            Err(e) => {
                tracing::warn!(record_id = self.record_id, error = %e, "automatic renewal failed");
                AckState::Acknowledged
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::CycleLength;

    fn acknowledged(id: i64) -> RenewalAcknowledgment {
        let mut ack = RenewalAcknowledgment::new(id);
        assert!(ack.request_confirmation());
        assert!(ack.confirm());
        ack
    }

    fn success(id: i64) -> Result<Renewal, RenewalError> {
        Ok(Renewal {
            id,
            previous_end_date: "2024-01-01".to_string(),
            new_end_date: "2024-02-01".to_string(),
            cycle: CycleLength::Months(1),
        })
    }

    #[test]
    fn test_confirmation_needs_two_steps() {
        let mut ack = RenewalAcknowledgment::new(1);
        assert!(!ack.confirm());
        assert_eq!(ack.state(), AckState::Unacknowledged);

        assert!(ack.request_confirmation());
        assert!(ack.is_confirmation_pending());
        ack.cancel_confirmation();
        assert!(!ack.confirm());

        assert!(ack.request_confirmation());
        assert!(ack.confirm());
        assert_eq!(ack.state(), AckState::Acknowledged);
        assert!(!ack.request_confirmation());
    }

    #[test]
    fn test_unacknowledged_never_triggers() {
        let mut ack = RenewalAcknowledgment::new(1);
        assert_eq!(ack.evaluate(DaysRemaining::Days(-5), 0), None);
        assert_eq!(ack.evaluate(DaysRemaining::Expired, 0), None);
    }

    #[test]
    fn test_triggers_only_when_due() {
        let mut ack = acknowledged(1);
        assert_eq!(ack.evaluate(DaysRemaining::Days(1), 0), None);
        assert_eq!(ack.evaluate(DaysRemaining::NotAvailable, 0), None);
        assert_eq!(ack.state(), AckState::Acknowledged);

        assert_eq!(ack.evaluate(DaysRemaining::Days(0), 0), Some(RenewalTicket { record_id: 1 }));
        assert_eq!(ack.state(), AckState::Renewing);
    }

    #[test]
    fn test_expired_sentinel_triggers() {
        let mut ack = acknowledged(9);
        assert!(ack.evaluate(DaysRemaining::Expired, 0).is_some());
    }

    #[test]
    fn test_renewing_is_entered_exactly_once() {
        let mut ack = acknowledged(3);
        let tickets: Vec<RenewalTicket> = (0..5)
            .filter_map(|_| ack.evaluate(DaysRemaining::Days(5), 7))
            .collect();
        assert_eq!(tickets.len(), 1);
        assert_eq!(ack.state(), AckState::Renewing);
    }

    #[test]
    fn test_success_requires_fresh_acknowledgment() {
        let mut ack = acknowledged(1);
        let ticket = ack.evaluate(DaysRemaining::Days(0), 0).unwrap();
        ack.resolve(ticket, &success(1));
        assert_eq!(ack.state(), AckState::Unacknowledged);
        assert_eq!(ack.evaluate(DaysRemaining::Days(0), 0), None);
    }

    #[test]
    fn test_failure_returns_to_acknowledged_for_retry() {
        let mut ack = acknowledged(1);
        let ticket = ack.evaluate(DaysRemaining::Days(-1), 0).unwrap();
        ack.resolve(ticket, &Err(RenewalError::Storage("disk full".to_string())));
        assert_eq!(ack.state(), AckState::Acknowledged);
        assert!(ack.evaluate(DaysRemaining::Days(-1), 0).is_some());
    }

    #[test]
    fn test_identity_change_resets_state() {
        let mut ack = acknowledged(1);
        ack.track(1);
        assert_eq!(ack.state(), AckState::Acknowledged);

        ack.track(2);
        assert_eq!(ack.record_id(), 2);
        assert_eq!(ack.state(), AckState::Unacknowledged);
        assert_eq!(ack.evaluate(DaysRemaining::Expired, 0), None);
    }

    #[test]
    fn test_stale_ticket_is_ignored() {
        let mut ack = acknowledged(1);
        let ticket = ack.evaluate(DaysRemaining::Days(0), 0).unwrap();
        ack.track(2);
        ack.resolve(ticket, &success(1));
        assert_eq!(ack.record_id(), 2);
        assert_eq!(ack.state(), AckState::Unacknowledged);
    }

    #[test]
    fn test_revoke_withdraws_consent_but_not_in_flight_renewal() {
        let mut ack = acknowledged(1);
        ack.revoke();
        assert_eq!(ack.state(), AckState::Unacknowledged);

        let mut ack = acknowledged(1);
        let _ticket = ack.evaluate(DaysRemaining::Days(0), 0).unwrap();
        ack.revoke();
        assert_eq!(ack.state(), AckState::Renewing);
    }
}
