//! Payment Record Store.
//!
//! One row per attempted charge or monetary event, addressed by internal id
//! and findable by gateway reference. Rows are created before the gateway is
//! asked to charge, so the internal id can ride along in the charge metadata.
//! Type and amount never change after creation; status only moves along
//! [`PaymentStatus::can_transition_to`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gavel_types::{
    AuctionId, GatewayRef, Payment, PaymentId, PaymentStatus, PaymentType, Result, RetryPolicy,
    SettlementError, UserId,
};
use tracing::{debug, info, warn};

use crate::store::{DocKey, Document, DocumentStore, PaymentFilter, Query};
use crate::transaction::{Transaction, run_transaction};

/// Resolve a gateway event to its Payment row.
///
/// Looks up by the id embedded in the charge metadata first, then by the
/// gateway reference when the id is absent or its row is missing. Returns
/// `None` when neither path finds a row.
pub fn locate_in(
    tx: &mut Transaction<'_>,
    metadata_id: Option<PaymentId>,
    gateway_ref: &GatewayRef,
) -> Result<Option<Payment>> {
    if let Some(id) = metadata_id {
        if let Some(payment) = tx.payment(id)? {
            return Ok(Some(payment));
        }
        debug!(payment_id = %id, "metadata payment id not found, falling back to gateway ref");
    }
    find_by_gateway_ref_in(tx, gateway_ref)
}

/// First Payment carrying `gateway_ref`, in id order.
pub fn find_by_gateway_ref_in(
    tx: &mut Transaction<'_>,
    gateway_ref: &GatewayRef,
) -> Result<Option<Payment>> {
    let keys = tx.query(&Query::PaymentsByGatewayRef(gateway_ref.clone()))?;
    if keys.len() > 1 {
        warn!(%gateway_ref, rows = keys.len(), "several payments share one gateway ref");
    }
    for key in keys {
        if let DocKey::Payment(id) = key {
            if let Some(payment) = tx.payment(id)? {
                return Ok(Some(payment));
            }
        }
    }
    Ok(None)
}

/// The user's `succeeded` deposit for an auction, if any.
pub fn find_settled_deposit_in(
    tx: &mut Transaction<'_>,
    user_id: UserId,
    auction_id: AuctionId,
) -> Result<Option<Payment>> {
    let filter = PaymentFilter {
        user_id: Some(user_id),
        auction_id: Some(auction_id),
        kind: Some(PaymentType::Deposit),
        status: Some(PaymentStatus::Succeeded),
    };
    for key in tx.query(&Query::Payments(filter))? {
        if let DocKey::Payment(id) = key {
            if let Some(payment) = tx.payment(id)? {
                // Re-check against the tracked read.
                if payment.status == PaymentStatus::Succeeded {
                    return Ok(Some(payment));
                }
            }
        }
    }
    Ok(None)
}

/// Move a payment along its status machine and stage the write.
pub fn transition_in(
    tx: &mut Transaction<'_>,
    mut payment: Payment,
    target: PaymentStatus,
    now: DateTime<Utc>,
) -> Result<Payment> {
    payment.transition(target, now)?;
    tx.put_payment(payment.clone());
    Ok(payment)
}

/// Standalone payment-row operations, each in its own transaction.
pub struct PaymentRecords {
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
}

impl PaymentRecords {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Insert a new row.
    ///
    /// # Errors
    /// `InvalidInput` if a row with the same id already exists.
    pub fn create(&self, payment: &Payment) -> Result<()> {
        let inserted = run_transaction(self.store.as_ref(), &self.retry, "payment.create", |tx| {
            tx.create(Document::Payment(payment.clone()))
        })?;
        if !inserted {
            return Err(SettlementError::InvalidInput {
                reason: format!("payment {} already exists", payment.id),
            });
        }
        debug!(payment_id = %payment.id, kind = %payment.kind, amount = %payment.amount, "payment row created");
        Ok(())
    }

    pub fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        Transaction::new(self.store.as_ref()).payment(id)
    }

    /// Like [`get`](Self::get) but absent is `PaymentNotFound`.
    pub fn require(&self, id: PaymentId) -> Result<Payment> {
        self.get(id)?
            .ok_or_else(|| SettlementError::PaymentNotFound(id.to_string()))
    }

    pub fn find_by_gateway_ref(&self, gateway_ref: &GatewayRef) -> Result<Option<Payment>> {
        find_by_gateway_ref_in(&mut Transaction::new(self.store.as_ref()), gateway_ref)
    }

    pub fn find_settled_deposit(
        &self,
        user_id: UserId,
        auction_id: AuctionId,
    ) -> Result<Option<Payment>> {
        find_settled_deposit_in(&mut Transaction::new(self.store.as_ref()), user_id, auction_id)
    }

    /// Record the gateway reference, only if none is recorded yet. Returns
    /// whether it was written.
    pub fn attach_gateway_ref(
        &self,
        id: PaymentId,
        gateway_ref: &GatewayRef,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        run_transaction(self.store.as_ref(), &self.retry, "payment.attach_ref", |tx| {
            let mut payment = tx
                .payment(id)?
                .ok_or_else(|| SettlementError::PaymentNotFound(id.to_string()))?;
            if payment.gateway_ref.is_some() {
                return Ok(false);
            }
            payment.gateway_ref = Some(gateway_ref.clone());
            payment.updated_at = now;
            tx.put_payment(payment);
            Ok(true)
        })
    }

    /// Move a row to `target`. Returns `false` without writing if the row is
    /// already there.
    pub fn set_status(&self, id: PaymentId, target: PaymentStatus, now: DateTime<Utc>) -> Result<bool> {
        let changed = run_transaction(self.store.as_ref(), &self.retry, "payment.set_status", |tx| {
            let payment = tx
                .payment(id)?
                .ok_or_else(|| SettlementError::PaymentNotFound(id.to_string()))?;
            if payment.status == target {
                return Ok(false);
            }
            transition_in(tx, payment, target, now)?;
            Ok(true)
        })?;
        if changed {
            info!(payment_id = %id, status = %target, "payment status updated");
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::memory::MemoryStore;

    fn setup() -> PaymentRecords {
        PaymentRecords::new(Arc::new(MemoryStore::new()), RetryPolicy::immediate(3))
    }

    fn deposit(user: UserId, auction: Option<AuctionId>) -> Payment {
        Payment::new(user, PaymentType::Deposit, auction, Decimal::new(500, 0), "aed", Utc::now())
    }

    #[test]
    fn create_rejects_duplicate_id() {
        let records = setup();
        let payment = deposit(UserId::new(), None);
        records.create(&payment).unwrap();
        assert!(matches!(
            records.create(&payment),
            Err(SettlementError::InvalidInput { .. })
        ));
        assert_eq!(records.require(payment.id).unwrap(), payment);
    }

    #[test]
    fn gateway_ref_attached_once() {
        let records = setup();
        let payment = deposit(UserId::new(), None);
        records.create(&payment).unwrap();
        assert!(records.attach_gateway_ref(payment.id, &GatewayRef::new("pi_1"), Utc::now()).unwrap());
        assert!(!records.attach_gateway_ref(payment.id, &GatewayRef::new("pi_2"), Utc::now()).unwrap());
        let found = records.find_by_gateway_ref(&GatewayRef::new("pi_1")).unwrap().unwrap();
        assert_eq!(found.id, payment.id);
        assert!(records.find_by_gateway_ref(&GatewayRef::new("pi_2")).unwrap().is_none());
    }

    #[test]
    fn attach_to_missing_row_is_not_found() {
        let records = setup();
        let err = records
            .attach_gateway_ref(PaymentId::new(), &GatewayRef::new("pi_1"), Utc::now())
            .unwrap_err();
        assert!(matches!(err, SettlementError::PaymentNotFound(_)));
    }

    #[test]
    fn set_status_follows_machine() {
        let records = setup();
        let payment = deposit(UserId::new(), None);
        records.create(&payment).unwrap();
        assert!(records.set_status(payment.id, PaymentStatus::Succeeded, Utc::now()).unwrap());
        assert!(!records.set_status(payment.id, PaymentStatus::Succeeded, Utc::now()).unwrap());
        assert!(matches!(
            records.set_status(payment.id, PaymentStatus::Created, Utc::now()),
            Err(SettlementError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn settled_deposit_lookup() {
        let records = setup();
        let user = UserId::new();
        let auction = AuctionId::new();
        let pending = deposit(user, Some(auction));
        let settled = deposit(user, Some(auction));
        let other_auction = deposit(user, Some(AuctionId::new()));
        for p in [&pending, &settled, &other_auction] {
            records.create(p).unwrap();
        }
        assert!(records.find_settled_deposit(user, auction).unwrap().is_none());
        records.set_status(settled.id, PaymentStatus::Succeeded, Utc::now()).unwrap();
        records.set_status(other_auction.id, PaymentStatus::Succeeded, Utc::now()).unwrap();
        let found = records.find_settled_deposit(user, auction).unwrap().unwrap();
        assert_eq!(found.id, settled.id);
    }

    #[test]
    fn locate_falls_back_to_gateway_ref() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let records = PaymentRecords::new(store.clone(), RetryPolicy::immediate(1));
        let payment = deposit(UserId::new(), None);
        records.create(&payment).unwrap();
        records.attach_gateway_ref(payment.id, &GatewayRef::new("pi_9"), Utc::now()).unwrap();

        let mut tx = Transaction::new(store.as_ref());
        let by_id = locate_in(&mut tx, Some(payment.id), &GatewayRef::new("pi_other")).unwrap();
        assert_eq!(by_id.map(|p| p.id), Some(payment.id));
        let by_ref = locate_in(&mut tx, Some(PaymentId::new()), &GatewayRef::new("pi_9")).unwrap();
        assert_eq!(by_ref.map(|p| p.id), Some(payment.id));
        assert!(locate_in(&mut tx, None, &GatewayRef::new("pi_none")).unwrap().is_none());
    }
}
