//! Payment-gateway contract.
//!
//! The engine treats the gateway as an opaque service with three calls.
//! Amounts cross this boundary in integer minor units only.

use gavel_types::{ChargeMetadata, ChargeRef, GatewayRef, RefundRef, Result};

/// Parameters of a new charge intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentRequest {
    pub amount_minor: i64,
    pub currency: String,
    pub metadata: ChargeMetadata,
}

/// The gateway's view of a charge intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayIntent {
    pub id: GatewayRef,
    /// Handed to the client to complete the payment.
    pub client_secret: String,
    /// Most recent captured charge, once the intent has succeeded.
    pub latest_charge: Option<ChargeRef>,
}

/// Operations the settlement engine needs from a payment gateway.
///
/// Implementations report transport failures and rejections as
/// [`SettlementError::Gateway`](gavel_types::SettlementError::Gateway).
pub trait PaymentGateway: Send + Sync {
    fn create_intent(&self, request: &IntentRequest) -> Result<GatewayIntent>;

    fn retrieve_intent(&self, id: &GatewayRef) -> Result<GatewayIntent>;

    /// Refund `amount_minor` of a captured charge.
    fn refund(&self, charge: &ChargeRef, amount_minor: i64) -> Result<RefundRef>;
}

pub use memory::InMemoryGateway;

mod memory {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use gavel_types::SettlementError;

    use super::{ChargeRef, GatewayIntent, GatewayRef, IntentRequest, PaymentGateway, RefundRef, Result};

    #[derive(Default)]
    struct State {
        next: u64,
        intents: BTreeMap<GatewayRef, (IntentRequest, GatewayIntent)>,
        refunds: Vec<(ChargeRef, i64)>,
        fail_next: bool,
    }

    /// Gateway that keeps intents and refunds in process memory. Backs tests
    /// and local runs; it never moves real money.
    #[derive(Default)]
    pub struct InMemoryGateway {
        state: Mutex<State>,
    }

    impl InMemoryGateway {
        pub fn new() -> Self {
            Self::default()
        }

        fn with<T>(&self, f: impl FnOnce(&mut State) -> Result<T>) -> Result<T> {
            let mut state = self.state.lock().map_err(|_| SettlementError::Gateway {
                reason: "in-memory gateway poisoned".into(),
            })?;
            if std::mem::take(&mut state.fail_next) {
                return Err(SettlementError::Gateway {
                    reason: "injected gateway failure".into(),
                });
            }
            f(&mut state)
        }

        /// Make the next call fail with a gateway error.
        pub fn fail_next_call(&self) {
            if let Ok(mut state) = self.state.lock() {
                state.fail_next = true;
            }
        }

        /// Simulate the customer paying: the intent gains a captured charge.
        pub fn capture(&self, id: &GatewayRef) -> Option<ChargeRef> {
            let mut state = self.state.lock().ok()?;
            let (_, intent) = state.intents.get_mut(id)?;
            let charge = ChargeRef(format!("ch_{}", id.as_str().trim_start_matches("pi_")));
            intent.latest_charge = Some(charge.clone());
            Some(charge)
        }

        /// Every intent created so far, in id order.
        pub fn intents(&self) -> Vec<(IntentRequest, GatewayIntent)> {
            self.state
                .lock()
                .map(|s| s.intents.values().cloned().collect())
                .unwrap_or_default()
        }

        /// Every refund issued so far.
        pub fn refunds(&self) -> Vec<(ChargeRef, i64)> {
            self.state
                .lock()
                .map(|s| s.refunds.clone())
                .unwrap_or_default()
        }
    }

    impl PaymentGateway for InMemoryGateway {
        fn create_intent(&self, request: &IntentRequest) -> Result<GatewayIntent> {
            self.with(|state| {
                state.next += 1;
                let id = GatewayRef(format!("pi_{:06}", state.next));
                let intent = GatewayIntent {
                    client_secret: format!("{id}_secret"),
                    id: id.clone(),
                    latest_charge: None,
                };
                state.intents.insert(id, (request.clone(), intent.clone()));
                Ok(intent)
            })
        }

        fn retrieve_intent(&self, id: &GatewayRef) -> Result<GatewayIntent> {
            self.with(|state| {
                state
                    .intents
                    .get(id)
                    .map(|(_, intent)| intent.clone())
                    .ok_or_else(|| SettlementError::Gateway {
                        reason: format!("no such intent: {id}"),
                    })
            })
        }

        fn refund(&self, charge: &ChargeRef, amount_minor: i64) -> Result<RefundRef> {
            self.with(|state| {
                state.refunds.push((charge.clone(), amount_minor));
                Ok(RefundRef(format!("re_{:06}", state.refunds.len())))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_intent_lifecycle() {
        let gateway = InMemoryGateway::new();
        let intent = gateway
            .create_intent(&IntentRequest {
                amount_minor: 48000,
                currency: "aed".into(),
                metadata: ChargeMetadata::default(),
            })
            .unwrap();
        assert!(intent.latest_charge.is_none());
        assert!(intent.client_secret.starts_with(intent.id.as_str()));

        let charge = gateway.capture(&intent.id).unwrap();
        let fetched = gateway.retrieve_intent(&intent.id).unwrap();
        assert_eq!(fetched.latest_charge, Some(charge.clone()));

        let refund = gateway.refund(&charge, 100).unwrap();
        assert_eq!(refund, RefundRef("re_000001".into()));
        assert_eq!(gateway.refunds(), vec![(charge, 100)]);
    }

    #[test]
    fn mock_failure_is_one_shot() {
        let gateway = InMemoryGateway::new();
        gateway.fail_next_call();
        assert!(gateway.retrieve_intent(&GatewayRef::new("pi_x")).is_err());
        let request = IntentRequest {
            amount_minor: 1,
            currency: "aed".into(),
            metadata: ChargeMetadata::default(),
        };
        assert!(gateway.create_intent(&request).is_ok());
    }
}
