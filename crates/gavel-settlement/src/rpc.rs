//! Operator RPC surface.
//!
//! Thin wrappers over [`SettlementEngine`] that translate failures into the
//! structured [`RpcError`] a transport layer serializes back to the caller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gavel_types::{Caller, GatewayRef, PaymentId, RpcError, SettlementError};
use tracing::warn;

use crate::engine::SettlementEngine;
use crate::intents::{ChargeIntentRequest, ChargeIntentResponse};
use crate::manual::{ManualSettlement, ManualSettlementRequest};

pub type RpcResult<T> = std::result::Result<T, RpcError>;

#[derive(Clone)]
pub struct OperatorRpc {
    engine: Arc<SettlementEngine>,
}

impl OperatorRpc {
    pub fn new(engine: Arc<SettlementEngine>) -> Self {
        Self { engine }
    }

    /// `createChargeIntent`
    pub fn create_charge_intent(
        &self,
        caller: &Caller,
        request: &ChargeIntentRequest,
        now: DateTime<Utc>,
    ) -> RpcResult<ChargeIntentResponse> {
        self.engine
            .create_charge_intent(caller, request, now)
            .map_err(|err| reject("createChargeIntent", caller, &err))
    }

    /// `confirmPaymentIntentAssociation`
    pub fn confirm_association(
        &self,
        caller: &Caller,
        payment_id: PaymentId,
        gateway_ref: &GatewayRef,
        now: DateTime<Utc>,
    ) -> RpcResult<bool> {
        self.engine
            .confirm_association(caller, payment_id, gateway_ref, now)
            .map_err(|err| reject("confirmPaymentIntentAssociation", caller, &err))
    }

    /// `forfeitOrRefundDeposit`
    pub fn forfeit_or_refund(
        &self,
        caller: &Caller,
        request: &ManualSettlementRequest,
        now: DateTime<Utc>,
    ) -> RpcResult<ManualSettlement> {
        self.engine
            .forfeit_or_refund(caller, request, now)
            .map_err(|err| reject("forfeitOrRefundDeposit", caller, &err))
    }
}

fn reject(method: &'static str, caller: &Caller, err: &SettlementError) -> RpcError {
    warn!(method, caller = %caller.user_id, code = err.code(), error = %err, "rpc rejected");
    RpcError::from(err)
}
