//! # Payment Port
//!
//! Charging customers is outside this engine. Checkout only needs to charge
//! and, when a later shop basket fails, refund what it already charged.

use std::fmt;

use dashmap::DashMap;
use uuid::Uuid;

use bazaar_core::{Money, ShopId, UserId};

use crate::error::EngineResult;

/// Gateway-issued reference of one charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PaymentId(Uuid);

impl PaymentId {
    pub fn generate() -> Self {
        PaymentId(Uuid::new_v4())
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub trait PaymentGateway: Send + Sync {
    fn charge(&self, user: UserId, shop: ShopId, amount: Money) -> EngineResult<PaymentId>;
    fn refund(&self, payment: PaymentId) -> EngineResult<()>;
}

#[derive(Debug, Clone, Copy)]
struct Charge {
    amount: Money,
    refunded: bool,
}

/// Gateway that approves everything and remembers what it did.
#[derive(Debug, Default)]
pub struct AcceptAllPayments {
    charges: DashMap<PaymentId, Charge>,
}

impl AcceptAllPayments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of charges that were not refunded.
    pub fn net_charged(&self) -> Money {
        self.charges
            .iter()
            .filter(|c| !c.refunded)
            .map(|c| c.amount)
            .sum()
    }

    pub fn refund_count(&self) -> usize {
        self.charges.iter().filter(|c| c.refunded).count()
    }
}

impl PaymentGateway for AcceptAllPayments {
    fn charge(&self, _user: UserId, _shop: ShopId, amount: Money) -> EngineResult<PaymentId> {
        let id = PaymentId::generate();
        self.charges.insert(
            id,
            Charge {
                amount,
                refunded: false,
            },
        );
        Ok(id)
    }

    fn refund(&self, payment: PaymentId) -> EngineResult<()> {
        if let Some(mut charge) = self.charges.get_mut(&payment) {
            charge.refunded = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charge_and_refund() {
        let gateway = AcceptAllPayments::new();
        let a = gateway
            .charge(UserId::new(1), ShopId::new(1), Money::from_cents(500))
            .unwrap();
        gateway
            .charge(UserId::new(1), ShopId::new(2), Money::from_cents(300))
            .unwrap();
        assert_eq!(gateway.net_charged().cents(), 800);

        gateway.refund(a).unwrap();
        assert_eq!(gateway.net_charged().cents(), 300);
        assert_eq!(gateway.refund_count(), 1);
    }
}
