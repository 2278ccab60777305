use crate::error::{OrderError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status shared by sub-orders and their history rows.
///
/// The numeric codes are what gets persisted and returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "i16", try_from = "i16")]
pub enum OrderStatus {
    Initial,
    Pending,
    PendingPayment,
    PaymentSuccess,
    Completed,
    Cancelled,
}

/// Every legal `(from, to)` edge. Anything not listed here is rejected.
const TRANSITIONS: &[(OrderStatus, OrderStatus)] = &[
    (OrderStatus::Initial, OrderStatus::Pending),
    (OrderStatus::Pending, OrderStatus::PendingPayment),
    (OrderStatus::PendingPayment, OrderStatus::PaymentSuccess),
    (OrderStatus::PaymentSuccess, OrderStatus::Completed),
    (OrderStatus::Pending, OrderStatus::Cancelled),
    (OrderStatus::PendingPayment, OrderStatus::Cancelled),
];

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Initial,
        OrderStatus::Pending,
        OrderStatus::PendingPayment,
        OrderStatus::PaymentSuccess,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    pub fn code(self) -> i16 {
        match self {
            OrderStatus::Initial => 0,
            OrderStatus::Pending => 100,
            OrderStatus::PendingPayment => 200,
            OrderStatus::PaymentSuccess => 300,
            OrderStatus::Completed => 400,
            OrderStatus::Cancelled => 500,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.code() == code)
    }

    /// Label written to the order history.
    pub fn label(self) -> &'static str {
        match self {
            OrderStatus::Initial => "initial",
            OrderStatus::Pending => "pending",
            OrderStatus::PendingPayment => "pending payment",
            OrderStatus::PaymentSuccess => "payment success",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.label() == label)
    }

    pub fn can_transition(self, target: OrderStatus) -> bool {
        TRANSITIONS.contains(&(self, target))
    }

    /// Like [`can_transition`](Self::can_transition) but yields the error that
    /// aborts the enclosing transaction.
    pub fn ensure_transition(self, target: OrderStatus) -> Result<()> {
        if self.can_transition(target) {
            Ok(())
        } else {
            Err(OrderError::InvalidStatusTransition {
                from: self,
                to: target,
            })
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<OrderStatus> for i16 {
    fn from(status: OrderStatus) -> Self {
        status.code()
    }
}

impl TryFrom<i16> for OrderStatus {
    type Error = OrderError;

    fn try_from(code: i16) -> Result<Self> {
        OrderStatus::from_code(code).ok_or(OrderError::InvalidStatus)
    }
}
