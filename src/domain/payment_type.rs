use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::OrderError;

/// Which installment of an order a sub-order pays for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    DownPayment,
    HalfPayment,
    FullPayment,
}

impl PaymentType {
    pub const ALL: [PaymentType; 3] = [
        PaymentType::DownPayment,
        PaymentType::HalfPayment,
        PaymentType::FullPayment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentType::DownPayment => "down_payment",
            PaymentType::HalfPayment => "half_payment",
            PaymentType::FullPayment => "full_payment",
        }
    }

    /// Title shown on the payment page.
    pub fn title(self) -> &'static str {
        match self {
            PaymentType::DownPayment => "Down Payment",
            PaymentType::HalfPayment => "50% Payment",
            PaymentType::FullPayment => "100% Payment",
        }
    }

    /// Title printed on invoice line items.
    pub fn invoice_title(self) -> &'static str {
        match self {
            PaymentType::DownPayment => "Uang Muka",
            PaymentType::HalfPayment => "Pembayaran 50%",
            PaymentType::FullPayment => "Pelunasan",
        }
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentType {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentType::ALL
            .into_iter()
            .find(|pt| pt.as_str() == s)
            .ok_or_else(|| OrderError::InvalidPaymentType(s.to_string()))
    }
}
