//! Invoice document assembly for a settled installment.

use crate::domain::gateway::{
    InvoiceCustomer, InvoiceData, InvoiceItem, InvoicePaymentDetail, InvoiceRequest,
};
use crate::domain::order::{Order, OrderPayment, SubOrder};
use crate::domain::status::OrderStatus;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rand::Rng;
use rust_decimal::{Decimal, RoundingStrategy};

const INDONESIAN_MONTHS: [&str; 12] = [
    "Januari",
    "Februari",
    "Maret",
    "April",
    "Mei",
    "Juni",
    "Juli",
    "Agustus",
    "September",
    "Oktober",
    "November",
    "Desember",
];

/// Whole-rupiah amount with `.` as the thousands separator, e.g. `1.500.000`.
pub fn rupiah(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let digits = rounded.abs().trunc().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if rounded.is_sign_negative() && !rounded.is_zero() {
        grouped.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    grouped
}

/// `05 Januari 2026`.
pub fn indonesian_date(at: DateTime<Utc>) -> String {
    format!(
        "{:02} {} {}",
        at.day(),
        INDONESIAN_MONTHS[at.month0() as usize],
        at.year()
    )
}

/// `bank_transfer` becomes `Bank Transfer`.
pub fn payment_method(raw: &str) -> String {
    raw.split(['_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn invoice_number(today: NaiveDate, rng: &mut impl Rng) -> String {
    format!(
        "INV/{}/ORD/{}",
        today.format("%Y%m%d"),
        rng.gen_range(0..1_000_000)
    )
}

/// Builds the invoice for the settlement of `payment`.
///
/// Every installment of the order that is not cancelled becomes a line item;
/// `remaining` is the order balance after this settlement.
pub fn build_invoice_request(
    order: &Order,
    payment: &OrderPayment,
    sub_orders: &[SubOrder],
    remaining: Decimal,
    template_id: &str,
    invoice_number: String,
    now: DateTime<Utc>,
) -> InvoiceRequest {
    let billed: Vec<&SubOrder> = sub_orders
        .iter()
        .filter(|sub_order| sub_order.status != OrderStatus::Cancelled)
        .collect();

    let total: Decimal = billed.iter().map(|sub_order| sub_order.amount).sum();
    let items = billed
        .iter()
        .map(|sub_order| InvoiceItem {
            description: sub_order.payment_type.invoice_title().to_string(),
            price: rupiah(sub_order.amount),
        })
        .collect();

    InvoiceRequest {
        invoice_number,
        template_id: template_id.to_string(),
        created_by: order.customer_id,
        data: InvoiceData {
            customer: InvoiceCustomer {
                name: order.customer_name.clone(),
                email: order.customer_email.clone(),
                phone_number: order.customer_phone.clone(),
            },
            payment_detail: InvoicePaymentDetail {
                payment_method: payment_method(payment.payment_type.as_deref().unwrap_or_default()),
                bank_name: payment.bank.as_deref().unwrap_or_default().to_uppercase(),
                va_number: payment.va_number.clone().unwrap_or_default(),
                date: indonesian_date(payment.paid_at.unwrap_or(now)),
                remaining_outstanding_amount: rupiah(remaining),
                is_paid: remaining.is_zero(),
            },
            items,
            total: rupiah(total),
        },
    }
}
