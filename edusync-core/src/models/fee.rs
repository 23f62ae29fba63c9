use chrono::{Month, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::coerce;

/// Named fee category with a default amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeHead {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "coerce::money")]
    pub default_amount: f64,
    pub school_id: String,
}

impl FeeHead {
    pub fn new(name: impl Into<String>, default_amount: f64, school_id: impl Into<String>) -> Self {
        Self {
            id: super::new_id(),
            name: name.into(),
            default_amount,
            school_id: school_id.into(),
        }
    }

    pub fn is_tuition(&self) -> bool {
        self.name.trim().eq_ignore_ascii_case("tuition fee")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeItem {
    pub description: String,
    #[serde(deserialize_with = "coerce::money")]
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    #[serde(deserialize_with = "coerce::money")]
    pub amount: f64,
    #[serde(deserialize_with = "coerce::required_date")]
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChallanStatus {
    #[default]
    Unpaid,
    Partial,
    Paid,
    Cancelled,
}

impl ChallanStatus {
    /// Status implied by the amounts on a live (non-cancelled) challan.
    pub fn for_amounts(paid_amount: f64, total_amount: f64, discount: f64) -> Self {
        if paid_amount >= total_amount - discount {
            ChallanStatus::Paid
        } else if paid_amount > 0.0 {
            ChallanStatus::Partial
        } else {
            ChallanStatus::Unpaid
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChallanStatus::Unpaid => "Unpaid",
            ChallanStatus::Partial => "Partial",
            ChallanStatus::Paid => "Paid",
            ChallanStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for ChallanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A generated fee invoice for one student and one month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeChallan {
    pub id: String,
    #[serde(default, deserialize_with = "coerce::text")]
    pub challan_number: String,
    pub student_id: String,
    #[serde(default, deserialize_with = "coerce::text")]
    pub class_id: String,
    #[serde(default, deserialize_with = "coerce::text")]
    pub month: String,
    #[serde(default, deserialize_with = "coerce::int")]
    pub year: i32,
    #[serde(default, deserialize_with = "coerce::date")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "coerce::lenient")]
    pub status: ChallanStatus,
    #[serde(default, deserialize_with = "coerce::json_list")]
    pub fee_items: Vec<FeeItem>,
    #[serde(default, deserialize_with = "coerce::money")]
    pub previous_balance: f64,
    #[serde(default, deserialize_with = "coerce::money")]
    pub total_amount: f64,
    #[serde(default, deserialize_with = "coerce::money")]
    pub discount: f64,
    #[serde(default, deserialize_with = "coerce::money")]
    pub paid_amount: f64,
    #[serde(default, deserialize_with = "coerce::date")]
    pub paid_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "coerce::json_list")]
    pub payment_history: Vec<PaymentRecord>,
}

/// The new payment fields of a challan after a payment is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentUpdate {
    pub paid_amount: f64,
    pub discount: f64,
    pub status: ChallanStatus,
    pub paid_date: Option<NaiveDate>,
    pub payment_history: Vec<PaymentRecord>,
}

/// 1-based number of a month name such as "March" or "mar", ignoring case.
pub fn month_number(name: &str) -> Option<u32> {
    name.trim().parse::<Month>().ok().map(|m| m.number_from_month())
}

impl FeeChallan {
    /// `(year, month)` of the billing period. An unreadable month sorts
    /// before January.
    pub fn period(&self) -> (i32, u32) {
        (self.year, month_number(&self.month).unwrap_or(0))
    }

    /// Amount charged by this challan's own items, excluding carried arrears.
    pub fn period_charge(&self) -> f64 {
        self.total_amount - self.previous_balance
    }

    /// Amount still owed after payments and discount.
    pub fn balance(&self) -> f64 {
        self.total_amount - self.discount - self.paid_amount
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == ChallanStatus::Cancelled
    }

    /// True when paying `amount` with `discount` would exceed the total.
    /// Callers are expected to get an explicit confirmation first.
    pub fn would_overpay(&self, amount: f64, discount: f64) -> bool {
        self.paid_amount + amount + discount > self.total_amount
    }

    /// Adds a payment of `amount` and replaces the discount.
    pub fn apply_payment(&self, amount: f64, discount: f64, date: NaiveDate) -> PaymentUpdate {
        let paid_amount = self.paid_amount + amount;
        let mut payment_history = self.payment_history.clone();
        if amount > 0.0 {
            payment_history.push(PaymentRecord { amount, date });
        }
        PaymentUpdate {
            paid_amount,
            discount,
            status: ChallanStatus::for_amounts(paid_amount, self.total_amount, discount),
            paid_date: Some(date),
            payment_history,
        }
    }

    /// Replaces the payment history wholesale (edit mode). The paid amount
    /// becomes the history's sum and the paid date its latest entry.
    pub fn with_payment_history(&self, history: Vec<PaymentRecord>, discount: f64) -> PaymentUpdate {
        let paid_amount: f64 = history.iter().map(|p| p.amount).sum();
        PaymentUpdate {
            paid_amount,
            discount,
            status: ChallanStatus::for_amounts(paid_amount, self.total_amount, discount),
            paid_date: history.iter().map(|p| p.date).max(),
            payment_history: history,
        }
    }
}

/// Carried-forward balance for a student, from their opening balance and
/// the non-cancelled challans of earlier periods. Never negative.
pub fn arrears<'a>(opening_balance: f64, prior: impl IntoIterator<Item = &'a FeeChallan>) -> f64 {
    let (charged, collected) = prior
        .into_iter()
        .filter(|c| !c.is_cancelled())
        .fold((opening_balance, 0.0), |(charged, collected), c| {
            (charged + c.period_charge(), collected + c.paid_amount + c.discount)
        });
    (charged - collected).max(0.0)
}

#[cfg(test)]
pub(crate) fn test_challan(id: &str, student_id: &str, total: f64, paid: f64) -> FeeChallan {
    FeeChallan {
        id: id.to_string(),
        challan_number: format!("CH-{id}"),
        student_id: student_id.to_string(),
        class_id: "c1".to_string(),
        month: "February".to_string(),
        year: 2024,
        due_date: None,
        status: ChallanStatus::for_amounts(paid, total, 0.0),
        fee_items: vec![FeeItem {
            description: "Tuition Fee".to_string(),
            amount: total,
        }],
        previous_balance: 0.0,
        total_amount: total,
        discount: 0.0,
        paid_amount: paid,
        paid_date: None,
        payment_history: Vec::new(),
    }
}
