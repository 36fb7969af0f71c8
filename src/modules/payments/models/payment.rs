use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{AppError, Currency, Result, TenantId};

/// Settlement status of a payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
    PartiallyRefunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
            Self::PartiallyRefunded => "partially_refunded",
        }
    }

    /// Money was captured at some point (refunds are netted separately)
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            Self::Paid | Self::PartiallyRefunded | Self::Refunded
        )
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for PaymentStatus {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            "partially_refunded" => Ok(Self::PartiallyRefunded),
            _ => Err(format!("Invalid payment status: {}", value)),
        }
    }
}

/// How a payment was collected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Charged through the payment gateway
    Gateway,
    BankTransfer,
    Cash,
    Other(String),
}

impl PaymentMethod {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Gateway => "gateway",
            Self::BankTransfer => "bank_transfer",
            Self::Cash => "cash",
            Self::Other(name) => name.as_str(),
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "gateway" => Self::Gateway,
            "bank_transfer" => Self::BankTransfer,
            "cash" => Self::Cash,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Who initiated a refund
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundSource {
    Admin,
    Gateway,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRecord {
    pub amount: Decimal,
    pub reason: Option<String>,
    pub external_refund_id: Option<String>,
    pub source: RefundSource,
    pub actor: String,
    pub recorded_at: DateTime<Utc>,
}

/// Settlement record for one charge attempt or one manual payment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub enrollment_id: Uuid,
    pub schedule_entry_id: Uuid,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: PaymentStatus,
    /// Gateway charge id, unique per tenant; absent for off-platform payments
    pub external_charge_id: Option<String>,
    pub payment_method: PaymentMethod,
    pub transaction_reference: Option<String>,
    pub refunded_amount: Decimal,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_reason: Option<String>,
    pub refund_history: Vec<RefundRecord>,
    /// Gateway event ids applied to this payment
    pub processed_events: Vec<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Pending payment for a charge just created at the gateway
    pub fn for_charge(
        tenant_id: TenantId,
        enrollment_id: Uuid,
        schedule_entry_id: Uuid,
        amount: Decimal,
        currency: Currency,
        external_charge_id: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(
            tenant_id,
            enrollment_id,
            schedule_entry_id,
            amount,
            currency,
            PaymentStatus::Pending,
            Some(external_charge_id),
            PaymentMethod::Gateway,
            None,
            now,
        )
    }

    /// Already-settled payment collected off-platform
    #[allow(clippy::too_many_arguments)]
    pub fn manual(
        tenant_id: TenantId,
        enrollment_id: Uuid,
        schedule_entry_id: Uuid,
        amount: Decimal,
        currency: Currency,
        payment_method: PaymentMethod,
        transaction_reference: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut payment = Self::new(
            tenant_id,
            enrollment_id,
            schedule_entry_id,
            amount,
            currency,
            PaymentStatus::Paid,
            None,
            payment_method,
            transaction_reference,
            now,
        );
        payment.paid_at = Some(now);
        payment
    }

    #[allow(clippy::too_many_arguments)]
    fn new(
        tenant_id: TenantId,
        enrollment_id: Uuid,
        schedule_entry_id: Uuid,
        amount: Decimal,
        currency: Currency,
        status: PaymentStatus,
        external_charge_id: Option<String>,
        payment_method: PaymentMethod,
        transaction_reference: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            enrollment_id,
            schedule_entry_id,
            amount,
            currency,
            status,
            external_charge_id,
            payment_method,
            transaction_reference,
            refunded_amount: Decimal::ZERO,
            refunded_at: None,
            refund_reason: None,
            refund_history: Vec::new(),
            processed_events: Vec::new(),
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Amount that still counts toward the enrollment's paid total
    pub fn net_amount(&self) -> Decimal {
        if self.status.is_settled() {
            self.amount - self.refunded_amount
        } else {
            Decimal::ZERO
        }
    }

    pub fn refundable_amount(&self) -> Decimal {
        self.net_amount()
    }

    pub fn has_processed(&self, event_id: &str) -> bool {
        self.processed_events.iter().any(|e| e == event_id)
    }

    pub fn has_refund(&self, external_refund_id: &str) -> bool {
        self.refund_history
            .iter()
            .any(|r| r.external_refund_id.as_deref() == Some(external_refund_id))
    }

    pub fn mark_paid(&mut self, now: DateTime<Utc>) {
        self.status = PaymentStatus::Paid;
        self.paid_at = Some(now);
        self.updated_at = now;
    }

    pub fn mark_failed(&mut self, now: DateTime<Utc>) {
        self.status = PaymentStatus::Failed;
        self.updated_at = now;
    }

    /// Apply a refund and return the amount actually recorded
    ///
    /// Admin refunds beyond the refundable amount are rejected. Gateway refunds are capped at it
    /// since the money has already moved.
    pub fn apply_refund(
        &mut self,
        amount: Decimal,
        reason: Option<String>,
        external_refund_id: Option<String>,
        source: RefundSource,
        actor: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Decimal> {
        if amount <= Decimal::ZERO {
            return Err(AppError::validation("Refund amount must be positive"));
        }
        if !self.status.is_settled() {
            return Err(AppError::conflict(format!(
                "Payment {} in status {} cannot be refunded",
                self.id, self.status
            )));
        }

        let refundable = self.refundable_amount();
        let applied = match source {
            RefundSource::Admin if amount > refundable => {
                return Err(AppError::validation(format!(
                    "Refund {} exceeds refundable amount {} on payment {}",
                    amount, refundable, self.id
                )));
            }
            RefundSource::Admin => amount,
            RefundSource::Gateway => amount.min(refundable),
        };

        self.refunded_amount += applied;
        self.refunded_at = Some(now);
        if reason.is_some() {
            self.refund_reason = reason.clone();
        }
        self.status = if self.refunded_amount >= self.amount {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartiallyRefunded
        };
        self.refund_history.push(RefundRecord {
            amount: applied,
            reason,
            external_refund_id,
            source,
            actor: actor.into(),
            recorded_at: now,
        });
        self.updated_at = now;

        Ok(applied)
    }
}
