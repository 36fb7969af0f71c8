use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{AppError, Result, TenantId};

/// Upper bound on installments a single plan may generate
pub const MAX_INSTALLMENTS: i32 = 120;

/// How long between two consecutive installments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Frequency {
    /// Date of the `k`-th period after `start`
    ///
    /// Always computed from `start` so month-end clamping never accumulates drift
    /// (Jan 31 + 1 month = Feb 28, + 2 months = Mar 31).
    pub fn advance(&self, start: NaiveDate, k: u32) -> Option<NaiveDate> {
        match self {
            Frequency::Weekly => start.checked_add_days(Days::new(7 * u64::from(k))),
            Frequency::Biweekly => start.checked_add_days(Days::new(14 * u64::from(k))),
            Frequency::Monthly => start.checked_add_months(Months::new(k)),
            Frequency::Quarterly => start.checked_add_months(Months::new(3 * k)),
            Frequency::Yearly => start.checked_add_months(Months::new(12 * k)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Weekly => "weekly",
            Frequency::Biweekly => "biweekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::Yearly => "yearly",
        }
    }
}

/// Deposit rule of a deposit+installments plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "deposit_type", content = "value", rename_all = "snake_case")]
pub enum DepositRule {
    /// Absolute amount in the enrollment currency
    Fixed(Decimal),
    /// Percentage of the price, exclusive range (0, 100)
    Percentage(Decimal),
}

/// Plan definition: one variant per plan kind, each with its own required fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "plan_type", rename_all = "snake_case")]
pub enum PlanTerms {
    OneTime,
    DepositInstallments {
        deposit: DepositRule,
        installment_count: i32,
        frequency: Frequency,
    },
    Subscription {
        frequency: Frequency,
        /// Total periods before the subscription ends; open-ended when absent
        #[serde(default)]
        billing_periods: Option<i32>,
    },
}

impl PlanTerms {
    pub fn deposit_installments(
        deposit: DepositRule,
        installment_count: i32,
        frequency: Frequency,
    ) -> Result<Self> {
        let terms = PlanTerms::DepositInstallments {
            deposit,
            installment_count,
            frequency,
        };
        terms.validate()?;
        Ok(terms)
    }

    pub fn subscription(frequency: Frequency, billing_periods: Option<i32>) -> Result<Self> {
        let terms = PlanTerms::Subscription {
            frequency,
            billing_periods,
        };
        terms.validate()?;
        Ok(terms)
    }

    /// Price-independent structural checks
    pub fn validate(&self) -> Result<()> {
        match self {
            PlanTerms::OneTime => Ok(()),
            PlanTerms::DepositInstallments {
                deposit,
                installment_count,
                ..
            } => {
                if *installment_count <= 0 {
                    return Err(invalid_plan(format!(
                        "installment_count must be positive, got {}",
                        installment_count
                    )));
                }
                if *installment_count > MAX_INSTALLMENTS {
                    return Err(invalid_plan(format!(
                        "installment_count cannot exceed {}, got {}",
                        MAX_INSTALLMENTS, installment_count
                    )));
                }
                match deposit {
                    DepositRule::Fixed(amount) if *amount <= Decimal::ZERO => {
                        Err(invalid_plan("fixed deposit must be positive"))
                    }
                    DepositRule::Percentage(pct)
                        if *pct <= Decimal::ZERO || *pct >= Decimal::ONE_HUNDRED =>
                    {
                        Err(invalid_plan(format!(
                            "deposit percentage must be between 0 and 100 exclusive, got {}",
                            pct
                        )))
                    }
                    _ => Ok(()),
                }
            }
            PlanTerms::Subscription {
                billing_periods, ..
            } => match billing_periods {
                Some(periods) if *periods <= 0 => Err(invalid_plan(format!(
                    "billing_periods must be positive, got {}",
                    periods
                ))),
                _ => Ok(()),
            },
        }
    }

    pub fn plan_type(&self) -> &'static str {
        match self {
            PlanTerms::OneTime => "one_time",
            PlanTerms::DepositInstallments { .. } => "deposit_installments",
            PlanTerms::Subscription { .. } => "subscription",
        }
    }

    pub fn is_subscription(&self) -> bool {
        matches!(self, PlanTerms::Subscription { .. })
    }
}

pub(crate) fn invalid_plan(reason: impl std::fmt::Display) -> AppError {
    AppError::validation(format!("Invalid plan: {}", reason))
}

/// Kind of a scheduled payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Deposit,
    Installment,
    Full,
    Subscription,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Deposit => "deposit",
            PaymentType::Installment => "installment",
            PaymentType::Full => "full",
            PaymentType::Subscription => "subscription",
        }
    }
}

impl std::fmt::Display for PaymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(PaymentType::Deposit),
            "installment" => Ok(PaymentType::Installment),
            "full" => Ok(PaymentType::Full),
            "subscription" => Ok(PaymentType::Subscription),
            _ => Err(format!("Invalid payment type: {}", s)),
        }
    }
}

/// Payment plan template owned by a tenant
///
/// Enrollments copy `terms` at creation, so revising a plan never touches existing schedules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentPlan {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub name: String,
    pub terms: PlanTerms,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentPlan {
    pub fn new(
        tenant_id: TenantId,
        name: String,
        terms: PlanTerms,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(AppError::validation("Plan name cannot be empty"));
        }
        terms.validate()?;

        Ok(Self {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.trim().to_string(),
            terms,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replace the terms, producing the next version
    pub fn revise(&mut self, terms: PlanTerms, now: DateTime<Utc>) -> Result<()> {
        terms.validate()?;
        self.terms = terms;
        self.version += 1;
        self.updated_at = now;
        Ok(())
    }
}
