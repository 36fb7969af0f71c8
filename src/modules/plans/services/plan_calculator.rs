use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::core::currency::{round_down_to_scale, round_to_scale, smallest_unit, validate_amount};
use crate::core::{Currency, Result};
use crate::modules::plans::models::payment_plan::invalid_plan;
use crate::modules::plans::models::{DepositRule, Frequency, PaymentType, PlanTerms};

/// One installment the plan asks for, before it becomes a persisted schedule entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallmentSpec {
    /// 1-based sequence within the enrollment
    pub payment_number: i32,
    pub payment_type: PaymentType,
    pub amount: Decimal,
    pub due_date: NaiveDate,
}

/// Pure plan arithmetic: price + plan definition in, ordered installment specs out
///
/// The generated amounts always sum to the price exactly; the final installment absorbs
/// whatever truncation left behind.
pub struct PlanCalculator;

impl PlanCalculator {
    /// Calculate the installment specs for an enrollment
    ///
    /// # Arguments
    /// * `price` - Product price (positive, at most `scale` decimals)
    /// * `currency` - Settlement currency
    /// * `scale` - Currency precision resolved for the tenant
    /// * `terms` - Plan definition
    /// * `start_date` - Date of the first (deposit / full / first-period) payment
    /// * `subscription_periods` - Periods materialised up front for subscriptions
    pub fn calculate(
        price: Decimal,
        currency: &Currency,
        scale: u32,
        terms: &PlanTerms,
        start_date: NaiveDate,
        subscription_periods: i32,
    ) -> Result<Vec<InstallmentSpec>> {
        validate_amount(price, currency, scale).map_err(invalid_plan)?;
        terms.validate()?;

        let specs = match terms {
            PlanTerms::OneTime => vec![InstallmentSpec {
                payment_number: 1,
                payment_type: PaymentType::Full,
                amount: price,
                due_date: start_date,
            }],
            PlanTerms::DepositInstallments {
                deposit,
                installment_count,
                frequency,
            } => Self::deposit_installments(
                price,
                scale,
                *deposit,
                *installment_count,
                *frequency,
                start_date,
            )?,
            PlanTerms::Subscription { .. } => {
                Self::subscription_periods(price, terms, start_date, 0, subscription_periods)?
            }
        };

        debug!(
            plan_type = terms.plan_type(),
            price = %price,
            entries = specs.len(),
            "Calculated installment specs"
        );

        Ok(specs)
    }

    /// Deposit amount for a price under the given rule, rounded to currency precision
    pub fn deposit_amount(price: Decimal, scale: u32, rule: DepositRule) -> Result<Decimal> {
        let deposit = match rule {
            DepositRule::Fixed(amount) => round_to_scale(amount, scale),
            DepositRule::Percentage(pct) => {
                round_to_scale(price * pct / Decimal::ONE_HUNDRED, scale)
            }
        };

        if deposit <= Decimal::ZERO {
            return Err(invalid_plan("deposit rounds to zero at currency precision"));
        }
        if deposit >= price {
            return Err(invalid_plan(format!(
                "deposit {} must be less than price {}",
                deposit, price
            )));
        }

        Ok(deposit)
    }

    fn deposit_installments(
        price: Decimal,
        scale: u32,
        rule: DepositRule,
        installment_count: i32,
        frequency: Frequency,
        start_date: NaiveDate,
    ) -> Result<Vec<InstallmentSpec>> {
        let deposit = Self::deposit_amount(price, scale, rule)?;
        let remaining = price - deposit;
        let count = Decimal::from(installment_count);
        let base = round_down_to_scale(remaining / count, scale);

        if base < smallest_unit(scale) {
            return Err(invalid_plan(format!(
                "remaining {} cannot be split into {} installments",
                remaining, installment_count
            )));
        }

        let mut specs = Vec::with_capacity(installment_count as usize + 1);
        specs.push(InstallmentSpec {
            payment_number: 1,
            payment_type: PaymentType::Deposit,
            amount: deposit,
            due_date: start_date,
        });

        let mut distributed = Decimal::ZERO;
        for k in 1..=installment_count {
            let amount = if k == installment_count {
                remaining - distributed
            } else {
                base
            };
            distributed += amount;

            specs.push(InstallmentSpec {
                payment_number: k + 1,
                payment_type: PaymentType::Installment,
                amount,
                due_date: due_date(frequency, start_date, k)?,
            });
        }

        Ok(specs)
    }

    /// Materialise subscription periods `[first_index, first_index + count)`
    ///
    /// Period `i` (0-based) is due at `start_date + i * frequency` and gets payment number
    /// `i + 1`. A `billing_periods` cap on the plan truncates the range; an exhausted
    /// subscription yields an empty list.
    pub fn subscription_periods(
        price: Decimal,
        terms: &PlanTerms,
        start_date: NaiveDate,
        first_index: i32,
        count: i32,
    ) -> Result<Vec<InstallmentSpec>> {
        let (frequency, billing_periods) = match terms {
            PlanTerms::Subscription {
                frequency,
                billing_periods,
            } => (*frequency, *billing_periods),
            other => {
                return Err(invalid_plan(format!(
                    "{} plans have no recurring periods",
                    other.plan_type()
                )))
            }
        };
        if count <= 0 {
            return Err(invalid_plan(format!(
                "subscription periods to materialise must be positive, got {}",
                count
            )));
        }

        let end = match billing_periods {
            Some(cap) => (first_index + count).min(cap),
            None => first_index + count,
        };

        (first_index..end)
            .map(|i| {
                Ok(InstallmentSpec {
                    payment_number: i + 1,
                    payment_type: PaymentType::Subscription,
                    amount: price,
                    due_date: due_date(frequency, start_date, i)?,
                })
            })
            .collect()
    }
}

fn due_date(frequency: Frequency, start_date: NaiveDate, k: i32) -> Result<NaiveDate> {
    let k = u32::try_from(k).map_err(|_| invalid_plan("negative period index"))?;
    frequency
        .advance(start_date, k)
        .ok_or_else(|| invalid_plan("due date out of range"))
}
