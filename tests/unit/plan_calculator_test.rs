// Property-based tests for installment arithmetic: amounts always reconcile to the price,
// and due dates never drift or repeat.

use chrono::NaiveDate;
use enrollpay::core::Currency;
use enrollpay::modules::plans::models::{DepositRule, Frequency, PaymentType, PlanTerms};
use enrollpay::modules::plans::services::PlanCalculator;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn usd() -> Currency {
    "USD".parse().unwrap()
}

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()
}

fn frequency() -> impl Strategy<Value = Frequency> {
    prop_oneof![
        Just(Frequency::Weekly),
        Just(Frequency::Biweekly),
        Just(Frequency::Monthly),
        Just(Frequency::Quarterly),
        Just(Frequency::Yearly),
    ]
}

proptest! {
    /// Sum of generated installments equals the price for percentage deposits
    #[test]
    fn prop_percentage_deposit_sums_to_price(
        cents in 100i64..10_000_000,
        pct in 1u32..100,
        count in 1i32..=36,
        freq in frequency(),
    ) {
        let price = Decimal::new(cents, 2);
        let terms = PlanTerms::DepositInstallments {
            deposit: DepositRule::Percentage(Decimal::from(pct)),
            installment_count: count,
            frequency: freq,
        };

        let result = PlanCalculator::calculate(price, &usd(), 2, &terms, start(), 3);
        prop_assume!(result.is_ok());
        let specs = result.unwrap();

        let total: Decimal = specs.iter().map(|s| s.amount).sum();
        prop_assert_eq!(total, price);
        prop_assert_eq!(specs.len(), count as usize + 1);
        prop_assert!(specs.iter().all(|s| s.amount > Decimal::ZERO));
        prop_assert!(specs.iter().all(|s| s.amount.scale() <= 2));
    }

    /// Sum of generated installments equals the price for fixed deposits
    #[test]
    fn prop_fixed_deposit_sums_to_price(
        cents in 1_000i64..5_000_000,
        deposit_share in 1i64..99,
        count in 1i32..=24,
    ) {
        let price = Decimal::new(cents, 2);
        let deposit = Decimal::new(cents * deposit_share / 100, 2);
        prop_assume!(deposit > Decimal::ZERO);

        let terms = PlanTerms::DepositInstallments {
            deposit: DepositRule::Fixed(deposit),
            installment_count: count,
            frequency: Frequency::Monthly,
        };
        let result = PlanCalculator::calculate(price, &usd(), 2, &terms, start(), 3);
        prop_assume!(result.is_ok());
        let specs = result.unwrap();

        prop_assert_eq!(specs[0].amount, deposit);
        let total: Decimal = specs.iter().map(|s| s.amount).sum();
        prop_assert_eq!(total, price);
    }

    /// Only the final installment may differ from the others
    #[test]
    fn prop_only_last_installment_absorbs_remainder(
        cents in 10_000i64..1_000_000,
        count in 2i32..=12,
    ) {
        let price = Decimal::new(cents, 2);
        let terms = PlanTerms::DepositInstallments {
            deposit: DepositRule::Percentage(dec!(10)),
            installment_count: count,
            frequency: Frequency::Monthly,
        };
        let specs = PlanCalculator::calculate(price, &usd(), 2, &terms, start(), 3).unwrap();

        let installments: Vec<_> = specs[1..].iter().map(|s| s.amount).collect();
        let base = installments[0];
        prop_assert!(installments[..installments.len() - 1].iter().all(|a| *a == base));
        prop_assert!(*installments.last().unwrap() >= base);
    }

    /// Due dates are strictly increasing and payment numbers are 1..=n
    #[test]
    fn prop_due_dates_strictly_increase(count in 1i32..=60, freq in frequency()) {
        let terms = PlanTerms::DepositInstallments {
            deposit: DepositRule::Percentage(dec!(25)),
            installment_count: count,
            frequency: freq,
        };
        let specs = PlanCalculator::calculate(dec!(100000), &usd(), 2, &terms, start(), 3).unwrap();

        for (i, pair) in specs.windows(2).enumerate() {
            prop_assert!(pair[0].due_date < pair[1].due_date);
            prop_assert_eq!(pair[0].payment_number, i as i32 + 1);
        }
    }

    /// Zero-decimal currencies never produce fractional amounts
    #[test]
    fn prop_zero_decimal_currency_stays_whole(
        price in 1_000i64..100_000_000,
        count in 1i32..=12,
    ) {
        let jpy: Currency = "JPY".parse().unwrap();
        let price = Decimal::from(price);
        let terms = PlanTerms::DepositInstallments {
            deposit: DepositRule::Percentage(dec!(33)),
            installment_count: count,
            frequency: Frequency::Monthly,
        };
        let result = PlanCalculator::calculate(price, &jpy, 0, &terms, start(), 3);
        prop_assume!(result.is_ok());
        let specs = result.unwrap();

        prop_assert!(specs.iter().all(|s| s.amount.fract().is_zero()));
        let total: Decimal = specs.iter().map(|s| s.amount).sum();
        prop_assert_eq!(total, price);
    }
}

#[test]
fn test_month_end_start_clamps_without_drift() {
    let terms =
        PlanTerms::deposit_installments(DepositRule::Percentage(dec!(20)), 3, Frequency::Monthly)
            .unwrap();
    let specs = PlanCalculator::calculate(dec!(1000), &usd(), 2, &terms, start(), 3).unwrap();

    let dates: Vec<_> = specs.iter().map(|s| s.due_date).collect();
    assert_eq!(
        dates,
        vec![
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            NaiveDate::from_ymd_opt(2025, 2, 28).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
            NaiveDate::from_ymd_opt(2025, 4, 30).unwrap(),
        ]
    );
}

#[test]
fn test_rejects_non_positive_installment_count() {
    let terms = PlanTerms::DepositInstallments {
        deposit: DepositRule::Percentage(dec!(20)),
        installment_count: 0,
        frequency: Frequency::Monthly,
    };
    assert!(PlanCalculator::calculate(dec!(1000), &usd(), 2, &terms, start(), 3).is_err());
}

#[test]
fn test_rejects_deposit_at_or_above_price() {
    let terms = PlanTerms::DepositInstallments {
        deposit: DepositRule::Fixed(dec!(1000)),
        installment_count: 2,
        frequency: Frequency::Monthly,
    };
    assert!(PlanCalculator::calculate(dec!(1000), &usd(), 2, &terms, start(), 3).is_err());
}

#[test]
fn test_subscription_entries_carry_full_price() {
    let terms = PlanTerms::subscription(Frequency::Quarterly, None).unwrap();
    let specs = PlanCalculator::calculate(dec!(59.90), &usd(), 2, &terms, start(), 4).unwrap();

    assert_eq!(specs.len(), 4);
    assert!(specs
        .iter()
        .all(|s| s.payment_type == PaymentType::Subscription && s.amount == dec!(59.90)));
}
