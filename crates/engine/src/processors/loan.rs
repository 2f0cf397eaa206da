//! Loan payment decomposition.
//!
//! Splits a monthly loan payment into capital, interest and an optional
//! insurance leg using a standard annuity amortization schedule. The
//! schedule determines the *theoretical* interest for the period; capital
//! absorbs any gap between the theoretical payment and what was actually
//! paid, so the legs always sum to the paid amount.

use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    EngineError, EntryKind, MoneyCents, ProcessingError, ResultEngine, SlaveDraft,
    TransactionWithSlaves,
    processors::{Processor, ensure_unprocessed, validate_balance},
};

#[derive(Clone, Debug, Deserialize)]
pub struct LoanConfig {
    /// Borrowed principal, in currency units.
    pub loan_amount: f64,
    /// Nominal annual rate, in percent.
    pub annual_rate: f64,
    pub duration_months: u32,
    /// Month of the first payment.
    pub start_date: NaiveDate,
    pub capital_account_id: Uuid,
    pub interest_account_id: Uuid,
    /// Fixed monthly insurance premium, in currency units. Requires
    /// `insurance_account_id`.
    pub insurance_amount: Option<f64>,
    pub insurance_account_id: Option<Uuid>,
}

impl LoanConfig {
    fn parse(config: &serde_json::Value) -> Result<Self, String> {
        let parsed: Self = serde_json::from_value(config.clone()).map_err(|e| e.to_string())?;

        if parsed.loan_amount <= 0.0 {
            return Err(format!(
                "loan_amount must be positive, got {}",
                parsed.loan_amount
            ));
        }
        if !(0.0..=100.0).contains(&parsed.annual_rate) {
            return Err(format!(
                "annual_rate must be in [0, 100], got {}",
                parsed.annual_rate
            ));
        }
        if parsed.duration_months == 0 {
            return Err("duration_months must be positive".to_string());
        }
        match (parsed.insurance_amount, parsed.insurance_account_id) {
            (Some(amount), Some(_)) if amount <= 0.0 => {
                return Err(format!("insurance_amount must be positive, got {amount}"));
            }
            (Some(_), None) => {
                return Err("insurance_amount requires insurance_account_id".to_string());
            }
            (None, Some(_)) => {
                return Err("insurance_account_id requires insurance_amount".to_string());
            }
            _ => {}
        }

        Ok(parsed)
    }

    fn monthly_rate(&self) -> f64 {
        self.annual_rate / 12.0 / 100.0
    }

    /// Constant monthly payment of the annuity schedule. A zero rate
    /// degenerates to straight principal division.
    #[must_use]
    pub fn monthly_payment(&self) -> f64 {
        let rate = self.monthly_rate();
        let n = f64::from(self.duration_months);
        if rate == 0.0 {
            self.loan_amount / n
        } else {
            let growth = (1.0 + rate).powi(self.duration_months as i32);
            self.loan_amount * rate * growth / (growth - 1.0)
        }
    }

    /// Which payment of the schedule a transaction on `date` is. The
    /// start month is payment 1; only year and month matter.
    pub fn payment_number(&self, date: NaiveDate) -> Result<u32, ProcessingError> {
        let months = i64::from(date.year() - self.start_date.year()) * 12
            + i64::from(date.month()) - i64::from(self.start_date.month());
        if months < 0 {
            return Err(ProcessingError::BeforeLoanStart {
                date,
                start: self.start_date,
            });
        }
        let number = months as u32 + 1;
        if number > self.duration_months {
            return Err(ProcessingError::PaymentPastTerm {
                number,
                duration_months: self.duration_months,
            });
        }
        Ok(number)
    }

    /// Theoretical capital/interest split for the given payment, walking
    /// the schedule from the start. In the final period the principal is
    /// forced to the remaining balance so the loan closes exactly.
    #[must_use]
    pub fn installment(&self, payment_number: u32) -> Installment {
        let rate = self.monthly_rate();
        let payment = self.monthly_payment();

        let mut remaining = self.loan_amount;
        let mut principal = 0.0;
        let mut interest = 0.0;
        for number in 1..=payment_number {
            if number == self.duration_months {
                principal = remaining;
                interest = payment - principal;
            } else {
                interest = remaining * rate;
                principal = payment - interest;
            }
            remaining -= principal;
        }

        Installment {
            principal: MoneyCents::from_eur_f64(principal),
            interest: MoneyCents::from_eur_f64(interest),
            remaining: MoneyCents::from_eur_f64(remaining),
        }
    }
}

/// One row of the amortization schedule, rounded to cents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Installment {
    pub principal: MoneyCents,
    pub interest: MoneyCents,
    /// Balance still owed after this payment.
    pub remaining: MoneyCents,
}

pub struct LoanProcessor;

impl Processor for LoanProcessor {
    fn processor_type(&self) -> &'static str {
        "loan"
    }

    fn validate_config(&self, config: &serde_json::Value) -> ResultEngine<()> {
        LoanConfig::parse(config)
            .map(|_| ())
            .map_err(EngineError::InvalidConfig)
    }

    fn process(
        &self,
        transaction: &TransactionWithSlaves,
        config: &serde_json::Value,
    ) -> Result<Vec<SlaveDraft>, ProcessingError> {
        ensure_unprocessed(transaction)?;
        let config = LoanConfig::parse(config).map_err(ProcessingError::InvalidConfig)?;

        let master = &transaction.master;
        if master.kind != EntryKind::Debit {
            return Err(ProcessingError::NotDebit {
                id: master.id,
                kind: master.kind,
            });
        }

        let number = config.payment_number(master.occurred_at.date_naive())?;
        let installment = config.installment(number);

        let insurance = config
            .insurance_amount
            .map(MoneyCents::from_eur_f64)
            .unwrap_or(MoneyCents::ZERO);

        // Capital takes whatever the paid amount leaves after theoretical
        // interest and insurance, so the decomposition matches the actual
        // payment even when it drifts from the schedule.
        let paid = master.amount;
        let capital = paid - installment.interest - insurance;
        if capital.is_negative() {
            return Err(ProcessingError::InterestExceedsPayment {
                interest: installment.interest + insurance,
                paid,
            });
        }

        let mut drafts = vec![
            SlaveDraft {
                account_id: config.capital_account_id,
                kind: EntryKind::Credit,
                amount: capital,
                occurred_at: master.occurred_at,
            },
            SlaveDraft {
                account_id: config.interest_account_id,
                kind: EntryKind::Credit,
                amount: installment.interest,
                occurred_at: master.occurred_at,
            },
        ];
        if let Some(insurance_account_id) = config.insurance_account_id {
            drafts.push(SlaveDraft {
                account_id: insurance_account_id,
                kind: EntryKind::Credit,
                amount: insurance,
                occurred_at: master.occurred_at,
            });
        }

        validate_balance(master, &drafts)?;
        Ok(drafts)
    }
}
