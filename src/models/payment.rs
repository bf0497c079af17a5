use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Wallet {
    pub user_id: Uuid,
    pub balance: Decimal,
    /// Funds held in escrow for unpaid deliveries.
    pub pending_balance: Decimal,
    pub total_earned: Decimal,
    pub total_spent: Decimal,
    pub currency: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("amount must be positive")]
    NonPositiveAmount,

    #[error("insufficient funds: {available} available, {requested} requested")]
    InsufficientFunds { available: Decimal, requested: Decimal },

    #[error("only {held} held in escrow, {requested} requested")]
    InsufficientHold { held: Decimal, requested: Decimal },
}

impl Wallet {
    pub fn new(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            balance: Decimal::ZERO,
            pending_balance: Decimal::ZERO,
            total_earned: Decimal::ZERO,
            total_spent: Decimal::ZERO,
            currency: "DZD".to_string(),
            updated_at: now,
        }
    }

    pub fn available(&self) -> Decimal {
        self.balance - self.pending_balance
    }

    pub fn credit(&mut self, amount: Decimal, now: DateTime<Utc>) -> Result<(), WalletError> {
        ensure_positive(amount)?;
        self.balance += amount;
        self.updated_at = now;
        Ok(())
    }

    /// Credits traveler earnings, counted in `total_earned`.
    pub fn earn(&mut self, amount: Decimal, now: DateTime<Utc>) -> Result<(), WalletError> {
        self.credit(amount, now)?;
        self.total_earned += amount;
        Ok(())
    }

    pub fn debit(&mut self, amount: Decimal, now: DateTime<Utc>) -> Result<(), WalletError> {
        ensure_positive(amount)?;
        if self.available() < amount {
            return Err(WalletError::InsufficientFunds {
                available: self.available(),
                requested: amount,
            });
        }
        self.balance -= amount;
        self.updated_at = now;
        Ok(())
    }

    pub fn hold(&mut self, amount: Decimal, now: DateTime<Utc>) -> Result<(), WalletError> {
        ensure_positive(amount)?;
        if self.available() < amount {
            return Err(WalletError::InsufficientFunds {
                available: self.available(),
                requested: amount,
            });
        }
        self.pending_balance += amount;
        self.updated_at = now;
        Ok(())
    }

    pub fn release_hold(&mut self, amount: Decimal, now: DateTime<Utc>) -> Result<(), WalletError> {
        ensure_positive(amount)?;
        if self.pending_balance < amount {
            return Err(WalletError::InsufficientHold {
                held: self.pending_balance,
                requested: amount,
            });
        }
        self.pending_balance -= amount;
        self.updated_at = now;
        Ok(())
    }

    /// Turns a held amount into a completed payment.
    pub fn confirm_hold(&mut self, amount: Decimal, now: DateTime<Utc>) -> Result<(), WalletError> {
        self.release_hold(amount, now)?;
        self.balance -= amount;
        self.total_spent += amount;
        Ok(())
    }
}

fn ensure_positive(amount: Decimal) -> Result<(), WalletError> {
    if amount <= Decimal::ZERO {
        Err(WalletError::NonPositiveAmount)
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Payment,
    Refund,
    Commission,
    Earning,
    Transfer,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    pub id: Uuid,
    pub reference: String,
    pub user_id: Uuid,
    pub shipment_id: Option<Uuid>,
    pub match_id: Option<Uuid>,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub currency: String,
    pub status: TransactionStatus,
    pub payment_method: String,
    pub fee: Decimal,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn generate_reference() -> String {
        let hex = Uuid::new_v4().simple().to_string();
        format!("TXN{}", hex[..12].to_uppercase())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: Uuid,
        transaction_type: TransactionType,
        amount: Decimal,
        status: TransactionStatus,
        payment_method: &str,
        fee: Decimal,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            reference: Self::generate_reference(),
            user_id,
            shipment_id: None,
            match_id: None,
            transaction_type,
            amount,
            currency: "DZD".to_string(),
            status,
            payment_method: payment_method.to_string(),
            fee,
            description: description.into(),
            created_at: now,
            completed_at: (status == TransactionStatus::Completed).then_some(now),
        }
    }

    pub fn for_shipment(mut self, shipment_id: Uuid, match_id: Option<Uuid>) -> Self {
        self.shipment_id = Some(shipment_id);
        self.match_id = match_id;
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodKind {
    Card,
    Cash,
    BankTransfer,
    Chargily,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentMethodConfig {
    pub code: String,
    pub name: String,
    pub kind: PaymentMethodKind,
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    pub fee_percentage: Decimal,
    pub fee_fixed: Decimal,
    /// Cash office address, for cash methods.
    pub location: Option<String>,
}

impl PaymentMethodConfig {
    pub fn fee_for(&self, amount: Decimal) -> Decimal {
        (amount * self.fee_percentage / Decimal::ONE_HUNDRED + self.fee_fixed).round_dp(2)
    }

    pub fn accepts(&self, amount: Decimal) -> bool {
        amount >= self.min_amount && amount <= self.max_amount
    }

    /// Whether a deposit settles immediately or waits for an admin.
    pub fn settles_immediately(&self) -> bool {
        matches!(self.kind, PaymentMethodKind::Card | PaymentMethodKind::Chargily)
    }
}

pub fn payment_methods() -> Vec<PaymentMethodConfig> {
    let card = |code: &str, name: &str| PaymentMethodConfig {
        code: code.to_string(),
        name: name.to_string(),
        kind: PaymentMethodKind::Card,
        min_amount: Decimal::new(100, 0),
        max_amount: Decimal::new(500_000, 0),
        fee_percentage: Decimal::new(25, 1),
        fee_fixed: Decimal::new(50, 0),
        location: None,
    };
    let cash = |code: &str, name: &str, location: &str| PaymentMethodConfig {
        code: code.to_string(),
        name: name.to_string(),
        kind: PaymentMethodKind::Cash,
        min_amount: Decimal::new(100, 0),
        max_amount: Decimal::new(200_000, 0),
        fee_percentage: Decimal::ZERO,
        fee_fixed: Decimal::ZERO,
        location: Some(location.to_string()),
    };

    vec![
        card("cib", "CIB"),
        card("edahabia", "Edahabia"),
        card("visa", "Visa"),
        card("mastercard", "Mastercard"),
        cash("cash_alger", "Cash office Alger", "Bureau Alger Centre"),
        cash("cash_oran", "Cash office Oran", "Bureau Oran"),
        cash("cash_constantine", "Cash office Constantine", "Bureau Constantine"),
        PaymentMethodConfig {
            code: "bank_transfer".to_string(),
            name: "Bank transfer".to_string(),
            kind: PaymentMethodKind::BankTransfer,
            min_amount: Decimal::new(1_000, 0),
            max_amount: Decimal::new(1_000_000, 0),
            fee_percentage: Decimal::ZERO,
            fee_fixed: Decimal::new(100, 0),
            location: None,
        },
        PaymentMethodConfig {
            code: "chargily".to_string(),
            name: "Chargily Pay".to_string(),
            kind: PaymentMethodKind::Chargily,
            min_amount: Decimal::new(100, 0),
            max_amount: Decimal::new(1_000_000, 0),
            fee_percentage: Decimal::new(15, 1),
            fee_fixed: Decimal::ZERO,
            location: None,
        },
    ]
}

pub fn find_payment_method(code: &str) -> Option<PaymentMethodConfig> {
    payment_methods().into_iter().find(|m| m.code == code)
}
