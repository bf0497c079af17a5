use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::engine::notifier::{notify, template_data};
use crate::error::{AppError, FieldErrors};
use crate::models::matching::{Match, MatchStatus};
use crate::models::notification::{Channel, NotificationPriority};
use crate::models::payment::{
    Transaction, TransactionStatus, TransactionType, Wallet, WalletError, find_payment_method,
};
use crate::models::shipment::{PaymentMethod, Shipment, ShipmentStatus};
use crate::state::AppState;

pub const MIN_DEPOSIT: Decimal = Decimal::from_parts(100, 0, 0, false, 0);
pub const MAX_DEPOSIT: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

impl From<WalletError> for AppError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::NonPositiveAmount => AppError::BadRequest(err.to_string()),
            WalletError::InsufficientFunds { .. } => AppError::Conflict(err.to_string()),
            WalletError::InsufficientHold { .. } => AppError::Internal(err.to_string()),
        }
    }
}

pub fn wallet_snapshot(state: &AppState, user_id: Uuid) -> Wallet {
    state
        .wallets
        .entry(user_id)
        .or_insert_with(|| Wallet::new(user_id, Utc::now()))
        .value()
        .clone()
}

/// Wallet and ledger writes computed up front and applied together.
#[derive(Debug, Default)]
pub struct LedgerPlan {
    wallets: Vec<Wallet>,
    transactions: Vec<Transaction>,
}

impl LedgerPlan {
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn commit(self, state: &AppState) {
        for wallet in self.wallets {
            state.wallets.insert(wallet.user_id, wallet);
        }
        for transaction in self.transactions {
            state.transactions.insert(transaction.id, transaction);
        }
    }
}

fn validate_amount(amount: Decimal, method: &str) -> Result<(), AppError> {
    let mut errors = FieldErrors::new();
    errors.check(
        amount >= MIN_DEPOSIT,
        "amount",
        "amount must be at least 100 DZD",
    );
    errors.check(
        amount <= MAX_DEPOSIT,
        "amount",
        "amount must not exceed 1000000 DZD",
    );
    match find_payment_method(method) {
        Some(config) if !config.accepts(amount) => errors.add(
            "payment_method",
            format!(
                "{} accepts amounts between {} and {}",
                config.name, config.min_amount, config.max_amount
            ),
        ),
        Some(_) => {}
        None => errors.add("payment_method", "unknown payment method"),
    }
    errors.into_result()
}

pub fn deposit(
    state: &AppState,
    user_id: Uuid,
    amount: Decimal,
    method_code: &str,
    now: DateTime<Utc>,
) -> Result<Transaction, AppError> {
    validate_amount(amount, method_code)?;
    let method = find_payment_method(method_code)
        .ok_or_else(|| AppError::BadRequest("unknown payment method".to_string()))?;

    let status = if method.settles_immediately() {
        TransactionStatus::Completed
    } else {
        TransactionStatus::Pending
    };
    let transaction = Transaction::new(
        user_id,
        TransactionType::Deposit,
        amount,
        status,
        &method.code,
        method.fee_for(amount),
        format!("Deposit via {}", method.name),
        now,
    );

    {
        let _guard = state.transaction();
        if status == TransactionStatus::Completed {
            let mut wallet = wallet_snapshot(state, user_id);
            wallet.credit(amount, now)?;
            state.wallets.insert(user_id, wallet);
        }
        state.transactions.insert(transaction.id, transaction.clone());
    }

    if status == TransactionStatus::Completed {
        notify_payment_received(state, &transaction);
    }

    info!(
        user_id = %user_id,
        reference = %transaction.reference,
        amount = %amount,
        method = %method.code,
        status = ?status,
        "deposit recorded"
    );
    Ok(transaction)
}

/// Admin confirmation of a cash or bank transfer deposit.
pub fn confirm_deposit(
    state: &AppState,
    transaction_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Transaction, AppError> {
    let transaction = {
        let _guard = state.transaction();
        let mut transaction = state
            .transactions
            .get(&transaction_id)
            .map(|t| t.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("transaction {transaction_id} not found")))?;

        if transaction.transaction_type != TransactionType::Deposit
            || transaction.status != TransactionStatus::Pending
        {
            return Err(AppError::Conflict(
                "only pending deposits can be confirmed".to_string(),
            ));
        }

        let mut wallet = wallet_snapshot(state, transaction.user_id);
        wallet.credit(transaction.amount, now)?;

        transaction.status = TransactionStatus::Completed;
        transaction.completed_at = Some(now);

        state.wallets.insert(wallet.user_id, wallet);
        state.transactions.insert(transaction.id, transaction.clone());
        transaction
    };

    notify_payment_received(state, &transaction);
    Ok(transaction)
}

pub fn withdraw(
    state: &AppState,
    user_id: Uuid,
    amount: Decimal,
    method_code: &str,
    now: DateTime<Utc>,
) -> Result<Transaction, AppError> {
    validate_amount(amount, method_code)?;
    let method = find_payment_method(method_code)
        .ok_or_else(|| AppError::BadRequest("unknown payment method".to_string()))?;

    let _guard = state.transaction();
    let mut wallet = wallet_snapshot(state, user_id);
    wallet.debit(amount, now)?;

    let transaction = Transaction::new(
        user_id,
        TransactionType::Withdrawal,
        amount,
        TransactionStatus::Completed,
        &method.code,
        method.fee_for(amount),
        format!("Withdrawal to {}", method.name),
        now,
    );

    state.wallets.insert(user_id, wallet);
    state.transactions.insert(transaction.id, transaction.clone());

    info!(user_id = %user_id, reference = %transaction.reference, amount = %amount, "withdrawal recorded");
    Ok(transaction)
}

fn accepted_match_for(state: &AppState, shipment_id: Uuid) -> Option<Match> {
    state
        .matches
        .iter()
        .find(|m| m.shipment_id == shipment_id && m.status == MatchStatus::Accepted)
        .map(|m| m.value().clone())
}

/// Holds the agreed price in the sender's wallet until delivery.
pub fn pay_for_shipment(
    state: &AppState,
    user_id: Uuid,
    shipment_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Transaction, AppError> {
    let _guard = state.transaction();

    let mut shipment = state
        .shipments
        .get(&shipment_id)
        .map(|s| s.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("shipment {shipment_id} not found")))?;

    if shipment.sender_id != user_id {
        return Err(AppError::Forbidden(
            "only the sender can pay for a shipment".to_string(),
        ));
    }
    if shipment.is_paid {
        return Err(AppError::Conflict("shipment is already paid".to_string()));
    }
    if !matches!(
        shipment.status,
        ShipmentStatus::Matched | ShipmentStatus::InTransit
    ) {
        return Err(AppError::Conflict(
            "shipment must be matched before payment".to_string(),
        ));
    }
    let price = shipment
        .price
        .ok_or_else(|| AppError::Conflict("shipment has no agreed price".to_string()))?;
    let matched = accepted_match_for(state, shipment_id);

    let mut wallet = wallet_snapshot(state, user_id);
    wallet.hold(price, now)?;

    let transaction = Transaction::new(
        user_id,
        TransactionType::Payment,
        price,
        TransactionStatus::Pending,
        "wallet",
        Decimal::ZERO,
        format!("Payment for shipment {}", shipment.tracking_number),
        now,
    )
    .for_shipment(shipment_id, matched.map(|m| m.id));

    shipment.is_paid = true;
    shipment.payment_method = Some(PaymentMethod::Wallet);
    shipment.updated_at = now;

    state.wallets.insert(user_id, wallet);
    state.transactions.insert(transaction.id, transaction.clone());
    state.shipments.insert(shipment.id, shipment);

    info!(
        user_id = %user_id,
        shipment_id = %shipment_id,
        amount = %price,
        "shipment payment held in escrow"
    );
    Ok(transaction)
}

fn held_payment(state: &AppState, shipment_id: Uuid) -> Option<Transaction> {
    state
        .transactions
        .iter()
        .find(|t| {
            t.shipment_id == Some(shipment_id)
                && t.transaction_type == TransactionType::Payment
                && t.status == TransactionStatus::Pending
        })
        .map(|t| t.value().clone())
}

/// Settlement on delivery. Caller holds the store transaction lock.
pub fn plan_delivery_settlement(
    state: &AppState,
    shipment: &Shipment,
    matched: &Match,
    now: DateTime<Utc>,
) -> Result<LedgerPlan, AppError> {
    let mut plan = LedgerPlan::default();
    if !shipment.is_paid {
        return Ok(plan);
    }
    let Some(mut payment) = held_payment(state, shipment.id) else {
        return Ok(plan);
    };

    let mut sender_wallet = wallet_snapshot(state, shipment.sender_id);
    sender_wallet.confirm_hold(payment.amount, now)?;
    payment.status = TransactionStatus::Completed;
    payment.completed_at = Some(now);
    plan.wallets.push(sender_wallet);
    plan.transactions.push(payment);

    let economics = matched.economics.clone().unwrap_or_default();

    if economics.traveler_earnings > Decimal::ZERO {
        let mut traveler_wallet = wallet_snapshot(state, matched.traveler_id);
        traveler_wallet.earn(economics.traveler_earnings, now)?;
        plan.wallets.push(traveler_wallet);
        plan.transactions.push(
            Transaction::new(
                matched.traveler_id,
                TransactionType::Earning,
                economics.traveler_earnings,
                TransactionStatus::Completed,
                "wallet",
                Decimal::ZERO,
                format!("Earnings for shipment {}", shipment.tracking_number),
                now,
            )
            .for_shipment(shipment.id, Some(matched.id)),
        );
    }

    if economics.platform_commission > Decimal::ZERO {
        plan.transactions.push(
            Transaction::new(
                matched.traveler_id,
                TransactionType::Commission,
                economics.platform_commission,
                TransactionStatus::Completed,
                "wallet",
                Decimal::ZERO,
                format!("Platform commission for shipment {}", shipment.tracking_number),
                now,
            )
            .for_shipment(shipment.id, Some(matched.id)),
        );
    }

    Ok(plan)
}

/// Releases the escrow hold of a cancelled shipment. Caller holds the lock.
pub fn plan_refund(
    state: &AppState,
    shipment: &Shipment,
    now: DateTime<Utc>,
) -> Result<LedgerPlan, AppError> {
    let mut plan = LedgerPlan::default();
    if !shipment.is_paid {
        return Ok(plan);
    }
    let Some(mut payment) = held_payment(state, shipment.id) else {
        return Ok(plan);
    };

    let mut wallet = wallet_snapshot(state, shipment.sender_id);
    wallet.release_hold(payment.amount, now)?;
    payment.status = TransactionStatus::Refunded;
    payment.completed_at = Some(now);

    let refund = Transaction::new(
        shipment.sender_id,
        TransactionType::Refund,
        payment.amount,
        TransactionStatus::Completed,
        "wallet",
        Decimal::ZERO,
        format!("Refund for cancelled shipment {}", shipment.tracking_number),
        now,
    )
    .for_shipment(shipment.id, payment.match_id);

    plan.wallets.push(wallet);
    plan.transactions.push(payment);
    plan.transactions.push(refund);
    Ok(plan)
}

pub fn notify_payment_received(state: &AppState, transaction: &Transaction) {
    notify(
        state,
        transaction.user_id,
        Channel::InApp,
        "payment_received",
        template_data([
            ("amount", transaction.amount.to_string()),
            ("reference", transaction.reference.clone()),
        ]),
        NotificationPriority::Normal,
    );
}
