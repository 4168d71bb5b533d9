//! USDC / USDCx amount handling and vault quotes
//!
//! Both tokens use 6 decimals. Everything here runs before a transaction is
//! handed to a wallet, so failures are user-input errors and nothing is
//! retried.

use thiserror::Error;

pub const DECIMALS: u32 = 6;

/// 10^6, one whole token in base units
pub const UNIT: u128 = 1_000_000;

/// Flat part of the bridge fee estimate ($0.10)
pub const BRIDGE_FLAT_FEE: u128 = 100_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Invalid amount: {0:?}")]
    Invalid(String),

    #[error("Too many decimal places: at most 6 allowed")]
    TooPrecise,

    #[error("Amount must be greater than zero")]
    Zero,

    #[error("Insufficient balance: requested {requested}, available {available}")]
    Insufficient { requested: String, available: String },

    #[error("Amount too large")]
    Overflow,
}

/// Parse a decimal token amount into base units.
///
/// Accepts `"12"`, `"12.5"`, `".5"`; rejects signs, exponents and more than
/// six fractional digits.
pub fn parse_usdc(input: &str) -> Result<u128, AmountError> {
    let trimmed = input.trim();
    let invalid = || AmountError::Invalid(input.to_string());

    if trimmed.is_empty() {
        return Err(invalid());
    }

    let (whole, fraction) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }
    if fraction.len() > DECIMALS as usize {
        return Err(AmountError::TooPrecise);
    }

    let whole_units: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let fraction_units: u128 = if fraction.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", fraction, width = DECIMALS as usize);
        padded.parse().map_err(|_| invalid())?
    };

    whole_units
        .checked_mul(UNIT)
        .and_then(|w| w.checked_add(fraction_units))
        .ok_or_else(invalid)
}

/// Format base units as a decimal string with trailing zeros trimmed
pub fn format_usdc(amount: u128) -> String {
    let whole = amount / UNIT;
    let fraction = amount % UNIT;
    if fraction == 0 {
        return whole.to_string();
    }
    let digits = format!("{:06}", fraction);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

/// Reject zero amounts and amounts above the available balance
pub fn validate_amount(amount: u128, balance: u128) -> Result<(), AmountError> {
    if amount == 0 {
        return Err(AmountError::Zero);
    }
    if amount > balance {
        return Err(AmountError::Insufficient {
            requested: format_usdc(amount),
            available: format_usdc(balance),
        });
    }
    Ok(())
}

/// xReserve fee estimate: $0.10 flat plus 0.1% of the amount
pub fn estimate_bridge_fee(amount: u128) -> u128 {
    BRIDGE_FLAT_FEE + amount / 1000
}

/// `maxFee` passed to `depositToRemote`: the estimate plus 10%
pub fn max_fee_with_buffer(fee: u128) -> Result<u128, AmountError> {
    fee.checked_add(fee / 10).ok_or(AmountError::Overflow)
}

/// `amount * numerator / 100`
fn percent_of(amount: u128, numerator: u128) -> Result<u128, AmountError> {
    amount
        .checked_mul(numerator)
        .map(|scaled| scaled / 100)
        .ok_or(AmountError::Overflow)
}

/// Minimum shares accepted for a deposit (5% slippage)
pub fn min_shares_for_deposit(amount: u128) -> Result<u128, AmountError> {
    percent_of(amount, 95)
}

/// Shares and minimum payout for an instant withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawalPlan {
    pub shares: u128,
    pub min_amount: u128,
}

/// Convert a requested withdrawal amount into vault shares.
///
/// Share price is `vault_balance * 1e6 / vault_shares` (1.0 when either is
/// zero). The share count is capped at what the user holds; the minimum
/// payout allows 6% for the 1% withdrawal fee plus slippage.
pub fn plan_withdrawal(
    amount: u128,
    vault_balance: u128,
    vault_shares: u128,
) -> Result<WithdrawalPlan, AmountError> {
    let share_price = if vault_balance > 0 && vault_shares > 0 {
        vault_balance.checked_mul(UNIT).ok_or(AmountError::Overflow)? / vault_shares
    } else {
        UNIT
    };
    let share_price = share_price.max(1);

    let shares = amount.checked_mul(UNIT).ok_or(AmountError::Overflow)? / share_price;
    Ok(WithdrawalPlan {
        shares: shares.min(vault_shares),
        min_amount: percent_of(amount, 94)?,
    })
}

/// Format an APY given in basis points, e.g. 500 -> "5.00%"
pub fn format_apy(bps: u32) -> String {
    format!("{:.2}%", bps as f64 / 100.0)
}
