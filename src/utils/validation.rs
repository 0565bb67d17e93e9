//! Validation utilities for callers of the transfer engine
//!
//! The engine assumes its inputs were checked. These helpers perform the
//! checks a request layer runs before calling `Ledger::transfer_tx`.

use crate::types::*;

/// Currencies accepted for new accounts and transfers
pub const SUPPORTED_CURRENCIES: [&str; 3] = ["USD", "EUR", "CAD"];

/// Validate the shape of a transfer request
pub fn validate_transfer_params(params: &TransferTxParams) -> LedgerResult<()> {
    if params.from_account_id <= 0 || params.to_account_id <= 0 {
        return Err(LedgerError::Validation(
            "Account IDs must be positive".to_string(),
        ));
    }

    if params.from_account_id == params.to_account_id {
        return Err(LedgerError::Validation(
            "Source and destination accounts must differ".to_string(),
        ));
    }

    if params.amount <= 0 {
        return Err(LedgerError::Validation(
            "Amount must be positive".to_string(),
        ));
    }

    Ok(())
}

/// Validate that a currency code is supported
pub fn validate_currency(currency: &str) -> LedgerResult<()> {
    if SUPPORTED_CURRENCIES.contains(&currency) {
        Ok(())
    } else {
        Err(LedgerError::Validation(format!(
            "Unsupported currency: {}",
            currency
        )))
    }
}

/// Validate that an account is denominated in the requested currency
pub fn validate_account_currency(account: &Account, currency: &str) -> LedgerResult<()> {
    if account.currency != currency {
        return Err(LedgerError::Validation(format!(
            "Account [{}] currency mismatch: {} vs {}",
            account.id, account.currency, currency
        )));
    }
    Ok(())
}

/// Validate that both sides of a transfer use the requested currency
pub fn validate_same_currency(from: &Account, to: &Account, currency: &str) -> LedgerResult<()> {
    validate_currency(currency)?;
    validate_account_currency(from, currency)?;
    validate_account_currency(to, currency)
}

/// Validate an owner name for a new account
pub fn validate_owner(owner: &str) -> LedgerResult<()> {
    if owner.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Owner cannot be empty".to_string(),
        ));
    }

    if owner.len() > 100 {
        return Err(LedgerError::Validation(
            "Owner cannot exceed 100 characters".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_params() {
        assert!(validate_transfer_params(&TransferTxParams::new(1, 2, 10)).is_ok());
        assert!(validate_transfer_params(&TransferTxParams::new(1, 1, 10)).is_err());
        assert!(validate_transfer_params(&TransferTxParams::new(1, 2, 0)).is_err());
        assert!(validate_transfer_params(&TransferTxParams::new(0, 2, 5)).is_err());
    }

    #[test]
    fn test_currency_checks() {
        let usd = Account::new(1, "alice".into(), "USD".into(), 0);
        let eur = Account::new(2, "bob".into(), "EUR".into(), 0);

        assert!(validate_currency("CAD").is_ok());
        assert!(validate_currency("JPY").is_err());
        assert!(validate_same_currency(&usd, &usd, "USD").is_ok());

        let err = validate_same_currency(&usd, &eur, "USD").unwrap_err();
        assert!(err.to_string().contains("currency mismatch"));
    }

    #[test]
    fn test_owner() {
        assert!(validate_owner("alice").is_ok());
        assert!(validate_owner("   ").is_err());
        assert!(validate_owner(&"x".repeat(101)).is_err());
    }
}
