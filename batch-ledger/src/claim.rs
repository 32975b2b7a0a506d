//! Pro-rata claim calculation
//!
//! An account's share is `floor(output_total * deposit_amount / supplied_total)`,
//! always computed from the batch's immutable totals. Claim order therefore
//! never changes what any account receives; rounding dust stays in the batch.

use crate::{
    math::Precision,
    types::{AccountClaim, Amount, Batch, BatchState},
    Error, Result,
};
use rust_decimal::Decimal;

/// Output the claim is entitled to right now
pub fn claimable_amount(batch: &Batch, claim: &AccountClaim, precision: Precision) -> Result<Amount> {
    if claim.batch_id != batch.id {
        return Err(Error::UnknownClaim {
            batch_id: batch.id,
            account: claim.account.to_string(),
        });
    }

    if batch.state != BatchState::Settled {
        return Err(Error::InvalidState {
            batch_id: batch.id,
            expected: BatchState::Settled,
            actual: batch.state,
        });
    }

    if claim.claimed {
        return Err(Error::AlreadyClaimed {
            batch_id: batch.id,
            account: claim.account.to_string(),
        });
    }

    if claim.deposit_amount.is_zero() {
        return Ok(Decimal::ZERO);
    }

    let output_total = batch.output_total.ok_or(Error::InvalidState {
        batch_id: batch.id,
        expected: BatchState::Settled,
        actual: batch.state,
    })?;

    precision.mul_div_floor(output_total, claim.deposit_amount, batch.supplied_total)
}

/// Mark a claim as paid; a second call fails without touching the record
pub fn mark_claimed(claim: &mut AccountClaim, amount: Amount) -> Result<()> {
    if claim.claimed {
        return Err(Error::AlreadyClaimed {
            batch_id: claim.batch_id,
            account: claim.account.to_string(),
        });
    }

    claim.claimed = true;
    claim.claimed_amount = Some(amount);
    Ok(())
}
