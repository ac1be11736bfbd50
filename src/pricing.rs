//! Pro-rated chunk pricing and retrieval quoting.
//!
//! A document carries one total price in asset base units. Each chunk is
//! stamped with `floor(total_price * chunk_chars / total_chars)` and the
//! rounding remainder is handed out one base unit at a time, left to right,
//! so the chunk prices always sum to the document total exactly. All
//! arithmetic is integer-only; currency never touches floating point after
//! the USD conversion at the indexing boundary.

use crate::error::{Error, Result};

/// Allocate a document's total price across its chunks by character share.
///
/// # Arguments
///
/// * `total_price` - Document price in asset base units
/// * `chars` - Ordered character counts, one per chunk
///
/// # Returns
///
/// One price per chunk, in the same order, summing to `total_price` exactly.
///
/// # Errors
///
/// Returns `InvalidPricingInput` when `total_price > 0` but there are no
/// characters to allocate it over.
pub fn allocate_chunk_prices(total_price: u64, chars: &[usize]) -> Result<Vec<u64>> {
    let total_chars: u128 = chars.iter().map(|c| *c as u128).sum();

    if total_price == 0 {
        return Ok(vec![0; chars.len()]);
    }

    if total_chars == 0 {
        return Err(Error::InvalidPricingInput(format!(
            "cannot allocate {total_price} base units over zero characters"
        )));
    }

    let mut prices: Vec<u64> = chars
        .iter()
        .map(|c| {
            // Fits in u64: result <= total_price.
            #[allow(clippy::cast_possible_truncation)]
            let price = (u128::from(total_price) * (*c as u128) / total_chars) as u64;
            price
        })
        .collect();

    let allocated: u64 = prices.iter().sum();
    let mut remainder = total_price - allocated;

    // remainder < chunk count, so a single left-to-right pass exhausts it.
    for price in &mut prices {
        if remainder == 0 {
            break;
        }
        *price += 1;
        remainder -= 1;
    }

    Ok(prices)
}

/// Sum the prices of the exact chunk set a retrieval is about to return.
///
/// An amount of zero means the request bypasses the payment protocol.
#[must_use]
pub fn quote_amount<'a, I>(prices: I) -> u64
where
    I: IntoIterator<Item = &'a u64>,
{
    prices.into_iter().sum()
}

/// Convert a USD price into asset base units.
///
/// This is the single place float currency enters the system; everything
/// downstream is integer base units.
///
/// # Errors
///
/// Returns `InvalidPricingInput` for negative or non-finite prices.
pub fn usd_to_base_units(price_usd: f64, asset_decimals: u8) -> Result<u64> {
    if !price_usd.is_finite() || price_usd < 0.0 {
        return Err(Error::InvalidPricingInput(format!(
            "price_usd must be a non-negative finite number, got {price_usd}"
        )));
    }
    let scaled = price_usd * 10f64.powi(i32::from(asset_decimals));
    if scaled > u64::MAX as f64 {
        return Err(Error::InvalidPricingInput(format!(
            "price_usd {price_usd} overflows base units at {asset_decimals} decimals"
        )));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(scaled.round() as u64)
}

/// Render a base-unit amount as a decimal asset amount for display.
#[must_use]
pub fn format_base_units(amount: u64, asset_decimals: u8) -> String {
    if asset_decimals == 0 {
        return amount.to_string();
    }
    let scale = 10u64.saturating_pow(u32::from(asset_decimals));
    format!(
        "{}.{:0width$}",
        amount / scale,
        amount % scale,
        width = usize::from(asset_decimals)
    )
}
