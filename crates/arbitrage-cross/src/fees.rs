//! Withdrawal fees per exchange and asset.
//!
//! Fees are flat amounts of the withdrawn asset. The schedule is built once
//! at startup from the adapters' venue tables and consulted by the rotation
//! estimator whenever a spread alert fires.

use rust_decimal::Decimal;
use serde::Serialize;
use spreadwatch_core::{AssetId, ExchangeAdapter, ExchangeId, PairConfig, PairId};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::rotation::RotationError;

/// One row of the fee table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeEntry {
    pub exchange: ExchangeId,
    pub asset: AssetId,
    pub fee: Decimal,
}

/// Flat withdrawal fees keyed by `(exchange, asset)`.
#[derive(Debug, Clone, Default)]
pub struct FeeSchedule {
    fees: BTreeMap<(ExchangeId, AssetId), Decimal>,
}

impl FeeSchedule {
    /// Creates an empty schedule.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a fee.
    #[must_use]
    pub fn with_fee(mut self, exchange: ExchangeId, asset: impl Into<AssetId>, fee: Decimal) -> Self {
        self.insert(exchange, asset, fee);
        self
    }

    pub fn insert(&mut self, exchange: ExchangeId, asset: impl Into<AssetId>, fee: Decimal) {
        self.fees.insert((exchange, asset.into()), fee);
    }

    /// Collects the fee of every asset a configured pair needs from each
    /// adapter that quotes that pair.
    ///
    /// Assets the adapter has no fee for are left out; the estimator reports
    /// them as missing when a rotation actually needs them.
    #[must_use]
    pub fn from_adapters(adapters: &[Arc<dyn ExchangeAdapter>], pairs: &[PairConfig]) -> Self {
        let mut schedule = Self::new();
        for adapter in adapters {
            let exchange = adapter.id();
            let assets = pairs
                .iter()
                .filter(|pair| pair.exchanges.contains(&exchange))
                .filter_map(|pair| pair.symbol.split())
                .flat_map(|(base, quote)| [base, quote]);

            for asset in assets {
                if let Some(fee) = adapter.withdrawal_fee(&asset) {
                    schedule.insert(exchange, asset, fee);
                }
            }
        }
        schedule
    }

    #[must_use]
    pub fn fee(&self, exchange: ExchangeId, asset: &AssetId) -> Option<Decimal> {
        self.fees.get(&(exchange, asset.clone())).copied()
    }

    /// Fees charged by one rotation of `pair`: the quote asset leaves the
    /// high exchange and the base asset leaves the low exchange.
    ///
    /// Returns `(fee_high, fee_low)`.
    pub fn rotation_fees(
        &self,
        pair: &PairId,
        high: ExchangeId,
        low: ExchangeId,
    ) -> Result<(Decimal, Decimal), RotationError> {
        let (base, quote) = pair
            .split()
            .ok_or_else(|| RotationError::UndefinedSpread(pair.clone()))?;

        let fee_high = self
            .fee(high, &quote)
            .ok_or_else(|| RotationError::MissingFee {
                exchange: high,
                asset: quote.clone(),
            })?;
        let fee_low = self.fee(low, &base).ok_or(RotationError::MissingFee {
            exchange: low,
            asset: base,
        })?;

        Ok((fee_high, fee_low))
    }

    /// Every known fee, ordered by exchange then asset.
    #[must_use]
    pub fn entries(&self) -> Vec<FeeEntry> {
        self.fees
            .iter()
            .map(|((exchange, asset), fee)| FeeEntry {
                exchange: *exchange,
                asset: asset.clone(),
                fee: *fee,
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fees.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fees.is_empty()
    }
}
