use crate::error::ExchangeResult;
use crate::types::{AssetId, Credentials, ExchangeId, PairId, Quote};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Normalized access to one exchange.
///
/// Implementations differ only in endpoints, symbol tables, and signing; the
/// poll scheduler and the rotation estimator consume every venue through this
/// trait.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn id(&self) -> ExchangeId;

    /// Pairs this venue has a symbol for.
    fn supported_pairs(&self) -> Vec<PairId>;

    async fn fetch_quote(&self, pair: &PairId) -> ExchangeResult<Quote>;

    /// Flat fee charged to withdraw `asset`, from a static table.
    fn withdrawal_fee(&self, asset: &AssetId) -> Option<Decimal>;

    /// Non-zero balances for the account behind `credentials`.
    async fn fetch_balance(
        &self,
        credentials: &Credentials,
    ) -> ExchangeResult<BTreeMap<AssetId, Decimal>>;
}
