//! Authenticated exchange boundary for a later live mode.
//!
//! The paper engine never calls this; it exists so a live executor can
//! slot in behind the same seam without touching the simulation code.

use crate::error::EngineResult;
use async_trait::async_trait;
use polyarb_core::{Size, TokenId, TopOfBook};

/// Order-placement surface of the live exchange.
#[async_trait]
pub trait LiveExchange: Send + Sync {
    /// Current position size for a token.
    async fn get_position_size(&self, token_id: &TokenId) -> EngineResult<Size>;

    /// Market-sell a quantity of a token.
    async fn market_sell(&self, token_id: &TokenId, size: Size) -> EngineResult<()>;

    /// Authenticated top-of-book fetch.
    async fn get_order_book(&self, token_id: &TokenId) -> EngineResult<Option<TopOfBook>>;
}
