//! Exchange probe trait

use async_trait::async_trait;

use crate::types::ExchangeOutcome;

/// One side of the request/response check run inside each round
#[async_trait]
pub trait ExchangeProbe: Send {
    /// Perform a single try and classify the result
    async fn attempt(&mut self) -> ExchangeOutcome;
}
