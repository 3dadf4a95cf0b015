//! GetPendingRefundsHandler - Admin queue of refunds not yet terminal.

use std::sync::Arc;

use crate::domain::payment::SettlementError;
use crate::domain::refund::Refund;
use crate::ports::RefundRepository;

pub struct GetPendingRefundsHandler {
    refunds: Arc<dyn RefundRepository>,
}

impl GetPendingRefundsHandler {
    pub fn new(refunds: Arc<dyn RefundRepository>) -> Self {
        Self { refunds }
    }

    /// Open refunds, oldest first.
    pub async fn handle(&self) -> Result<Vec<Refund>, SettlementError> {
        Ok(self.refunds.list_open().await?)
    }
}
