//! Limited ad tracking, signalled by `device.lmt`.

use crate::openrtb::BidRequest;

use super::PolicyEnforcer;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LmtPolicy {
    pub signal_provided: bool,
    pub limit_tracking: bool,
}

impl LmtPolicy {
    #[must_use]
    pub fn read_from_request(request: &BidRequest) -> Self {
        let signal = request.device.as_ref().and_then(|device| device.lmt);
        Self {
            signal_provided: signal.is_some(),
            limit_tracking: signal == Some(1),
        }
    }
}

impl PolicyEnforcer for LmtPolicy {
    fn should_enforce(&self, _bidder: &str) -> bool {
        self.limit_tracking
    }
}
