//! Per-call state for the credential refresh cycle.
//!
//! A [`RetryContext`] lives exactly as long as one logical call. It allows a
//! single refresh-and-resend; after that, another refresh-worthy status is a
//! terminal failure.

use crate::error::RefreshUnavailableReason;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallState {
    Initial,
    Sent,
    Classified,
    Success,
    Failed,
    RefreshPending,
    Retried,
}

impl CallState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

#[derive(Clone, Debug)]
pub struct RetryContext {
    should_retry_on_fail: bool,
    attempt: u32,
    state: CallState,
}

impl RetryContext {
    pub fn new() -> Self {
        Self {
            should_retry_on_fail: true,
            attempt: 0,
            state: CallState::Initial,
        }
    }

    pub fn should_retry_on_fail(&self) -> bool {
        self.should_retry_on_fail
    }

    /// Number of attempts sent so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub(crate) fn mark_sent(&mut self) {
        self.attempt += 1;
        self.state = CallState::Sent;
    }

    pub(crate) fn mark_classified(&mut self) {
        self.state = CallState::Classified;
    }

    pub(crate) fn mark_success(&mut self) {
        self.state = CallState::Success;
    }

    pub(crate) fn mark_failed(&mut self) {
        self.state = CallState::Failed;
    }

    /// Claims the single refresh for this call and hands back the provider
    /// that should perform it.
    pub(crate) fn begin_refresh<'a, P>(
        &mut self,
        provider: Option<&'a P>,
    ) -> Result<&'a P, RefreshUnavailableReason>
    where
        P: ?Sized,
    {
        if !self.should_retry_on_fail {
            return Err(RefreshUnavailableReason::AlreadyRetried);
        }
        let provider = provider.ok_or(RefreshUnavailableReason::NoProvider)?;
        self.state = CallState::RefreshPending;
        Ok(provider)
    }

    /// Records a successful refresh; the resend that follows is the last one.
    pub(crate) fn mark_retried(&mut self) {
        self.should_retry_on_fail = false;
        self.state = CallState::Retried;
    }
}

impl Default for RetryContext {
    fn default() -> Self {
        Self::new()
    }
}
