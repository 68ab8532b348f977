//! Payment provider abstraction.
//!
//! The engine only ever asks the provider for two things: authorize an
//! amount for a reservation (yielding the [`PaymentReference`] that later
//! callbacks are keyed by) and refund an amount it no longer owns: a denied
//! booking, a withdrawn or expired reservation that already had a payment
//! under way, or an authorization that lost a race to another one. Capture
//! itself happens out of band; its outcome comes back through the payment
//! callback.

use crate::types::{Money, PaymentReference, ReservationId};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Payment gateway result
pub type GatewayResult<T> = Result<T, PaymentGatewayError>;

/// Payment gateway error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentGatewayError {
    /// Provider declined the operation
    #[error("Payment declined: {reason}")]
    Declined {
        /// Decline reason
        reason: String,
    },
    /// Provider did not answer in time
    #[error("Gateway timeout")]
    Timeout,
    /// Other error
    #[error("Payment error: {message}")]
    Other {
        /// Error message
        message: String,
    },
}

/// Payment gateway trait
///
/// Abstraction over payment processors. Implementations must not block; the
/// engine never calls them while holding a display lock.
pub trait PaymentGateway: Send + Sync {
    /// Authorize `amount` for a reservation.
    ///
    /// # Errors
    ///
    /// Returns error if the provider refuses the authorization
    fn authorize(
        &self,
        reservation_id: ReservationId,
        amount: Money,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<PaymentReference>> + Send>>;

    /// Refund `amount` previously captured under `reference`.
    ///
    /// Returns the provider's refund id.
    ///
    /// # Errors
    ///
    /// Returns error if the refund fails
    fn refund(
        &self,
        reference: &PaymentReference,
        amount: Money,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<String>> + Send>>;
}

/// A call recorded by [`MockPaymentGateway`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayCall {
    /// `authorize` was called
    Authorize {
        /// Reservation being paid
        reservation_id: ReservationId,
        /// Amount authorized
        amount: Money,
        /// Reference handed out
        reference: PaymentReference,
    },
    /// `refund` was called
    Refund {
        /// Reference refunded
        reference: PaymentReference,
        /// Amount refunded
        amount: Money,
    },
}

/// Mock payment gateway for development and tests.
///
/// Succeeds unless told otherwise and records every call it receives.
#[derive(Clone, Debug, Default)]
pub struct MockPaymentGateway {
    calls: Arc<Mutex<Vec<GatewayCall>>>,
    decline_authorizations: Arc<AtomicBool>,
    fail_refunds: Arc<AtomicBool>,
    latency: Duration,
}

impl MockPaymentGateway {
    /// Creates a new mock payment gateway
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an Arc-wrapped instance for sharing
    #[must_use]
    pub fn shared() -> Arc<dyn PaymentGateway> {
        Arc::new(Self::new())
    }

    /// Simulate network latency on every call.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make subsequent authorizations fail.
    pub fn decline_authorizations(&self, decline: bool) {
        self.decline_authorizations.store(decline, Ordering::SeqCst);
    }

    /// Make subsequent refunds fail.
    pub fn fail_refunds(&self, fail: bool) {
        self.fail_refunds.store(fail, Ordering::SeqCst);
    }

    /// Calls received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// References handed out by successful authorizations, in order.
    #[must_use]
    pub fn authorizations(&self) -> Vec<PaymentReference> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::Authorize { reference, .. } => Some(reference),
                GatewayCall::Refund { .. } => None,
            })
            .collect()
    }

    /// Refunds received so far.
    #[must_use]
    pub fn refunds(&self) -> Vec<(PaymentReference, Money)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::Refund { reference, amount } => Some((reference, amount)),
                GatewayCall::Authorize { .. } => None,
            })
            .collect()
    }

    fn record(&self, call: GatewayCall) {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(call);
    }
}

impl PaymentGateway for MockPaymentGateway {
    fn authorize(
        &self,
        reservation_id: ReservationId,
        amount: Money,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<PaymentReference>> + Send>> {
        let gateway = self.clone();
        Box::pin(async move {
            if !gateway.latency.is_zero() {
                tokio::time::sleep(gateway.latency).await;
            }

            if gateway.decline_authorizations.load(Ordering::SeqCst) {
                return Err(PaymentGatewayError::Declined {
                    reason: "mock gateway configured to decline".to_string(),
                });
            }

            let reference = PaymentReference::new(format!("mock_pay_{}", uuid::Uuid::new_v4()));
            gateway.record(GatewayCall::Authorize {
                reservation_id,
                amount,
                reference: reference.clone(),
            });

            tracing::info!(
                reservation_id = %reservation_id,
                amount = amount.cents(),
                reference = %reference,
                "Mock payment authorized"
            );

            Ok(reference)
        })
    }

    fn refund(
        &self,
        reference: &PaymentReference,
        amount: Money,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<String>> + Send>> {
        let gateway = self.clone();
        let reference = reference.clone();
        Box::pin(async move {
            if !gateway.latency.is_zero() {
                tokio::time::sleep(gateway.latency).await;
            }

            if gateway.fail_refunds.load(Ordering::SeqCst) {
                return Err(PaymentGatewayError::Timeout);
            }

            let refund_id = format!("mock_refund_{}", uuid::Uuid::new_v4());
            gateway.record(GatewayCall::Refund {
                reference: reference.clone(),
                amount,
            });

            tracing::info!(
                reference = %reference,
                amount = amount.cents(),
                refund_id = %refund_id,
                "Mock refund processed"
            );

            Ok(refund_id)
        })
    }
}
