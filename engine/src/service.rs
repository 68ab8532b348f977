//! Booking service: the operations the engine exposes.
//!
//! Wires the directory, the store, the [`ConflictArbiter`] and the
//! [`LifecycleReducer`] together. Every status change follows the same path:
//!
//! 1. load the reservation
//! 2. reduce the command against it (validation, next status, effects)
//! 3. commit with a conditional update guarded by the previous status
//! 4. only then hand the effects to the [`EffectRuntime`]
//!
//! A command that loses a race at step 3 leaves no trace besides a log line.

use crate::aggregator::CampaignAggregator;
use crate::arbiter::ConflictArbiter;
use crate::availability::AvailabilityChecker;
use crate::capacity::CapacityReport;
use crate::config::BookingConfig;
use crate::directory::DisplayDirectory;
use crate::error::{BookingError, Result};
use crate::lifecycle::{LifecycleAction, LifecycleEnvironment, LifecycleReducer, LifecycleState};
use crate::notification::NotificationSender;
use crate::payment_gateway::PaymentGateway;
use crate::store::{ReservationStore, StoreError};
use crate::types::{
    BookingWindow, Display, DisplayId, Money, PaymentReference, Reservation, ReservationId,
    ReservationRequest, ReservationStatus,
};
use adslot_core::environment::Clock;
use adslot_core::reducer::Reducer;
use adslot_runtime::EffectRuntime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result reported by the payment provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    /// Funds captured
    Succeeded,
    /// Payment failed
    Failed {
        /// Provider's reason
        reason: String,
    },
}

/// Asynchronous payment callback, keyed by payment reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCallback {
    /// Reference returned by the authorization
    pub payment_reference: PaymentReference,
    /// What happened
    #[serde(flatten)]
    pub outcome: PaymentOutcome,
}

/// How a payment callback was handled. Both variants are a success for the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The callback moved the reservation
    Applied(Reservation),
    /// The reservation had already left Pending; nothing changed
    AlreadyProcessed(Reservation),
}

impl CallbackOutcome {
    /// The reservation as it stands after the callback.
    #[must_use]
    pub const fn reservation(&self) -> &Reservation {
        match self {
            Self::Applied(reservation) | Self::AlreadyProcessed(reservation) => reservation,
        }
    }
}

/// Collaborators of a [`BookingService`].
#[derive(Clone)]
pub struct BookingDependencies {
    /// Reservation persistence
    pub store: Arc<dyn ReservationStore>,
    /// Display lookup
    pub directory: Arc<dyn DisplayDirectory>,
    /// Payment provider
    pub payments: Arc<dyn PaymentGateway>,
    /// Outbound notifications
    pub notifier: Arc<dyn NotificationSender>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

struct Inner {
    store: Arc<dyn ReservationStore>,
    directory: Arc<dyn DisplayDirectory>,
    arbiter: ConflictArbiter,
    checker: AvailabilityChecker,
    reducer: LifecycleReducer,
    env: LifecycleEnvironment,
    effects: EffectRuntime,
    aggregator: CampaignAggregator,
    grace_period: chrono::Duration,
}

/// Entry point for every booking operation. Cheap to clone.
#[derive(Clone)]
pub struct BookingService {
    inner: Arc<Inner>,
}

impl BookingService {
    /// Build a service from its collaborators and booking settings.
    #[must_use]
    pub fn new(deps: BookingDependencies, config: &BookingConfig) -> Self {
        let checker = AvailabilityChecker::new(config.capacity_policy);
        let arbiter = ConflictArbiter::new(
            Arc::clone(&deps.store),
            checker,
            config.retry_policy(),
            Arc::clone(&deps.clock),
        );
        let aggregator = CampaignAggregator::new(Arc::clone(&deps.store), Arc::clone(&deps.clock));
        let env = LifecycleEnvironment::new(deps.clock, deps.payments, deps.notifier);

        Self {
            inner: Arc::new(Inner {
                store: deps.store,
                directory: deps.directory,
                arbiter,
                checker,
                reducer: LifecycleReducer::new(),
                env,
                effects: EffectRuntime::new(),
                aggregator,
                grace_period: config.grace_period(),
            }),
        }
    }

    /// Read-side reporting over the same store
    #[must_use]
    pub fn aggregator(&self) -> &CampaignAggregator {
        &self.inner.aggregator
    }

    /// Runtime executing post-commit effects
    #[must_use]
    pub fn effects(&self) -> &EffectRuntime {
        &self.inner.effects
    }

    /// Underlying reservation store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ReservationStore> {
        &self.inner.store
    }

    /// Time source shared with the lifecycle reducer
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.env.clock
    }

    /// Grace period granted to unpaid reservations
    #[must_use]
    pub fn grace_period(&self) -> chrono::Duration {
        self.inner.grace_period
    }

    /// The admission arbiter
    #[must_use]
    pub fn arbiter(&self) -> &ConflictArbiter {
        &self.inner.arbiter
    }

    async fn display(&self, display_id: DisplayId) -> Result<Display> {
        self.inner
            .directory
            .get(display_id)
            .await?
            .ok_or(BookingError::DisplayNotFound(display_id))
    }

    async fn load(&self, id: ReservationId) -> Result<Reservation> {
        self.inner
            .store
            .get(id)
            .await?
            .ok_or(BookingError::ReservationNotFound(id))
    }

    /// Admit a new Pending reservation.
    ///
    /// # Errors
    ///
    /// [`BookingError::DisplayNotFound`] for an unknown display, plus every
    /// admission error of [`ConflictArbiter::try_reserve`].
    #[tracing::instrument(skip(self, request), fields(display_id = %request.display_id))]
    pub async fn create_reservation(&self, request: ReservationRequest) -> Result<Reservation> {
        let display = self.display(request.display_id).await?;
        self.inner.arbiter.try_reserve(&display, request).await
    }

    /// Load one reservation.
    ///
    /// # Errors
    ///
    /// [`BookingError::ReservationNotFound`] if it does not exist.
    pub async fn get_reservation(&self, id: ReservationId) -> Result<Reservation> {
        self.load(id).await
    }

    /// Every reservation of a display, in any status, oldest first.
    ///
    /// # Errors
    ///
    /// [`BookingError::DisplayNotFound`] for an unknown display.
    pub async fn list_reservations(&self, display_id: DisplayId) -> Result<Vec<Reservation>> {
        self.display(display_id).await?;
        Ok(self.inner.store.list_for_display(display_id).await?)
    }

    /// Capacity usage of a display over `window`.
    ///
    /// # Errors
    ///
    /// [`BookingError::DisplayNotFound`] for an unknown display.
    pub async fn capacity(&self, display_id: DisplayId, window: BookingWindow) -> Result<CapacityReport> {
        let display = self.display(display_id).await?;
        self.inner
            .checker
            .capacity_report(self.inner.store.as_ref(), &display, window)
            .await
    }

    /// Authorize the price of a Pending reservation and record the reference.
    ///
    /// The provider is called outside any lock. If two initiations race, the
    /// conditional update lets exactly one reference stick and every losing
    /// authorization is refunded before its caller gets the error.
    ///
    /// # Errors
    ///
    /// - [`BookingError::ReservationAlreadyProcessed`] unless Pending
    /// - [`BookingError::DuplicatePayment`] if a reference is already recorded
    /// - [`BookingError::PaymentGateway`] if the provider refuses
    #[tracing::instrument(skip(self))]
    pub async fn initiate_payment(&self, id: ReservationId) -> Result<Reservation> {
        let reservation = self.load(id).await?;
        if reservation.status != ReservationStatus::Pending {
            return Err(BookingError::ReservationAlreadyProcessed {
                reservation_id: id,
                status: reservation.status,
                operation: "initiate payment",
            });
        }
        if reservation.payment_reference.is_some() {
            return Err(BookingError::DuplicatePayment { reservation_id: id });
        }

        let reference = self
            .inner
            .env
            .payments
            .authorize(id, reservation.price)
            .await
            .map_err(|error| BookingError::PaymentGateway(error.to_string()))?;

        let now = self.inner.env.clock.now();
        match self
            .inner
            .store
            .attach_payment_reference(id, reference.clone(), now)
            .await
        {
            Ok(updated) => {
                tracing::info!(reservation_id = %id, %reference, price = %updated.price, "Payment initiated");
                Ok(updated)
            },
            Err(StoreError::PaymentReferenceTaken(reservation_id)) => {
                tracing::warn!(%reservation_id, %reference, "Payment already initiated");
                self.release_authorization(reservation_id, &reference, reservation.price).await;
                Err(BookingError::DuplicatePayment { reservation_id })
            },
            Err(StoreError::StatusMismatch { id, actual, .. }) => {
                tracing::warn!(
                    reservation_id = %id,
                    status = %actual,
                    %reference,
                    "Reservation left Pending during authorization"
                );
                self.release_authorization(id, &reference, reservation.price).await;
                Err(BookingError::ReservationAlreadyProcessed {
                    reservation_id: id,
                    status: actual,
                    operation: "initiate payment",
                })
            },
            Err(error) => Err(error.into()),
        }
    }

    /// Refund an authorization whose reference never got recorded.
    async fn release_authorization(&self, id: ReservationId, reference: &PaymentReference, amount: Money) {
        match self.inner.env.payments.refund(reference, amount).await {
            Ok(refund_id) => {
                crate::metrics::record_refund("superseded", amount);
                tracing::info!(reservation_id = %id, %reference, %refund_id, "Superseded authorization refunded");
            },
            Err(error) => {
                crate::metrics::record_refund_failed("superseded");
                tracing::error!(reservation_id = %id, %reference, %error, "Superseded authorization refund failed");
            },
        }
    }

    /// Feed a payment provider callback into the state machine.
    ///
    /// Replays and callbacks that lose a race (for example against the
    /// sweeper) are acknowledged as [`CallbackOutcome::AlreadyProcessed`].
    ///
    /// # Errors
    ///
    /// [`BookingError::PaymentReferenceNotFound`] if no reservation carries the reference.
    #[tracing::instrument(skip(self, callback), fields(payment_reference = %callback.payment_reference))]
    pub async fn apply_payment_callback(&self, callback: PaymentCallback) -> Result<CallbackOutcome> {
        let reservation = self
            .inner
            .store
            .find_by_payment_reference(callback.payment_reference.clone())
            .await?
            .ok_or_else(|| BookingError::PaymentReferenceNotFound(callback.payment_reference.to_string()))?;

        let action = match callback.outcome {
            PaymentOutcome::Succeeded => LifecycleAction::CapturePayment {
                payment_reference: callback.payment_reference,
            },
            PaymentOutcome::Failed { reason } => LifecycleAction::FailPayment {
                payment_reference: callback.payment_reference,
                reason,
            },
        };

        match self.apply(reservation, action).await {
            Ok(updated) => Ok(CallbackOutcome::Applied(updated)),
            Err(BookingError::ReservationAlreadyProcessed {
                reservation_id,
                status,
                operation,
            }) => {
                crate::metrics::record_transition_dropped(operation);
                tracing::info!(%reservation_id, %status, operation, "Duplicate payment callback ignored");
                let current = self.load(reservation_id).await?;
                Ok(CallbackOutcome::AlreadyProcessed(current))
            },
            Err(error) => Err(error),
        }
    }

    /// Advertiser withdraws an unpaid reservation.
    ///
    /// If a payment was already initiated, its authorization is refunded
    /// once the cancellation commits; a late success callback is then
    /// acknowledged as already processed.
    ///
    /// # Errors
    ///
    /// [`BookingError::ReservationAlreadyProcessed`] unless Pending.
    #[tracing::instrument(skip(self))]
    pub async fn withdraw(&self, id: ReservationId) -> Result<Reservation> {
        let reservation = self.load(id).await?;
        self.apply(reservation, LifecycleAction::Withdraw).await
    }

    /// Administrator denies a confirmed booking before its window starts.
    ///
    /// Refund and denial notice run after the transition commits.
    ///
    /// # Errors
    ///
    /// - [`BookingError::ReservationAlreadyProcessed`] unless Confirmed
    /// - [`BookingError::DenialWindowClosed`] once the window has started
    #[tracing::instrument(skip(self, reason))]
    pub async fn deny(&self, id: ReservationId, reason: impl Into<String>) -> Result<Reservation> {
        let reservation = self.load(id).await?;
        self.apply(reservation, LifecycleAction::Deny { reason: reason.into() })
            .await
    }

    /// Expire an unpaid reservation past its grace period.
    ///
    /// # Errors
    ///
    /// - [`BookingError::ReservationAlreadyProcessed`] unless Pending
    /// - [`BookingError::GracePeriodNotElapsed`] if still within the grace period
    pub async fn expire(&self, id: ReservationId) -> Result<Reservation> {
        let reservation = self.load(id).await?;
        self.apply(
            reservation,
            LifecycleAction::Expire {
                grace_period: self.inner.grace_period,
            },
        )
        .await
    }

    /// Mark a confirmed booking as run once its window is over.
    ///
    /// # Errors
    ///
    /// - [`BookingError::ReservationAlreadyProcessed`] unless Confirmed
    /// - [`BookingError::WindowStillOpen`] before the window ends
    pub async fn complete(&self, id: ReservationId) -> Result<Reservation> {
        let reservation = self.load(id).await?;
        self.apply(reservation, LifecycleAction::Complete).await
    }

    /// Reduce `action` against `reservation`, commit, then run the effects.
    ///
    /// `reservation` is the caller's snapshot; the commit is guarded by its
    /// status, so a stale snapshot fails instead of overwriting.
    ///
    /// # Errors
    ///
    /// The reducer's rejection, or [`BookingError::ReservationAlreadyProcessed`]
    /// if another transition committed since the snapshot was taken.
    pub async fn apply(&self, reservation: Reservation, action: LifecycleAction) -> Result<Reservation> {
        let mut state = LifecycleState::new(reservation);
        let effects = self.inner.reducer.reduce(&mut state, action, &self.inner.env);

        if let Some(error) = state.last_error {
            return Err(error);
        }
        let Some(transition) = state.last_transition else {
            return Ok(state.reservation);
        };

        let committed = self
            .inner
            .store
            .transition(state.reservation.id, transition.from, transition.to, transition.at)
            .await
            .map_err(|error| match error {
                StoreError::StatusMismatch { id, actual, .. } => BookingError::ReservationAlreadyProcessed {
                    reservation_id: id,
                    status: actual,
                    operation: transition.event.operation(),
                },
                other => other.into(),
            })?;

        crate::metrics::record_transition(committed.status, committed.price);
        tracing::info!(
            reservation_id = %committed.id,
            from = %transition.from,
            to = %transition.to,
            event = %transition.event,
            "Reservation transitioned"
        );

        self.inner.effects.spawn(effects);
        Ok(committed)
    }
}
