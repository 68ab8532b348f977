//! Reservation lifecycle state machine.
//!
//! ```text
//! Pending ──PaymentCaptured──► Confirmed ──WindowElapsed──► Completed
//!    │                            │
//!    │                            └──AdminDenied──► Denied (refund + notice)
//!    ├──PaymentFailed──► Cancelled
//!    ├──Withdrawn──► Cancelled (refund if a payment was initiated)
//!    └──GracePeriodElapsed──► Expired (refund if a payment was initiated)
//! ```
//!
//! [`transition`] is the single transition table. [`LifecycleReducer`] turns
//! commands into a validated transition on one reservation and describes the
//! side effects that follow it (refund, notifications). It never performs
//! I/O itself: the caller commits the new status with a conditional store
//! update and only then runs the effects.

use crate::error::BookingError;
use crate::notification::{Notification, NotificationSender};
use crate::payment_gateway::PaymentGateway;
use crate::types::{Money, PaymentReference, Reservation, ReservationStatus};
use adslot_core::{effect::Effect, environment::Clock, reducer::Reducer, smallvec, SmallVec};
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::Arc;

/// Something that happened to a reservation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// Payment provider captured the payment
    PaymentCaptured,
    /// Payment provider reported a failure
    PaymentFailed,
    /// Advertiser withdrew before paying
    Withdrawn,
    /// Unpaid past the grace period
    GracePeriodElapsed,
    /// Administrator denied the booking
    AdminDenied,
    /// Booked window is over
    WindowElapsed,
}

impl LifecycleEvent {
    /// Human readable operation name, used in errors and logs.
    #[must_use]
    pub const fn operation(self) -> &'static str {
        match self {
            Self::PaymentCaptured => "capture payment",
            Self::PaymentFailed => "fail payment",
            Self::Withdrawn => "withdraw",
            Self::GracePeriodElapsed => "expire",
            Self::AdminDenied => "deny",
            Self::WindowElapsed => "complete",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operation())
    }
}

/// The transition table: `None` means the event is not accepted in `from`.
#[must_use]
pub const fn transition(from: ReservationStatus, event: LifecycleEvent) -> Option<ReservationStatus> {
    use LifecycleEvent as E;
    use ReservationStatus as S;

    match (from, event) {
        (S::Pending, E::PaymentCaptured) => Some(S::Confirmed),
        (S::Pending, E::PaymentFailed | E::Withdrawn) => Some(S::Cancelled),
        (S::Pending, E::GracePeriodElapsed) => Some(S::Expired),
        (S::Confirmed, E::AdminDenied) => Some(S::Denied),
        (S::Confirmed, E::WindowElapsed) => Some(S::Completed),
        _ => None,
    }
}

/// A committed status change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    /// Status before
    pub from: ReservationStatus,
    /// Status after
    pub to: ReservationStatus,
    /// What caused it
    pub event: LifecycleEvent,
    /// When it happened
    pub at: DateTime<Utc>,
}

// ============================================================================
// Actions (Commands + Events)
// ============================================================================

/// Actions for the lifecycle reducer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleAction {
    // Commands
    /// Payment callback reported success
    CapturePayment {
        /// Reference the callback was keyed by
        payment_reference: PaymentReference,
    },
    /// Payment callback reported failure
    FailPayment {
        /// Reference the callback was keyed by
        payment_reference: PaymentReference,
        /// Provider's reason
        reason: String,
    },
    /// Advertiser withdraws an unpaid reservation, refunding any payment already initiated
    Withdraw,
    /// Sweeper expires an unpaid reservation
    Expire {
        /// How long an unpaid reservation may be held
        grace_period: Duration,
    },
    /// Administrator denies a confirmed booking
    Deny {
        /// Reason passed on to the advertiser
        reason: String,
    },
    /// Window over, the booking ran
    Complete,

    // Events
    /// Transition validated and applied to state
    TransitionApplied(Transition),
    /// Command rejected, state unchanged
    TransitionRejected(BookingError),
}

impl LifecycleAction {
    /// The lifecycle event a command would trigger, `None` for events.
    #[must_use]
    pub const fn event(&self) -> Option<LifecycleEvent> {
        match self {
            Self::CapturePayment { .. } => Some(LifecycleEvent::PaymentCaptured),
            Self::FailPayment { .. } => Some(LifecycleEvent::PaymentFailed),
            Self::Withdraw => Some(LifecycleEvent::Withdrawn),
            Self::Expire { .. } => Some(LifecycleEvent::GracePeriodElapsed),
            Self::Deny { .. } => Some(LifecycleEvent::AdminDenied),
            Self::Complete => Some(LifecycleEvent::WindowElapsed),
            Self::TransitionApplied(_) | Self::TransitionRejected(_) => None,
        }
    }
}

// ============================================================================
// State
// ============================================================================

/// One reservation under transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifecycleState {
    /// The reservation, updated in place
    pub reservation: Reservation,
    /// Last transition applied
    pub last_transition: Option<Transition>,
    /// Last rejection
    pub last_error: Option<BookingError>,
}

impl LifecycleState {
    /// Start from a loaded reservation.
    #[must_use]
    pub const fn new(reservation: Reservation) -> Self {
        Self {
            reservation,
            last_transition: None,
            last_error: None,
        }
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Dependencies of the lifecycle reducer
#[derive(Clone)]
pub struct LifecycleEnvironment {
    /// Time source for guards and timestamps
    pub clock: Arc<dyn Clock>,
    /// Refunds for denied, withdrawn and expired reservations
    pub payments: Arc<dyn PaymentGateway>,
    /// Proof-of-display and denial notices
    pub notifier: Arc<dyn NotificationSender>,
}

impl LifecycleEnvironment {
    /// Creates a new `LifecycleEnvironment`
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        payments: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            clock,
            payments,
            notifier,
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for a single reservation's lifecycle
#[derive(Clone, Copy, Debug, Default)]
pub struct LifecycleReducer;

impl LifecycleReducer {
    /// Creates a new `LifecycleReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Checks a command against the reservation and the clock.
    fn validate(
        reservation: &Reservation,
        action: &LifecycleAction,
        event: LifecycleEvent,
        now: DateTime<Utc>,
    ) -> Result<ReservationStatus, BookingError> {
        let to = transition(reservation.status, event).ok_or(
            BookingError::ReservationAlreadyProcessed {
                reservation_id: reservation.id,
                status: reservation.status,
                operation: event.operation(),
            },
        )?;

        match action {
            LifecycleAction::CapturePayment { payment_reference }
            | LifecycleAction::FailPayment {
                payment_reference, ..
            } if reservation.payment_reference.as_ref() != Some(payment_reference) => {
                Err(BookingError::PaymentReferenceNotFound(
                    payment_reference.to_string(),
                ))
            },
            LifecycleAction::Expire { grace_period } if now - reservation.created_at < *grace_period => {
                Err(BookingError::GracePeriodNotElapsed {
                    reservation_id: reservation.id,
                })
            },
            LifecycleAction::Deny { .. } if now >= reservation.window.start() => {
                Err(BookingError::DenialWindowClosed {
                    reservation_id: reservation.id,
                })
            },
            LifecycleAction::Complete if now < reservation.window.end() => {
                Err(BookingError::WindowStillOpen {
                    reservation_id: reservation.id,
                })
            },
            _ => Ok(to),
        }
    }

    /// Applies an event to state
    fn apply_event(state: &mut LifecycleState, action: &LifecycleAction) {
        match action {
            LifecycleAction::TransitionApplied(transition) => {
                state.reservation.status = transition.to;
                state.reservation.updated_at = transition.at;
                state.last_transition = Some(transition.clone());
                state.last_error = None;
            },
            LifecycleAction::TransitionRejected(error) => {
                state.last_error = Some(error.clone());
            },
            // Commands don't modify state
            LifecycleAction::CapturePayment { .. }
            | LifecycleAction::FailPayment { .. }
            | LifecycleAction::Withdraw
            | LifecycleAction::Expire { .. }
            | LifecycleAction::Deny { .. }
            | LifecycleAction::Complete => {},
        }
    }

    /// Side effects of a committed transition.
    fn effects_for(
        reservation: &Reservation,
        action: &LifecycleAction,
        env: &LifecycleEnvironment,
    ) -> SmallVec<[Effect<LifecycleAction>; 4]> {
        match action {
            LifecycleAction::Deny { reason } => {
                let mut effects: SmallVec<[Effect<LifecycleAction>; 4]> =
                    refund(env, reservation, "denied").into_iter().collect();
                effects.push(notify(
                    env,
                    Notification::BookingDenied {
                        advertiser_id: reservation.advertiser_id,
                        reservation_id: reservation.id,
                        refund: if reservation.payment_reference.is_some() {
                            reservation.price
                        } else {
                            Money::ZERO
                        },
                        reason: reason.clone(),
                    },
                ));
                effects
            },
            // A payment may be under way when an unpaid reservation is let go.
            LifecycleAction::Withdraw => refund(env, reservation, "withdrawn").into_iter().collect(),
            LifecycleAction::Expire { .. } => refund(env, reservation, "expired").into_iter().collect(),
            LifecycleAction::Complete => smallvec![notify(
                env,
                Notification::ProofOfDisplay {
                    advertiser_id: reservation.advertiser_id,
                    reservation_id: reservation.id,
                    display_id: reservation.display_id,
                    window: reservation.window,
                },
            )],
            _ => SmallVec::new(),
        }
    }
}

/// Returns the reservation's price under its payment reference, if it has one.
fn refund(
    env: &LifecycleEnvironment,
    reservation: &Reservation,
    reason: &'static str,
) -> Option<Effect<LifecycleAction>> {
    let reference = reservation.payment_reference.clone()?;
    let payments = Arc::clone(&env.payments);
    let amount = reservation.price;
    let reservation_id = reservation.id;
    Some(Effect::fire_and_forget(async move {
        match payments.refund(&reference, amount).await {
            Ok(refund_id) => {
                crate::metrics::record_refund(reason, amount);
                tracing::info!(%reservation_id, %reference, %refund_id, reason, "Refund issued");
            },
            Err(error) => {
                crate::metrics::record_refund_failed(reason);
                tracing::error!(%reservation_id, %reference, %error, reason, "Refund failed");
            },
        }
    }))
}

/// Fire-and-forget delivery; failures are logged and counted only.
fn notify(env: &LifecycleEnvironment, notification: Notification) -> Effect<LifecycleAction> {
    let notifier = Arc::clone(&env.notifier);
    Effect::fire_and_forget(async move {
        let kind = notification.kind();
        let recipient = notification.recipient();
        if let Err(error) = notifier.send(notification).await {
            metrics::counter!("adslot_notifications_failed_total", "kind" => kind).increment(1);
            tracing::warn!(kind, advertiser_id = %recipient, %error, "Notification failed");
        }
    })
}

impl Reducer for LifecycleReducer {
    type State = LifecycleState;
    type Action = LifecycleAction;
    type Environment = LifecycleEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let Some(event) = action.event() else {
            Self::apply_event(state, &action);
            return SmallVec::new();
        };

        let now = env.clock.now();
        match Self::validate(&state.reservation, &action, event, now) {
            Ok(to) => {
                let applied = LifecycleAction::TransitionApplied(Transition {
                    from: state.reservation.status,
                    to,
                    event,
                    at: now,
                });
                Self::apply_event(state, &applied);
                Self::effects_for(&state.reservation, &action, env)
            },
            Err(error) => {
                tracing::debug!(
                    reservation_id = %state.reservation.id,
                    status = %state.reservation.status,
                    %event,
                    %error,
                    "Transition rejected"
                );
                Self::apply_event(state, &LifecycleAction::TransitionRejected(error));
                SmallVec::new()
            },
        }
    }
}
