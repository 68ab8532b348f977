//! Reservation allocation engine for display advertising slots.
//!
//! Decides whether a `[start, end)` window on a display may be granted,
//! guarantees that the ads running concurrently on a display never exceed its
//! loop capacity, and drives each booking through a payment-driven lifecycle.
//!
//! # Architecture
//!
//! ```text
//! request ─► pricing ─► ConflictArbiter ─┬─ per-display lock
//!                                        ├─ AvailabilityChecker (schedule, capacity)
//!                                        └─ store insert @ display version
//!
//! payment callback / withdraw / deny / sweeper
//!        └─► LifecycleReducer ─► conditional store update ─► effects (refund, notices)
//!
//! CampaignAggregator ─► read-only reports over the store
//! ```
//!
//! # Modules
//!
//! - [`types`], [`error`]: domain values and the error taxonomy
//! - [`pricing`], [`schedule`], [`capacity`], [`availability`]: admission rules
//! - [`arbiter`]: atomic admission under concurrency
//! - [`lifecycle`]: the reservation state machine as a reducer
//! - [`service`]: the operations callers use
//! - [`sweeper`], [`aggregator`]: background expiry and reporting
//! - [`store`], [`directory`], [`payment_gateway`], [`notification`]: collaborators
//! - [`api`], [`server`], [`app`], [`config`], [`metrics`]: HTTP surface and process wiring

#![forbid(unsafe_code)]

pub mod aggregator;
pub mod api;
pub mod app;
pub mod arbiter;
pub mod availability;
pub mod capacity;
pub mod config;
pub mod directory;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod notification;
pub mod payment_gateway;
pub mod pricing;
pub mod schedule;
pub mod server;
pub mod service;
pub mod store;
pub mod sweeper;
pub mod types;

pub use aggregator::{CampaignAggregator, RevenueReport};
pub use arbiter::{ConflictArbiter, DisplayLocks};
pub use availability::{Availability, AvailabilityChecker, RejectReason};
pub use capacity::{CapacityModel, CapacityPolicy, CapacityReport};
pub use config::Config;
pub use error::{BookingError, ErrorKind, Result};
pub use lifecycle::{LifecycleAction, LifecycleEvent, LifecycleReducer};
pub use pricing::compute_price;
pub use schedule::{AvailabilitySchedule, WeeklySlot};
pub use service::{BookingDependencies, BookingService, CallbackOutcome, PaymentCallback, PaymentOutcome};
pub use store::{InMemoryReservationStore, PostgresReservationStore, ReservationStore, StoreError};
pub use sweeper::{ExpirySweeper, SweepReport, SweeperConfig};
pub use types::{
    AdDuration, AdvertiserId, BookingWindow, CampaignId, Display, DisplayId, Money,
    PaymentReference, Reservation, ReservationId, ReservationRequest, ReservationStatus,
};
