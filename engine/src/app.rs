//! Application lifecycle: build every component from [`Config`], serve HTTP,
//! run the sweeper, shut down gracefully.
//!
//! ```text
//! Application::build(config)
//!   ├─ store      memory | postgres (migrated)
//!   ├─ directory  DISPLAYS_FILE or empty
//!   ├─ service    arbiter + lifecycle reducer + effect runtime
//!   ├─ sweeper    background task, stopped via broadcast
//!   └─ router     axum, bound to HOST:PORT
//! ```

use crate::config::{Config, ConfigError, StoreBackend};
use crate::directory::{DisplayDirectory, InMemoryDisplayDirectory};
use crate::error::BookingError;
use crate::notification::LoggingNotificationSender;
use crate::payment_gateway::MockPaymentGateway;
use crate::server::{build_router, AppState};
use crate::service::{BookingDependencies, BookingService};
use crate::store::{InMemoryReservationStore, PostgresReservationStore, ReservationStore, StoreError};
use crate::sweeper::ExpirySweeper;
use adslot_core::environment::SystemClock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Application startup and runtime errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Store connection or migration failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Display directory could not be loaded
    #[error("Display directory error: {0}")]
    Directory(#[from] BookingError),

    /// Binding or serving failed
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the configured reservation store, migrating PostgreSQL.
///
/// # Errors
///
/// Returns [`AppError::Store`] if the database is unreachable or a migration fails.
pub async fn build_store(config: &Config) -> Result<Arc<dyn ReservationStore>, AppError> {
    match config.store.backend {
        StoreBackend::Memory => {
            warn!("Using the in-memory reservation store; reservations are lost on restart");
            Ok(Arc::new(InMemoryReservationStore::new()))
        },
        StoreBackend::Postgres => {
            let pg = &config.store.postgres;
            let store = PostgresReservationStore::connect(
                &pg.url,
                pg.max_connections,
                Duration::from_secs(pg.connect_timeout),
            )
            .await?;
            store.migrate().await?;
            info!(max_connections = pg.max_connections, "PostgreSQL reservation store ready");
            Ok(Arc::new(store))
        },
    }
}

/// Build the display directory, from `DISPLAYS_FILE` when set.
///
/// # Errors
///
/// Returns [`AppError::Directory`] if the file cannot be read or parsed.
pub fn build_directory(config: &Config) -> Result<Arc<dyn DisplayDirectory>, AppError> {
    let directory = match &config.server.displays_file {
        Some(path) => {
            let directory = InMemoryDisplayDirectory::from_json_file(path)?;
            info!(path = %path, displays = directory.len(), "Display directory loaded");
            directory
        },
        None => {
            warn!("DISPLAYS_FILE not set; display directory is empty");
            InMemoryDisplayDirectory::new()
        },
    };
    Ok(Arc::new(directory))
}

/// A fully wired, not yet running application.
pub struct Application {
    listener: tokio::net::TcpListener,
    service: BookingService,
    sweeper: ExpirySweeper,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_timeout: Duration,
}

impl Application {
    /// Build every component and bind the HTTP listener.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] if the store, directory or listener cannot be set up.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let store = build_store(&config).await?;
        let directory = build_directory(&config)?;

        let service = BookingService::new(
            BookingDependencies {
                store,
                directory,
                payments: MockPaymentGateway::shared(),
                notifier: Arc::new(LoggingNotificationSender),
                clock: Arc::new(SystemClock),
            },
            &config.booking,
        );
        let sweeper = ExpirySweeper::new(service.clone(), config.booking.sweeper());

        let address = format!("{}:{}", config.server.host, config.server.port);
        let listener = tokio::net::TcpListener::bind(&address).await?;
        info!(%address, "HTTP listener bound");

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            listener,
            service,
            sweeper,
            shutdown_tx,
            shutdown_timeout: Duration::from_secs(config.server.shutdown_timeout),
        })
    }

    /// Address the HTTP listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, AppError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until Ctrl+C or SIGTERM, then stop the sweeper and drain effects.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if the HTTP server fails.
    pub async fn run(self) -> Result<(), AppError> {
        let sweeper = self.sweeper.spawn(self.shutdown_tx.subscribe());
        let router = build_router(AppState::new(self.service.clone()));

        info!("HTTP server listening for requests");
        axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("HTTP server stopped, initiating graceful shutdown...");
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(self.shutdown_timeout, sweeper).await {
            Ok(Ok(())) => info!("Sweeper stopped gracefully"),
            Ok(Err(e)) => warn!(error = %e, "Sweeper task failed"),
            Err(_) => warn!("Sweeper shutdown timed out"),
        }

        if let Err(e) = self.service.effects().wait_idle(self.shutdown_timeout).await {
            warn!(error = %e, "Pending effects abandoned at shutdown");
        }

        info!("Graceful shutdown complete");
        Ok(())
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
    }
}
