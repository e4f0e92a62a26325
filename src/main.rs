//! aquamon: polls the pond controller's sensor feed and records threshold
//! notifications.
//!
//! Usage: `aquamon_service [CONFIG_PATH] [--once]`

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use aquamon_service::alert::Evaluator;
use aquamon_service::config::{DEFAULT_CONFIG_PATH, MonitorConfig, StoreBackend};
use aquamon_service::logging::{self, Component};
use aquamon_service::model::{Notification, StoreError};
use aquamon_service::monitor::Monitor;
use aquamon_service::store::{InMemoryStore, NotificationStore, PgNotificationStore};

fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let mut once = false;
    let mut config_path = PathBuf::from(DEFAULT_CONFIG_PATH);
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--once" => once = true,
            other => config_path = PathBuf::from(other),
        }
    }

    let config = match MonitorConfig::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("aquamon: {}", err);
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = logging::init_logger(
        config.logging.log_level(),
        config.logging.file.as_deref(),
        config.logging.timestamps,
    ) {
        eprintln!("aquamon: {}", err);
        return ExitCode::FAILURE;
    }

    let store = match open_store(&config) {
        Ok(store) => store,
        Err(err) => {
            logging::log_store_failure(None, "open notification store", &err);
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = store.subscribe(Box::new(report_unread)) {
        logging::log_store_failure(None, "subscribe", &err);
    }

    let evaluator = Evaluator::with_policy(store, config.alerts.policy());
    let monitor = match Monitor::new(&config.feed, evaluator) {
        Ok(monitor) => monitor,
        Err(err) => {
            logging::log_feed_failure("build HTTP client", &err);
            return ExitCode::FAILURE;
        }
    };

    if once {
        return match monitor.poll_once() {
            Ok(_) => ExitCode::SUCCESS,
            Err(_) => ExitCode::FAILURE,
        };
    }
    monitor.run()
}

fn open_store(config: &MonitorConfig) -> Result<Arc<dyn NotificationStore>, StoreError> {
    match config.store.backend {
        StoreBackend::Memory => {
            logging::info(Component::Store, None, "using in-memory notification store");
            Ok(Arc::new(InMemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let url = config.store.database_url.as_deref().unwrap_or_default();
            let store = PgNotificationStore::connect_and_verify(url)?;
            logging::info(Component::Store, None, "connected to postgres notification store");
            Ok(Arc::new(store))
        }
    }
}

fn report_unread(notifications: &[Notification]) {
    let unread = notifications.iter().filter(|n| !n.read).count();
    logging::info(
        Component::Store,
        None,
        &format!("{} notifications, {} unread", notifications.len(), unread),
    );
}
