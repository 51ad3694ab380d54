use std::io;
use std::thread;

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `RUST_LOG` overrides `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_thread_names(true)
        .init();
}

/// Spawn a named thread that inherits the current tracing dispatcher
pub fn spawn_thread<F, T>(name: impl Into<String>, f: F) -> io::Result<thread::JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let dispatch = tracing::dispatcher::get_default(|current| current.clone());
    thread::Builder::new()
        .name(name.into())
        .spawn(move || tracing::dispatcher::with_default(&dispatch, f))
}

/// Pin the calling thread to CPU core `core`. `false` if the core does not
/// exist or the OS refused.
pub fn pin_current_thread(core: usize) -> bool {
    let Some(cores) = core_affinity::get_core_ids() else {
        debug!("CPU core enumeration unsupported");
        return false;
    };

    match cores.into_iter().find(|id| id.id == core) {
        Some(id) => {
            let pinned = core_affinity::set_for_current(id);
            if pinned {
                info!(core, "Pinned thread to core");
            }
            pinned
        }
        None => false,
    }
}
