//! # Logging
//! src/logging.rs
//!
//! Inicializa `tracing` escribiendo a un archivo con rotación diaria
//! (`<log_dir>/server.log.YYYY-MM-DD`).
//!
//! - Modo síncrono: cada línea se escribe en el hilo que la emite.
//! - Modo asíncrono: las líneas pasan por una cola acotada y un hilo
//!   escritor dedicado (`tracing_appender::non_blocking`).
//!
//! El log nunca influye en el flujo de control del servidor.

use crate::config::{Config, LogWrite};
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Prefijo de los archivos de log
const LOG_PREFIX: &str = "server.log";

/// Máximo de líneas pendientes en modo asíncrono
const ASYNC_QUEUE_LINES: usize = 800;

/// Handle explícito del logger
///
/// Debe vivir tanto como el servidor: al soltarlo en modo asíncrono se
/// vacía la cola de líneas pendientes.
pub struct LogGuard {
    _worker: Option<WorkerGuard>,
}

impl LogGuard {
    /// Logger desactivado
    pub fn disabled() -> Self {
        Self { _worker: None }
    }
}

/// Construye el logger según la configuración
///
/// Si el log está desactivado (`--close-log 1`) no instala nada. Si ya había
/// un subscriber global (por ejemplo en tests), el nuevo se descarta.
pub fn init(config: &Config) -> LogGuard {
    if !config.logging_enabled() {
        return LogGuard::disabled();
    }

    let appender = match RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_PREFIX)
        .build(&config.log_dir)
    {
        Ok(appender) => appender,
        Err(e) => {
            // el servidor funciona igual sin log
            eprintln!("No se pudo abrir el log en {}: {}", config.log_dir, e);
            return LogGuard::disabled();
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match config.log_mode() {
        LogWrite::Sync => {
            install(appender, filter);
            LogGuard { _worker: None }
        }
        LogWrite::Async => {
            let (writer, guard) = NonBlockingBuilder::default()
                .buffered_lines_limit(ASYNC_QUEUE_LINES)
                .lossy(false)
                .finish(appender);
            install(writer, filter);
            LogGuard {
                _worker: Some(guard),
            }
        }
    }
}

fn install<W>(writer: W, filter: EnvFilter)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .with_thread_names(true)
        .try_init();
}
