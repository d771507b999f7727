//! # Configuración del Servidor
//! src/config.rs
//!
//! Este módulo define la configuración del servidor con soporte completo
//! para argumentos CLI y variables de entorno. Toda la configuración es
//! inmutable durante la vida del proceso.
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./tinyweb -p 9006 -l 1 -m 3 -o 0 -s 8 -t 8 -c 0 -a 1
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! TINYWEB_PORT=9006 TINYWEB_ROOT=./root ./tinyweb
//! ```

use clap::Parser;

/// Modo de disparo de epoll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrigMode {
    /// Level-triggered: epoll reporta mientras el fd siga listo
    Level,
    /// Edge-triggered: epoll reporta una vez por transición, hay que drenar
    Edge,
}

/// Modelo de concurrencia del pool de workers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorModel {
    /// Los workers hacen también el read/write del socket
    Proactor,
    /// El event loop hace el I/O; los workers solo procesan
    Reactor,
}

/// Forma de escribir el log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogWrite {
    Sync,
    Async,
}

/// Configuración del servidor HTTP/1.1
#[derive(Debug, Clone, Parser)]
#[command(name = "tinyweb")]
#[command(about = "Servidor HTTP/1.1 orientado a eventos para Principios de Sistemas Operativos")]
#[command(version = "0.1.0")]
pub struct Config {
    /// Puerto en el que escucha el servidor (0 = efímero)
    #[arg(short, long, default_value = "9006", env = "TINYWEB_PORT")]
    pub port: u16,

    /// Host/IP en el que escucha
    #[arg(long, default_value = "0.0.0.0", env = "TINYWEB_HOST")]
    pub host: String,

    /// Directorio raíz de los documentos servidos
    #[arg(short = 'r', long = "root", default_value = "./root", env = "TINYWEB_ROOT")]
    pub doc_root: String,

    // === Logging ===

    /// Escritura del log: 0 = síncrona, 1 = asíncrona
    #[arg(short = 'l', long = "log-write", default_value = "0", env = "TINYWEB_LOG_WRITE")]
    pub log_write: u8,

    /// Desactivar el log: 0 = log activo, 1 = sin log
    #[arg(short = 'c', long = "close-log", default_value = "0", env = "TINYWEB_CLOSE_LOG")]
    pub close_log: u8,

    /// Directorio donde se rotan los archivos de log
    #[arg(long = "log-dir", default_value = "./logs", env = "TINYWEB_LOG_DIR")]
    pub log_dir: String,

    // === Sockets ===

    /// SO_LINGER en el socket de escucha: 0 = no, 1 = sí
    #[arg(short = 'o', long = "opt-linger", default_value = "0", env = "TINYWEB_OPT_LINGER")]
    pub opt_linger: u8,

    /// Combinación de disparo (listen + conexión):
    /// 0 = LT+LT, 1 = LT+ET, 2 = ET+LT, 3 = ET+ET
    #[arg(short = 'm', long = "trig-mode", default_value = "0", env = "TINYWEB_TRIG_MODE")]
    pub trig_mode: u8,

    /// Máximo de conexiones vivas simultáneas
    #[arg(long = "max-connections", default_value = "65536", env = "TINYWEB_MAX_CONNECTIONS")]
    pub max_connections: usize,

    /// Intervalo de la alarma que barre conexiones inactivas (segundos)
    #[arg(long = "timeslot", default_value = "5", env = "TINYWEB_TIMESLOT")]
    pub timeslot_secs: u64,

    // === Workers ===

    /// Número de workers del pool
    #[arg(short = 't', long = "thread-num", default_value = "8", env = "TINYWEB_THREAD_NUM")]
    pub thread_num: usize,

    /// Capacidad máxima de la cola de tareas
    #[arg(long = "max-requests", default_value = "10000", env = "TINYWEB_MAX_REQUESTS")]
    pub max_requests: usize,

    /// Modelo de concurrencia: 0 = Proactor, 1 = Reactor
    #[arg(short = 'a', long = "actor-model", default_value = "0", env = "TINYWEB_ACTOR_MODEL")]
    pub actor_model: u8,

    // === Almacén de usuarios ===

    /// Tamaño del pool de conexiones al almacén de usuarios
    #[arg(short = 's', long = "sql-num", default_value = "8", env = "TINYWEB_SQL_NUM")]
    pub sql_num: usize,

    /// Archivo JSON del almacén de usuarios
    #[arg(long = "users-file", default_value = "./users.json", env = "TINYWEB_USERS_FILE")]
    pub users_file: String,
}

impl Config {
    /// Crea una nueva configuración parseando argumentos CLI
    pub fn new() -> Self {
        Config::parse()
    }

    /// Obtiene la dirección completa para bind (host:port)
    ///
    /// # Ejemplo
    /// ```rust
    /// use tinyweb::config::Config;
    ///
    /// let config = Config::default();
    /// assert_eq!(config.address(), "0.0.0.0:9006");
    /// ```
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Modo de disparo del socket de escucha
    pub fn listen_trig_mode(&self) -> TrigMode {
        if self.trig_mode >= 2 {
            TrigMode::Edge
        } else {
            TrigMode::Level
        }
    }

    /// Modo de disparo de los sockets de conexión
    pub fn conn_trig_mode(&self) -> TrigMode {
        if self.trig_mode % 2 == 1 {
            TrigMode::Edge
        } else {
            TrigMode::Level
        }
    }

    pub fn actor(&self) -> ActorModel {
        if self.actor_model == 1 {
            ActorModel::Reactor
        } else {
            ActorModel::Proactor
        }
    }

    pub fn log_mode(&self) -> LogWrite {
        if self.log_write == 1 {
            LogWrite::Async
        } else {
            LogWrite::Sync
        }
    }

    pub fn logging_enabled(&self) -> bool {
        self.close_log == 0
    }

    pub fn linger(&self) -> bool {
        self.opt_linger == 1
    }

    /// Valida la configuración
    ///
    /// Retorna errores si hay valores inválidos
    pub fn validate(&self) -> Result<(), String> {
        if self.thread_num == 0 {
            return Err("Worker threads must be >= 1".to_string());
        }
        if self.max_requests == 0 {
            return Err("Request queue capacity must be >= 1".to_string());
        }
        if self.sql_num == 0 {
            return Err("User store pool size must be >= 1".to_string());
        }
        if self.max_connections == 0 {
            return Err("Max connections must be >= 1".to_string());
        }
        if self.timeslot_secs == 0 {
            return Err("Timeslot must be > 0".to_string());
        }
        if self.trig_mode > 3 {
            return Err("Trigger mode must be 0-3".to_string());
        }
        if self.actor_model > 1 {
            return Err("Actor model must be 0 (proactor) or 1 (reactor)".to_string());
        }
        if self.log_write > 1 || self.close_log > 1 || self.opt_linger > 1 {
            return Err("Log write, close log and linger flags must be 0 or 1".to_string());
        }

        Ok(())
    }
}

impl Default for Config {
    /// Configuración por defecto
    fn default() -> Self {
        Self {
            port: 9006,
            host: "0.0.0.0".to_string(),
            doc_root: "./root".to_string(),
            log_write: 0,
            close_log: 0,
            log_dir: "./logs".to_string(),
            opt_linger: 0,
            trig_mode: 0,
            max_connections: 65536,
            timeslot_secs: 5,
            thread_num: 8,
            max_requests: 10000,
            actor_model: 0,
            sql_num: 8,
            users_file: "./users.json".to_string(),
        }
    }
}
