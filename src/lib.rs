//! # tinyweb
//! src/lib.rs
//!
//! Servidor HTTP/1.1 orientado a eventos implementado desde cero para
//! demostrar conceptos de sistemas operativos: notificación de readiness,
//! pools de threads, sincronización y manejo de recursos.
//!
//! ## Arquitectura
//!
//! El servidor está dividido en módulos especializados:
//! - `http`: Máquina de estados HTTP/1.1 de cada conexión
//! - `router`: Resolución de URLs a archivos y formularios de login
//! - `users`: Almacén de credenciales y su pool de handles
//! - `timer`: Lista ordenada de timers de inactividad
//! - `pool`: Pool de workers con cola acotada
//! - `server`: Event loop sobre epoll, señales y modelos Reactor/Proactor
//! - `config`, `logging`, `error`: configuración CLI, log y errores
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use tinyweb::config::Config;
//! use tinyweb::server::WebServer;
//!
//! let config = Config::default();
//! let mut server = WebServer::new(&config).expect("Error al iniciar servidor");
//! server.run().expect("Error en el event loop");
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod pool;
pub mod router;
pub mod server;
pub mod timer;
pub mod users;
