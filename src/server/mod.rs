//! # Módulo del Servidor HTTP
//! src/server/mod.rs
//!
//! Event loop sobre epoll que:
//! 1. Acepta conexiones y las registra con un timer de inactividad
//! 2. Despacha lecturas y escrituras al pool de workers
//! 3. Recibe señales por un self-pipe (`SIGALRM`, `SIGTERM`)
//! 4. Cierra conexiones inactivas, con error o terminadas
//!
//! Dos modelos de concurrencia:
//! - **Proactor**: los workers hacen la lectura, el procesamiento y la
//!   escritura.
//! - **Reactor**: el event loop lee y escribe; los workers solo procesan.

pub mod epoll;
pub mod signals;
pub mod task;
pub mod webserver;

// Re-exportar para facilitar el uso
pub use webserver::{ServerHandle, WebServer};
