//! # Errores del Servidor
//! src/error.rs
//!
//! Errores fatales de arranque. Los errores de protocolo y de recursos se
//! recuperan localmente convirtiéndolos en respuestas HTTP y nunca llegan aquí.

use std::fmt;
use std::io;

/// Errores que abortan el arranque del servidor
#[derive(Debug)]
pub enum ServerError {
    /// Fallo de socket, epoll, pipe o señales
    Io(io::Error),

    /// Configuración inválida
    Config(String),

    /// Pool de workers o de conexiones mal dimensionado
    Pool(String),

    /// El almacén de usuarios no se pudo cargar
    Storage(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Io(e) => write!(f, "I/O error: {}", e),
            ServerError::Config(msg) => write!(f, "Invalid configuration: {}", msg),
            ServerError::Pool(msg) => write!(f, "Pool error: {}", msg),
            ServerError::Storage(msg) => write!(f, "User store error: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ServerError {
    fn from(e: io::Error) -> Self {
        ServerError::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
