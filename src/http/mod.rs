//! # Módulo HTTP
//! src/http/mod.rs
//!
//! Máquina de estados HTTP/1.1 de cada conexión, implementada desde cero
//! sobre buffers de tamaño fijo. Incluye:
//!
//! - Parsing incremental de requests (lecturas parciales)
//! - Construcción de la cabecera de la respuesta
//! - Archivos mapeados en memoria para el cuerpo
//! - Manejo de status codes
//!
//! ### Formato de Request
//!
//! ```text
//! POST /2CGISQL.cgi HTTP/1.1\r\n
//! Host: localhost:9006\r\n
//! Connection: keep-alive\r\n
//! Content-Length: 20\r\n
//! \r\n
//! user=bob&password=hi
//! ```
//!
//! Solo se soportan GET y POST. No hay chunked transfer encoding ni
//! pipelining: un request en vuelo por conexión.

pub mod conn;
pub mod file;
pub mod request;
pub mod response;
pub mod status;

// Re-exportamos los tipos principales para facilitar su uso
pub use conn::{HttpConn, Next, Token, EMPTY_PAGE};
pub use file::MappedFile;
pub use request::{
    CheckState, HttpCode, LineStatus, Method, Request, RequestParser, DEFAULT_DOCUMENT,
    READ_BUFFER_SIZE,
};
pub use response::{ResponseBuffer, WRITE_BUFFER_SIZE};
pub use status::StatusCode;
