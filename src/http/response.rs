//! # Construcción de Respuestas HTTP
//! src/http/response.rs
//!
//! Buffer de escritura de tamaño fijo donde se arma la cabecera de la
//! respuesta. El cuerpo de un archivo nunca se copia aquí: viaja como
//! segundo segmento del write vectorizado.
//!
//! ## Formato de una respuesta
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Content-Type: text/html\r\n
//! Content-Length: 1234\r\n
//! Connection: keep-alive\r\n
//! \r\n
//! <cuerpo: página de error inline o archivo mapeado>
//! ```
//!
//! Cada `add_*` retorna `false` si el texto no cabe; en ese caso el buffer
//! queda como estaba.

use super::StatusCode;
use std::fmt;
use std::io::Write;

/// Tamaño del buffer de escritura de cada conexión
pub const WRITE_BUFFER_SIZE: usize = 1024;

/// Buffer con la cabecera (y el cuerpo inline de los errores)
pub struct ResponseBuffer {
    buf: Box<[u8]>,
    write_idx: usize,
}

impl ResponseBuffer {
    /// Crea un buffer vacío de `WRITE_BUFFER_SIZE` bytes
    pub fn new() -> Self {
        Self::with_capacity(WRITE_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            write_idx: 0,
        }
    }

    /// Descarta lo escrito
    pub fn reset(&mut self) {
        self.write_idx = 0;
    }

    /// Bytes listos para enviar
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.write_idx]
    }

    pub fn len(&self) -> usize {
        self.write_idx
    }

    pub fn is_empty(&self) -> bool {
        self.write_idx == 0
    }

    /// Agrega texto formateado si cabe completo
    fn add_response(&mut self, args: fmt::Arguments<'_>) -> bool {
        let mut free = &mut self.buf[self.write_idx..];
        let before = free.len();
        if free.write_fmt(args).is_err() {
            return false;
        }
        self.write_idx += before - free.len();
        true
    }

    /// `HTTP/1.1 <code> <reason>`
    pub fn add_status_line(&mut self, status: StatusCode) -> bool {
        self.add_response(format_args!("HTTP/1.1 {}\r\n", status))
    }

    /// Bloque de headers completo, terminado en la línea vacía
    pub fn add_headers(&mut self, content_length: usize, keep_alive: bool) -> bool {
        self.add_content_type()
            && self.add_content_length(content_length)
            && self.add_linger(keep_alive)
            && self.add_blank_line()
    }

    pub fn add_content_type(&mut self) -> bool {
        self.add_response(format_args!("Content-Type: text/html\r\n"))
    }

    pub fn add_content_length(&mut self, content_length: usize) -> bool {
        self.add_response(format_args!("Content-Length: {}\r\n", content_length))
    }

    /// `Connection: keep-alive` o `Connection: close`
    pub fn add_linger(&mut self, keep_alive: bool) -> bool {
        let value = if keep_alive { "keep-alive" } else { "close" };
        self.add_response(format_args!("Connection: {}\r\n", value))
    }

    pub fn add_blank_line(&mut self) -> bool {
        self.add_response(format_args!("\r\n"))
    }

    pub fn add_content(&mut self, content: &str) -> bool {
        self.add_response(format_args!("{}", content))
    }
}

impl Default for ResponseBuffer {
    fn default() -> Self {
        Self::new()
    }
}
