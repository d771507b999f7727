//! # Conexión HTTP
//! src/http/conn.rs
//!
//! Estado completo de un socket cliente: buffer de lectura con el parser,
//! buffer de escritura con la cabecera, archivo mapeado y contadores del
//! write vectorizado.
//!
//! ## Ciclo de una conexión
//!
//! ```text
//! read_once ──▶ process ──▶ NoRequest ──▶ re-armar lectura
//!                  │
//!                  └──▶ process_write ──▶ re-armar escritura ──▶ write
//!                                                                  │
//!                 keep-alive: reset + re-armar lectura ◀───────────┤
//!                 close / error: la conexión se cierra ◀───────────┘
//! ```
//!
//! La conexión no toca epoll: cada operación retorna `Next` y quien la
//! llamó re-arma el descriptor (o lo cierra).

use super::request::{HttpCode, RequestParser};
use super::response::ResponseBuffer;
use super::{MappedFile, StatusCode};
use crate::config::TrigMode;
use crate::router::Router;
use std::io::{self, IoSlice, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Cuerpo para archivos vacíos (no se pueden mapear)
pub const EMPTY_PAGE: &str = "<html><body></body></html>";

/// Identificador estable de una conexión dentro del servidor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub u64);

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Qué hacer con el descriptor después de una operación
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// Re-armar para lectura
    Read,
    /// Re-armar para escritura
    Write,
    /// Cerrar la conexión
    Close,
}

/// Una conexión cliente
pub struct HttpConn {
    stream: TcpStream,
    addr: SocketAddr,
    token: Token,
    trig_mode: TrigMode,

    parser: RequestParser,
    response: ResponseBuffer,

    /// Ruta real del último recurso resuelto
    real_file: PathBuf,
    file: Option<MappedFile>,

    bytes_to_send: usize,
    bytes_have_send: usize,
}

impl HttpConn {
    pub fn new(stream: TcpStream, addr: SocketAddr, token: Token, trig_mode: TrigMode) -> Self {
        Self {
            stream,
            addr,
            token,
            trig_mode,
            parser: RequestParser::new(),
            response: ResponseBuffer::new(),
            real_file: PathBuf::new(),
            file: None,
            bytes_to_send: 0,
            bytes_have_send: 0,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    pub fn parser(&self) -> &RequestParser {
        &self.parser
    }

    pub fn bytes_to_send(&self) -> usize {
        self.bytes_to_send
    }

    /// Estado inicial para el siguiente request de una conexión persistente
    pub fn reset(&mut self) {
        self.parser.reset();
        self.response.reset();
        self.real_file.clear();
        self.file = None;
        self.bytes_to_send = 0;
        self.bytes_have_send = 0;
    }

    /// Libera el mapeo y cierra el socket en ambas direcciones
    pub fn close(&mut self) {
        self.unmap();
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    fn unmap(&mut self) {
        self.file = None;
    }

    // === Lectura ===

    /// Lee del socket hacia el buffer del parser
    ///
    /// Level-triggered: una sola lectura. Edge-triggered: hasta que el
    /// socket reporte `WouldBlock` o el buffer se llene. Leer 0 bytes
    /// significa que el cliente cerró.
    pub fn read_once(&mut self) -> bool {
        if self.parser.is_full() {
            return false;
        }

        match self.trig_mode {
            TrigMode::Level => loop {
                match (&self.stream).read(self.parser.spare()) {
                    Ok(0) => return false,
                    Ok(n) => {
                        self.parser.commit(n);
                        return true;
                    }
                    // readiness espuria: nada que leer todavía
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return true,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        debug!(token = %self.token, error = %e, "read failed");
                        return false;
                    }
                }
            },
            TrigMode::Edge => loop {
                if self.parser.is_full() {
                    return true;
                }
                match (&self.stream).read(self.parser.spare()) {
                    Ok(0) => return false,
                    Ok(n) => self.parser.commit(n),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return true,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        debug!(token = %self.token, error = %e, "read failed");
                        return false;
                    }
                }
            },
        }
    }

    // === Procesamiento ===

    /// Parsea lo leído y, si el request está completo, arma la respuesta
    pub fn process(&mut self, router: &Router) -> Next {
        let code = match self.parser.process_read() {
            HttpCode::NoRequest => return Next::Read,
            HttpCode::GetRequest => {
                let resolution = router.do_request(self.parser.request());
                self.real_file = resolution.path;
                self.file = resolution.file;
                resolution.code
            }
            code => code,
        };

        debug!(
            token = %self.token,
            url = %self.parser.request().url,
            path = %self.real_file.display(),
            code = ?code,
            "request processed"
        );

        if self.process_write(code) {
            Next::Write
        } else {
            Next::Close
        }
    }

    /// Construye la respuesta para `code`
    ///
    /// Si la cabecera no cabe se degrada a 500; si tampoco cabe, retorna
    /// `false` y la conexión se cierra.
    pub fn process_write(&mut self, code: HttpCode) -> bool {
        self.response.reset();

        let built = match code {
            HttpCode::FileRequest => self.build_file(),
            HttpCode::BadRequest => {
                self.parser.clear_keep_alive();
                self.build_error(StatusCode::BadRequest)
            }
            HttpCode::NoResource => self.build_error(StatusCode::NotFound),
            HttpCode::ForbiddenRequest => self.build_error(StatusCode::Forbidden),
            HttpCode::InternalError => {
                self.parser.clear_keep_alive();
                self.build_error(StatusCode::InternalServerError)
            }
            _ => return false,
        };

        if !built {
            warn!(token = %self.token, code = ?code, "response head does not fit, sending 500");
            self.unmap();
            self.response.reset();
            self.parser.clear_keep_alive();
            if !self.build_error(StatusCode::InternalServerError) {
                return false;
            }
        }

        self.bytes_to_send = self.response.len() + self.file.as_ref().map_or(0, |f| f.len());
        self.bytes_have_send = 0;
        true
    }

    fn build_file(&mut self) -> bool {
        let keep_alive = self.parser.request().keep_alive;
        match self.file.as_ref().map(|f| f.len()) {
            Some(len) => {
                self.response.add_status_line(StatusCode::Ok)
                    && self.response.add_headers(len, keep_alive)
            }
            None => {
                self.response.add_status_line(StatusCode::Ok)
                    && self.response.add_headers(EMPTY_PAGE.len(), keep_alive)
                    && self.response.add_content(EMPTY_PAGE)
            }
        }
    }

    fn build_error(&mut self, status: StatusCode) -> bool {
        let keep_alive = self.parser.request().keep_alive;
        let body = status.error_body().unwrap_or("");
        self.response.add_status_line(status)
            && self.response.add_headers(body.len(), keep_alive)
            && self.response.add_content(body)
    }

    // === Escritura ===

    /// Envía la cabecera y el archivo mapeado con un write vectorizado
    ///
    /// Si el socket no acepta más bytes retorna `Next::Write` y la próxima
    /// llamada continúa desde los offsets guardados.
    pub fn write(&mut self) -> Next {
        if self.bytes_to_send == 0 {
            self.reset();
            return Next::Read;
        }

        loop {
            let result = {
                let header = self.response.as_bytes();
                let body = self.file.as_ref().map_or(&[][..], |f| f.as_slice());
                let sent = self.bytes_have_send;

                let (head, tail) = if sent >= header.len() {
                    (&[][..], &body[sent - header.len()..])
                } else {
                    (&header[sent..], body)
                };
                let slices = [IoSlice::new(head), IoSlice::new(tail)];
                (&self.stream).write_vectored(&slices)
            };

            match result {
                Ok(0) => {
                    self.unmap();
                    return Next::Close;
                }
                Ok(n) => {
                    self.bytes_have_send += n;
                    self.bytes_to_send = self.bytes_to_send.saturating_sub(n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Next::Write,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(token = %self.token, error = %e, "write failed");
                    self.unmap();
                    return Next::Close;
                }
            }

            if self.bytes_to_send == 0 {
                self.unmap();
                if self.parser.request().keep_alive {
                    self.reset();
                    return Next::Read;
                }
                return Next::Close;
            }
        }
    }
}
