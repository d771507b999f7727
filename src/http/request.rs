//! # Parsing Incremental de Requests HTTP/1.1
//! src/http/request.rs
//!
//! Parser por máquina de estados que trabaja sobre un buffer de lectura de
//! tamaño fijo. Los bytes llegan en lecturas parciales; el parser recuerda
//! hasta dónde revisó y continúa en la siguiente llamada.
//!
//! ## Dos máquinas de estado
//!
//! ```text
//! Sub-máquina de líneas (parse_line):  LineOk | LineBad | LineOpen
//!
//! Máquina principal (process_read):
//!   RequestLine ──línea──▶ Header ──línea vacía──▶ Content (solo POST con body)
//!        │                   │                        │
//!        └──BadRequest       └──GetRequest            └──GetRequest
//! ```
//!
//! ## Índices del buffer
//!
//! ```text
//! 0        start_line     checked_idx        read_idx        READ_BUFFER_SIZE
//! |  ya parseado |  línea actual |  sin revisar  |    espacio libre   |
//! ```
//!
//! Invariantes: `start_line <= checked_idx <= read_idx <= READ_BUFFER_SIZE`.

use tracing::debug;

/// Tamaño del buffer de lectura de cada conexión
pub const READ_BUFFER_SIZE: usize = 2048;

/// Documento por defecto cuando el URL es `/`
pub const DEFAULT_DOCUMENT: &str = "/judge.html";

/// Métodos HTTP soportados
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// GET - Obtener un recurso
    #[default]
    GET,

    /// POST - Enviar un formulario (login / registro)
    POST,
}

impl Method {
    /// Parsea un método HTTP (sin distinguir mayúsculas)
    fn from_token(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("GET") {
            Some(Method::GET)
        } else if s.eq_ignore_ascii_case("POST") {
            Some(Method::POST)
        } else {
            None
        }
    }

    /// Convierte el método a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
        }
    }
}

/// Estado de la máquina principal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    RequestLine,
    Header,
    Content,
}

/// Resultado de la sub-máquina de líneas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStatus {
    /// Línea completa; el CRLF fue reemplazado por NULs
    Ok,
    /// Línea malformada o que nunca cabrá en el buffer
    Bad,
    /// Faltan bytes
    Open,
}

/// Resultado del procesamiento de un request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpCode {
    /// Request incompleto: seguir leyendo sin responder
    NoRequest,
    /// Request completo, listo para enrutar
    GetRequest,
    /// Error de sintaxis, o el recurso es un directorio
    BadRequest,
    /// El archivo no existe
    NoResource,
    /// El archivo no es legible por otros
    ForbiddenRequest,
    /// El archivo existe y quedó mapeado
    FileRequest,
    /// La respuesta no pudo construirse
    InternalError,
    /// La conexión fue cerrada
    ClosedConnection,
}

/// Campos decodificados de un request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub version: String,
    pub host: Option<String>,
    pub content_length: usize,
    /// `Connection: keep-alive`
    pub keep_alive: bool,
    /// POST: hay un formulario que leer antes de responder
    pub cgi: bool,
    /// Cuerpo del formulario (`user=...&password=...`)
    pub body: String,
}

/// Parser incremental con buffer propio
pub struct RequestParser {
    buf: Box<[u8]>,
    read_idx: usize,
    checked_idx: usize,
    start_line: usize,
    state: CheckState,
    request: Request,
}

impl RequestParser {
    /// Crea un parser vacío
    pub fn new() -> Self {
        Self {
            buf: vec![0u8; READ_BUFFER_SIZE].into_boxed_slice(),
            read_idx: 0,
            checked_idx: 0,
            start_line: 0,
            state: CheckState::RequestLine,
            request: Request::default(),
        }
    }

    /// Vuelve al estado inicial para el siguiente request de la conexión
    pub fn reset(&mut self) {
        self.buf.fill(0);
        self.read_idx = 0;
        self.checked_idx = 0;
        self.start_line = 0;
        self.state = CheckState::RequestLine;
        self.request = Request::default();
    }

    // === Buffer ===

    /// Espacio libre donde el socket puede escribir
    pub fn spare(&mut self) -> &mut [u8] {
        &mut self.buf[self.read_idx..]
    }

    /// Confirma `n` bytes recién escritos en `spare()`
    pub fn commit(&mut self, n: usize) {
        self.read_idx = (self.read_idx + n).min(self.buf.len());
    }

    /// Copia todos los bytes que quepan; retorna cuántos se copiaron
    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        let spare = self.spare();
        let n = bytes.len().min(spare.len());
        spare[..n].copy_from_slice(&bytes[..n]);
        self.commit(n);
        n
    }

    pub fn is_full(&self) -> bool {
        self.read_idx >= self.buf.len()
    }

    pub fn read_idx(&self) -> usize {
        self.read_idx
    }

    pub fn checked_idx(&self) -> usize {
        self.checked_idx
    }

    pub fn start_line(&self) -> usize {
        self.start_line
    }

    pub fn state(&self) -> CheckState {
        self.state
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Fuerza el cierre tras la respuesta (errores de protocolo)
    pub fn clear_keep_alive(&mut self) {
        self.request.keep_alive = false;
    }

    // === Sub-máquina de líneas ===

    /// Busca el siguiente CRLF a partir de `checked_idx`
    pub fn parse_line(&mut self) -> LineStatus {
        while self.checked_idx < self.read_idx {
            match self.buf[self.checked_idx] {
                b'\r' => {
                    if self.checked_idx + 1 == self.read_idx {
                        // el '\n' puede llegar en la próxima lectura
                        return self.open_or_bad();
                    }
                    if self.buf[self.checked_idx + 1] == b'\n' {
                        self.buf[self.checked_idx] = 0;
                        self.buf[self.checked_idx + 1] = 0;
                        self.checked_idx += 2;
                        return LineStatus::Ok;
                    }
                    return LineStatus::Bad;
                }
                b'\n' => return LineStatus::Bad,
                _ => self.checked_idx += 1,
            }
        }

        self.open_or_bad()
    }

    /// Sin terminador: abierta mientras quede espacio en el buffer
    fn open_or_bad(&self) -> LineStatus {
        if self.is_full() {
            LineStatus::Bad
        } else {
            LineStatus::Open
        }
    }

    /// Texto de la línea que empieza en `start_line` (hasta el primer NUL)
    fn current_line(&self) -> Option<String> {
        let rest = &self.buf[self.start_line..self.checked_idx];
        let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        std::str::from_utf8(&rest[..end]).ok().map(str::to_string)
    }

    // === Máquina principal ===

    /// Avanza el parseo con los bytes disponibles
    ///
    /// Retorna `NoRequest` si faltan bytes, `BadRequest` ante un error de
    /// sintaxis, o `GetRequest` cuando el request está completo.
    pub fn process_read(&mut self) -> HttpCode {
        loop {
            if self.state == CheckState::Content {
                // el cuerpo no es una línea: se mide desde checked_idx
                return self.parse_content();
            }

            match self.parse_line() {
                LineStatus::Ok => {}
                LineStatus::Bad => return HttpCode::BadRequest,
                LineStatus::Open => return HttpCode::NoRequest,
            }

            let text = match self.current_line() {
                Some(text) => text,
                None => return HttpCode::BadRequest,
            };
            self.start_line = self.checked_idx;

            let code = match self.state {
                CheckState::RequestLine => self.parse_request_line(&text),
                CheckState::Header => self.parse_headers(&text),
                CheckState::Content => HttpCode::NoRequest,
            };
            if code != HttpCode::NoRequest {
                return code;
            }
        }
    }

    /// Parsea `METHOD URL VERSION`
    fn parse_request_line(&mut self, text: &str) -> HttpCode {
        let mut parts = text
            .split(|c| c == ' ' || c == '\t')
            .filter(|part| !part.is_empty());

        let (method, url, version) = match (parts.next(), parts.next(), parts.next()) {
            (Some(method), Some(url), Some(version)) => (method, url, version),
            _ => return HttpCode::BadRequest,
        };
        if parts.next().is_some() {
            return HttpCode::BadRequest;
        }

        let method = match Method::from_token(method) {
            Some(method) => method,
            None => return HttpCode::BadRequest,
        };

        if !version.eq_ignore_ascii_case("HTTP/1.1") {
            return HttpCode::BadRequest;
        }

        let url = match strip_scheme(url) {
            Some(url) => url,
            None => return HttpCode::BadRequest,
        };
        if !url.starts_with('/') {
            return HttpCode::BadRequest;
        }

        self.request.method = method;
        self.request.cgi = method == Method::POST;
        self.request.url = if url == "/" {
            DEFAULT_DOCUMENT.to_string()
        } else {
            url.to_string()
        };
        self.request.version = version.to_string();
        self.state = CheckState::Header;

        HttpCode::NoRequest
    }

    /// Parsea una línea de header; la línea vacía cierra el bloque
    fn parse_headers(&mut self, text: &str) -> HttpCode {
        if text.is_empty() {
            if self.request.method == Method::POST && self.request.content_length > 0 {
                // los headers posteriores pudieron consumir el espacio
                if self.request.content_length > self.buf.len() - self.checked_idx {
                    return HttpCode::BadRequest;
                }
                self.state = CheckState::Content;
                return HttpCode::NoRequest;
            }
            return HttpCode::GetRequest;
        }

        let (name, value) = match text.split_once(':') {
            Some((name, value)) => (name.trim(), value.trim()),
            None => {
                debug!(header = text, "ignoring malformed header");
                return HttpCode::NoRequest;
            }
        };

        if name.eq_ignore_ascii_case("Connection") {
            if value.eq_ignore_ascii_case("keep-alive") {
                self.request.keep_alive = true;
            }
        } else if name.eq_ignore_ascii_case("Content-Length") {
            let length = match value.parse::<usize>() {
                Ok(length) => length,
                Err(_) => return HttpCode::BadRequest,
            };
            // un cuerpo que nunca cabrá en el buffer
            if length > self.buf.len() - self.checked_idx {
                return HttpCode::BadRequest;
            }
            self.request.content_length = length;
        } else if name.eq_ignore_ascii_case("Host") {
            self.request.host = Some(value.to_string());
        } else {
            debug!(header = text, "unknown header");
        }

        HttpCode::NoRequest
    }

    /// El cuerpo está completo cuando llegaron `content_length` bytes
    fn parse_content(&mut self) -> HttpCode {
        let length = self.request.content_length;
        if self.read_idx - self.checked_idx < length {
            if self.is_full() {
                return HttpCode::BadRequest;
            }
            return HttpCode::NoRequest;
        }

        let body = &self.buf[self.checked_idx..self.checked_idx + length];
        self.request.body = String::from_utf8_lossy(body).into_owned();
        self.checked_idx += length;
        self.start_line = self.checked_idx;

        HttpCode::GetRequest
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Quita `http://host` o `https://host`, dejando el path absoluto
///
/// Retorna `None` si hay esquema pero ningún `/` después del host.
fn strip_scheme(url: &str) -> Option<&str> {
    for scheme in ["http://", "https://"] {
        let matches = url
            .get(..scheme.len())
            .map_or(false, |prefix| prefix.eq_ignore_ascii_case(scheme));
        if matches {
            let rest = &url[scheme.len()..];
            return rest.find('/').map(|slash| &rest[slash..]);
        }
    }
    Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEEP_ALIVE_GET: &[u8] =
        b"GET / HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n";

    const LOGIN_POST: &[u8] = b"POST /2CGISQL.cgi HTTP/1.1\r\nHost: x\r\nContent-Length: 20\r\n\r\nuser=bob&password=hi";

    fn parse_all(raw: &[u8]) -> (HttpCode, RequestParser) {
        let mut parser = RequestParser::new();
        parser.feed(raw);
        let code = parser.process_read();
        (code, parser)
    }

    // ==================== parse_line ====================

    #[test]
    fn test_parse_line_ok_replaces_crlf() {
        let mut parser = RequestParser::new();
        parser.feed(b"abc\r\ndef");

        assert_eq!(parser.parse_line(), LineStatus::Ok);
        assert_eq!(parser.checked_idx(), 5);
        assert_eq!(&parser.buf[..5], b"abc\0\0");
    }

    #[test]
    fn test_parse_line_open_without_terminator() {
        let mut parser = RequestParser::new();
        parser.feed(b"GET / HTT");

        assert_eq!(parser.parse_line(), LineStatus::Open);
        assert_eq!(parser.checked_idx(), parser.read_idx());
    }

    #[test]
    fn test_parse_line_trailing_cr_is_open() {
        let mut parser = RequestParser::new();
        parser.feed(b"abc\r");

        assert_eq!(parser.parse_line(), LineStatus::Open);
        assert_eq!(parser.checked_idx(), 3);

        parser.feed(b"\n");
        assert_eq!(parser.parse_line(), LineStatus::Ok);
    }

    #[test]
    fn test_parse_line_bare_lf_is_bad() {
        let mut parser = RequestParser::new();
        parser.feed(b"abc\ndef");
        assert_eq!(parser.parse_line(), LineStatus::Bad);
    }

    #[test]
    fn test_parse_line_cr_without_lf_is_bad() {
        let mut parser = RequestParser::new();
        parser.feed(b"abc\rdef");
        assert_eq!(parser.parse_line(), LineStatus::Bad);
    }

    #[test]
    fn test_parse_line_never_passes_read_idx() {
        let inputs: [&[u8]; 6] = [b"", b"\r", b"\n", b"a\r\n", b"a\rb", b"aaaa"];
        for input in inputs {
            let mut parser = RequestParser::new();
            parser.feed(input);
            let _ = parser.parse_line();
            assert!(parser.checked_idx() <= parser.read_idx());
            assert!(parser.start_line() <= parser.checked_idx());
        }
    }

    #[test]
    fn test_long_line_stays_open_until_buffer_is_full() {
        let mut parser = RequestParser::new();
        parser.feed(&vec![b'a'; READ_BUFFER_SIZE - 1]);
        assert_eq!(parser.parse_line(), LineStatus::Open);

        parser.feed(b"a");
        assert!(parser.is_full());
        assert_eq!(parser.parse_line(), LineStatus::Bad);
    }

    // ==================== Request line ====================

    #[test]
    fn test_parse_keep_alive_get() {
        let (code, parser) = parse_all(KEEP_ALIVE_GET);

        assert_eq!(code, HttpCode::GetRequest);
        let request = parser.request();
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.url, DEFAULT_DOCUMENT);
        assert_eq!(request.version, "HTTP/1.1");
        assert_eq!(request.host.as_deref(), Some("x"));
        assert!(request.keep_alive);
        assert!(!request.cgi);
    }

    #[test]
    fn test_parse_strips_scheme_and_host() {
        let (code, parser) = parse_all(b"GET http://example.com/picture.html HTTP/1.1\r\n\r\n");
        assert_eq!(code, HttpCode::GetRequest);
        assert_eq!(parser.request().url, "/picture.html");

        let (code, parser) = parse_all(b"GET HTTPS://example.com/a/b HTTP/1.1\r\n\r\n");
        assert_eq!(code, HttpCode::GetRequest);
        assert_eq!(parser.request().url, "/a/b");
    }

    #[test]
    fn test_parse_scheme_without_path_is_bad() {
        let (code, _) = parse_all(b"GET http://example.com HTTP/1.1\r\n\r\n");
        assert_eq!(code, HttpCode::BadRequest);
    }

    #[test]
    fn test_parse_tabs_between_tokens() {
        let (code, parser) = parse_all(b"get\t/index.html \t HTTP/1.1\r\n\r\n");
        assert_eq!(code, HttpCode::GetRequest);
        assert_eq!(parser.request().url, "/index.html");
    }

    #[test]
    fn test_parse_rejects_bad_request_lines() {
        let cases: [&[u8]; 5] = [
            b"GET\r\n\r\n",
            b"GET /\r\n\r\n",
            b"PUT / HTTP/1.1\r\n\r\n",
            b"GET / HTTP/2.0\r\n\r\n",
            b"GET index.html HTTP/1.1\r\n\r\n",
        ];

        for raw in cases {
            let (code, _) = parse_all(raw);
            assert_eq!(code, HttpCode::BadRequest, "{:?}", String::from_utf8_lossy(raw));
        }
    }

    // ==================== Headers ====================

    #[test]
    fn test_header_names_are_case_insensitive() {
        let (code, parser) =
            parse_all(b"GET /a HTTP/1.1\r\nconnection: Keep-Alive\r\nHOST: y\r\n\r\n");
        assert_eq!(code, HttpCode::GetRequest);
        assert!(parser.request().keep_alive);
        assert_eq!(parser.request().host.as_deref(), Some("y"));
    }

    #[test]
    fn test_unknown_headers_are_ignored() {
        let (code, parser) =
            parse_all(b"GET /a HTTP/1.1\r\nUser-Agent: test\r\nNoColon\r\n\r\n");
        assert_eq!(code, HttpCode::GetRequest);
        assert!(!parser.request().keep_alive);
    }

    #[test]
    fn test_invalid_content_length() {
        for value in ["abc", "-1", "99999"] {
            let raw = format!("POST /a HTTP/1.1\r\nContent-Length: {}\r\n\r\n", value);
            let (code, _) = parse_all(raw.as_bytes());
            assert_eq!(code, HttpCode::BadRequest, "Content-Length: {}", value);
        }
    }

    #[test]
    fn test_missing_blank_line_needs_more_bytes() {
        let (code, parser) = parse_all(b"GET / HTTP/1.1\r\nHost: x\r\n");
        assert_eq!(code, HttpCode::NoRequest);
        assert_eq!(parser.state(), CheckState::Header);
    }

    // ==================== Body ====================

    #[test]
    fn test_post_body() {
        let (code, parser) = parse_all(LOGIN_POST);
        assert_eq!(code, HttpCode::GetRequest);
        assert!(parser.request().cgi);
        assert_eq!(parser.request().body, "user=bob&password=hi");
    }

    #[test]
    fn test_post_partial_body() {
        let mut parser = RequestParser::new();
        parser.feed(&LOGIN_POST[..LOGIN_POST.len() - 5]);
        assert_eq!(parser.process_read(), HttpCode::NoRequest);
        assert_eq!(parser.state(), CheckState::Content);

        parser.feed(&LOGIN_POST[LOGIN_POST.len() - 5..]);
        assert_eq!(parser.process_read(), HttpCode::GetRequest);
        assert_eq!(parser.request().body, "user=bob&password=hi");
    }

    #[test]
    fn test_body_that_no_longer_fits_after_headers() {
        // cabe al leer Content-Length, pero el header siguiente se come el espacio
        let head = format!(
            "POST /a HTTP/1.1\r\nContent-Length: 1900\r\nX-Pad: {}\r\n\r\n",
            "a".repeat(100)
        );
        let mut raw = head.into_bytes();
        raw.extend(std::iter::repeat(b'b').take(1900));

        let mut parser = RequestParser::new();
        let mut code = HttpCode::NoRequest;
        for piece in raw.chunks(256) {
            parser.feed(piece);
            code = parser.process_read();
            if code != HttpCode::NoRequest {
                break;
            }
        }
        assert_eq!(code, HttpCode::BadRequest);
        assert_ne!(parser.state(), CheckState::Content);
    }

    #[test]
    fn test_post_without_body_completes_at_headers() {
        let (code, parser) = parse_all(b"POST /a HTTP/1.1\r\nContent-Length: 0\r\n\r\n");
        assert_eq!(code, HttpCode::GetRequest);
        assert!(parser.request().body.is_empty());
    }

    // ==================== Incremental equivalence ====================

    fn parse_in_chunks(raw: &[u8], chunk: usize) -> (HttpCode, Request) {
        let mut parser = RequestParser::new();
        let mut code = HttpCode::NoRequest;
        for piece in raw.chunks(chunk) {
            parser.feed(piece);
            code = parser.process_read();
            if code != HttpCode::NoRequest {
                break;
            }
        }
        (code, parser.request().clone())
    }

    #[test]
    fn test_incremental_equivalence_any_chunk_size() {
        for raw in [KEEP_ALIVE_GET, LOGIN_POST] {
            let (expected_code, expected) = parse_in_chunks(raw, raw.len());
            assert_eq!(expected_code, HttpCode::GetRequest);

            for chunk in 1..raw.len() {
                let (code, request) = parse_in_chunks(raw, chunk);
                assert_eq!(code, expected_code, "chunk size {}", chunk);
                assert_eq!(request, expected, "chunk size {}", chunk);
            }
        }
    }

    #[test]
    fn test_incremental_equivalence_two_part_splits() {
        for raw in [KEEP_ALIVE_GET, LOGIN_POST] {
            let (_, expected) = parse_in_chunks(raw, raw.len());
            for split in 1..raw.len() {
                let mut parser = RequestParser::new();
                parser.feed(&raw[..split]);
                let first = parser.process_read();
                assert_eq!(first, HttpCode::NoRequest, "split at {}", split);
                parser.feed(&raw[split..]);
                assert_eq!(parser.process_read(), HttpCode::GetRequest, "split at {}", split);
                assert_eq!(parser.request(), &expected);
            }
        }
    }

    // ==================== Full buffer ====================

    #[test]
    fn test_full_buffer_without_crlf_is_bad_request() {
        let mut parser = RequestParser::new();
        let filled = parser.feed(&vec![b'A'; READ_BUFFER_SIZE]);
        assert_eq!(filled, READ_BUFFER_SIZE);
        assert_eq!(parser.process_read(), HttpCode::BadRequest);
    }

    #[test]
    fn test_reset_clears_state() {
        let (_, mut parser) = parse_all(KEEP_ALIVE_GET);
        parser.reset();

        assert_eq!(parser.read_idx(), 0);
        assert_eq!(parser.checked_idx(), 0);
        assert_eq!(parser.state(), CheckState::RequestLine);
        assert_eq!(parser.request(), &Request::default());
    }
}
