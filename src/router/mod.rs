//! # Sistema de Routing
//! src/router/mod.rs
//!
//! Traduce un request completo al recurso que se va a servir.
//!
//! ## Arquitectura
//!
//! ```text
//! Request → Route (marcador) → página destino → doc_root + página → HttpCode
//! ```
//!
//! La ruta lógica se elige por el primer carácter después del último `/`
//! de la URL:
//!
//! | marcador | ruta                         | página                  |
//! |----------|------------------------------|-------------------------|
//! | `0`      | formulario de registro       | `/register.html`        |
//! | `1`      | formulario de login          | `/log.html`             |
//! | `2`      | procesar login (POST)        | `/welcome.html` o `/logError.html` |
//! | `3`      | procesar registro (POST)     | `/log.html` o `/registerError.html` |
//! | `5`      | imágenes                     | `/picture.html`         |
//! | `6`      | video                        | `/video.html`           |
//! | `7`      | fans                         | `/fans.html`            |
//! | otro     | archivo estático             | la URL tal cual         |
//!
//! Los marcadores `2` y `3` solo aplican si el request trajo formulario
//! (`cgi`); un GET a esas rutas es una búsqueda estática normal.

use crate::http::{HttpCode, MappedFile, Request, DEFAULT_DOCUMENT};
use crate::users::ConnectionPool;
use std::fs::{self, File};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Bit de lectura para "otros" (`S_IROTH`)
const WORLD_READABLE: u32 = 0o004;

/// Ruta lógica seleccionada por el marcador de la URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    RegisterForm,
    LoginForm,
    Login,
    Register,
    Picture,
    Video,
    Fans,
    Static,
}

impl Route {
    /// Elige la ruta según el marcador y si hay formulario
    pub fn select(url: &str, cgi: bool) -> Self {
        let marker = url
            .rfind('/')
            .and_then(|slash| url[slash + 1..].chars().next());

        match marker {
            Some('0') => Route::RegisterForm,
            Some('1') => Route::LoginForm,
            Some('2') if cgi => Route::Login,
            Some('3') if cgi => Route::Register,
            Some('5') => Route::Picture,
            Some('6') => Route::Video,
            Some('7') => Route::Fans,
            _ => Route::Static,
        }
    }

    /// Página fija de la ruta (`None` para las que dependen del formulario)
    pub fn page(&self) -> Option<&'static str> {
        match self {
            Route::RegisterForm => Some("/register.html"),
            Route::LoginForm => Some("/log.html"),
            Route::Picture => Some("/picture.html"),
            Route::Video => Some("/video.html"),
            Route::Fans => Some("/fans.html"),
            Route::Login | Route::Register | Route::Static => None,
        }
    }
}

/// Credenciales extraídas de `user=<name>&password=<pw>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

/// Decodifica el cuerpo del formulario
///
/// Retorna `None` si falta alguno de los dos campos.
pub fn parse_form(body: &str) -> Option<Credentials> {
    let mut user = None;
    let mut password = None;

    for pair in body.split('&') {
        let (key, value) = match pair.split_once('=') {
            Some(kv) => kv,
            None => continue,
        };
        match key {
            "user" => user = Some(url_decode(value)),
            "password" => password = Some(url_decode(value)),
            _ => {}
        }
    }

    Some(Credentials {
        user: user?,
        password: password?,
    })
}

/// Decodifica `+` y `%XX` (application/x-www-form-urlencoded)
pub fn url_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Resultado de `do_request`
pub struct Resolution {
    pub code: HttpCode,
    /// Ruta real consultada en disco
    pub path: PathBuf,
    /// Archivo mapeado; `None` con `FileRequest` significa archivo vacío
    pub file: Option<MappedFile>,
}

impl Resolution {
    fn error(code: HttpCode, path: PathBuf) -> Self {
        Self {
            code,
            path,
            file: None,
        }
    }
}

/// Router de recursos estáticos y formularios
pub struct Router {
    doc_root: PathBuf,
    users: Arc<ConnectionPool>,
}

impl Router {
    pub fn new(doc_root: impl Into<PathBuf>, users: Arc<ConnectionPool>) -> Self {
        Self {
            doc_root: doc_root.into(),
            users,
        }
    }

    pub fn doc_root(&self) -> &Path {
        &self.doc_root
    }

    /// Resuelve un request completo a un `HttpCode` y, si aplica, al
    /// archivo mapeado que se va a enviar
    pub fn do_request(&self, request: &Request) -> Resolution {
        let route = Route::select(&request.url, request.cgi);

        let page = match route {
            Route::Login | Route::Register => self.handle_form(route, &request.body),
            Route::Static => request.url.clone(),
            fixed => fixed.page().unwrap_or(DEFAULT_DOCUMENT).to_string(),
        };

        self.resolve(&page)
    }

    /// Login o registro contra el almacén de usuarios
    ///
    /// Un handle del pool se toma solo durante la consulta.
    fn handle_form(&self, route: Route, body: &str) -> String {
        let credentials = parse_form(body);

        let page = match (route, credentials) {
            (Route::Login, Some(c)) => {
                let conn = self.users.get();
                if conn.verify(&c.user, &c.password) {
                    "/welcome.html"
                } else {
                    "/logError.html"
                }
            }
            (Route::Login, None) => "/logError.html",
            (_, Some(c)) => {
                let conn = self.users.get();
                match conn.register(&c.user, &c.password) {
                    Ok(true) => "/log.html",
                    Ok(false) => "/registerError.html",
                    Err(e) => {
                        warn!(user = %c.user, error = %e, "failed to persist new user");
                        "/registerError.html"
                    }
                }
            }
            (_, None) => "/registerError.html",
        };

        page.to_string()
    }

    /// `doc_root + page` → código de resolución y mapeo
    fn resolve(&self, page: &str) -> Resolution {
        let relative = page.trim_start_matches('/');
        let path = self.doc_root.join(relative);

        // No salir del doc_root
        if Path::new(relative)
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            debug!(path = %path.display(), "parent directory in url");
            return Resolution::error(HttpCode::BadRequest, path);
        }

        let metadata = match fs::metadata(&path) {
            Ok(m) => m,
            Err(_) => return Resolution::error(HttpCode::NoResource, path),
        };

        if metadata.is_dir() {
            return Resolution::error(HttpCode::BadRequest, path);
        }

        if metadata.permissions().mode() & WORLD_READABLE == 0 {
            return Resolution::error(HttpCode::ForbiddenRequest, path);
        }

        let len = metadata.len() as usize;
        if len == 0 {
            return Resolution {
                code: HttpCode::FileRequest,
                path,
                file: None,
            };
        }

        match Self::map(&path, len) {
            Ok(file) => Resolution {
                code: HttpCode::FileRequest,
                path,
                file: Some(file),
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to map file");
                let code = if e.kind() == io::ErrorKind::PermissionDenied {
                    HttpCode::ForbiddenRequest
                } else {
                    HttpCode::InternalError
                };
                Resolution::error(code, path)
            }
        }
    }

    fn map(path: &Path, len: usize) -> io::Result<MappedFile> {
        let file = File::open(path)?;
        MappedFile::map(&file, len)
    }
}
