//! # Tareas de los Workers
//! src/server/task.rs
//!
//! Lo que un worker hace con una conexión depende del modelo de actores:
//!
//! ```text
//! Proactor:  NeedsRead  → read_once + process      NeedsWrite → write
//! Reactor:   (el event loop ya leyó)  → process
//! ```
//!
//! Al terminar, el worker re-arma el descriptor en epoll. Si la conexión
//! debe cerrarse la anota en `Shared` y despierta al event loop por el
//! wake pipe; el cierre siempre lo hace el event loop.

use crate::config::{ActorModel, TrigMode};
use crate::http::{HttpConn, Next, Token};
use crate::router::Router;
use crate::server::epoll::{Epoll, Interest};
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Qué necesita la conexión (solo se usa en Proactor)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    NeedsRead,
    NeedsWrite,
}

/// Una conexión en la cola del pool
pub struct Task {
    pub token: Token,
    pub conn: Arc<Mutex<HttpConn>>,
    pub state: TaskState,
}

/// Estado compartido entre el event loop y los workers
pub struct Shared {
    pub epoll: Epoll,
    pub router: Router,
    pub actor: ActorModel,
    pub conn_trig: TrigMode,

    /// Conexiones vivas
    live: AtomicUsize,

    /// Conexiones que los workers marcaron para cerrar
    flagged: Mutex<Vec<Token>>,

    /// Extremo de escritura del wake pipe
    waker: UnixStream,
}

impl Shared {
    pub fn new(
        epoll: Epoll,
        router: Router,
        actor: ActorModel,
        conn_trig: TrigMode,
        waker: UnixStream,
    ) -> Self {
        Self {
            epoll,
            router,
            actor,
            conn_trig,
            live: AtomicUsize::new(0),
            flagged: Mutex::new(Vec::new()),
            waker,
        }
    }

    pub fn live_connections(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub(crate) fn connection_opened(&self) {
        self.live.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn connection_closed(&self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }

    /// Marca una conexión para que el event loop la cierre
    pub fn flag_for_close(&self, token: Token) {
        self.flagged.lock().unwrap().push(token);
        // si el pipe está lleno ya hay un despertar pendiente
        let _ = (&self.waker).write(&[1u8]);
    }

    /// Saca las conexiones marcadas
    pub fn take_flagged(&self) -> Vec<Token> {
        std::mem::take(&mut *self.flagged.lock().unwrap())
    }

    /// Re-arma el descriptor según `next`
    ///
    /// Retorna `false` si la conexión debe cerrarse.
    pub fn rearm(&self, fd: std::os::unix::io::RawFd, token: Token, next: Next) -> bool {
        let interest = match next {
            Next::Read => Interest::Readable,
            Next::Write => Interest::Writable,
            Next::Close => return false,
        };

        match self.epoll.rearm(fd, token.0, interest, self.conn_trig) {
            Ok(()) => true,
            Err(e) => {
                warn!(token = %token, error = %e, "failed to re-arm connection");
                false
            }
        }
    }
}

/// Bloquea la conexión aunque otro thread haya entrado en pánico con ella
pub fn lock_conn(conn: &Mutex<HttpConn>) -> MutexGuard<'_, HttpConn> {
    conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handler del pool de workers
pub fn handle(shared: &Shared, task: Task) {
    let mut conn = lock_conn(&task.conn);

    let next = match (shared.actor, task.state) {
        (ActorModel::Proactor, TaskState::NeedsRead) => {
            if conn.read_once() {
                debug!(token = %conn.token(), peer = %conn.addr(), "deal with the client");
                conn.process(&shared.router)
            } else {
                Next::Close
            }
        }
        (ActorModel::Proactor, TaskState::NeedsWrite) => conn.write(),
        (ActorModel::Reactor, _) => conn.process(&shared.router),
    };

    let fd = conn.raw_fd();
    drop(conn);

    if !shared.rearm(fd, task.token, next) {
        shared.flag_for_close(task.token);
    }
}
