//! # Event Loop del Servidor
//! src/server/webserver.rs
//!
//! Un solo thread espera en epoll y coordina listener, conexiones, pool de
//! workers y timers de inactividad.
//!
//! ## Flujo por iteración
//!
//! ```text
//! epoll_wait
//!   ├─ listener      → accept (una vez en LT, hasta WouldBlock en ET)
//!   ├─ signal pipe   → SIGALRM: tick pendiente / SIGTERM: terminar
//!   ├─ wake pipe     → cerrar las conexiones marcadas por los workers
//!   ├─ RDHUP/HUP/ERR → cerrar la conexión
//!   └─ IN / OUT      → refrescar timer y despachar según el modelo
//! tick de timers (si llegó SIGALRM) y re-armar alarm(TIMESLOT)
//! ```
//!
//! Todo cierre pasa por `evict`: sacar de epoll, cerrar el socket, liberar
//! el mapeo, borrar el timer y decrementar el contador de conexiones.

use super::epoll::{self, flags, Epoll};
use super::signals::{self, Signal, SignalPipe, Trigger};
use super::task::{self, lock_conn, Shared, Task, TaskState};
use crate::config::{ActorModel, Config, TrigMode};
use crate::error::{Result, ServerError};
use crate::http::{HttpConn, Next, Token};
use crate::pool::ThreadPool;
use crate::router::Router;
use crate::timer::{self, ClientData, TimerId, TimerList};
use crate::users::{ConnectionPool, UserStore};
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Máximo de eventos por llamada a epoll_wait
const MAX_EVENT_NUMBER: usize = 10000;

const LISTENER: Token = Token(0);
const SIGNALS: Token = Token(1);
const WAKER: Token = Token(2);
const FIRST_CONN: u64 = 3;

/// Mensaje para clientes rechazados por exceso de conexiones
const BUSY_MESSAGE: &[u8] = b"Internal server busy";

/// Conexión registrada en el servidor
struct Client {
    conn: Arc<Mutex<HttpConn>>,
    timer: TimerId,
}

/// Servidor HTTP basado en eventos
pub struct WebServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    listen_trig: TrigMode,
    timeslot: Duration,
    max_connections: usize,

    shared: Arc<Shared>,
    pool: ThreadPool<Task>,
    signals: SignalPipe,
    wake_reader: UnixStream,

    clients: HashMap<Token, Client>,
    timers: TimerList,
    next_token: u64,
    stop: bool,
}

/// Handle para consultar o detener el servidor desde otro thread
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
    trigger: Arc<Trigger>,
}

impl ServerHandle {
    /// Pide al event loop que termine después de la iteración actual
    pub fn stop(&self) -> io::Result<()> {
        self.trigger.terminate()
    }

    pub fn live_connections(&self) -> usize {
        self.shared.live_connections()
    }
}

impl WebServer {
    /// Construye el servidor completo y registra sus descriptores
    pub fn new(config: &Config) -> Result<Self> {
        config.validate().map_err(ServerError::Config)?;

        let store = UserStore::open(&config.users_file)
            .map_err(|e| ServerError::Storage(format!("{}: {}", config.users_file, e)))?;
        let users = ConnectionPool::new(Arc::new(store), config.sql_num).map_err(ServerError::Pool)?;
        let pool_size = users.size();
        let router = Router::new(&config.doc_root, Arc::new(users));

        let listener = TcpListener::bind(config.address())?;
        listener.set_nonblocking(true)?;
        set_linger(&listener, config.linger())?;
        let local_addr = listener.local_addr()?;

        let epoll = Epoll::new()?;
        let signals = SignalPipe::new()?;
        let (wake_reader, waker) = UnixStream::pair()?;
        wake_reader.set_nonblocking(true)?;
        waker.set_nonblocking(true)?;

        let listen_trig = config.listen_trig_mode();
        epoll.add(listener.as_raw_fd(), LISTENER.0, listen_trig)?;
        epoll.add(signals.raw_fd(), SIGNALS.0, TrigMode::Level)?;
        epoll.add(wake_reader.as_raw_fd(), WAKER.0, TrigMode::Level)?;

        let shared = Arc::new(Shared::new(
            epoll,
            router,
            config.actor(),
            config.conn_trig_mode(),
            waker,
        ));

        let worker_shared = Arc::clone(&shared);
        let pool = ThreadPool::new(config.thread_num, config.max_requests, move |task| {
            task::handle(&worker_shared, task)
        })
        .map_err(ServerError::Pool)?;

        info!(
            addr = %local_addr,
            actor = ?config.actor(),
            listen_trig = ?listen_trig,
            conn_trig = ?config.conn_trig_mode(),
            workers = config.thread_num,
            doc_root = %shared.router.doc_root().display(),
            user_handles = pool_size,
            "server listening"
        );

        Ok(Self {
            listener,
            local_addr,
            listen_trig,
            timeslot: Duration::from_secs(config.timeslot_secs),
            max_connections: config.max_connections,
            shared,
            pool,
            signals,
            wake_reader,
            clients: HashMap::new(),
            timers: TimerList::new(),
            next_token: FIRST_CONN,
            stop: false,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> Result<ServerHandle> {
        Ok(ServerHandle {
            shared: Arc::clone(&self.shared),
            trigger: Arc::new(self.signals.trigger()?),
        })
    }

    pub fn live_connections(&self) -> usize {
        self.shared.live_connections()
    }

    /// Corre el event loop hasta recibir `SIGTERM`/`SIGINT` (o `stop`)
    pub fn run(&mut self) -> Result<()> {
        signals::alarm(self.timeslot.as_secs());
        let mut events = vec![epoll::empty_event(); MAX_EVENT_NUMBER];

        while !self.stop {
            let n = match self.shared.epoll.wait(&mut events, -1) {
                Ok(n) => n,
                Err(e) => {
                    error!(error = %e, "epoll failure");
                    return Err(e.into());
                }
            };

            let mut timeout = false;
            for event in &events[..n] {
                let token = Token(event.u64);
                let bits = event.events;

                match token {
                    LISTENER => self.deal_with_client(),
                    SIGNALS => {
                        for signal in self.signals.drain() {
                            match signal {
                                Signal::Alarm => timeout = true,
                                Signal::Terminate => self.stop = true,
                            }
                        }
                    }
                    WAKER => self.evict_flagged(),
                    _ if bits & flags::CLOSED != 0 => self.evict(token),
                    _ if bits & flags::READABLE != 0 => self.deal_with_read(token),
                    _ if bits & flags::WRITABLE != 0 => self.deal_with_write(token),
                    _ => {}
                }
            }

            if timeout {
                self.timer_handler();
            }
        }

        info!(connections = self.clients.len(), "server stopping");
        self.pool.shutdown();
        let tokens: Vec<Token> = self.clients.keys().copied().collect();
        for token in tokens {
            self.evict(token);
        }
        Ok(())
    }

    // === Conexiones nuevas ===

    fn deal_with_client(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => self.add_client(stream, addr),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(error = %e, "accept error");
                    break;
                }
            }

            if self.listen_trig == TrigMode::Level {
                break;
            }
        }
    }

    fn add_client(&mut self, mut stream: TcpStream, addr: SocketAddr) {
        if self.shared.live_connections() >= self.max_connections {
            warn!(peer = %addr, "connection limit reached, rejecting client");
            let _ = stream.write_all(BUSY_MESSAGE);
            return;
        }

        if let Err(e) = stream.set_nonblocking(true) {
            error!(peer = %addr, error = %e, "failed to set non-blocking");
            return;
        }

        let token = Token(self.next_token);
        self.next_token += 1;

        let conn = HttpConn::new(stream, addr, token, self.shared.conn_trig);
        if let Err(e) = self
            .shared
            .epoll
            .add_conn(conn.raw_fd(), token.0, self.shared.conn_trig)
        {
            error!(peer = %addr, error = %e, "failed to register connection");
            return;
        }

        let expire = timer::expiry_from(Instant::now(), self.timeslot);
        let timer = self.timers.add(expire, ClientData { token, addr });

        self.clients.insert(
            token,
            Client {
                conn: Arc::new(Mutex::new(conn)),
                timer,
            },
        );
        self.shared.connection_opened();

        info!(peer = %addr, token = %token, "client connected");
    }

    // === Lectura y escritura ===

    fn deal_with_read(&mut self, token: Token) {
        let conn = match self.touch(token) {
            Some(conn) => conn,
            None => return,
        };

        match self.shared.actor {
            ActorModel::Proactor => self.submit(token, conn, TaskState::NeedsRead),
            ActorModel::Reactor => {
                let ok = lock_conn(&conn).read_once();
                if ok {
                    self.submit(token, conn, TaskState::NeedsRead);
                } else {
                    self.evict(token);
                }
            }
        }
    }

    fn deal_with_write(&mut self, token: Token) {
        let conn = match self.touch(token) {
            Some(conn) => conn,
            None => return,
        };

        match self.shared.actor {
            ActorModel::Proactor => self.submit(token, conn, TaskState::NeedsWrite),
            ActorModel::Reactor => {
                let (next, fd) = {
                    let mut guard = lock_conn(&conn);
                    (guard.write(), guard.raw_fd())
                };
                if next == Next::Close || !self.shared.rearm(fd, token, next) {
                    self.evict(token);
                }
            }
        }
    }

    /// Refresca el timer de la conexión y retorna su estado
    fn touch(&mut self, token: Token) -> Option<Arc<Mutex<HttpConn>>> {
        let client = self.clients.get(&token)?;
        let expire = timer::expiry_from(Instant::now(), self.timeslot);
        self.timers.adjust(client.timer, expire);
        debug!(token = %token, "adjust timer once");
        Some(Arc::clone(&client.conn))
    }

    fn submit(&mut self, token: Token, conn: Arc<Mutex<HttpConn>>, state: TaskState) {
        let task = Task { token, conn, state };
        if let Err(e) = self.pool.submit(task) {
            warn!(token = %token, error = %e, "task queue rejected connection");
            self.evict(token);
        }
    }

    // === Cierres ===

    /// Cierra una conexión registrada (el único camino de cierre)
    fn evict(&mut self, token: Token) {
        if let Some(timer) = close_client(&mut self.clients, &self.shared, token) {
            self.timers.delete(timer);
        }
    }

    fn evict_flagged(&mut self) {
        let mut buf = [0u8; 256];
        while let Ok(n) = self.wake_reader.read(&mut buf) {
            if n == 0 {
                break;
            }
        }

        for token in self.shared.take_flagged() {
            self.evict(token);
        }
    }

    /// Expira las conexiones inactivas y re-arma la alarma
    fn timer_handler(&mut self) {
        let clients = &mut self.clients;
        let shared = &self.shared;

        let expired = self.timers.tick(Instant::now(), |data| {
            info!(peer = %data.addr, token = %data.token, "idle connection timed out");
            close_client(clients, shared, data.token);
        });
        if expired > 0 {
            debug!(expired, remaining = self.timers.len(), "timer tick");
        }

        signals::alarm(self.timeslot.as_secs());
    }
}

/// Saca la conexión del mapa, de epoll y cierra el socket
///
/// Si un worker la tiene tomada, espera a que la suelte. Retorna el timer
/// de la conexión para que el llamador lo borre.
fn close_client(
    clients: &mut HashMap<Token, Client>,
    shared: &Shared,
    token: Token,
) -> Option<TimerId> {
    let client = clients.remove(&token)?;

    {
        let mut conn = lock_conn(&client.conn);
        let _ = shared.epoll.delete(conn.raw_fd());
        conn.close();
        info!(peer = %conn.addr(), token = %token, "close connection");
    }

    shared.connection_closed();
    Some(client.timer)
}

/// `SO_LINGER` en el listener: activo con 1 segundo, o desactivado
fn set_linger(listener: &TcpListener, enabled: bool) -> io::Result<()> {
    let linger = libc::linger {
        l_onoff: enabled as libc::c_int,
        l_linger: 1,
    };

    let res = unsafe {
        libc::setsockopt(
            listener.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_LINGER,
            &linger as *const libc::linger as *const libc::c_void,
            std::mem::size_of::<libc::linger>() as libc::socklen_t,
        )
    };

    if res < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(root: &std::path::Path) -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            doc_root: root.to_string_lossy().into_owned(),
            users_file: root.join("users.json").to_string_lossy().into_owned(),
            thread_num: 2,
            sql_num: 1,
            ..Config::default()
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let mut config = test_config(root.path());
        config.thread_num = 0;

        match WebServer::new(&config) {
            Err(ServerError::Config(msg)) => assert!(msg.contains("Worker threads")),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("server should not start"),
        }
    }

    #[test]
    fn test_binds_ephemeral_port() {
        let root = tempfile::tempdir().unwrap();
        let server = WebServer::new(&test_config(root.path())).unwrap();

        assert_ne!(server.local_addr().port(), 0);
        assert_eq!(server.live_connections(), 0);
    }

    #[test]
    fn test_stop_before_run_returns() {
        let root = tempfile::tempdir().unwrap();
        let mut server = WebServer::new(&test_config(root.path())).unwrap();

        server.handle().unwrap().stop().unwrap();
        assert!(server.run().is_ok());
    }

    #[test]
    fn test_linger_option() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        assert!(set_linger(&listener, true).is_ok());
        assert!(set_linger(&listener, false).is_ok());
    }
}
