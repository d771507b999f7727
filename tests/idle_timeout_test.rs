//! Test de desalojo de conexiones inactivas
//! tests/idle_timeout_test.rs
//!
//! Va en su propio binario: `SIGALRM` es global al proceso y otros
//! servidores en el mismo proceso re-armarían la misma alarma.

use std::io::Read;
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

use tinyweb::config::Config;
use tinyweb::server::WebServer;

#[test]
fn test_idle_connection_is_evicted() {
    let root = tempfile::tempdir().unwrap();

    let config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        doc_root: root.path().to_string_lossy().into_owned(),
        users_file: root.path().join("users.json").to_string_lossy().into_owned(),
        timeslot_secs: 1,
        thread_num: 2,
        sql_num: 1,
        ..Config::default()
    };

    let mut server = WebServer::new(&config).unwrap();
    let addr = server.local_addr();
    let handle = server.handle().unwrap();
    let runner = thread::spawn(move || server.run().unwrap());

    // conexión que nunca envía nada
    let mut idle = TcpStream::connect(addr).unwrap();
    idle.set_read_timeout(Some(Duration::from_secs(10))).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while handle.live_connections() != 1 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(handle.live_connections(), 1);

    // expira a los 3 timeslots; el tick siguiente la cierra
    let started = Instant::now();
    let mut buf = [0u8; 16];
    let n = idle.read(&mut buf).unwrap_or(0);
    assert_eq!(n, 0, "idle connection should be closed without a response");
    assert!(started.elapsed() >= Duration::from_secs(1));

    let deadline = Instant::now() + Duration::from_secs(5);
    while handle.live_connections() != 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(handle.live_connections(), 0);

    handle.stop().unwrap();
    runner.join().unwrap();
}
