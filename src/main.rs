//! # tinyweb - Entry Point
//! src/main.rs
//!
//! Punto de entrada del servidor HTTP/1.1.

use tinyweb::config::Config;
use tinyweb::logging;
use tinyweb::server::WebServer;
use tracing::{error, info};

fn main() {
    // Parsear argumentos CLI (con fallback a variables de entorno)
    let config = Config::new();

    if let Err(e) = config.validate() {
        eprintln!("Configuración inválida: {}", e);
        std::process::exit(1);
    }

    // El guard vive hasta el final de main
    let _log = logging::init(&config);

    println!("=================================");
    println!("  tinyweb HTTP/1.1 Server");
    println!("  Principios de Sistemas Operativos");
    println!("=================================\n");
    println!("   Puerto: {}", config.port);
    println!("   Raíz: {}", config.doc_root);
    println!("   Workers: {}", config.thread_num);
    println!("   Modelo: {:?}", config.actor());
    println!();

    let mut server = match WebServer::new(&config) {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "failed to start server");
            eprintln!("Error fatal: {}", e);
            std::process::exit(1);
        }
    };

    // Esto bloquea hasta SIGTERM / SIGINT
    if let Err(e) = server.run() {
        error!(error = %e, "event loop failed");
        eprintln!("Error fatal: {}", e);
        std::process::exit(1);
    }

    info!("server stopped");
}
