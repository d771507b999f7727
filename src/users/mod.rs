//! # Módulo de Usuarios
//! src/users/mod.rs
//!
//! Almacén de credenciales que consultan los formularios de login y
//! registro, y el pool de handles con checkout por alcance.

pub mod pool;
pub mod store;

pub use pool::{ConnectionPool, PooledConn, StoreConn};
pub use store::UserStore;
