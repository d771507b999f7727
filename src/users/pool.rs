//! # Pool de Conexiones al Almacén de Usuarios
//! src/users/pool.rs
//!
//! Número fijo de handles al almacén. Un worker toma uno solo mientras
//! atiende un formulario y lo devuelve siempre al soltar el guard, incluso
//! si el procesamiento falla.

use super::store::UserStore;
use std::io;
use std::ops::Deref;
use std::sync::{Arc, Condvar, Mutex};

/// Handle a un almacén de usuarios
pub struct StoreConn {
    id: usize,
    store: Arc<UserStore>,
}

impl StoreConn {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Coincidencia exacta de usuario y password
    pub fn verify(&self, user: &str, password: &str) -> bool {
        self.store.verify(user, password)
    }

    /// Inserta el usuario si no existe
    pub fn register(&self, user: &str, password: &str) -> io::Result<bool> {
        self.store.register(user, password)
    }
}

/// Pool de handles con checkout bloqueante
pub struct ConnectionPool {
    free: Mutex<Vec<StoreConn>>,
    available: Condvar,
    size: usize,
}

impl ConnectionPool {
    /// Crea `size` handles sobre el mismo almacén
    pub fn new(store: Arc<UserStore>, size: usize) -> Result<Self, String> {
        if size == 0 {
            return Err("User store pool size must be >= 1".to_string());
        }

        let free = (0..size)
            .map(|id| StoreConn {
                id,
                store: Arc::clone(&store),
            })
            .collect();

        Ok(Self {
            free: Mutex::new(free),
            available: Condvar::new(),
            size,
        })
    }

    /// Toma un handle, esperando si todos están en uso
    pub fn get(&self) -> PooledConn<'_> {
        let mut free = self.free.lock().unwrap();
        loop {
            if let Some(conn) = free.pop() {
                return PooledConn {
                    pool: self,
                    conn: Some(conn),
                };
            }
            free = self.available.wait(free).unwrap();
        }
    }

    /// Handles libres en este momento
    pub fn free_count(&self) -> usize {
        self.free.lock().unwrap().len()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn release(&self, conn: StoreConn) {
        self.free.lock().unwrap().push(conn);
        self.available.notify_one();
    }
}

/// Guard RAII: devuelve el handle al pool en `Drop`
pub struct PooledConn<'a> {
    pool: &'a ConnectionPool,
    conn: Option<StoreConn>,
}

impl Deref for PooledConn<'_> {
    type Target = StoreConn;

    fn deref(&self) -> &StoreConn {
        // solo es None dentro de drop
        self.conn.as_ref().unwrap()
    }
}

impl Drop for PooledConn<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
