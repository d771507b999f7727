//! # Cola de Tareas
//! src/pool/queue.rs
//!
//! Cola FIFO acotada y thread-safe. El event loop encola sin bloquear y
//! los workers esperan en la condvar hasta que haya algo que sacar.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Cola FIFO acotada
pub struct TaskQueue<T> {
    state: Arc<Mutex<State<T>>>,

    /// Condvar para notificar cuando hay nuevas tareas
    condvar: Arc<Condvar>,

    /// Capacidad máxima de la cola
    max_capacity: usize,
}

impl<T> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            condvar: Arc::clone(&self.condvar),
            max_capacity: self.max_capacity,
        }
    }
}

impl<T> TaskQueue<T> {
    /// Crea una nueva cola con capacidad máxima
    pub fn new(max_capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                items: VecDeque::with_capacity(max_capacity.min(1024)),
                closed: false,
            })),
            condvar: Arc::new(Condvar::new()),
            max_capacity,
        }
    }

    /// Encola una tarea
    ///
    /// Nunca bloquea: si la cola está llena (o cerrada) retorna Err.
    pub fn enqueue(&self, item: T) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();

        if state.closed {
            return Err("Queue is closed".to_string());
        }
        if state.items.len() >= self.max_capacity {
            return Err(format!(
                "Queue is full (max capacity: {})",
                self.max_capacity
            ));
        }

        state.items.push_back(item);

        // Notificar a un worker esperando
        self.condvar.notify_one();

        Ok(())
    }

    /// Desencola la tarea más antigua
    ///
    /// Bloquea hasta que haya una tarea. Retorna `None` cuando la cola se
    /// cerró.
    pub fn dequeue(&self) -> Option<T> {
        let mut state = self.state.lock().unwrap();

        loop {
            if state.closed {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }

            // Un despertar espurio con la cola vacía solo vuelve a esperar
            state = self.condvar.wait(state).unwrap();
        }
    }

    /// Cierra la cola y despierta a todos los workers
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        state.items.clear();
        self.condvar.notify_all();
    }

    /// Retorna el tamaño actual de la cola
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retorna la capacidad máxima
    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.max_capacity
    }
}
