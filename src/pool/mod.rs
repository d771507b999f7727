//! # Pool de Threads
//! src/pool/mod.rs
//!
//! ```text
//! event loop ──submit──▶ [ TaskQueue (max_requests) ] ──dequeue──▶ worker-0..N
//!                  │
//!                  └── cola llena: Err inmediato, la conexión se descarta
//! ```

pub mod queue;
pub mod worker;

pub use queue::TaskQueue;
pub use worker::ThreadPool;
