//! # Timers de Inactividad
//! src/timer/mod.rs
//!
//! Cada conexión tiene un timer que vence `3 × TIMESLOT` segundos después
//! de su última actividad. `SIGALRM` llega cada `TIMESLOT` segundos y el
//! event loop llama a `tick`, que entrega los clientes vencidos al closure
//! de desalojo.

pub mod list;

pub use list::{ClientData, TimerId, TimerList};

use std::time::{Duration, Instant};

/// Múltiplo de `TIMESLOT` que una conexión puede estar inactiva
pub const IDLE_SLOTS: u32 = 3;

/// Expiración para una conexión con actividad en `now`
pub fn expiry_from(now: Instant, timeslot: Duration) -> Instant {
    now + timeslot * IDLE_SLOTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_is_three_slots() {
        let now = Instant::now();
        assert_eq!(
            expiry_from(now, Duration::from_secs(5)),
            now + Duration::from_secs(15)
        );
    }
}
