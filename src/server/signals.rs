//! # Señales por Self-Pipe
//! src/server/signals.rs
//!
//! Los handlers de `SIGALRM`, `SIGTERM` y `SIGINT` solo escriben el número
//! de la señal en un socket pair; el otro extremo está registrado en epoll
//! y el event loop lee las señales como cualquier otro evento.
//!
//! El handler usa `libc::write` directamente: es async-signal-safe y no
//! toma locks ni reserva memoria.

use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

use signal_hook::consts::signal::{SIGALRM, SIGINT, SIGTERM};
use signal_hook::SigId;

/// Señal recibida por el event loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Tick del reloj de inactividad
    Alarm,
    /// Pedido de apagado (`SIGTERM` o `SIGINT`)
    Terminate,
}

impl Signal {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte as libc::c_int {
            SIGALRM => Some(Signal::Alarm),
            SIGTERM | SIGINT => Some(Signal::Terminate),
            _ => None,
        }
    }
}

/// Self-pipe con los handlers registrados
pub struct SignalPipe {
    reader: UnixStream,
    writer: UnixStream,
    ids: Vec<SigId>,
}

impl SignalPipe {
    /// Crea el pipe e instala los handlers
    pub fn new() -> io::Result<Self> {
        let (reader, writer) = UnixStream::pair()?;
        reader.set_nonblocking(true)?;
        writer.set_nonblocking(true)?;

        let mut pipe = Self {
            reader,
            writer,
            ids: Vec::with_capacity(3),
        };

        let fd = pipe.writer.as_raw_fd();
        for signal in [SIGALRM, SIGTERM, SIGINT] {
            let id = unsafe {
                signal_hook::low_level::register(signal, move || {
                    let byte = signal as u8;
                    libc::write(fd, &byte as *const u8 as *const libc::c_void, 1);
                })
            }?;
            pipe.ids.push(id);
        }

        Ok(pipe)
    }

    /// Extremo de lectura (se registra en epoll)
    pub fn raw_fd(&self) -> RawFd {
        self.reader.as_raw_fd()
    }

    /// Extremo de escritura para pedir el apagado desde otro thread
    pub fn trigger(&self) -> io::Result<Trigger> {
        Ok(Trigger {
            writer: self.writer.try_clone()?,
        })
    }

    /// Lee todas las señales pendientes
    pub fn drain(&mut self) -> Vec<Signal> {
        let mut signals = Vec::new();
        let mut buf = [0u8; 64];

        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => signals.extend(buf[..n].iter().filter_map(|b| Signal::from_byte(*b))),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }

        signals
    }
}

impl Drop for SignalPipe {
    fn drop(&mut self) {
        // antes de cerrar el pipe, para que ningún handler escriba en un fd
        // que ya no es nuestro
        for id in self.ids.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}

/// Escribe señales en el pipe sin pasar por el kernel de señales
#[derive(Debug)]
pub struct Trigger {
    writer: UnixStream,
}

impl Trigger {
    /// Pide al event loop que termine
    pub fn terminate(&self) -> io::Result<()> {
        (&self.writer).write_all(&[SIGTERM as u8])
    }
}

/// Arma `SIGALRM` para dentro de `secs` segundos
pub fn alarm(secs: u64) {
    unsafe {
        libc::alarm(secs.min(u32::MAX as u64) as libc::c_uint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_terminates() {
        let mut pipe = SignalPipe::new().unwrap();
        pipe.trigger().unwrap().terminate().unwrap();
        assert_eq!(pipe.drain(), vec![Signal::Terminate]);
    }

    #[test]
    fn test_drain_empty_pipe() {
        let mut pipe = SignalPipe::new().unwrap();
        assert!(pipe.drain().is_empty());
    }

    #[test]
    fn test_unknown_bytes_are_ignored() {
        assert_eq!(Signal::from_byte(SIGALRM as u8), Some(Signal::Alarm));
        assert_eq!(Signal::from_byte(SIGINT as u8), Some(Signal::Terminate));
        assert_eq!(Signal::from_byte(0), None);
    }
}
