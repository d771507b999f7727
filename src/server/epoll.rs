//! # Wrapper de epoll
//! src/server/epoll.rs
//!
//! Llamadas directas a `epoll_create1` / `epoll_ctl` / `epoll_wait` vía
//! `libc`. Cada descriptor se registra con un token `u64` que vuelve en el
//! evento; el servidor nunca identifica conexiones por número de fd.
//!
//! Los sockets de conexión se registran con `EPOLLONESHOT`: después de un
//! evento el descriptor queda mudo hasta que alguien lo re-arme con
//! `rearm`. Así una conexión nunca está en manos de dos threads a la vez.

use crate::config::TrigMode;
use std::io;
use std::os::unix::io::RawFd;
use std::ptr;

pub use libc::epoll_event as Event;

/// Dirección que se espera del descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Readable,
    Writable,
}

impl Interest {
    fn bits(self) -> u32 {
        match self {
            Interest::Readable => libc::EPOLLIN as u32,
            Interest::Writable => libc::EPOLLOUT as u32,
        }
    }
}

/// Bits de un evento recibido
pub mod flags {
    pub const READABLE: u32 = libc::EPOLLIN as u32;
    pub const WRITABLE: u32 = libc::EPOLLOUT as u32;
    /// El cliente cerró, o el socket tiene un error
    pub const CLOSED: u32 = (libc::EPOLLRDHUP | libc::EPOLLHUP | libc::EPOLLERR) as u32;
}

/// Evento vacío para inicializar el buffer de `wait`
pub fn empty_event() -> Event {
    Event { events: 0, u64: 0 }
}

/// Instancia de epoll
pub struct Epoll {
    fd: RawFd,
}

impl Epoll {
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd })
    }

    /// Registra un descriptor auxiliar (listener o pipe), sin ONESHOT
    pub fn add(&self, fd: RawFd, token: u64, trig_mode: TrigMode) -> io::Result<()> {
        let events = libc::EPOLLIN as u32 | trig_bits(trig_mode);
        self.ctl(libc::EPOLL_CTL_ADD, fd, token, events)
    }

    /// Registra un socket de conexión: lectura, RDHUP y ONESHOT
    pub fn add_conn(&self, fd: RawFd, token: u64, trig_mode: TrigMode) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, token, conn_bits(Interest::Readable, trig_mode))
    }

    /// Re-arma un socket de conexión para la siguiente dirección
    pub fn rearm(
        &self,
        fd: RawFd,
        token: u64,
        interest: Interest,
        trig_mode: TrigMode,
    ) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, token, conn_bits(interest, trig_mode))
    }

    pub fn delete(&self, fd: RawFd) -> io::Result<()> {
        let res = unsafe { libc::epoll_ctl(self.fd, libc::EPOLL_CTL_DEL, fd, ptr::null_mut()) };
        if res < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ENOENT) {
                return Err(err);
            }
        }
        Ok(())
    }

    /// Espera eventos; una interrupción por señal retorna 0 eventos
    pub fn wait(&self, events: &mut [Event], timeout_ms: i32) -> io::Result<usize> {
        let res = unsafe {
            libc::epoll_wait(
                self.fd,
                events.as_mut_ptr(),
                events.len() as libc::c_int,
                timeout_ms,
            )
        };

        if res < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                return Ok(0);
            }
            return Err(err);
        }

        Ok(res as usize)
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, token: u64, events: u32) -> io::Result<()> {
        let mut event = Event { events, u64: token };
        let res = unsafe { libc::epoll_ctl(self.fd, op, fd, &mut event) };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for Epoll {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

fn trig_bits(trig_mode: TrigMode) -> u32 {
    match trig_mode {
        TrigMode::Level => 0,
        TrigMode::Edge => libc::EPOLLET as u32,
    }
}

fn conn_bits(interest: Interest, trig_mode: TrigMode) -> u32 {
    interest.bits() | libc::EPOLLRDHUP as u32 | libc::EPOLLONESHOT as u32 | trig_bits(trig_mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;

    #[test]
    fn test_readable_event_carries_token() {
        let epoll = Epoll::new().unwrap();
        let (mut writer, reader) = UnixStream::pair().unwrap();
        epoll.add(reader.as_raw_fd(), 42, TrigMode::Level).unwrap();

        writer.write_all(b"x").unwrap();

        let mut events = vec![empty_event(); 8];
        let n = epoll.wait(&mut events, 1000).unwrap();
        assert_eq!(n, 1);
        let token = events[0].u64;
        let bits = events[0].events;
        assert_eq!(token, 42);
        assert!(bits & flags::READABLE != 0);
    }

    #[test]
    fn test_oneshot_needs_rearm() {
        let epoll = Epoll::new().unwrap();
        let (mut writer, reader) = UnixStream::pair().unwrap();
        let fd = reader.as_raw_fd();
        epoll.add_conn(fd, 7, TrigMode::Level).unwrap();

        writer.write_all(b"x").unwrap();
        let mut events = vec![empty_event(); 8];
        assert_eq!(epoll.wait(&mut events, 1000).unwrap(), 1);

        // sin re-armar no hay más eventos aunque haya datos sin leer
        assert_eq!(epoll.wait(&mut events, 50).unwrap(), 0);

        epoll.rearm(fd, 7, Interest::Readable, TrigMode::Level).unwrap();
        assert_eq!(epoll.wait(&mut events, 1000).unwrap(), 1);
    }

    #[test]
    fn test_delete_unknown_fd_is_ok() {
        let epoll = Epoll::new().unwrap();
        let (_writer, reader) = UnixStream::pair().unwrap();
        assert!(epoll.delete(reader.as_raw_fd()).is_ok());
    }
}
