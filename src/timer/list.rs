//! # Lista de Timers
//! src/timer/list.rs
//!
//! Lista doblemente enlazada y ordenada por expiración, guardada en un
//! arena de slots. Los enlaces son índices, no punteros; un `TimerId`
//! lleva la generación del slot para que un id viejo no toque un timer
//! reutilizado.
//!
//! ```text
//! head ─▶ [t=3] ⇄ [t=5] ⇄ [t=5] ⇄ [t=9] ◀─ tail
//! ```
//!
//! | operación | costo |
//! |-----------|-------|
//! | `add`     | O(n), recorre desde la cabeza |
//! | `adjust`  | O(1) si no cambia de lugar, si no O(n) |
//! | `delete`  | O(1) |
//! | `tick`    | O(k) para k timers vencidos |

use crate::http::Token;
use std::net::SocketAddr;
use std::time::Instant;

/// Datos del cliente dueño del timer
///
/// Solo identifican la conexión; la lista nunca es dueña del socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientData {
    pub token: Token,
    pub addr: SocketAddr,
}

/// Referencia estable a un timer de la lista
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId {
    index: usize,
    generation: u64,
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    live: bool,
    expire: Instant,
    data: ClientData,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Lista ordenada de timers de inactividad
#[derive(Debug, Default)]
pub struct TimerList {
    slots: Vec<Slot>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl TimerList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Expiración del primer timer
    pub fn next_expiry(&self) -> Option<Instant> {
        self.head.map(|idx| self.slots[idx].expire)
    }

    /// Expiraciones en orden de la lista
    pub fn expiries(&self) -> Vec<Instant> {
        let mut out = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            out.push(self.slots[idx].expire);
            cursor = self.slots[idx].next;
        }
        out
    }

    /// Datos del cliente de un timer vivo
    pub fn get(&self, id: TimerId) -> Option<&ClientData> {
        self.live_index(id).map(|idx| &self.slots[idx].data)
    }

    /// Inserta un timer en orden, recorriendo desde la cabeza
    pub fn add(&mut self, expire: Instant, data: ClientData) -> TimerId {
        let index = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.generation += 1;
                slot.live = true;
                slot.expire = expire;
                slot.data = data;
                slot.prev = None;
                slot.next = None;
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    live: true,
                    expire,
                    data,
                    prev: None,
                    next: None,
                });
                self.slots.len() - 1
            }
        };

        self.link_from(index, self.head);
        self.len += 1;

        TimerId {
            index,
            generation: self.slots[index].generation,
        }
    }

    /// Mueve la expiración de un timer (normalmente hacia adelante)
    ///
    /// Si sigue antes que su sucesor no se mueve. Si es la cabeza se saca y
    /// se reinserta desde la nueva cabeza; si no, se reinserta desde su
    /// antiguo sucesor. Retorna `false` si el id ya no es válido.
    pub fn adjust(&mut self, id: TimerId, expire: Instant) -> bool {
        let index = match self.live_index(id) {
            Some(index) => index,
            None => return false,
        };

        self.slots[index].expire = expire;
        let prev = self.slots[index].prev;
        let next = self.slots[index].next;

        let before_prev = prev.map_or(false, |p| expire < self.slots[p].expire);
        let before_next = next.map_or(true, |n| expire < self.slots[n].expire);

        if before_prev {
            // retroceso: reinsertar desde la cabeza
            self.unlink(index);
            self.link_from(index, self.head);
        } else if before_next {
            // sigue en su lugar
        } else if Some(index) == self.head {
            self.unlink(index);
            self.link_from(index, self.head);
        } else {
            self.unlink(index);
            self.link_from(index, next);
        }

        true
    }

    /// Quita un timer en O(1) y libera su slot
    pub fn delete(&mut self, id: TimerId) -> Option<ClientData> {
        let index = self.live_index(id)?;
        Some(self.remove(index))
    }

    /// Expira todos los timers con `expire <= now`
    ///
    /// Cada timer vencido se quita de la lista antes de entregar sus datos
    /// a `evict`. Retorna cuántos expiraron.
    pub fn tick<F>(&mut self, now: Instant, mut evict: F) -> usize
    where
        F: FnMut(ClientData),
    {
        let mut expired = 0;

        while let Some(head) = self.head {
            if self.slots[head].expire > now {
                break;
            }
            let data = self.remove(head);
            evict(data);
            expired += 1;
        }

        expired
    }

    // === Enlaces ===

    fn live_index(&self, id: TimerId) -> Option<usize> {
        let slot = self.slots.get(id.index)?;
        if slot.live && slot.generation == id.generation {
            Some(id.index)
        } else {
            None
        }
    }

    fn remove(&mut self, index: usize) -> ClientData {
        self.unlink(index);
        let slot = &mut self.slots[index];
        slot.live = false;
        self.free.push(index);
        self.len -= 1;
        slot.data
    }

    /// Inserta `index` antes del primer nodo (desde `start`) que expire
    /// después que él; si no hay ninguno, al final
    fn link_from(&mut self, index: usize, start: Option<usize>) {
        let expire = self.slots[index].expire;

        let mut cursor = start;
        while let Some(c) = cursor {
            if self.slots[c].expire > expire {
                break;
            }
            cursor = self.slots[c].next;
        }

        let (prev, next) = match cursor {
            Some(c) => (self.slots[c].prev, Some(c)),
            None => (self.tail, None),
        };

        self.slots[index].prev = prev;
        self.slots[index].next = next;

        match prev {
            Some(p) => self.slots[p].next = Some(index),
            None => self.head = Some(index),
        }
        match next {
            Some(n) => self.slots[n].prev = Some(index),
            None => self.tail = Some(index),
        }
    }

    fn unlink(&mut self, index: usize) {
        let prev = self.slots[index].prev;
        let next = self.slots[index].next;

        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }

        self.slots[index].prev = None;
        self.slots[index].next = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn client(n: u64) -> ClientData {
        ClientData {
            token: Token(n),
            addr: "127.0.0.1:4000".parse().unwrap(),
        }
    }

    fn at(base: Instant, secs: u64) -> Instant {
        base + Duration::from_secs(secs)
    }

    fn assert_sorted(list: &TimerList) {
        let expiries = list.expiries();
        assert_eq!(expiries.len(), list.len());
        assert!(expiries.windows(2).all(|w| w[0] <= w[1]), "{:?}", expiries);
    }

    #[test]
    fn test_add_keeps_order() {
        let base = Instant::now();
        let mut list = TimerList::new();

        for secs in [9, 3, 5, 1, 7, 5] {
            list.add(at(base, secs), client(secs));
        }

        assert_sorted(&list);
        assert_eq!(list.len(), 6);
        assert_eq!(list.next_expiry(), Some(at(base, 1)));
    }

    #[test]
    fn test_adjust_in_place() {
        let base = Instant::now();
        let mut list = TimerList::new();
        let a = list.add(at(base, 1), client(1));
        list.add(at(base, 10), client(2));

        assert!(list.adjust(a, at(base, 5)));
        assert_eq!(list.expiries(), vec![at(base, 5), at(base, 10)]);
    }

    #[test]
    fn test_adjust_head_moves_back() {
        let base = Instant::now();
        let mut list = TimerList::new();
        let a = list.add(at(base, 1), client(1));
        list.add(at(base, 2), client(2));
        list.add(at(base, 3), client(3));

        assert!(list.adjust(a, at(base, 15)));
        assert_sorted(&list);
        assert_eq!(list.next_expiry(), Some(at(base, 2)));
    }

    #[test]
    fn test_adjust_middle_moves_back() {
        let base = Instant::now();
        let mut list = TimerList::new();
        list.add(at(base, 1), client(1));
        let b = list.add(at(base, 2), client(2));
        list.add(at(base, 3), client(3));
        list.add(at(base, 4), client(4));

        assert!(list.adjust(b, at(base, 20)));
        assert_eq!(
            list.expiries(),
            vec![at(base, 1), at(base, 3), at(base, 4), at(base, 20)]
        );
    }

    #[test]
    fn test_delete_and_stale_id() {
        let base = Instant::now();
        let mut list = TimerList::new();
        let a = list.add(at(base, 1), client(1));
        list.add(at(base, 2), client(2));

        assert_eq!(list.delete(a), Some(client(1)));
        assert_eq!(list.delete(a), None);
        assert!(!list.adjust(a, at(base, 5)));

        // el slot se reutiliza, el id viejo sigue inválido
        let c = list.add(at(base, 3), client(3));
        assert!(list.get(a).is_none());
        assert_eq!(list.get(c), Some(&client(3)));
        assert_sorted(&list);
    }

    #[test]
    fn test_tick_expires_only_due_timers() {
        let base = Instant::now();
        let mut list = TimerList::new();
        for secs in [1, 2, 3, 4, 5] {
            list.add(at(base, secs), client(secs));
        }

        let mut evicted = Vec::new();
        let count = list.tick(at(base, 3), |data| evicted.push(data.token));

        assert_eq!(count, 3);
        assert_eq!(evicted, vec![Token(1), Token(2), Token(3)]);
        assert_eq!(list.expiries(), vec![at(base, 4), at(base, 5)]);
    }

    #[test]
    fn test_tick_on_empty_list() {
        let mut list = TimerList::new();
        assert_eq!(list.tick(Instant::now(), |_| panic!("nothing to evict")), 0);
    }

    #[test]
    fn test_interleaved_operations_stay_sorted() {
        let base = Instant::now();
        let mut list = TimerList::new();
        let mut ids = Vec::new();

        // secuencia pseudoaleatoria determinista
        let mut seed: u64 = 0x2545_f491;
        let mut next = || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        for round in 0..500 {
            match next() % 4 {
                0 | 1 => ids.push(list.add(at(base, next() % 100), client(round))),
                2 if !ids.is_empty() => {
                    let id = ids[(next() as usize) % ids.len()];
                    list.adjust(id, at(base, next() % 100));
                }
                3 if !ids.is_empty() => {
                    let id = ids.swap_remove((next() as usize) % ids.len());
                    list.delete(id);
                }
                _ => {}
            }
            assert_sorted(&list);
        }

        let now = at(base, 50);
        list.tick(now, |_| {});
        assert_sorted(&list);
        assert!(list.expiries().iter().all(|e| *e > now));
    }
}
