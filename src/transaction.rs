//! The transaction table: a bounded allocator over `[id_min, id_max)` with a
//! per-slot reply callback, used to demultiplex replies arriving out of order
//! on the single receive loop back to the caller that issued the request.

use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::packet::OwnedReply;

/// Invoked exactly once per transaction: either with the reply the receive
/// loop delivered, or with a terminal error (send failure, or
/// `ConnectionAborted` from [`TransactionTable::drain_cancel`]).
pub type ReplyCallback = Box<dyn FnOnce(Result<OwnedReply>) + Send + 'static>;

struct Slot {
    callback: Option<ReplyCallback>,
}

/// Fixed-size identifier pool plus per-slot callback storage.
///
/// Allocation is guarded by one table-wide mutex (`available`); each slot has
/// its own mutex so that `install` (called by the issuing task) and `deliver`
/// (called from a worker-pool task) never block on unrelated transactions.
pub struct TransactionTable {
    id_min: u16,
    available: Mutex<Vec<bool>>,
    slots: Vec<Mutex<Slot>>,
}

impl TransactionTable {
    /// Builds a table covering `[id_min, id_max)`. Panics if the range is
    /// empty — a client with no usable transaction ids cannot function.
    pub fn new(id_min: u16, id_max: u16) -> Self {
        assert!(id_max > id_min, "transaction id range must be non-empty");
        let len = (id_max - id_min) as usize;
        Self {
            id_min,
            available: Mutex::new(vec![true; len]),
            slots: (0..len).map(|_| Mutex::new(Slot { callback: None })).collect(),
        }
    }

    fn index_of(&self, id: u16) -> usize {
        (id - self.id_min) as usize
    }

    /// Returns the lowest available id and marks it taken, or
    /// `Error::TryAgain` if the table is full.
    pub fn allocate(&self) -> Result<u16> {
        let mut available = self.available.lock().unwrap();
        match available.iter().position(|&free| free) {
            Some(index) => {
                available[index] = false;
                Ok(self.id_min + index as u16)
            }
            None => Err(Error::TryAgain),
        }
    }

    /// Stores `callback` under `id`'s slot. The id must currently be
    /// allocated (not yet released).
    pub fn install(&self, id: u16, callback: ReplyCallback) {
        let mut slot = self.slots[self.index_of(id)].lock().unwrap();
        slot.callback = Some(callback);
    }

    /// Invokes and clears `id`'s callback if one is installed, then returns
    /// the id to the pool. Returns `true` if a callback was present.
    pub fn deliver(&self, id: u16, reply: Result<OwnedReply>) -> bool {
        let index = self.index_of(id);
        let callback = self.slots[index].lock().unwrap().callback.take();
        let delivered = callback.is_some();
        if let Some(callback) = callback {
            callback(reply);
        }
        self.available.lock().unwrap()[index] = true;
        delivered
    }

    /// Returns `id` to the pool without invoking its callback (used when
    /// `send_all` fails before a reply could ever arrive).
    pub fn release(&self, id: u16) {
        let index = self.index_of(id);
        self.slots[index].lock().unwrap().callback = None;
        self.available.lock().unwrap()[index] = true;
    }

    /// Invokes every still-installed callback with `Err(Error::ConnectionAborted)`
    /// and clears its slot. Called exactly once, when `run_loop` exits, so no
    /// caller is left waiting on a future that will never resolve.
    pub fn drain_cancel(&self) {
        for index in 0..self.slots.len() {
            let callback = self.slots[index].lock().unwrap().callback.take();
            if let Some(callback) = callback {
                callback(Err(Error::ConnectionAborted));
            }
            self.available.lock().unwrap()[index] = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_is_lowest_first_and_bijective() {
        let table = TransactionTable::new(0x20, 0x23);
        let a = table.allocate().unwrap();
        let b = table.allocate().unwrap();
        let c = table.allocate().unwrap();
        assert_eq!([a, b, c], [0x20, 0x21, 0x22]);
        assert!(matches!(table.allocate(), Err(Error::TryAgain)));
    }

    #[test]
    fn release_makes_id_reallocable() {
        let table = TransactionTable::new(0, 1);
        let id = table.allocate().unwrap();
        table.release(id);
        assert_eq!(table.allocate().unwrap(), id);
    }

    #[test]
    fn deliver_invokes_callback_exactly_once_then_frees_slot() {
        let table = TransactionTable::new(0, 2);
        let id = table.allocate().unwrap();
        let fired = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let fired2 = fired.clone();
        table.install(
            id,
            Box::new(move |_reply| {
                fired2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }),
        );
        assert!(table.deliver(id, Ok(OwnedReply { transaction_id: id, status: 0, data: vec![] })));
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 1);
        // slot freed: the id is reallocable
        assert_eq!(table.allocate().unwrap(), id);
    }

    #[test]
    fn deliver_with_no_callback_installed_returns_false() {
        let table = TransactionTable::new(0, 1);
        let id = table.allocate().unwrap();
        assert!(!table.deliver(id, Ok(OwnedReply { transaction_id: id, status: 0, data: vec![] })));
    }

    #[test]
    fn drain_cancel_completes_every_installed_callback_with_connection_aborted() {
        let table = TransactionTable::new(0, 3);
        let a = table.allocate().unwrap();
        let b = table.allocate().unwrap();
        let results = std::sync::Arc::new(Mutex::new(Vec::new()));
        for id in [a, b] {
            let results = results.clone();
            table.install(
                id,
                Box::new(move |reply| {
                    results.lock().unwrap().push(reply.is_err());
                }),
            );
        }
        table.drain_cancel();
        assert_eq!(*results.lock().unwrap(), vec![true, true]);
        // every slot is free again after the drain
        assert!(table.allocate().is_ok());
        assert!(table.allocate().is_ok());
        assert!(table.allocate().is_ok());
    }
}
