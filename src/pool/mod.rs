//! The keep-alive connection registry.
//!
//! Two global lists thread through every live connection — `idle` (ordered
//! by the moment each entry was parked, oldest at the head) and `busy`
//! (kept ordered by last I/O activity) — plus one per-address queue per
//! peer with at least one idle connection. All three memberships are
//! intrusive links into the same arena, so a lease, a park, or an eviction
//! is a handful of index writes.
//!
//! The registry is plain data: the sweeper task and the close paths that
//! need inspectors and sockets live with the client.

pub(crate) mod arena;
pub(crate) mod list;

use std::{collections::HashMap, net::SocketAddr, time::Duration};

use ahash::RandomState;

use self::{
    arena::{Arena, LINK_ADDR, LINK_BUSY, LINK_IDLE},
    list::List,
};
use crate::conn::{Connection, IoPhase, State};

pub(crate) use self::arena::ConnId;

/// Fixed sweeper cadence.
pub(crate) const SWEEP_INTERVAL: Duration = Duration::from_millis(1000);

/// Snapshot of pool occupancy and lifetime expiry counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections parked for reuse.
    pub idle: usize,
    /// Connections currently serving a request.
    pub busy: usize,
    /// Idle connections closed by the sweeper, total.
    pub idle_expired_total: u64,
    /// Busy connections closed by the sweeper, total.
    pub busy_expired_total: u64,
}

pub(crate) struct Pool {
    conns: Arena<Connection>,
    idle: List,
    busy: List,
    by_peer: HashMap<SocketAddr, List, RandomState>,
    pub(crate) idle_expired_total: u64,
    pub(crate) busy_expired_total: u64,
    pub(crate) sweeper_armed: bool,
}

impl Pool {
    pub(crate) fn new() -> Self {
        Pool {
            conns: Arena::new(),
            idle: List::new(LINK_IDLE),
            busy: List::new(LINK_BUSY),
            by_peer: HashMap::with_hasher(RandomState::new()),
            idle_expired_total: 0,
            busy_expired_total: 0,
            sweeper_armed: false,
        }
    }

    pub(crate) fn total(&self) -> usize {
        self.conns.len()
    }

    pub(crate) fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.idle.len(),
            busy: self.busy.len(),
            idle_expired_total: self.idle_expired_total,
            busy_expired_total: self.busy_expired_total,
        }
    }

    pub(crate) fn get(&self, id: ConnId) -> Option<&Connection> {
        self.conns.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: ConnId) -> Option<&mut Connection> {
        self.conns.get_mut(id)
    }

    /// Register a freshly dialed connection; it starts life busy.
    pub(crate) fn insert_busy(&mut self, conn: Connection) -> ConnId {
        debug_assert!(matches!(conn.state, State::Busy));
        let id = self.conns.insert(conn);
        self.busy.push_back(&mut self.conns, id);
        id
    }

    /// Lease the hottest idle connection to `peer`, if any.
    ///
    /// Takes from the tail of the per-address queue, so recently parked
    /// sockets are preferred and cold ones age toward expiry at the head.
    pub(crate) fn take_idle(&mut self, peer: SocketAddr, now: u64) -> Option<ConnId> {
        let (id, now_empty) = {
            let queue = self.by_peer.get_mut(&peer)?;
            let id = queue.pop_back(&mut self.conns)?;
            (id, queue.is_empty())
        };
        if now_empty {
            self.by_peer.remove(&peer);
        }
        self.idle.remove(&mut self.conns, id);

        let conn = self.conns.get_mut(id).expect("leased connection is live");
        debug_assert!(matches!(conn.state, State::Idle));
        conn.state = State::Busy;
        conn.last_activity = now;
        self.busy.push_back(&mut self.conns, id);
        Some(id)
    }

    /// Park a busy connection for reuse.
    pub(crate) fn park_idle(&mut self, id: ConnId, now: u64) {
        let peer = {
            let conn = self.conns.get_mut(id).expect("parked connection is live");
            debug_assert!(matches!(conn.state, State::Busy));
            conn.state = State::Idle;
            conn.last_activity = now;
            conn.peer
        };
        self.busy.remove(&mut self.conns, id);
        self.idle.push_back(&mut self.conns, id);
        self.by_peer
            .entry(peer)
            .or_insert_with(|| List::new(LINK_ADDR))
            .push_back(&mut self.conns, id);
    }

    /// Detach `id` from every list and drop its registry entry.
    ///
    /// Safe to call with a stale id; returns `None` in that case.
    pub(crate) fn remove(&mut self, id: ConnId) -> Option<Connection> {
        let (state, peer) = {
            let conn = self.conns.get(id)?;
            (conn.state, conn.peer)
        };
        match state {
            State::Busy => self.busy.remove(&mut self.conns, id),
            State::Idle => {
                self.idle.remove(&mut self.conns, id);
                let now_empty = {
                    let queue = self
                        .by_peer
                        .get_mut(&peer)
                        .expect("idle connection has a per-address queue");
                    queue.remove(&mut self.conns, id);
                    queue.is_empty()
                };
                if now_empty {
                    self.by_peer.remove(&peer);
                }
            }
        }
        self.conns.remove(id)
    }

    /// Record I/O progress on a busy connection.
    ///
    /// Moving the entry to the busy-list tail keeps that list ordered by
    /// last activity, which is what lets the sweeper stop its walk at the
    /// first survivor.
    pub(crate) fn touch(&mut self, id: ConnId, now: u64, phase: IoPhase) {
        let Some(conn) = self.conns.get_mut(id) else {
            return;
        };
        if !matches!(conn.state, State::Busy) {
            return;
        }
        conn.last_activity = now;
        conn.phase = phase;
        self.busy.remove(&mut self.conns, id);
        self.busy.push_back(&mut self.conns, id);
    }

    pub(crate) fn idle_head(&self) -> Option<(ConnId, u64)> {
        let id = self.idle.head_id(&self.conns)?;
        Some((id, self.conns.get(id)?.last_activity))
    }

    pub(crate) fn busy_head(&self) -> Option<(ConnId, u64)> {
        let id = self.busy.head_id(&self.conns)?;
        Some((id, self.conns.get(id)?.last_activity))
    }

    /// Every currently idle connection, head (oldest) first.
    pub(crate) fn idle_ids(&self) -> Vec<ConnId> {
        use self::arena::Linked;

        let mut out = Vec::with_capacity(self.idle.len());
        let mut cursor = self.idle.head_id(&self.conns);
        while let Some(id) = cursor {
            out.push(id);
            cursor = self
                .conns
                .get(id)
                .and_then(|conn| conn.link(LINK_IDLE).next)
                .map(|index| self.conns.id_at(index));
        }
        out
    }

    #[cfg(test)]
    pub(crate) fn peer_queue_len(&self, peer: SocketAddr) -> usize {
        self.by_peer.get(&peer).map_or(0, List::len)
    }

    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        let queued: usize = self.by_peer.values().map(List::len).sum();
        assert_eq!(self.idle.len(), queued, "idle list and queues disagree");
        assert!(
            self.by_peer.values().all(|queue| !queue.is_empty()),
            "empty per-address queue left in map"
        );
        assert_eq!(self.idle.len() + self.busy.len(), self.conns.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(last: u8) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, last], 80))
    }

    fn pool_with_busy(n: usize, addr: SocketAddr) -> (Pool, Vec<ConnId>) {
        let mut pool = Pool::new();
        let ids = (0..n)
            .map(|i| pool.insert_busy(Connection::new(addr, i as u64)))
            .collect();
        (pool, ids)
    }

    #[test]
    fn lease_prefers_most_recently_parked() {
        let (mut pool, ids) = pool_with_busy(3, peer(1));
        for (i, &id) in ids.iter().enumerate() {
            pool.park_idle(id, 100 + i as u64);
        }
        pool.assert_invariants();

        // Hot end of the per-address queue first.
        assert_eq!(pool.take_idle(peer(1), 500), Some(ids[2]));
        assert_eq!(pool.take_idle(peer(1), 500), Some(ids[1]));
        assert_eq!(pool.take_idle(peer(1), 500), Some(ids[0]));
        assert_eq!(pool.take_idle(peer(1), 500), None);
        pool.assert_invariants();
        assert_eq!(pool.stats().busy, 3);
    }

    #[test]
    fn empty_queue_is_removed_from_the_map() {
        let (mut pool, ids) = pool_with_busy(1, peer(2));
        pool.park_idle(ids[0], 1);
        assert_eq!(pool.peer_queue_len(peer(2)), 1);
        pool.take_idle(peer(2), 2);
        assert_eq!(pool.peer_queue_len(peer(2)), 0);
        pool.assert_invariants();
    }

    #[test]
    fn remove_handles_both_states_and_stale_ids() {
        let (mut pool, ids) = pool_with_busy(2, peer(3));
        pool.park_idle(ids[0], 1);
        assert!(pool.remove(ids[0]).is_some());
        assert!(pool.remove(ids[0]).is_none());
        assert!(pool.remove(ids[1]).is_some());
        assert_eq!(pool.total(), 0);
        pool.assert_invariants();
    }

    #[test]
    fn touch_moves_busy_entry_to_tail() {
        let (mut pool, ids) = pool_with_busy(3, peer(4));
        assert_eq!(pool.busy_head().unwrap().0, ids[0]);
        pool.touch(ids[0], 50, IoPhase::Reading);
        assert_eq!(pool.busy_head().unwrap().0, ids[1]);
        assert_eq!(pool.busy_head().unwrap().1, 1);
    }

    #[test]
    fn idle_list_is_ordered_across_peers() {
        let mut pool = Pool::new();
        let a = pool.insert_busy(Connection::new(peer(1), 0));
        let b = pool.insert_busy(Connection::new(peer(2), 0));
        pool.park_idle(b, 10);
        pool.park_idle(a, 20);
        assert_eq!(pool.idle_ids(), vec![b, a]);
        assert_eq!(pool.idle_head().unwrap(), (b, 10));
        pool.assert_invariants();
    }
}
