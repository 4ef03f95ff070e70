//! Bounded packet store with a single read cursor

use std::collections::VecDeque;
use std::sync::Arc;

use sniff_protocol::Packet;

/// Default number of packets kept before the oldest are evicted
pub const DEFAULT_CAPACITY: usize = 80_000;

/// Capacity-bounded, append-only packet sequence
///
/// Positions are absolute: `base` is the position of the oldest packet still
/// held and `cursor` the position of the next packet to hand out. The cursor
/// never passes the write position and never points before `base`.
#[derive(Debug)]
pub struct PacketBuffer {
    packets: VecDeque<Arc<Packet>>,
    capacity: usize,
    base: u64,
    cursor: u64,
    evicted_unread: u64,
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PacketBuffer {
    /// Create a buffer holding at most `capacity` packets (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            packets: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            base: 0,
            cursor: 0,
            evicted_unread: 0,
        }
    }

    /// Append a packet at the tail, evicting the oldest one when full
    pub fn append(&mut self, packet: Arc<Packet>) {
        self.packets.push_back(packet);
        if self.packets.len() > self.capacity {
            self.packets.pop_front();
            self.base += 1;
            if self.cursor < self.base {
                self.cursor = self.base;
                self.evicted_unread += 1;
            }
        }
    }

    /// Hand out unread packets and advance the cursor past them
    ///
    /// `None` returns everything up to the tail; `Some(n)` at most `n`
    /// packets.
    pub fn consume(&mut self, limit: Option<usize>) -> Vec<Arc<Packet>> {
        let start = (self.cursor - self.base) as usize;
        let available = self.packets.len() - start;
        let count = limit.map_or(available, |n| n.min(available));

        let out: Vec<Arc<Packet>> = self
            .packets
            .range(start..start + count)
            .cloned()
            .collect();
        self.cursor += count as u64;
        out
    }

    /// Packets currently held
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Packets between the cursor and the tail
    pub fn unread(&self) -> usize {
        (self.write_position() - self.cursor) as usize
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Packets ever appended
    pub fn total_appended(&self) -> u64 {
        self.write_position()
    }

    /// Packets evicted before anyone consumed them
    pub fn evicted_unread(&self) -> u64 {
        self.evicted_unread
    }

    /// Most recent held packet carrying `counter`
    pub fn find_by_counter(&self, counter: u16) -> Option<Arc<Packet>> {
        self.packets
            .iter()
            .rev()
            .find(|p| p.counter == counter)
            .cloned()
    }

    fn write_position(&self) -> u64 {
        self.base + self.packets.len() as u64
    }
}
