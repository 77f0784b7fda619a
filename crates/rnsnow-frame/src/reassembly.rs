//! Receive-side fragment reassembly.
//!
//! Pending messages are keyed by `(sender, packet id)`, so several peers (or
//! several messages from one peer) can be in flight at once. Fragments may
//! arrive in any order; a message is released once its last fragment has
//! fixed the total and every sequence below it is present.
//!
//! Memory stays bounded without any change to the wire format:
//! - a sequence at or above the fragment ceiling is rejected outright,
//! - at most `max_pending` messages are held (oldest evicted first),
//! - a message not completed within `timeout` of its first fragment expires.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use bytes::{BufMut, Bytes, BytesMut};
use rnsnow_transport::PeerAddress;
use tracing::{debug, trace};

use crate::fragment::{FragmentHeader, DEFAULT_MAX_FRAGMENTS};

pub const DEFAULT_MAX_PENDING: usize = 8;
pub const DEFAULT_REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblyConfig {
    /// Sequences at or above this are rejected.
    pub max_fragments: usize,
    /// Concurrent pending messages.
    pub max_pending: usize,
    /// Age after which an incomplete message is dropped.
    pub timeout: Duration,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            max_fragments: DEFAULT_MAX_FRAGMENTS,
            max_pending: DEFAULT_MAX_PENDING,
            timeout: DEFAULT_REASSEMBLY_TIMEOUT,
        }
    }
}

/// Running counters, for logs and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblyStats {
    pub completed: u64,
    pub malformed: u64,
    pub rejected: u64,
    pub expired: u64,
    pub evicted: u64,
    pub restarted: u64,
}

type Key = (PeerAddress, u16);

#[derive(Debug)]
struct Pending {
    chunks: BTreeMap<u8, Bytes>,
    total: Option<usize>,
    started: Instant,
}

impl Pending {
    fn new(started: Instant) -> Self {
        Self {
            chunks: BTreeMap::new(),
            total: None,
            started,
        }
    }

    /// Whether `header` contradicts what this message already holds.
    fn conflicts(&self, header: &FragmentHeader) -> bool {
        let sequence = header.sequence as usize;
        if header.is_first() && self.chunks.contains_key(&0) {
            return true;
        }
        if let Some(total) = self.total {
            if sequence >= total || (header.is_last() && sequence + 1 != total) {
                return true;
            }
        }
        header.is_last()
            && self
                .chunks
                .last_key_value()
                .is_some_and(|(highest, _)| *highest > header.sequence)
    }

    fn is_complete(&self) -> bool {
        self.total == Some(self.chunks.len())
    }

    fn assemble(self) -> Bytes {
        let len = self.chunks.values().map(Bytes::len).sum();
        let mut buf = BytesMut::with_capacity(len);
        for chunk in self.chunks.into_values() {
            buf.put_slice(&chunk);
        }
        buf.freeze()
    }
}

/// Rebuilds fragmented messages from radio payloads.
#[derive(Debug)]
pub struct Reassembler {
    config: ReassemblyConfig,
    pending: HashMap<Key, Pending>,
    stats: ReassemblyStats,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(ReassemblyConfig::default())
    }
}

impl Reassembler {
    pub fn new(config: ReassemblyConfig) -> Self {
        Self {
            config,
            pending: HashMap::new(),
            stats: ReassemblyStats::default(),
        }
    }

    pub fn config(&self) -> &ReassemblyConfig {
        &self.config
    }

    pub fn stats(&self) -> ReassemblyStats {
        self.stats
    }

    /// Messages currently awaiting fragments.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Feed one fragment from `source`; returns the message it completes.
    pub fn accept(&mut self, source: PeerAddress, raw: &[u8]) -> Option<Bytes> {
        self.accept_at(source, raw, Instant::now())
    }

    /// [`accept`](Self::accept) with an explicit clock reading.
    pub fn accept_at(&mut self, source: PeerAddress, raw: &[u8], now: Instant) -> Option<Bytes> {
        self.expire(now);

        let (header, chunk) = match FragmentHeader::decode(raw) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.stats.malformed += 1;
                debug!(peer = %source, len = raw.len(), error = %err, "dropping malformed fragment");
                return None;
            }
        };

        let key = (source, header.packet_id);
        if header.sequence as usize >= self.config.max_fragments {
            self.stats.rejected += 1;
            self.pending.remove(&key);
            debug!(
                peer = %source,
                packet_id = header.packet_id,
                sequence = header.sequence,
                max = self.config.max_fragments,
                "fragment beyond ceiling, dropping message"
            );
            return None;
        }

        if self
            .pending
            .get(&key)
            .is_some_and(|pending| pending.conflicts(&header))
        {
            self.stats.restarted += 1;
            self.pending.remove(&key);
            debug!(peer = %source, packet_id = header.packet_id, "restarting reassembly");
        }

        if !self.pending.contains_key(&key) {
            self.make_room();
        }
        let pending = self.pending.entry(key).or_insert_with(|| Pending::new(now));
        pending
            .chunks
            .insert(header.sequence, Bytes::copy_from_slice(chunk));
        if header.is_last() {
            pending.total = Some(header.sequence as usize + 1);
        }
        trace!(
            peer = %source,
            packet_id = header.packet_id,
            sequence = header.sequence,
            held = pending.chunks.len(),
            "fragment stored"
        );

        if !pending.is_complete() {
            return None;
        }
        let pending = self.pending.remove(&key)?;
        let message = pending.assemble();
        self.stats.completed += 1;
        debug!(
            peer = %source,
            packet_id = header.packet_id,
            len = message.len(),
            "message reassembled"
        );
        Some(message)
    }

    /// Drop every message older than the timeout; returns how many went.
    pub fn expire(&mut self, now: Instant) -> usize {
        let timeout = self.config.timeout;
        let before = self.pending.len();
        self.pending
            .retain(|_, pending| now.saturating_duration_since(pending.started) <= timeout);
        let expired = before - self.pending.len();
        if expired > 0 {
            self.stats.expired += expired as u64;
            debug!(expired, "incomplete messages timed out");
        }
        expired
    }

    fn make_room(&mut self) {
        while self.pending.len() >= self.config.max_pending.max(1) {
            let Some(oldest) = self
                .pending
                .iter()
                .min_by_key(|(_, pending)| pending.started)
                .map(|(key, _)| *key)
            else {
                return;
            };
            self.pending.remove(&oldest);
            self.stats.evicted += 1;
            debug!(peer = %oldest.0, packet_id = oldest.1, "evicting oldest pending message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::{FragmentConfig, Fragmenter, FLAG_FIRST, FLAG_LAST};

    const A: PeerAddress = PeerAddress::new([0xaa; 6]);
    const B: PeerAddress = PeerAddress::new([0xbb; 6]);

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    fn split(fragmenter: &mut Fragmenter, data: &[u8]) -> Vec<Bytes> {
        let pieces = fragmenter.fragment(data).unwrap();
        assert!(pieces.len() > 1);
        pieces
    }

    fn fragmenter() -> Fragmenter {
        Fragmenter::new(FragmentConfig::default()).unwrap()
    }

    #[test]
    fn in_order_round_trip() {
        let data = payload(600);
        let pieces = split(&mut fragmenter(), &data);
        let mut r = Reassembler::default();

        assert!(r.accept(A, &pieces[0]).is_none());
        assert!(r.accept(A, &pieces[1]).is_none());
        let message = r.accept(A, &pieces[2]).unwrap();
        assert_eq!(message.as_ref(), data.as_slice());
        assert_eq!(r.pending(), 0);
        assert_eq!(r.stats().completed, 1);
    }

    #[test]
    fn reverse_order_round_trip() {
        let data = payload(2000);
        let pieces = split(&mut fragmenter(), &data);
        let mut r = Reassembler::default();

        let mut out = None;
        for piece in pieces.iter().rev() {
            out = r.accept(A, piece);
        }
        assert_eq!(out.unwrap().as_ref(), data.as_slice());
    }

    #[test]
    fn last_first_then_middle() {
        let data = payload(600);
        let pieces = split(&mut fragmenter(), &data);
        let mut r = Reassembler::default();

        assert!(r.accept(A, &pieces[2]).is_none());
        assert!(r.accept(A, &pieces[0]).is_none());
        let message = r.accept(A, &pieces[1]).unwrap();
        assert_eq!(message.len(), 600);
        assert_eq!(message.as_ref(), data.as_slice());
    }

    #[test]
    fn missing_fragment_yields_nothing() {
        let data = payload(600);
        let pieces = split(&mut fragmenter(), &data);
        let mut r = Reassembler::default();

        assert!(r.accept(A, &pieces[0]).is_none());
        assert!(r.accept(A, &pieces[2]).is_none());
        assert_eq!(r.pending(), 1);
        assert_eq!(r.stats().completed, 0);
    }

    #[test]
    fn completed_message_is_not_replayed() {
        let mut f = fragmenter();
        let first = split(&mut f, &payload(600));
        let mut r = Reassembler::default();
        for piece in &first {
            r.accept(A, piece);
        }
        assert_eq!(r.stats().completed, 1);

        // A lone trailing fragment must not resurrect the finished message.
        assert!(r.accept(A, &first[2]).is_none());

        let second = split(&mut f, &payload(500));
        assert!(r.accept(A, &second[0]).is_none());
        assert!(r.accept(A, &second[2]).is_none());
        assert_eq!(r.stats().completed, 1);
    }

    #[test]
    fn interleaved_senders_kept_apart() {
        let data_a = payload(600);
        let data_b: Vec<u8> = payload(600).iter().map(|b| !b).collect();
        let pieces_a = split(&mut fragmenter(), &data_a);
        let pieces_b = split(&mut fragmenter(), &data_b);
        assert_eq!(
            FragmentHeader::decode(&pieces_a[0]).unwrap().0.packet_id,
            FragmentHeader::decode(&pieces_b[0]).unwrap().0.packet_id
        );

        let mut r = Reassembler::default();
        r.accept(A, &pieces_a[0]);
        r.accept(B, &pieces_b[0]);
        r.accept(B, &pieces_b[1]);
        r.accept(A, &pieces_a[1]);
        assert_eq!(r.accept(B, &pieces_b[2]).unwrap().as_ref(), data_b.as_slice());
        assert_eq!(r.accept(A, &pieces_a[2]).unwrap().as_ref(), data_a.as_slice());
    }

    #[test]
    fn new_first_fragment_restarts_buffer() {
        let mut r = Reassembler::default();
        r.accept(A, &[FLAG_FIRST, 0, 9, 0, b'o', b'l', b'd']);
        r.accept(A, &[FLAG_FIRST, 0, 9, 0, b'n', b'e', b'w']);
        let message = r.accept(A, &[FLAG_LAST, 0, 9, 1, b'!']).unwrap();
        assert_eq!(message.as_ref(), b"new!");
        assert_eq!(r.stats().restarted, 1);
    }

    #[test]
    fn contradicting_total_restarts_buffer() {
        let mut r = Reassembler::default();
        r.accept(A, &[FLAG_LAST, 0, 3, 2, b'c']);
        // A last fragment at sequence 1 cannot belong with one at sequence 2.
        r.accept(A, &[FLAG_LAST, 0, 3, 1, b'b']);
        let message = r.accept(A, &[FLAG_FIRST, 0, 3, 0, b'a']).unwrap();
        assert_eq!(message.as_ref(), b"ab");
        assert_eq!(r.stats().restarted, 1);
    }

    #[test]
    fn malformed_fragments_are_counted() {
        let mut r = Reassembler::default();
        assert!(r.accept(A, &[FLAG_FIRST, 0]).is_none());
        assert!(r.accept(A, &[0x7E, 0, 1, 0, 1]).is_none());
        assert!(r.accept(A, &[FLAG_FIRST, 0, 1, 3, 1]).is_none());
        assert_eq!(r.stats().malformed, 3);
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn sequence_over_ceiling_drops_message() {
        let mut r = Reassembler::new(ReassemblyConfig {
            max_fragments: 4,
            ..ReassemblyConfig::default()
        });
        r.accept(A, &[FLAG_FIRST, 0, 5, 0, 1]);
        assert_eq!(r.pending(), 1);
        assert!(r.accept(A, &[0, 0, 5, 4, 2]).is_none());
        assert_eq!(r.pending(), 0);
        assert_eq!(r.stats().rejected, 1);
    }

    #[test]
    fn stale_messages_expire() {
        let mut r = Reassembler::default();
        let start = Instant::now();
        r.accept_at(A, &[FLAG_FIRST, 0, 1, 0, 1], start);
        assert_eq!(r.pending(), 1);

        let late = start + DEFAULT_REASSEMBLY_TIMEOUT + Duration::from_millis(1);
        assert!(r.accept_at(A, &[FLAG_LAST, 0, 1, 1, 2], late).is_none());
        assert_eq!(r.stats().expired, 1);
        assert_eq!(r.pending(), 1);
    }

    #[test]
    fn oldest_pending_is_evicted_at_capacity() {
        let mut r = Reassembler::new(ReassemblyConfig {
            max_pending: 2,
            ..ReassemblyConfig::default()
        });
        let start = Instant::now();
        r.accept_at(A, &[FLAG_FIRST, 0, 1, 0, b'x'], start);
        r.accept_at(A, &[FLAG_FIRST, 0, 2, 0, b'y'], start + Duration::from_millis(1));
        r.accept_at(A, &[FLAG_FIRST, 0, 3, 0, b'z'], start + Duration::from_millis(2));
        assert_eq!(r.pending(), 2);
        assert_eq!(r.stats().evicted, 1);

        let now = start + Duration::from_millis(3);
        assert!(r.accept_at(A, &[FLAG_LAST, 0, 1, 1, b'!'], now).is_none());
        assert_eq!(
            r.accept_at(A, &[FLAG_LAST, 0, 3, 1, b'!'], now)
                .unwrap()
                .as_ref(),
            b"z!"
        );
    }
}
