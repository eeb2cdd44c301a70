use std::time::{Duration, Instant};

use nsm_types::Uoid;

use crate::address::{CellAddress, CellPath};

/// TTL headroom is ten percent of the TTL, capped at this value.
const MAX_TTL_HEADROOM: Duration = Duration::from_secs(10);

/// An addressed message.
///
/// The UOID is assigned at construction and survives [`revert_direction`],
/// so a reply carries the id of the request it answers in `last_uoid`.
/// Cloning an envelope is how a message is forwarded to more than one place.
///
/// [`revert_direction`]: Envelope::revert_direction
#[derive(Debug, Clone)]
pub struct Envelope<M> {
    payload: M,
    source: CellPath,
    destination: CellPath,
    uoid: Uoid,
    last_uoid: Option<Uoid>,
    ttl: Option<Duration>,
    arrived_at: Instant,
    is_reply: bool,
}

impl<M> Envelope<M> {
    pub fn new(destination: impl Into<CellPath>, payload: M) -> Self {
        Self {
            payload,
            source: CellPath::empty(),
            destination: destination.into(),
            uoid: Uoid::next(),
            last_uoid: None,
            ttl: None,
            arrived_at: Instant::now(),
            is_reply: false,
        }
    }

    /// A fresh reply envelope answering `request`, e.g. one chunk of a
    /// streamed answer. The request itself is left untouched.
    pub fn answering<R>(request: &Envelope<R>, payload: M) -> Self {
        Self {
            payload,
            source: CellPath::empty(),
            destination: request.source.revert(),
            uoid: request.uoid,
            last_uoid: Some(request.uoid),
            ttl: None,
            arrived_at: Instant::now(),
            is_reply: true,
        }
    }

    pub fn payload(&self) -> &M {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut M {
        &mut self.payload
    }

    pub fn into_payload(self) -> M {
        self.payload
    }

    pub fn set_payload(&mut self, payload: M) {
        self.payload = payload;
    }

    pub fn source(&self) -> &CellPath {
        &self.source
    }

    pub fn destination(&self) -> &CellPath {
        &self.destination
    }

    /// Record that the envelope left through `hop`.
    pub fn add_source_hop(&mut self, hop: CellAddress) {
        self.source.add(hop);
    }

    pub fn uoid(&self) -> Uoid {
        self.uoid
    }

    /// UOID of the request this envelope answers.
    pub fn last_uoid(&self) -> Option<Uoid> {
        self.last_uoid
    }

    pub fn is_reply(&self) -> bool {
        self.is_reply
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn set_ttl(&mut self, ttl: Option<Duration>) {
        self.ttl = ttl;
    }

    /// Turn a request into its reply in place.
    pub fn revert_direction(&mut self) {
        self.destination = self.source.revert();
        self.source = CellPath::empty();
        self.last_uoid = Some(self.uoid);
        self.is_reply = true;
    }

    /// Restart the local-age clock; called when the envelope enters a cell.
    pub fn mark_arrived(&mut self) {
        self.arrived_at = Instant::now();
    }

    /// Time since the envelope entered the current cell.
    pub fn local_age(&self) -> Duration {
        self.arrived_at.elapsed()
    }

    /// TTL minus the smaller of ten percent and ten seconds. `None` means
    /// the envelope never expires.
    pub fn adjusted_ttl(&self) -> Option<Duration> {
        self.ttl
            .map(|ttl| ttl.saturating_sub((ttl / 10).min(MAX_TTL_HEADROOM)))
    }

    /// Whether the envelope outlived its adjusted TTL in this cell.
    pub fn is_expired(&self) -> bool {
        match self.adjusted_ttl() {
            Some(limit) => self.local_age() > limit,
            None => false,
        }
    }

    /// Time left before the adjusted TTL runs out in this cell.
    pub fn remaining(&self) -> Option<Duration> {
        self.adjusted_ttl()
            .map(|limit| limit.saturating_sub(self.local_age()))
    }
}
