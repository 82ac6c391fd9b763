//! Context table - registry of pending calls keyed by opaque tokens
//!
//! Only the [`Token`] ever crosses the foreign boundary. The [`PendingCall`]
//! it names, including the sending half of the caller's result slot, stays
//! in the table until it is retired exactly once.
//!
//! Tokens are generation-checked slot handles packed into one pointer-sized
//! value:
//!
//! ```text
//!  63        48 47             24 23              0
//! +------------+-----------------+-----------------+
//! |  table id  |   generation    |   slot index    |
//! +------------+-----------------+-----------------+
//! ```
//!
//! Retiring a slot bumps its generation, so a stale or duplicated token never
//! matches the slot's next occupant. A table id is reused only after the old
//! table is gone, and the new table starts its generations past every
//! generation the old one issued.

use crate::async_runtime::future::{Completion, Outcome};
use crate::error::{BridgeError, BridgeResult};
use crate::ffi::types::Shape;
use handoff_config::{DEFAULT_MAX_PENDING, MAX_PENDING_LIMIT};
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU64;
use std::os::raw::c_void;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::time::Instant;
use tokio::sync::oneshot;

#[cfg(not(target_pointer_width = "64"))]
compile_error!("handoff tokens are packed into 64-bit pointers");

const INDEX_BITS: u32 = 24;
const GENERATION_BITS: u32 = 24;
const INDEX_MASK: u64 = (1 << INDEX_BITS) - 1;
const GENERATION_MASK: u64 = (1 << GENERATION_BITS) - 1;

/// Opaque handle for one pending call
///
/// Never zero, so a null `void*` handle is always rejected.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(NonZeroU64);

impl Token {
    fn pack(table_id: u16, generation: u32, index: u32) -> Option<Token> {
        let raw = (u64::from(table_id) << (INDEX_BITS + GENERATION_BITS))
            | ((u64::from(generation) & GENERATION_MASK) << INDEX_BITS)
            | (u64::from(index) & INDEX_MASK);
        NonZeroU64::new(raw).map(Token)
    }

    pub fn table_id(&self) -> u16 {
        (self.0.get() >> (INDEX_BITS + GENERATION_BITS)) as u16
    }

    pub fn generation(&self) -> u32 {
        ((self.0.get() >> INDEX_BITS) & GENERATION_MASK) as u32
    }

    pub fn index(&self) -> u32 {
        (self.0.get() & INDEX_MASK) as u32
    }

    pub fn to_bits(&self) -> u64 {
        self.0.get()
    }

    pub fn from_bits(bits: u64) -> Option<Token> {
        NonZeroU64::new(bits).map(Token)
    }

    /// Encode as the `void*` handle passed to foreign code
    pub fn into_raw(self) -> *mut c_void {
        self.0.get() as usize as *mut c_void
    }

    /// Decode a handle received from foreign code; `None` for null
    pub fn from_raw(handle: *mut c_void) -> Option<Token> {
        Self::from_bits(handle as usize as u64)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(table={}, gen={}, slot={})",
            self.table_id(),
            self.generation(),
            self.index()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0.get())
    }
}

/// Write-once result slot of a pending call
pub struct ResultSlot {
    tx: Option<oneshot::Sender<Outcome>>,
}

impl ResultSlot {
    fn new(tx: oneshot::Sender<Outcome>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn is_resolved(&self) -> bool {
        self.tx.is_none()
    }

    /// Deliver the outcome. A second resolution is an internal fault.
    fn resolve(&mut self, token: Token, outcome: Outcome) -> BridgeResult<()> {
        let tx = self.tx.take().ok_or_else(|| {
            BridgeError::InternalFault(format!("call {} resolved twice", token))
        })?;
        if tx.send(outcome).is_err() {
            // The caller dropped its completion; nothing is waiting.
            tracing::debug!(token = %token, "completion dropped before resolution");
        }
        Ok(())
    }
}

/// One outstanding asynchronous operation
pub struct PendingCall {
    token: Token,
    shape: Shape,
    slot: ResultSlot,
    registered_at: Instant,
}

impl PendingCall {
    pub fn token(&self) -> Token {
        self.token
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.is_resolved()
    }

    /// Resolve the result slot with the call's outcome
    pub fn resolve(&mut self, outcome: Outcome) -> BridgeResult<()> {
        let elapsed = self.registered_at.elapsed();
        let ok = outcome.is_ok();
        self.slot.resolve(self.token, outcome)?;
        tracing::debug!(token = %self.token, shape = %self.shape, ok, ?elapsed, "call resolved");
        Ok(())
    }
}

impl fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCall")
            .field("token", &self.token)
            .field("shape", &self.shape)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

struct Slot {
    generation: u32,
    call: Option<PendingCall>,
}

struct Slots {
    entries: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    /// Generation given to newly pushed slots
    first_generation: u32,
    /// Furthest any slot has advanced past `first_generation`
    advance: u32,
}

impl Slots {
    fn new(first_generation: u32) -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            live: 0,
            first_generation,
            advance: 0,
        }
    }

    fn note_generation(&mut self, generation: u32) {
        let advance = generation.wrapping_sub(self.first_generation) & GENERATION_MASK as u32;
        self.advance = self.advance.max(advance);
    }

    /// First generation the id's next table may use
    fn generation_floor(&self) -> u32 {
        next_generation((self.first_generation + self.advance) & GENERATION_MASK as u32)
    }
}

/// Directory entry for one table id
struct Registration {
    /// `None` once the table has been dropped and the id can be reused
    table: Option<Weak<ContextTable>>,
    /// Generation the id's next table starts from
    generation_floor: u32,
}

/// Process-wide directory routing a table id to its live table
fn directory() -> &'static Mutex<HashMap<u16, Registration>> {
    static DIRECTORY: OnceLock<Mutex<HashMap<u16, Registration>>> = OnceLock::new();
    DIRECTORY.get_or_init(|| Mutex::new(HashMap::new()))
}

static NEXT_TABLE_ID: AtomicU16 = AtomicU16::new(1);

/// Registry of pending calls
///
/// `register` and `retire` take a short internal lock around the slot
/// storage only; no lock is held while foreign code runs or while a result
/// is delivered.
pub struct ContextTable {
    id: u16,
    max_pending: usize,
    slots: Mutex<Slots>,
}

impl ContextTable {
    /// Create a table with the default outstanding-call limit
    pub fn new() -> BridgeResult<Arc<ContextTable>> {
        Self::with_capacity(DEFAULT_MAX_PENDING)
    }

    /// Create a table allowing at most `max_pending` outstanding calls
    pub fn with_capacity(max_pending: usize) -> BridgeResult<Arc<ContextTable>> {
        if max_pending == 0 || max_pending > MAX_PENDING_LIMIT {
            return Err(BridgeError::EncodeFailure(format!(
                "max_pending must be between 1 and {}, got {}",
                MAX_PENDING_LIMIT, max_pending
            )));
        }

        let mut dir = directory().lock().unwrap_or_else(PoisonError::into_inner);
        // An id stays taken until its table's drop has recorded the floor.
        let id = (0..=u16::MAX)
            .map(|_| NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed))
            .find(|id| *id != 0 && dir.get(id).map_or(true, |entry| entry.table.is_none()))
            .ok_or_else(|| BridgeError::InternalFault("no free context table ids".into()))?;
        let first_generation = dir.get(&id).map_or(1, |entry| entry.generation_floor);

        let table = Arc::new(ContextTable {
            id,
            max_pending,
            slots: Mutex::new(Slots::new(first_generation)),
        });
        dir.insert(
            id,
            Registration {
                table: Some(Arc::downgrade(&table)),
                generation_floor: first_generation,
            },
        );
        tracing::debug!(table = id, first_generation, max_pending, "context table created");
        Ok(table)
    }

    /// Find the live table a token was issued by
    pub fn route(token: Token) -> Option<Arc<ContextTable>> {
        let dir = directory().lock().unwrap_or_else(PoisonError::into_inner);
        dir.get(&token.table_id())
            .and_then(|entry| entry.table.as_ref())
            .and_then(Weak::upgrade)
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    /// Number of calls registered and not yet retired
    pub fn pending(&self) -> usize {
        self.lock().live
    }

    /// Register a new pending call expecting a result of `shape`
    ///
    /// Returns the token to hand to foreign code and the completion the
    /// caller awaits.
    pub fn register(&self, shape: Shape) -> BridgeResult<(Token, Completion)> {
        let (tx, rx) = oneshot::channel();

        let token = {
            let mut slots = self.lock();
            if slots.live >= self.max_pending {
                return Err(BridgeError::EncodeFailure(format!(
                    "context table full ({} calls pending)",
                    slots.live
                )));
            }

            let index = match slots.free.pop() {
                Some(index) => index,
                None => {
                    let index = slots.entries.len() as u32;
                    let generation = slots.first_generation;
                    slots.entries.push(Slot {
                        generation,
                        call: None,
                    });
                    index
                }
            };

            let generation = slots.entries[index as usize].generation;
            slots.note_generation(generation);
            let token = Token::pack(self.id, generation, index).ok_or_else(|| {
                BridgeError::InternalFault("minted a null token".to_string())
            })?;
            slots.entries[index as usize].call = Some(PendingCall {
                token,
                shape,
                slot: ResultSlot::new(tx),
                registered_at: Instant::now(),
            });
            slots.live += 1;
            token
        };

        tracing::debug!(token = %token, %shape, "call registered");
        Ok((token, Completion::new(token, rx)))
    }

    /// Atomically remove and return the pending call for `token`
    ///
    /// Exactly one caller can retire a given token; every other attempt,
    /// including any later one, fails with `UnknownToken`.
    pub fn retire(&self, token: Token) -> BridgeResult<PendingCall> {
        if token.table_id() != self.id {
            return Err(BridgeError::UnknownToken(token));
        }

        let mut slots = self.lock();
        let slot = slots
            .entries
            .get_mut(token.index() as usize)
            .filter(|slot| slot.generation == token.generation())
            .ok_or(BridgeError::UnknownToken(token))?;
        let call = slot.call.take().ok_or(BridgeError::UnknownToken(token))?;

        slot.generation = next_generation(slot.generation);
        slots.free.push(token.index());
        slots.live -= 1;
        drop(slots);

        tracing::debug!(token = %token, "call retired");
        Ok(call)
    }

    /// Retire `token` locally and resolve it as cancelled
    ///
    /// A callback that arrives later observes `UnknownToken` and is dropped.
    pub fn cancel(&self, token: Token) -> BridgeResult<()> {
        let mut call = self.retire(token)?;
        call.resolve(Err(BridgeError::Cancelled(token)))
    }

    /// Retire every outstanding call, resolving each with `Shutdown`
    pub fn drain(&self) -> usize {
        let calls: Vec<PendingCall> = {
            let mut slots = self.lock();
            let mut calls = Vec::with_capacity(slots.live);
            let mut freed = Vec::new();
            for (index, slot) in slots.entries.iter_mut().enumerate() {
                if let Some(call) = slot.call.take() {
                    slot.generation = next_generation(slot.generation);
                    freed.push(index as u32);
                    calls.push(call);
                }
            }
            slots.free.extend(freed);
            slots.live = 0;
            calls
        };

        let drained = calls.len();
        for mut call in calls {
            if let Err(fault) = call.resolve(Err(BridgeError::Shutdown)) {
                tracing::error!(error = %fault, "failed to resolve drained call");
            }
        }
        if drained > 0 {
            tracing::debug!(table = self.id, drained, "context table drained");
        }
        drained
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ContextTable {
    fn drop(&mut self) {
        let floor = self
            .slots
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .generation_floor();
        let mut dir = directory().lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = dir.get_mut(&self.id) {
            entry.table = None;
            entry.generation_floor = floor;
        }
    }
}

impl fmt::Debug for ContextTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextTable")
            .field("id", &self.id)
            .field("max_pending", &self.max_pending)
            .field("pending", &self.pending())
            .finish()
    }
}

fn next_generation(generation: u32) -> u32 {
    let next = (generation + 1) & GENERATION_MASK as u32;
    if next == 0 {
        1
    } else {
        next
    }
}
