//! Opaque, per-message position tokens.
//!
//! A [`Bookmark`] is a value type embedded directly in an [`crate::ack_tracker::store::Record`]
//! slot — it is never heap-allocated on its own, mirroring `struct _Bookmark` in
//! `bookmark.h` of the original source, which is deliberately sized and aligned so it
//! can live inline in an array.

use std::mem::{align_of, size_of};
use std::sync::{Arc, Weak};

/// Upper bound on the opaque position payload a bookmark can carry, mirroring
/// `MAX_BOOKMARK_DATA_LENGTH` (`128 - 4*sizeof(void*)`) from `bookmark.h`.
pub const MAX_BOOKMARK_DATA_LEN: usize = 128 - 4 * size_of::<usize>();

/// A fixed-capacity byte container for a transport's opaque position (file offset,
/// sequence number, journal cursor, ...).
///
/// The container only ever stores `Copy` values no larger than
/// [`MAX_BOOKMARK_DATA_LEN`]; writing a larger value is a programmer error and panics,
/// the same way an oversized `BookmarkContainer` write would corrupt a neighboring
/// record in the original C implementation.
#[derive(Clone, Copy)]
pub struct BookmarkContainer {
    data: [u8; MAX_BOOKMARK_DATA_LEN],
    len: usize,
}

impl Default for BookmarkContainer {
    fn default() -> Self {
        Self {
            data: [0u8; MAX_BOOKMARK_DATA_LEN],
            len: 0,
        }
    }
}

impl BookmarkContainer {
    /// Stores `value` as the position payload, overwriting whatever was there before.
    pub fn set<T: Copy>(&mut self, value: T) {
        let size = size_of::<T>();
        assert!(
            size <= MAX_BOOKMARK_DATA_LEN,
            "bookmark payload of {size} bytes exceeds the {MAX_BOOKMARK_DATA_LEN}-byte container"
        );
        // SAFETY: `T: Copy` guarantees no drop glue, and the size check above
        // guarantees the byte-level copy stays within `self.data`.
        unsafe {
            std::ptr::copy_nonoverlapping(
                (&value as *const T).cast::<u8>(),
                self.data.as_mut_ptr(),
                size,
            );
        }
        self.len = size;
    }

    /// Reads back the payload previously stored with [`Self::set`].
    ///
    /// Panics if nothing of the requested type's size was ever stored — this is a
    /// programmer error (reading a bookmark that was never filled in).
    pub fn get<T: Copy>(&self) -> T {
        assert_eq!(
            self.len,
            size_of::<T>(),
            "bookmark container holds {} bytes, not a {}-byte value",
            self.len,
            size_of::<T>()
        );
        // SAFETY: length matches, and `set` never wrote more than the buffer size.
        unsafe { std::ptr::read((self.data.as_ptr()).cast::<T>()) }
    }

    pub fn is_set(&self) -> bool {
        self.len > 0
    }
}

// The container must be pointer-size aligned so a `Bookmark` can be embedded in an
// array and addressed by offset without triggering unaligned-access faults on strict
// platforms. `Bookmark` itself is `repr(Rust)`, so this assertion is the load-bearing
// guarantee, not a hint to the optimizer.
const _: () = assert!(align_of::<Bookmark>() >= align_of::<usize>());

/// Opaque handle to whatever object ultimately durably stores bookmark positions.
///
/// The core never downcasts or inspects this; it only holds it so a `save`/`destroy`
/// callback installed by the transport can access it, and so the bookmark can be
/// introspected by tests. A weak handle is used deliberately: the persistent-state
/// object outlives individual bookmarks, and the core must never be the reason it
/// stays alive (mirrors `self->bookmark.persist_state = ...->cfg->state` in
/// `late_ack_tracker.c`, which stores a raw non-owning pointer).
pub type PersistStateHandle = Weak<dyn std::any::Any + Send + Sync>;

/// Returns whether the write succeeded, so the caller can distinguish a
/// persistence failure from a routine save.
pub type SaveFn = Box<dyn FnMut(&BookmarkContainer, Option<&PersistStateHandle>) -> bool + Send>;
pub type DestroyFn = Box<dyn FnMut(&mut BookmarkContainer) + Send>;

/// A position token plus the behavior needed to persist and release it.
///
/// Two invariants, enforced by the ack-tracker store rather than by `Bookmark` itself
/// (the type can't know whether it is the tail of a contiguous acked prefix):
///   * `save` is called at most once per record, and only when that record is the
///     tail of a contiguous acked prefix.
///   * `destroy` is called exactly once, immediately before the slot is reused.
pub struct Bookmark {
    persist_state: Option<PersistStateHandle>,
    save: Option<SaveFn>,
    destroy: Option<DestroyFn>,
    container: BookmarkContainer,
}

impl Bookmark {
    /// Zeroes callbacks and the persistent-state handle (`bookmark_init` in the
    /// original source).
    pub fn init() -> Self {
        Self {
            persist_state: None,
            save: None,
            destroy: None,
            container: BookmarkContainer::default(),
        }
    }

    /// Binds this bookmark to a persistent-state object, without taking ownership.
    pub fn set_persist_state(&mut self, handle: &Arc<dyn std::any::Any + Send + Sync>) {
        self.persist_state = Some(Arc::downgrade(handle));
    }

    /// Installs the transport-provided `save`/`destroy` behavior. Called once per
    /// slot, right after `request_bookmark` hands the bookmark back to the source.
    pub fn install(&mut self, save: SaveFn, destroy: DestroyFn) {
        self.save = Some(save);
        self.destroy = Some(destroy);
    }

    /// Writes the transport's opaque position into the container.
    pub fn write_position<T: Copy>(&mut self, position: T) {
        self.container.set(position);
    }

    /// Reads the position previously written with [`Self::write_position`].
    pub fn read_position<T: Copy>(&self) -> T {
        self.container.get()
    }

    /// Best-effort, idempotent persistence of the stored position. A failure here must
    /// never abort the process: callers are expected to log through
    /// [`crate::internal_events::SourceInternalEvents::emit_persistence_failure`] and
    /// move on, because the next successful save for a later record supersedes this
    /// one regardless. Returns `true` on success (or when no `save` callback was ever
    /// installed -- there is nothing to persist, which is not a failure).
    pub(crate) fn save(&mut self) -> bool {
        match self.save.as_mut() {
            Some(save) => (save)(&self.container, self.persist_state.as_ref()),
            None => true,
        }
    }

    /// Releases auxiliary state exactly once. Safe to call on a bookmark whose `save`
    /// was never invoked — dropping without persisting is a normal outcome for
    /// `Aborted` acks.
    pub(crate) fn destroy(&mut self) {
        if let Some(mut destroy) = self.destroy.take() {
            destroy(&mut self.container);
        }
    }
}

impl Drop for Bookmark {
    fn drop(&mut self) {
        self.destroy();
    }
}
