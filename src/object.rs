//! The object lifecycle state machine (spec §3, §4.2) shared by every
//! resource kind in this crate. Grounded on the teacher's convention of a
//! small plain-old-data header embedded in every Vulkan wrapper
//! (`backend::vulkan::{Device, Buffer, Image, ...}` each carry their own
//! ad hoc "is this destroyed yet" bookkeeping via `Drop`); here that is
//! unified into one `Object` type so every resource gets the same
//! precondition asserts and the same idempotent-destroy guarantee for free.

use std::fmt;

/// One of the state tags from spec §3. `None` is the Rust keyword, so the
/// "no state yet" variant is named `Uninit` (the teacher never needs this
/// variant because Rust's ownership already prevents use of a
/// not-yet-constructed value; it exists here because resources such as
/// `Descriptors` are built via a sequence of setters before `create`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Uninit,
    Init,
    Allocated,
    Created,
    NeedUpdate,
    NeedRecreate,
    NeedDestroy,
    Destroyed,
    Invalid,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Uninit => "uninit",
            State::Init => "init",
            State::Allocated => "allocated",
            State::Created => "created",
            State::NeedUpdate => "need-update",
            State::NeedRecreate => "need-recreate",
            State::NeedDestroy => "need-destroy",
            State::Destroyed => "destroyed",
            State::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

/// The type tag from spec §3, used only for log messages — dispatch on the
/// resource's own Rust type already gives us the sum-type behavior spec §9
/// asks for, so this is diagnostic metadata rather than a dynamic-dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Host,
    Gpu,
    Window,
    Swapchain,
    Buffer,
    Image,
    Sampler,
    DescriptorSlots,
    Descriptors,
    Compute,
    Graphics,
    Barrier,
    Semaphores,
    Fences,
    Renderpass,
    Framebuffers,
    Commands,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Embedded in every resource wrapper. Transition helpers assert
/// preconditions (a caller bug aborts, per spec §7) and return `&mut self`
/// for chaining the way the teacher chains its `InstanceBuilder` setters.
#[derive(Debug, Clone, Copy)]
pub struct Object {
    pub kind: Kind,
    state: State,
}

impl Object {
    pub fn new(kind: Kind) -> Self {
        Self { kind, state: State::Uninit }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn init(&mut self) -> &mut Self {
        assert!(
            matches!(self.state, State::Uninit | State::Destroyed),
            "{}: init() called from state {}",
            self.kind,
            self.state
        );
        self.state = State::Init;
        self
    }

    pub fn allocated(&mut self) -> &mut Self {
        assert!(
            matches!(self.state, State::Init),
            "{}: allocated() called from state {}",
            self.kind,
            self.state
        );
        self.state = State::Allocated;
        self
    }

    pub fn created(&mut self) -> &mut Self {
        assert!(
            matches!(self.state, State::Init | State::Allocated | State::NeedRecreate),
            "{}: created() called from state {}",
            self.kind,
            self.state
        );
        self.state = State::Created;
        self
    }

    /// Descriptor bindings were mutated; the caller must flush before the
    /// next draw (spec §4.6).
    pub fn need_update(&mut self) -> &mut Self {
        assert!(
            matches!(self.state, State::Created | State::NeedUpdate),
            "{}: need_update() called from state {}",
            self.kind,
            self.state
        );
        self.state = State::NeedUpdate;
        self
    }

    /// The surface was resized; the swapchain and dependents must be rebuilt
    /// on the next loop tick (spec §4.9).
    pub fn need_recreate(&mut self) -> &mut Self {
        assert!(
            matches!(self.state, State::Created | State::NeedRecreate),
            "{}: need_recreate() called from state {}",
            self.kind,
            self.state
        );
        self.state = State::NeedRecreate;
        self
    }

    pub fn need_destroy(&mut self) -> &mut Self {
        self.state = State::NeedDestroy;
        self
    }

    pub fn invalid(&mut self) -> &mut Self {
        self.state = State::Invalid;
        self
    }

    /// Idempotent destroy (spec §4.2): returns `true` the first time so the
    /// caller runs its teardown code exactly once; subsequent calls log at
    /// trace and return `false` so cascades never double-free.
    pub fn destroy(&mut self) -> bool {
        if self.state == State::Destroyed {
            log::trace!("{}: destroy() on already-destroyed object, ignoring", self.kind);
            return false;
        }
        self.state = State::Destroyed;
        true
    }

    pub fn is_created(&self) -> bool {
        matches!(self.state, State::Created | State::NeedUpdate | State::NeedRecreate)
    }

    pub fn assert_created(&self) {
        assert!(self.is_created(), "{}: expected created, got {}", self.kind, self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let mut obj = Object::new(Kind::Buffer);
        assert_eq!(obj.state(), State::Uninit);
        obj.init().allocated().created();
        assert_eq!(obj.state(), State::Created);
        assert!(obj.is_created());
    }

    #[test]
    fn reactive_states_round_trip() {
        let mut obj = Object::new(Kind::Descriptors);
        obj.init().created();
        obj.need_update();
        assert_eq!(obj.state(), State::NeedUpdate);
        assert!(obj.is_created());
    }

    #[test]
    fn destroy_is_idempotent() {
        let mut obj = Object::new(Kind::Swapchain);
        obj.init().created();
        assert!(obj.destroy());
        assert!(!obj.destroy());
        assert_eq!(obj.state(), State::Destroyed);
    }

    #[test]
    #[should_panic]
    fn created_from_uninit_panics() {
        let mut obj = Object::new(Kind::Buffer);
        obj.created();
    }
}
