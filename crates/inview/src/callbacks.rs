//! Enter/exit callbacks and the shared transition rule
//!
//! Both engines track a [`Presence`] per element and only fire on a genuine
//! flip, so duplicate or coalesced notifications are harmless.

use smallvec::SmallVec;
use std::cell::RefCell;
use std::rc::Rc;

/// Zero-argument enter or exit callback
pub type Callback = Rc<dyn Fn()>;

/// Callback set shared between an engine's registry and its live watchers
pub type SharedCallbacks = Rc<RefCell<CallbackSet>>;

/// Edge fired when an element's in-viewport state flips
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Enter,
    Exit,
}

/// Last known in-viewport state of one watched element
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Presence {
    inside: bool,
}

impl Presence {
    pub fn is_inside(&self) -> bool {
        self.inside
    }

    /// Record a fresh observation, returning the edge it produced
    pub fn update(&mut self, inside: bool) -> Option<Transition> {
        if inside == self.inside {
            return None;
        }
        self.inside = inside;
        Some(if inside {
            Transition::Enter
        } else {
            Transition::Exit
        })
    }
}

/// Enter and exit callbacks attached to one element
#[derive(Clone, Default)]
pub struct CallbackSet {
    enter: SmallVec<[Callback; 2]>,
    exit: SmallVec<[Callback; 2]>,
}

impl CallbackSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(enter: Callback, exit: Callback) -> Self {
        let mut set = Self::new();
        set.add_enter(enter);
        set.add_exit(exit);
        set
    }

    /// Attach an enter callback; an `Rc` already attached is ignored
    pub fn add_enter(&mut self, callback: Callback) {
        push_unique(&mut self.enter, callback);
    }

    /// Attach an exit callback; an `Rc` already attached is ignored
    pub fn add_exit(&mut self, callback: Callback) {
        push_unique(&mut self.exit, callback);
    }

    /// Fold another set into this one, keeping attach order
    pub fn merge(&mut self, other: &CallbackSet) {
        for callback in &other.enter {
            self.add_enter(callback.clone());
        }
        for callback in &other.exit {
            self.add_exit(callback.clone());
        }
    }

    pub fn enter_count(&self) -> usize {
        self.enter.len()
    }

    pub fn exit_count(&self) -> usize {
        self.exit.len()
    }

    /// Callbacks to run for `transition`, cloned out of the set
    pub fn for_transition(&self, transition: Transition) -> SmallVec<[Callback; 2]> {
        match transition {
            Transition::Enter => self.enter.clone(),
            Transition::Exit => self.exit.clone(),
        }
    }

    pub fn into_shared(self) -> SharedCallbacks {
        Rc::new(RefCell::new(self))
    }
}

impl std::fmt::Debug for CallbackSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSet")
            .field("enter", &self.enter.len())
            .field("exit", &self.exit.len())
            .finish()
    }
}

fn push_unique(list: &mut SmallVec<[Callback; 2]>, callback: Callback) {
    if !list.iter().any(|existing| Rc::ptr_eq(existing, &callback)) {
        list.push(callback);
    }
}

/// Run the callbacks for `transition`
///
/// The set is only borrowed while cloning the list out, so a callback may
/// attach further callbacks or unwatch its own element.
pub fn fire(callbacks: &SharedCallbacks, transition: Transition) {
    let pending = callbacks.borrow().for_transition(transition);
    for callback in pending {
        callback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, Callback) {
        let count = Rc::new(Cell::new(0));
        let handle = count.clone();
        (count, Rc::new(move || handle.set(handle.get() + 1)))
    }

    #[test]
    fn test_presence_fires_only_on_flips() {
        let mut presence = Presence::default();

        assert_eq!(presence.update(false), None);
        assert_eq!(presence.update(true), Some(Transition::Enter));
        assert_eq!(presence.update(true), None);
        assert_eq!(presence.update(false), Some(Transition::Exit));
        assert_eq!(presence.update(false), None);
        assert!(!presence.is_inside());
    }

    #[test]
    fn test_same_callback_is_attached_once() {
        let (_, enter) = counter();
        let mut set = CallbackSet::new();
        set.add_enter(enter.clone());
        set.add_enter(enter);

        assert_eq!(set.enter_count(), 1);
    }

    #[test]
    fn test_merge_keeps_existing_and_adds_new() {
        let (_, enter) = counter();
        let (_, exit) = counter();
        let (_, extra) = counter();

        let mut set = CallbackSet::with(enter.clone(), exit.clone());
        let mut other = CallbackSet::with(enter, exit);
        other.add_enter(extra);
        set.merge(&other);

        assert_eq!(set.enter_count(), 2);
        assert_eq!(set.exit_count(), 1);
    }

    #[test]
    fn test_fire_runs_matching_list() {
        let (entered, enter) = counter();
        let (exited, exit) = counter();
        let shared = CallbackSet::with(enter, exit).into_shared();

        fire(&shared, Transition::Enter);
        fire(&shared, Transition::Enter);
        fire(&shared, Transition::Exit);

        assert_eq!(entered.get(), 2);
        assert_eq!(exited.get(), 1);
    }

    #[test]
    fn test_callback_may_extend_set_while_firing() {
        let shared = CallbackSet::new().into_shared();
        let (late_count, late) = counter();

        let target = shared.clone();
        shared.borrow_mut().add_enter(Rc::new(move || {
            target.borrow_mut().add_enter(late.clone());
        }));

        fire(&shared, Transition::Enter);
        assert_eq!(late_count.get(), 0);
        fire(&shared, Transition::Enter);
        assert_eq!(late_count.get(), 1);
    }
}
