/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use tracing::trace;

use super::Behavior;
use crate::common::UnbecomePolicy;

/// An actor's current and previous behaviors.
///
/// The top of the stack is the active behavior. Popped behaviors are not dropped in
/// place: the handler that called `unbecome` may be running from the popped behavior,
/// so popped entries move to an erased list that [`cleanup`](Self::cleanup) frees once
/// the dispatch frame has returned.
#[derive(Debug, Default)]
pub struct BehaviorStack {
    elements: Vec<Behavior>,
    erased: Vec<Behavior>,
    terminated: bool,
    policy: UnbecomePolicy,
}

impl BehaviorStack {
    /// An empty stack that applies `policy` to `unbecome` on the last element.
    pub fn new(policy: UnbecomePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Pushes `behavior` on top.
    ///
    /// # Panics
    ///
    /// Panics once the stack has been terminated.
    pub fn push(&mut self, behavior: Behavior) {
        assert!(!self.terminated, "become called after the actor exited");
        self.elements.push(behavior);
    }

    /// Replaces the top with `behavior`, retiring the old top.
    ///
    /// # Panics
    ///
    /// Panics once the stack has been terminated.
    pub fn replace(&mut self, behavior: Behavior) {
        assert!(!self.terminated, "become called after the actor exited");
        if let Some(previous) = self.elements.pop() {
            self.erased.push(previous);
        }
        self.elements.push(behavior);
    }

    /// Retires the top behavior.
    ///
    /// On a single-element stack this is a no-op under [`UnbecomePolicy::Ignore`] and
    /// returns `false`.
    ///
    /// # Panics
    ///
    /// Panics on a single-element stack under [`UnbecomePolicy::Panic`].
    pub fn unbecome(&mut self) -> bool {
        if self.elements.len() <= 1 {
            match self.policy {
                UnbecomePolicy::Ignore => {
                    trace!("unbecome on the last behavior ignored");
                    return false;
                }
                UnbecomePolicy::Panic => panic!("unbecome would leave the behavior stack empty"),
            }
        }
        if let Some(previous) = self.elements.pop() {
            self.erased.push(previous);
        }
        true
    }

    /// The active behavior.
    pub fn back(&self) -> Option<&Behavior> {
        self.elements.last()
    }

    /// Frees retired behaviors. Call only outside of any handler.
    pub fn cleanup(&mut self) {
        if !self.erased.is_empty() {
            trace!(count = self.erased.len(), "freeing retired behaviors");
            self.erased.clear();
        }
    }

    /// Retires every behavior and rejects further pushes.
    pub fn terminate(&mut self) {
        self.terminated = true;
        self.erased.append(&mut self.elements);
    }

    /// Number of live behaviors.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// `true` when no behavior is live.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Number of retired behaviors awaiting cleanup.
    pub fn erased_len(&self) -> usize {
        self.erased.len()
    }

    /// `true` once terminated.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbecome_retires_until_cleanup() {
        let base = Behavior::empty();
        let top = Behavior::empty();
        let mut stack = BehaviorStack::new(UnbecomePolicy::Ignore);
        stack.push(base.clone());
        stack.push(top);

        assert!(stack.unbecome());
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.erased_len(), 1);
        assert!(Behavior::ptr_eq(stack.back().expect("base"), &base));

        stack.cleanup();
        assert_eq!(stack.erased_len(), 0);
    }

    #[test]
    fn last_behavior_is_kept_under_ignore() {
        let mut stack = BehaviorStack::new(UnbecomePolicy::Ignore);
        stack.push(Behavior::empty());
        assert!(!stack.unbecome());
        assert_eq!(stack.len(), 1);
    }

    #[test]
    #[should_panic(expected = "behavior stack empty")]
    fn last_behavior_panics_under_panic_policy() {
        let mut stack = BehaviorStack::new(UnbecomePolicy::Panic);
        stack.push(Behavior::empty());
        stack.unbecome();
    }

    #[test]
    fn replace_swaps_the_top() {
        let mut stack = BehaviorStack::new(UnbecomePolicy::Ignore);
        stack.push(Behavior::empty());
        let next = Behavior::empty();
        stack.replace(next.clone());
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.erased_len(), 1);
        assert!(Behavior::ptr_eq(stack.back().expect("top"), &next));
    }

    #[test]
    #[should_panic(expected = "after the actor exited")]
    fn become_after_terminate_panics() {
        let mut stack = BehaviorStack::new(UnbecomePolicy::Ignore);
        stack.push(Behavior::empty());
        stack.terminate();
        assert!(stack.is_empty());
        stack.push(Behavior::empty());
    }
}
