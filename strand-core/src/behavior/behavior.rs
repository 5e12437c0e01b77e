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

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::HandlerResult;
use crate::actor::ActorContext;
use crate::message::{Message, Pattern, TypeToken};

type HandlerFn = Box<dyn Fn(&mut ActorContext<'_>, &Message) -> HandlerResult + Send + Sync>;
type TimeoutFn = Box<dyn Fn(&mut ActorContext<'_>) + Send + Sync>;

pub(crate) struct Case {
    /// `None` matches any message.
    signature: Option<Vec<TypeToken>>,
    handler: HandlerFn,
}

impl Case {
    fn matches(&self, types: &[TypeToken]) -> bool {
        self.signature
            .as_deref()
            .map_or(true, |signature| signature == types)
    }

    pub(crate) fn invoke(&self, ctx: &mut ActorContext<'_>, message: &Message) -> HandlerResult {
        (self.handler)(ctx, message)
    }
}

struct Timeout {
    duration: Duration,
    handler: TimeoutFn,
}

struct BehaviorInner {
    cases: Vec<Case>,
    timeout: Option<Timeout>,
}

/// An immutable, ordered list of `pattern -> handler` cases plus an optional timeout.
///
/// Cases are tried in declaration order and the first structural match wins. Cloning a
/// behavior is cheap; every change of an actor's behavior installs a new value.
///
/// ```ignore
/// let doubler = Behavior::builder()
///     .on(|_ctx, value: i32| HandlerResult::reply(value * 2))
///     .on(|_ctx, text: String| HandlerResult::reply(text.len()))
///     .on_any(|_ctx, _msg| HandlerResult::Skip)
///     .build();
/// ```
#[derive(Clone)]
pub struct Behavior {
    inner: Arc<BehaviorInner>,
}

impl Behavior {
    /// Starts a new behavior.
    pub fn builder() -> BehaviorBuilder {
        BehaviorBuilder::default()
    }

    /// A behavior without cases; every message falls through to the default handler.
    pub fn empty() -> Self {
        Self::builder().build()
    }

    /// Number of cases.
    pub fn len(&self) -> usize {
        self.inner.cases.len()
    }

    /// `true` when there are no cases.
    pub fn is_empty(&self) -> bool {
        self.inner.cases.is_empty()
    }

    /// Index of the first case matching `types`.
    pub fn find_case(&self, types: &[TypeToken]) -> Option<usize> {
        self.inner.cases.iter().position(|case| case.matches(types))
    }

    pub(crate) fn case(&self, index: usize) -> Option<&Case> {
        self.inner.cases.get(index)
    }

    /// The timeout duration, if one is installed.
    pub fn timeout(&self) -> Option<Duration> {
        self.inner.timeout.as_ref().map(|timeout| timeout.duration)
    }

    pub(crate) fn fire_timeout(&self, ctx: &mut ActorContext<'_>) -> bool {
        match &self.inner.timeout {
            Some(timeout) => {
                (timeout.handler)(ctx);
                true
            }
            None => false,
        }
    }

    /// `true` if both values are the same behavior.
    pub fn ptr_eq(lhs: &Self, rhs: &Self) -> bool {
        Arc::ptr_eq(&lhs.inner, &rhs.inner)
    }
}

impl fmt::Debug for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Behavior")
            .field("cases", &self.inner.cases.len())
            .field("timeout", &self.timeout())
            .finish()
    }
}

/// Collects cases for a [`Behavior`].
#[derive(Default)]
pub struct BehaviorBuilder {
    cases: Vec<Case>,
    timeout: Option<Timeout>,
}

impl BehaviorBuilder {
    /// Adds a case for pattern `P`.
    ///
    /// `P` is a single message type or a tuple of them; the handler receives the
    /// extracted values.
    #[must_use]
    pub fn on<P, F, R>(mut self, handler: F) -> Self
    where
        P: Pattern,
        F: Fn(&mut ActorContext<'_>, P) -> R + Send + Sync + 'static,
        R: Into<HandlerResult>,
    {
        self.cases.push(Case {
            signature: Some(P::signature()),
            handler: Box::new(move |ctx, message| match P::extract(message) {
                Some(values) => handler(ctx, values).into(),
                None => HandlerResult::Skip,
            }),
        });
        self
    }

    /// Adds a catch-all case that sees the raw message.
    #[must_use]
    pub fn on_any<F, R>(mut self, handler: F) -> Self
    where
        F: Fn(&mut ActorContext<'_>, &Message) -> R + Send + Sync + 'static,
        R: Into<HandlerResult>,
    {
        self.cases.push(Case {
            signature: None,
            handler: Box::new(move |ctx, message| handler(ctx, message).into()),
        });
        self
    }

    /// Runs `handler` if no message arrives within `duration` while this behavior is
    /// active.
    #[must_use]
    pub fn after<F>(mut self, duration: Duration, handler: F) -> Self
    where
        F: Fn(&mut ActorContext<'_>) + Send + Sync + 'static,
    {
        self.timeout = Some(Timeout {
            duration,
            handler: Box::new(handler),
        });
        self
    }

    /// Finishes the behavior.
    pub fn build(self) -> Behavior {
        Behavior {
            inner: Arc::new(BehaviorInner {
                cases: self.cases,
                timeout: self.timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;

    fn signature(message: &Message) -> Vec<TypeToken> {
        message.types().to_vec()
    }

    #[test]
    fn first_structural_match_wins() {
        let behavior = Behavior::builder()
            .on(|_ctx, _: i32| ())
            .on(|_ctx, _: String| ())
            .on_any(|_ctx, _msg| ())
            .build();

        assert_eq!(behavior.find_case(&signature(&Message::new(1_i32))), Some(0));
        assert_eq!(behavior.find_case(&signature(&Message::new(String::from("x")))), Some(1));
        assert_eq!(behavior.find_case(&signature(&Message::new(3.14_f64))), Some(2));
    }

    #[test]
    fn no_match_without_catch_all() {
        let behavior = Behavior::builder().on(|_ctx, _: (i32, i32)| ()).build();
        assert_eq!(behavior.find_case(&[i32::type_token()]), None);
        assert_eq!(behavior.find_case(&[i32::type_token(), i32::type_token()]), Some(0));
        assert!(behavior.timeout().is_none());
    }

    #[test]
    fn timeouts_are_recorded() {
        let behavior = Behavior::builder()
            .after(Duration::from_millis(20), |_ctx| {})
            .build();
        assert!(behavior.is_empty());
        assert_eq!(behavior.timeout(), Some(Duration::from_millis(20)));
    }
}
