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

use super::element::{Element, MessageType, TypeToken};

#[derive(Clone, Default)]
struct MessageData {
    types: Vec<TypeToken>,
    values: Vec<Box<dyn Element>>,
}

/// An immutable, reference-counted tuple of type-erased values.
///
/// Cloning a `Message` only bumps a reference count. Mutating accessors detach a
/// private copy first when the data is shared, so a receiver never observes changes
/// made through another handle.
#[derive(Clone, Default)]
pub struct Message {
    data: Arc<MessageData>,
}

impl Message {
    /// Builds a message from a single value or a tuple of values.
    pub fn new(values: impl IntoMessage) -> Self {
        values.into_message()
    }

    /// The empty message, used as the reply of handlers that return nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Appends a value, detaching the data first if it is shared.
    pub fn push<T: MessageType>(&mut self, value: T) {
        let data = Arc::make_mut(&mut self.data);
        data.types.push(T::type_token());
        data.values.push(Box::new(value));
    }

    /// Builder-style [`push`](Self::push).
    #[must_use]
    pub fn with<T: MessageType>(mut self, value: T) -> Self {
        self.push(value);
        self
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.values.len()
    }

    /// `true` when the message carries no elements.
    pub fn is_empty(&self) -> bool {
        self.data.values.is_empty()
    }

    /// The runtime type signature.
    pub fn types(&self) -> &[TypeToken] {
        &self.data.types
    }

    /// `true` if the signature equals `signature` element by element.
    pub fn match_types(&self, signature: &[TypeToken]) -> bool {
        self.data.types.as_slice() == signature
    }

    /// `true` if the message consists of exactly one `T`.
    pub fn is<T: MessageType>(&self) -> bool {
        self.data.types.len() == 1 && self.data.types[0] == T::type_token()
    }

    /// Borrows element `index` as `T`.
    pub fn get<T: MessageType>(&self, index: usize) -> Option<&T> {
        self.data.values.get(index)?.as_any().downcast_ref::<T>()
    }

    /// Mutably borrows element `index` as `T`, detaching shared data first.
    pub fn get_mut<T: MessageType>(&mut self, index: usize) -> Option<&mut T> {
        if self.get::<T>(index).is_none() {
            return None;
        }
        Arc::make_mut(&mut self.data)
            .values
            .get_mut(index)?
            .as_any_mut()
            .downcast_mut::<T>()
    }

    /// Moves element `index` out as `T`, cloning it when the data is shared.
    pub fn take<T: MessageType>(self, index: usize) -> Option<T> {
        match Arc::try_unwrap(self.data) {
            Ok(mut data) => {
                if index >= data.values.len() {
                    return None;
                }
                data.values
                    .swap_remove(index)
                    .into_any()
                    .downcast::<T>()
                    .ok()
                    .map(|value| *value)
            }
            Err(shared) => shared.values.get(index)?.as_any().downcast_ref::<T>().cloned(),
        }
    }

    /// Extracts the values as pattern `P`, cloning them.
    pub fn extract<P: Pattern>(&self) -> Option<P> {
        P::extract(self)
    }

    /// `true` if more than one handle points at the same data.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.data) > 1
    }

    /// `true` if both handles point at the same data.
    pub fn ptr_eq(lhs: &Self, rhs: &Self) -> bool {
        Arc::ptr_eq(&lhs.data, &rhs.data)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tuple = f.debug_tuple("Message");
        for value in &self.data.values {
            tuple.field(value);
        }
        tuple.finish()
    }
}

/// Conversion into a [`Message`]: a single [`MessageType`] value, a tuple of up to four
/// of them, or a message itself.
pub trait IntoMessage {
    /// Performs the conversion.
    fn into_message(self) -> Message;
}

impl IntoMessage for Message {
    fn into_message(self) -> Message {
        self
    }
}

impl<T: MessageType> IntoMessage for T {
    fn into_message(self) -> Message {
        Message::empty().with(self)
    }
}

/// A typed view of a message used as a handler pattern.
///
/// A pattern has a fixed signature that the dispatcher compares against a message's
/// runtime types before the handler runs, and an extractor producing the typed values.
pub trait Pattern: Sized + Send + 'static {
    /// Expected runtime signature.
    fn signature() -> Vec<TypeToken>;
    /// Typed values, or `None` if the message does not have this shape.
    fn extract(message: &Message) -> Option<Self>;
}

impl<T: MessageType> Pattern for T {
    fn signature() -> Vec<TypeToken> {
        vec![T::type_token()]
    }

    fn extract(message: &Message) -> Option<Self> {
        if message.len() != 1 {
            return None;
        }
        message.get::<T>(0).cloned()
    }
}

macro_rules! tuple_message {
    ($len:expr; $($name:ident : $idx:tt),+) => {
        impl<$($name: MessageType),+> IntoMessage for ($($name,)+) {
            fn into_message(self) -> Message {
                Message::empty()$(.with(self.$idx))+
            }
        }

        impl<$($name: MessageType),+> Pattern for ($($name,)+) {
            fn signature() -> Vec<TypeToken> {
                vec![$($name::type_token()),+]
            }

            fn extract(message: &Message) -> Option<Self> {
                if message.len() != $len {
                    return None;
                }
                Some(($(message.get::<$name>($idx)?.clone(),)+))
            }
        }
    };
}

tuple_message!(1; A: 0);
tuple_message!(2; A: 0, B: 1);
tuple_message!(3; A: 0, B: 1, C: 2);
tuple_message!(4; A: 0, B: 1, C: 2, D: 3);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_until_mutated() {
        let original = Message::new((1_i32, String::from("a")));
        let mut copy = original.clone();
        assert!(Message::ptr_eq(&original, &copy));
        assert!(original.is_shared());

        *copy.get_mut::<i32>(0).expect("i32 at 0") = 7;

        assert!(!Message::ptr_eq(&original, &copy));
        assert_eq!(original.get::<i32>(0), Some(&1));
        assert_eq!(copy.get::<i32>(0), Some(&7));
        assert_eq!(copy.get::<String>(1).map(String::as_str), Some("a"));
    }

    #[test]
    fn wrong_types_are_rejected() {
        let message = Message::new(3.5_f64);
        assert!(message.get::<f32>(0).is_none());
        assert!(message.is::<f64>());
        assert!(!message.is::<i32>());
        assert!(message.extract::<(f64, f64)>().is_none());
        assert_eq!(message.extract::<f64>(), Some(3.5));
    }

    #[test]
    fn take_moves_unique_values_and_clones_shared_ones() {
        let unique = Message::new(vec![1_u8, 2, 3]);
        assert_eq!(unique.take::<Vec<u8>>(0), Some(vec![1, 2, 3]));

        let shared = Message::new(String::from("x"));
        let keep = shared.clone();
        assert_eq!(shared.take::<String>(0).as_deref(), Some("x"));
        assert_eq!(keep.get::<String>(0).map(String::as_str), Some("x"));
    }

    #[test]
    fn tuples_round_trip_through_patterns() {
        let message = Message::new((1_u8, 'c', true));
        assert!(message.match_types(&<(u8, char, bool)>::signature()));
        assert_eq!(message.extract::<(u8, char, bool)>(), Some((1, 'c', true)));
        assert_eq!(format!("{message:?}"), "Message(1, 'c', true)");
    }
}
