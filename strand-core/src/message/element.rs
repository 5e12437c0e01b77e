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

use std::any::{Any, TypeId};
use std::fmt::{self, Debug};

use dyn_clone::DynClone;

/// Small built-in types that get a numeric tag.
///
/// Comparing two tags is a single byte compare, so signatures made of built-in types
/// never fall back to comparing `TypeId`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum BuiltinType {
    Bool,
    Char,
    I8,
    I16,
    I32,
    I64,
    I128,
    Isize,
    U8,
    U16,
    U32,
    U64,
    U128,
    Usize,
    F32,
    F64,
    String,
    Str,
}

/// A type that can be carried inside a [`Message`](super::Message).
///
/// User types implement it through `#[strand_message]`; the built-in scalar types and
/// strings implement it with a [`BuiltinType`] tag.
pub trait MessageType: Any + Clone + Debug + Send + Sync {
    /// Fast-path tag for built-in types, `None` for everything else.
    const BUILTIN: Option<BuiltinType> = None;

    /// The runtime token used for signature matching.
    fn type_token() -> TypeToken
    where
        Self: Sized,
    {
        TypeToken {
            builtin: Self::BUILTIN,
            id: TypeId::of::<Self>(),
            name: std::any::type_name::<Self>(),
        }
    }
}

macro_rules! builtin_message_types {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(
            impl MessageType for $ty {
                const BUILTIN: Option<BuiltinType> = Some(BuiltinType::$tag);
            }
        )*
    };
}

builtin_message_types! {
    bool => Bool,
    char => Char,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    i128 => I128,
    isize => Isize,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    u128 => U128,
    usize => Usize,
    f32 => F32,
    f64 => F64,
    String => String,
    &'static str => Str,
}

impl<T: MessageType> MessageType for Vec<T> {}

/// Runtime identity of one element type.
#[derive(Clone, Copy)]
pub struct TypeToken {
    builtin: Option<BuiltinType>,
    id: TypeId,
    name: &'static str,
}

impl TypeToken {
    /// Token of `T`.
    pub fn of<T: MessageType>() -> Self {
        T::type_token()
    }

    /// The built-in tag, if any.
    pub const fn builtin(&self) -> Option<BuiltinType> {
        self.builtin
    }

    /// Human-readable type name.
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeToken {
    fn eq(&self, other: &Self) -> bool {
        match (self.builtin, other.builtin) {
            (Some(lhs), Some(rhs)) => lhs == rhs,
            (None, None) => self.id == other.id,
            _ => false,
        }
    }
}

impl Eq for TypeToken {}

impl Debug for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Object-safe view of a [`MessageType`] value stored inside a message.
pub trait Element: DynClone + Debug + Send + Sync + 'static {
    /// Borrow as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
    /// Mutably borrow as `Any` for downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
    /// Convert into a boxed `Any` to move the value out.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
    /// Runtime token of the concrete type.
    fn token(&self) -> TypeToken;
}

dyn_clone::clone_trait_object!(Element);

impl<T: MessageType> Element for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }

    fn token(&self) -> TypeToken {
        T::type_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Custom;
    impl MessageType for Custom {}

    #[test]
    fn builtin_tokens_compare_by_tag() {
        assert_eq!(TypeToken::of::<i32>(), TypeToken::of::<i32>());
        assert_ne!(TypeToken::of::<i32>(), TypeToken::of::<i64>());
        assert_eq!(TypeToken::of::<String>().builtin(), Some(BuiltinType::String));
    }

    #[test]
    fn user_tokens_compare_by_type_id() {
        assert_eq!(TypeToken::of::<Custom>(), TypeToken::of::<Custom>());
        assert_ne!(TypeToken::of::<Custom>(), TypeToken::of::<u8>());
        assert_ne!(TypeToken::of::<Vec<u8>>(), TypeToken::of::<Vec<u16>>());
        assert!(TypeToken::of::<Custom>().builtin().is_none());
    }
}
