use std::any::{Any, type_name};
use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};

use indexmap::IndexMap;

use super::{
    Array, Kind, List, Map, Pointer, Reflect, ReflectMut, ReflectRef, ScalarMut, ScalarRef,
    TypeInfo, wrong_kind,
};
use crate::error::Result;

macro_rules! impl_reflect_scalar {
    ($($ty:ty => $variant:ident,)*) => {
        $(
            impl Reflect for $ty {
                fn type_info() -> TypeInfo {
                    TypeInfo::scalar::<Self>(Kind::$variant)
                }

                fn reflect_ref(&self) -> ReflectRef<'_> {
                    ReflectRef::Scalar(ScalarRef::$variant(self))
                }

                fn reflect_mut(&mut self) -> ReflectMut<'_> {
                    ReflectMut::Scalar(ScalarMut::$variant(self))
                }

                fn as_any(&self) -> &dyn Any {
                    self
                }

                fn as_any_mut(&mut self) -> &mut dyn Any {
                    self
                }
            }
        )*
    };
}

impl_reflect_scalar! {
    bool => Bool,
    isize => Isize,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    usize => Usize,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => String,
}

// -----------------------------------------------------------------------------
// Option

impl<T: Reflect + Default> Reflect for Option<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::pointer::<Self, T>()
    }

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Pointer(self)
    }

    fn reflect_mut(&mut self) -> ReflectMut<'_> {
        ReflectMut::Pointer(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<T: Reflect + Default> Pointer for Option<T> {
    fn get(&self) -> Option<&dyn Reflect> {
        self.as_ref().map(|v| v as &dyn Reflect)
    }

    fn get_mut(&mut self) -> Option<&mut dyn Reflect> {
        self.as_mut().map(|v| v as &mut dyn Reflect)
    }

    fn get_or_insert_default(&mut self) -> &mut dyn Reflect {
        self.get_or_insert_with(T::default)
    }
}

// -----------------------------------------------------------------------------
// Sequences

impl<T: Reflect + Default> Reflect for Vec<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::list::<Self, T>()
    }

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::List(self)
    }

    fn reflect_mut(&mut self) -> ReflectMut<'_> {
        ReflectMut::List(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<T: Reflect + Default> List for Vec<T> {
    fn len(&self) -> usize {
        <[T]>::len(self)
    }

    fn get(&self, index: usize) -> Option<&dyn Reflect> {
        <[T]>::get(self, index).map(|v| v as &dyn Reflect)
    }

    fn push_default(&mut self) -> &mut dyn Reflect {
        self.push(T::default());
        let last = Vec::len(self) - 1;
        &mut self[last]
    }

    fn pop(&mut self) {
        Vec::pop(self);
    }

    fn clear(&mut self) {
        Vec::clear(self);
    }
}

impl<T: Reflect, const N: usize> Reflect for [T; N] {
    fn type_info() -> TypeInfo {
        TypeInfo::array::<Self, T>(N)
    }

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Array(self)
    }

    fn reflect_mut(&mut self) -> ReflectMut<'_> {
        ReflectMut::Array(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<T: Reflect, const N: usize> Array for [T; N] {
    fn len(&self) -> usize {
        N
    }

    fn get(&self, index: usize) -> Option<&dyn Reflect> {
        <[T]>::get(self, index).map(|v| v as &dyn Reflect)
    }

    fn get_mut(&mut self, index: usize) -> Option<&mut dyn Reflect> {
        <[T]>::get_mut(self, index).map(|v| v as &mut dyn Reflect)
    }
}

// -----------------------------------------------------------------------------
// Maps

/// Builds a map key of type `K` from its string form.
fn key_from_str<K: Reflect + Default>(key: &str) -> Result<K> {
    let mut out = K::default();
    match out.reflect_mut() {
        ReflectMut::Scalar(ScalarMut::String(s)) => {
            s.clear();
            s.push_str(key);
        }
        other => return Err(wrong_kind(type_name::<K>(), other.kind(), Kind::String)),
    }
    Ok(out)
}

macro_rules! impl_reflect_map {
    ($map:ident<K, V $(, $hasher:ident)?> where K: $($key_bound:path),+) => {
        impl<K, V $(, $hasher)?> Reflect for $map<K, V $(, $hasher)?>
        where
            K: Reflect + Default $(+ $key_bound)+,
            V: Reflect + Default,
            $($hasher: BuildHasher + Default + 'static,)?
        {
            fn type_info() -> TypeInfo {
                TypeInfo::map::<Self, K, V>()
            }

            fn reflect_ref(&self) -> ReflectRef<'_> {
                ReflectRef::Map(self)
            }

            fn reflect_mut(&mut self) -> ReflectMut<'_> {
                ReflectMut::Map(self)
            }

            fn as_any(&self) -> &dyn Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn Any {
                self
            }
        }

        impl<K, V $(, $hasher)?> Map for $map<K, V $(, $hasher)?>
        where
            K: Reflect + Default $(+ $key_bound)+,
            V: Reflect + Default,
            $($hasher: BuildHasher + Default + 'static,)?
        {
            fn len(&self) -> usize {
                $map::len(self)
            }

            fn entries(&self) -> Box<dyn Iterator<Item = (&dyn Reflect, &dyn Reflect)> + '_> {
                Box::new(
                    self.iter()
                        .map(|(k, v)| (k as &dyn Reflect, v as &dyn Reflect)),
                )
            }

            fn clear(&mut self) {
                $map::clear(self);
            }

            fn insert_with(
                &mut self,
                key: &str,
                fill: &mut dyn FnMut(&mut dyn Reflect) -> Result<()>,
            ) -> Result<()> {
                let key = key_from_str::<K>(key)?;
                let mut value = V::default();
                fill(&mut value)?;
                self.insert(key, value);
                Ok(())
            }
        }
    };
}

impl_reflect_map!(HashMap<K, V, S> where K: Eq, Hash);
impl_reflect_map!(IndexMap<K, V, S> where K: Eq, Hash);
impl_reflect_map!(BTreeMap<K, V> where K: Ord);

// -----------------------------------------------------------------------------
// chrono

#[cfg(feature = "chrono")]
mod chrono_impls {
    use std::any::Any;

    use chrono::{DateTime, FixedOffset, Utc};

    use super::super::{Reflect, ReflectMut, ReflectRef, TypeInfo};

    macro_rules! impl_reflect_date_time {
        ($($tz:ty),*) => {
            $(
                impl Reflect for DateTime<$tz> {
                    fn type_info() -> TypeInfo {
                        TypeInfo::opaque::<Self>()
                    }

                    fn reflect_ref(&self) -> ReflectRef<'_> {
                        ReflectRef::Opaque
                    }

                    fn reflect_mut(&mut self) -> ReflectMut<'_> {
                        ReflectMut::Opaque
                    }

                    fn as_any(&self) -> &dyn Any {
                        self
                    }

                    fn as_any_mut(&mut self) -> &mut dyn Any {
                        self
                    }
                }
            )*
        };
    }

    impl_reflect_date_time!(Utc, FixedOffset);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_values() {
        let cases: Vec<(Box<dyn Reflect>, bool)> = vec![
            (Box::new(0_i32), true),
            (Box::new(7_u8), false),
            (Box::new(0.0_f64), true),
            (Box::new(false), true),
            (Box::new(String::new()), true),
            (Box::new("x".to_owned()), false),
            (Box::new(None::<i32>), true),
            (Box::new(Some(0_i32)), false),
            (Box::new(Vec::<i32>::new()), true),
            (Box::new([0_i32; 2]), false),
            (Box::new([0_i32; 0]), true),
            (Box::new(HashMap::<String, i32>::new()), true),
        ];
        for (value, empty) in cases {
            assert_eq!(value.is_empty_value(), empty, "{value:?}");
        }
    }

    #[test]
    fn shapes_describe_their_items() {
        let info = <Option<Vec<u16>>>::type_info();
        assert_eq!(info.kind(), Kind::Pointer);
        let super::super::Shape::Pointer { item } = *info.shape() else {
            panic!("expected pointer shape, got {:?}", info.shape());
        };
        let list = item();
        assert_eq!(list.kind(), Kind::List);
        let super::super::Shape::List { item } = *list.shape() else {
            panic!("expected list shape, got {:?}", list.shape());
        };
        assert_eq!(item().kind(), Kind::U16);
    }

    #[test]
    fn map_inserts_string_keys() {
        let mut map = BTreeMap::<String, i64>::new();
        Map::insert_with(&mut map, "a", &mut |v: &mut dyn Reflect| {
            *v.downcast_mut::<i64>().unwrap() = 3;
            Ok(())
        })
        .unwrap();
        assert_eq!(map.get("a"), Some(&3));
    }

    #[test]
    fn list_push_and_pop() {
        let mut list = vec![1_u8];
        let slot = List::push_default(&mut list);
        *slot.downcast_mut::<u8>().unwrap() = 9;
        assert_eq!(list, [1, 9]);
        List::pop(&mut list);
        assert_eq!(list, [1]);
    }
}
