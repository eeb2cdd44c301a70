/// Declares a newtype over a primitive integer.
///
/// Leading attributes (doc comments included) are forwarded to the generated
/// struct. The type gets `Copy`, ordering, hashing, transparent serde, a
/// `const fn new`/`get` pair, `Debug` as `Name(v)`, plain `Display`, and
/// conversions in both directions.
#[macro_export]
macro_rules! strong_type {
    ($(#[$meta:meta])* $name:ident, $inner:ty) => {
        $(#[$meta])*
        #[derive(
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Default,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            #[inline]
            pub const fn new(value: $inner) -> Self {
                Self(value)
            }

            #[inline]
            pub const fn get(self) -> $inner {
                self.0
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                ::std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = ::std::num::ParseIntError;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                s.trim().parse::<$inner>().map(Self)
            }
        }

        impl From<$inner> for $name {
            #[inline]
            fn from(val: $inner) -> Self {
                Self(val)
            }
        }

        impl From<$name> for $inner {
            #[inline]
            fn from(val: $name) -> Self {
                val.0
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    strong_type!(
        /// Test-only handle.
        Handle,
        u32
    );

    #[test]
    fn test_new_and_get() {
        const H: Handle = Handle::new(9);
        assert_eq!(H.get(), 9);
        let raw: u32 = H.into();
        assert_eq!(raw, 9);
    }

    #[test]
    fn test_formatting() {
        let h = Handle(17);
        assert_eq!(h.to_string(), "17");
        assert_eq!(format!("{:?}", h), "Handle(17)");
        assert_eq!(format!("{:>4}", h), "  17");
    }

    #[test]
    fn test_parse() {
        assert_eq!(" 42 ".parse::<Handle>().unwrap(), Handle(42));
        assert!("x".parse::<Handle>().is_err());
    }

    #[test]
    fn test_ordering_in_sets() {
        let set: BTreeSet<Handle> = [3u32, 1, 3, 2].into_iter().map(Handle::from).collect();
        assert_eq!(set.into_iter().map(Handle::get).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_serde_is_transparent() {
        let json = serde_json::to_string(&Handle(5)).unwrap();
        assert_eq!(json, "5");
        assert_eq!(serde_json::from_str::<Handle>("5").unwrap(), Handle(5));
    }
}
