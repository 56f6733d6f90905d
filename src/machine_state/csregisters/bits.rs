// SPDX-License-Identifier: MIT

/// The `csr!` macro generates a type describing a CSR, its value,
/// associated traits and methods.
///
/// Fields are declared lowest bit first; each field type implements
/// [`Bits64`] and contributes its `WIDTH` to the running bit offset.
///
/// [`Bits64`]: crate::bits::Bits64
#[macro_export]
macro_rules! csr {
    {
        pub struct $group:ident {
            $( $name:ident: $type:ty ),+
            $( , )?
        }
    } => {
        #[derive(Clone, Copy, PartialEq, Eq)]
        pub struct $group(u64);
        $crate::csr_bits!($group;; $( $name: $type ),+);
        $crate::csr_debug!($group;; $( $name ),+);
        $crate::csr_fields!(0;; $group;; $( $name: $type ),+);
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! csr_bits {
    ( $group:ident;; $( $name:ident: $type:ty ),+ ) => {
        impl $crate::bits::Bits64 for $group {
            const WIDTH: usize = {{ $crate::csr_width!($($type),+) }};

            /// Normalises the raw value field by field: WPRI bits read as
            /// their constants, WARL fields as a legal value.
            #[inline(always)]
            fn from_bits(value: u64) -> Self {
                let mut new_self = Self(0);
                let fake_self = Self(value);

                paste::paste! {
                    $(
                        new_self = new_self.[<with_ $name:lower>](
                            fake_self.[<$name:lower>]()
                        );
                    )+
                }

                new_self
            }

            #[inline(always)]
            fn to_bits(&self) -> u64 {
                self.0
            }
        }
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! csr_width {
    ( $type:ty ) => {
        <$type as $crate::bits::Bits64>::WIDTH
    };

    ( $type0:ty, $( $type1:ty ),+ ) => {
        $crate::csr_width!($type0) + $crate::csr_width!($($type1),+)
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! csr_debug {
    ( $group:ident;; $( $name:ident ),+ ) => {
        impl core::fmt::Debug for $group {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                paste::paste! {
                    f.debug_struct(stringify!($group))
                        $( .field(stringify!($name), &self.[<$name:lower>]()) )+
                        .finish()
                }
            }
        }
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! csr_fields {
    ( $accum:expr;; $group:ident;; $name:ident: $type:ty ) => {
        paste::paste! {
            #[allow(dead_code)]
            impl $group {
                pub const [<$name:upper _OFFSET>]: usize = { $accum };

                #[inline(always)]
                pub fn [<$name:lower>](self) -> $type {
                    let offset = <$type as $crate::bits::Bits64>::WIDTH.saturating_sub(1);
                    let bits = $crate::bits::u64::bits_subset(self.0, ($accum + offset), ($accum));
                    <$type as $crate::bits::Bits64>::from_bits(bits)
                }

                #[inline(always)]
                pub fn [<with_ $name:lower>](self, value: $type) -> Self {
                    let offset = <$type as $crate::bits::Bits64>::WIDTH.saturating_sub(1);
                    let new_self = $crate::bits::u64::replace_subset(
                        self.0,
                        ($accum + offset),
                        ($accum),
                        $crate::bits::Bits64::to_bits(&value),
                    );
                    $group(new_self)
                }
            }
        }
    };

    ( $accum:expr;; $group:ident;; $name:ident: $type:ty, $( $names:ident: $types:ty ),+ ) => {
        $crate::csr_fields!($accum;; $group;; $name: $type);
        $crate::csr_fields!(
            $accum + <$type as $crate::bits::Bits64>::WIDTH;; $group;; $( $names: $types ),+
        );
    };
}

#[cfg(test)]
mod tests {
    use crate::bits::Bits64;
    use crate::bits::ConstantBits;

    csr! {
        pub struct Example {
            LOW: bool,
            PAD: ConstantBits<3>,
            NIBBLE: crate::bits::FixedWidthBits<4>,
        }
    }

    #[test]
    fn field_offsets() {
        assert_eq!(Example::LOW_OFFSET, 0);
        assert_eq!(Example::PAD_OFFSET, 1);
        assert_eq!(Example::NIBBLE_OFFSET, 4);
        assert_eq!(Example::WIDTH, 8);
    }

    #[test]
    fn from_bits_normalises_wpri() {
        let value = Example::from_bits(0b1111_1111);
        // The WPRI pad reads back as zero
        assert_eq!(value.to_bits(), 0b1111_0001);
        assert!(value.low());
        assert_eq!(value.nibble().to_bits(), 0b1111);
    }
}
