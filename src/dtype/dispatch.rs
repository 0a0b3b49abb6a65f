//! DType dispatch
//!
//! The `dispatch_dtype!` macro takes a `DType` value and evaluates a block
//! with `T` bound to the corresponding Rust type. Every dtype has an
//! `Element` implementation, so the match is exhaustive and the macro is an
//! expression.
//!
//! ## Supported Types
//!
//! - `F64` -> `f64`
//! - `F32` -> `f32`
//! - `F16` -> `half::f16`
//! - `BF16` -> `half::bf16`
//! - `I64` / `I32` / `I16` / `I8` -> `i64` / `i32` / `i16` / `i8`
//! - `U64` / `U32` / `U16` / `U8` -> `u64` / `u32` / `u16` / `u8`
//! - `Bool` -> `bool`
//!
//! ```
//! use tensorloop::dispatch_dtype;
//! use tensorloop::dtype::DType;
//!
//! let size = dispatch_dtype!(DType::BF16, T => { std::mem::size_of::<T>() });
//! assert_eq!(size, 2);
//! ```

/// Bind `$T` to the Rust type of `$dtype` and evaluate `$body`.
#[macro_export]
macro_rules! dispatch_dtype {
    ($dtype:expr, $T:ident => $body:block) => {
        match $dtype {
            $crate::dtype::DType::F64 => {
                type $T = f64;
                $body
            }
            $crate::dtype::DType::F32 => {
                type $T = f32;
                $body
            }
            $crate::dtype::DType::F16 => {
                type $T = $crate::dtype::f16;
                $body
            }
            $crate::dtype::DType::BF16 => {
                type $T = $crate::dtype::bf16;
                $body
            }
            $crate::dtype::DType::I64 => {
                type $T = i64;
                $body
            }
            $crate::dtype::DType::I32 => {
                type $T = i32;
                $body
            }
            $crate::dtype::DType::I16 => {
                type $T = i16;
                $body
            }
            $crate::dtype::DType::I8 => {
                type $T = i8;
                $body
            }
            $crate::dtype::DType::U64 => {
                type $T = u64;
                $body
            }
            $crate::dtype::DType::U32 => {
                type $T = u32;
                $body
            }
            $crate::dtype::DType::U16 => {
                type $T = u16;
                $body
            }
            $crate::dtype::DType::U8 => {
                type $T = u8;
                $body
            }
            $crate::dtype::DType::Bool => {
                type $T = bool;
                $body
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::dtype::{DType, Element};

    #[test]
    fn test_dispatch_binds_matching_element() {
        for dt in DType::ALL {
            let bound = dispatch_dtype!(dt, T => { <T as Element>::DTYPE });
            assert_eq!(bound, dt);
            let size = dispatch_dtype!(dt, T => { std::mem::size_of::<T>() });
            assert_eq!(size, dt.size_in_bytes());
        }
    }
}
