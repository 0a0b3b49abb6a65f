//! Device functions and their signatures
//!
//! A device function is a plain closure over scalar elements. The traits in
//! this module describe it to the dispatcher: [`ArgTuple`] covers the closed
//! set of argument lists (zero to four memory-bound arguments), and
//! [`DeviceFn`] / [`IndexedDeviceFn`] mark closures that may be shipped to the
//! device (`Copy + Send + Sync + 'static`).

use crate::dtype::{DType, Element, Scalar};
use smallvec::SmallVec;
use std::marker::PhantomData;

/// Per-argument dtype list, inline for every supported arity
pub type ArgTypes = SmallVec<[DType; 4]>;

/// Scalar types a function reads and writes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    /// Memory-bound argument types, in call order
    pub args: ArgTypes,
    /// Result type
    pub output: DType,
}

impl Signature {
    /// Number of memory-bound arguments
    #[inline]
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

/// Argument list of a device function.
///
/// Implemented for tuples of zero to four [`Element`] types.
pub trait ArgTuple: Copy + Send + Sync + 'static {
    /// Number of arguments
    const ARITY: usize;

    /// Dtype of every argument
    fn dtypes() -> ArgTypes;

    /// Read each argument as its exact type.
    ///
    /// # Safety
    /// `ptrs[i]` must be valid for reading one element of argument `i`'s type.
    unsafe fn load(ptrs: &[*const u8]) -> Self;

    /// Read element `index` of packed arrays starting at `bases`.
    ///
    /// # Safety
    /// `bases[i]` must point to at least `index + 1` packed elements of
    /// argument `i`'s type.
    unsafe fn load_packed(bases: &[*const u8], index: usize) -> Self;

    /// Read each argument stored as `dtypes[i]` and convert it.
    ///
    /// # Safety
    /// `ptrs[i]` must be valid for reading one element of `dtypes[i]`.
    unsafe fn load_cast(ptrs: &[*const u8], dtypes: &[DType]) -> Self;
}

impl ArgTuple for () {
    const ARITY: usize = 0;

    fn dtypes() -> ArgTypes {
        SmallVec::new()
    }

    #[inline]
    unsafe fn load(_ptrs: &[*const u8]) -> Self {}

    #[inline]
    unsafe fn load_packed(_bases: &[*const u8], _index: usize) -> Self {}

    #[inline]
    unsafe fn load_cast(_ptrs: &[*const u8], _dtypes: &[DType]) -> Self {}
}

macro_rules! impl_arg_tuple {
    ($arity:literal; $($T:ident => $i:tt),+) => {
        impl<$($T: Element),+> ArgTuple for ($($T,)+) {
            const ARITY: usize = $arity;

            fn dtypes() -> ArgTypes {
                SmallVec::from_slice(&[$($T::DTYPE),+])
            }

            #[inline]
            unsafe fn load(ptrs: &[*const u8]) -> Self {
                unsafe { ($($T::load(ptrs[$i]),)+) }
            }

            #[inline]
            unsafe fn load_packed(bases: &[*const u8], index: usize) -> Self {
                unsafe { ($($T::load(bases[$i].add(index * size_of::<$T>())),)+) }
            }

            #[inline]
            unsafe fn load_cast(ptrs: &[*const u8], dtypes: &[DType]) -> Self {
                unsafe { ($($T::from_scalar(Scalar::load(dtypes[$i], ptrs[$i])),)+) }
            }
        }
    };
}

impl_arg_tuple!(1; A => 0);
impl_arg_tuple!(2; A => 0, B => 1);
impl_arg_tuple!(3; A => 0, B => 1, C => 2);
impl_arg_tuple!(4; A => 0, B => 1, C => 2, D => 3);

/// A function the device can evaluate once per element.
///
/// Implemented for every `Fn(A, B, ..) -> R` closure over [`Element`] types
/// that is `Copy + Send + Sync + 'static`. Capturing a non-`Copy` value or a
/// borrow fails at the dispatch call site.
pub trait DeviceFn<Args: ArgTuple>: Copy + Send + Sync + 'static {
    /// Result type
    type Output: Element;

    /// Evaluate on one set of arguments
    fn invoke(&self, args: Args) -> Self::Output;

    /// Argument and result types
    fn signature() -> Signature {
        Signature {
            args: Args::dtypes(),
            output: <Self::Output as Element>::DTYPE,
        }
    }
}

/// A device function that also receives the element's linear index.
///
/// Implemented for `Fn(A, B, .., i64) -> R`; the trailing `i64` is the index
/// and is not bound to an operand.
pub trait IndexedDeviceFn<Args: ArgTuple>: Copy + Send + Sync + 'static {
    /// Result type
    type Output: Element;

    /// Evaluate on one set of arguments at linear index `index`
    fn invoke(&self, args: Args, index: i64) -> Self::Output;

    /// Memory-bound argument and result types (the index is excluded)
    fn signature() -> Signature {
        Signature {
            args: Args::dtypes(),
            output: <Self::Output as Element>::DTYPE,
        }
    }
}

macro_rules! impl_device_fns {
    ($($T:ident),*) => {
        impl<Func, Ret, $($T,)*> DeviceFn<($($T,)*)> for Func
        where
            Func: Fn($($T),*) -> Ret + Copy + Send + Sync + 'static,
            Ret: Element,
            $($T: Element,)*
        {
            type Output = Ret;

            #[inline]
            #[allow(non_snake_case)]
            fn invoke(&self, ($($T,)*): ($($T,)*)) -> Ret {
                self($($T),*)
            }
        }

        impl<Func, Ret, $($T,)*> IndexedDeviceFn<($($T,)*)> for Func
        where
            Func: Fn($($T,)* i64) -> Ret + Copy + Send + Sync + 'static,
            Ret: Element,
            $($T: Element,)*
        {
            type Output = Ret;

            #[inline]
            #[allow(non_snake_case)]
            fn invoke(&self, ($($T,)*): ($($T,)*), index: i64) -> Ret {
                self($($T,)* index)
            }
        }
    };
}

impl_device_fns!();
impl_device_fns!(A);
impl_device_fns!(A, B);
impl_device_fns!(A, B, C);
impl_device_fns!(A, B, C, D);

/// One element's computation as seen by the kernels.
///
/// Unifies plain and index-augmented functions so both share the same
/// kernel bodies.
pub(crate) trait ElementOp: Copy + Send + Sync + 'static {
    type Args: ArgTuple;
    type Output: Element;

    fn apply(&self, args: Self::Args, index: i64) -> Self::Output;
}

pub(crate) struct Plain<F, Args> {
    f: F,
    _args: PhantomData<fn(Args)>,
}

impl<F, Args> Plain<F, Args> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f,
            _args: PhantomData,
        }
    }
}

impl<F: Copy, Args> Clone for Plain<F, Args> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<F: Copy, Args> Copy for Plain<F, Args> {}

impl<F, Args> ElementOp for Plain<F, Args>
where
    Args: ArgTuple,
    F: DeviceFn<Args>,
{
    type Args = Args;
    type Output = F::Output;

    #[inline]
    fn apply(&self, args: Args, _index: i64) -> F::Output {
        self.f.invoke(args)
    }
}

pub(crate) struct Indexed<F, Args> {
    f: F,
    _args: PhantomData<fn(Args)>,
}

impl<F, Args> Indexed<F, Args> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f,
            _args: PhantomData,
        }
    }
}

impl<F: Copy, Args> Clone for Indexed<F, Args> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<F: Copy, Args> Copy for Indexed<F, Args> {}

impl<F, Args> ElementOp for Indexed<F, Args>
where
    Args: ArgTuple,
    F: IndexedDeviceFn<Args>,
{
    type Args = Args;
    type Output = F::Output;

    #[inline]
    fn apply(&self, args: Args, index: i64) -> F::Output {
        self.f.invoke(args, index)
    }
}
