//! Core Tensor type

use super::{Layout, Residency, Storage, checked_elem_count};
use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::runtime::Device;
use smallvec::SmallVec;
use std::fmt;

/// N-dimensional array on the host or on a parallel device
///
/// `Tensor` consists of:
/// - **Storage**: Reference-counted memory with a residency
/// - **Layout**: Shape, strides, and offset defining the view into storage
/// - **DType**: Element type (determined at runtime)
///
/// # Zero-Copy Views
///
/// `transpose`, `narrow`, `broadcast_to` and `as_strided` create new tensors
/// that share the same underlying storage.
///
/// # Example
///
/// ```
/// use tensorloop::prelude::*;
///
/// # fn main() -> tensorloop::error::Result<()> {
/// let device = Device::new(0)?;
/// let a = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0], &[2, 2], &device)?;
/// let b = a.transpose(-1, -2)?; // Zero-copy, shares storage with a
/// assert_eq!(b.to_vec::<f32>()?, vec![1.0, 3.0, 2.0, 4.0]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Tensor {
    storage: Storage,
    layout: Layout,
    dtype: DType,
}

impl Tensor {
    /// Create a tensor from storage, layout and dtype.
    ///
    /// Fails if the layout can reach bytes outside the storage.
    pub fn from_parts(storage: Storage, layout: Layout, dtype: DType) -> Result<Self> {
        check_in_bounds(&storage, &layout, dtype)?;
        Ok(Self {
            storage,
            layout,
            dtype,
        })
    }

    /// Copy `data` into a new contiguous tensor on `device`
    pub fn from_slice<T: Element>(data: &[T], shape: &[usize], device: &Device) -> Result<Self> {
        Self::from_slice_in(data, shape, Residency::Device(device.clone()))
    }

    /// Copy `data` into a new contiguous tensor in host memory
    pub fn from_slice_host<T: Element>(data: &[T], shape: &[usize]) -> Result<Self> {
        Self::from_slice_in(data, shape, Residency::Host)
    }

    fn from_slice_in<T: Element>(data: &[T], shape: &[usize], residency: Residency) -> Result<Self> {
        let expected_len = element_count(shape)?;
        if data.len() != expected_len {
            return Err(Error::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![data.len()],
            });
        }

        let storage = Storage::from_bytes(bytemuck::cast_slice(data), residency)?;
        Ok(Self {
            storage,
            layout: Layout::contiguous(shape),
            dtype: T::DTYPE,
        })
    }

    /// Zero-dimensional host tensor holding `value`
    pub fn scalar_host<T: Element>(value: T) -> Result<Self> {
        Self::from_slice_host(&[value], &[])
    }

    /// Allocate a device tensor whose contents will be overwritten.
    ///
    /// Device memory is zero-initialized, so reading it before a kernel
    /// writes it yields zeros rather than garbage.
    pub fn empty(shape: &[usize], dtype: DType, device: &Device) -> Result<Self> {
        let size = element_count(shape)?
            .checked_mul(dtype.size_in_bytes())
            .ok_or_else(|| Error::invalid_argument("shape", format!("{shape:?} of {dtype} overflows usize bytes")))?;
        let storage = Storage::zeroed(size, Residency::Device(device.clone()))?;
        Ok(Self {
            storage,
            layout: Layout::contiguous(shape),
            dtype,
        })
    }

    /// Allocate a device tensor filled with zeros
    pub fn zeros(shape: &[usize], dtype: DType, device: &Device) -> Result<Self> {
        Self::empty(shape, dtype, device)
    }

    /// Copy the logical elements into a new contiguous tensor on `device`.
    ///
    /// Waits for pending work on the source device first.
    pub fn to_device(&self, device: &Device) -> Result<Self> {
        let bytes = self.contiguous_bytes()?;
        let storage = Storage::from_bytes(&bytes, Residency::Device(device.clone()))?;
        Ok(Self {
            storage,
            layout: Layout::contiguous(self.shape()),
            dtype: self.dtype,
        })
    }

    /// Read the logical elements in row-major order.
    ///
    /// Synchronizes the owning device, so every previously enqueued kernel
    /// has finished and any recorded device fault is returned here.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if T::DTYPE != self.dtype {
            return Err(Error::DTypeMismatch {
                lhs: self.dtype,
                rhs: T::DTYPE,
            });
        }
        if let Some(device) = self.storage.device() {
            device.synchronize()?;
        }

        let mut out = Vec::with_capacity(self.numel());
        let base = self.storage.as_ptr();
        let elem = self.dtype.size_in_bytes() as isize;
        self.layout.for_each_offset(|offset| {
            // SAFETY: from_parts and every view constructor keep the layout in bounds
            out.push(unsafe { T::load(base.offset(offset * elem)) });
        });
        Ok(out)
    }

    /// Logical elements packed in row-major order
    pub(crate) fn contiguous_bytes(&self) -> Result<Vec<u8>> {
        if let Some(device) = self.storage.device() {
            device.synchronize()?;
        }

        let elem = self.dtype.size_in_bytes();
        let mut bytes = Vec::with_capacity(self.numel() * elem);
        let base = self.storage.as_ptr();
        self.layout.for_each_offset(|offset| {
            // SAFETY: layout is in bounds; elem bytes per element
            let src = unsafe {
                std::slice::from_raw_parts(base.offset(offset * elem as isize), elem)
            };
            bytes.extend_from_slice(src);
        });
        Ok(bytes)
    }

    // ===== View operations =====

    /// Swap two dimensions (zero-copy)
    pub fn transpose(&self, dim0: isize, dim1: isize) -> Result<Self> {
        let layout = self.layout.transpose(dim0, dim1).ok_or_else(|| {
            Error::invalid_argument(
                "dim",
                format!("transpose({dim0}, {dim1}) out of range for rank {}", self.ndim()),
            )
        })?;
        Ok(self.with_layout(layout))
    }

    /// Restrict `dim` to `start..start + len` (zero-copy)
    pub fn narrow(&self, dim: isize, start: usize, len: usize) -> Result<Self> {
        let layout = self.layout.narrow(dim, start, len).ok_or_else(|| {
            Error::invalid_argument(
                "dim",
                format!("narrow({dim}, {start}, {len}) out of range for shape {:?}", self.shape()),
            )
        })?;
        Ok(self.with_layout(layout))
    }

    /// Expand to `shape` with zero strides on broadcast dimensions
    pub fn broadcast_to(&self, shape: &[usize]) -> Result<Self> {
        let layout = self
            .layout
            .broadcast_to(shape)
            .ok_or_else(|| Error::broadcast(self.shape(), shape))?;
        Ok(self.with_layout(layout))
    }

    /// Reinterpret the storage with explicit shape, element strides and offset
    pub fn as_strided(&self, shape: &[usize], strides: &[isize], offset: usize) -> Result<Self> {
        if shape.len() != strides.len() {
            return Err(Error::invalid_argument(
                "strides",
                format!("{} strides for rank {}", strides.len(), shape.len()),
            ));
        }
        element_count(shape)?;
        let layout = Layout::new(
            shape.iter().copied().collect(),
            strides.iter().copied().collect::<SmallVec<_>>(),
            offset,
        );
        Self::from_parts(self.storage.clone(), layout, self.dtype)
    }

    fn with_layout(&self, layout: Layout) -> Self {
        Self {
            storage: self.storage.clone(),
            layout,
            dtype: self.dtype,
        }
    }

    // ===== Queries =====

    /// Shape of the view
    #[inline]
    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    /// Element strides of the view
    #[inline]
    pub fn strides(&self) -> &[isize] {
        self.layout.strides()
    }

    /// Full layout
    #[inline]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Underlying storage
    #[inline]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Element type
    #[inline]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Rank
    #[inline]
    pub fn ndim(&self) -> usize {
        self.layout.ndim()
    }

    /// Number of logical elements
    #[inline]
    pub fn numel(&self) -> usize {
        self.layout.elem_count()
    }

    /// Whether the view is packed row-major
    #[inline]
    pub fn is_contiguous(&self) -> bool {
        self.layout.is_contiguous()
    }

    /// Owning device, `None` for host tensors
    #[inline]
    pub fn device(&self) -> Option<&Device> {
        self.storage.device()
    }

    /// A single element in host memory, eligible for scalar lifting
    #[inline]
    pub fn is_host_scalar(&self) -> bool {
        self.storage.is_host() && self.numel() == 1
    }
}

fn element_count(shape: &[usize]) -> Result<usize> {
    checked_elem_count(shape)
        .ok_or_else(|| Error::invalid_argument("shape", format!("{shape:?} overflows usize elements")))
}

fn check_in_bounds(storage: &Storage, layout: &Layout, dtype: DType) -> Result<()> {
    let Some((lo, hi)) = layout.offset_range() else {
        return Ok(());
    };
    let elem = dtype.size_in_bytes() as isize;
    let end = (hi + 1) * elem;
    if lo < 0 || end > storage.size_in_bytes() as isize {
        return Err(Error::invalid_argument(
            "layout",
            format!(
                "{layout:?} reaches elements {lo}..={hi} of a {}-byte {dtype} buffer",
                storage.size_in_bytes()
            ),
        ));
    }
    Ok(())
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape())
            .field("strides", &self.strides())
            .field("dtype", &self.dtype)
            .field("residency", self.storage.residency())
            .finish()
    }
}
