//! Storage: host or device memory with Arc-based sharing

use crate::error::{Error, Result};
use crate::runtime::Device;
use std::alloc::{Layout as AllocLayout, alloc_zeroed, dealloc};
use std::ptr::NonNull;
use std::sync::Arc;

/// Alignment of every allocation (AVX-512 width)
const ALIGN: usize = 64;

/// Where a buffer lives
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Residency {
    /// Ordinary host memory, readable without synchronization
    Host,
    /// Memory owned by a parallel device; kernels may still be writing it
    Device(Device),
}

/// Reference-counted byte buffer.
///
/// Storage wraps zero-initialized memory with reference counting, enabling
/// zero-copy views (transpose, narrow, broadcast) that share the underlying
/// buffer. Enqueued kernels hold a clone, so a buffer outlives every launch
/// that touches it.
///
/// Memory is automatically deallocated when the last reference is dropped.
#[derive(Clone)]
pub struct Storage {
    inner: Arc<StorageInner>,
}

struct StorageInner {
    ptr: NonNull<u8>,
    size_bytes: usize,
    residency: Residency,
}

// Kernels write disjoint elements of the same buffer from several threads;
// the buffer itself is never reallocated while shared.
unsafe impl Send for StorageInner {}
unsafe impl Sync for StorageInner {}

impl Storage {
    /// Allocate `size_bytes` zeroed bytes
    pub fn zeroed(size_bytes: usize, residency: Residency) -> Result<Self> {
        let ptr = if size_bytes == 0 {
            NonNull::dangling()
        } else {
            let layout = AllocLayout::from_size_align(size_bytes, ALIGN)
                .map_err(|_| Error::OutOfMemory { size: size_bytes })?;
            // SAFETY: layout has nonzero size
            let raw = unsafe { alloc_zeroed(layout) };
            NonNull::new(raw).ok_or(Error::OutOfMemory { size: size_bytes })?
        };

        if let Residency::Device(device) = &residency {
            device.track_alloc(size_bytes);
        }

        Ok(Self {
            inner: Arc::new(StorageInner {
                ptr,
                size_bytes,
                residency,
            }),
        })
    }

    /// Allocate and fill from raw bytes
    pub fn from_bytes(data: &[u8], residency: Residency) -> Result<Self> {
        let storage = Self::zeroed(data.len(), residency)?;
        if !data.is_empty() {
            // SAFETY: fresh allocation of exactly data.len() bytes
            unsafe {
                std::ptr::copy_nonoverlapping(data.as_ptr(), storage.as_ptr(), data.len());
            }
        }
        Ok(storage)
    }

    /// Base address of the buffer
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.inner.ptr.as_ptr()
    }

    /// Get size in bytes
    #[inline]
    pub fn size_in_bytes(&self) -> usize {
        self.inner.size_bytes
    }

    /// Where the buffer lives
    #[inline]
    pub fn residency(&self) -> &Residency {
        &self.inner.residency
    }

    /// Owning device, if the buffer is device memory
    #[inline]
    pub fn device(&self) -> Option<&Device> {
        match &self.inner.residency {
            Residency::Device(d) => Some(d),
            Residency::Host => None,
        }
    }

    /// True for host memory
    #[inline]
    pub fn is_host(&self) -> bool {
        matches!(self.inner.residency, Residency::Host)
    }

    /// Get the reference count
    #[inline]
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// True when both handles share one allocation
    #[inline]
    pub fn same_buffer(&self, other: &Storage) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Drop for StorageInner {
    fn drop(&mut self) {
        if self.size_bytes != 0 {
            if let Ok(layout) = AllocLayout::from_size_align(self.size_bytes, ALIGN) {
                // SAFETY: allocated in Storage::zeroed with this exact layout
                unsafe { dealloc(self.ptr.as_ptr(), layout) };
            }
        }
        if let Residency::Device(device) = &self.residency {
            device.track_free(self.size_bytes);
        }
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("ptr", &format!("{:p}", self.inner.ptr))
            .field("bytes", &self.inner.size_bytes)
            .field("residency", &self.inner.residency)
            .field("refs", &Arc::strong_count(&self.inner))
            .finish()
    }
}
