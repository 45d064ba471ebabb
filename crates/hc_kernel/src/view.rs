// crates/hc_kernel/src/view.rs

//! 变量视图
//!
//! [`VariableView`] 是指向内核内部数组的非拥有引用。写入直接作用于内核
//! 内存，从不替换目标数组；每次访问都检查所属会话是否仍然有效，内核终止
//! 后的访问返回 [`KernelError::ViewExpired`]。
//!
//! 视图包含裸指针，因此既不是 `Send` 也不是 `Sync`，只能在驱动线程内使用。

use crate::engine::{ElementType, RawArray};
use crate::error::KernelError;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod sealed {
    pub trait Sealed {}
    impl Sealed for f64 {}
    impl Sealed for i32 {}
}

/// 视图元素类型
pub trait ViewElement: Copy + sealed::Sealed + 'static {
    /// 对应的引擎元素类型
    const ELEMENT: ElementType;

    /// 转为 `f64`
    fn to_f64(self) -> f64;
}

impl ViewElement for f64 {
    const ELEMENT: ElementType = ElementType::F64;

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }
}

impl ViewElement for i32 {
    const ELEMENT: ElementType = ElementType::I32;

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }
}

/// 内核会话标志
///
/// 内核初始化时创建，终止时清除。所有视图共享同一标志。
#[derive(Debug, Clone)]
pub(crate) struct Session {
    alive: Arc<AtomicBool>,
}

impl Session {
    pub(crate) fn new() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn expire(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

/// 指向内核内存的变量视图
pub struct VariableView<T: ViewElement> {
    address: Rc<str>,
    ptr: NonNull<T>,
    len: usize,
    offset: usize,
    stride: usize,
    session: Session,
    _marker: PhantomData<*mut T>,
}

impl<T: ViewElement> Clone for VariableView<T> {
    fn clone(&self) -> Self {
        Self {
            address: Rc::clone(&self.address),
            ptr: self.ptr,
            len: self.len,
            offset: self.offset,
            stride: self.stride,
            session: self.session.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: ViewElement> std::fmt::Debug for VariableView<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariableView")
            .field("address", &self.address)
            .field("len", &self.len)
            .field("offset", &self.offset)
            .field("stride", &self.stride)
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl<T: ViewElement> VariableView<T> {
    /// 由引擎数组构造视图
    ///
    /// 对二维数组可选取一列，得到跨步视图；不选列时视图覆盖全部元素。
    ///
    /// # Safety
    ///
    /// `raw.ptr` 必须指向至少 `raw.len()` 个 `raw.element` 类型的元素，并在
    /// `session` 存活期间保持有效且不被移动。
    pub(crate) unsafe fn from_raw(
        kernel: &str,
        address: &str,
        raw: &RawArray,
        column: Option<usize>,
        session: Session,
    ) -> Result<Self, KernelError> {
        if raw.element != T::ELEMENT {
            return Err(KernelError::TypeMismatch {
                address: address.to_string(),
                expected: T::ELEMENT,
                actual: raw.element,
            });
        }

        let cols = raw.cols();
        let (len, offset, stride) = match column {
            Some(c) if c >= cols => {
                return Err(KernelError::ColumnOutOfRange {
                    address: address.to_string(),
                    column: c,
                    cols,
                })
            }
            Some(c) => (raw.rows(), c, cols),
            None => (raw.len(), 0, 1),
        };

        let ptr = match NonNull::new(raw.ptr as *mut T) {
            Some(p) => p,
            None if raw.is_empty() => NonNull::dangling(),
            None => {
                return Err(KernelError::VariableNotFound {
                    kernel: kernel.to_string(),
                    address: format!("{address} (空指针)"),
                })
            }
        };

        Ok(Self {
            address: Rc::from(address),
            ptr,
            len,
            offset,
            stride,
            session,
            _marker: PhantomData,
        })
    }

    /// 变量地址
    pub fn address(&self) -> &str {
        &self.address
    }

    /// 逻辑元素数
    pub fn len(&self) -> usize {
        self.len
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 所属会话是否仍有效
    pub fn is_valid(&self) -> bool {
        self.session.is_alive()
    }

    #[inline]
    fn slot(&self, index: usize) -> Result<*mut T, KernelError> {
        if !self.session.is_alive() {
            return Err(KernelError::ViewExpired {
                address: self.address.to_string(),
            });
        }
        if index >= self.len {
            return Err(KernelError::IndexOutOfBounds {
                address: self.address.to_string(),
                index,
                len: self.len,
            });
        }
        // SAFETY: index < len，且 offset + index * stride 落在构造时校验过的数组范围内。
        Ok(unsafe { self.ptr.as_ptr().add(self.offset + index * self.stride) })
    }

    /// 读取一个元素
    #[inline]
    pub fn get(&self, index: usize) -> Result<T, KernelError> {
        let p = self.slot(index)?;
        // SAFETY: 会话存活，指针有效且已对齐。
        Ok(unsafe { p.read() })
    }

    /// 写入一个元素
    #[inline]
    pub fn set(&self, index: usize, value: T) -> Result<(), KernelError> {
        let p = self.slot(index)?;
        // SAFETY: 同上；内核在交换阶段不会并发访问该内存。
        unsafe { p.write(value) };
        Ok(())
    }

    /// 复制全部元素
    pub fn to_vec(&self) -> Result<Vec<T>, KernelError> {
        (0..self.len).map(|i| self.get(i)).collect()
    }

    /// 用切片覆盖全部元素（原地写入）
    pub fn copy_from_slice(&self, values: &[T]) -> Result<(), KernelError> {
        if values.len() != self.len {
            return Err(KernelError::IndexOutOfBounds {
                address: self.address.to_string(),
                index: values.len(),
                len: self.len,
            });
        }
        for (i, v) in values.iter().enumerate() {
            self.set(i, *v)?;
        }
        Ok(())
    }

    /// 统计满足条件的元素个数
    pub fn count_where(&self, mut predicate: impl FnMut(T) -> bool) -> Result<usize, KernelError> {
        let mut n = 0;
        for i in 0..self.len {
            if predicate(self.get(i)?) {
                n += 1;
            }
        }
        Ok(n)
    }

    fn byte_range(&self) -> (usize, usize) {
        let size = std::mem::size_of::<T>();
        let start = self.ptr.as_ptr() as usize + self.offset * size;
        let span = if self.len == 0 {
            0
        } else {
            ((self.len - 1) * self.stride + 1) * size
        };
        (start, start + span)
    }

    /// 字节区间 `[start, start + size)` 是否与本视图的某个元素相交
    fn touches(&self, start: i128, size: i128) -> bool {
        if self.len == 0 {
            return false;
        }
        let elem = std::mem::size_of::<T>() as i128;
        let base = self.ptr.as_ptr() as usize as i128 + self.offset as i128 * elem;
        let step = self.stride as i128 * elem;
        // 元素 i 相交当且仅当 start - base - elem < i * step < start + size - base
        let i = ((start - base - elem).div_euclid(step) + 1).max(0);
        i < self.len as i128 && i * step < start + size - base
    }

    /// 两个视图的元素是否共享内存
    ///
    /// 同一二维数组的不同列互不重叠。
    pub fn overlaps<U: ViewElement>(&self, other: &VariableView<U>) -> bool {
        let (a0, a1) = self.byte_range();
        let (b0, b1) = other.byte_range();
        if !(a0 < b1 && b0 < a1) {
            return false;
        }
        if self.len <= other.len {
            let size = std::mem::size_of::<T>() as i128;
            let (start, _) = self.byte_range();
            let step = (self.stride * std::mem::size_of::<T>()) as i128;
            (0..self.len as i128).any(|i| other.touches(start as i128 + i * step, size))
        } else {
            other.overlaps(self)
        }
    }
}

impl VariableView<f64> {
    /// 原地累加
    #[inline]
    pub fn add(&self, index: usize, value: f64) -> Result<(), KernelError> {
        let p = self.slot(index)?;
        // SAFETY: 同 `set`。
        unsafe { p.write(p.read() + value) };
        Ok(())
    }

    /// 原地缩放
    #[inline]
    pub fn scale(&self, index: usize, factor: f64) -> Result<(), KernelError> {
        let p = self.slot(index)?;
        // SAFETY: 同 `set`。
        unsafe { p.write(p.read() * factor) };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_of(data: &mut [f64], shape: Vec<usize>) -> RawArray {
        RawArray {
            ptr: data.as_mut_ptr() as *mut u8,
            element: ElementType::F64,
            shape,
        }
    }

    #[test]
    fn test_column_view_is_strided() {
        let mut data = vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0];
        let raw = raw_of(&mut data, vec![3, 2]);
        let view = unsafe { VariableView::<f64>::from_raw("k", "BOUND", &raw, Some(1), Session::new()) }.unwrap();
        assert_eq!(view.len(), 3);
        assert_eq!(view.to_vec().unwrap(), vec![10.0, 20.0, 30.0]);
        view.set(1, -5.0).unwrap();
        assert_eq!(data[3], -5.0);
    }

    #[test]
    fn test_column_out_of_range() {
        let mut data = vec![0.0; 4];
        let raw = raw_of(&mut data, vec![2, 2]);
        let err = unsafe { VariableView::<f64>::from_raw("k", "BOUND", &raw, Some(2), Session::new()) }.unwrap_err();
        assert!(matches!(err, KernelError::ColumnOutOfRange { column: 2, cols: 2, .. }));
    }

    #[test]
    fn test_type_mismatch() {
        let mut data = vec![0.0; 2];
        let raw = raw_of(&mut data, vec![2]);
        let err = unsafe { VariableView::<i32>::from_raw("k", "X", &raw, None, Session::new()) }.unwrap_err();
        assert!(matches!(err, KernelError::TypeMismatch { .. }));
    }

    #[test]
    fn test_expired_session_blocks_access() {
        let mut data = vec![1.0, 2.0];
        let raw = raw_of(&mut data, vec![2]);
        let session = Session::new();
        let view = unsafe { VariableView::<f64>::from_raw("k", "X", &raw, None, session.clone()) }.unwrap();
        assert_eq!(view.get(0).unwrap(), 1.0);
        session.expire();
        assert!(!view.is_valid());
        assert!(matches!(view.get(0), Err(KernelError::ViewExpired { .. })));
        assert!(matches!(view.set(0, 3.0), Err(KernelError::ViewExpired { .. })));
    }

    #[test]
    fn test_bounds_and_accumulate() {
        let mut data = vec![1.0, 2.0];
        let raw = raw_of(&mut data, vec![2]);
        let view = unsafe { VariableView::<f64>::from_raw("k", "X", &raw, None, Session::new()) }.unwrap();
        assert!(view.get(2).is_err());
        view.add(1, 0.5).unwrap();
        view.scale(0, 4.0).unwrap();
        assert_eq!(view.to_vec().unwrap(), vec![4.0, 2.5]);
    }

    #[test]
    fn test_overlap_detection() {
        let mut data = vec![0.0; 6];
        let raw = raw_of(&mut data, vec![3, 2]);
        let s = Session::new();
        let col0 = unsafe { VariableView::<f64>::from_raw("k", "A", &raw, Some(0), s.clone()) }.unwrap();
        let whole = unsafe { VariableView::<f64>::from_raw("k", "A", &raw, None, s.clone()) }.unwrap();
        assert!(col0.overlaps(&whole));

        let mut other = vec![0.0; 2];
        let raw2 = raw_of(&mut other, vec![2]);
        let separate = unsafe { VariableView::<f64>::from_raw("k", "B", &raw2, None, s) }.unwrap();
        assert!(!whole.overlaps(&separate));
    }

    #[test]
    fn test_disjoint_columns_do_not_overlap() {
        let mut data = vec![0.0; 8];
        let raw = raw_of(&mut data, vec![4, 2]);
        let s = Session::new();
        let col0 = unsafe { VariableView::<f64>::from_raw("k", "BOUND", &raw, Some(0), s.clone()) }.unwrap();
        let col1 = unsafe { VariableView::<f64>::from_raw("k", "BOUND", &raw, Some(1), s.clone()) }.unwrap();
        assert!(!col0.overlaps(&col1));
        assert!(!col1.overlaps(&col0));
        assert!(col1.overlaps(&col1.clone()));

        let whole = unsafe { VariableView::<f64>::from_raw("k", "BOUND", &raw, None, s) }.unwrap();
        assert!(col1.overlaps(&whole));
        assert!(whole.overlaps(&col0));
    }
}
