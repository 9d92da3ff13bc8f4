//! 浮点 / 定点 DSP 基础运算.
//!
//! 对标 FFmpeg 的 `AVFloatDSPContext` / `AVFixedDSPContext`, 提供蝶形、
//! 标量乘、乘加等向量原语. 所有浮点原语对 [`Real`] 泛型实现.

use std::fmt::Debug;

use num_complex::Complex;
use num_traits::{Float, FloatConst, FromPrimitive};
use rustfft::FftNum;

/// 计算标量类型 (f32 / f64)
pub trait Real:
    FftNum + Float + FloatConst + FromPrimitive + Default + Send + Sync + Debug + 'static
{
}

impl<T> Real for T where
    T: FftNum + Float + FloatConst + FromPrimitive + Default + Send + Sync + Debug + 'static
{
}

/// 将 f64 常量转换为计算类型
#[inline]
pub fn cst<T: Real>(v: f64) -> T {
    T::from_f64(v).unwrap_or_else(T::zero)
}

/// 是否为正规数 (非零、非无穷、非 NaN、非次正规)
#[inline]
pub fn is_normal<T: Real>(v: T) -> bool {
    v.is_normal()
}

/// 非正规值清零, 用于递归状态的每块复位
#[inline]
pub fn flush_denormal<T: Real>(v: T) -> T {
    if v.is_normal() { v } else { T::zero() }
}

/// 原地蝶形: `(a, b) -> (a + b, a - b)`
pub fn butterflies<T: Real>(v1: &mut [T], v2: &mut [T]) {
    for (a, b) in v1.iter_mut().zip(v2.iter_mut()) {
        let t = *a - *b;
        *a = *a + *b;
        *b = t;
    }
}

/// 带缩放的原地蝶形: `(a, b) -> ((a + b)·s, (a - b)·s)`
pub fn butterflies_scaled<T: Real>(v1: &mut [T], v2: &mut [T], scale: T) {
    for (a, b) in v1.iter_mut().zip(v2.iter_mut()) {
        let t = (*a - *b) * scale;
        *a = (*a + *b) * scale;
        *b = t;
    }
}

/// 定点原地蝶形, 溢出按二进制补码回绕
pub fn butterflies_fixed(v1: &mut [i32], v2: &mut [i32]) {
    for (a, b) in v1.iter_mut().zip(v2.iter_mut()) {
        let t = a.wrapping_sub(*b);
        *a = a.wrapping_add(*b);
        *b = t;
    }
}

/// `dst[i] = src[i] · mul`
pub fn vector_fmul_scalar<T: Real>(dst: &mut [T], src: &[T], mul: T) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = s * mul;
    }
}

/// `dst[i] = a[i] · b[i]`
pub fn vector_fmul<T: Real>(dst: &mut [T], a: &[T], b: &[T]) {
    for ((d, &x), &y) in dst.iter_mut().zip(a).zip(b) {
        *d = x * y;
    }
}

/// `dst[i] = a[i] · b[len - 1 - i]`
pub fn vector_fmul_reverse<T: Real>(dst: &mut [T], a: &[T], b: &[T]) {
    let len = dst.len().min(a.len()).min(b.len());
    for i in 0..len {
        dst[i] = a[i] * b[len - 1 - i];
    }
}

/// `dst[i] += src[i] · mul`
pub fn vector_fmac_scalar<T: Real>(dst: &mut [T], src: &[T], mul: T) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = *d + s * mul;
    }
}

/// 复数乘加: `acc[i] += a[i] · b[i]`
pub fn complex_fmac<T: Real>(acc: &mut [Complex<T>], a: &[Complex<T>], b: &[Complex<T>]) {
    for ((s, &x), &y) in acc.iter_mut().zip(a).zip(b) {
        *s = *s + x * y;
    }
}

/// 标量点积
pub fn scalarproduct<T: Real>(a: &[T], b: &[T]) -> T {
    a.iter().zip(b).fold(T::zero(), |acc, (&x, &y)| acc + x * y)
}
