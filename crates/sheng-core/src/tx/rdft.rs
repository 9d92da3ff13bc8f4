//! 实数 FFT.

use std::sync::Arc;

use num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::error::{ShengError, ShengResult};
use crate::float_dsp::Real;

/// 长度为 `len` 的实数 FFT, 正反变换均不归一化.
///
/// 正变换输出 `len / 2 + 1` 个复数频点; 反变换前会清除直流与 Nyquist
/// 频点的虚部, 因此 `inverse(forward(x)) = len · x`.
pub struct Rdft<T: Real> {
    len: usize,
    forward: Arc<dyn RealToComplex<T>>,
    inverse: Arc<dyn ComplexToReal<T>>,
    time: Vec<T>,
    freq: Vec<Complex<T>>,
    scratch: Vec<Complex<T>>,
}

impl<T: Real> Rdft<T> {
    /// 创建指定长度的变换
    pub fn new(len: usize) -> ShengResult<Self> {
        if len < 2 {
            return Err(ShengError::InvalidArgument(format!(
                "RDFT 长度过小: {len}"
            )));
        }
        let mut planner = RealFftPlanner::<T>::new();
        let forward = planner.plan_fft_forward(len);
        let inverse = planner.plan_fft_inverse(len);
        let scratch_len = forward
            .get_scratch_len()
            .max(inverse.get_scratch_len());
        log::debug!("RDFT 初始化: len={len}, scratch={scratch_len}");
        Ok(Self {
            len,
            forward,
            inverse,
            time: vec![T::zero(); len],
            freq: vec![Complex::new(T::zero(), T::zero()); len / 2 + 1],
            scratch: vec![Complex::new(T::zero(), T::zero()); scratch_len],
        })
    }

    /// 时域长度
    pub fn len(&self) -> usize {
        self.len
    }

    /// 频点数 (`len / 2 + 1`)
    pub fn bins(&self) -> usize {
        self.len / 2 + 1
    }

    /// 正变换: `input` 长度为 `len`, `output` 长度为 `bins()`
    pub fn forward(&mut self, input: &[T], output: &mut [Complex<T>]) -> ShengResult<()> {
        if input.len() != self.len || output.len() != self.bins() {
            return Err(ShengError::InvalidArgument(format!(
                "RDFT 正变换长度不匹配: 输入 {}, 输出 {}, 期望 {}/{}",
                input.len(),
                output.len(),
                self.len,
                self.bins()
            )));
        }
        self.time.copy_from_slice(input);
        self.forward
            .process_with_scratch(&mut self.time, output, &mut self.scratch)
            .map_err(|e| ShengError::Internal(format!("RDFT 正变换失败: {e}")))
    }

    /// 反变换: `input` 长度为 `bins()`, `output` 长度为 `len`
    pub fn inverse(&mut self, input: &[Complex<T>], output: &mut [T]) -> ShengResult<()> {
        if input.len() != self.bins() || output.len() != self.len {
            return Err(ShengError::InvalidArgument(format!(
                "RDFT 反变换长度不匹配: 输入 {}, 输出 {}, 期望 {}/{}",
                input.len(),
                output.len(),
                self.bins(),
                self.len
            )));
        }
        self.freq.copy_from_slice(input);
        self.freq[0].im = T::zero();
        if self.len % 2 == 0 {
            let last = self.freq.len() - 1;
            self.freq[last].im = T::zero();
        }
        self.inverse
            .process_with_scratch(&mut self.freq, output, &mut self.scratch)
            .map_err(|e| ShengError::Internal(format!("RDFT 反变换失败: {e}")))
    }
}
