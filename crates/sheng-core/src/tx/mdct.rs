//! MDCT / IMDCT.
//!
//! 核函数 `cos(π/N · (n + ½ + N/2) · (k + ½))`, 通过 2N 点复数 FFT 计算:
//! 正变换先对输入乘 `e^{-iπn/2N}` 再做 FFT, 逐点乘相位后取实部;
//! 反变换对频谱乘相位后做 2N 点逆 FFT, 再乘 `e^{iπ(n+n0)/2N}` 取实部.

use std::sync::Arc;

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::error::{ShengError, ShengResult};
use crate::float_dsp::{Real, cst};

/// N 点 MDCT (2N 个时域样本 ↔ N 个频谱系数)
pub struct Mdct<T: Real> {
    n: usize,
    scale: T,
    fft: Arc<dyn Fft<T>>,
    ifft: Arc<dyn Fft<T>>,
    /// 正变换输入调制 `e^{-iπn/2N}`, 长度 2N
    pre_fwd: Vec<Complex<T>>,
    /// 正变换输出相位 `e^{-iπ·n0·(k+½)/N}`, 长度 N
    post_fwd: Vec<Complex<T>>,
    /// 反变换输入相位 `e^{iπ·n0·k/N}`, 长度 N
    pre_inv: Vec<Complex<T>>,
    /// 反变换输出调制 `e^{iπ(n+n0)/2N}`, 长度 2N
    post_inv: Vec<Complex<T>>,
    buf: Vec<Complex<T>>,
    scratch: Vec<Complex<T>>,
}

impl<T: Real> Mdct<T> {
    /// 创建输出 `n` 个系数的 MDCT, 正反变换结果都乘以 `scale`
    pub fn new(n: usize, scale: f64) -> ShengResult<Self> {
        if n == 0 || n % 2 != 0 {
            return Err(ShengError::InvalidArgument(format!(
                "MDCT 长度必须为正偶数: {n}"
            )));
        }
        let n2 = 2 * n;
        let mut planner = FftPlanner::<T>::new();
        let fft = planner.plan_fft_forward(n2);
        let ifft = planner.plan_fft_inverse(n2);
        let scratch_len = fft
            .get_inplace_scratch_len()
            .max(ifft.get_inplace_scratch_len());

        let nf = n as f64;
        let n0 = 0.5 + nf / 2.0;
        let pi = std::f64::consts::PI;
        let phasor = |theta: f64| Complex::new(cst::<T>(theta.cos()), cst::<T>(theta.sin()));

        Ok(Self {
            n,
            scale: cst(scale),
            fft,
            ifft,
            pre_fwd: (0..n2).map(|i| phasor(-pi * i as f64 / (2.0 * nf))).collect(),
            post_fwd: (0..n)
                .map(|k| phasor(-pi * n0 * (k as f64 + 0.5) / nf))
                .collect(),
            pre_inv: (0..n).map(|k| phasor(pi * n0 * k as f64 / nf)).collect(),
            post_inv: (0..n2)
                .map(|i| phasor(pi * (i as f64 + n0) / (2.0 * nf)))
                .collect(),
            buf: vec![Complex::new(T::zero(), T::zero()); n2],
            scratch: vec![Complex::new(T::zero(), T::zero()); scratch_len],
        })
    }

    /// 频谱系数个数 N
    pub fn len(&self) -> usize {
        self.n
    }

    /// 正变换: 2N 个时域样本 → N 个系数
    pub fn forward(&mut self, input: &[T], output: &mut [T]) -> ShengResult<()> {
        if input.len() != 2 * self.n || output.len() != self.n {
            return Err(ShengError::InvalidArgument(format!(
                "MDCT 长度不匹配: 输入 {}, 输出 {}, N={}",
                input.len(),
                output.len(),
                self.n
            )));
        }
        for ((b, &x), &w) in self.buf.iter_mut().zip(input).zip(&self.pre_fwd) {
            *b = w * x;
        }
        self.fft.process_with_scratch(&mut self.buf, &mut self.scratch);
        for ((o, b), w) in output.iter_mut().zip(&self.buf).zip(&self.post_fwd) {
            *o = (*b * *w).re * self.scale;
        }
        Ok(())
    }

    /// 反变换: N 个系数 → 2N 个时域样本 (未加窗)
    pub fn inverse(&mut self, input: &[T], output: &mut [T]) -> ShengResult<()> {
        if input.len() != self.n || output.len() != 2 * self.n {
            return Err(ShengError::InvalidArgument(format!(
                "IMDCT 长度不匹配: 输入 {}, 输出 {}, N={}",
                input.len(),
                output.len(),
                self.n
            )));
        }
        let (head, tail) = self.buf.split_at_mut(self.n);
        for ((b, &x), &w) in head.iter_mut().zip(input).zip(&self.pre_inv) {
            *b = w * x;
        }
        tail.fill(Complex::new(T::zero(), T::zero()));
        self.ifft.process_with_scratch(&mut self.buf, &mut self.scratch);
        for ((o, b), w) in output.iter_mut().zip(&self.buf).zip(&self.post_inv) {
            *o = (*b * *w).re * self.scale;
        }
        Ok(())
    }
}
