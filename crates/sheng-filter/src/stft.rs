//! 短时傅里叶变换 (STFT) 分析 / 重建引擎.
//!
//! 分析端: 输入按 hop 滑动, 乘窗与输入电平后做实数 FFT.
//! 重建端: 反变换后再乘一次窗, 叠加到重叠缓冲并输出一个 hop.
//! 两端窗的乘积在 hop 平移下的叠加和为常数时, 未修改的频谱可精确还原输入.

use std::ops::Range;

use num_complex::Complex;
use sheng_core::float_dsp::{Real, cst};
use sheng_core::tx::Rdft;
use sheng_core::{ShengError, ShengResult, WindowFunc};

/// 窗长、hop 与窗表
#[derive(Debug, Clone)]
pub struct StftLayout {
    pub win_size: usize,
    pub hop: usize,
    /// 分析与重建各乘一次的窗表
    pub window: Vec<f64>,
    /// 重建增益 `1 / (win_size · max Σ w²)`
    pub win_gain: f64,
}

impl StftLayout {
    /// 由窗长、重叠比例与窗类型构造.
    ///
    /// `sqrt_window` 为 true 时两端各乘窗函数的平方根, 否则各乘完整窗函数.
    pub fn new(
        win_size: usize,
        overlap: f64,
        func: WindowFunc,
        sqrt_window: bool,
    ) -> ShengResult<Self> {
        if win_size < 4 || win_size % 2 != 0 {
            return Err(ShengError::InvalidArgument(format!(
                "STFT 窗长必须为不小于 4 的偶数: {win_size}"
            )));
        }
        if !(0.0..1.0).contains(&overlap) {
            return Err(ShengError::InvalidArgument(format!(
                "STFT 重叠比例超出 [0, 1): {overlap}"
            )));
        }
        let hop = ((win_size as f64 * (1.0 - overlap)) as usize).clamp(1, win_size);
        let mut window = func.generate(win_size);
        if sqrt_window {
            for w in &mut window {
                *w = w.max(0.0).sqrt();
            }
        }

        let mut sum = vec![0.0f64; win_size];
        let mut j = 0;
        while j < win_size {
            for (i, &w) in window.iter().enumerate() {
                sum[(i + j) % win_size] += w * w;
            }
            j += hop;
        }
        let max = sum.iter().fold(0.0f64, |m, &v| m.max(v));
        if max <= 0.0 {
            return Err(ShengError::InvalidArgument("STFT 窗函数全为零".into()));
        }
        let win_gain = 1.0 / (win_size as f64 * max);
        log::debug!("STFT 布局: win={win_size}, hop={hop}, win_gain={win_gain:e}");

        Ok(Self {
            win_size,
            hop,
            window,
            win_gain,
        })
    }

    /// 频点数
    pub fn bins(&self) -> usize {
        self.win_size / 2 + 1
    }

    /// 输出相对输入的延迟 (采样)
    pub fn latency(&self) -> usize {
        self.win_size - self.hop
    }
}

/// 单声道 STFT 分析器
pub struct StftAnalyzer<T: Real> {
    rdft: Rdft<T>,
    hop: usize,
    input: Vec<T>,
    windowed: Vec<T>,
    window: Vec<T>,
    level: T,
}

impl<T: Real> StftAnalyzer<T> {
    /// `level` 为输入电平
    pub fn new(layout: &StftLayout, level: f64) -> ShengResult<Self> {
        Ok(Self {
            rdft: Rdft::new(layout.win_size)?,
            hop: layout.hop,
            input: vec![T::zero(); layout.win_size],
            windowed: vec![T::zero(); layout.win_size],
            window: layout.window.iter().map(|&w| cst(w)).collect(),
            level: cst(level),
        })
    }

    /// 送入一个 hop (不足时补零) 并输出当前窗的频谱
    pub fn analyze(&mut self, hop_in: &[T], spectrum: &mut [Complex<T>]) -> ShengResult<()> {
        if hop_in.len() > self.hop {
            return Err(ShengError::InvalidArgument(format!(
                "STFT 输入超过 hop: {} > {}",
                hop_in.len(),
                self.hop
            )));
        }
        let win = self.input.len();
        let offset = win - self.hop;
        self.input.copy_within(self.hop.., 0);
        self.input[offset..offset + hop_in.len()].copy_from_slice(hop_in);
        self.input[offset + hop_in.len()..].fill(T::zero());

        for ((d, &s), &w) in self.windowed.iter_mut().zip(&self.input).zip(&self.window) {
            *d = s * w * self.level;
        }
        self.rdft.forward(&self.windowed, spectrum)
    }
}

/// 单声道 STFT 重建器
pub struct StftSynthesizer<T: Real> {
    rdft: Rdft<T>,
    hop: usize,
    time: Vec<T>,
    overlap: Vec<T>,
    window: Vec<T>,
    gain: T,
}

impl<T: Real> StftSynthesizer<T> {
    /// `level` 为输出电平, 与布局的重建增益合并
    pub fn new(layout: &StftLayout, level: f64) -> ShengResult<Self> {
        Ok(Self {
            rdft: Rdft::new(layout.win_size)?,
            hop: layout.hop,
            time: vec![T::zero(); layout.win_size],
            overlap: vec![T::zero(); layout.win_size],
            window: layout.window.iter().map(|&w| cst(w)).collect(),
            gain: cst(level * layout.win_gain),
        })
    }

    /// 反变换并叠加, 输出一个 hop 到 `out`
    pub fn synthesize(&mut self, spectrum: &[Complex<T>], out: &mut [T]) -> ShengResult<()> {
        self.rdft.inverse(spectrum, &mut self.time)?;

        let win = self.overlap.len();
        self.overlap.copy_within(self.hop.., 0);
        self.overlap[win - self.hop..].fill(T::zero());
        for ((o, &t), &w) in self.overlap.iter_mut().zip(&self.time).zip(&self.window) {
            *o = *o + t * w * self.gain;
        }

        let n = out.len().min(self.hop);
        out[..n].copy_from_slice(&self.overlap[..n]);
        Ok(())
    }
}

/// 多声道 hop 分块队列, 负责延迟补偿与刷新补零.
///
/// 输出总长度与输入总长度一致: 开头 `latency` 个重建采样被丢弃,
/// 刷新时补零直到所有输入都已输出. 已取走的 hop 只推进读位置,
/// 下次写入前统一前移, 稳态下不再分配.
pub struct HopQueue<T> {
    hop: usize,
    latency: usize,
    pending: Vec<Vec<T>>,
    /// 已取走的前缀长度
    read: usize,
    to_skip: usize,
    total_in: u64,
    total_out: u64,
    first_pts: Option<i64>,
}

impl<T: Copy + Default> HopQueue<T> {
    pub fn new(channels: usize, hop: usize, latency: usize) -> Self {
        Self {
            hop,
            latency,
            pending: (0..channels).map(|_| Vec::with_capacity(2 * hop)).collect(),
            read: 0,
            to_skip: latency,
            total_in: 0,
            total_out: 0,
            first_pts: None,
        }
    }

    /// 追加各声道输入
    pub fn push<P: AsRef<[T]>>(&mut self, planes: &[P], pts: i64) {
        if self.first_pts.is_none() {
            self.first_pts = Some(pts);
        }
        self.compact();
        if let Some(first) = planes.first() {
            self.total_in += first.as_ref().len() as u64;
        }
        for (dst, src) in self.pending.iter_mut().zip(planes) {
            dst.extend_from_slice(src.as_ref());
        }
    }

    fn compact(&mut self) {
        if self.read > 0 {
            for p in &mut self.pending {
                p.drain(..self.read);
            }
            self.read = 0;
        }
    }

    /// 是否攒够一个完整 hop
    pub fn has_block(&self) -> bool {
        self.pending
            .first()
            .is_some_and(|p| p.len() - self.read >= self.hop)
    }

    /// 当前 hop 中第 `ch` 声道的输入, 须先确认 [`Self::has_block`]
    pub fn block(&self, ch: usize) -> &[T] {
        &self.pending[ch][self.read..self.read + self.hop]
    }

    /// 取走当前 hop
    pub fn advance(&mut self) {
        self.read += self.hop;
    }

    /// 刷新: 补零使剩余输入与延迟都能以整 hop 处理完
    pub fn pad_for_flush(&mut self) {
        self.compact();
        let left = self.pending.first().map_or(0, Vec::len);
        if left == 0 && self.total_out >= self.total_in {
            return;
        }
        let need = left + self.latency;
        let padded = need.div_ceil(self.hop) * self.hop;
        for p in &mut self.pending {
            p.resize(padded, T::default());
        }
    }

    /// 登记一个长 `len` 的输出 hop, 返回去掉延迟与超出部分后应保留的区间
    pub fn emit(&mut self, len: usize) -> Range<usize> {
        let skip = self.to_skip.min(len);
        self.to_skip -= skip;
        let avail = (self.total_in - self.total_out) as usize;
        let keep = (len - skip).min(avail);
        self.total_out += keep as u64;
        skip..skip + keep
    }

    /// 首个输入帧的时间戳
    pub fn first_pts(&self) -> i64 {
        self.first_pts.unwrap_or(sheng_codec::frame::NOPTS_VALUE)
    }

    /// 已输出的采样数
    pub fn total_out(&self) -> u64 {
        self.total_out
    }
}
