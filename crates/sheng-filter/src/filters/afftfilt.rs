//! 按频点回调的 STFT 滤镜.
//!
//! 对标 FFmpeg 的 `afftfilt`. 原滤镜以表达式描述每个频点的实部与虚部,
//! 这里由调用者提供闭包 [`SpectralFn`], 按频点接收 [`BinContext`] 与当前频谱值.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use num_complex::Complex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sheng_codec::frame::AudioFrame;
use sheng_core::float_dsp::{Real, cst};
use sheng_core::{ChannelLayout, Sample, SampleFormat, ShengError, ShengResult, WindowFunc};

use crate::Filter;
use crate::filters::{make_frame, offset_pts};
use crate::stft::{HopQueue, StftAnalyzer, StftLayout, StftSynthesizer};

/// 回调时可见的频点上下文
#[derive(Debug, Clone, Copy)]
pub struct BinContext {
    pub sample_rate: u32,
    /// 频点序号, 0 为直流
    pub bin: usize,
    pub nb_bins: usize,
    pub channel: usize,
    pub channels: usize,
    /// 当前分析窗新进入 hop 的首采样时间戳
    pub pts: i64,
}

impl BinContext {
    /// 频点中心频率 (Hz)
    pub fn frequency(&self) -> f64 {
        self.bin as f64 * self.sample_rate as f64 / (2.0 * (self.nb_bins - 1) as f64)
    }
}

/// 频点变换函数
pub type SpectralFn = Arc<dyn Fn(&BinContext, Complex<f64>) -> Complex<f64> + Send + Sync>;

/// afftfilt 参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AfftfiltConfig {
    pub win_size: usize,
    pub overlap: f64,
    pub win_func: WindowFunc,
}

impl Default for AfftfiltConfig {
    fn default() -> Self {
        Self {
            win_size: 4096,
            overlap: 0.75,
            win_func: WindowFunc::Hann,
        }
    }
}

struct ChannelStft<T: Real> {
    analyzer: StftAnalyzer<T>,
    synthesizer: StftSynthesizer<T>,
    spectrum: Vec<Complex<T>>,
    hop_out: Vec<T>,
    /// 本次驱动累计的输出
    out: Vec<T>,
}

struct Engine<T: Real> {
    channels: Vec<ChannelStft<T>>,
    queue: HopQueue<T>,
    hop: usize,
    blocks: u64,
}

impl<T: Real + Sample> Engine<T> {
    fn new(layout: &StftLayout, channels: usize) -> ShengResult<Self> {
        let states = (0..channels)
            .map(|_| {
                Ok(ChannelStft {
                    analyzer: StftAnalyzer::new(layout, 1.0)?,
                    synthesizer: StftSynthesizer::new(layout, 1.0)?,
                    spectrum: vec![Complex::new(T::zero(), T::zero()); layout.bins()],
                    hop_out: vec![T::zero(); layout.hop],
                    out: Vec::new(),
                })
            })
            .collect::<ShengResult<Vec<_>>>()?;
        Ok(Self {
            channels: states,
            queue: HopQueue::new(channels, layout.hop, layout.latency()),
            hop: layout.hop,
            blocks: 0,
        })
    }

    /// 处理队列中所有完整 hop, 返回输出起始采样
    fn run(&mut self, func: &SpectralFn, sample_rate: u32) -> ShengResult<u64> {
        let start = self.queue.total_out();
        let nb_channels = self.channels.len();
        for state in &mut self.channels {
            state.out.clear();
        }
        while self.queue.has_block() {
            let pts = offset_pts(self.queue.first_pts(), self.blocks * self.hop as u64);
            let queue = &self.queue;
            self.channels
                .par_iter_mut()
                .enumerate()
                .try_for_each(|(ch, state)| {
                    state.analyzer.analyze(queue.block(ch), &mut state.spectrum)?;
                    let nb_bins = state.spectrum.len();
                    for (bin, v) in state.spectrum.iter_mut().enumerate() {
                        let ctx = BinContext {
                            sample_rate,
                            bin,
                            nb_bins,
                            channel: ch,
                            channels: nb_channels,
                            pts,
                        };
                        let bin_in = Complex::new(Sample::to_f64(v.re), Sample::to_f64(v.im));
                        let r = func(&ctx, bin_in);
                        *v = Complex::new(cst(r.re), cst(r.im));
                    }
                    state.synthesizer.synthesize(&state.spectrum, &mut state.hop_out)
                })?;
            self.queue.advance();
            self.blocks += 1;
            let keep = self.queue.emit(self.hop);
            for state in &mut self.channels {
                state.out.extend_from_slice(&state.hop_out[keep.clone()]);
            }
        }
        Ok(start)
    }

    /// 把本次累计的输出打包成一帧
    fn output_frame(
        &self,
        start: u64,
        sample_rate: u32,
        layout: ChannelLayout,
    ) -> ShengResult<Option<AudioFrame>> {
        if self.channels.first().is_none_or(|c| c.out.is_empty()) {
            return Ok(None);
        }
        let planes: Vec<&[T]> = self.channels.iter().map(|c| c.out.as_slice()).collect();
        let pts = offset_pts(self.queue.first_pts(), start);
        make_frame::<T, _>(&planes, sample_rate, layout, pts).map(Some)
    }
}

enum EngineKind {
    F32(Engine<f32>),
    F64(Engine<f64>),
}

/// 按频点回调的 STFT 滤镜 (f32 / f64 采样)
pub struct AfftfiltFilter {
    layout: StftLayout,
    func: SpectralFn,
    engine: Option<EngineKind>,
    sample_rate: u32,
    channel_layout: ChannelLayout,
    outputs: VecDeque<AudioFrame>,
}

impl fmt::Debug for AfftfiltFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AfftfiltFilter")
            .field("layout", &self.layout)
            .field("sample_rate", &self.sample_rate)
            .finish_non_exhaustive()
    }
}

impl AfftfiltFilter {
    /// 创建恒等变换的滤镜
    pub fn new(config: AfftfiltConfig) -> ShengResult<Self> {
        Self::with_fn(config, Arc::new(|_: &BinContext, v: Complex<f64>| v))
    }

    /// 以自定义频点函数创建
    pub fn with_fn(config: AfftfiltConfig, func: SpectralFn) -> ShengResult<Self> {
        let layout = StftLayout::new(config.win_size, config.overlap, config.win_func, false)?;
        Ok(Self {
            layout,
            func,
            engine: None,
            sample_rate: 0,
            channel_layout: ChannelLayout::MONO,
            outputs: VecDeque::new(),
        })
    }

    /// 处理延迟 (采样)
    pub fn latency(&self) -> usize {
        self.layout.latency()
    }

    fn drive(&mut self) -> ShengResult<()> {
        let func = self.func.clone();
        let (sr, layout) = (self.sample_rate, self.channel_layout);
        let frame = match self.engine.as_mut() {
            Some(EngineKind::F32(e)) => {
                let start = e.run(&func, sr)?;
                e.output_frame(start, sr, layout)?
            }
            Some(EngineKind::F64(e)) => {
                let start = e.run(&func, sr)?;
                e.output_frame(start, sr, layout)?
            }
            None => None,
        };
        self.outputs.extend(frame);
        Ok(())
    }
}

impl Filter for AfftfiltFilter {
    fn name(&self) -> &str {
        "afftfilt"
    }

    fn send_frame(&mut self, frame: &AudioFrame) -> ShengResult<()> {
        let channels = frame.channels();
        if self.engine.is_none() {
            self.engine = Some(match frame.sample_format.to_planar() {
                SampleFormat::F32p => EngineKind::F32(Engine::new(&self.layout, channels)?),
                SampleFormat::F64p => EngineKind::F64(Engine::new(&self.layout, channels)?),
                other => {
                    return Err(ShengError::Unsupported(format!(
                        "afftfilt 只支持浮点采样: {other}"
                    )));
                }
            });
            self.sample_rate = frame.sample_rate;
            self.channel_layout = frame.channel_layout;
            log::debug!(
                "afftfilt 初始化: {channels} 声道, {} Hz, 延迟 {} 采样",
                frame.sample_rate,
                self.layout.latency()
            );
        } else if self.channel_layout != frame.channel_layout
            || self.sample_rate != frame.sample_rate
        {
            return Err(ShengError::InvalidArgument(
                "afftfilt: 流中途改变了声道布局或采样率".into(),
            ));
        }

        match self.engine.as_mut() {
            Some(EngineKind::F32(e)) => e.queue.push(&frame.planes::<f32>()?, frame.pts),
            Some(EngineKind::F64(e)) => e.queue.push(&frame.planes::<f64>()?, frame.pts),
            None => {}
        }
        self.drive()
    }

    fn receive_frame(&mut self) -> ShengResult<AudioFrame> {
        self.outputs.pop_front().ok_or(ShengError::NeedMoreData)
    }

    fn flush(&mut self) -> ShengResult<()> {
        match self.engine.as_mut() {
            Some(EngineKind::F32(e)) => e.queue.pad_for_flush(),
            Some(EngineKind::F64(e)) => e.queue.pad_for_flush(),
            None => return Ok(()),
        }
        self.drive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_all<T: Sample>(filter: &mut AfftfiltFilter, frames: &[AudioFrame]) -> Vec<Vec<T>> {
        let mut out: Vec<Vec<T>> = Vec::new();
        let mut collect = |f: &mut AfftfiltFilter| {
            while let Ok(frame) = f.receive_frame() {
                let planes = frame.planes::<T>().unwrap();
                out.resize(planes.len(), Vec::new());
                for (d, s) in out.iter_mut().zip(planes) {
                    d.extend(s);
                }
            }
        };
        for frame in frames {
            filter.send_frame(frame).unwrap();
            collect(filter);
        }
        filter.flush().unwrap();
        collect(filter);
        out
    }

    #[test]
    fn test_恒等变换还原输入() {
        let mut filter = AfftfiltFilter::new(AfftfiltConfig {
            win_size: 256,
            ..Default::default()
        })
        .unwrap();
        let left: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
        let right: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.011).cos() * 0.25).collect();
        let frames: Vec<AudioFrame> = (0..4)
            .map(|k| {
                let r = k * 250..(k + 1) * 250;
                let mut f = AudioFrame::from_planes(
                    &[left[r.clone()].to_vec(), right[r].to_vec()],
                    48000,
                    ChannelLayout::STEREO,
                )
                .unwrap();
                f.pts = (k * 250) as i64;
                f
            })
            .collect();
        let out = run_all::<f32>(&mut filter, &frames);
        assert_eq!(out[0].len(), 1000);
        for (a, b) in out[0].iter().zip(&left).chain(out[1].iter().zip(&right)) {
            assert!((a - b).abs() < 1e-5, "恒等变换应还原输入: {a} != {b}");
        }
    }

    #[test]
    fn test_清零频谱输出静音() {
        let mut filter = AfftfiltFilter::with_fn(
            AfftfiltConfig {
                win_size: 64,
                overlap: 0.5,
                win_func: WindowFunc::Hann,
            },
            Arc::new(|_, _| Complex::new(0.0, 0.0)),
        )
        .unwrap();
        let input = AudioFrame::from_planes(&[vec![1.0f64; 300]], 8000, ChannelLayout::MONO).unwrap();
        let out = run_all::<f64>(&mut filter, &[input]);
        assert_eq!(out[0].len(), 300);
        assert!(out[0].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_低通去除高频() {
        let mut filter = AfftfiltFilter::with_fn(
            AfftfiltConfig {
                win_size: 512,
                ..Default::default()
            },
            Arc::new(|ctx: &BinContext, v| {
                if ctx.frequency() > 4000.0 { Complex::new(0.0, 0.0) } else { v }
            }),
        )
        .unwrap();
        let sr = 32000.0;
        let input: Vec<f64> = (0..4096)
            .map(|i| {
                let t = i as f64 / sr;
                (2.0 * std::f64::consts::PI * 500.0 * t).sin()
                    + (2.0 * std::f64::consts::PI * 12000.0 * t).sin()
            })
            .collect();
        let frame = AudioFrame::from_planes(&[input], 32000, ChannelLayout::MONO).unwrap();
        let out = run_all::<f64>(&mut filter, &[frame]);
        for (i, v) in out[0][1024..3072].iter().enumerate() {
            let t = (i + 1024) as f64 / sr;
            let expect = (2.0 * std::f64::consts::PI * 500.0 * t).sin();
            assert!((v - expect).abs() < 0.05, "采样 {i} 残留高频: {v} vs {expect}");
        }
    }

    #[test]
    fn test_整数采样不支持() {
        let mut filter = AfftfiltFilter::new(AfftfiltConfig::default()).unwrap();
        let frame = AudioFrame::from_planes(&[vec![0i16; 16]], 8000, ChannelLayout::MONO).unwrap();
        assert!(matches!(filter.send_frame(&frame), Err(ShengError::Unsupported(_))));
    }

    #[test]
    fn test_窗长校验() {
        assert!(AfftfiltFilter::new(AfftfiltConfig {
            win_size: 3,
            ..Default::default()
        })
        .is_err());
    }
}
