//! 频域上混滤镜.
//!
//! 对标 FFmpeg 的 `surround`. 输入为立体声 / 2.1 / 3.0 / 3.1, 每个 hop
//! 由左右声道频谱求出逐频点的三维声像位置, 经角度、平移、深度与聚焦变换后,
//! 按各输出声道的方位计算权重, 加权和差信号并重建. 输入已有的中置与 LFE
//! 声道直接透传.

mod position;

#[cfg(test)]
mod tests;

use std::collections::VecDeque;

use num_complex::Complex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sheng_codec::frame::AudioFrame;
use sheng_core::float_dsp::{Real, cst};
use sheng_core::{
    Channel, ChannelLayout, Sample, SampleFormat, ShengError, ShengResult, WindowFunc,
};

use crate::Filter;
use crate::filters::{make_frame, offset_pts};
use crate::stft::{HopQueue, StftAnalyzer, StftLayout, StftSynthesizer};

use self::position::{
    ChannelPan, angle_transform, calculate_factors, depth_transform, focus_transform, lfe_weight,
    shift_transform, stereo_position,
};

/// 生成 LFE 时对和信号的处理
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LfeMode {
    /// 和信号保持不变
    #[default]
    Add,
    /// 从和信号中减去 LFE 部分
    Sub,
}

/// surround 参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurroundConfig {
    /// 输出布局名, 如 `5.1`
    pub chl_out: String,
    /// 输入布局名: `stereo` / `2.1` / `3.0` / `3.1`
    pub chl_in: String,
    pub level_in: f64,
    pub level_out: f64,
    /// 输入缺少 LFE 时由低频生成
    pub lfe: bool,
    /// LFE 低通起点 (Hz)
    pub lfe_low: u32,
    /// LFE 低通终点 (Hz)
    pub lfe_high: u32,
    pub lfe_mode: LfeMode,
    /// 权重平滑系数 [0, 1], 0 不平滑
    pub smooth: f64,
    /// 正前方声场张角 (度)
    pub angle: f64,
    /// 聚焦 [-1, 1]
    pub focus: f64,
    /// x / y / z 轴平移
    pub shift: [f64; 3],
    /// x / y / z 轴深度
    pub depth: [f64; 3],
    /// 各输入声道电平, 不足时沿用最后一个
    pub input_levels: Vec<f64>,
    /// 各输出声道电平, 不足时沿用最后一个
    pub output_levels: Vec<f64>,
    /// 各输出声道 x / y / z 轴指数, 不足时沿用最后一个
    pub spread: Vec<[f64; 3]>,
    pub win_size: usize,
    pub overlap: f64,
    pub win_func: WindowFunc,
}

impl Default for SurroundConfig {
    fn default() -> Self {
        Self {
            chl_out: "5.1".into(),
            chl_in: "stereo".into(),
            level_in: 1.0,
            level_out: 1.0,
            lfe: true,
            lfe_low: 128,
            lfe_high: 256,
            lfe_mode: LfeMode::Add,
            smooth: 0.0,
            angle: 90.0,
            focus: 0.0,
            shift: [0.0; 3],
            depth: [0.0; 3],
            input_levels: vec![1.0],
            output_levels: vec![1.0],
            spread: vec![[0.5; 3]],
            win_size: 4096,
            overlap: 0.5,
            win_func: WindowFunc::Hann,
        }
    }
}

fn per_channel<T: Copy>(values: &[T], ch: usize, fallback: T) -> T {
    values
        .get(ch.min(values.len().saturating_sub(1)))
        .copied()
        .unwrap_or(fallback)
}

impl SurroundConfig {
    fn validate(&self) -> ShengResult<()> {
        let check = |name: &str, v: f64, lo: f64, hi: f64| {
            if (lo..=hi).contains(&v) {
                Ok(())
            } else {
                Err(ShengError::InvalidArgument(format!(
                    "surround: {name} 超出 [{lo}, {hi}]: {v}"
                )))
            }
        };
        check("smooth", self.smooth, 0.0, 1.0)?;
        check("angle", self.angle, 0.0, 360.0)?;
        check("focus", self.focus, -1.0, 1.0)?;
        for axis in 0..3 {
            check("shift", self.shift[axis], -1.0, 1.0)?;
            check("depth", self.depth[axis], -1.0, 1.0)?;
        }
        if self.lfe_low >= self.lfe_high {
            return Err(ShengError::InvalidArgument(format!(
                "surround: lfe_low ({}) 必须小于 lfe_high ({})",
                self.lfe_low, self.lfe_high
            )));
        }
        Ok(())
    }
}

/// 输出声道的频谱来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputSource {
    /// 透传输入中置
    Centre,
    /// 透传输入 LFE 或生成的 LFE
    Lfe,
    /// 按声像位置加权
    Spatial,
}

/// 输入 LFE 的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LfeSource {
    None,
    Input(usize),
    Created,
}

/// 每个 hop 的逐频点分解结果
struct SpectralField<T> {
    x: Vec<T>,
    y: Vec<T>,
    z: Vec<T>,
    sum: Vec<Complex<T>>,
    dif: Vec<Complex<T>>,
    cnt: Vec<Complex<T>>,
    lfe: Vec<Complex<T>>,
}

impl<T: Real> SpectralField<T> {
    fn new(bins: usize) -> Self {
        let zero = Complex::new(T::zero(), T::zero());
        Self {
            x: vec![T::zero(); bins],
            y: vec![T::zero(); bins],
            z: vec![T::zero(); bins],
            sum: vec![zero; bins],
            dif: vec![zero; bins],
            cnt: vec![zero; bins],
            lfe: vec![zero; bins],
        }
    }
}

/// 位置变换参数
#[derive(Debug, Clone, Copy)]
struct Transform<T> {
    angle: T,
    focus: T,
    shift: [T; 3],
    depth: [T; 3],
}

impl<T: Real> Transform<T> {
    fn apply(&self, x: &mut T, y: &mut T, z: &mut T) {
        angle_transform(x, y, self.angle);
        shift_transform(x, self.shift[0]);
        shift_transform(y, self.shift[1]);
        shift_transform(z, self.shift[2]);
        depth_transform(x, self.depth[0]);
        depth_transform(y, self.depth[1]);
        depth_transform(z, self.depth[2]);
        focus_transform(x, y, self.focus);
    }
}

struct InputChannel<T: Real> {
    analyzer: StftAnalyzer<T>,
    spectrum: Vec<Complex<T>>,
}

struct OutputChannel<T: Real> {
    source: OutputSource,
    pan: ChannelPan,
    spread: [T; 3],
    factors: Vec<T>,
    /// 平滑后的权重, 跨 hop 保留
    sfactors: Vec<T>,
    smooth_init: bool,
    spectrum: Vec<Complex<T>>,
    synthesizer: StftSynthesizer<T>,
    hop_out: Vec<T>,
    /// 本次驱动累计的输出
    out: Vec<T>,
}

impl<T: Real> OutputChannel<T> {
    fn render(&mut self, field: &SpectralField<T>, smooth: T) {
        match self.source {
            OutputSource::Centre => self.spectrum.copy_from_slice(&field.cnt),
            OutputSource::Lfe => self.spectrum.copy_from_slice(&field.lfe),
            OutputSource::Spatial => {
                calculate_factors(
                    &self.pan,
                    self.spread,
                    (&field.x, &field.y, &field.z),
                    &mut self.factors,
                );
                let factors = if smooth > T::zero() {
                    if self.smooth_init {
                        for (s, &f) in self.sfactors.iter_mut().zip(&self.factors) {
                            let v = (f - *s) * smooth + *s;
                            *s = if v.is_normal() { v } else { T::zero() };
                        }
                    } else {
                        self.sfactors.copy_from_slice(&self.factors);
                        self.smooth_init = true;
                    }
                    &self.sfactors
                } else {
                    &self.factors
                };

                let dif_sign: T = cst(self.pan.dif_sign);
                for (n, out) in self.spectrum.iter_mut().enumerate() {
                    let v = (field.sum[n] + field.dif[n] * dif_sign) * factors[n];
                    let re = if v.re.is_normal() { v.re } else { T::zero() };
                    let im = if v.im.is_normal() { v.im } else { T::zero() };
                    *out = Complex::new(re, im);
                }
            }
        }
    }
}

/// 输入布局中各声道的位置
#[derive(Debug, Clone, Copy)]
struct InputMap {
    left: usize,
    right: usize,
    centre: Option<usize>,
    lfe: LfeSource,
}

struct Engine<T: Real> {
    inputs: Vec<InputChannel<T>>,
    outputs: Vec<OutputChannel<T>>,
    field: SpectralField<T>,
    map: InputMap,
    transform: Transform<T>,
    smooth: T,
    lfe_mode: LfeMode,
    /// LFE 低通的频点边界
    lowcut: T,
    highcut: T,
    queue: HopQueue<T>,
    hop: usize,
}

impl<T: Real + Sample> Engine<T> {
    fn new(
        config: &SurroundConfig,
        layout: &StftLayout,
        in_layout: ChannelLayout,
        out_layout: ChannelLayout,
        sample_rate: u32,
    ) -> ShengResult<Self> {
        let bins = layout.bins();
        let zero = Complex::new(T::zero(), T::zero());
        let in_count = in_layout.channels as usize;
        let out_count = out_layout.channels as usize;

        let inputs = (0..in_count)
            .map(|ch| {
                let level = config.level_in * per_channel(&config.input_levels, ch, 1.0);
                Ok(InputChannel {
                    analyzer: StftAnalyzer::new(layout, level)?,
                    spectrum: vec![zero; bins],
                })
            })
            .collect::<ShengResult<Vec<_>>>()?;

        let centre = in_layout.index_of(Channel::FrontCenter);
        let out_has_lfe = out_layout.contains(Channel::LowFrequency);
        let lfe = match in_layout.index_of(Channel::LowFrequency) {
            Some(idx) => LfeSource::Input(idx),
            None if config.lfe && out_has_lfe => LfeSource::Created,
            None => LfeSource::None,
        };
        let map = InputMap {
            left: in_layout.index_of(Channel::FrontLeft).unwrap_or(0),
            right: in_layout.index_of(Channel::FrontRight).unwrap_or(1),
            centre,
            lfe,
        };

        let outputs = (0..out_count)
            .map(|ch| {
                let channel = out_layout.channel_at(ch).ok_or_else(|| {
                    ShengError::InvalidArgument(format!("surround: 输出声道 {ch} 没有方位"))
                })?;
                let source = match channel {
                    Channel::FrontCenter if centre.is_some() => OutputSource::Centre,
                    Channel::LowFrequency if lfe != LfeSource::None => OutputSource::Lfe,
                    _ => OutputSource::Spatial,
                };
                let level = config.level_out * per_channel(&config.output_levels, ch, 1.0);
                let spread = per_channel(&config.spread, ch, [0.5; 3]);
                Ok(OutputChannel {
                    source,
                    pan: ChannelPan::of(channel),
                    spread: spread.map(cst),
                    factors: vec![T::zero(); bins],
                    sfactors: vec![T::zero(); bins],
                    smooth_init: false,
                    spectrum: vec![zero; bins],
                    synthesizer: StftSynthesizer::new(layout, level)?,
                    hop_out: vec![T::zero(); layout.hop],
                    out: Vec::new(),
                })
            })
            .collect::<ShengResult<Vec<_>>>()?;

        let to_bin = |hz: u32| cst::<T>(lfe_bin(hz, sample_rate, layout.win_size));
        log::debug!(
            "surround: {in_layout} -> {out_layout}, LFE {lfe:?}, 来源 {:?}",
            outputs.iter().map(|o| o.source).collect::<Vec<_>>()
        );
        Ok(Self {
            inputs,
            outputs,
            field: SpectralField::new(bins),
            map,
            transform: Transform {
                angle: cst(config.angle),
                focus: cst(config.focus),
                shift: config.shift.map(cst),
                depth: config.depth.map(cst),
            },
            smooth: cst(config.smooth),
            lfe_mode: config.lfe_mode,
            lowcut: to_bin(config.lfe_low),
            highcut: to_bin(config.lfe_high),
            queue: HopQueue::new(in_count, layout.hop, layout.latency()),
            hop: layout.hop,
        })
    }

    /// 由输入频谱求位置与和差信号
    fn decompose(&mut self) {
        let map = self.map;
        let left = &self.inputs[map.left].spectrum;
        let right = &self.inputs[map.right].spectrum;
        let field = &mut self.field;
        let zero = Complex::new(T::zero(), T::zero());

        for n in 0..left.len() {
            let (l, r) = (left[n], right[n]);
            let re = l.re * r.re + l.im * r.im;
            let im = r.re * l.im - r.im * l.re;
            let (x, y, z) = stereo_position(l.norm(), r.norm(), im, re);
            let mut sum = l + r;
            let cnt = map.centre.map_or(zero, |c| self.inputs[c].spectrum[n]);

            field.lfe[n] = match map.lfe {
                LfeSource::Input(idx) => self.inputs[idx].spectrum[n],
                LfeSource::Created => {
                    let w = lfe_weight(n, self.lowcut, self.highcut);
                    let source = if map.centre.is_some() { cnt } else { sum };
                    let lfe = source * w;
                    if self.lfe_mode == LfeMode::Sub {
                        sum = sum - lfe;
                    }
                    lfe
                }
                LfeSource::None => zero,
            };

            let (mut x, mut y, mut z) = (x, y, z);
            self.transform.apply(&mut x, &mut y, &mut z);
            field.x[n] = x;
            field.y[n] = y;
            field.z[n] = z;
            field.sum[n] = sum;
            field.dif[n] = l - r;
            field.cnt[n] = cnt;
        }
    }

    /// 处理队列头部的一个 hop, 各输出声道的结果写入 `hop_out`
    fn process_hop(&mut self) -> ShengResult<()> {
        let queue = &self.queue;
        self.inputs
            .par_iter_mut()
            .enumerate()
            .try_for_each(|(ch, input)| {
                input.analyzer.analyze(queue.block(ch), &mut input.spectrum)
            })?;
        self.queue.advance();

        self.decompose();

        let field = &self.field;
        let smooth = self.smooth;
        self.outputs.par_iter_mut().try_for_each(|out| {
            out.render(field, smooth);
            out.synthesizer.synthesize(&out.spectrum, &mut out.hop_out)
        })
    }

    /// 处理队列中所有完整 hop, 返回输出起始采样
    fn run(&mut self) -> ShengResult<u64> {
        let start = self.queue.total_out();
        for out in &mut self.outputs {
            out.out.clear();
        }
        while self.queue.has_block() {
            self.process_hop()?;
            let keep = self.queue.emit(self.hop);
            for out in &mut self.outputs {
                out.out.extend_from_slice(&out.hop_out[keep.clone()]);
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
        if self.outputs.first().is_none_or(|o| o.out.is_empty()) {
            return Ok(None);
        }
        let planes: Vec<&[T]> = self.outputs.iter().map(|o| o.out.as_slice()).collect();
        let pts = offset_pts(self.queue.first_pts(), start);
        make_frame::<T, _>(&planes, sample_rate, layout, pts).map(Some)
    }
}

/// LFE 分频频率到频点位置的映射, 以半采样率对应整个窗长
pub(crate) fn lfe_bin(hz: u32, sample_rate: u32, win_size: usize) -> f64 {
    hz as f64 / (sample_rate as f64 * 0.5) * win_size as f64
}

enum EngineKind {
    F32(Engine<f32>),
    F64(Engine<f64>),
}

/// 频域上混滤镜 (f32 / f64 采样)
pub struct SurroundFilter {
    config: SurroundConfig,
    stft: StftLayout,
    in_layout: ChannelLayout,
    out_layout: ChannelLayout,
    engine: Option<EngineKind>,
    sample_rate: u32,
    outputs: VecDeque<AudioFrame>,
}

impl SurroundFilter {
    pub fn new(config: SurroundConfig) -> ShengResult<Self> {
        config.validate()?;
        let parse = |name: &str| {
            ChannelLayout::from_name(name).ok_or_else(|| {
                ShengError::InvalidArgument(format!("surround: 未知声道布局: {name}"))
            })
        };
        let in_layout = parse(&config.chl_in)?;
        let out_layout = parse(&config.chl_out)?;
        if ![
            ChannelLayout::STEREO,
            ChannelLayout::LAYOUT_2_1,
            ChannelLayout::SURROUND,
            ChannelLayout::LAYOUT_3_1,
        ]
        .contains(&in_layout)
        {
            return Err(ShengError::Unsupported(format!(
                "surround: 不支持的输入布局 {in_layout}"
            )));
        }
        let stft = StftLayout::new(config.win_size, config.overlap, config.win_func, true)?;
        Ok(Self {
            config,
            stft,
            in_layout,
            out_layout,
            engine: None,
            sample_rate: 0,
            outputs: VecDeque::new(),
        })
    }

    /// 输出声道布局
    pub fn output_layout(&self) -> ChannelLayout {
        self.out_layout
    }

    /// 处理延迟 (采样)
    pub fn latency(&self) -> usize {
        self.stft.latency()
    }

    fn drive(&mut self) -> ShengResult<()> {
        let (sr, layout) = (self.sample_rate, self.out_layout);
        let frame = match self.engine.as_mut() {
            Some(EngineKind::F32(e)) => {
                let start = e.run()?;
                e.output_frame(start, sr, layout)?
            }
            Some(EngineKind::F64(e)) => {
                let start = e.run()?;
                e.output_frame(start, sr, layout)?
            }
            None => None,
        };
        self.outputs.extend(frame);
        Ok(())
    }
}

impl Filter for SurroundFilter {
    fn name(&self) -> &str {
        "surround"
    }

    fn send_frame(&mut self, frame: &AudioFrame) -> ShengResult<()> {
        if frame.channel_layout != self.in_layout {
            return Err(ShengError::InvalidArgument(format!(
                "surround: 输入布局 {} 与配置 {} 不符",
                frame.channel_layout, self.in_layout
            )));
        }
        if self.engine.is_none() {
            if frame.sample_rate == 0 {
                return Err(ShengError::InvalidArgument("surround: 采样率为 0".into()));
            }
            let (cfg, stft, il, ol, sr) = (
                &self.config,
                &self.stft,
                self.in_layout,
                self.out_layout,
                frame.sample_rate,
            );
            self.engine = Some(match frame.sample_format.to_planar() {
                SampleFormat::F32p => EngineKind::F32(Engine::new(cfg, stft, il, ol, sr)?),
                SampleFormat::F64p => EngineKind::F64(Engine::new(cfg, stft, il, ol, sr)?),
                other => {
                    return Err(ShengError::Unsupported(format!(
                        "surround 只支持浮点采样: {other}"
                    )));
                }
            });
            self.sample_rate = frame.sample_rate;
        } else if frame.sample_rate != self.sample_rate {
            return Err(ShengError::InvalidArgument(
                "surround: 流中途改变了采样率".into(),
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
