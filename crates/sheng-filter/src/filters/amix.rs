//! 多路输入混音.
//!
//! 对标 FFmpeg 的 `amix`: 各路输入按权重相加. 开启归一化时每路缩放为
//! `|w_i| / Σ|w|`, 某路结束后其余各路的缩放在 `dropout_transition` 秒内
//! 线性回升, 避免音量突变. 输出长度由 `duration` 决定.
//!
//! 线性滤镜图只有一路输入, 通过 [`Filter`] 接口送入的帧视为第 0 路,
//! 其余各路用 [`AmixFilter::send_input`] / [`AmixFilter::end_input`] 驱动.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use sheng_codec::frame::{AudioFrame, NOPTS_VALUE};
use sheng_core::float_dsp::{Real, cst};
use sheng_core::{ChannelLayout, Sample, SampleFormat, ShengError, ShengResult};

use crate::Filter;
use crate::filters::{make_frame, offset_pts};

/// 输出长度的判定方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MixDuration {
    /// 最长的输入结束时结束
    #[default]
    Longest,
    /// 最短的输入结束时结束
    Shortest,
    /// 第 0 路输入结束时结束
    First,
}

/// amix 参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmixConfig {
    pub inputs: usize,
    pub duration: MixDuration,
    /// 输入结束后音量回升的时长 (秒)
    pub dropout_transition: f64,
    /// 各路权重, 不足的输入沿用最后一个
    pub weights: Vec<f64>,
    pub normalize: bool,
}

impl Default for AmixConfig {
    fn default() -> Self {
        Self {
            inputs: 2,
            duration: MixDuration::Longest,
            dropout_transition: 2.0,
            weights: vec![1.0, 1.0],
            normalize: true,
        }
    }
}

impl AmixConfig {
    pub fn validate(&self) -> ShengResult<()> {
        if !(1..=32767).contains(&self.inputs) {
            return Err(ShengError::InvalidArgument(format!(
                "amix: 输入路数 {} 超出范围 [1, 32767]",
                self.inputs
            )));
        }
        if !(self.dropout_transition >= 0.0 && self.dropout_transition.is_finite()) {
            return Err(ShengError::InvalidArgument(format!(
                "amix: dropout_transition={} 无效",
                self.dropout_transition
            )));
        }
        if self.weights.is_empty() || self.weights.iter().any(|w| !w.is_finite()) {
            return Err(ShengError::InvalidArgument("amix: 权重为空或非有限值".into()));
        }
        Ok(())
    }

    /// 展开为每路一个权重
    fn expanded_weights(&self) -> Vec<f64> {
        let last = self.weights.last().copied().unwrap_or(1.0);
        (0..self.inputs)
            .map(|i| self.weights.get(i).copied().unwrap_or(last))
            .collect()
    }
}

/// 单路输入的待混采样
#[derive(Debug)]
struct MixInput<T> {
    pending: Vec<Vec<T>>,
    next_pts: i64,
    eof: bool,
}

impl<T> MixInput<T> {
    fn queued(&self) -> usize {
        self.pending.first().map_or(0, Vec::len)
    }

    /// 已结束且没有剩余采样
    fn is_off(&self) -> bool {
        self.eof && self.queued() == 0
    }
}

/// 各路缩放因子, 与采样类型无关
#[derive(Debug)]
struct Scales {
    weights: Vec<f64>,
    weight_sum: f64,
    scale_norm: Vec<f64>,
    scale: Vec<f64>,
}

impl Scales {
    fn new(weights: Vec<f64>) -> Self {
        let weight_sum: f64 = weights.iter().map(|w| w.abs()).sum();
        let scale_norm = weights.iter().map(|w| weight_sum / w.abs()).collect();
        let scale = vec![0.0; weights.len()];
        Self {
            weights,
            weight_sum,
            scale_norm,
            scale,
        }
    }

    /// 按本次参与混音的采样数更新缩放, `live` 为有数据且未结束的路
    fn update(
        &mut self,
        contrib: &[usize],
        live: &[bool],
        config: &AmixConfig,
        sample_rate: u32,
    ) {
        let active: f64 = self
            .weights
            .iter()
            .zip(live)
            .filter(|(_, live)| **live)
            .map(|(w, _)| w.abs())
            .sum();
        let inputs = self.weights.len() as f64;
        let transition = config.dropout_transition * sample_rate as f64;

        for (i, &w) in self.weights.iter().enumerate() {
            let target = active / w.abs();
            let norm = &mut self.scale_norm[i];
            if *norm > target {
                let step = (self.weight_sum / w.abs()) / inputs * contrib[i] as f64 / transition;
                *norm = (*norm - step).max(target);
            }
        }

        for (i, &w) in self.weights.iter().enumerate() {
            self.scale[i] = if contrib[i] == 0 {
                0.0
            } else if config.normalize {
                let sign = if w > 0.0 { 1.0 } else { -1.0 };
                sign / self.scale_norm[i]
            } else {
                w.abs()
            };
        }
    }
}

/// 混音引擎, 缓冲区在首帧时按声道数分配
#[derive(Debug)]
struct Mixer<T> {
    inputs: Vec<MixInput<T>>,
    scales: Scales,
    contrib: Vec<usize>,
    live: Vec<bool>,
    mix: Vec<Vec<T>>,
}

impl<T: Real + Sample> Mixer<T> {
    fn new(weights: Vec<f64>, channels: usize) -> Self {
        let n = weights.len();
        let inputs = (0..n)
            .map(|_| MixInput {
                pending: vec![Vec::new(); channels],
                next_pts: NOPTS_VALUE,
                eof: false,
            })
            .collect();
        Self {
            inputs,
            scales: Scales::new(weights),
            contrib: vec![0; n],
            live: vec![false; n],
            mix: vec![Vec::new(); channels],
        }
    }

    fn push(&mut self, index: usize, planes: &[Vec<T>], pts: i64) {
        let input = &mut self.inputs[index];
        if input.queued() == 0 {
            input.next_pts = pts;
        }
        for (dst, src) in input.pending.iter_mut().zip(planes) {
            dst.extend_from_slice(src);
        }
    }

    fn finished(&self, duration: MixDuration) -> bool {
        match duration {
            MixDuration::Longest => self.inputs.iter().all(MixInput::is_off),
            MixDuration::Shortest => self.inputs.iter().any(MixInput::is_off),
            MixDuration::First => self.inputs[0].is_off(),
        }
    }

    /// 本次可取的采样数与输出长度, 仍有输入在等待数据时为 None
    fn chunk(&self, duration: MixDuration) -> Option<(usize, usize)> {
        let mut take: Option<usize> = None;
        for input in self.inputs.iter().filter(|i| !i.eof) {
            let q = input.queued();
            if q == 0 {
                return None;
            }
            take = Some(take.map_or(q, |t| t.min(q)));
        }
        // 全部输入都已结束时把剩余采样一次混完
        let take = take
            .unwrap_or_else(|| self.inputs.iter().map(MixInput::queued).max().unwrap_or(0));
        if take == 0 {
            return None;
        }
        let len = match duration {
            MixDuration::Longest => take,
            MixDuration::Shortest => self
                .inputs
                .iter()
                .map(|i| i.queued().min(take))
                .filter(|&n| n > 0)
                .min()
                .unwrap_or(0),
            MixDuration::First => self.inputs[0].queued().min(take),
        };
        Some((take, len))
    }

    /// 混合一块到 `mix`, 返回输出时间戳
    fn mix_chunk(
        &mut self,
        take: usize,
        len: usize,
        config: &AmixConfig,
        sample_rate: u32,
    ) -> i64 {
        let mut pts = NOPTS_VALUE;
        for (i, input) in self.inputs.iter().enumerate() {
            self.contrib[i] = input.queued().min(take);
            self.live[i] = self.contrib[i] > 0 && !input.eof;
            if pts == NOPTS_VALUE && self.contrib[i] > 0 {
                pts = input.next_pts;
            }
        }
        self.scales.update(&self.contrib, &self.live, config, sample_rate);

        for (ch, out) in self.mix.iter_mut().enumerate() {
            out.clear();
            out.resize(len, T::zero());
            for (i, input) in self.inputs.iter().enumerate() {
                let n = self.contrib[i].min(len);
                let scale: T = cst(self.scales.scale[i]);
                for (o, &x) in out.iter_mut().zip(&input.pending[ch][..n]) {
                    *o = *o + x * scale;
                }
            }
        }

        for (i, input) in self.inputs.iter_mut().enumerate() {
            let n = self.contrib[i];
            for plane in &mut input.pending {
                plane.drain(..n);
            }
            input.next_pts = offset_pts(input.next_pts, n as u64);
        }
        pts
    }

    fn output_frame(
        &self,
        sample_rate: u32,
        layout: ChannelLayout,
        pts: i64,
    ) -> ShengResult<AudioFrame> {
        make_frame::<T, _>(&self.mix, sample_rate, layout, pts)
    }
}

enum MixerKind {
    F32(Mixer<f32>),
    F64(Mixer<f64>),
}

/// 多路混音滤镜 (f32 / f64 采样)
pub struct AmixFilter {
    config: AmixConfig,
    mixer: Option<MixerKind>,
    sample_rate: u32,
    channel_layout: ChannelLayout,
    finished: bool,
    outputs: VecDeque<AudioFrame>,
}

impl AmixFilter {
    pub fn new(config: AmixConfig) -> ShengResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            mixer: None,
            sample_rate: 0,
            channel_layout: ChannelLayout::MONO,
            finished: false,
            outputs: VecDeque::new(),
        })
    }

    /// 输入路数
    pub fn inputs(&self) -> usize {
        self.config.inputs
    }

    /// 向第 `index` 路送入一帧
    pub fn send_input(&mut self, index: usize, frame: &AudioFrame) -> ShengResult<()> {
        self.check_index(index)?;
        if self.finished {
            return Err(ShengError::Eof);
        }
        if self.mixer.is_none() {
            let weights = self.config.expanded_weights();
            let channels = frame.channels();
            self.mixer = Some(match frame.sample_format.to_planar() {
                SampleFormat::F32p => MixerKind::F32(Mixer::new(weights, channels)),
                SampleFormat::F64p => MixerKind::F64(Mixer::new(weights, channels)),
                other => {
                    return Err(ShengError::Unsupported(format!(
                        "amix 只支持浮点采样: {other}"
                    )));
                }
            });
            self.sample_rate = frame.sample_rate;
            self.channel_layout = frame.channel_layout;
            log::debug!(
                "amix 初始化: {} 路输入, {channels} 声道, {} Hz",
                self.config.inputs,
                frame.sample_rate
            );
        } else if self.channel_layout != frame.channel_layout
            || self.sample_rate != frame.sample_rate
        {
            return Err(ShengError::InvalidArgument(format!(
                "amix: 第 {index} 路输入的声道布局或采样率与其他输入不一致"
            )));
        }

        match self.mixer.as_mut() {
            Some(MixerKind::F32(m)) => {
                check_open(&m.inputs[index], index)?;
                m.push(index, &frame.planes::<f32>()?, frame.pts);
            }
            Some(MixerKind::F64(m)) => {
                check_open(&m.inputs[index], index)?;
                m.push(index, &frame.planes::<f64>()?, frame.pts);
            }
            None => {}
        }
        self.drive()
    }

    /// 标记第 `index` 路输入结束
    pub fn end_input(&mut self, index: usize) -> ShengResult<()> {
        self.check_index(index)?;
        match self.mixer.as_mut() {
            Some(MixerKind::F32(m)) => m.inputs[index].eof = true,
            Some(MixerKind::F64(m)) => m.inputs[index].eof = true,
            None => {}
        }
        log::debug!("amix: 第 {index} 路输入结束");
        self.drive()
    }

    fn check_index(&self, index: usize) -> ShengResult<()> {
        if index >= self.config.inputs {
            return Err(ShengError::InvalidArgument(format!(
                "amix: 输入序号 {index} 超出 {} 路",
                self.config.inputs
            )));
        }
        Ok(())
    }

    fn drive(&mut self) -> ShengResult<()> {
        if self.finished {
            return Ok(());
        }
        let (sr, layout) = (self.sample_rate, self.channel_layout);
        match self.mixer.as_mut() {
            Some(MixerKind::F32(m)) => {
                self.finished = drain_mixer(m, &self.config, sr, layout, &mut self.outputs)?;
            }
            Some(MixerKind::F64(m)) => {
                self.finished = drain_mixer(m, &self.config, sr, layout, &mut self.outputs)?;
            }
            None => {}
        }
        Ok(())
    }
}

fn check_open<T>(input: &MixInput<T>, index: usize) -> ShengResult<()> {
    if input.eof {
        return Err(ShengError::InvalidArgument(format!(
            "amix: 第 {index} 路输入已结束"
        )));
    }
    Ok(())
}

/// 混出所有可用的块, 返回混音是否已结束
fn drain_mixer<T: Real + Sample>(
    mixer: &mut Mixer<T>,
    config: &AmixConfig,
    sample_rate: u32,
    layout: ChannelLayout,
    outputs: &mut VecDeque<AudioFrame>,
) -> ShengResult<bool> {
    loop {
        if mixer.finished(config.duration) {
            return Ok(true);
        }
        let Some((take, len)) = mixer.chunk(config.duration) else {
            return Ok(false);
        };
        let pts = mixer.mix_chunk(take, len, config, sample_rate);
        if len > 0 {
            outputs.push_back(mixer.output_frame(sample_rate, layout, pts)?);
        }
    }
}

impl Filter for AmixFilter {
    fn name(&self) -> &str {
        "amix"
    }

    fn send_frame(&mut self, frame: &AudioFrame) -> ShengResult<()> {
        self.send_input(0, frame)
    }

    fn receive_frame(&mut self) -> ShengResult<AudioFrame> {
        match self.outputs.pop_front() {
            Some(frame) => Ok(frame),
            None if self.finished => Err(ShengError::Eof),
            None => Err(ShengError::NeedMoreData),
        }
    }

    fn flush(&mut self) -> ShengResult<()> {
        for index in 0..self.config.inputs {
            self.end_input(index)?;
        }
        Ok(())
    }
}
