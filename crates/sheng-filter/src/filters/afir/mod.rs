//! 分区卷积 FIR 滤镜.
//!
//! 对标 FFmpeg 的 `afir`. 脉冲响应以 JSON 内联给出 (`irs[ir][channel][tap]`),
//! 单声道脉冲响应作用于所有输入声道. 支持多个脉冲响应之间的实时切换:
//! 新脉冲响应预热完成后以一个最小分块的长度交叉淡化.

mod ir;
mod segment;


use std::collections::VecDeque;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sheng_codec::frame::{AudioFrame, NOPTS_VALUE};
use sheng_core::float_dsp::{Real, cst};
use sheng_core::{ChannelLayout, Sample, SampleFormat, ShengError, ShengResult};

use crate::Filter;
use crate::filters::{make_frame, offset_pts};

use self::ir::{PreparedIr, prepare_ir};
use self::segment::{FirSegment, fir_quantum, max_offset, plan_segments};

/// 计算精度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IrPrecision {
    /// 跟随输入采样格式
    #[default]
    Auto,
    Float,
    Double,
}

/// afir 参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AfirConfig {
    /// 输入 (干声) 增益
    pub dry: f64,
    /// 输出 (湿声) 增益
    pub wet: f64,
    /// 保留的脉冲响应比例 (0, 1]
    pub length: f64,
    /// 脉冲响应归一化范数, 负值表示不归一化
    pub irnorm: f64,
    /// 各声道使用相同的 (最小) 归一化增益
    pub irlink: bool,
    /// 额外的脉冲响应增益
    pub irgain: f64,
    /// 最小分区长度
    pub minp: usize,
    /// 最大分区长度
    pub maxp: usize,
    /// 初始选择的脉冲响应
    pub ir: usize,
    pub irs: Vec<Vec<Vec<f64>>>,
    pub precision: IrPrecision,
}

impl Default for AfirConfig {
    fn default() -> Self {
        Self {
            dry: 1.0,
            wet: 1.0,
            length: 1.0,
            irnorm: 1.0,
            irlink: true,
            irgain: 1.0,
            minp: 8192,
            maxp: 8192,
            ir: 0,
            irs: Vec::new(),
            precision: IrPrecision::Auto,
        }
    }
}

impl AfirConfig {
    fn validate(&self) -> ShengResult<()> {
        if self.irs.is_empty() {
            return Err(ShengError::InvalidArgument("afir: 至少需要一个脉冲响应".into()));
        }
        if !(1..=65536).contains(&self.minp) || !(8..=65536).contains(&self.maxp) {
            return Err(ShengError::InvalidArgument(format!(
                "afir: 分区长度超出范围: minp={}, maxp={}",
                self.minp, self.maxp
            )));
        }
        if self.maxp < self.minp {
            return Err(ShengError::InvalidArgument(
                "afir: maxp 必须不小于 minp".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.length) {
            return Err(ShengError::InvalidArgument(format!(
                "afir: length 超出 [0, 1]: {}",
                self.length
            )));
        }
        Ok(())
    }
}

/// 脉冲响应切换与旁路状态, 按最小分块推进
#[derive(Debug, Clone, Copy)]
struct SwitchState {
    selir: usize,
    prev_selir: usize,
    disabled: bool,
    prev_disabled: bool,
}

/// 单声道状态: 每个脉冲响应一组分段
struct ChannelFir<T: Real> {
    irs: Vec<Vec<FirSegment<T>>>,
    fadein: [Vec<T>; 2],
    loading: usize,
}

impl<T: Real> ChannelFir<T> {
    fn quantum(
        &mut self,
        input: &[T],
        out: &mut [T],
        shared: &Shared<T>,
        sw: SwitchState,
    ) -> ShengResult<()> {
        let [xfade0, xfade1] = &shared.xfade;
        let (dry, wet) = (shared.dry, shared.wet);

        if sw.disabled || sw.prev_disabled {
            if sw.disabled && !sw.prev_disabled {
                fir_quantum(&mut self.irs[sw.selir], input, &mut self.fadein[0], dry, wet)?;
                for n in 0..out.len() {
                    out[n] = xfade1[n] * self.fadein[0][n] + xfade0[n] * input[n];
                }
            } else if !sw.disabled && sw.prev_disabled {
                fir_quantum(&mut self.irs[sw.selir], input, &mut self.fadein[1], dry, wet)?;
                for n in 0..out.len() {
                    out[n] = xfade1[n] * input[n] + xfade0[n] * self.fadein[1][n];
                }
            } else {
                out.copy_from_slice(input);
            }
        } else if sw.prev_selir != sw.selir && self.loading != 0 {
            let [fade_old, fade_new] = &mut self.fadein;
            fir_quantum(&mut self.irs[sw.prev_selir], input, fade_old, dry, wet)?;
            fir_quantum(&mut self.irs[sw.selir], input, fade_new, dry, wet)?;
            if self.loading > shared.max_offset[sw.selir] {
                for n in 0..out.len() {
                    out[n] = xfade1[n] * fade_old[n] + xfade0[n] * fade_new[n];
                }
                self.loading = 0;
            } else {
                out.copy_from_slice(fade_old);
            }
        } else {
            fir_quantum(&mut self.irs[sw.selir], input, out, dry, wet)?;
        }

        if sw.selir != sw.prev_selir && self.loading != 0 {
            self.loading += shared.min_part;
        }
        Ok(())
    }
}

/// 所有声道共享的只读参数
struct Shared<T> {
    min_part: usize,
    /// 上升 / 下降交叉淡化曲线
    xfade: [Vec<T>; 2],
    max_offset: Vec<usize>,
    dry: T,
    wet: T,
}

/// 单声道的输入暂存与输出缓冲, 配置时分配
struct ChannelIo<T> {
    pending: Vec<T>,
    /// 一个最小分块的卷积结果
    scratch: Vec<T>,
    /// 本次驱动累计的输出
    out: Vec<T>,
}

struct Engine<T: Real> {
    channels: Vec<ChannelFir<T>>,
    shared: Shared<T>,
    io: Vec<ChannelIo<T>>,
    total_in: u64,
    total_out: u64,
    /// 刷新后的输出总长度上限
    limit: Option<u64>,
}

impl<T: Real + Sample> Engine<T> {
    fn new(config: &AfirConfig, irs: &[PreparedIr], channels: usize) -> ShengResult<Self> {
        let mut states: Vec<ChannelFir<T>> = Vec::with_capacity(channels);
        let mut min_part = 0;
        let mut max_offsets = Vec::with_capacity(irs.len());

        for (idx, ir) in irs.iter().enumerate() {
            if ir.taps.len() != 1 && ir.taps.len() != channels {
                return Err(ShengError::InvalidArgument(format!(
                    "afir: 脉冲响应 {idx} 有 {} 个声道, 输入有 {channels} 个",
                    ir.taps.len()
                )));
            }
            let (plans, min) = plan_segments(ir.nb_taps, config.minp, config.maxp);
            min_part = min;
            max_offsets.push(max_offset(&plans));
            log::debug!("afir: 脉冲响应 {idx} 分段 {plans:?}");

            for ch in 0..channels {
                let taps = &ir.taps[if ir.taps.len() == 1 { 0 } else { ch }];
                let segments = plans
                    .iter()
                    .map(|plan| FirSegment::new(plan, min, taps))
                    .collect::<ShengResult<Vec<_>>>()?;
                if idx == 0 {
                    states.push(ChannelFir {
                        irs: Vec::with_capacity(irs.len()),
                        fadein: [vec![T::zero(); min], vec![T::zero(); min]],
                        loading: 0,
                    });
                }
                states[ch].irs.push(segments);
            }
        }

        let xfade0: Vec<T> = (0..min_part)
            .map(|n| cst((n + 1) as f64 / min_part as f64))
            .collect();
        let xfade1 = xfade0.iter().map(|&v| T::one() - v).collect();
        Ok(Self {
            channels: states,
            shared: Shared {
                min_part,
                xfade: [xfade0, xfade1],
                max_offset: max_offsets,
                dry: cst(config.dry),
                wet: cst(config.wet),
            },
            io: (0..channels)
                .map(|_| ChannelIo {
                    pending: Vec::with_capacity(2 * min_part),
                    scratch: vec![T::zero(); min_part],
                    out: Vec::with_capacity(min_part),
                })
                .collect(),
            total_in: 0,
            total_out: 0,
            limit: None,
        })
    }

    fn push(&mut self, planes: &[Vec<T>]) {
        if let Some(first) = planes.first() {
            self.total_in += first.len() as u64;
        }
        for (io, src) in self.io.iter_mut().zip(planes) {
            io.pending.extend_from_slice(src);
        }
    }

    /// 补零使剩余输入与 `tail` 个拖尾采样都能以整块处理完
    fn pad_for_flush(&mut self, tail: usize) {
        let left = self.io.first().map_or(0, |io| io.pending.len());
        let min = self.shared.min_part;
        let padded = (left + tail).div_ceil(min) * min;
        for io in &mut self.io {
            io.pending.resize(padded, T::zero());
        }
        self.limit = Some(self.total_in + tail as u64);
    }

    /// 处理所有完整的最小分块, 返回输出起始采样
    fn run(&mut self, sw: &mut SwitchState) -> ShengResult<u64> {
        let start = self.total_out;
        let min = self.shared.min_part;
        for io in &mut self.io {
            io.out.clear();
        }
        let mut read = 0;
        while self.io.first().is_some_and(|io| io.pending.len() - read >= min) {
            let state = *sw;
            let shared = &self.shared;
            self.channels
                .par_iter_mut()
                .zip(self.io.par_iter_mut())
                .try_for_each(|(ch, io)| {
                    ch.quantum(&io.pending[read..read + min], &mut io.scratch, shared, state)
                })?;
            sw.prev_disabled = sw.disabled;
            read += min;

            let keep = match self.limit {
                Some(limit) => (limit.saturating_sub(self.total_out) as usize).min(min),
                None => min,
            };
            self.total_out += keep as u64;
            for io in &mut self.io {
                io.out.extend_from_slice(&io.scratch[..keep]);
            }
        }
        for io in &mut self.io {
            io.pending.drain(..read);
        }
        Ok(start)
    }

    /// 把本次累计的输出打包成一帧
    fn output_frame(
        &self,
        start: u64,
        sample_rate: u32,
        layout: ChannelLayout,
        first_pts: i64,
    ) -> ShengResult<Option<AudioFrame>> {
        if self.io.first().is_none_or(|io| io.out.is_empty()) {
            return Ok(None);
        }
        let planes: Vec<&[T]> = self.io.iter().map(|io| io.out.as_slice()).collect();
        make_frame::<T, _>(&planes, sample_rate, layout, offset_pts(first_pts, start)).map(Some)
    }
}

enum EngineKind {
    F32(Engine<f32>),
    F64(Engine<f64>),
}

/// 分区卷积 FIR 滤镜 (f32 / f64 采样)
pub struct AfirFilter {
    config: AfirConfig,
    prepared: Vec<PreparedIr>,
    engine: Option<EngineKind>,
    switch: SwitchState,
    sample_rate: u32,
    channel_layout: ChannelLayout,
    first_pts: i64,
    flushed: bool,
    outputs: VecDeque<AudioFrame>,
}

impl AfirFilter {
    pub fn new(config: AfirConfig) -> ShengResult<Self> {
        config.validate()?;
        let selir = config.ir.min(config.irs.len() - 1);
        Ok(Self {
            config,
            prepared: Vec::new(),
            engine: None,
            switch: SwitchState {
                selir,
                prev_selir: selir,
                disabled: false,
                prev_disabled: false,
            },
            sample_rate: 0,
            channel_layout: ChannelLayout::MONO,
            first_pts: NOPTS_VALUE,
            flushed: false,
            outputs: VecDeque::new(),
        })
    }

    /// 切换到第 `index` 个脉冲响应 (超出范围时取最后一个)
    pub fn select_ir(&mut self, index: usize) {
        let index = index.min(self.config.irs.len() - 1);
        if index == self.switch.selir {
            return;
        }
        log::debug!("afir: 切换脉冲响应 {} -> {index}", self.switch.selir);
        self.switch.prev_selir = self.switch.selir;
        self.switch.selir = index;
        match self.engine.as_mut() {
            Some(EngineKind::F32(e)) => e.channels.iter_mut().for_each(|c| c.loading = 1),
            Some(EngineKind::F64(e)) => e.channels.iter_mut().for_each(|c| c.loading = 1),
            None => self.switch.prev_selir = index,
        }
    }

    /// 当前选择的脉冲响应
    pub fn selected_ir(&self) -> usize {
        self.switch.selir
    }

    /// 启用或旁路滤镜, 状态变化时交叉淡化一个最小分块
    pub fn set_enabled(&mut self, enabled: bool) {
        self.switch.disabled = !enabled;
    }

    /// 当前脉冲响应的延迟估计, 首帧到达前为 `None`
    pub fn delay(&self) -> Option<usize> {
        self.prepared.get(self.switch.selir).map(|ir| ir.delay)
    }

    fn configure(&mut self, frame: &AudioFrame) -> ShengResult<()> {
        let format = frame.sample_format.to_planar();
        let use_f32 = match (self.config.precision, format) {
            (IrPrecision::Auto | IrPrecision::Float, SampleFormat::F32p) => true,
            (IrPrecision::Auto | IrPrecision::Double, SampleFormat::F64p) => false,
            (precision, format) => {
                return Err(ShengError::Unsupported(format!(
                    "afir: 精度 {precision:?} 不支持采样格式 {format}"
                )));
            }
        };
        let eps = if use_f32 {
            f32::EPSILON as f64
        } else {
            f64::EPSILON
        };
        self.prepared = self
            .config
            .irs
            .iter()
            .map(|ir| prepare_ir(ir, &self.config, eps))
            .collect::<ShengResult<Vec<_>>>()?;

        let channels = frame.channels();
        self.engine = Some(if use_f32 {
            EngineKind::F32(Engine::new(&self.config, &self.prepared, channels)?)
        } else {
            EngineKind::F64(Engine::new(&self.config, &self.prepared, channels)?)
        });
        self.sample_rate = frame.sample_rate;
        self.channel_layout = frame.channel_layout;
        self.first_pts = frame.pts;
        Ok(())
    }

    fn drive(&mut self) -> ShengResult<()> {
        let mut sw = self.switch;
        let (sr, layout, first) = (self.sample_rate, self.channel_layout, self.first_pts);
        let frame = match self.engine.as_mut() {
            Some(EngineKind::F32(e)) => {
                let start = e.run(&mut sw)?;
                e.output_frame(start, sr, layout, first)?
            }
            Some(EngineKind::F64(e)) => {
                let start = e.run(&mut sw)?;
                e.output_frame(start, sr, layout, first)?
            }
            None => return Ok(()),
        };
        self.switch = sw;
        self.outputs.extend(frame);
        Ok(())
    }
}

impl Filter for AfirFilter {
    fn name(&self) -> &str {
        "afir"
    }

    fn send_frame(&mut self, frame: &AudioFrame) -> ShengResult<()> {
        if self.flushed {
            return Err(ShengError::Eof);
        }
        if self.engine.is_none() {
            self.configure(frame)?;
        } else if frame.channel_layout != self.channel_layout {
            return Err(ShengError::InvalidArgument(
                "afir: 流中途改变了声道布局".into(),
            ));
        }
        match self.engine.as_mut() {
            Some(EngineKind::F32(e)) => e.push(&frame.planes::<f32>()?),
            Some(EngineKind::F64(e)) => e.push(&frame.planes::<f64>()?),
            None => {}
        }
        self.drive()
    }

    fn receive_frame(&mut self) -> ShengResult<AudioFrame> {
        self.outputs.pop_front().ok_or(ShengError::NeedMoreData)
    }

    fn flush(&mut self) -> ShengResult<()> {
        if self.flushed {
            return Ok(());
        }
        self.flushed = true;
        let tail = self
            .prepared
            .get(self.switch.selir)
            .map_or(0, |ir| ir.nb_taps - 1);
        match self.engine.as_mut() {
            Some(EngineKind::F32(e)) => e.pad_for_flush(tail),
            Some(EngineKind::F64(e)) => e.pad_for_flush(tail),
            None => return Ok(()),
        }
        self.drive()
    }
}
