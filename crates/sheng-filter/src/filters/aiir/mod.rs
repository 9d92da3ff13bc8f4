//! 任意阶 IIR 滤镜.
//!
//! 对标 FFmpeg 的 `aiir`. 系数可以是传递函数、零极点 (直角 / 极坐标 / s 平面)、
//! 模拟传递函数或格型梯形参数; 零极点系数可按直接型、级联二阶节或并联
//! 二阶节实现.

mod biquad;
mod coeffs;
mod process;


use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sheng_codec::frame::AudioFrame;
use sheng_core::{ChannelLayout, Sample, ShengError, ShengResult};

use crate::Filter;
use crate::filters::make_frame;

use self::biquad::{convert_serial2parallel, decompose_zp2biquads};
use self::coeffs::{
    channel_str, check_lattice_stability, check_stability, normalize_coeffs, parse_reals,
    parse_roots, sf2tf, zp2tf,
};
use self::process::{Gains, IirChannel, Realization};

/// 系数格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoeffFormat {
    /// 格型梯形: zeros 为反射系数, poles 为梯形系数
    #[serde(rename = "ll")]
    LatticeLadder,
    /// 模拟传递函数 (s 域多项式, 升幂)
    #[serde(rename = "sf")]
    Sf,
    /// 数字传递函数 (z⁻¹ 升幂)
    #[serde(rename = "tf")]
    Tf,
    /// z 平面零极点 `re±imi`
    #[default]
    #[serde(rename = "zp")]
    Zp,
    /// 极坐标零极点, 角度为弧度 `r±θr`
    #[serde(rename = "pr")]
    Pr,
    /// 极坐标零极点, 角度为度 `r±θd`
    #[serde(rename = "pd")]
    Pd,
    /// s 平面零极点 `re±imi`
    #[serde(rename = "sp")]
    Sp,
}

impl CoeffFormat {
    fn is_zp_family(self) -> bool {
        matches!(self, Self::Zp | Self::Pr | Self::Pd | Self::Sp)
    }
}

/// 实现形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProcessMode {
    #[serde(rename = "d")]
    Direct,
    #[default]
    #[serde(rename = "s")]
    Serial,
    #[serde(rename = "p")]
    Parallel,
}

/// 处理精度, 同时决定输入输出采样格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Precision {
    #[default]
    #[serde(rename = "dbl")]
    Double,
    #[serde(rename = "flt")]
    Float,
    #[serde(rename = "i32")]
    I32,
    #[serde(rename = "i16")]
    I16,
}

/// aiir 参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiirConfig {
    /// 分子 / 零点 / 反射系数, 各声道以 `|` 分隔
    pub zeros: String,
    /// 分母 / 极点 / 梯形系数, 各声道以 `|` 分隔
    pub poles: String,
    /// 各声道增益, 不足时沿用最后一个
    pub gains: Vec<f64>,
    /// 输入增益
    pub dry: f64,
    /// 输出增益
    pub wet: f64,
    /// 湿声比例 [0, 1]
    pub mix: f64,
    /// 归一化直流增益
    pub normalize: bool,
    pub format: CoeffFormat,
    pub process: ProcessMode,
    pub precision: Precision,
}

impl Default for AiirConfig {
    fn default() -> Self {
        Self {
            zeros: "1+0i 1-0i".into(),
            poles: "1+0i 1-0i".into(),
            gains: vec![1.0],
            dry: 1.0,
            wet: 1.0,
            mix: 1.0,
            normalize: true,
            format: CoeffFormat::Zp,
            process: ProcessMode::Serial,
            precision: Precision::Double,
        }
    }
}

impl AiirConfig {
    fn validate(&self) -> ShengResult<()> {
        if self.gains.is_empty() {
            return Err(ShengError::InvalidArgument("aiir: 至少需要一个增益".into()));
        }
        for (name, v) in [("dry", self.dry), ("wet", self.wet), ("mix", self.mix)] {
            if !(0.0..=1.0).contains(&v) {
                return Err(ShengError::InvalidArgument(format!(
                    "aiir: {name} 超出 [0, 1]: {v}"
                )));
            }
        }
        let supported = match self.format {
            CoeffFormat::LatticeLadder | CoeffFormat::Tf | CoeffFormat::Sf => {
                self.process == ProcessMode::Direct
            }
            _ => true,
        };
        if !supported {
            return Err(ShengError::Unsupported(format!(
                "aiir: 格式 {:?} 只支持直接型实现, 不支持 {:?}",
                self.format, self.process
            )));
        }
        Ok(())
    }

    /// 构建第 `ch` 个声道的实现形式, 返回 (实现, 是否检测到不稳定)
    fn build_channel(&self, ch: usize) -> ShengResult<(Realization, bool)> {
        let zeros = channel_str(&self.zeros, ch);
        let poles = channel_str(&self.poles, ch);
        let g = self.gains[ch.min(self.gains.len() - 1)];

        match self.format {
            CoeffFormat::LatticeLadder => {
                let k = parse_reals(zeros)?;
                let mut v = parse_reals(poles)?;
                if v.len() != k.len() + 1 {
                    return Err(ShengError::InvalidArgument(format!(
                        "aiir: 声道 {ch} 梯形系数应比反射系数多一个: {} / {}",
                        v.len(),
                        k.len()
                    )));
                }
                let unstable = check_lattice_stability(&k).inspect(|i| {
                    log::warn!("aiir: 声道 {ch} 反射系数 {i} ({}) 的模不小于 1", k[*i]);
                });
                v.iter_mut().for_each(|c| *c *= g);
                Ok((Realization::lattice(k, v), unstable.is_some()))
            }
            CoeffFormat::Tf | CoeffFormat::Sf => {
                let mut b = parse_reals(zeros)?;
                let mut a = parse_reals(poles)?;
                if self.format == CoeffFormat::Sf {
                    b = sf2tf(&b);
                    a = sf2tf(&a);
                }
                let a0 = a.first().copied().unwrap_or(0.0);
                if b.is_empty() || a0 == 0.0 {
                    return Err(ShengError::InvalidArgument(format!(
                        "aiir: 声道 {ch} 传递函数系数为空或 a[0] 为 0"
                    )));
                }
                a.iter_mut().for_each(|c| *c /= a0);
                if self.normalize {
                    normalize_coeffs(&mut b, &a);
                }
                b.iter_mut().for_each(|c| *c *= g);
                Ok((Realization::direct(b, a), false))
            }
            format => {
                let z = parse_roots(zeros, format)?;
                let p = parse_roots(poles, format)?;
                let unstable = check_stability(&p).inspect(|i| {
                    log::warn!("aiir: 声道 {ch} 极点 {i} ({}) 在单位圆上或圆外", p[*i]);
                });
                let realization = match self.process {
                    ProcessMode::Direct => {
                        let (mut b, a) = zp2tf(&z, &p)?;
                        if self.normalize {
                            normalize_coeffs(&mut b, &a);
                        }
                        b.iter_mut().for_each(|c| *c *= g);
                        Realization::direct(b, a)
                    }
                    ProcessMode::Serial => {
                        Realization::Serial(decompose_zp2biquads(&z, &p, g, self.normalize)?)
                    }
                    ProcessMode::Parallel => {
                        let serial = decompose_zp2biquads(&z, &p, g, self.normalize)?;
                        let (biquads, fir) = convert_serial2parallel(&serial)?;
                        Realization::Parallel { biquads, fir }
                    }
                };
                Ok((realization, unstable.is_some()))
            }
        }
    }
}

/// IIR 滤镜
pub struct AiirFilter {
    config: AiirConfig,
    channels: Vec<IirChannel>,
    layout: Option<ChannelLayout>,
    stability_warnings: usize,
    output: Option<AudioFrame>,
}

impl AiirFilter {
    pub fn new(config: AiirConfig) -> ShengResult<Self> {
        config.validate()?;
        if config.format.is_zp_family() && config.process == ProcessMode::Direct {
            log::warn!("aiir: 零极点按直接型实现时高阶滤波器数值不稳定, 建议使用级联或并联");
        }
        if config.process == ProcessMode::Parallel
            && matches!(config.precision, Precision::I32 | Precision::I16)
        {
            log::warn!("aiir: 整数精度下并联实现的误差较大");
        }
        // 先构建一个声道, 尽早暴露系数错误
        config.build_channel(0)?;
        Ok(Self {
            config,
            channels: Vec::new(),
            layout: None,
            stability_warnings: 0,
            output: None,
        })
    }

    /// 检测到不稳定系数的声道数
    pub fn stability_warnings(&self) -> usize {
        self.stability_warnings
    }

    fn configure(&mut self, layout: ChannelLayout, channels: usize) -> ShengResult<()> {
        let built = (0..channels)
            .map(|ch| self.config.build_channel(ch))
            .collect::<ShengResult<Vec<_>>>()?;
        self.stability_warnings = built.iter().filter(|(_, unstable)| *unstable).count();
        self.channels = built.into_iter().map(|(r, _)| IirChannel::new(r)).collect();
        self.layout = Some(layout);
        log::debug!(
            "aiir: {channels} 声道, 格式 {:?}, 实现 {:?}",
            self.config.format,
            self.config.process
        );
        Ok(())
    }

    fn run<S: Sample>(&mut self, frame: &AudioFrame) -> ShengResult<AudioFrame> {
        let planes = frame.planes::<S>()?;
        let gains = Gains {
            dry: self.config.dry,
            wet: self.config.wet,
            mix: self.config.mix,
        };
        let len = frame.nb_samples as usize;
        let mut out: Vec<Vec<S>> = vec![vec![S::default(); len]; planes.len()];
        self.channels
            .par_iter_mut()
            .zip(planes.par_iter())
            .zip(out.par_iter_mut())
            .for_each(|((ch, src), dst)| ch.process(src, dst, gains));

        if S::NEEDS_CLIPPING {
            for (idx, ch) in self.channels.iter_mut().enumerate() {
                if ch.clippings > 0 {
                    log::warn!("aiir: 声道 {idx} 削波 {} 次, 请降低增益", ch.clippings);
                    ch.clippings = 0;
                }
            }
        }
        make_frame(&out, frame.sample_rate, frame.channel_layout, frame.pts)
    }
}

impl Filter for AiirFilter {
    fn name(&self) -> &str {
        "aiir"
    }

    fn send_frame(&mut self, frame: &AudioFrame) -> ShengResult<()> {
        match self.layout {
            None => self.configure(frame.channel_layout, frame.channels())?,
            Some(layout) if layout != frame.channel_layout => {
                return Err(ShengError::InvalidArgument(
                    "aiir: 流中途改变了声道布局".into(),
                ));
            }
            Some(_) => {}
        }
        let out = match self.config.precision {
            Precision::Double => self.run::<f64>(frame),
            Precision::Float => self.run::<f32>(frame),
            Precision::I32 => self.run::<i32>(frame),
            Precision::I16 => self.run::<i16>(frame),
        };
        let out = out.map_err(|e| match e {
            ShengError::Unsupported(_) => ShengError::Unsupported(format!(
                "aiir: 精度 {:?} 不支持采样格式 {}",
                self.config.precision, frame.sample_format
            )),
            other => other,
        })?;
        self.output = Some(out);
        Ok(())
    }

    fn receive_frame(&mut self) -> ShengResult<AudioFrame> {
        self.output.take().ok_or(ShengError::NeedMoreData)
    }

    fn flush(&mut self) -> ShengResult<()> {
        Ok(())
    }
}
