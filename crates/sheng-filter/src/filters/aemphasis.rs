//! 音频加重 / 去加重滤镜.
//!
//! 对标 FFmpeg 的 `aemphasis`: 由三个时间常数构造一阶/二阶搁架滤波器,
//! 覆盖唱片 (Columbia / EMI / BSI / RIAA)、CD 与 FM 广播的加重曲线.
//! 增益在参考频率处归一化为 1.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sheng_codec::frame::AudioFrame;
use sheng_core::{ShengError, ShengResult};

use crate::Filter;
use crate::filters::make_frame;

/// 工作模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmphasisMode {
    /// 去加重 (回放)
    #[default]
    Reproduction,
    /// 加重 (制作)
    Production,
}

/// 加重曲线类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EmphasisType {
    #[serde(rename = "col")]
    Columbia,
    #[serde(rename = "emi")]
    Emi,
    /// BSI 78 转唱片
    #[serde(rename = "bsi")]
    Bsi,
    #[serde(rename = "riaa")]
    Riaa,
    #[default]
    #[serde(rename = "cd")]
    Cd,
    /// 50µs FM (欧洲)
    #[serde(rename = "50fm")]
    Fm50,
    /// 75µs FM (美国)
    #[serde(rename = "75fm")]
    Fm75,
}

impl EmphasisType {
    /// 三个时间常数 (秒) 与归一化参考频率 (Hz)
    fn time_constants(self) -> ([f64; 3], f64) {
        match self {
            Self::Columbia => ([0.001590, 0.000500, 0.000100], 1000.0),
            Self::Emi => ([0.002500, 0.000500, 0.000070], 1000.0),
            Self::Bsi => ([0.003180, 0.000353, 0.000050], 1000.0),
            Self::Riaa => ([0.003180, 0.000318, 0.000075], 1000.0),
            Self::Cd => ([0.000050, 0.000015, 0.0], 100.0),
            Self::Fm50 => ([0.000050, 0.0, 0.0], 100.0),
            Self::Fm75 => ([0.000075, 0.0, 0.0], 100.0),
        }
    }
}

/// aemphasis 参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AemphasisConfig {
    pub level_in: f64,
    pub level_out: f64,
    pub mode: EmphasisMode,
    #[serde(rename = "type")]
    pub emphasis: EmphasisType,
}

impl Default for AemphasisConfig {
    fn default() -> Self {
        Self {
            level_in: 1.0,
            level_out: 1.0,
            mode: EmphasisMode::Reproduction,
            emphasis: EmphasisType::Cd,
        }
    }
}

/// 双二阶系数 (a0 = 1)
#[derive(Debug, Clone, Copy, PartialEq)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadCoeffs {
    /// 频率 `freq` 处的幅度响应
    fn freq_gain(&self, freq: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * std::f64::consts::PI * freq / sample_rate;
        let (b0, b1, b2) = (self.b0, self.b1, self.b2);
        let (a0, a1, a2) = (1.0, self.a1, self.a2);
        let num = b0 * b0 + b1 * b1 + b2 * b2
            + 2.0 * (b0 * b1 + b1 * b2) * w.cos()
            + 2.0 * b0 * b2 * (2.0 * w).cos();
        let den = a0 * a0 + a1 * a1 + a2 * a2
            + 2.0 * (a0 * a1 + a1 * a2) * w.cos()
            + 2.0 * a0 * a2 * (2.0 * w).cos();
        (num / den).sqrt()
    }

    fn new(emphasis: EmphasisType, mode: EmphasisMode, sample_rate: f64) -> Self {
        let ([tau1, tau2, tau3], nf) = emphasis.time_constants();
        let pole = |tau: f64| {
            if tau > 0.0 {
                -(-1.0 / (sample_rate * tau)).exp()
            } else {
                0.0
            }
        };
        let (i, j, k) = (pole(tau1), pole(tau2), pole(tau3));

        let mut c = Self {
            b0: 1.0,
            b1: i + k,
            b2: i * k,
            a1: j,
            a2: 0.0,
        };
        if mode == EmphasisMode::Reproduction {
            std::mem::swap(&mut c.a1, &mut c.b1);
            std::mem::swap(&mut c.a2, &mut c.b2);
        }
        let gain = 1.0 / c.freq_gain(nf, sample_rate);
        c.b0 *= gain;
        c.b1 *= gain;
        c.b2 *= gain;
        c
    }

    /// 转置直接 II 型处理一个声道, 状态非正规时清零
    fn process(&self, samples: &mut [f64], w: &mut [f64; 2], level_in: f64, level_out: f64) {
        let (a1, a2) = (-self.a1, -self.a2);
        let (mut w1, mut w2) = (w[0], w[1]);
        for s in samples.iter_mut() {
            let input = *s * level_in;
            let out = self.b0 * input + w1;
            w1 = self.b1 * input + w2 + a1 * out;
            w2 = self.b2 * input + a2 * out;
            *s = out * level_out;
        }
        w[0] = if w1.is_normal() { w1 } else { 0.0 };
        w[1] = if w2.is_normal() { w2 } else { 0.0 };
    }
}

/// 加重滤镜 (仅 f64 采样)
pub struct AemphasisFilter {
    config: AemphasisConfig,
    coeffs: Option<(u32, BiquadCoeffs)>,
    state: Vec<[f64; 2]>,
    output: Option<AudioFrame>,
}

impl AemphasisFilter {
    pub fn new(config: AemphasisConfig) -> Self {
        Self {
            config,
            coeffs: None,
            state: Vec::new(),
            output: None,
        }
    }

    /// 运行时更新参数, 滤波状态保留
    pub fn update(&mut self, config: AemphasisConfig) {
        self.config = config;
        self.coeffs = None;
    }

    fn coeffs_for(&mut self, sample_rate: u32) -> BiquadCoeffs {
        match self.coeffs {
            Some((sr, c)) if sr == sample_rate => c,
            _ => {
                let c = BiquadCoeffs::new(
                    self.config.emphasis,
                    self.config.mode,
                    sample_rate as f64,
                );
                log::debug!(
                    "aemphasis 系数: {:?} {:?} sr={sample_rate} -> {c:?}",
                    self.config.emphasis,
                    self.config.mode
                );
                self.coeffs = Some((sample_rate, c));
                c
            }
        }
    }
}

impl Filter for AemphasisFilter {
    fn name(&self) -> &str {
        "aemphasis"
    }

    fn send_frame(&mut self, frame: &AudioFrame) -> ShengResult<()> {
        if frame.sample_rate == 0 {
            return Err(ShengError::InvalidArgument("aemphasis: 采样率为 0".into()));
        }
        let mut planes = frame.planes::<f64>()?;
        let coeffs = self.coeffs_for(frame.sample_rate);
        self.state.resize(planes.len(), [0.0; 2]);
        let (level_in, level_out) = (self.config.level_in, self.config.level_out);

        planes
            .par_iter_mut()
            .zip(self.state.par_iter_mut())
            .for_each(|(plane, w)| coeffs.process(plane, w, level_in, level_out));

        self.output = Some(make_frame(
            &planes,
            frame.sample_rate,
            frame.channel_layout,
            frame.pts,
        )?);
        Ok(())
    }

    fn receive_frame(&mut self) -> ShengResult<AudioFrame> {
        self.output.take().ok_or(ShengError::NeedMoreData)
    }

    fn flush(&mut self) -> ShengResult<()> {
        Ok(())
    }
}
